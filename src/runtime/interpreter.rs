mod frame;
mod unwind;

pub(crate) use frame::{Frame, FrameKind};
pub(crate) use unwind::{find_handler, initializer_failure};

use crate::class::{ArrayKind, Condition, Instruction, NumKind, ValueKind};
use crate::descriptor::FieldType;
use crate::runtime::{
    Class, ConstantPoolInfo, CpClassInfo, CpMethodRef, Exception, Fault, FieldResolve, InitState,
    NativeEnv, NativeResult, ObjectRef, ResolvedMethod, Runtime, Value, VmError,
    famous_classes::{
        ARITHMETIC_EXCEPTION, ARRAY_STORE_EXCEPTION, BOOTSTRAP_METHOD_ERROR, CLASS_CAST_EXCEPTION,
        INCOMPATIBLE_CLASS_CHANGE_ERROR, NEGATIVE_ARRAY_SIZE_EXCEPTION, NO_CLASS_DEF_FOUND_ERROR,
        NO_SUCH_FIELD_ERROR, NO_SUCH_METHOD_ERROR,
    },
    inheritance::{is_assignable_to, is_same_or_sub_class_of},
    thread::{Effects, ThreadId},
};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, trace};

/// Outcome of executing one instruction.
pub(crate) enum Next {
    Advance,
    Jump(usize),
    /// Arguments (receiver first) are still on the operand stack.
    Invoke(ResolvedMethod),
    Return(Option<Value>),
    /// The monitor is held by another thread. The instruction has not
    /// consumed anything and runs again once the thread is promoted.
    Block(ObjectRef),
    /// Another thread is initializing this class; the instruction runs
    /// again once that initialization settles.
    AwaitInit(Arc<Class>),
    /// `<clinit>` must run before the instruction can be retried.
    InitClass(ResolvedMethod),
}

pub(crate) struct InterpreterEnv<'a> {
    runtime: &'a Runtime,
    frame: &'a mut Frame,
    thread: ThreadId,
    effects: &'a mut Effects,
}

#[derive(Clone, Copy)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
}

#[derive(Clone, Copy)]
enum ShiftOp {
    Shl,
    Shr,
    Ushr,
}

impl<'a> InterpreterEnv<'a> {
    pub(crate) fn new(
        runtime: &'a Runtime,
        frame: &'a mut Frame,
        thread: ThreadId,
        effects: &'a mut Effects,
    ) -> Self {
        Self {
            runtime,
            frame,
            thread,
            effects,
        }
    }

    /// Executes the instruction at the frame's pc. The pc itself is left
    /// for the caller to move according to the returned [`Next`].
    pub(crate) fn execute(&mut self) -> NativeResult<Next> {
        let code = Arc::clone(&self.frame.code);
        let pc = self.frame.pc;
        let instruction = code.instructions.get(pc).ok_or(VmError::InvalidPc {
            pc,
            len: code.instructions.len(),
        })?;
        trace!(thread = %self.thread, pc, ?instruction, "execute");

        use Instruction::*;
        match instruction {
            Nop => {}
            AconstNull => self.push(Value::null())?,
            Iconst(v) => self.push(Value::Int(*v))?,
            Lconst(v) => self.push(Value::Long(*v))?,
            Fconst(v) => self.push(Value::Float(*v))?,
            Dconst(v) => self.push(Value::Double(*v))?,
            Ldc(index) => {
                let value = self.load_constant(*index)?;
                self.push(value)?;
            }
            Load(kind, index) => {
                let value = self.frame.load(*index)?.clone();
                check_kind(&value, *kind, false)?;
                self.push(value)?;
            }
            Store(kind, index) => {
                let value = self.frame.stack.pop()?;
                check_kind(&value, *kind, true)?;
                self.frame.store(*index, value)?;
            }
            ArrayLoad(kind) => {
                let index = self.frame.stack.pop_int()?;
                let array = self.pop_object()?;
                check_array_kind(&array, *kind)?;
                let value = array.array_load(index)?;
                self.push(value)?;
            }
            ArrayStore(kind) => self.array_store(*kind)?,

            Pop => {
                self.frame.stack.pop_slots(1)?;
            }
            Pop2 => {
                self.frame.stack.pop_slots(2)?;
            }
            Dup => self.dup(1, 0)?,
            DupX1 => self.dup(1, 1)?,
            DupX2 => self.dup(1, 2)?,
            Dup2 => self.dup(2, 0)?,
            Dup2X1 => self.dup(2, 1)?,
            Dup2X2 => self.dup(2, 2)?,
            Swap => {
                let top = self.frame.stack.pop_slots(1)?;
                let below = self.frame.stack.pop_slots(1)?;
                self.frame.stack.push_all(&top)?;
                self.frame.stack.push_all(&below)?;
            }

            Add(kind) => self.binary(BinaryOp::Add, *kind)?,
            Sub(kind) => self.binary(BinaryOp::Sub, *kind)?,
            Mul(kind) => self.binary(BinaryOp::Mul, *kind)?,
            Div(kind) => self.binary(BinaryOp::Div, *kind)?,
            Rem(kind) => self.binary(BinaryOp::Rem, *kind)?,
            And(kind) => self.binary(BinaryOp::And, *kind)?,
            Or(kind) => self.binary(BinaryOp::Or, *kind)?,
            Xor(kind) => self.binary(BinaryOp::Xor, *kind)?,
            Shl(kind) => self.shift(ShiftOp::Shl, *kind)?,
            Shr(kind) => self.shift(ShiftOp::Shr, *kind)?,
            Ushr(kind) => self.shift(ShiftOp::Ushr, *kind)?,
            Neg(kind) => {
                let value = match self.pop_num(*kind)? {
                    Value::Int(v) => Value::Int(v.wrapping_neg()),
                    Value::Long(v) => Value::Long(v.wrapping_neg()),
                    Value::Float(v) => Value::Float(-v),
                    Value::Double(v) => Value::Double(-v),
                    other => other,
                };
                self.push(value)?;
            }
            Iinc(index, delta) => {
                let value = self.frame.load(*index)?.as_int()?;
                self.frame
                    .store(*index, Value::Int(value.wrapping_add(*delta as i32)))?;
            }
            Convert(from, to) => {
                let value = self.pop_num(*from)?;
                self.push(convert(value, *to))?;
            }
            I2b => {
                let v = self.frame.stack.pop_int()?;
                self.push(Value::Int(v as i8 as i32))?;
            }
            I2c => {
                let v = self.frame.stack.pop_int()?;
                self.push(Value::Int(v as u16 as i32))?;
            }
            I2s => {
                let v = self.frame.stack.pop_int()?;
                self.push(Value::Int(v as i16 as i32))?;
            }
            Lcmp => {
                let b = self.frame.stack.pop_long()?;
                let a = self.frame.stack.pop_long()?;
                self.push(Value::Int(ordering_value(a.cmp(&b))))?;
            }
            Fcmpl | Fcmpg => {
                let b = self.frame.stack.pop_float()?;
                let a = self.frame.stack.pop_float()?;
                let nan = if matches!(instruction, Fcmpg) { 1 } else { -1 };
                self.push(Value::Int(fcmp(a, b, nan)))?;
            }
            Dcmpl | Dcmpg => {
                let b = self.frame.stack.pop_double()?;
                let a = self.frame.stack.pop_double()?;
                let nan = if matches!(instruction, Dcmpg) { 1 } else { -1 };
                self.push(Value::Int(fcmp(a, b, nan)))?;
            }

            If(condition, target) => {
                let v = self.frame.stack.pop_int()?;
                return Ok(branch(condition.test(v.cmp(&0)), *target));
            }
            IfIcmp(condition, target) => {
                let b = self.frame.stack.pop_int()?;
                let a = self.frame.stack.pop_int()?;
                return Ok(branch(condition.test(a.cmp(&b)), *target));
            }
            IfAcmpEq(target) | IfAcmpNe(target) => {
                let b = self.frame.stack.pop_reference()?;
                let a = self.frame.stack.pop_reference()?;
                let same = match (&a, &b) {
                    (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                    (None, None) => true,
                    _ => false,
                };
                let condition = if matches!(instruction, IfAcmpEq(_)) {
                    Condition::Eq
                } else {
                    Condition::Ne
                };
                let ordering = if same { Ordering::Equal } else { Ordering::Less };
                return Ok(branch(condition.test(ordering), *target));
            }
            IfNull(target) => {
                let v = self.frame.stack.pop_reference()?;
                return Ok(branch(v.is_none(), *target));
            }
            IfNonNull(target) => {
                let v = self.frame.stack.pop_reference()?;
                return Ok(branch(v.is_some(), *target));
            }
            Goto(target) => return Ok(Next::Jump(*target as usize)),
            Jsr(target) => {
                self.push(Value::ReturnAddress(pc + 1))?;
                return Ok(Next::Jump(*target as usize));
            }
            Ret(index) => {
                let target = self.frame.load(*index)?.as_returnaddress()?;
                return Ok(Next::Jump(target));
            }
            TableSwitch {
                default,
                low,
                targets,
            } => {
                let key = self.frame.stack.pop_int()?;
                let target = usize::try_from(key as i64 - *low as i64)
                    .ok()
                    .and_then(|i| targets.get(i))
                    .unwrap_or(default);
                return Ok(Next::Jump(*target as usize));
            }
            LookupSwitch { default, pairs } => {
                let key = self.frame.stack.pop_int()?;
                let target = pairs
                    .iter()
                    .find(|(k, _)| *k == key)
                    .map(|(_, t)| t)
                    .unwrap_or(default);
                return Ok(Next::Jump(*target as usize));
            }
            Return(None) => return Ok(Next::Return(None)),
            Return(Some(kind)) => {
                let value = self.frame.stack.pop()?;
                check_kind(&value, *kind, false)?;
                return Ok(Next::Return(Some(value)));
            }

            GetStatic(index) => {
                let (class, slot) = self.resolve_static_field(*index)?;
                if let Some(next) = self.initialize(&class)? {
                    return Ok(next);
                }
                self.push(class.get_static_field(slot))?;
            }
            PutStatic(index) => {
                let (class, slot) = self.resolve_static_field(*index)?;
                if let Some(next) = self.initialize(&class)? {
                    return Ok(next);
                }
                let value = self.frame.stack.pop()?;
                class.set_static_field(slot, value);
            }
            GetField(index) => {
                let (declaring, slot) = self.resolve_instance_field(*index)?;
                let object = self.pop_object()?;
                check_field_holder(&object, &declaring)?;
                self.push(object.get_slot(slot)?)?;
            }
            PutField(index) => {
                let (declaring, slot) = self.resolve_instance_field(*index)?;
                let value = self.frame.stack.pop()?;
                let object = self.pop_object()?;
                check_field_holder(&object, &declaring)?;
                object.put_slot(slot, value)?;
            }

            InvokeStatic(index) => {
                let method = self.resolve_method(*index)?;
                if !method.method().is_static() {
                    return Err(incompatible(format!(
                        "Expected static method '{}'",
                        method.qualified_name()
                    )));
                }
                if let Some(next) = self.initialize(&method.class)? {
                    return Ok(next);
                }
                return Ok(Next::Invoke(method));
            }
            InvokeSpecial(index) => {
                let resolved = self.resolve_method(*index)?;
                let method = self.select_special(resolved)?;
                self.receiver(method.method().arg_count())?;
                return Ok(Next::Invoke(method));
            }
            InvokeVirtual(index) | InvokeInterface(index) => {
                let resolved = self.resolve_method(*index)?;
                let info = resolved.method();
                if info.is_static() {
                    return Err(incompatible(format!(
                        "Expecting non-static method '{}'",
                        resolved.qualified_name()
                    )));
                }
                let receiver = self.receiver(info.arg_count())?;
                if resolved.class.is_interface()
                    && !is_assignable_to(receiver.class(), &resolved.class)
                {
                    return Err(incompatible(format!(
                        "class {} does not implement the requested interface {}",
                        receiver.class_name().replace('/', "."),
                        resolved.class.name().replace('/', ".")
                    )));
                }
                let method = if info.is_private() {
                    resolved
                } else {
                    receiver
                        .class()
                        .find_method(&info.name, &info.descriptor_str)
                        .unwrap_or(resolved)
                };
                return Ok(Next::Invoke(method));
            }
            InvokeDynamic(index) => {
                let name = match self.frame.class().get_constant(*index)? {
                    ConstantPoolInfo::InvokeDynamic { name } => Arc::clone(name),
                    _ => return Err(self.invalid_constant(*index, "an invokedynamic").into()),
                };
                return Err(Exception::new_vm_msg(
                    BOOTSTRAP_METHOD_ERROR,
                    format!("call site '{name}' has no bootstrap support"),
                )
                .into());
            }

            New(index) => {
                let class = self.resolve_class(*index)?;
                if !class.is_interface() && !class.is_abstract() {
                    if let Some(next) = self.initialize(&class)? {
                        return Ok(next);
                    }
                }
                let object = self.runtime.heap.allocate(&class)?;
                self.push(Value::from_ref(object))?;
            }
            NewArray(kind) => {
                let length = self.frame.stack.pop_int()?;
                let name = primitive_array_class(*kind).ok_or(VmError::TypeMismatch {
                    expected: "primitive array type",
                    found: "reference",
                })?;
                let array = self.runtime.new_array(name, length)?;
                self.push(Value::from_ref(array))?;
            }
            ANewArray(index) => {
                let component = self.class_ref_name(*index)?;
                let length = self.frame.stack.pop_int()?;
                let array = self.runtime.new_array(&array_of(&component), length)?;
                self.push(Value::from_ref(array))?;
            }
            MultiANewArray(index, dimensions) => {
                let name = self.class_ref_name(*index)?;
                let mut counts = self
                    .frame
                    .stack
                    .pop_args(*dimensions as usize)?
                    .iter()
                    .map(Value::as_int)
                    .collect::<Result<Vec<_>, _>>()?;
                if let Some(negative) = counts.iter().find(|c| **c < 0) {
                    return Err(Exception::new_vm_msg(
                        NEGATIVE_ARRAY_SIZE_EXCEPTION,
                        negative.to_string(),
                    )
                    .into());
                }
                counts.truncate(name.bytes().take_while(|b| *b == b'[').count());
                let array = multi_array(self.runtime, &name, &counts)?;
                self.push(Value::from_ref(array))?;
            }
            ArrayLength => {
                let array = self.pop_object()?;
                let length = array.array_length().ok_or(VmError::TypeMismatch {
                    expected: "array",
                    found: "instance",
                })?;
                self.push(Value::Int(length as i32))?;
            }
            AThrow => {
                let throwable = self.pop_object()?;
                return Err(Exception::new(throwable).into());
            }
            CheckCast(index) => {
                if let Some(object) = self.frame.stack.peek(0)?.as_reference()? {
                    let class = self.resolve_class(*index)?;
                    if !is_assignable_to(object.class(), &class) {
                        return Err(Exception::new_vm_msg(
                            CLASS_CAST_EXCEPTION,
                            format!(
                                "class {} cannot be cast to class {}",
                                object.class_name().replace('/', "."),
                                class.name().replace('/', ".")
                            ),
                        )
                        .into());
                    }
                }
            }
            InstanceOf(index) => {
                let result = match self.frame.stack.pop_reference()? {
                    Some(object) => {
                        let class = self.resolve_class(*index)?;
                        is_assignable_to(object.class(), &class)
                    }
                    None => false,
                };
                self.push(Value::from(result))?;
            }
            MonitorEnter => {
                let object = self.frame.stack.peek(0)?.as_object()?;
                if !object.monitor().lock().try_enter(self.thread, 1) {
                    return Ok(Next::Block(object));
                }
                self.frame.stack.pop()?;
                self.frame.monitors.push(object);
            }
            MonitorExit => {
                let object = self.pop_object()?;
                let promoted = object.monitor().lock().exit(self.thread)?;
                self.effects.woken.extend(promoted);
                let held = self.frame.monitors.iter().rposition(|m| Arc::ptr_eq(m, &object));
                if let Some(i) = held {
                    self.frame.monitors.remove(i);
                }
            }
        }
        Ok(Next::Advance)
    }

    fn push(&mut self, value: Value) -> Result<(), VmError> {
        self.frame.stack.push(value)
    }

    fn pop_object(&mut self) -> NativeResult<ObjectRef> {
        self.frame.stack.pop()?.as_object()
    }

    fn pop_num(&mut self, kind: NumKind) -> Result<Value, VmError> {
        let value = self.frame.stack.pop()?;
        let matches = matches!(
            (kind, &value),
            (NumKind::Int, Value::Int(_))
                | (NumKind::Long, Value::Long(_))
                | (NumKind::Float, Value::Float(_))
                | (NumKind::Double, Value::Double(_))
        );
        if !matches {
            return Err(VmError::TypeMismatch {
                expected: num_kind_name(kind),
                found: value.kind_name(),
            });
        }
        Ok(value)
    }

    /// The receiver of a call taking `arg_count` entries, left in place.
    fn receiver(&self, arg_count: usize) -> NativeResult<ObjectRef> {
        let depth = arg_count.checked_sub(1).ok_or(VmError::StackUnderflow)?;
        self.frame.stack.peek(depth)?.as_object()
    }

    /// Copies the top `slots` slots beneath the `skip` slots below them.
    fn dup(&mut self, slots: usize, skip: usize) -> Result<(), VmError> {
        let top = self.frame.stack.pop_slots(slots)?;
        let below = self.frame.stack.pop_slots(skip)?;
        self.frame.stack.push_all(&top)?;
        self.frame.stack.push_all(&below)?;
        self.frame.stack.push_all(&top)
    }

    fn binary(&mut self, op: BinaryOp, kind: NumKind) -> NativeResult<()> {
        let b = self.pop_num(kind)?;
        let a = self.pop_num(kind)?;
        let result = match (a, b) {
            (Value::Int(a), Value::Int(b)) => Value::Int(match op {
                BinaryOp::Add => a.wrapping_add(b),
                BinaryOp::Sub => a.wrapping_sub(b),
                BinaryOp::Mul => a.wrapping_mul(b),
                BinaryOp::Div => a.wrapping_div(non_zero(b)?),
                BinaryOp::Rem => a.wrapping_rem(non_zero(b)?),
                BinaryOp::And => a & b,
                BinaryOp::Or => a | b,
                BinaryOp::Xor => a ^ b,
            }),
            (Value::Long(a), Value::Long(b)) => Value::Long(match op {
                BinaryOp::Add => a.wrapping_add(b),
                BinaryOp::Sub => a.wrapping_sub(b),
                BinaryOp::Mul => a.wrapping_mul(b),
                BinaryOp::Div => a.wrapping_div(non_zero(b)?),
                BinaryOp::Rem => a.wrapping_rem(non_zero(b)?),
                BinaryOp::And => a & b,
                BinaryOp::Or => a | b,
                BinaryOp::Xor => a ^ b,
            }),
            (Value::Float(a), Value::Float(b)) => Value::Float(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                BinaryOp::Rem => a % b,
                _ => return Err(bitwise_on_float().into()),
            }),
            (Value::Double(a), Value::Double(b)) => Value::Double(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                BinaryOp::Rem => a % b,
                _ => return Err(bitwise_on_float().into()),
            }),
            _ => return Err(bitwise_on_float().into()),
        };
        self.push(result)?;
        Ok(())
    }

    /// The shift distance is always an int, masked to the operand width.
    fn shift(&mut self, op: ShiftOp, kind: NumKind) -> Result<(), VmError> {
        let distance = self.frame.stack.pop_int()? as u32;
        let result = match self.pop_num(kind)? {
            Value::Int(v) => {
                let distance = distance & 0x1f;
                Value::Int(match op {
                    ShiftOp::Shl => v << distance,
                    ShiftOp::Shr => v >> distance,
                    ShiftOp::Ushr => ((v as u32) >> distance) as i32,
                })
            }
            Value::Long(v) => {
                let distance = distance & 0x3f;
                Value::Long(match op {
                    ShiftOp::Shl => v << distance,
                    ShiftOp::Shr => v >> distance,
                    ShiftOp::Ushr => ((v as u64) >> distance) as i64,
                })
            }
            _ => return Err(bitwise_on_float()),
        };
        self.push(result)
    }

    fn array_store(&mut self, kind: ArrayKind) -> NativeResult<()> {
        let value = self.frame.stack.pop()?;
        let index = self.frame.stack.pop_int()?;
        let array = self.pop_object()?;
        check_array_kind(&array, kind)?;
        let value = match (kind, value) {
            (ArrayKind::Boolean, Value::Int(v)) => Value::Int(v & 1),
            (ArrayKind::Byte, Value::Int(v)) => Value::Int(v as i8 as i32),
            (ArrayKind::Char, Value::Int(v)) => Value::Int(v as u16 as i32),
            (ArrayKind::Short, Value::Int(v)) => Value::Int(v as i16 as i32),
            (ArrayKind::Reference, Value::Reference(Some(element))) => {
                if let Some(element_type) = &array.class().array_element_type {
                    if !is_assignable_to(element.class(), element_type) {
                        return Err(Exception::new_vm_msg(
                            ARRAY_STORE_EXCEPTION,
                            element.class_name().replace('/', "."),
                        )
                        .into());
                    }
                }
                Value::from_ref(element)
            }
            (_, value) => {
                let expected = array_kind_value(kind);
                check_kind(&value, expected, false)?;
                value
            }
        };
        array.array_store(index, value)
    }

    fn load_constant(&self, index: u16) -> NativeResult<Value> {
        let class = Arc::clone(self.frame.class());
        Ok(match class.get_constant(index)? {
            ConstantPoolInfo::Integer(v) => Value::Int(*v),
            ConstantPoolInfo::Float(v) => Value::Float(*v),
            ConstantPoolInfo::Long(v) => Value::Long(*v),
            ConstantPoolInfo::Double(v) => Value::Double(*v),
            ConstantPoolInfo::String(s) => Value::from_ref(self.runtime.intern_string(s)?),
            ConstantPoolInfo::Class(info) => {
                let target = resolve_cp_class(self.runtime, &class, info)?;
                Value::from_ref(self.runtime.class_object(&target)?)
            }
            ConstantPoolInfo::MethodHandle | ConstantPoolInfo::MethodType => {
                return Err(Exception::new_vm_msg(
                    BOOTSTRAP_METHOD_ERROR,
                    "method handle constants are not supported",
                )
                .into());
            }
            _ => return Err(self.invalid_constant(index, "a loadable constant").into()),
        })
    }

    fn resolve_class(&self, index: u16) -> NativeResult<Arc<Class>> {
        resolve_class_ref(self.runtime, self.frame.class(), index)
    }

    fn class_ref_name(&self, index: u16) -> Result<Arc<str>, VmError> {
        match self.frame.class().get_constant(index)? {
            ConstantPoolInfo::Class(info) => Ok(Arc::clone(&info.name)),
            _ => Err(self.invalid_constant(index, "a class reference")),
        }
    }

    fn resolve_field(&self, index: u16) -> NativeResult<FieldResolve> {
        let class = Arc::clone(self.frame.class());
        let ConstantPoolInfo::Fieldref(field_ref) = class.get_constant(index)? else {
            return Err(self.invalid_constant(index, "a field reference").into());
        };
        let resolved = field_ref.resolved.get_or_try_init(|| {
            let owner = resolve_cp_class(self.runtime, &class, &field_ref.class)?;
            lookup_field(&owner, &field_ref.name, &field_ref.descriptor_str)
        })?;
        Ok(resolved.clone())
    }

    fn resolve_static_field(&self, index: u16) -> NativeResult<(Arc<Class>, usize)> {
        match self.resolve_field(index)? {
            FieldResolve::Static { class, index } => Ok((class, index)),
            FieldResolve::Instance { .. } => Err(incompatible("Expected static field".to_string())),
        }
    }

    fn resolve_instance_field(&self, index: u16) -> NativeResult<(Arc<Class>, usize)> {
        match self.resolve_field(index)? {
            FieldResolve::Instance { class, slot } => Ok((class, slot)),
            FieldResolve::Static { .. } => {
                Err(incompatible("Expected non-static field".to_string()))
            }
        }
    }

    fn resolve_method(&self, index: u16) -> NativeResult<ResolvedMethod> {
        let class = Arc::clone(self.frame.class());
        let method_ref = match class.get_constant(index)? {
            ConstantPoolInfo::Methodref(m) | ConstantPoolInfo::InterfaceMethodref(m) => m,
            _ => return Err(self.invalid_constant(index, "a method reference").into()),
        };
        let resolved = method_ref
            .resolved
            .get_or_try_init(|| lookup_method(self.runtime, &class, method_ref))?;
        Ok(resolved.clone())
    }

    /// `invokespecial` of a non-private superclass method named from a
    /// subclass selects the closest override above the current class.
    fn select_special(&self, resolved: ResolvedMethod) -> NativeResult<ResolvedMethod> {
        let current = self.frame.class();
        let info = resolved.method();
        if info.name.as_ref() == "<init>"
            || info.is_private()
            || resolved.class.is_interface()
            || Arc::ptr_eq(&resolved.class, current)
            || !is_same_or_sub_class_of(current, &resolved.class)
        {
            return Ok(resolved);
        }
        Ok(current
            .super_class()
            .and_then(|s| s.find_method(&info.name, &info.descriptor_str))
            .unwrap_or(resolved))
    }

    fn initialize(&mut self, class: &Arc<Class>) -> NativeResult<Option<Next>> {
        initialization_step(self.runtime, self.thread, class, self.effects)
    }

    fn invalid_constant(&self, index: u16, expected: &'static str) -> VmError {
        VmError::InvalidConstant {
            class: self.frame.class().name().to_string(),
            index,
            expected,
        }
    }
}

/// Advances `class` towards initialized on behalf of `thread`.
///
/// `Ok(None)` means the class is ready for use. Superclasses go first; a
/// class with a bytecode `<clinit>` asks for an initializer frame and the
/// triggering instruction is retried once that frame returns.
pub(crate) fn initialization_step(
    runtime: &Runtime,
    thread: ThreadId,
    class: &Arc<Class>,
    effects: &mut Effects,
) -> NativeResult<Option<Next>> {
    match class.init_state() {
        InitState::Done => return Ok(None),
        InitState::InProgress(owner) if owner == thread => return Ok(None),
        InitState::InProgress(_) => {
            return Ok(Some(Next::AwaitInit(Arc::clone(class))));
        }
        InitState::Failed => {
            return Err(Exception::new_vm_msg(
                NO_CLASS_DEF_FOUND_ERROR,
                format!("Could not initialize class {}", class.name().replace('/', ".")),
            )
            .into());
        }
        InitState::Uninitialized => {}
    }
    if let Some(super_class) = class.super_class() {
        if let Some(next) = initialization_step(runtime, thread, super_class, effects)? {
            return Ok(Some(next));
        }
    }
    debug!(class = class.name(), %thread, "initializing class");
    class.set_init_state(InitState::InProgress(thread));
    if let Err(fault) = assign_constant_values(runtime, class) {
        class.set_init_state(InitState::Failed);
        return Err(fault);
    }
    let Some(index) = class.declared_method("<clinit>", "()V") else {
        class.set_init_state(InitState::Done);
        return Ok(None);
    };
    let Some(native) = runtime.natives.lookup(class.name(), "<clinit>", "()V") else {
        return Ok(Some(Next::InitClass(ResolvedMethod {
            class: Arc::clone(class),
            index,
        })));
    };
    let mut env = NativeEnv::new(runtime, Arc::clone(class), None, vec![], thread, effects);
    match native(&mut env) {
        Ok(_) => {
            class.set_init_state(InitState::Done);
            Ok(None)
        }
        Err(Fault::Throw(exception)) => {
            class.set_init_state(InitState::Failed);
            let thrown = runtime.materialize(exception)?;
            Err(Exception::new(initializer_failure(runtime, thrown)?).into())
        }
        Err(fatal) => Err(fatal),
    }
}

fn assign_constant_values(runtime: &Runtime, class: &Arc<Class>) -> NativeResult<()> {
    for field in &class.static_fields_info {
        let Some(index) = field.constant_value else {
            continue;
        };
        let value = match class.get_constant(index)? {
            ConstantPoolInfo::Integer(v) => Value::Int(*v),
            ConstantPoolInfo::Float(v) => Value::Float(*v),
            ConstantPoolInfo::Long(v) => Value::Long(*v),
            ConstantPoolInfo::Double(v) => Value::Double(*v),
            ConstantPoolInfo::String(s) => Value::from_ref(runtime.intern_string(s)?),
            _ => {
                return Err(VmError::InvalidConstant {
                    class: class.name().to_string(),
                    index,
                    expected: "a constant value",
                }
                .into());
            }
        };
        class.set_static_field(field.index, value);
    }
    Ok(())
}

/// Resolves the class constant at `index` of `class`.
pub(crate) fn resolve_class_ref(
    runtime: &Runtime,
    class: &Arc<Class>,
    index: u16,
) -> NativeResult<Arc<Class>> {
    match class.get_constant(index)? {
        ConstantPoolInfo::Class(info) => resolve_cp_class(runtime, class, info),
        _ => Err(VmError::InvalidConstant {
            class: class.name().to_string(),
            index,
            expected: "a class reference",
        }
        .into()),
    }
}

fn resolve_cp_class(
    runtime: &Runtime,
    current: &Arc<Class>,
    info: &CpClassInfo,
) -> NativeResult<Arc<Class>> {
    // a self reference must not go through the loader while `current` is
    // still being defined
    if info.name == current.class_name {
        return Ok(Arc::clone(current));
    }
    info.get_or_load_class(|| runtime.load_class(&info.name))
}

fn lookup_field(class: &Arc<Class>, name: &str, descriptor: &str) -> NativeResult<FieldResolve> {
    let mut current = Some(class);
    while let Some(c) = current {
        if c
            .instance_fields_info
            .iter()
            .any(|f| f.name.as_ref() == name && f.descriptor_str.as_ref() == descriptor)
        {
            let key = format!("{}.{name}:{descriptor}", c.class_name);
            let slot = c.field_layout.slot(&key).ok_or_else(|| {
                VmError::Unsupported(format!("field {key} is missing from the layout"))
            })?;
            return Ok(FieldResolve::Instance {
                class: Arc::clone(c),
                slot,
            });
        }
        if let Some(found) = lookup_static_field(c, name, descriptor) {
            return Ok(found);
        }
        current = c.super_class();
    }
    Err(Exception::new_vm_msg(NO_SUCH_FIELD_ERROR, name).into())
}

fn lookup_static_field(class: &Arc<Class>, name: &str, descriptor: &str) -> Option<FieldResolve> {
    if let Some(index) = class.static_field_index(name, descriptor) {
        return Some(FieldResolve::Static {
            class: Arc::clone(class),
            index,
        });
    }
    class
        .interfaces()
        .iter()
        .find_map(|i| lookup_static_field(i, name, descriptor))
}

fn lookup_method(
    runtime: &Runtime,
    current: &Arc<Class>,
    method_ref: &CpMethodRef,
) -> NativeResult<ResolvedMethod> {
    let owner = resolve_cp_class(runtime, current, &method_ref.class)?;
    owner
        .find_method(&method_ref.name, &method_ref.descriptor_str)
        .ok_or_else(|| {
            Exception::new_vm_msg(
                NO_SUCH_METHOD_ERROR,
                format!(
                    "'{} {}.{}'",
                    method_ref.descriptor_str,
                    owner.name().replace('/', "."),
                    method_ref.name
                ),
            )
            .into()
        })
}

/// Instance field access is only valid on the declaring class or below it.
fn check_field_holder(object: &ObjectRef, declaring: &Arc<Class>) -> NativeResult<()> {
    if is_same_or_sub_class_of(object.class(), declaring) {
        return Ok(());
    }
    Err(incompatible(format!(
        "class {} has no field declared by {}",
        object.class_name().replace('/', "."),
        declaring.name().replace('/', ".")
    )))
}

fn incompatible(message: String) -> Fault {
    Exception::new_vm_msg(INCOMPATIBLE_CLASS_CHANGE_ERROR, message).into()
}

fn non_zero<T: Default + PartialEq>(divisor: T) -> Result<T, Exception> {
    if divisor == T::default() {
        Err(Exception::new_vm_msg(ARITHMETIC_EXCEPTION, "/ by zero"))
    } else {
        Ok(divisor)
    }
}

fn bitwise_on_float() -> VmError {
    VmError::TypeMismatch {
        expected: "integral value",
        found: "floating point value",
    }
}

fn branch(taken: bool, target: u32) -> Next {
    if taken {
        Next::Jump(target as usize)
    } else {
        Next::Advance
    }
}

fn ordering_value(ordering: Ordering) -> i32 {
    match ordering {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

/// `nan` is the result when either operand is NaN.
fn fcmp<T: PartialOrd>(a: T, b: T, nan: i32) -> i32 {
    a.partial_cmp(&b).map_or(nan, ordering_value)
}

/// Numeric conversions; float to integer saturates and maps NaN to zero.
fn convert(value: Value, to: NumKind) -> Value {
    match (value, to) {
        (Value::Int(v), NumKind::Long) => Value::Long(v as i64),
        (Value::Int(v), NumKind::Float) => Value::Float(v as f32),
        (Value::Int(v), NumKind::Double) => Value::Double(v as f64),
        (Value::Long(v), NumKind::Int) => Value::Int(v as i32),
        (Value::Long(v), NumKind::Float) => Value::Float(v as f32),
        (Value::Long(v), NumKind::Double) => Value::Double(v as f64),
        (Value::Float(v), NumKind::Int) => Value::Int(v as i32),
        (Value::Float(v), NumKind::Long) => Value::Long(v as i64),
        (Value::Float(v), NumKind::Double) => Value::Double(v as f64),
        (Value::Double(v), NumKind::Int) => Value::Int(v as i32),
        (Value::Double(v), NumKind::Long) => Value::Long(v as i64),
        (Value::Double(v), NumKind::Float) => Value::Float(v as f32),
        (value, _) => value,
    }
}

fn num_kind_name(kind: NumKind) -> &'static str {
    match kind {
        NumKind::Int => "int",
        NumKind::Long => "long",
        NumKind::Float => "float",
        NumKind::Double => "double",
    }
}

/// `astore` also accepts return addresses.
fn check_kind(value: &Value, kind: ValueKind, store: bool) -> Result<(), VmError> {
    let ok = match (kind, value) {
        (ValueKind::Int, Value::Int(_))
        | (ValueKind::Long, Value::Long(_))
        | (ValueKind::Float, Value::Float(_))
        | (ValueKind::Double, Value::Double(_))
        | (ValueKind::Reference, Value::Reference(_)) => true,
        (ValueKind::Reference, Value::ReturnAddress(_)) => store,
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(VmError::TypeMismatch {
            expected: match kind {
                ValueKind::Int => "int",
                ValueKind::Long => "long",
                ValueKind::Float => "float",
                ValueKind::Double => "double",
                ValueKind::Reference => "reference",
            },
            found: value.kind_name(),
        })
    }
}

fn array_kind_value(kind: ArrayKind) -> ValueKind {
    match kind {
        ArrayKind::Long => ValueKind::Long,
        ArrayKind::Float => ValueKind::Float,
        ArrayKind::Double => ValueKind::Double,
        ArrayKind::Reference => ValueKind::Reference,
        _ => ValueKind::Int,
    }
}

fn check_array_kind(array: &ObjectRef, kind: ArrayKind) -> Result<(), VmError> {
    let component = array.class().component_type.as_ref().ok_or(VmError::TypeMismatch {
        expected: "array",
        found: "instance",
    })?;
    let ok = match kind {
        // baload and bastore serve both byte and boolean arrays
        ArrayKind::Byte | ArrayKind::Boolean => {
            matches!(component, FieldType::Byte | FieldType::Boolean)
        }
        ArrayKind::Char => matches!(component, FieldType::Char),
        ArrayKind::Short => matches!(component, FieldType::Short),
        ArrayKind::Int => matches!(component, FieldType::Int),
        ArrayKind::Long => matches!(component, FieldType::Long),
        ArrayKind::Float => matches!(component, FieldType::Float),
        ArrayKind::Double => matches!(component, FieldType::Double),
        ArrayKind::Reference => component.is_reference(),
    };
    if ok {
        Ok(())
    } else {
        Err(VmError::TypeMismatch {
            expected: "matching array component type",
            found: "other array type",
        })
    }
}

fn primitive_array_class(kind: ArrayKind) -> Option<&'static str> {
    Some(match kind {
        ArrayKind::Boolean => "[Z",
        ArrayKind::Byte => "[B",
        ArrayKind::Char => "[C",
        ArrayKind::Short => "[S",
        ArrayKind::Int => "[I",
        ArrayKind::Long => "[J",
        ArrayKind::Float => "[F",
        ArrayKind::Double => "[D",
        ArrayKind::Reference => return None,
    })
}

/// Array class name with `component` as its element class.
fn array_of(component: &str) -> String {
    if component.starts_with('[') {
        format!("[{component}")
    } else {
        format!("[L{component};")
    }
}

fn multi_array(runtime: &Runtime, name: &str, counts: &[i32]) -> NativeResult<ObjectRef> {
    let Some((&length, rest)) = counts.split_first() else {
        return Err(VmError::Unsupported(format!("{name} with no dimensions")).into());
    };
    let array = runtime.new_array(name, length)?;
    if !rest.is_empty() {
        for i in 0..length {
            let element = multi_array(runtime, &name[1..], rest)?;
            array.array_store(i, Value::from_ref(element))?;
        }
    }
    Ok(array)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_compare_nan_bias() {
        assert_eq!(fcmp(1.0f32, f32::NAN, 1), 1);
        assert_eq!(fcmp(1.0f32, f32::NAN, -1), -1);
        assert_eq!(fcmp(2.0f64, 1.0, -1), 1);
        assert_eq!(fcmp(1.0f64, 1.0, -1), 0);
    }

    #[test]
    fn test_conversions_saturate() {
        assert_eq!(convert(Value::Double(f64::NAN), NumKind::Int), Value::Int(0));
        assert_eq!(convert(Value::Float(1e20), NumKind::Int), Value::Int(i32::MAX));
        assert_eq!(convert(Value::Double(-1e300), NumKind::Long), Value::Long(i64::MIN));
        assert_eq!(convert(Value::Long(1 << 40 | 7), NumKind::Int), Value::Int(7));
        assert_eq!(convert(Value::Int(3), NumKind::Double), Value::Double(3.0));
    }

    #[test]
    fn test_array_names() {
        assert_eq!(array_of("java/lang/String"), "[Ljava/lang/String;");
        assert_eq!(array_of("[I"), "[[I");
        assert_eq!(primitive_array_class(ArrayKind::Char), Some("[C"));
    }

    #[test]
    fn test_division_by_zero() {
        assert!(non_zero(0i32).is_err());
        assert_eq!(non_zero(-1i64).unwrap(), -1);
    }
}
