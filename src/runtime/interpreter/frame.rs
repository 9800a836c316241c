use crate::runtime::{Class, Code, ObjectRef, ResolvedMethod, Value, VmError};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameKind {
    Method,
    /// Runs `<clinit>`; returning resumes the caller at the instruction that
    /// triggered initialization instead of after it.
    ClassInit,
}

pub(crate) struct Frame {
    pub(crate) method: ResolvedMethod,
    pub(crate) code: Arc<Code>,
    pub(crate) pc: usize,
    pub(crate) locals: Vec<Value>,
    pub(crate) stack: OperandStack,
    // monitors entered by this frame and not yet exited, in entry order
    pub(crate) monitors: Vec<ObjectRef>,
    pub(crate) kind: FrameKind,
    pub(crate) previous_frame: Option<Box<Frame>>,
}

impl Frame {
    /// A frame for `method` with `args` (receiver first) laid out in the
    /// local slots.
    pub(crate) fn new(
        method: ResolvedMethod,
        args: Vec<Value>,
        kind: FrameKind,
    ) -> Result<Frame, VmError> {
        let code = method.method().code.clone().ok_or_else(|| {
            VmError::Unsupported(format!("{} has no bytecode", method.qualified_name()))
        })?;
        let mut locals = vec![Value::Top; code.max_locals];
        let mut slot = 0;
        for arg in args {
            let width = arg.slots();
            if slot + width > locals.len() {
                return Err(VmError::InvalidLocal {
                    index: slot + width - 1,
                    max: locals.len(),
                });
            }
            locals[slot] = arg;
            slot += width;
        }
        Ok(Frame {
            stack: OperandStack::new(code.max_stack),
            code,
            method,
            pc: 0,
            locals,
            monitors: vec![],
            kind,
            previous_frame: None,
        })
    }

    pub(crate) fn class(&self) -> &Arc<Class> {
        &self.method.class
    }

    pub(crate) fn load(&self, index: u16) -> Result<&Value, VmError> {
        self.locals.get(index as usize).ok_or(VmError::InvalidLocal {
            index: index as usize,
            max: self.locals.len(),
        })
    }

    /// Category-2 values also claim the following slot. Overwriting the
    /// second half of a category-2 value invalidates the whole value.
    pub(crate) fn store(&mut self, index: u16, value: Value) -> Result<(), VmError> {
        let index = index as usize;
        let width = value.slots();
        if index + width > self.locals.len() {
            return Err(VmError::InvalidLocal {
                index: index + width - 1,
                max: self.locals.len(),
            });
        }
        if width == 2 {
            self.locals[index + 1] = Value::Top;
        }
        if let Some(previous) = index.checked_sub(1) {
            if self.locals[previous].slots() == 2 {
                self.locals[previous] = Value::Top;
            }
        }
        self.locals[index] = value;
        Ok(())
    }
}

/// Typed operand stack bounded by `max_stack` slots.
pub(crate) struct OperandStack {
    values: Vec<Value>,
    depth: usize,
    max: usize,
}

macro_rules! typed_pop {
    ($($kind:ident => $ty:ty),* $(,)?) => {
        paste::paste! {
            $(
                pub(crate) fn [<pop_ $kind>](&mut self) -> Result<$ty, VmError> {
                    self.pop()?.[<as_ $kind>]()
                }
            )*
        }
    };
}

impl OperandStack {
    pub(crate) fn new(max: usize) -> Self {
        Self {
            values: Vec::with_capacity(max),
            depth: 0,
            max,
        }
    }

    pub(crate) fn push(&mut self, value: Value) -> Result<(), VmError> {
        let depth = self.depth + value.slots();
        if depth > self.max {
            return Err(VmError::StackOverflow { max: self.max });
        }
        self.depth = depth;
        self.values.push(value);
        Ok(())
    }

    pub(crate) fn pop(&mut self) -> Result<Value, VmError> {
        let value = self.values.pop().ok_or(VmError::StackUnderflow)?;
        self.depth -= value.slots();
        Ok(value)
    }

    typed_pop!(
        int => i32,
        long => i64,
        float => f32,
        double => f64,
        reference => Option<ObjectRef>,
    );

    /// The entry `n` below the top.
    pub(crate) fn peek(&self, n: usize) -> Result<&Value, VmError> {
        self.values
            .len()
            .checked_sub(n + 1)
            .and_then(|i| self.values.get(i))
            .ok_or(VmError::StackUnderflow)
    }

    /// Pops the top `n` entries, returned bottom first.
    pub(crate) fn pop_args(&mut self, n: usize) -> Result<Vec<Value>, VmError> {
        let start = self.values.len().checked_sub(n).ok_or(VmError::StackUnderflow)?;
        let args: Vec<Value> = self.values.drain(start..).collect();
        self.depth -= args.iter().map(Value::slots).sum::<usize>();
        Ok(args)
    }

    /// Pops entries covering exactly `slots` slots, returned bottom first.
    /// Splitting a category-2 value is a fatal error.
    pub(crate) fn pop_slots(&mut self, slots: usize) -> Result<Vec<Value>, VmError> {
        let mut taken = 0;
        let mut values = vec![];
        while taken < slots {
            let value = self.pop()?;
            taken += value.slots();
            values.push(value);
        }
        if taken != slots {
            return Err(VmError::TypeMismatch {
                expected: "category 1 value",
                found: "category 2 value",
            });
        }
        values.reverse();
        Ok(values)
    }

    pub(crate) fn push_all(&mut self, values: &[Value]) -> Result<(), VmError> {
        for value in values {
            self.push(value.clone())?;
        }
        Ok(())
    }

    pub(crate) fn clear(&mut self) {
        self.values.clear();
        self.depth = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{ClassBuilder, CodeAst, Instruction};
    use crate::consts::MethodAccessFlag;
    use crate::runtime::test_support::runtime_with;

    fn frame_with_locals(max_locals: u16) -> Frame {
        let mut class = ClassBuilder::new("Locals");
        class.method(
            MethodAccessFlag::PUBLIC | MethodAccessFlag::STATIC,
            "run",
            "()V",
            CodeAst::new(0, max_locals, vec![Instruction::Return(None)]),
        );
        let runtime = runtime_with(vec![class.build()]);
        let method = runtime
            .load_class("Locals")
            .unwrap()
            .find_method("run", "()V")
            .unwrap();
        Frame::new(method, vec![], FrameKind::Method).unwrap()
    }

    #[test]
    fn test_store_over_second_half_clears_long() {
        let mut frame = frame_with_locals(3);
        frame.store(0, Value::Long(7)).unwrap();
        assert_eq!(frame.load(0).unwrap(), &Value::Long(7));

        frame.store(1, Value::Int(1)).unwrap();
        assert_eq!(frame.load(0).unwrap(), &Value::Top);
        assert_eq!(frame.load(1).unwrap(), &Value::Int(1));

        frame.store(1, Value::Double(2.0)).unwrap();
        assert_eq!(frame.load(0).unwrap(), &Value::Top);
        assert_eq!(frame.load(2).unwrap(), &Value::Top);
        assert!(frame.store(2, Value::Long(1)).is_err());
    }

    #[test]
    fn test_stack_bounds_count_slots() {
        let mut stack = OperandStack::new(3);
        stack.push(Value::Long(1)).unwrap();
        stack.push(Value::Int(2)).unwrap();
        assert_eq!(
            stack.push(Value::Int(3)),
            Err(VmError::StackOverflow { max: 3 })
        );
        assert_eq!(stack.pop_int(), Ok(2));
        assert_eq!(stack.pop_long(), Ok(1));
        assert_eq!(stack.pop(), Err(VmError::StackUnderflow));
    }

    #[test]
    fn test_pop_slots_respects_categories() {
        let mut stack = OperandStack::new(4);
        stack.push(Value::Int(1)).unwrap();
        stack.push(Value::Int(2)).unwrap();
        assert_eq!(stack.pop_slots(2).unwrap(), vec![Value::Int(1), Value::Int(2)]);

        stack.push(Value::Int(1)).unwrap();
        stack.push(Value::Double(2.0)).unwrap();
        assert_eq!(stack.pop_slots(2).unwrap(), vec![Value::Double(2.0)]);
        assert!(stack.pop_slots(1).is_ok());

        stack.push(Value::Long(5)).unwrap();
        assert!(stack.pop_slots(1).is_err());
    }

    #[test]
    fn test_pop_args_order() {
        let mut stack = OperandStack::new(4);
        for i in 0..3 {
            stack.push(Value::Int(i)).unwrap();
        }
        assert_eq!(stack.pop_args(2).unwrap(), vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(stack.peek(0).unwrap(), &Value::Int(0));
        assert!(stack.peek(1).is_err());
        assert!(stack.pop_args(2).is_err());
    }
}
