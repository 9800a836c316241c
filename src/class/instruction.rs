/// Kind of value moved by a typed load, store or return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Int,
    Long,
    Float,
    Double,
    Reference,
}

/// Numeric operand kind of arithmetic, shift and conversion instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumKind {
    Int,
    Long,
    Float,
    Double,
}

/// Element kind of array instructions. `Byte` loads and stores also apply
/// to boolean arrays; `Boolean` only appears in `NewArray`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayKind {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Reference,
}

impl ArrayKind {
    /// Maps a `newarray` atype operand.
    pub fn from_atype(atype: u8) -> Option<Self> {
        Some(match atype {
            4 => ArrayKind::Boolean,
            5 => ArrayKind::Char,
            6 => ArrayKind::Float,
            7 => ArrayKind::Double,
            8 => ArrayKind::Byte,
            9 => ArrayKind::Short,
            10 => ArrayKind::Int,
            11 => ArrayKind::Long,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

impl Condition {
    pub fn test(self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            Condition::Eq => ordering == Equal,
            Condition::Ne => ordering != Equal,
            Condition::Lt => ordering == Less,
            Condition::Ge => ordering != Less,
            Condition::Gt => ordering == Greater,
            Condition::Le => ordering != Greater,
        }
    }
}

/// A decoded instruction. Branch operands are bytecode offsets in the AST
/// and instruction indices once linked. `u16` operands other than local
/// indices are constant pool indices.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Nop,
    AconstNull,
    /// `iconst_<i>`, `bipush` and `sipush`.
    Iconst(i32),
    Lconst(i64),
    Fconst(f32),
    Dconst(f64),
    /// `ldc`, `ldc_w` and `ldc2_w`.
    Ldc(u16),
    Load(ValueKind, u16),
    Store(ValueKind, u16),
    ArrayLoad(ArrayKind),
    ArrayStore(ArrayKind),
    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,
    Add(NumKind),
    Sub(NumKind),
    Mul(NumKind),
    Div(NumKind),
    Rem(NumKind),
    Neg(NumKind),
    Shl(NumKind),
    Shr(NumKind),
    Ushr(NumKind),
    And(NumKind),
    Or(NumKind),
    Xor(NumKind),
    Iinc(u16, i16),
    Convert(NumKind, NumKind),
    I2b,
    I2c,
    I2s,
    Lcmp,
    Fcmpl,
    Fcmpg,
    Dcmpl,
    Dcmpg,
    If(Condition, u32),
    IfIcmp(Condition, u32),
    IfAcmpEq(u32),
    IfAcmpNe(u32),
    IfNull(u32),
    IfNonNull(u32),
    Goto(u32),
    Jsr(u32),
    Ret(u16),
    TableSwitch {
        default: u32,
        low: i32,
        targets: Vec<u32>,
    },
    LookupSwitch {
        default: u32,
        pairs: Vec<(i32, u32)>,
    },
    Return(Option<ValueKind>),
    GetStatic(u16),
    PutStatic(u16),
    GetField(u16),
    PutField(u16),
    InvokeVirtual(u16),
    InvokeSpecial(u16),
    InvokeStatic(u16),
    InvokeInterface(u16),
    InvokeDynamic(u16),
    New(u16),
    NewArray(ArrayKind),
    ANewArray(u16),
    MultiANewArray(u16, u8),
    ArrayLength,
    AThrow,
    CheckCast(u16),
    InstanceOf(u16),
    MonitorEnter,
    MonitorExit,
}

impl Instruction {
    /// Rewrites every branch operand through `f`; `None` if any target is rejected.
    pub fn map_targets(&self, mut f: impl FnMut(u32) -> Option<u32>) -> Option<Instruction> {
        use Instruction::*;
        Some(match self {
            If(cond, t) => If(*cond, f(*t)?),
            IfIcmp(cond, t) => IfIcmp(*cond, f(*t)?),
            IfAcmpEq(t) => IfAcmpEq(f(*t)?),
            IfAcmpNe(t) => IfAcmpNe(f(*t)?),
            IfNull(t) => IfNull(f(*t)?),
            IfNonNull(t) => IfNonNull(f(*t)?),
            Goto(t) => Goto(f(*t)?),
            Jsr(t) => Jsr(f(*t)?),
            TableSwitch {
                default,
                low,
                targets,
            } => TableSwitch {
                default: f(*default)?,
                low: *low,
                targets: targets.iter().map(|t| f(*t)).collect::<Option<_>>()?,
            },
            LookupSwitch { default, pairs } => LookupSwitch {
                default: f(*default)?,
                pairs: pairs
                    .iter()
                    .map(|(key, t)| Some((*key, f(*t)?)))
                    .collect::<Option<_>>()?,
            },
            other => other.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_targets() {
        let switch = Instruction::LookupSwitch {
            default: 40,
            pairs: vec![(1, 10), (7, 20)],
        };
        let mapped = switch.map_targets(|t| Some(t / 10)).unwrap();
        assert_eq!(
            mapped,
            Instruction::LookupSwitch {
                default: 4,
                pairs: vec![(1, 1), (7, 2)],
            }
        );
        assert!(Instruction::Goto(3).map_targets(|_| None).is_none());
        assert_eq!(Instruction::Nop.map_targets(|_| None), Some(Instruction::Nop));
    }

    #[test]
    fn test_condition() {
        use std::cmp::Ordering;
        assert!(Condition::Ge.test(Ordering::Equal));
        assert!(!Condition::Lt.test(Ordering::Greater));
        assert!(Condition::Ne.test(Ordering::Less));
    }
}
