use crate::descriptor::FieldType;
use crate::runtime::{Exception, Object, VmError, famous_classes::NULL_POINTER_EXCEPTION};
use std::sync::Arc;

pub type ObjectRef = Arc<Object>;

/// One operand stack entry or local variable slot.
///
/// Longs and doubles are a single stack entry but two local slots; the
/// second slot holds `Top`.
#[derive(Debug, Clone, Default)]
pub enum Value {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Reference(Option<ObjectRef>),
    ReturnAddress(usize),
    #[default]
    Top,
}

macro_rules! value_accessors {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        paste::paste! {
            impl Value {
                $(
                    pub fn [<as_ $variant:lower>](&self) -> Result<$ty, VmError> {
                        match self {
                            Value::$variant(v) => Ok(*v),
                            other => Err(VmError::TypeMismatch {
                                expected: stringify!([<$variant:lower>]),
                                found: other.kind_name(),
                            }),
                        }
                    }
                )*
            }
        }
    };
}

value_accessors!(Int => i32, Long => i64, Float => f32, Double => f64, ReturnAddress => usize);

impl Value {
    pub fn null() -> Self {
        Value::Reference(None)
    }

    pub fn from_ref(object: ObjectRef) -> Self {
        Value::Reference(Some(object))
    }

    pub fn default_for(field_type: &FieldType) -> Self {
        match field_type {
            FieldType::Long => Value::Long(0),
            FieldType::Float => Value::Float(0.0),
            FieldType::Double => Value::Double(0.0),
            FieldType::Object(_) | FieldType::Array(_) => Value::Reference(None),
            _ => Value::Int(0),
        }
    }

    pub fn is_long(&self) -> bool {
        matches!(self, Value::Long(_) | Value::Double(_))
    }

    pub fn slots(&self) -> usize {
        if self.is_long() { 2 } else { 1 }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Reference(_) => "reference",
            Value::ReturnAddress(_) => "returnaddress",
            Value::Top => "top",
        }
    }

    pub fn as_reference(&self) -> Result<Option<ObjectRef>, VmError> {
        match self {
            Value::Reference(r) => Ok(r.clone()),
            other => Err(VmError::TypeMismatch {
                expected: "reference",
                found: other.kind_name(),
            }),
        }
    }

    /// The referenced object, or a `NullPointerException`.
    pub fn as_object(&self) -> crate::runtime::NativeResult<ObjectRef> {
        self.as_reference()?
            .ok_or_else(|| Exception::new_vm(NULL_POINTER_EXCEPTION).into())
    }

    pub fn as_bool(&self) -> Result<bool, VmError> {
        Ok(self.as_int()? != 0)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Int(value as i32)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Long(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Float(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<ObjectRef> for Value {
    fn from(value: ObjectRef) -> Self {
        Value::Reference(Some(value))
    }
}

impl From<Option<ObjectRef>> for Value {
    fn from(value: Option<ObjectRef>) -> Self {
        Value::Reference(value)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::Reference(None), Value::Reference(None)) => true,
            (Value::Reference(Some(a)), Value::Reference(Some(b))) => Arc::ptr_eq(a, b),
            (Value::ReturnAddress(a), Value::ReturnAddress(b)) => a == b,
            (Value::Top, Value::Top) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_accessors() {
        assert_eq!(Value::Int(3).as_int(), Ok(3));
        assert_eq!(Value::Long(-1).as_long(), Ok(-1));
        assert_eq!(
            Value::Float(1.0).as_int(),
            Err(VmError::TypeMismatch {
                expected: "int",
                found: "float",
            })
        );
        assert!(Value::Top.as_reference().is_err());
    }

    #[test]
    fn test_null_object_is_npe() {
        let Err(crate::runtime::Fault::Throw(exception)) = Value::null().as_object() else {
            panic!("expected a NullPointerException");
        };
        assert_eq!(&*exception.class_name(), NULL_POINTER_EXCEPTION);
    }

    #[test]
    fn test_defaults_and_width() {
        assert_eq!(Value::default_for(&FieldType::Double), Value::Double(0.0));
        assert_eq!(Value::default_for(&FieldType::Boolean), Value::Int(0));
        assert!(Value::Long(0).is_long());
        assert_eq!(Value::Float(0.0).slots(), 1);
    }
}
