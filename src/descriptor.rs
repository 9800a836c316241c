use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::take_until,
    character::complete::{char, one_of},
    combinator::{all_consuming, map},
    multi::many0,
    sequence::delimited,
};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldDescriptor(pub FieldType);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    pub parameters: Vec<FieldType>,
    pub return_type: ReturnType,
}

pub type ReturnType = Option<FieldType>;

#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub enum FieldType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Object(String),
    Short,
    Boolean,
    Array(Box<FieldType>),
}

impl FieldType {
    /// Category-2 types take two local variable slots.
    pub fn is_long(&self) -> bool {
        matches!(self, FieldType::Long | FieldType::Double)
    }

    pub fn is_primitive(&self) -> bool {
        !self.is_reference()
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, FieldType::Object(_) | FieldType::Array(_))
    }

    pub fn slots(&self) -> usize {
        if self.is_long() { 2 } else { 1 }
    }

    pub fn descriptor(&self) -> String {
        match self {
            FieldType::Byte => "B".to_string(),
            FieldType::Char => "C".to_string(),
            FieldType::Double => "D".to_string(),
            FieldType::Float => "F".to_string(),
            FieldType::Int => "I".to_string(),
            FieldType::Long => "J".to_string(),
            FieldType::Short => "S".to_string(),
            FieldType::Boolean => "Z".to_string(),
            FieldType::Object(name) => format!("L{name};"),
            FieldType::Array(element) => format!("[{}", element.descriptor()),
        }
    }

    /// Internal class name of a reference type: `java/lang/String` or `[I`.
    pub fn class_name(&self) -> Option<String> {
        match self {
            FieldType::Object(name) => Some(name.clone()),
            FieldType::Array(_) => Some(self.descriptor()),
            _ => None,
        }
    }

    /// Inverse of [`FieldType::class_name`].
    pub fn from_class_name(name: &str) -> Option<FieldType> {
        if name.starts_with('[') {
            field_type(name)
        } else if name.is_empty() {
            None
        } else {
            Some(FieldType::Object(name.to_string()))
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Byte => f.write_str("byte"),
            FieldType::Char => f.write_str("char"),
            FieldType::Double => f.write_str("double"),
            FieldType::Float => f.write_str("float"),
            FieldType::Int => f.write_str("int"),
            FieldType::Long => f.write_str("long"),
            FieldType::Short => f.write_str("short"),
            FieldType::Boolean => f.write_str("boolean"),
            FieldType::Object(name) => f.write_str(&name.replace('/', ".")),
            FieldType::Array(element) => write!(f, "{element}[]"),
        }
    }
}

impl MethodDescriptor {
    /// Number of local variable slots taken by the parameters, excluding `this`.
    pub fn parameter_slots(&self) -> usize {
        self.parameters.iter().map(FieldType::slots).sum()
    }
}

pub fn field_type(input: &str) -> Option<FieldType> {
    parse_field_descriptor(input)
        .ok()
        .map(|(_, FieldDescriptor(field_type))| field_type)
}

pub fn method_descriptor(input: &str) -> Option<MethodDescriptor> {
    parse_method_descriptor(input).ok().map(|(_, d)| d)
}

pub fn parse_field_descriptor(input: &str) -> IResult<&str, FieldDescriptor> {
    let (input, field_type) = all_consuming(parse_field_type).parse(input)?;
    Ok((input, FieldDescriptor(field_type)))
}

pub fn parse_method_descriptor(input: &str) -> IResult<&str, MethodDescriptor> {
    let (input, (parameters, return_type)) = all_consuming((
        delimited(char('('), many0(parse_field_type), char(')')),
        parse_return_type_descriptor,
    ))
    .parse(input)?;
    Ok((
        input,
        MethodDescriptor {
            parameters,
            return_type,
        },
    ))
}

pub fn parse_return_type_descriptor(input: &str) -> IResult<&str, ReturnType> {
    alt((map(parse_field_type, Some), parse_void_type)).parse(input)
}

fn parse_field_type(input: &str) -> IResult<&str, FieldType> {
    alt((parse_base_type, parse_object_type, parse_array_type)).parse(input)
}

fn parse_base_type(input: &str) -> IResult<&str, FieldType> {
    map(one_of("BCDFIJSZ"), |ch| match ch {
        'B' => FieldType::Byte,
        'C' => FieldType::Char,
        'D' => FieldType::Double,
        'F' => FieldType::Float,
        'I' => FieldType::Int,
        'J' => FieldType::Long,
        'S' => FieldType::Short,
        _ => FieldType::Boolean,
    })
    .parse(input)
}

fn parse_object_type(input: &str) -> IResult<&str, FieldType> {
    map(delimited(char('L'), take_until(";"), char(';')), |name: &str| {
        FieldType::Object(name.to_string())
    })
    .parse(input)
}

fn parse_array_type(input: &str) -> IResult<&str, FieldType> {
    let (input, _) = char('[').parse(input)?;
    let (input, field_type) = parse_field_type(input)?;
    Ok((input, FieldType::Array(Box::new(field_type))))
}

fn parse_void_type(input: &str) -> IResult<&str, Option<FieldType>> {
    let (input, _) = char('V').parse(input)?;
    Ok((input, None))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_method_descriptor() {
        let descriptor = method_descriptor("(IJ[Ljava/lang/String;D)V").unwrap();
        assert_eq!(
            descriptor.parameters,
            vec![
                FieldType::Int,
                FieldType::Long,
                FieldType::Array(Box::new(FieldType::Object("java/lang/String".to_string()))),
                FieldType::Double,
            ]
        );
        assert_eq!(descriptor.return_type, None);
        assert_eq!(descriptor.parameter_slots(), 6);
    }

    #[test]
    fn test_reject_trailing_input() {
        assert!(field_type("II").is_none());
        assert!(method_descriptor("()VV").is_none());
        assert!(method_descriptor("(Ljava/lang/Object)V").is_none());
    }

    #[test]
    fn test_class_name_round_trip() {
        let array = FieldType::from_class_name("[[I").unwrap();
        assert_eq!(array.class_name().as_deref(), Some("[[I"));
        assert_eq!(array.to_string(), "int[][]");
        let object = FieldType::from_class_name("java/lang/Thread").unwrap();
        assert_eq!(object.descriptor(), "Ljava/lang/Thread;");
    }
}
