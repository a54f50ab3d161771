use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A runtime datum manipulated by the operand stack.
///
/// `Value` is a pure carrier: arithmetic lives in the VM. Rendering goes
/// through [`fmt::Display`], which prints the integer for `Int` and the
/// literal `none` for `Unit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Value {
    /// 64-bit signed integer.
    Int(i64),
    /// "No value" placeholder; never produced by arithmetic.
    #[default]
    Unit,
}

impl Value {
    /// Integer payload, if any.
    pub const fn as_int(&self) -> Option<i64> {
        match *self {
            Value::Int(v) => Some(v),
            Value::Unit => None,
        }
    }

    /// Short type name used in diagnostics.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Unit => "unit",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Unit => f.write_str("none"),
        }
    }
}

impl From<i64> for Value { fn from(v: i64) -> Self { Value::Int(v) } }
impl From<i32> for Value { fn from(v: i32) -> Self { Value::Int(i64::from(v)) } }
impl From<()> for Value { fn from((): ()) -> Self { Value::Unit } }

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn renders_int_and_unit() {
        assert_eq!(Value::Int(-42).to_string(), "-42");
        assert_eq!(Value::Int(0).to_string(), "0");
        assert_eq!(Value::Unit.to_string(), "none");
    }

    #[test]
    fn conversions() {
        assert_eq!(Value::from(7i64), Value::Int(7));
        assert_eq!(Value::from(()), Value::Unit);
        assert_eq!(Value::default(), Value::Unit);
        assert_eq!(Value::Int(3).as_int(), Some(3));
        assert_eq!(Value::Unit.as_int(), None);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serde_json_shape() {
        let json = serde_json::to_string(&[Value::Int(5), Value::Unit]).unwrap();
        assert_eq!(json, r#"[{"Int":5},"Unit"]"#);
        let back: Vec<Value> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vec![Value::Int(5), Value::Unit]);
    }
}
