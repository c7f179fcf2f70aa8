//! value representation for retained expressions
//!
//! Variable defaults are kept as unevaluated [hcl::Expression]s. Only the structural mapping of literals is
//! defined:
//! - boolean (true/false)
//! - integer (signed i64)
//! - decimal (f64, also used for integers outside of the i64 range)
//! - string (utf-8, including templates without interpolations)
//! - array ("list" of values)
//!
//! Everything else (`null`, objects, references, function calls, operations, ...) is an [UnsupportedValue]. How
//! those map into the engine's runtime values is not decided yet.
use serde::{ser::SerializeSeq, Serializer};

/// All possible value types
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Boolean(bool),
    Integer(i64),
    Decimal(f64),
    String(String),
    Array(Vec<Value>),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} cannot be converted to a value")]
pub struct UnsupportedValue {
    pub kind: &'static str,
}

impl UnsupportedValue {
    fn new(kind: &'static str) -> Self {
        Self { kind }
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl TryFrom<&hcl::Number> for Value {
    type Error = UnsupportedValue;

    fn try_from(value: &hcl::Number) -> Result<Self, Self::Error> {
        if let Some(int) = value.as_i64() {
            return Ok(Value::Integer(int));
        }

        value
            .as_f64()
            .map(Value::Decimal)
            .ok_or_else(|| UnsupportedValue::new("a number outside of the supported range"))
    }
}

impl TryFrom<&hcl::Expression> for Value {
    type Error = UnsupportedValue;

    fn try_from(value: &hcl::Expression) -> Result<Self, Self::Error> {
        use hcl::Expression;

        match value {
            Expression::Bool(bool) => Ok((*bool).into()),
            Expression::Number(num) => num.try_into(),
            Expression::String(s) => Ok(s.as_str().into()),
            Expression::Array(array) => array
                .iter()
                .map(Value::try_from)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Expression::TemplateExpr(_) => crate::shallow::static_string(value)
                .map(Value::String)
                .ok_or_else(|| UnsupportedValue::new("a template with interpolations")),
            Expression::Parenthesis(inner) => Value::try_from(inner.as_ref()),
            Expression::Null => Err(UnsupportedValue::new("null")),
            Expression::Object(_) => Err(UnsupportedValue::new("an object")),
            Expression::Variable(_) | Expression::Traversal(_) => {
                Err(UnsupportedValue::new("a reference"))
            }
            Expression::FuncCall(_) => Err(UnsupportedValue::new("a function call")),
            _ => Err(UnsupportedValue::new("an expression")),
        }
    }
}

impl serde::ser::Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Boolean(value) => serializer.serialize_bool(*value),
            Value::Integer(value) => serializer.serialize_i64(*value),
            Value::Decimal(value) => serializer.serialize_f64(*value),
            Value::String(value) => serializer.serialize_str(value),
            Value::Array(value) => {
                let mut ser = serializer.serialize_seq(Some(value.len()))?;
                for element in value {
                    ser.serialize_element(element)?;
                }
                ser.end()
            }
        }
    }
}
