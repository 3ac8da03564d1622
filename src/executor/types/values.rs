//! Runtime value types

use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};

/// Runtime value type
///
/// Serializes as plain JSON; `Absent` becomes `null` and whole numbers
/// become JSON integers.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// A missing field, an unset environment variable, or JSON `null`
    #[default]
    Absent,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<Value>),
    Record(IndexMap<String, Value>),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Absent,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Absent),
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(fields) => Value::Record(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Absent => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    serde_json::Value::from(*n as i64)
                } else {
                    serde_json::Number::from_f64(*n)
                        .map(serde_json::Value::Number)
                        .unwrap_or(serde_json::Value::Null)
                }
            }
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Record(fields) => serde_json::Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Name used in runtime error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Absent => "nothing",
            Value::Bool(_) => "a boolean",
            Value::Number(_) => "a number",
            Value::Text(_) => "text",
            Value::List(_) => "a list",
            Value::Record(_) => "a record",
        }
    }

    /// Check if value is truthy (for conditionals)
    ///
    /// Absent, false, zero, empty text and empty collections are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Absent => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::Text(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Record(fields) => !fields.is_empty(),
        }
    }

    /// `is empty` holds for absent values and empty text or collections.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Absent => true,
            Value::Text(s) => s.is_empty(),
            Value::List(items) => items.is_empty(),
            Value::Record(fields) => fields.is_empty(),
            Value::Bool(_) | Value::Number(_) => false,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    /// Text form used by interpolation, `log`, and `reject with`.
    pub fn render(&self) -> String {
        match self {
            Value::Absent => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::Text(s) => s.clone(),
            Value::List(_) | Value::Record(_) => self.to_json().to_string(),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Value::from_json(json)
    }
}

/// Whole numbers print without a fractional part.
pub fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{}", v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_conversion_keeps_field_order() {
        let value = Value::from_json(json!({"zeta": 1, "alpha": [true, null, "x"]}));
        let Value::Record(fields) = &value else {
            panic!("expected record, got {:?}", value);
        };
        let keys: Vec<&str> = fields.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
        assert_eq!(
            fields["alpha"],
            Value::List(vec![Value::Bool(true), Value::Absent, Value::text("x")])
        );
        assert_eq!(value.to_json(), json!({"zeta": 1, "alpha": [true, null, "x"]}));
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Absent.is_truthy());
        assert!(!Value::Number(0.0).is_truthy());
        assert!(!Value::text("").is_truthy());
        assert!(!Value::List(vec![]).is_truthy());
        assert!(Value::Number(-1.0).is_truthy());
        assert!(Value::text("no").is_truthy());
    }

    #[test]
    fn test_render() {
        assert_eq!(Value::Number(20.0).render(), "20");
        assert_eq!(Value::Number(2.5).render(), "2.5");
        assert_eq!(Value::Absent.render(), "");
        assert_eq!(Value::List(vec![Value::Number(1.0)]).render(), "[1]");
    }

    #[test]
    fn test_serializes_as_plain_json() {
        let value = Value::List(vec![Value::Absent, Value::Number(1.5), Value::Number(2.0)]);
        assert_eq!(serde_json::to_string(&value).unwrap(), "[null,1.5,2]");
    }
}
