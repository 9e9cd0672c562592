// Compiled, strongly-typed schema tree. Built once by `compile`, then read-only.

use indexmap::{IndexMap, IndexSet};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum TypeNode {
    Scalar(ScalarKind),
    AnyOf(Vec<ScalarKind>),         // multi-type field; any listed kind accepts
    Enum(Vec<Value>),               // ordered, exact-match literals
    Object(ObjectNode),
    ArrayOfScalar(Box<TypeNode>),   // any non-object item (scalar, enum, nested array)
    ArrayOfObject(ObjectNode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    String,
    Integer,
    Number,
    Boolean,
    Date,
    Binary,
    Generic,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectNode {
    pub fields: IndexMap<String, TypeNode>, // declaration order
    pub required: IndexSet<String>,         // present & non-null at validation time
}

/// Runtime kind of a JSON value, as seen by the validator and the differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Boolean,
    Integer,
    Number,
    String,
    Date,
    Binary,
    Array,
    Object,
}

// ------------------------------- TypeNode --------------------------------- //

impl TypeNode {
    pub fn as_object(&self) -> Option<&ObjectNode> {
        match self {
            TypeNode::Object(obj) | TypeNode::ArrayOfObject(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn is_object(&self) -> bool { matches!(self, TypeNode::Object(_)) }

    /// Short label used in violations and introspection listings.
    pub fn label(&self) -> String {
        match self {
            TypeNode::Scalar(kind) => kind.name().to_string(),
            TypeNode::AnyOf(kinds) => kinds.iter().map(|k| k.name()).collect::<Vec<_>>().join(" | "),
            TypeNode::Enum(values) => format!("enum {}", enum_list(values)),
            TypeNode::Object(_) => "object".to_string(),
            TypeNode::ArrayOfScalar(item) => format!("array<{}>", item.label()),
            TypeNode::ArrayOfObject(_) => "array<object>".to_string(),
        }
    }

    /// Canonical structural signature. Two nodes with the same signature
    /// describe the same shape (field order included).
    pub fn signature(&self) -> String {
        let mut out = String::new();
        self.write_signature(&mut out);
        out
    }

    fn write_signature(&self, out: &mut String) {
        match self {
            TypeNode::Scalar(kind) => out.push_str(kind.name()),
            TypeNode::AnyOf(kinds) => {
                out.push('(');
                out.push_str(&kinds.iter().map(|k| k.name()).collect::<Vec<_>>().join("|"));
                out.push(')');
            }
            TypeNode::Enum(values) => {
                out.push_str("enum");
                out.push_str(&Value::Array(values.clone()).to_string());
            }
            TypeNode::Object(obj) => {
                out.push('{');
                obj.write_signature(out);
                out.push('}');
            }
            TypeNode::ArrayOfScalar(item) => {
                out.push('[');
                item.write_signature(out);
                out.push(']');
            }
            TypeNode::ArrayOfObject(obj) => {
                out.push_str("[{");
                obj.write_signature(out);
                out.push_str("}]");
            }
        }
    }
}

impl ObjectNode {
    pub fn is_required(&self, name: &str) -> bool { self.required.contains(name) }

    fn write_signature(&self, out: &mut String) {
        for (i, (name, node)) in self.fields.iter().enumerate() {
            if i > 0 { out.push(','); }
            if self.required.contains(name) { out.push('!'); }
            out.push_str(&Value::String(name.clone()).to_string());
            out.push(':');
            node.write_signature(out);
        }
        // required names without a declaration still change validation
        for name in self.required.iter().filter(|n| !self.fields.contains_key(*n)) {
            out.push_str(",!");
            out.push_str(&Value::String(name.clone()).to_string());
        }
    }
}

// ------------------------------- ScalarKind ------------------------------- //

impl ScalarKind {
    /// Map a bsonType / JSON-Schema type name. `None` for unknown vocabulary.
    pub fn from_type_name(name: &str) -> Option<Self> {
        let kind = match name {
            "string" => ScalarKind::String,
            "int" | "long" | "integer" => ScalarKind::Integer,
            "double" | "decimal" | "number" => ScalarKind::Number,
            "bool" | "boolean" => ScalarKind::Boolean,
            "date" | "timestamp" => ScalarKind::Date,
            "binData" => ScalarKind::Binary,
            _ => return None,
        };
        Some(kind)
    }

    pub fn name(self) -> &'static str {
        match self {
            ScalarKind::String => "string",
            ScalarKind::Integer => "integer",
            ScalarKind::Number => "number",
            ScalarKind::Boolean => "boolean",
            ScalarKind::Date => "date",
            ScalarKind::Binary => "binary",
            ScalarKind::Generic => "generic",
        }
    }

    /// Does a value of runtime kind `actual` (holding `value`) satisfy this kind?
    pub fn accepts(self, actual: ValueKind, value: &Value) -> bool {
        match (self, actual) {
            (ScalarKind::Generic, _) => true,
            (_, ValueKind::Null) => true,
            (ScalarKind::String, ValueKind::String) => true,
            (ScalarKind::Integer, ValueKind::Integer) => true,
            // integral floats (30.0) pass, 30.5 does not
            (ScalarKind::Integer, ValueKind::Number) => {
                value.as_f64().is_some_and(|f| f.is_finite() && f.fract() == 0.0)
            }
            (ScalarKind::Number, ValueKind::Integer | ValueKind::Number) => true,
            (ScalarKind::Boolean, ValueKind::Boolean) => true,
            (ScalarKind::Date, ValueKind::Date) => true,
            (ScalarKind::Binary, ValueKind::Binary) => true,
            _ => false,
        }
    }

    /// Kind-appropriate default for a freshly constructed model instance.
    pub fn default_value(self) -> Value {
        match self {
            ScalarKind::String => Value::String(String::new()),
            ScalarKind::Integer => Value::from(0),
            ScalarKind::Number => Value::from(0.0),
            ScalarKind::Boolean => Value::Bool(false),
            ScalarKind::Date | ScalarKind::Binary | ScalarKind::Generic => Value::Null,
        }
    }
}

// ------------------------------- ValueKind -------------------------------- //

impl ValueKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Boolean,
            Value::Number(n) if n.is_i64() || n.is_u64() => ValueKind::Integer,
            Value::Number(_) => ValueKind::Number,
            Value::String(_) => ValueKind::String,
            Value::Array(_) => ValueKind::Array,
            Value::Object(map) if map.len() == 1 && map.contains_key("$date") => ValueKind::Date,
            Value::Object(map) if map.len() == 1 && map.contains_key("$binary") => ValueKind::Binary,
            Value::Object(_) => ValueKind::Object,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Null => "null",
            ValueKind::Boolean => "boolean",
            ValueKind::Integer => "integer",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Date => "date",
            ValueKind::Binary => "binary",
            ValueKind::Array => "array",
            ValueKind::Object => "object",
        }
    }
}

pub(crate) fn enum_list(values: &[Value]) -> String {
    let items: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    format!("[{}]", items.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn value_kinds_recognize_extended_json_wrappers() {
        assert_eq!(ValueKind::of(&json!({"$date": "2024-01-01T00:00:00Z"})), ValueKind::Date);
        assert_eq!(ValueKind::of(&json!({"$binary": "AAEC"})), ValueKind::Binary);
        assert_eq!(ValueKind::of(&json!({"$date": 1, "x": 2})), ValueKind::Object);
        assert_eq!(ValueKind::of(&json!(3)), ValueKind::Integer);
        assert_eq!(ValueKind::of(&json!(3.5)), ValueKind::Number);
    }

    #[test]
    fn integer_kind_rejects_fractional_numbers() {
        let int = ScalarKind::Integer;
        assert!(int.accepts(ValueKind::Integer, &json!(4)));
        assert!(int.accepts(ValueKind::Number, &json!(4.0)));
        assert!(!int.accepts(ValueKind::Number, &json!(4.5)));
        assert!(ScalarKind::Number.accepts(ValueKind::Integer, &json!(4)));
    }

    #[test]
    fn signature_tracks_order_and_requiredness() {
        let mut a = ObjectNode::default();
        a.fields.insert("x".into(), TypeNode::Scalar(ScalarKind::String));
        a.fields.insert("y".into(), TypeNode::Scalar(ScalarKind::Integer));
        let mut b = a.clone();
        b.required.insert("x".into());
        let mut c = ObjectNode::default();
        c.fields.insert("y".into(), TypeNode::Scalar(ScalarKind::Integer));
        c.fields.insert("x".into(), TypeNode::Scalar(ScalarKind::String));

        let sig = |o: &ObjectNode| TypeNode::Object(o.clone()).signature();
        assert_ne!(sig(&a), sig(&b));
        assert_ne!(sig(&a), sig(&c));
        assert_eq!(sig(&a), sig(&a.clone()));
    }
}
