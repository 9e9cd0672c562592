//! # Validation
//!
//! Depth-first check of a JSON value against a compiled [`TypeNode`] tree.
//! Validation never fails: "invalid" is an ordinary outcome, reported as
//! an ordered list of [`Violation`]s (declaration order, then index order).
//!
//! Fields present in the value but absent from the schema are accepted.

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::path::FieldPath;
use crate::types::{enum_list, ObjectNode, TypeNode, ValueKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    MissingRequired,
    TypeMismatch,
    NotInEnum,
}

/// A single validation failure with structured context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub path: FieldPath,
    pub kind: ViolationKind,
    /// Description of what the schema expects at `path`.
    pub expected: String,
    /// Runtime kind of the offending value (`null` for missing fields).
    pub actual: &'static str,
    pub reason: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "  {}: {}", self.path, self.reason)
    }
}

/// Validator bound to one compiled schema.
#[derive(Debug, Clone, Copy)]
pub struct Validator<'a> {
    schema: &'a TypeNode,
}

pub fn validate(schema: &TypeNode, value: &Value) -> Vec<Violation> {
    Validator::new(schema).validate(value)
}

impl<'a> Validator<'a> {
    pub fn new(schema: &'a TypeNode) -> Self { Self { schema } }

    pub fn validate(&self, value: &Value) -> Vec<Violation> {
        let mut out = Vec::new();
        check_node(self.schema, value, &FieldPath::root(), &mut out);
        tracing::debug!(violations = out.len(), "validated document");
        out
    }

    /// One violation list per document, in input order.
    pub fn validate_all(&self, values: &[Value]) -> Vec<Vec<Violation>> {
        values.iter().map(|v| self.validate(v)).collect()
    }

    pub fn is_valid(&self, value: &Value) -> bool { self.validate(value).is_empty() }
}

// ------------------------------- Walk ------------------------------------- //

/// Violations of one field value, reported relative to `path`.
pub(crate) fn check_value(node: &TypeNode, value: &Value, path: &FieldPath) -> Vec<Violation> {
    let mut out = Vec::new();
    check_node(node, value, path, &mut out);
    out
}

fn check_node(node: &TypeNode, value: &Value, path: &FieldPath, out: &mut Vec<Violation>) {
    let actual = ValueKind::of(value);
    // absence / null is the required-check's concern
    if actual == ValueKind::Null {
        return;
    }
    match node {
        TypeNode::Scalar(kind) => {
            if !kind.accepts(actual, value) {
                out.push(mismatch(path, kind.name().to_string(), actual));
            }
        }
        TypeNode::AnyOf(kinds) => {
            if !kinds.iter().any(|kind| kind.accepts(actual, value)) {
                out.push(mismatch(path, node.label(), actual));
            }
        }
        TypeNode::Enum(allowed) => {
            if !allowed.contains(value) {
                out.push(Violation {
                    path: path.clone(),
                    kind: ViolationKind::NotInEnum,
                    expected: format!("one of {}", enum_list(allowed)),
                    actual: actual.name(),
                    reason: format!("value {value} is not one of {}", enum_list(allowed)),
                });
            }
        }
        TypeNode::Object(obj) => match value {
            Value::Object(map) if actual == ValueKind::Object => check_object(obj, map, path, out),
            _ => out.push(mismatch(path, "object".to_string(), actual)),
        },
        TypeNode::ArrayOfScalar(item) => match value {
            Value::Array(items) => {
                for (i, el) in items.iter().enumerate() {
                    check_node(item, el, &path.index(i), out);
                }
            }
            _ => out.push(mismatch(path, node.label(), actual)),
        },
        TypeNode::ArrayOfObject(obj) => match value {
            Value::Array(items) => {
                for (i, el) in items.iter().enumerate() {
                    let here = path.index(i);
                    match el {
                        Value::Null => {}
                        Value::Object(map) if ValueKind::of(el) == ValueKind::Object => check_object(obj, map, &here, out),
                        _ => out.push(mismatch(&here, "object".to_string(), ValueKind::of(el))),
                    }
                }
            }
            _ => out.push(mismatch(path, node.label(), actual)),
        },
    }
}

fn check_object(obj: &ObjectNode, map: &Map<String, Value>, path: &FieldPath, out: &mut Vec<Violation>) {
    for (name, child) in &obj.fields {
        let here = path.key(name);
        match map.get(name) {
            None | Some(Value::Null) if obj.is_required(name) => out.push(missing(&here, child.label())),
            None => {}
            Some(v) => check_node(child, v, &here, out),
        }
    }
    // required but undeclared
    for name in obj.required.iter().filter(|n| !obj.fields.contains_key(*n)) {
        if map.get(name).is_none_or(Value::is_null) {
            out.push(missing(&path.key(name), "any".to_string()));
        }
    }
}

fn mismatch(path: &FieldPath, expected: String, actual: ValueKind) -> Violation {
    Violation {
        path: path.clone(),
        kind: ViolationKind::TypeMismatch,
        reason: format!("expected {expected}, found {}", actual.name()),
        expected,
        actual: actual.name(),
    }
}

fn missing(path: &FieldPath, expected: String) -> Violation {
    Violation {
        path: path.clone(),
        kind: ViolationKind::MissingRequired,
        expected,
        actual: ValueKind::Null.name(),
        reason: "missing required field".to_string(),
    }
}
