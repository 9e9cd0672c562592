//! Model factory: compiled [`TypeNode`] trees → named, instantiable model types.
//!
//! Every Object-kind node becomes one [`ModelType`], including the item
//! node of each array-of-objects field. Types are named from their owning
//! field path (`People.health`, `People.addresses_item`) and kept in a
//! registry keyed by that name plus the node's structural signature, so
//! building the same schema twice hands back the same `Arc`s.
pub mod array;
pub mod instance;

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;
use thiserror::Error;

use crate::path::FieldPath;
use crate::types::{ObjectNode, TypeNode};
use crate::validate::Violation;

pub use array::ArrayField;
pub use instance::ModelInstance;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("`{type_name}` has no field `{field}`")]
    UnknownField { type_name: String, field: String },

    #[error("model `{name}` must be built from an object schema, found {found}")]
    NotAnObject { name: String, found: String },

    #[error("field `{field}` of `{type_name}` expects {expected}, found {found}")]
    ShapeMismatch { type_name: String, field: String, expected: String, found: &'static str },

    #[error("index {index} out of range for field `{field}` (len {len})")]
    IndexOutOfRange { field: String, index: usize, len: usize },

    #[error("invalid field path `{path}`: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("invalid value for field `{field}` of `{type_name}`: {}", reasons(.violations))]
    InvalidValue { type_name: String, field: String, violations: Vec<Violation> },
}

fn reasons(violations: &[Violation]) -> String {
    violations.iter().map(|v| format!("{} ({})", v.reason, v.path)).collect::<Vec<_>>().join("; ")
}

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// One composite type per object level of a schema.
#[derive(Debug)]
pub struct ModelType {
    name: String,
    node: TypeNode,                               // always `TypeNode::Object`
    children: IndexMap<String, Arc<ModelType>>,   // object + array-of-object fields
}

/// Builds model types and remembers them by structural signature.
#[derive(Debug, Default)]
pub struct ModelFactory {
    by_signature: HashMap<(String, String), Arc<ModelType>>,
    by_name: IndexMap<String, Arc<ModelType>>,
}

// ————————————————————————————————————————————————————————————————————————————
// FACTORY
// ————————————————————————————————————————————————————————————————————————————

impl ModelFactory {
    pub fn new() -> Self { Self::default() }

    pub fn build(&mut self, name: &str, node: &TypeNode) -> Result<Arc<ModelType>, ModelError> {
        let TypeNode::Object(obj) = node else {
            return Err(ModelError::NotAnObject { name: name.to_string(), found: node.label() });
        };
        let ty = self.build_object(name.to_string(), obj);
        tracing::debug!(model = name, types = self.by_name.len(), "built model");
        Ok(ty)
    }

    /// Look up a previously built type by its full name.
    pub fn get(&self, name: &str) -> Option<&Arc<ModelType>> { self.by_name.get(name) }

    pub fn types(&self) -> impl Iterator<Item = &Arc<ModelType>> { self.by_name.values() }

    fn build_object(&mut self, type_name: String, obj: &ObjectNode) -> Arc<ModelType> {
        let node = TypeNode::Object(obj.clone());
        let key = (type_name.clone(), node.signature());
        if let Some(hit) = self.by_signature.get(&key) {
            tracing::trace!(model = %type_name, "reusing registered model type");
            return Arc::clone(hit);
        }

        let mut children = IndexMap::new();
        for (field, child) in &obj.fields {
            match child {
                TypeNode::Object(nested) => {
                    let ty = self.build_object(format!("{type_name}.{field}"), nested);
                    children.insert(field.clone(), ty);
                }
                TypeNode::ArrayOfObject(item) => {
                    let ty = self.build_object(format!("{type_name}.{field}_item"), item);
                    children.insert(field.clone(), ty);
                }
                _ => {}
            }
        }

        let ty = Arc::new(ModelType { name: type_name.clone(), node, children });
        self.by_signature.insert(key, Arc::clone(&ty));
        self.by_name.insert(type_name, Arc::clone(&ty));
        ty
    }
}

// ————————————————————————————————————————————————————————————————————————————
// MODEL TYPE
// ————————————————————————————————————————————————————————————————————————————

impl ModelType {
    pub fn name(&self) -> &str { &self.name }

    /// The compiled object node this type was built from.
    pub fn node(&self) -> &TypeNode { &self.node }

    pub fn object(&self) -> &ObjectNode {
        match &self.node {
            TypeNode::Object(obj) => obj,
            _ => unreachable!("model types are only built from object nodes"),
        }
    }

    pub fn field(&self, name: &str) -> Option<&TypeNode> { self.object().fields.get(name) }

    /// Model type of an object or array-of-object field.
    pub fn child(&self, name: &str) -> Option<&Arc<ModelType>> { self.children.get(name) }

    /// Field names with their kind labels, in declaration order.
    pub fn fields(&self) -> Vec<(String, String)> {
        self.object()
            .fields
            .iter()
            .map(|(name, node)| {
                let label = match (node, self.children.get(name)) {
                    (TypeNode::ArrayOfObject(_), Some(child)) => format!("array<{}>", child.name),
                    (TypeNode::Object(_), Some(child)) => child.name.clone(),
                    _ => node.label(),
                };
                (name.clone(), label)
            })
            .collect()
    }

    /// Every enum-constrained field reachable from this type, keyed by path
    /// (array items contribute their field path without an index).
    pub fn enums(&self) -> IndexMap<String, Vec<Value>> {
        let mut out = IndexMap::new();
        collect_enums(self.object(), &FieldPath::root(), &mut out);
        out
    }

    /// All nested model types, depth-first in declaration order.
    pub fn nested_types(&self) -> Vec<Arc<ModelType>> {
        let mut out = Vec::new();
        for child in self.children.values() {
            out.push(Arc::clone(child));
            out.extend(child.nested_types());
        }
        out
    }

    pub(crate) fn unknown(&self, field: &str) -> ModelError {
        ModelError::UnknownField { type_name: self.name.clone(), field: field.to_string() }
    }

    /// Empty instance with kind-appropriate defaults.
    pub fn instance(self: &Arc<Self>) -> ModelInstance { ModelInstance::empty(Arc::clone(self)) }

    /// Defaults, then each `(field, value)` assignment in order.
    pub fn new_instance<I, K, V>(self: &Arc<Self>, fields: I) -> Result<ModelInstance, ModelError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut inst = self.instance();
        for (name, value) in fields {
            inst.set(name.as_ref(), value)?;
        }
        Ok(inst)
    }

    /// Hydrate from a plain nested mapping (the inverse of `to_dict`).
    pub fn from_dict(self: &Arc<Self>, data: &Value) -> Result<ModelInstance, ModelError> {
        let map = data.as_object().ok_or_else(|| ModelError::ShapeMismatch {
            type_name: self.name.clone(),
            field: "(root)".to_string(),
            expected: "a mapping".to_string(),
            found: crate::types::ValueKind::of(data).name(),
        })?;
        self.new_instance(map.iter().map(|(k, v)| (k.as_str(), v.clone())))
    }
}

fn collect_enums(obj: &ObjectNode, path: &FieldPath, out: &mut IndexMap<String, Vec<Value>>) {
    for (name, node) in &obj.fields {
        let here = path.key(name);
        match node {
            TypeNode::Enum(values) => { out.insert(here.to_string(), values.clone()); }
            TypeNode::ArrayOfScalar(item) => {
                if let TypeNode::Enum(values) = item.as_ref() {
                    out.insert(here.to_string(), values.clone());
                }
            }
            TypeNode::Object(nested) | TypeNode::ArrayOfObject(nested) => collect_enums(nested, &here, out),
            TypeNode::Scalar(_) | TypeNode::AnyOf(_) => {}
        }
    }
}
