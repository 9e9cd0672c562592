//! Schema compiler: raw `{bsonType, properties, items, required, enum}`
//! documents → [`TypeNode`] trees.
//!
//! Unknown type vocabulary degrades to [`ScalarKind::Generic`]; only
//! structurally malformed nodes (a `properties` that is not a mapping, a
//! `required` that is not a list of names, ...) abort compilation.

use indexmap::{IndexMap, IndexSet};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::path::FieldPath;
use crate::types::{ObjectNode, ScalarKind, TypeNode};

const DEFAULT_MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaCompileError {
    #[error("schema node at `{path}` must be a mapping, found {found}")]
    NotAMapping { path: FieldPath, found: &'static str },

    #[error("schema keyword `{keyword}` at `{path}` is malformed: {reason}")]
    InvalidKeyword { path: FieldPath, keyword: &'static str, reason: String },

    #[error("schema nesting at `{path}` exceeds the maximum depth of {max_depth}")]
    TooDeep { path: FieldPath, max_depth: usize },
}

#[derive(Debug, Clone, Copy)]
pub struct CompileOptions {
    pub max_depth: usize,
}

impl Default for CompileOptions {
    fn default() -> Self { Self { max_depth: DEFAULT_MAX_DEPTH } }
}

#[derive(Debug, Clone, Default)]
pub struct SchemaCompiler {
    options: CompileOptions,
}

/// Compile with default options.
pub fn compile(raw: &Value) -> Result<TypeNode, SchemaCompileError> {
    SchemaCompiler::default().compile(raw)
}

impl SchemaCompiler {
    pub fn new(options: CompileOptions) -> Self { Self { options } }

    pub fn compile(&self, raw: &Value) -> Result<TypeNode, SchemaCompileError> {
        // collection validator documents wrap the schema in `$jsonSchema`
        let raw = match raw.get("$jsonSchema") {
            Some(inner) => inner,
            None => raw,
        };
        let node = self.compile_node(raw, &FieldPath::root(), 0)?;
        tracing::debug!(signature_len = node.signature().len(), "compiled schema");
        Ok(node)
    }

    fn compile_node(&self, raw: &Value, path: &FieldPath, depth: usize) -> Result<TypeNode, SchemaCompileError> {
        if depth > self.options.max_depth {
            return Err(SchemaCompileError::TooDeep { path: path.clone(), max_depth: self.options.max_depth });
        }
        let map = raw.as_object().ok_or_else(|| SchemaCompileError::NotAMapping {
            path: path.clone(),
            found: json_kind(raw),
        })?;

        let types = declared_types(map, path)?;
        let declared = types.first().copied();

        // 1) enums win regardless of declared type
        if let Some(values) = map.get("enum") {
            let values = values.as_array().ok_or_else(|| SchemaCompileError::InvalidKeyword {
                path: path.clone(),
                keyword: "enum",
                reason: format!("expected an array, found {}", json_kind(values)),
            })?;
            return Ok(TypeNode::Enum(values.clone()));
        }

        // 2) objects, declared or implied by `properties`
        let implied_object = declared.is_none() && map.contains_key("properties");
        if declared == Some("object") || implied_object {
            return Ok(TypeNode::Object(self.compile_object(map, path, depth)?));
        }

        // 3) arrays
        if declared == Some("array") {
            let item = match map.get("items") {
                None => TypeNode::Scalar(ScalarKind::Generic),
                Some(items) if items.is_object() => self.compile_node(items, &path.key("items"), depth + 1)?,
                Some(items) => {
                    return Err(SchemaCompileError::InvalidKeyword {
                        path: path.clone(),
                        keyword: "items",
                        reason: format!("expected a mapping, found {}", json_kind(items)),
                    });
                }
            };
            return Ok(match item {
                TypeNode::Object(obj) => TypeNode::ArrayOfObject(obj),
                other => TypeNode::ArrayOfScalar(Box::new(other)),
            });
        }

        // 4) scalars; a type list accepts any of its kinds
        let mut kinds: Vec<ScalarKind> = Vec::new();
        for name in &types {
            let kind = ScalarKind::from_type_name(name).unwrap_or_else(|| {
                if *name != "objectId" {
                    tracing::warn!(%path, type_name = *name, "unknown schema type, treating as generic");
                }
                ScalarKind::Generic
            });
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        Ok(match kinds.as_slice() {
            [] => TypeNode::Scalar(ScalarKind::Generic),
            [kind] => TypeNode::Scalar(*kind),
            _ if kinds.contains(&ScalarKind::Generic) => TypeNode::Scalar(ScalarKind::Generic),
            _ => TypeNode::AnyOf(kinds),
        })
    }

    fn compile_object(&self, map: &Map<String, Value>, path: &FieldPath, depth: usize) -> Result<ObjectNode, SchemaCompileError> {
        let mut fields = IndexMap::new();
        if let Some(props) = map.get("properties") {
            let props = props.as_object().ok_or_else(|| SchemaCompileError::InvalidKeyword {
                path: path.clone(),
                keyword: "properties",
                reason: format!("expected a mapping, found {}", json_kind(props)),
            })?;
            for (name, child) in props {
                let node = self.compile_node(child, &path.key(name), depth + 1)?;
                fields.insert(name.clone(), node);
            }
        }

        let mut required = IndexSet::new();
        if let Some(list) = map.get("required") {
            let bad = |reason: String| SchemaCompileError::InvalidKeyword {
                path: path.clone(),
                keyword: "required",
                reason,
            };
            let list = list
                .as_array()
                .ok_or_else(|| bad(format!("expected an array, found {}", json_kind(list))))?;
            for name in list {
                let name = name
                    .as_str()
                    .ok_or_else(|| bad(format!("expected field names, found {}", json_kind(name))))?;
                required.insert(name.to_string());
            }
        }

        Ok(ObjectNode { fields, required })
    }
}

/// `bsonType`, falling back to `type`, with `"null"` entries dropped. The
/// first entry decides object / array structure.
fn declared_types<'a>(map: &'a Map<String, Value>, path: &FieldPath) -> Result<Vec<&'a str>, SchemaCompileError> {
    let Some(raw) = map.get("bsonType").or_else(|| map.get("type")) else {
        return Ok(Vec::new());
    };
    match raw {
        Value::String(s) if s == "null" => Ok(Vec::new()),
        Value::String(s) => Ok(vec![s.as_str()]),
        Value::Array(list) => Ok(list.iter().filter_map(Value::as_str).filter(|t| *t != "null").collect()),
        other => Err(SchemaCompileError::InvalidKeyword {
            path: path.clone(),
            keyword: "bsonType",
            reason: format!("expected a type name or list of names, found {}", json_kind(other)),
        }),
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "mapping",
    }
}

// ------------------------------- Tests ------------------------------------ //
