use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use super::array::ArrayField;
use super::{ModelError, ModelType};
use crate::diff::{DiffOptions, DiffResult, Differ};
use crate::path::{FieldPath, Segment};
use crate::types::{TypeNode, ValueKind};
use crate::validate::{check_value, validate, Violation};

/// A mutable document described by a [`ModelType`].
///
/// Object fields own their nested instance and array-of-object fields own
/// their items; nothing is shared between sibling instances.
#[derive(Debug, Clone)]
pub struct ModelInstance {
    ty: Arc<ModelType>,
    slots: IndexMap<String, Slot>,
    extras: Map<String, Value>, // `_id` and other store metadata
}

#[derive(Debug, Clone)]
enum Slot {
    Value(Value),
    Object(ModelInstance),
    Array(ArrayField),
}

impl ModelInstance {
    pub(crate) fn empty(ty: Arc<ModelType>) -> Self {
        let mut slots = IndexMap::new();
        for (name, node) in &ty.object().fields {
            let slot = match node {
                TypeNode::Scalar(kind) => Slot::Value(kind.default_value()),
                TypeNode::AnyOf(kinds) => Slot::Value(kinds.first().map_or(Value::Null, |k| k.default_value())),
                TypeNode::Enum(_) => Slot::Value(Value::Null),
                TypeNode::ArrayOfScalar(_) => Slot::Value(Value::Array(Vec::new())),
                TypeNode::Object(_) => Slot::Object(child_of(&ty, name).instance()),
                TypeNode::ArrayOfObject(_) => Slot::Array(ArrayField::new(name, Arc::clone(child_of(&ty, name)))),
            };
            slots.insert(name.clone(), slot);
        }
        Self { ty, slots, extras: Map::new() }
    }

    pub fn model_type(&self) -> &Arc<ModelType> { &self.ty }

    // ---------------------------------------------------------------------
    // field access
    // ---------------------------------------------------------------------

    /// Raw value of a scalar, enum, or scalar-array field (or `_` metadata).
    pub fn get(&self, name: &str) -> Result<&Value, ModelError> {
        match self.slots.get(name) {
            Some(Slot::Value(v)) => Ok(v),
            Some(Slot::Object(_)) => Err(self.shape(name, "a scalar field", ValueKind::Object)),
            Some(Slot::Array(_)) => Err(self.shape(name, "a scalar field", ValueKind::Array)),
            None => self.extras.get(name).ok_or_else(|| self.ty.unknown(name)),
        }
    }

    /// Assign a field. Mappings assigned to object fields and arrays of
    /// mappings assigned to array-of-object fields are hydrated.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), ModelError> {
        let value = value.into();
        let Some(node) = self.ty.field(name) else {
            if name.starts_with('_') {
                self.extras.insert(name.to_string(), value);
                return Ok(());
            }
            return Err(self.ty.unknown(name));
        };

        let slot = match node {
            TypeNode::Object(_) => {
                let child = child_of(&self.ty, name);
                match &value {
                    Value::Null => Slot::Object(child.instance()),
                    Value::Object(_) => Slot::Object(child.from_dict(&value)?),
                    other => return Err(self.shape(name, "a mapping", ValueKind::of(other))),
                }
            }
            TypeNode::ArrayOfObject(_) => {
                let mut field = ArrayField::new(name, Arc::clone(child_of(&self.ty, name)));
                match value {
                    Value::Null => {}
                    Value::Array(items) => field.replace(items)?,
                    other => return Err(self.shape(name, "an array of mappings", ValueKind::of(&other))),
                }
                Slot::Array(field)
            }
            // scalar, enum and scalar-array values are checked on assignment
            scalar => {
                let violations = check_value(scalar, &value, &FieldPath::root().key(name));
                if !violations.is_empty() {
                    return Err(ModelError::InvalidValue {
                        type_name: self.ty.name().to_string(),
                        field: name.to_string(),
                        violations,
                    });
                }
                Slot::Value(value)
            }
        };
        self.slots.insert(name.to_string(), slot);
        Ok(())
    }

    pub fn object(&self, name: &str) -> Result<&ModelInstance, ModelError> {
        match self.slots.get(name) {
            Some(Slot::Object(inst)) => Ok(inst),
            Some(other) => Err(self.shape(name, "an object field", other.kind())),
            None => Err(self.ty.unknown(name)),
        }
    }

    /// The owned nested instance; repeated calls return the same instance.
    pub fn object_mut(&mut self, name: &str) -> Result<&mut ModelInstance, ModelError> {
        let found = match self.slots.get(name) {
            Some(Slot::Object(_)) => None,
            Some(other) => Some(other.kind()),
            None => return Err(self.ty.unknown(name)),
        };
        if let Some(found) = found {
            return Err(self.shape(name, "an object field", found));
        }
        match self.slots.get_mut(name) {
            Some(Slot::Object(inst)) => Ok(inst),
            _ => Err(self.ty.unknown(name)),
        }
    }

    pub fn array(&self, name: &str) -> Result<&ArrayField, ModelError> {
        match self.slots.get(name) {
            Some(Slot::Array(items)) => Ok(items),
            Some(other) => Err(self.shape(name, "an array-of-object field", other.kind())),
            None => Err(self.ty.unknown(name)),
        }
    }

    pub fn array_mut(&mut self, name: &str) -> Result<&mut ArrayField, ModelError> {
        let found = match self.slots.get(name) {
            Some(Slot::Array(_)) => None,
            Some(other) => Some(other.kind()),
            None => return Err(self.ty.unknown(name)),
        };
        if let Some(found) = found {
            return Err(self.shape(name, "an array-of-object field", found));
        }
        match self.slots.get_mut(name) {
            Some(Slot::Array(items)) => Ok(items),
            _ => Err(self.ty.unknown(name)),
        }
    }

    /// Plain value of any field, converting nested instances.
    pub fn field_value(&self, name: &str) -> Option<Value> {
        match self.slots.get(name) {
            Some(slot) => Some(slot.to_value()),
            None => self.extras.get(name).cloned(),
        }
    }

    // ---------------------------------------------------------------------
    // dotted paths
    // ---------------------------------------------------------------------

    /// `set_path("health.primary_physician.name", "Dr. Strange")`,
    /// `set_path("addresses[0].city", "Panama")`. The last segment must be a field name.
    pub fn set_path(&mut self, path: &str, value: impl Into<Value>) -> Result<(), ModelError> {
        let parsed = parse_path(path)?;
        let Some((Segment::Key(last), parents)) = parsed.segments().split_last() else {
            return Err(invalid(path, "must end with a field name"));
        };
        let mut cur: &mut ModelInstance = self;
        let mut i = 0;
        while i < parents.len() {
            let Segment::Key(key) = &parents[i] else {
                return Err(invalid(path, "index without a field"));
            };
            if let Some(Segment::Index(n)) = parents.get(i + 1) {
                cur = cur.array_mut(key)?.get_mut_checked(*n)?;
                i += 2;
            } else {
                cur = cur.object_mut(key)?;
                i += 1;
            }
        }
        cur.set(last, value)
    }

    /// Snapshot of the value at a dotted / indexed path.
    pub fn get_path(&self, path: &str) -> Result<Value, ModelError> {
        let parsed = parse_path(path)?;
        let segments = parsed.segments();
        let mut cur: &ModelInstance = self;
        let mut i = 0;
        while i < segments.len() {
            let Segment::Key(key) = &segments[i] else {
                return Err(invalid(path, "index without a field"));
            };
            match cur.slots.get(key.as_str()) {
                Some(Slot::Object(inst)) => {
                    cur = inst;
                    i += 1;
                }
                Some(Slot::Array(items)) => match segments.get(i + 1) {
                    Some(Segment::Index(n)) => {
                        cur = items.get_checked(*n)?;
                        i += 2;
                    }
                    _ if i + 1 == segments.len() => return Ok(items.to_value()),
                    _ => return Err(invalid(path, "array fields need an index")),
                },
                Some(Slot::Value(v)) => return walk_value(v, &segments[i + 1..]).ok_or_else(|| invalid(path, "no such element")),
                None => {
                    return match cur.extras.get(key.as_str()) {
                        Some(v) => walk_value(v, &segments[i + 1..]).ok_or_else(|| invalid(path, "no such element")),
                        None => Err(cur.ty.unknown(key)),
                    };
                }
            }
        }
        Ok(cur.to_dict())
    }

    // ---------------------------------------------------------------------
    // conversion + engines
    // ---------------------------------------------------------------------

    /// Fresh nested mapping: metadata first, then declared fields in order.
    pub fn to_dict(&self) -> Value {
        let mut out = self.extras.clone();
        for (name, slot) in &self.slots {
            out.insert(name.clone(), slot.to_value());
        }
        Value::Object(out)
    }

    pub fn validate(&self) -> Vec<Violation> { validate(self.ty.node(), &self.to_dict()) }

    /// Compare this instance (left) with `other` (right) using this model's schema.
    pub fn diff(&self, other: &Value, options: &DiffOptions) -> DiffResult {
        Differ::new(options.clone())
            .with_schema(self.ty.node())
            .diff(&self.to_dict(), other)
    }

    fn shape(&self, field: &str, expected: &str, found: ValueKind) -> ModelError {
        ModelError::ShapeMismatch {
            type_name: self.ty.name().to_string(),
            field: field.to_string(),
            expected: expected.to_string(),
            found: found.name(),
        }
    }
}

impl Slot {
    fn to_value(&self) -> Value {
        match self {
            Slot::Value(v) => v.clone(),
            Slot::Object(inst) => inst.to_dict(),
            Slot::Array(items) => items.to_value(),
        }
    }

    fn kind(&self) -> ValueKind {
        match self {
            Slot::Value(v) => ValueKind::of(v),
            Slot::Object(_) => ValueKind::Object,
            Slot::Array(_) => ValueKind::Array,
        }
    }
}

fn child_of<'a>(ty: &'a Arc<ModelType>, field: &str) -> &'a Arc<ModelType> {
    match ty.child(field) {
        Some(child) => child,
        None => unreachable!("factory registers a child type for every object field"),
    }
}

fn parse_path(path: &str) -> Result<FieldPath, ModelError> {
    let parsed = FieldPath::parse(path).map_err(|e| invalid(path, &e.to_string()))?;
    if parsed.is_root() {
        return Err(invalid(path, "empty path"));
    }
    Ok(parsed)
}

fn invalid(path: &str, reason: &str) -> ModelError {
    ModelError::InvalidPath { path: path.to_string(), reason: reason.to_string() }
}

fn walk_value(value: &Value, rest: &[Segment]) -> Option<Value> {
    let mut cur = value;
    for seg in rest {
        cur = match seg {
            Segment::Key(k) => cur.get(k.as_str())?,
            Segment::Index(i) => cur.get(*i)?,
        };
    }
    Some(cur.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::people_node;
    use crate::model::ModelFactory;
    use crate::validate::ViolationKind;
    use serde_json::json;

    fn people() -> Arc<ModelType> { ModelFactory::new().build("People", &people_node()).unwrap() }

    #[test]
    fn defaults_are_kind_appropriate() {
        let p = people().instance();
        assert_eq!(
            p.to_dict(),
            json!({
                "name": "",
                "age": 0,
                "gender": null,
                "health": { "primary_physician": { "name": "", "contact": { "phone": "" } } },
                "addresses": []
            })
        );
    }

    #[test]
    fn construction_rejects_unknown_fields() {
        let err = people().new_instance([("nmae", json!("Tony"))]).unwrap_err();
        assert_eq!(err, ModelError::UnknownField { type_name: "People".into(), field: "nmae".into() });
        // store metadata passes through
        let p = people().new_instance([("_id", json!("abc")), ("name", json!("Tony"))]).unwrap();
        assert_eq!(p.get("_id").unwrap(), "abc");
    }

    #[test]
    fn fluent_nested_mutation() {
        let mut p = people().instance();
        p.object_mut("health").unwrap()
            .object_mut("primary_physician").unwrap()
            .set("name", "Dr. Strange").unwrap();
        p.set_path("health.primary_physician.contact.phone", "123-456-7890").unwrap();
        assert_eq!(p.get_path("health.primary_physician.name").unwrap(), "Dr. Strange");
        let physician = p.object("health").unwrap().object("primary_physician").unwrap();
        assert_eq!(physician.object("contact").unwrap().get("phone").unwrap(), "123-456-7890");
    }

    #[test]
    fn nested_objects_are_never_aliased() {
        let ty = people();
        let mut a = ty.instance();
        let b = ty.instance();
        a.set_path("health.primary_physician.name", "Dr. Who").unwrap();
        assert_eq!(b.get_path("health.primary_physician.name").unwrap(), "");
        assert_eq!(a.get_path("health.primary_physician.name").unwrap(), "Dr. Who");
    }

    #[test]
    fn array_add_and_indexed_paths() {
        let mut p = people().instance();
        p.array_mut("addresses").unwrap().add([("type", json!("Home")), ("city", json!("Panama"))]).unwrap();
        p.set_path("addresses[0].contact.phone", "555").unwrap();
        assert_eq!(p.get_path("addresses[0].city").unwrap(), "Panama");
        assert_eq!(p.get_path("addresses[0].contact.phone").unwrap(), "555");
        assert!(matches!(p.set_path("addresses[3].city", "x"), Err(ModelError::IndexOutOfRange { .. })));
    }

    #[test]
    fn round_trip_through_dicts() {
        let ty = people();
        let data = json!({
            "_id": "p-1",
            "name": "Tony Pajama",
            "age": 34,
            "gender": "Male",
            "health": { "primary_physician": { "name": "Dr. Strange", "contact": { "phone": "123" } } },
            "addresses": [ { "type": "Home", "city": "Panama", "contact": { "phone": "1" } } ]
        });
        let m = ty.from_dict(&data).unwrap();
        assert_eq!(m.to_dict(), data);
        let again = ty.from_dict(&m.to_dict()).unwrap();
        assert_eq!(again.to_dict(), m.to_dict());
        assert_eq!(again.validate(), m.validate());
        assert!(m.validate().is_empty());
    }

    #[test]
    fn partial_dicts_are_filled_with_defaults() {
        let m = people().from_dict(&json!({ "name": "X", "health": {} })).unwrap();
        assert_eq!(m.get_path("health.primary_physician.contact.phone").unwrap(), "");
    }

    #[test]
    fn shape_mismatches_are_rejected() {
        let mut p = people().instance();
        assert!(matches!(p.set("health", "sick"), Err(ModelError::ShapeMismatch { .. })));
        assert!(matches!(p.set("addresses", json!([1])), Err(ModelError::ShapeMismatch { .. })));
        assert!(matches!(p.get("health"), Err(ModelError::ShapeMismatch { .. })));
        assert!(matches!(p.set_path("name.first", "x"), Err(ModelError::ShapeMismatch { .. })));
    }

    #[test]
    fn assignments_reject_wrong_kinds_and_enum_outsiders() {
        let mut p = people().new_instance([("name", "Tony")]).unwrap();

        let err = p.set("age", "34").unwrap_err();
        assert_eq!(p.get("age").unwrap(), 0);
        match &err {
            ModelError::InvalidValue { type_name, field, violations } => {
                assert_eq!((type_name.as_str(), field.as_str()), ("People", "age"));
                assert_eq!(violations[0].kind, ViolationKind::TypeMismatch);
                assert_eq!(violations[0].path.to_string(), "age");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("expected integer, found string"));

        let err = p.set("gender", "Rabbit").unwrap_err();
        assert!(matches!(&err, ModelError::InvalidValue { violations, .. } if violations[0].kind == ViolationKind::NotInEnum));
        assert_eq!(p.get("gender").unwrap(), &Value::Null);

        // null clears, required-ness is left to validate()
        p.set("name", Value::Null).unwrap();
        p.set("gender", "Female").unwrap();
        let kinds: Vec<ViolationKind> = p.validate().iter().map(|v| v.kind).collect();
        assert_eq!(kinds, [ViolationKind::MissingRequired]);
    }

    #[test]
    fn construction_checks_values_too() {
        let ty = people();
        assert!(matches!(ty.new_instance([("gender", "Rabbit")]), Err(ModelError::InvalidValue { .. })));
        let err = ty.from_dict(&json!({ "name": "X", "addresses": [ { "type": "Moon" } ] })).unwrap_err();
        assert!(matches!(err, ModelError::InvalidValue { field, .. } if field == "type"));
    }

    #[test]
    fn instance_diff_uses_plain_values() {
        let p = people().new_instance([("name", json!("Alice")), ("age", json!(30))]).unwrap();
        let mut other = p.to_dict();
        other["age"] = json!(50);
        let result = p.diff(&other, &DiffOptions { strict: true, ..DiffOptions::default() });
        let flat = result.as_flat().unwrap();
        assert_eq!(flat.len(), 1);
        assert_eq!(flat["age"].old, Some(json!(30)));
    }
}
