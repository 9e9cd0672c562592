//! Recursive, index-aligned differ over JSON value graphs.
//!
//! - Mappings: union of keys; one-sided keys are `added` / `removed`.
//! - Arrays: compared index by index up to the shorter length; trailing
//!   elements are `added` / `removed`. Reordering is reported per index.
//! - Scalars (and mixed kinds): `changed`, with `type_changed` whenever the
//!   runtime kinds differ. Strict mode never tolerates a kind change;
//!   non-strict mode consults the [`EquivalencePolicy`].
//!
//! Works schema-free; attaching a [`TypeNode`] lets fields declared as
//! `number` treat integers and floats as one kind.
pub mod policy;

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::path::{FieldPath, Segment};
use crate::types::{ObjectNode, ScalarKind, TypeNode, ValueKind};

pub use policy::{EquivalencePolicy, EquivalenceRule};

// ------------------------------- Options ---------------------------------- //

#[derive(Debug, Clone)]
pub struct DiffOptions {
    pub strict: bool,
    /// Flat `path → entry` map when true, nested [`DiffTree`] otherwise.
    pub flat: bool,
    /// Restrict the walk to these paths and their descendants.
    pub paths: Option<Vec<FieldPath>>,
    pub policy: EquivalencePolicy,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self { strict: false, flat: true, paths: None, policy: EquivalencePolicy::default() }
    }
}

// ------------------------------- Output ----------------------------------- //

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Removed,
    Changed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffEntry {
    pub path: FieldPath,
    pub change: ChangeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new: Option<Value>,
    pub type_changed: bool,
}

/// Diff entries arranged in the shape of the compared values.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DiffTree {
    Entry(DiffEntry),
    Object(IndexMap<String, DiffTree>),
    Array(BTreeMap<usize, DiffTree>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DiffResult {
    Flat(IndexMap<String, DiffEntry>),
    Tree(DiffTree),
}

// ------------------------------- Front API -------------------------------- //

#[derive(Debug, Clone, Default)]
pub struct Differ<'a> {
    options: DiffOptions,
    schema: Option<&'a TypeNode>,
}

pub fn diff(left: &Value, right: &Value, options: &DiffOptions) -> DiffResult {
    Differ::new(options.clone()).diff(left, right)
}

impl<'a> Differ<'a> {
    pub fn new(options: DiffOptions) -> Self { Self { options, schema: None } }

    pub fn with_schema(mut self, schema: &'a TypeNode) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn diff(&self, left: &Value, right: &Value) -> DiffResult {
        let mut entries = Vec::new();
        let shape = self.schema.map_or(Shape::Any, Shape::Node);
        let root = FieldPath::root();
        match self.visit(&root) {
            Visit::Skip => {}
            visit => self.walk(left, right, &root, shape, visit, &mut entries),
        }
        tracing::debug!(entries = entries.len(), strict = self.options.strict, "diffed documents");

        if self.options.flat {
            DiffResult::Flat(entries.into_iter().map(|e| (e.path.to_string(), e)).collect())
        } else {
            let mut tree = DiffTree::Object(IndexMap::new());
            for entry in entries {
                let segments = entry.path.segments().to_vec();
                tree.insert(&segments, entry);
            }
            DiffResult::Tree(tree)
        }
    }

    fn walk(&self, left: &Value, right: &Value, path: &FieldPath, shape: Shape<'_>, visit: Visit, out: &mut Vec<DiffEntry>) {
        let lk = shape.kind_of(left);
        let rk = shape.kind_of(right);

        match (left, right) {
            (Value::Object(l), Value::Object(r)) if lk == ValueKind::Object && rk == ValueKind::Object => {
                for (key, lv) in l {
                    let here = path.key(key);
                    let Some(child_visit) = self.child_visit(visit, &here) else { continue };
                    match r.get(key) {
                        Some(rv) => self.walk(lv, rv, &here, shape.key(key), child_visit, out),
                        // a one-sided ancestor of a filter path still loses what is under it
                        None => out.push(removed(here, lv)),
                    }
                }
                for (key, rv) in r.iter().filter(|(k, _)| !l.contains_key(*k)) {
                    let here = path.key(key);
                    if self.child_visit(visit, &here).is_some() {
                        out.push(added(here, rv));
                    }
                }
            }
            (Value::Array(l), Value::Array(r)) => {
                let shared = l.len().min(r.len());
                for i in 0..l.len().max(r.len()) {
                    let here = path.index(i);
                    let Some(child_visit) = self.child_visit(visit, &here) else { continue };
                    if i < shared {
                        self.walk(&l[i], &r[i], &here, shape.index(), child_visit, out);
                    } else {
                        out.push(if i < l.len() { removed(here, &l[i]) } else { added(here, &r[i]) });
                    }
                }
            }
            // scalars and mixed kinds are leaves, reported where the walk stops
            _ => self.compare_leaf(left, right, lk, rk, path, out),
        }
    }

    fn compare_leaf(&self, left: &Value, right: &Value, lk: ValueKind, rk: ValueKind, path: &FieldPath, out: &mut Vec<DiffEntry>) {
        if lk == rk {
            if !same_value(left, right) {
                out.push(changed(path, left, right, false));
            }
            return;
        }
        if !self.options.strict && self.options.policy.equivalent(left, right) {
            return;
        }
        out.push(changed(path, left, right, true));
    }

    fn visit(&self, path: &FieldPath) -> Visit {
        let Some(filters) = &self.options.paths else { return Visit::Full };
        if filters.iter().any(|f| f.is_prefix_of(path)) {
            Visit::Full
        } else if filters.iter().any(|f| path.is_prefix_of(f)) {
            Visit::Partial
        } else {
            Visit::Skip
        }
    }

    fn child_visit(&self, parent: Visit, child: &FieldPath) -> Option<Visit> {
        match parent {
            Visit::Full => Some(Visit::Full),
            _ => match self.visit(child) {
                Visit::Skip => None,
                v => Some(v),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    Skip,
    /// On the way to a filtered path: recurse into matching containers.
    Partial,
    Full,
}

/// Schema cursor that follows the walk.
#[derive(Debug, Clone, Copy)]
enum Shape<'a> {
    Any,
    Node(&'a TypeNode),
    Fields(&'a ObjectNode),
}

impl<'a> Shape<'a> {
    fn key(self, name: &str) -> Shape<'a> {
        let obj = match self {
            Shape::Node(TypeNode::Object(obj)) | Shape::Fields(obj) => obj,
            _ => return Shape::Any,
        };
        obj.fields.get(name).map_or(Shape::Any, Shape::Node)
    }

    fn index(self) -> Shape<'a> {
        match self {
            Shape::Node(TypeNode::ArrayOfObject(obj)) => Shape::Fields(obj),
            Shape::Node(TypeNode::ArrayOfScalar(item)) => Shape::Node(item.as_ref()),
            _ => Shape::Any,
        }
    }

    fn kind_of(self, value: &Value) -> ValueKind {
        match (self, ValueKind::of(value)) {
            (Shape::Node(TypeNode::Scalar(ScalarKind::Number)), ValueKind::Integer) => ValueKind::Number,
            (Shape::Node(TypeNode::AnyOf(kinds)), ValueKind::Integer) if kinds.contains(&ScalarKind::Number) => ValueKind::Number,
            (_, kind) => kind,
        }
    }
}

impl DiffTree {
    fn insert(&mut self, segments: &[Segment], entry: DiffEntry) {
        let Some((first, rest)) = segments.split_first() else {
            *self = DiffTree::Entry(entry);
            return;
        };
        match first {
            Segment::Key(k) => {
                if !matches!(self, DiffTree::Object(_)) {
                    *self = DiffTree::Object(IndexMap::new());
                }
                if let DiffTree::Object(children) = self {
                    children
                        .entry(k.clone())
                        .or_insert_with(|| DiffTree::Object(IndexMap::new()))
                        .insert(rest, entry);
                }
            }
            Segment::Index(i) => {
                if !matches!(self, DiffTree::Array(_)) {
                    *self = DiffTree::Array(BTreeMap::new());
                }
                if let DiffTree::Array(children) = self {
                    children
                        .entry(*i)
                        .or_insert_with(|| DiffTree::Object(IndexMap::new()))
                        .insert(rest, entry);
                }
            }
        }
    }

    /// Entries in tree order.
    pub fn entries(&self) -> Vec<&DiffEntry> {
        let mut out = Vec::new();
        self.collect(&mut out);
        out
    }

    fn collect<'t>(&'t self, out: &mut Vec<&'t DiffEntry>) {
        match self {
            DiffTree::Entry(e) => out.push(e),
            DiffTree::Object(children) => children.values().for_each(|c| c.collect(out)),
            DiffTree::Array(children) => children.values().for_each(|c| c.collect(out)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&DiffTree> {
        match self {
            DiffTree::Object(children) => children.get(key),
            _ => None,
        }
    }

    pub fn at(&self, index: usize) -> Option<&DiffTree> {
        match self {
            DiffTree::Array(children) => children.get(&index),
            _ => None,
        }
    }
}

impl DiffResult {
    pub fn entries(&self) -> Vec<&DiffEntry> {
        match self {
            DiffResult::Flat(map) => map.values().collect(),
            DiffResult::Tree(tree) => tree.entries(),
        }
    }

    pub fn len(&self) -> usize { self.entries().len() }

    pub fn is_empty(&self) -> bool { self.entries().is_empty() }

    pub fn as_flat(&self) -> Option<&IndexMap<String, DiffEntry>> {
        match self {
            DiffResult::Flat(map) => Some(map),
            DiffResult::Tree(_) => None,
        }
    }

    pub fn as_tree(&self) -> Option<&DiffTree> {
        match self {
            DiffResult::Tree(tree) => Some(tree),
            DiffResult::Flat(_) => None,
        }
    }
}

// ------------------------------- Helpers ---------------------------------- //

fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) if x.is_f64() || y.is_f64() => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn added(path: FieldPath, value: &Value) -> DiffEntry {
    DiffEntry { path, change: ChangeKind::Added, old: None, new: Some(value.clone()), type_changed: false }
}

fn removed(path: FieldPath, value: &Value) -> DiffEntry {
    DiffEntry { path, change: ChangeKind::Removed, old: Some(value.clone()), new: None, type_changed: false }
}

fn changed(path: &FieldPath, old: &Value, new: &Value, type_changed: bool) -> DiffEntry {
    DiffEntry {
        path: path.clone(),
        change: ChangeKind::Changed,
        old: Some(old.clone()),
        new: Some(new.clone()),
        type_changed,
    }
}

// ------------------------------- Tests ------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::compile;
    use serde_json::json;

    fn strict() -> DiffOptions { DiffOptions { strict: true, ..DiffOptions::default() } }

    fn flat(result: &DiffResult) -> &IndexMap<String, DiffEntry> { result.as_flat().unwrap() }

    fn person() -> Value {
        json!({
            "name": "Tony",
            "age": 34,
            "tags": ["a", "b"],
            "health": { "doctor": { "name": "Strange", "phone": "1" } },
            "addresses": [ { "city": "Panama" }, { "city": "Newark" } ]
        })
    }

    #[test]
    fn identical_values_have_no_diff() {
        for opts in [strict(), DiffOptions::default(), DiffOptions { flat: false, ..strict() }] {
            assert!(diff(&person(), &person(), &opts).is_empty());
        }
        assert!(diff(&json!(null), &json!(null), &strict()).is_empty());
    }

    #[test]
    fn kind_change_is_reported_with_type_flag() {
        let result = diff(&json!({ "age": 30 }), &json!({ "age": "30" }), &strict());
        let entries = flat(&result);
        assert_eq!(entries.len(), 1);
        let e = &entries["age"];
        assert_eq!(e.change, ChangeKind::Changed);
        assert_eq!(e.old, Some(json!(30)));
        assert_eq!(e.new, Some(json!("30")));
        assert!(e.type_changed);

        // no policy: non-strict still reports it
        let result = diff(&json!({ "age": 30 }), &json!({ "age": "30" }), &DiffOptions::default());
        assert!(flat(&result)["age"].type_changed);
    }

    #[test]
    fn non_strict_policy_tolerates_equivalents() {
        let opts = DiffOptions { policy: EquivalencePolicy::new([EquivalenceRule::NumericString]), ..DiffOptions::default() };
        assert!(diff(&json!({ "age": 30 }), &json!({ "age": "30" }), &opts).is_empty());
        assert_eq!(diff(&json!({ "age": 30 }), &json!({ "age": "31" }), &opts).len(), 1);

        let strict_with_policy = DiffOptions { strict: true, ..opts };
        assert_eq!(diff(&json!({ "age": 30 }), &json!({ "age": "30" }), &strict_with_policy).len(), 1);
    }

    #[test]
    fn arrays_are_index_aligned() {
        let result = diff(&json!({ "tags": ["a", "b"] }), &json!({ "tags": ["a", "b", "c"] }), &DiffOptions::default());
        let entries = flat(&result);
        assert_eq!(entries.keys().collect::<Vec<_>>(), ["tags[2]"]);
        assert_eq!(entries["tags[2]"].change, ChangeKind::Added);
        assert_eq!(entries["tags[2]"].new, Some(json!("c")));

        let result = diff(&json!(["a", "b", "c"]), &json!(["b", "a"]), &DiffOptions::default());
        let entries = flat(&result);
        assert_eq!(entries.keys().collect::<Vec<_>>(), ["[0]", "[1]", "[2]"]);
        assert_eq!(entries["[2]"].change, ChangeKind::Removed);
    }

    #[test]
    fn keys_on_one_side_are_added_or_removed() {
        let mut right = person();
        right.as_object_mut().unwrap().remove("age");
        right["email"] = json!("t@x.io");
        right["health"]["doctor"]["phone"] = json!("2");
        let result = diff(&person(), &right, &DiffOptions::default());
        let entries = flat(&result);
        assert_eq!(entries.keys().collect::<Vec<_>>(), ["age", "health.doctor.phone", "email"]);
        assert_eq!(entries["age"].change, ChangeKind::Removed);
        assert_eq!(entries["email"].change, ChangeKind::Added);
        assert!(!entries["health.doctor.phone"].type_changed);
    }

    #[test]
    fn mixed_kinds_are_leaves() {
        let result = diff(&json!({ "health": { "x": 1 } }), &json!({ "health": "fine" }), &DiffOptions::default());
        let e = &flat(&result)["health"];
        assert!(e.type_changed);
        assert_eq!(e.old, Some(json!({ "x": 1 })));
    }

    #[test]
    fn path_filter_limits_the_walk() {
        let mut right = person();
        right["name"] = json!("Bruce");
        right["health"]["doctor"]["name"] = json!("Who");
        right["health"]["doctor"]["phone"] = json!("9");
        right["addresses"][1]["city"] = json!("Camden");

        let opts = DiffOptions {
            paths: Some(vec![FieldPath::parse("health.doctor.name").unwrap(), FieldPath::parse("addresses[1]").unwrap()]),
            ..DiffOptions::default()
        };
        let result = diff(&person(), &right, &opts);
        assert_eq!(flat(&result).keys().collect::<Vec<_>>(), ["health.doctor.name", "addresses[1].city"]);
    }

    #[test]
    fn tree_output_mirrors_the_shape() {
        let mut right = person();
        right["addresses"][1]["city"] = json!("Camden");
        right["tags"] = json!(["a"]);
        let opts = DiffOptions { flat: false, ..DiffOptions::default() };
        let result = diff(&person(), &right, &opts);
        let tree = result.as_tree().unwrap();
        let city = tree.get("addresses").and_then(|t| t.at(1)).and_then(|t| t.get("city")).unwrap();
        assert!(matches!(city, DiffTree::Entry(e) if e.new == Some(json!("Camden"))));
        let tag = tree.get("tags").and_then(|t| t.at(1)).unwrap();
        assert!(matches!(tag, DiffTree::Entry(e) if e.change == ChangeKind::Removed));
        assert_eq!(result.len(), 2);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["addresses"]["1"]["city"]["change"], "changed");
    }

    #[test]
    fn schema_merges_integer_and_number_for_number_fields() {
        let schema = compile(&json!({ "properties": {
            "score": { "bsonType": "double" },
            "age": { "bsonType": "int" }
        } }))
        .unwrap();
        let left = json!({ "score": 7, "age": 3 });
        let right = json!({ "score": 7.0, "age": 3.0 });
        let result = Differ::new(strict()).with_schema(&schema).diff(&left, &right);
        let entries = flat(&result);
        assert_eq!(entries.keys().collect::<Vec<_>>(), ["age"]);
        assert!(entries["age"].type_changed);
        assert_eq!(diff(&left, &right, &strict()).len(), 2);
    }

    #[test]
    fn filter_ancestors_that_diverge_are_reported() {
        let opts = DiffOptions { paths: Some(vec![FieldPath::parse("health.doctor.name").unwrap()]), ..strict() };
        let left = json!({ "health": { "doctor": { "name": "Strange" } }, "age": 1 });

        let gone = diff(&left, &json!({ "age": 2 }), &opts);
        let entry = &flat(&gone)["health"];
        assert_eq!(flat(&gone).len(), 1);
        assert_eq!(entry.change, ChangeKind::Removed);

        let flattened = diff(&left, &json!({ "health": "fine", "age": 1 }), &opts);
        let entry = &flat(&flattened)["health"];
        assert_eq!(flat(&flattened).len(), 1);
        assert!(entry.type_changed);

        let grown = diff(&json!({}), &left, &opts);
        assert_eq!(flat(&grown).keys().collect::<Vec<_>>(), ["health"]);
    }

    #[test]
    fn large_integers_compare_exactly() {
        let result = diff(&json!({ "id": 9007199254740993u64 }), &json!({ "id": 9007199254740992u64 }), &strict());
        assert_eq!(flat(&result).keys().collect::<Vec<_>>(), ["id"]);
        assert!(diff(&json!(2), &json!(2.0), &DiffOptions::default()).len() == 1);
        assert!(diff(&json!(1.5), &json!(1.5), &strict()).is_empty());
    }

    #[test]
    fn dotted_keys_do_not_collide_with_nesting() {
        let left = json!({ "a.b": 1, "a": { "b": 1 } });
        let right = json!({ "a.b": 2, "a": { "b": 2 } });
        let result = diff(&left, &right, &strict());
        assert_eq!(flat(&result).keys().collect::<Vec<_>>(), [r#"["a.b"]"#, "a.b"]);
    }

    #[test]
    fn root_scalars_compare_directly() {
        let result = diff(&json!(1), &json!(2), &DiffOptions::default());
        assert_eq!(flat(&result).keys().collect::<Vec<_>>(), ["(root)"]);
    }
}
