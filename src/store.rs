//! Document-store boundary and the glue that ties it to compiled models.
//!
//! [`DocumentStore`] is the persistence seam; [`MemoryStore`] and
//! [`SchemaDir`] are the in-tree implementations. [`Collection`] runs the
//! lifecycle hooks around each write and hydrates whatever comes back.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::compile::{compile, SchemaCompileError};
use crate::hooks::{HookError, HookEvent, Hooks};
use crate::model::{ModelError, ModelFactory, ModelInstance, ModelType};

pub type Document = Map<String, Value>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no schema registered for collection `{0}`")]
    NoSchema(String),

    #[error("document `{id}` not found in `{collection}`")]
    NotFound { collection: String, id: Value },

    #[error("document in `{0}` has no `_id`")]
    MissingId(String),

    #[error("failed to read `{path}`: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("invalid schema file `{path}`: {message}")]
    BadSchemaFile { path: PathBuf, message: String },

    #[error(transparent)]
    Compile(#[from] SchemaCompileError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Hook(#[from] HookError),
}

// ————————————————————————————————————————————————————————————————————————————
// STORE SEAM
// ————————————————————————————————————————————————————————————————————————————

pub trait DocumentStore {
    /// Raw validator document for a collection (`$jsonSchema` wrapper allowed).
    fn fetch_schema(&self, collection: &str) -> Result<Value, StoreError>;

    /// Store a document without an `_id`; returns the assigned id.
    fn insert(&mut self, collection: &str, doc: Document) -> Result<Value, StoreError>;

    fn replace(&mut self, collection: &str, id: &Value, doc: Document) -> Result<(), StoreError>;

    fn delete(&mut self, collection: &str, id: &Value) -> Result<(), StoreError>;

    /// Documents whose top-level fields equal every entry of `filter`.
    fn find(&self, collection: &str, filter: &Document) -> Result<Vec<Document>, StoreError>;
}

/// In-memory store; documents keyed by `_id`, ids assigned sequentially.
#[derive(Debug, Default)]
pub struct MemoryStore {
    schemas: IndexMap<String, Value>,
    collections: IndexMap<String, IndexMap<String, Document>>,
    next_id: u64,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    pub fn with_schema(mut self, collection: &str, schema: Value) -> Self {
        self.schemas.insert(collection.to_string(), schema);
        self
    }

    pub fn len(&self, collection: &str) -> usize { self.collections.get(collection).map_or(0, IndexMap::len) }

    fn docs_mut(&mut self, collection: &str) -> &mut IndexMap<String, Document> {
        self.collections.entry(collection.to_string()).or_default()
    }
}

impl DocumentStore for MemoryStore {
    fn fetch_schema(&self, collection: &str) -> Result<Value, StoreError> {
        self.schemas
            .get(collection)
            .cloned()
            .ok_or_else(|| StoreError::NoSchema(collection.to_string()))
    }

    fn insert(&mut self, collection: &str, mut doc: Document) -> Result<Value, StoreError> {
        self.next_id += 1;
        let id = Value::String(format!("{collection}-{}", self.next_id));
        doc.insert("_id".to_string(), id.clone());
        self.docs_mut(collection).insert(id_key(&id), doc);
        Ok(id)
    }

    fn replace(&mut self, collection: &str, id: &Value, mut doc: Document) -> Result<(), StoreError> {
        let slot = self
            .docs_mut(collection)
            .get_mut(&id_key(id))
            .ok_or_else(|| StoreError::NotFound { collection: collection.to_string(), id: id.clone() })?;
        doc.insert("_id".to_string(), id.clone());
        *slot = doc;
        Ok(())
    }

    fn delete(&mut self, collection: &str, id: &Value) -> Result<(), StoreError> {
        match self.docs_mut(collection).shift_remove(&id_key(id)) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound { collection: collection.to_string(), id: id.clone() }),
        }
    }

    fn find(&self, collection: &str, filter: &Document) -> Result<Vec<Document>, StoreError> {
        let Some(docs) = self.collections.get(collection) else { return Ok(Vec::new()) };
        Ok(docs.values().filter(|doc| matches_filter(doc, filter)).cloned().collect())
    }
}

/// Reads `<dir>/<collection>.json` for schemas and keeps documents in memory.
#[derive(Debug)]
pub struct SchemaDir {
    dir: PathBuf,
    docs: MemoryStore,
}

impl SchemaDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self { Self { dir: dir.into(), docs: MemoryStore::new() } }

    pub fn schema_path(&self, collection: &str) -> PathBuf { self.dir.join(format!("{collection}.json")) }
}

impl DocumentStore for SchemaDir {
    fn fetch_schema(&self, collection: &str) -> Result<Value, StoreError> {
        let path = self.schema_path(collection);
        if !path.exists() {
            return Err(StoreError::NoSchema(collection.to_string()));
        }
        load_schema_file(&path)
    }

    fn insert(&mut self, collection: &str, doc: Document) -> Result<Value, StoreError> { self.docs.insert(collection, doc) }

    fn replace(&mut self, collection: &str, id: &Value, doc: Document) -> Result<(), StoreError> {
        self.docs.replace(collection, id, doc)
    }

    fn delete(&mut self, collection: &str, id: &Value) -> Result<(), StoreError> { self.docs.delete(collection, id) }

    fn find(&self, collection: &str, filter: &Document) -> Result<Vec<Document>, StoreError> { self.docs.find(collection, filter) }
}

pub fn load_schema_file(path: &Path) -> Result<Value, StoreError> {
    let bytes = std::fs::read(path).map_err(|source| StoreError::Io { path: path.to_path_buf(), source })?;
    crate::path_de::from_slice_with_path(&bytes).map_err(|e| StoreError::BadSchemaFile {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

// ————————————————————————————————————————————————————————————————————————————
// COLLECTION
// ————————————————————————————————————————————————————————————————————————————

/// A named collection bound to its compiled model and hooks.
#[derive(Debug)]
pub struct Collection<S> {
    name: String,
    store: S,
    model: Arc<ModelType>,
    hooks: Hooks,
}

impl<S: DocumentStore> Collection<S> {
    /// Fetch the collection's schema, compile it and build its model type.
    pub fn open(store: S, name: &str) -> Result<Self, StoreError> {
        let raw = store.fetch_schema(name)?;
        let node = compile(&raw)?;
        let model = ModelFactory::new().build(&model_name(name), &node)?;
        tracing::debug!(collection = name, model = model.name(), "opened collection");
        Ok(Self { name: name.to_string(), store, model, hooks: Hooks::new() })
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn model(&self) -> &Arc<ModelType> { &self.model }

    pub fn hooks_mut(&mut self) -> &mut Hooks { &mut self.hooks }

    pub fn store(&self) -> &S { &self.store }

    /// PreSave, insert (no `_id` yet) or replace, PostSave. A new `_id` is
    /// written back onto the instance.
    pub fn save(&mut self, instance: &mut ModelInstance) -> Result<(), StoreError> {
        self.hooks.run(HookEvent::PreSave, instance)?;
        let mut doc = to_document(instance);
        match doc.remove("_id") {
            Some(id) if !id.is_null() => self.store.replace(&self.name, &id, doc)?,
            _ => {
                let id = self.store.insert(&self.name, doc)?;
                instance.set("_id", id)?;
            }
        }
        self.hooks.run(HookEvent::PostSave, instance)?;
        Ok(())
    }

    pub fn delete(&mut self, instance: &mut ModelInstance) -> Result<(), StoreError> {
        let id = match instance.field_value("_id") {
            Some(id) if !id.is_null() => id,
            _ => return Err(StoreError::MissingId(self.name.clone())),
        };
        self.hooks.run(HookEvent::PreDelete, instance)?;
        self.store.delete(&self.name, &id)?;
        self.hooks.run(HookEvent::PostDelete, instance)?;
        Ok(())
    }

    /// Hydrated instances whose top-level fields equal `filter`.
    pub fn find(&self, filter: &Value) -> Result<Vec<ModelInstance>, StoreError> {
        let filter = filter.as_object().cloned().unwrap_or_default();
        self.store
            .find(&self.name, &filter)?
            .into_iter()
            .map(|doc| self.model.from_dict(&Value::Object(doc)).map_err(StoreError::from))
            .collect()
    }

    pub fn find_one(&self, filter: &Value) -> Result<Option<ModelInstance>, StoreError> {
        Ok(self.find(filter)?.into_iter().next())
    }

    pub fn find_by_id(&self, id: &Value) -> Result<Option<ModelInstance>, StoreError> {
        let mut filter = Map::new();
        filter.insert("_id".to_string(), id.clone());
        self.find_one(&Value::Object(filter))
    }
}

// ------------------------------- Helpers ---------------------------------- //

/// `people` → `People`, `user_accounts` → `UserAccounts`.
fn model_name(collection: &str) -> String {
    collection
        .split(['_', '-', '.'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

fn to_document(instance: &ModelInstance) -> Document {
    match instance.to_dict() {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}

fn id_key(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn matches_filter(doc: &Document, filter: &Document) -> bool {
    filter.iter().all(|(k, v)| doc.get(k) == Some(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::Reject;
    use serde_json::json;

    fn schema() -> Value {
        json!({ "$jsonSchema": {
            "bsonType": "object",
            "required": ["name"],
            "properties": {
                "name": { "bsonType": "string" },
                "age": { "bsonType": "int" },
                "health": { "bsonType": "object", "properties": { "blood": { "bsonType": "string" } } }
            }
        } })
    }

    fn people() -> Collection<MemoryStore> {
        Collection::open(MemoryStore::new().with_schema("people", schema()), "people").unwrap()
    }

    #[test]
    fn open_compiles_and_names_the_model() {
        let people = people();
        assert_eq!(people.model().name(), "People");
        assert_eq!(people.model().child("health").unwrap().name(), "People.health");
        assert!(matches!(Collection::open(MemoryStore::new(), "nope"), Err(StoreError::NoSchema(_))));
        assert_eq!(model_name("user_accounts"), "UserAccounts");
    }

    #[test]
    fn save_inserts_then_replaces() {
        let mut people = people();
        let mut tony = people.model().new_instance([("name", json!("Tony")), ("age", json!(34))]).unwrap();
        people.save(&mut tony).unwrap();
        let id = tony.get("_id").unwrap().clone();
        assert_eq!(people.store().len("people"), 1);

        tony.set("age", 35).unwrap();
        people.save(&mut tony).unwrap();
        assert_eq!(people.store().len("people"), 1);

        let found = people.find_by_id(&id).unwrap().unwrap();
        assert_eq!(found.get("age").unwrap(), 35);
        assert_eq!(found.to_dict(), tony.to_dict());
    }

    #[test]
    fn find_filters_on_top_level_fields() {
        let mut people = people();
        for (name, age) in [("Tony", 34), ("Pepper", 33), ("Happy", 34)] {
            let mut p = people.model().new_instance([("name", json!(name)), ("age", json!(age))]).unwrap();
            people.save(&mut p).unwrap();
        }
        let names: Vec<Value> = people
            .find(&json!({ "age": 34 }))
            .unwrap()
            .iter()
            .map(|p| p.get("name").unwrap().clone())
            .collect();
        assert_eq!(names, [json!("Tony"), json!("Happy")]);
        assert_eq!(people.find(&json!({})).unwrap().len(), 3);
        assert!(people.find_one(&json!({ "name": "Nobody" })).unwrap().is_none());
    }

    #[test]
    fn hooks_wrap_writes() {
        let mut people = people();
        people
            .hooks_mut()
            .on(HookEvent::PreSave, |m| m.set("_version", 1).map_err(|e| Reject(e.to_string())))
            .on(HookEvent::PreDelete, |m| match m.get("name") {
                Ok(name) if name == "Tony" => Err("Tony is permanent".into()),
                _ => Ok(()),
            });

        let mut tony = people.model().new_instance([("name", "Tony")]).unwrap();
        people.save(&mut tony).unwrap();
        let stored = people.find_one(&json!({ "name": "Tony" })).unwrap().unwrap();
        assert_eq!(stored.get("_version").unwrap(), 1);

        let err = people.delete(&mut tony).unwrap_err();
        assert!(matches!(err, StoreError::Hook(HookError { index: 0, .. })));
        assert_eq!(people.store().len("people"), 1);

        tony.set("name", "Anthony").unwrap();
        people.delete(&mut tony).unwrap();
        assert_eq!(people.store().len("people"), 0);
        assert!(matches!(people.delete(&mut tony), Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn delete_needs_an_id() {
        let mut people = people();
        let mut fresh = people.model().instance();
        assert!(matches!(people.delete(&mut fresh), Err(StoreError::MissingId(_))));
    }

    #[test]
    fn schema_dir_reads_collection_files() {
        let dir = std::env::temp_dir().join(format!("docshape-schema-dir-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("people.json"), serde_json::to_string(&schema()).unwrap()).unwrap();
        std::fs::write(dir.join("broken.json"), "{ \"bsonType\": ").unwrap();

        let store = SchemaDir::new(&dir);
        assert!(matches!(store.fetch_schema("missing"), Err(StoreError::NoSchema(_))));
        assert!(matches!(store.fetch_schema("broken"), Err(StoreError::BadSchemaFile { .. })));
        let mut people = Collection::open(store, "people").unwrap();
        let mut p = people.model().new_instance([("name", "Rhodey")]).unwrap();
        people.save(&mut p).unwrap();
        assert_eq!(people.find(&json!({})).unwrap().len(), 1);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
