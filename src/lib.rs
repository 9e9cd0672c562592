//! Compile document-store schemas into typed model trees, validate
//! documents against them, and diff documents path by path.
pub mod cli;
pub mod compile;
pub mod diff;
pub mod hooks;
pub mod model;
pub mod path;
pub mod path_de;
pub mod store;
pub mod types;
pub mod validate;

pub use compile::{compile, CompileOptions, SchemaCompileError, SchemaCompiler};
pub use diff::{diff, ChangeKind, DiffEntry, DiffOptions, DiffResult, DiffTree, Differ, EquivalencePolicy, EquivalenceRule};
pub use hooks::{HookError, HookEvent, Hooks, Reject};
pub use model::{ArrayField, ModelError, ModelFactory, ModelInstance, ModelType};
pub use path::{FieldPath, Segment};
pub use store::{Collection, DocumentStore, MemoryStore, SchemaDir, StoreError};
pub use types::{ObjectNode, ScalarKind, TypeNode, ValueKind};
pub use validate::{validate, Validator, Violation, ViolationKind};
