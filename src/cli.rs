//! CLI: inspect | validate | diff
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use rayon::prelude::*;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::compile::compile;
use crate::diff::{DiffOptions, Differ, EquivalencePolicy};
use crate::model::{ModelFactory, ModelType};
use crate::path::FieldPath;
use crate::types::TypeNode;
use crate::validate::{Validator, Violation};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// compile document schemas, validate documents against them, and diff documents
#[derive(Parser, Debug)]
#[command(name = "docshape")]
pub struct CommandLineInterface {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// print the model types a schema compiles to
    Inspect(InspectCmd),
    /// validate documents against a schema
    Validate(ValidateCmd),
    /// diff two documents
    Diff(DiffCmd),
}

#[derive(Args, Debug, Clone)]
struct SchemaSettings {
    /// schema file (`$jsonSchema` wrapper allowed)
    #[arg(long, short)]
    schema: PathBuf,

    /// root model name (defaults to the schema file stem)
    #[arg(long)]
    name: Option<String>,
}

#[derive(Args, Debug, Clone)]
struct InputSettings {
    /// treat input as newline-delimited JSON (NDJSON)
    #[arg(long, default_value_t = false)]
    ndjson: bool,

    /// One or more inputs. May be literal paths or quoted glob patterns.
    /// A file holding a top-level array contributes each element.
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,
}

#[derive(clap::Parser, Debug)]
struct InspectCmd {
    #[command(flatten)]
    schema_settings: SchemaSettings,
}

#[derive(clap::Parser, Debug)]
struct ValidateCmd {
    #[command(flatten)]
    schema_settings: SchemaSettings,

    #[command(flatten)]
    input_settings: InputSettings,

    /// print the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(clap::Parser, Debug)]
struct DiffCmd {
    /// left (old) document
    left: PathBuf,

    /// right (new) document
    right: PathBuf,

    /// schema used to merge integer / number kinds on `number` fields
    #[arg(long, short)]
    schema: Option<PathBuf>,

    /// report every kind change, ignoring the equivalence policy
    #[arg(long)]
    strict: bool,

    /// nested output instead of a flat `path → entry` map
    #[arg(long)]
    tree: bool,

    /// restrict the diff to these paths (repeatable)
    #[arg(long = "path")]
    paths: Vec<String>,

    /// JSON list of equivalence rules, e.g. `["numeric_string"]`
    #[arg(long, conflicts_with = "lenient")]
    policy: Option<PathBuf>,

    /// tolerate every known equivalence in non-strict mode
    #[arg(long)]
    lenient: bool,
}

/// One loaded document and where it came from.
#[derive(Debug)]
struct Source {
    label: String,
    value: Value,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl SchemaSettings {
    fn load(&self) -> anyhow::Result<(TypeNode, String)> {
        let raw: Value = read_json_file(&self.schema)?;
        let node = compile(&raw).with_context(|| format!("failed to compile {}", self.schema.display()))?;
        let name = match &self.name {
            Some(name) => name.clone(),
            None => default_model_name(&self.schema),
        };
        Ok((node, name))
    }
}

impl InputSettings {
    fn load(&self) -> anyhow::Result<Vec<Source>> {
        let source_paths = resolve_file_path_patterns(&self.input)?;
        let mut out = Vec::new();
        for source_path in source_paths {
            let source_path_str = source_path.to_string_lossy().to_string();
            let source = std::fs::read_to_string(&source_path)
                .with_context(|| format!("failed to read source file {source_path_str}"))?;
            if self.ndjson {
                for (line_no, line) in source.lines().enumerate().filter(|(_, l)| !l.trim().is_empty()) {
                    let value = crate::path_de::from_str_with_path::<Value>(line)
                        .with_context(|| format!("failed to parse {source_path_str}:{}", line_no + 1))?;
                    out.push(Source { label: format!("{source_path_str}:{}", line_no + 1), value });
                }
                continue;
            }
            let value = crate::path_de::from_str_with_path::<Value>(&source)
                .with_context(|| format!("failed to parse JSON source file {source_path_str}"))?;
            match value {
                Value::Array(items) => {
                    for (i, value) in items.into_iter().enumerate() {
                        out.push(Source { label: format!("{source_path_str}[{i}]"), value });
                    }
                }
                value => out.push(Source { label: source_path_str, value }),
            }
        }
        tracing::debug!(documents = out.len(), "loaded inputs");
        Ok(out)
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    /// Run the selected command. `Ok(false)` means the command completed
    /// but found invalid documents or differences.
    pub fn run(&self) -> anyhow::Result<bool> {
        match &self.cmd {
            Command::Inspect(target) => {
                let (node, name) = target.schema_settings.load()?;
                let model = ModelFactory::new().build(&name, &node)?;
                print!("{}", render_model(&model));
                Ok(true)
            }
            Command::Validate(target) => {
                let (node, _) = target.schema_settings.load()?;
                let sources = target.input_settings.load()?;
                let validator = Validator::new(&node);
                let reports: Vec<Vec<Violation>> = sources.par_iter().map(|s| validator.validate(&s.value)).collect();
                let failed = reports.iter().filter(|r| !r.is_empty()).count();

                if target.json {
                    let report: serde_json::Map<String, Value> = sources
                        .iter()
                        .zip(&reports)
                        .map(|(s, r)| serde_json::to_value(r).map(|v| (s.label.clone(), v)))
                        .collect::<Result<_, serde_json::Error>>()?;
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    for (source, violations) in sources.iter().zip(&reports) {
                        if violations.is_empty() {
                            println!("{} {}", "ok".green().bold(), source.label);
                        } else {
                            println!("{} {} ({} violations)", "invalid".red().bold(), source.label, violations.len());
                            for violation in violations {
                                println!("{violation}");
                            }
                        }
                    }
                    eprintln!("{} documents, {failed} invalid", sources.len());
                }
                Ok(failed == 0)
            }
            Command::Diff(target) => {
                let left: Value = read_json_file(&target.left)?;
                let right: Value = read_json_file(&target.right)?;
                let schema = match &target.schema {
                    Some(path) => {
                        let raw: Value = read_json_file(path)?;
                        Some(compile(&raw).with_context(|| format!("failed to compile {}", path.display()))?)
                    }
                    None => None,
                };
                let policy = match (&target.policy, target.lenient) {
                    (Some(path), _) => read_json_file::<EquivalencePolicy>(path)?,
                    (None, true) => EquivalencePolicy::lenient(),
                    (None, false) => EquivalencePolicy::default(),
                };
                let paths = match target.paths.as_slice() {
                    [] => None,
                    raw => Some(
                        raw.iter()
                            .map(|p| FieldPath::parse(p))
                            .collect::<Result<Vec<_>, _>>()?,
                    ),
                };
                let options = DiffOptions { strict: target.strict, flat: !target.tree, paths, policy };
                let differ = Differ::new(options);
                let differ = match &schema {
                    Some(node) => differ.with_schema(node),
                    None => differ,
                };
                let result = differ.diff(&left, &right);
                println!("{}", serde_json::to_string_pretty(&result)?);
                Ok(result.is_empty())
            }
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn read_json_file<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    crate::path_de::from_slice_with_path(&bytes).with_context(|| format!("failed to parse {}", path.display()))
}

/// `schemas/user_accounts.schema.json` → `UserAccounts`
fn default_model_name(path: &Path) -> String {
    let stem = path
        .file_name()
        .and_then(|s| s.to_str())
        .and_then(|s| s.split('.').next())
        .unwrap_or("Root");
    let name: String = stem
        .split(['_', '-'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect();
    if name.is_empty() { "Root".to_string() } else { name }
}

fn render_model(model: &ModelType) -> String {
    let mut out = String::new();
    render_type(model, 0, &mut out);
    let enums = model.enums();
    if !enums.is_empty() {
        out.push_str(&format!("{}\n", "enums".bold()));
        for (path, values) in &enums {
            let values: Vec<String> = values.iter().map(Value::to_string).collect();
            out.push_str(&format!("  {}: {}\n", path.cyan(), values.join(" | ")));
        }
    }
    out
}

fn render_type(model: &ModelType, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    out.push_str(&format!("{indent}{}\n", model.name().bold()));
    for (field, label) in model.fields() {
        let marker = if model.object().is_required(&field) { "*".red().to_string() } else { " ".to_string() };
        out.push_str(&format!("{indent}  {marker}{}: {}\n", field.cyan(), label.dimmed()));
        if let Some(child) = model.child(&field) {
            render_type(child, depth + 2, out);
        }
    }
}

fn resolve_file_path_patterns<I>(patterns: I) -> anyhow::Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        // Minimal glob detection for the `glob` crate syntax.
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'[' | b'{' ))
    }

    let mut out = Vec::<PathBuf>::new();

    for raw in patterns {
        let pattern = raw.as_ref();

        if has_glob_chars(pattern) {
            let mut matched_any = false;
            for entry in glob::glob(pattern)? {
                out.push(entry?);
                matched_any = true;
            }
            if !matched_any {
                bail!("glob pattern matched no files: {pattern}");
            }
        } else {
            out.push(PathBuf::from(pattern));
        }
    }

    Ok(out)
}
