//! End-to-end walk over `fixtures/people.schema.json`: compile, build,
//! mutate, validate, persist through a collection, then diff.
use anyhow::{Context, ensure};
use docshape::hooks::{HookEvent, Reject};
use docshape::{Collection, DiffOptions, Differ, EquivalencePolicy, MemoryStore, ModelFactory, Validator};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

const PEOPLE_SCHEMA: &str = include_str!("../../fixtures/people.schema.json");
const PEOPLE: &str = include_str!("../../fixtures/people.json");

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let raw: Value = serde_json::from_str(PEOPLE_SCHEMA).context("fixture schema")?;
    let node = docshape::compile(&raw)?;

    // 1) model types
    let mut factory = ModelFactory::new();
    let people = factory.build("People", &node)?;
    for ty in factory.types() {
        eprintln!("type {}", ty.name());
    }
    ensure!(factory.get("People.addresses_item.contact").is_some(), "array item contact type missing");

    // 2) mutate
    let mut tony = people.new_instance([("name", json!("Tony Pajama")), ("age", json!(34)), ("gender", json!("Male"))])?;
    tony.object_mut("health")?
        .object_mut("primary_physician")?
        .set("name", "Dr. Strange")?;
    tony.set_path("health.primary_physician.contact.phone", "123-456-7890")?;
    tony.array_mut("addresses")?.add([("type", "Home"), ("city", "Panama")])?;
    ensure!(tony.validate().is_empty(), "tony should be valid: {:?}", tony.validate());

    // 3) validate the fixture batch
    let documents: Vec<Value> = serde_json::from_str(PEOPLE).context("fixture documents")?;
    let reports = Validator::new(&node).validate_all(&documents);
    for (doc, violations) in documents.iter().zip(&reports) {
        eprintln!("{} → {} violations", doc["name"], violations.len());
        for v in violations {
            eprintln!("{v}");
        }
    }
    ensure!(reports[0].is_empty(), "first fixture document should validate");
    ensure!(reports[1].len() == 3, "expected age, gender, addresses[0].city violations");

    // 4) persist
    let store = MemoryStore::new().with_schema("people", raw.clone());
    let mut collection = Collection::open(store, "people")?;
    collection.hooks_mut().on(HookEvent::PreSave, |m| {
        let tags = m.get("tags").map_err(|e| Reject(e.to_string()))?.clone();
        if tags.as_array().is_some_and(Vec::is_empty) {
            m.set("tags", json!(["unsorted"])).map_err(|e| Reject(e.to_string()))?;
        }
        Ok(())
    });
    let mut stored = collection.model().from_dict(&tony.to_dict())?;
    collection.save(&mut stored)?;
    let id = stored.get("_id")?.clone();
    let reloaded = collection.find_by_id(&id)?.context("saved document not found")?;
    ensure!(reloaded.get("tags")? == &json!(["unsorted"]), "pre-save hook did not run");

    // 5) diff
    let mut edited = reloaded.to_dict();
    edited["age"] = json!("34");
    edited["tags"] = json!(["unsorted", "vip"]);
    let strict = reloaded.diff(&edited, &DiffOptions { strict: true, ..DiffOptions::default() });
    println!("{}", serde_json::to_string_pretty(&strict)?);
    ensure!(strict.len() == 2, "expected age + tags[1]");

    let lenient = DiffOptions { policy: EquivalencePolicy::lenient(), ..DiffOptions::default() };
    let relaxed = Differ::new(lenient).with_schema(&node).diff(&reloaded.to_dict(), &edited);
    ensure!(relaxed.len() == 1, "lenient diff should only report tags[1]");

    eprintln!("ok");
    Ok(())
}
