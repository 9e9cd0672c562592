use std::sync::Arc;

use serde_json::Value;

use super::instance::ModelInstance;
use super::{ModelError, ModelType};

/// Items of an array-of-objects field. Each item is owned by the array.
#[derive(Debug, Clone)]
pub struct ArrayField {
    field: String,
    item_type: Arc<ModelType>,
    items: Vec<ModelInstance>,
}

impl ArrayField {
    pub(crate) fn new(field: &str, item_type: Arc<ModelType>) -> Self {
        Self { field: field.to_string(), item_type, items: Vec::new() }
    }

    pub fn item_type(&self) -> &Arc<ModelType> { &self.item_type }

    pub fn len(&self) -> usize { self.items.len() }

    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    pub fn iter(&self) -> std::slice::Iter<'_, ModelInstance> { self.items.iter() }

    pub fn get(&self, index: usize) -> Option<&ModelInstance> { self.items.get(index) }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut ModelInstance> { self.items.get_mut(index) }

    /// Build one item from `(field, value)` pairs and append it.
    pub fn add<I, K, V>(&mut self, fields: I) -> Result<&mut ModelInstance, ModelError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let item = self.item_type.new_instance(fields)?;
        self.items.push(item);
        Ok(self.last_mut())
    }

    /// Hydrate one item from a mapping and append it.
    pub fn push_dict(&mut self, data: &Value) -> Result<&mut ModelInstance, ModelError> {
        let item = self.item_type.from_dict(data)?;
        self.items.push(item);
        Ok(self.last_mut())
    }

    /// Replace the whole sequence. Nothing changes if any item fails to hydrate.
    pub fn replace(&mut self, items: Vec<Value>) -> Result<(), ModelError> {
        let hydrated = items
            .iter()
            .map(|data| self.item_type.from_dict(data))
            .collect::<Result<Vec<_>, _>>()?;
        self.items = hydrated;
        Ok(())
    }

    pub fn remove_at(&mut self, index: usize) -> Result<ModelInstance, ModelError> {
        self.check(index)?;
        Ok(self.items.remove(index))
    }

    /// Remove the first item whose fields equal every criterion.
    pub fn remove_by<I, K, V>(&mut self, criteria: I) -> bool
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let criteria = collect_criteria(criteria);
        match self.items.iter().position(|item| matches_all(item, &criteria)) {
            Some(i) => {
                self.items.remove(i);
                true
            }
            None => false,
        }
    }

    /// Remove every matching item; returns how many were removed.
    pub fn remove_all_by<I, K, V>(&mut self, criteria: I) -> usize
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let criteria = collect_criteria(criteria);
        let before = self.items.len();
        self.items.retain(|item| !matches_all(item, &criteria));
        before - self.items.len()
    }

    pub fn to_value(&self) -> Value { Value::Array(self.items.iter().map(ModelInstance::to_dict).collect()) }

    pub(crate) fn get_checked(&self, index: usize) -> Result<&ModelInstance, ModelError> {
        self.check(index)?;
        Ok(&self.items[index])
    }

    pub(crate) fn get_mut_checked(&mut self, index: usize) -> Result<&mut ModelInstance, ModelError> {
        self.check(index)?;
        Ok(&mut self.items[index])
    }

    fn check(&self, index: usize) -> Result<(), ModelError> {
        if index >= self.items.len() {
            return Err(ModelError::IndexOutOfRange { field: self.field.clone(), index, len: self.items.len() });
        }
        Ok(())
    }

    fn last_mut(&mut self) -> &mut ModelInstance {
        let last = self.items.len() - 1;
        &mut self.items[last]
    }
}

impl<'a> IntoIterator for &'a ArrayField {
    type Item = &'a ModelInstance;
    type IntoIter = std::slice::Iter<'a, ModelInstance>;
    fn into_iter(self) -> Self::IntoIter { self.items.iter() }
}

fn collect_criteria<I, K, V>(criteria: I) -> Vec<(String, Value)>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<Value>,
{
    criteria.into_iter().map(|(k, v)| (k.as_ref().to_string(), v.into())).collect()
}

fn matches_all(item: &ModelInstance, criteria: &[(String, Value)]) -> bool {
    criteria.iter().all(|(k, v)| item.field_value(k).as_ref() == Some(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::people_node;
    use crate::model::ModelFactory;
    use serde_json::json;

    fn addresses() -> ArrayField {
        let people = ModelFactory::new().build("People", &people_node()).unwrap();
        let mut p = people.instance();
        let field = p.array_mut("addresses").unwrap();
        for (kind, city) in [("Home", "Panama"), ("Work", "Newark"), ("Home", "Trenton")] {
            field.add([("type", kind), ("city", city)]).unwrap();
        }
        field.clone()
    }

    #[test]
    fn add_returns_the_new_item() {
        let mut field = addresses();
        let item = field.add([("city", "Camden")]).unwrap();
        item.set("type", "Work").unwrap();
        assert_eq!(field.len(), 4);
        assert_eq!(field.get(3).unwrap().get("type").unwrap(), "Work");
        assert!(field.add([("zip", "0")]).is_err());
        assert!(matches!(field.add([("type", "Moon")]), Err(ModelError::InvalidValue { .. })));
        assert_eq!(field.len(), 4);
    }

    #[test]
    fn remove_by_criteria() {
        let mut field = addresses();
        assert!(field.remove_by([("type", "Work")]));
        assert!(!field.remove_by([("type", "Work")]));
        assert_eq!(field.remove_all_by([("type", "Home")]), 2);
        assert!(field.is_empty());
    }

    #[test]
    fn remove_at_checks_bounds() {
        let mut field = addresses();
        let removed = field.remove_at(1).unwrap();
        assert_eq!(removed.get("city").unwrap(), "Newark");
        let err = field.remove_at(5).unwrap_err();
        assert_eq!(err, ModelError::IndexOutOfRange { field: "addresses".into(), index: 5, len: 2 });
    }

    #[test]
    fn replace_is_all_or_nothing() {
        let mut field = addresses();
        assert!(field.replace(vec![json!({ "city": "A" }), json!("oops")]).is_err());
        assert_eq!(field.len(), 3);
        field.replace(vec![json!({ "city": "A" })]).unwrap();
        assert_eq!(field.to_value()[0]["city"], "A");
        field.push_dict(&json!({ "city": "B", "type": "Work" })).unwrap();
        assert_eq!(field.iter().count(), 2);
    }
}
