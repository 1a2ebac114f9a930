//! In-process record store for dry runs and tests.

use super::{ResourceStore, StoreError, DEFAULT_BASE_URL};
use crate::fhir::Record;
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Upsert map of `(resourceType, id)` to the stored JSON.
///
/// In strict mode every `reference` in a written record must point at a
/// record that is already stored, the way a FHIR server enforcing
/// referential integrity behaves.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    base_url: String,
    strict: bool,
    records: BTreeMap<(String, String), Value>,
    order: Vec<(String, String)>,
    creates: usize,
    updates: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            strict: false,
            records: BTreeMap::new(),
            order: Vec::new(),
            creates: 0,
            updates: 0,
        }
    }

    /// Reject records that link to anything not yet stored.
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::new()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn get(&self, resource_type: &str, id: &str) -> Option<&Value> {
        self.records.get(&(resource_type.to_string(), id.to_string()))
    }

    pub fn contains(&self, reference: &str) -> bool {
        match reference.split_once('/') {
            Some((resource_type, id)) => self.get(resource_type, id).is_some(),
            None => false,
        }
    }

    /// Ids of one resource type in first-write order.
    pub fn ids(&self, resource_type: &str) -> Vec<&str> {
        self.order
            .iter()
            .filter(|(t, _)| t == resource_type)
            .map(|(_, id)| id.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of successful create and update calls.
    pub fn writes(&self) -> (usize, usize) {
        (self.creates, self.updates)
    }

    /// Everything stored, as a FHIR collection bundle in first-write order.
    pub fn to_bundle(&self) -> Value {
        let entry: Vec<Value> = self
            .order
            .iter()
            .filter_map(|key| {
                let resource = self.records.get(key)?;
                Some(json!({
                    "fullUrl": format!("{}/{}/{}", self.base_url.trim_end_matches('/'), key.0, key.1),
                    "resource": resource,
                }))
            })
            .collect();
        json!({
            "resourceType": "Bundle",
            "type": "collection",
            "total": entry.len(),
            "entry": entry,
        })
    }

    fn store(&mut self, record: &Record, id: String) -> Result<(), StoreError> {
        let mut value =
            serde_json::to_value(record).map_err(|e| StoreError::Serialization(e.to_string()))?;

        if self.strict {
            let mut references = Vec::new();
            collect_references(&value, &mut references);
            if let Some(missing) = references.into_iter().find(|r| !self.contains(r)) {
                return Err(StoreError::Server {
                    status: 422,
                    body: format!("unknown reference {missing}"),
                });
            }
        }

        if let Value::Object(map) = &mut value {
            map.insert("id".to_string(), Value::String(id.clone()));
        }
        let key = (record.resource_type().to_string(), id);
        if self.records.insert(key.clone(), value).is_none() {
            self.order.push(key);
        }
        Ok(())
    }
}

fn collect_references(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                match (key.as_str(), child) {
                    ("reference", Value::String(reference)) => out.push(reference.clone()),
                    _ => collect_references(child, out),
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect_references(item, out)),
        _ => {}
    }
}

impl ResourceStore for MemoryStore {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn create(&mut self, record: &Record) -> Result<String, StoreError> {
        let id = record
            .id()
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        self.store(record, id.clone())?;
        self.creates += 1;
        Ok(id)
    }

    fn update(&mut self, record: &Record) -> Result<(), StoreError> {
        let id = record.id().ok_or(StoreError::MissingId {
            resource_type: record.resource_type(),
        })?;
        self.store(record, id.to_string())?;
        self.updates += 1;
        Ok(())
    }
}
