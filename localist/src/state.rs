use crate::ids::RecordId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

/// A normalized row: plain JSON fields plus `<name>_id` foreign-key columns.
/// Nested child rows are never stored on the parent; they live in their own
/// collection and are re-attached on read.
pub type Record = Map<String, Value>;

/// Pagination bookkeeping for one collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionMeta {
    pub pages: i64,
    pub count: i64,
    pub per_page: i64,
}

/// One model's records, keyed and ordered by identifier.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    pub records: BTreeMap<RecordId, Record>,
    pub meta: Option<CollectionMeta>,
}

impl Collection {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &RecordId) -> Option<&Record> {
        self.records.get(id)
    }
}

/// The full normalized state: one collection per registered model.
#[derive(Debug, Clone, Default)]
pub struct OrmState {
    pub collections: HashMap<String, Collection>,
}

impl OrmState {
    pub fn collection(&self, name: &str) -> Option<&Collection> {
        self.collections.get(name)
    }

    pub fn collection_mut(&mut self, name: &str) -> &mut Collection {
        self.collections.entry(name.to_string()).or_default()
    }

    pub fn count(&self, name: &str) -> i64 {
        self.collections.get(name).map_or(0, |c| c.records.len() as i64)
    }

    pub fn meta(&self, name: &str) -> Option<&CollectionMeta> {
        self.collections.get(name).and_then(|c| c.meta.as_ref())
    }
}
