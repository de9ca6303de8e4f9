use crate::error::ModelError;
use crate::ids::{extract_id, RecordId};
use crate::query::Page;
use crate::relations::ReverseRel;
use crate::schema::Registry;
use crate::state::{CollectionMeta, OrmState, Record};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

/// One mutation of the normalized state, addressed to a model by name.
#[derive(Debug, Clone)]
pub struct Action {
    pub model: String,
    pub kind: ActionKind,
}

#[derive(Debug, Clone)]
pub enum ActionKind {
    /// Insert a new record (nested child arrays are split out first).
    Create(Value),
    /// Upsert one or more records; `current_id` triggers an id remap when it
    /// differs from the first record's identifier.
    Update { items: Vec<Value>, current_id: Option<RecordId> },
    /// Remove a record and, recursively, its nested children.
    Delete(RecordId),
    /// Replace the collection's known-local contents with a fresh page.
    Overwrite(Page),
}

impl Action {
    pub fn create(model: impl Into<String>, record: Value) -> Self {
        Action { model: model.into(), kind: ActionKind::Create(record) }
    }

    pub fn update(model: impl Into<String>, items: Vec<Value>, current_id: Option<RecordId>) -> Self {
        Action { model: model.into(), kind: ActionKind::Update { items, current_id } }
    }

    pub fn delete(model: impl Into<String>, id: RecordId) -> Self {
        Action { model: model.into(), kind: ActionKind::Delete(id) }
    }

    pub fn overwrite(model: impl Into<String>, page: Page) -> Self {
        Action { model: model.into(), kind: ActionKind::Overwrite(page) }
    }
}

/// Applies one action to the state and returns the next state.
///
/// Pure: no I/O, deterministic for identical inputs. An action addressing an
/// unregistered model returns the state unchanged; malformed payloads
/// (non-object records, missing identifier columns) are errors.
pub fn reduce(registry: &Registry, state: &OrmState, action: &Action) -> Result<OrmState, ModelError> {
    let mut next = state.clone();
    let Some(def) = registry.get(&action.model) else {
        return Ok(next);
    };

    let before = collection_counts(&next);
    let mut overwrite_meta = None;

    match &action.kind {
        ActionKind::Create(record) => {
            let record = as_record(&action.model, record)?;
            let item = set_nested(registry, &mut next, &action.model, record)?;
            let id = extract_id(&action.model, &def.id_col, &item)?;
            next.collection_mut(&action.model).records.insert(id, item);
        }
        ActionKind::Update { items, current_id } => {
            if let (Some(current), Some(first)) = (current_id, items.first()) {
                let first = as_record(&action.model, first)?;
                let new_id = extract_id(&action.model, &def.id_col, &first)?;
                if *current != new_id {
                    update_id(registry, &mut next, &action.model, current, &new_id)?;
                }
            }
            for item in items {
                let record = as_record(&action.model, item)?;
                let item = set_nested(registry, &mut next, &action.model, record)?;
                let id = extract_id(&action.model, &def.id_col, &item)?;
                next.collection_mut(&action.model).records.insert(id, item);
            }
        }
        ActionKind::Delete(id) => {
            nested_delete(registry, &mut next, &action.model, id);
        }
        ActionKind::Overwrite(page) => {
            let existing: Vec<RecordId> = next
                .collection(&action.model)
                .map(|c| c.records.keys().cloned().collect())
                .unwrap_or_default();
            remove_obsolete(registry, &mut next, &action.model, &existing, &page.list, &def.id_col, true);
            for item in &page.list {
                let record = as_record(&action.model, item)?;
                let item = set_nested(registry, &mut next, &action.model, record)?;
                let id = extract_id(&action.model, &def.id_col, &item)?;
                next.collection_mut(&action.model).records.insert(id, item);
            }
            overwrite_meta = Some(CollectionMeta { pages: page.pages, count: page.count, per_page: page.per_page });
        }
    }

    apply_count_deltas(&mut next, &action.model, &before, overwrite_meta);
    Ok(next)
}

fn as_record(model: &str, value: &Value) -> Result<Record, ModelError> {
    value
        .as_object()
        .cloned()
        .ok_or_else(|| ModelError::MalformedRecord(model.to_string()))
}

fn collection_counts(state: &OrmState) -> HashMap<String, i64> {
    state
        .collections
        .iter()
        .map(|(name, c)| (name.clone(), c.records.len() as i64))
        .collect()
}

/// Splits nested child arrays out of `record` into their own collections,
/// tagging each child row with the parent foreign key. When the parent
/// already exists, child rows absent from the new array are removed.
fn set_nested(
    registry: &Registry,
    state: &mut OrmState,
    model: &str,
    mut record: Record,
) -> Result<Record, ModelError> {
    let def = registry.get(model).ok_or_else(|| ModelError::UnknownModel(model.to_string()))?;
    let parent_id = extract_id(model, &def.id_col, &record)?;
    let parent_exists = state
        .collection(model)
        .is_some_and(|c| c.records.contains_key(&parent_id));
    let nested: Vec<ReverseRel> = registry.nested_rels(model).into_iter().cloned().collect();

    for rel in nested {
        let rows = match record.remove(&rel.related_name) {
            Some(Value::Array(rows)) => rows,
            Some(other) => {
                record.insert(rel.related_name.clone(), other);
                continue;
            }
            None => continue,
        };
        let child_def = registry
            .get(&rel.model)
            .ok_or_else(|| ModelError::UnknownModel(rel.model.clone()))?;
        if parent_exists {
            let existing = children_of(state, &rel, &parent_id);
            remove_obsolete(registry, state, &rel.model, &existing, &rows, &child_def.id_col, false);
        }
        for row in rows {
            let mut child = as_record(&rel.model, &row)?;
            child.insert(rel.fk_name.clone(), parent_id.to_value());
            let child_id = extract_id(&rel.model, &child_def.id_col, &child)?;
            state.collection_mut(&rel.model).records.insert(child_id, child);
        }
    }
    Ok(record)
}

/// Removes every record in `existing` whose id does not appear in
/// `new_items`; with `nested`, removal cascades through nested children.
fn remove_obsolete(
    registry: &Registry,
    state: &mut OrmState,
    collection: &str,
    existing: &[RecordId],
    new_items: &[Value],
    id_col: &str,
    nested: bool,
) {
    let keep: BTreeSet<RecordId> = new_items
        .iter()
        .filter_map(|item| item.as_object())
        .filter_map(|item| item.get(id_col).and_then(RecordId::from_value))
        .collect();
    for id in existing {
        if keep.contains(id) {
            continue;
        }
        if nested {
            nested_delete(registry, state, collection, id);
        } else if let Some(c) = state.collections.get_mut(collection) {
            c.records.remove(id);
        }
    }
}

/// Recursive cascade: children (and their children) go before the parent.
/// Plain, non-nested referencing records are left alone.
fn nested_delete(registry: &Registry, state: &mut OrmState, model: &str, id: &RecordId) {
    let nested: Vec<ReverseRel> = registry.nested_rels(model).into_iter().cloned().collect();
    for rel in nested {
        for child_id in children_of(state, &rel, id) {
            nested_delete(registry, state, &rel.model, &child_id);
        }
    }
    if let Some(c) = state.collections.get_mut(model) {
        c.records.remove(id);
    }
}

fn children_of(state: &OrmState, rel: &ReverseRel, parent: &RecordId) -> Vec<RecordId> {
    state
        .collection(&rel.model)
        .map(|c| {
            c.records
                .iter()
                .filter(|(_, record)| {
                    record.get(&rel.fk_name).and_then(RecordId::from_value).as_ref() == Some(parent)
                })
                .map(|(id, _)| id.clone())
                .collect()
        })
        .unwrap_or_default()
}

/// A new id was assigned (i.e. by the server): repoint every reverse
/// relation, then re-key the record. Insert-then-delete, since the records
/// map cannot change a key in place.
fn update_id(
    registry: &Registry,
    state: &mut OrmState,
    model: &str,
    old_id: &RecordId,
    new_id: &RecordId,
) -> Result<(), ModelError> {
    let Some(record) = state.collection(model).and_then(|c| c.records.get(old_id).cloned()) else {
        return Ok(());
    };
    let rels: Vec<ReverseRel> = registry.reverse_rels(model).to_vec();
    for rel in rels {
        let child_ids = children_of(state, &rel, old_id);
        if let Some(children) = state.collections.get_mut(&rel.model) {
            for child_id in child_ids {
                if let Some(child) = children.records.get_mut(&child_id) {
                    child.insert(rel.fk_name.clone(), new_id.to_value());
                }
            }
        }
    }
    let def = registry.get(model).ok_or_else(|| ModelError::UnknownModel(model.to_string()))?;
    let mut moved = record;
    moved.insert(def.id_col.clone(), new_id.to_value());
    let collection = state.collection_mut(model);
    collection.records.insert(new_id.clone(), moved);
    collection.records.remove(old_id);
    Ok(())
}

/// Reconciles per-collection metadata after a mutation. Every collection
/// whose row count changed (plus the target) gets the count delta applied to
/// its meta; an overwrite replaces the target's meta wholesale instead. The
/// delta form keeps a server-reported total meaningful when it disagrees
/// with the local row count.
fn apply_count_deltas(
    state: &mut OrmState,
    target: &str,
    before: &HashMap<String, i64>,
    overwrite_meta: Option<CollectionMeta>,
) {
    let names: BTreeSet<String> = before
        .keys()
        .cloned()
        .chain(state.collections.keys().cloned())
        .chain(std::iter::once(target.to_string()))
        .collect();

    for name in names {
        let after = state.count(&name);
        let delta = after - before.get(&name).copied().unwrap_or(0);
        if name == target {
            if let Some(meta) = overwrite_meta.clone() {
                state.collection_mut(&name).meta = Some(meta);
                continue;
            }
        } else if delta == 0 {
            continue;
        }
        let collection = state.collection_mut(&name);
        match collection.meta.as_mut() {
            Some(meta) => {
                let single_page = meta.pages == 1 && meta.per_page == meta.count;
                meta.count += delta;
                if single_page {
                    meta.per_page = meta.count;
                }
            }
            None => {
                collection.meta = Some(CollectionMeta { pages: 1, count: after, per_page: after });
            }
        }
    }
}
