use crate::cache::{CacheOpts, CachePolicy};
use crate::error::ModelError;
use crate::filter::{self, ComputeFn, Functions};
use crate::ids::RecordId;
use crate::query::{Page, Query};
use crate::reducer::Action;
use crate::schema::{FieldDef, FormField, ModelDef, Registry};
use crate::state::{CollectionMeta, OrmState, Record};
use crate::store::Store;
use crate::warn;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Configuration of one stored list. Immutable once the [`Model`] is built.
#[derive(Clone)]
pub struct ModelConfig {
    pub name: String,
    pub url: Option<String>,
    pub query: Option<Query>,
    pub cache: CachePolicy,
    pub id_col: String,
    pub form: Vec<FormField>,
    pub functions: Functions,
    pub filter_fields: Vec<String>,
    pub filter_ignore: Vec<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            name: String::new(),
            url: None,
            query: None,
            cache: CachePolicy::default(),
            id_col: "id".to_string(),
            form: Vec::new(),
            functions: Functions::new(),
            filter_fields: Vec::new(),
            filter_ignore: Vec::new(),
        }
    }
}

impl ModelConfig {
    pub fn new(name: impl Into<String>) -> Self {
        ModelConfig { name: name.into(), ..ModelConfig::default() }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_query(mut self, query: impl Into<Query>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_cache(mut self, cache: CachePolicy) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_id_col(mut self, id_col: impl Into<String>) -> Self {
        self.id_col = id_col.into();
        self
    }

    pub fn with_form(mut self, form: Vec<FormField>) -> Self {
        self.form = form;
        self
    }

    pub fn with_function(mut self, name: impl Into<String>, f: ComputeFn) -> Self {
        self.functions.insert(name.into(), f);
        self
    }

    pub fn with_filter_fields(mut self, fields: Vec<String>) -> Self {
        self.filter_fields = fields;
        self
    }

    pub fn with_filter_ignore(mut self, fields: Vec<String>) -> Self {
        self.filter_ignore = fields;
        self
    }
}

/// Shorthand: a bare name is both the model name and its query.
impl From<&str> for ModelConfig {
    fn from(name: &str) -> Self {
        ModelConfig::new(name).with_query(name)
    }
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("query", &self.query)
            .field("cache", &self.cache)
            .field("id_col", &self.id_col)
            .field("form", &self.form)
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .field("filter_fields", &self.filter_fields)
            .field("filter_ignore", &self.filter_ignore)
            .finish()
    }
}

/// A stored list bound to one model: the public facade over local reads,
/// network fetches and reducer dispatches, governed by the cache policy.
/// Especially useful for server-paginated lists; all data methods are async.
pub struct Model {
    config: ModelConfig,
    opts: CacheOpts,
    query: Option<Query>,
    store: Arc<Store>,
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("config", &self.config)
            .field("opts", &self.opts)
            .field("query", &self.query)
            .field("store", &self.store.name())
            .finish()
    }
}

impl Model {
    /// Builds the accessor and registers the model's schema in the store's
    /// registry (idempotent; the first registration of a name wins).
    pub fn new(store: Arc<Store>, config: ModelConfig) -> Result<Model, ModelError> {
        if config.name.is_empty() {
            return Err(ModelError::Config("Model name is required".to_string()));
        }
        let opts = config.cache.opts();

        let mut def = ModelDef::new(&config.name).with_id_col(&config.id_col);
        for field in &config.form {
            let resolved = if let Some(to) = &field.foreign_key {
                let related = field
                    .related_name
                    .clone()
                    .or_else(|| config.url.clone())
                    .unwrap_or_else(|| format!("{}s", config.name));
                FieldDef::foreign_key(&field.name, to, related)
            } else if field.is_repeat() {
                FieldDef::repeat(&field.name)
            } else {
                FieldDef::attr(&field.name)
            };
            def = def.with_field(resolved);
        }
        store.registry().register(def);

        let query = config.query.clone().or_else(|| config.url.clone().map(Query::new));
        Ok(Model { opts, query, config, store })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn opts(&self) -> CacheOpts {
        self.opts
    }

    pub fn query(&self) -> Option<&Query> {
        self.query.as_ref()
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Pagination info for the cached view. When nothing is cached yet and a
    /// query is configured, prefetches once and re-reads (a single retry,
    /// not a loop).
    pub async fn info(&self) -> Result<CollectionMeta, ModelError> {
        if let Some(meta) = self.local_meta()? {
            return Ok(meta);
        }
        if self.query.is_some() {
            self.prefetch().await?;
            if let Some(meta) = self.local_meta()? {
                return Ok(meta);
            }
        }
        Ok(CollectionMeta { pages: 1, count: 0, per_page: 0 })
    }

    pub async fn ensure_loaded(&self) -> Result<(), ModelError> {
        self.info().await.map(|_| ())
    }

    /// The canonical view: pagination info plus the list itself.
    ///
    /// Under a policy where local data is never authoritative, every call
    /// fetches the canonical page afresh (its overwrite is still dispatched
    /// so the local mirror stays coherent).
    pub async fn load(&self) -> Result<Page, ModelError> {
        if !self.opts.client && self.query.is_some() {
            let data = self.get_page(None).await?;
            self.overwrite(data.clone()).await?;
            return Ok(data);
        }
        let info = self.info().await?;
        let state = self.store.state()?;
        Ok(Page {
            list: self.local_list(&state),
            pages: info.pages,
            count: info.count,
            per_page: info.per_page,
            page: None,
        })
    }

    // Load data for the given page number
    pub async fn page(&self, page_num: i64) -> Result<Page, ModelError> {
        if self.config.url.is_none() && page_num > self.opts.page {
            return Err(ModelError::NoUrl(page_num));
        }
        if page_num <= self.opts.page {
            return self.load().await;
        }
        self.get_page(Some(page_num)).await
    }

    // Iterate across stored data
    pub async fn for_each(&self, mut f: impl FnMut(&Value)) -> Result<(), ModelError> {
        let data = self.load().await?;
        data.list.iter().for_each(|item| f(item));
        Ok(())
    }

    /// Finds one record by id, reconstructed with its nested children. A
    /// local miss falls back to a `<url>/<id>` fetch when the policy allows
    /// server reads; the fetched record is returned as-is, not cached.
    pub async fn find(&self, id: impl Into<RecordId>, local_only: bool) -> Result<Option<Value>, ModelError> {
        let id = id.into();
        self.ensure_loaded().await?;
        let state = self.store.state()?;
        if let Some(record) = state.collection(&self.config.name).and_then(|c| c.get(&id)) {
            let registry = self.store.registry();
            return Ok(Some(Value::Object(self.with_nested(&state, &registry, record))));
        }
        if !local_only && self.opts.server {
            if let Some(url) = &self.config.url {
                let result = self.store.fetch(&Query::new(format!("{}/{}", url, id))).await?;
                if !result.is_null() {
                    return Ok(Some(result));
                }
            }
        }
        Ok(None)
    }

    /// Attributes usable in filters: the id column, form fields (foreign
    /// keys by their stored `_id` column), registered functions and
    /// `filter_fields`, minus `filter_ignore`.
    pub fn filter_fields(&self) -> Vec<String> {
        let mut fields = vec![self.config.id_col.clone()];
        for field in &self.config.form {
            fields.push(if field.foreign_key.is_some() {
                format!("{}_id", field.name)
            } else {
                field.name.clone()
            });
        }
        fields.extend(self.config.functions.keys().cloned());
        fields.extend(self.config.filter_fields.iter().cloned());
        fields.retain(|f| !self.config.filter_ignore.contains(f));
        fields
    }

    // Filter stored data by one or more attributes
    pub async fn filter(&self, conditions: &Value, match_any: bool, local_only: bool) -> Result<Vec<Value>, ModelError> {
        Ok(self.filter_page(conditions, match_any, local_only).await?.list)
    }

    pub async fn filter_page(&self, conditions: &Value, match_any: bool, local_only: bool) -> Result<Page, ModelError> {
        let conditions = conditions
            .as_object()
            .ok_or_else(|| ModelError::Config("Filter conditions must be an object".to_string()))?;

        // Ignore attributes that are not explicitly registered (e.g. list
        // views passing through custom URL params).
        let known = self.filter_fields();
        let mut filter: BTreeMap<String, Value> = BTreeMap::new();
        for (attr, comp) in conditions {
            if known.contains(attr) {
                filter.insert(attr.clone(), comp.clone());
            } else if !self.config.filter_ignore.contains(attr) {
                warn!(
                    "Ignoring unrecognized field \"{}\" while filtering {} list. Add it to form or filter_fields to enable filtering, or to filter_ignore to remove this warning.",
                    attr, self.config.name
                );
            }
        }

        if filter.is_empty() {
            return self.load().await;
        }

        // With a partial local list there is no way to be sure every match
        // is stored locally, so the query runs on the server.
        if !local_only && self.opts.server {
            if let Some(url) = &self.config.url {
                let query = Query::new(url.clone()).with_params(filter);
                let result = self.store.fetch(&query).await?;
                return Page::process(result);
            }
        }

        self.ensure_loaded().await?;
        let state = self.store.state()?;
        let registry = self.store.registry();
        let list = match state.collection(&self.config.name) {
            Some(collection) => {
                let ordered: Vec<&Record> = if self.opts.reversed {
                    collection.records.values().rev().collect()
                } else {
                    collection.records.values().collect()
                };
                let matched: Vec<&Record> = if match_any {
                    ordered
                        .into_iter()
                        .filter(|record| {
                            filter
                                .iter()
                                .any(|(attr, comp)| filter::matches(&self.config.functions, record, attr, comp))
                        })
                        .collect()
                } else {
                    // Equality conditions hit the records directly; custom
                    // conditions (functions, arrays, boolean tokens) run as
                    // a predicate pass over the narrowed set.
                    let (custom, default): (Vec<(&String, &Value)>, Vec<(&String, &Value)>) = filter
                        .iter()
                        .partition(|&(attr, comp)| filter::is_custom(&self.config.functions, attr, comp));
                    ordered
                        .into_iter()
                        .filter(|record| {
                            default.iter().all(|&(attr, comp)| record.get(attr.as_str()) == Some(comp))
                        })
                        .filter(|record| {
                            custom
                                .iter()
                                .all(|&(attr, comp)| filter::matches(&self.config.functions, record, attr, comp))
                        })
                        .collect()
                };
                matched
                    .into_iter()
                    .map(|record| Value::Object(self.with_nested(&state, &registry, record)))
                    .collect()
            }
            None => Vec::new(),
        };
        Ok(Page::from_list(list))
    }

    // Create new item
    pub async fn create(&self, object: Value) -> Result<(), ModelError> {
        self.store.dispatch(Action::create(&self.config.name, object))
    }

    // Merge new/updated items into the list
    pub async fn update(&self, items: Vec<Value>, current_id: Option<RecordId>) -> Result<(), ModelError> {
        self.store.dispatch(Action::update(&self.config.name, items, current_id))
    }

    pub async fn remove(&self, id: impl Into<RecordId>) -> Result<(), ModelError> {
        self.store.dispatch(Action::delete(&self.config.name, id.into()))
    }

    // Overwrite the entire list
    pub async fn overwrite(&self, mut data: Page) -> Result<(), ModelError> {
        if data.pages == 1 {
            let n = data.list.len() as i64;
            data.count = n;
            data.per_page = n;
        }
        self.store.dispatch(Action::overwrite(&self.config.name, data))
    }

    /// Fetches the full unpaginated query and overwrites the local list;
    /// this is how an `all`-policy list becomes fully local.
    pub async fn prefetch(&self) -> Result<(), ModelError> {
        let data = self.get_page(None).await?;
        self.overwrite(data).await
    }

    /// Partial list refresh (useful for large lists): fetch with extra
    /// params selecting recent items and merge them in, leaving everything
    /// else untouched.
    pub async fn fetch_update(&self, params: impl IntoIterator<Item = (String, Value)>) -> Result<(), ModelError> {
        let query = self
            .query
            .clone()
            .ok_or_else(|| ModelError::Config(format!("No query configured for {}", self.config.name)))?
            .with_params(params);
        let result = self.store.fetch(&query).await?;
        let data = Page::process(result)?;
        self.update(data.list, None).await
    }

    // Unsaved items related to this list
    pub async fn unsynced_items(&self, with_data: bool) -> Result<Vec<Value>, ModelError> {
        match self.store.outbox() {
            Some(outbox) => outbox.unsynced_items(self.query.as_ref(), with_data).await,
            None => Ok(Vec::new()),
        }
    }

    /// Applies a registered computed function to a record.
    pub fn compute(&self, name: &str, record: &Record) -> Option<Value> {
        self.config.functions.get(name).map(|f| f(record))
    }

    fn local_meta(&self) -> Result<Option<CollectionMeta>, ModelError> {
        Ok(self.store.state()?.meta(&self.config.name).cloned())
    }

    async fn get_page(&self, page_num: Option<i64>) -> Result<Page, ModelError> {
        let query = self
            .query
            .clone()
            .ok_or_else(|| ModelError::Config(format!("No query configured for {}", self.config.name)))?;
        let query = match page_num {
            Some(n) => query.with_page(n),
            None => query,
        };
        let result = self.store.fetch(&query).await?;
        let mut data = Page::process(result)?;
        if data.page.is_none() {
            data.page = page_num;
        }
        Ok(data)
    }

    fn local_list(&self, state: &OrmState) -> Vec<Value> {
        let registry = self.store.registry();
        let Some(collection) = state.collection(&self.config.name) else {
            return Vec::new();
        };
        let ordered: Vec<&Record> = if self.opts.reversed {
            collection.records.values().rev().collect()
        } else {
            collection.records.values().collect()
        };
        ordered
            .into_iter()
            .map(|record| Value::Object(self.with_nested(state, &registry, record)))
            .collect()
    }

    /// Re-attaches nested child rows as inline arrays on a copy of `record`.
    fn with_nested(&self, state: &OrmState, registry: &Registry, record: &Record) -> Record {
        let mut data = record.clone();
        let Some(parent_id) = data.get(&self.config.id_col).and_then(RecordId::from_value) else {
            return data;
        };
        for rel in registry.nested_rels(&self.config.name) {
            let children: Vec<Value> = state
                .collection(&rel.model)
                .map(|c| {
                    c.records
                        .values()
                        .filter(|r| {
                            r.get(&rel.fk_name).and_then(RecordId::from_value).as_ref() == Some(&parent_id)
                        })
                        .map(|r| Value::Object(r.clone()))
                        .collect()
                })
                .unwrap_or_default();
            data.insert(rel.related_name.clone(), Value::Array(children));
        }
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::FetchProvider;
    use async_trait::async_trait;
    use serde_json::json;

    struct NullProvider;

    #[async_trait]
    impl FetchProvider for NullProvider {
        async fn fetch(&self, _query: &Query) -> Result<Value, ModelError> {
            Ok(Value::Null)
        }
    }

    fn test_store() -> Arc<Store> {
        Arc::new(Store::new("main", Arc::new(NullProvider)))
    }

    #[test]
    fn model_name_is_required() {
        let err = Model::new(test_store(), ModelConfig::default()).unwrap_err();
        assert!(matches!(err, ModelError::Config(_)));
    }

    #[test]
    fn string_shorthand_sets_query_and_name() {
        let model = Model::new(test_store(), ModelConfig::from("observation")).unwrap();
        assert_eq!(model.name(), "observation");
        assert_eq!(model.query(), Some(&Query::new("observation")));
        assert_eq!(model.config().cache, CachePolicy::FirstPage);
    }

    #[test]
    fn filter_fields_collect_form_functions_and_extras() {
        let config = ModelConfig::new("observation")
            .with_url("observations")
            .with_form(vec![
                FormField::attr("notes"),
                FormField::fk("site", "site"),
                FormField::repeat("readings"),
            ])
            .with_function("is_new", Arc::new(|_: &Record| json!(false)) as ComputeFn)
            .with_filter_fields(vec!["season".to_string()])
            .with_filter_ignore(vec!["page_size".to_string(), "notes".to_string()]);
        let model = Model::new(test_store(), config).unwrap();
        assert_eq!(
            model.filter_fields(),
            vec!["id", "site_id", "readings", "is_new", "season"]
        );
    }

    #[test]
    fn foreign_key_related_names_default_to_the_url() {
        let store = test_store();
        let config = ModelConfig::new("reading")
            .with_url("readings")
            .with_form(vec![FormField::fk("observation", "observation")]);
        Model::new(Arc::clone(&store), config).unwrap();
        let def = store.registry().get("reading").unwrap();
        assert_eq!(
            def.fields,
            vec![FieldDef::foreign_key("observation", "observation", "readings")]
        );
    }

    #[tokio::test]
    async fn unsynced_items_without_an_outbox_are_empty() {
        let model = Model::new(test_store(), ModelConfig::from("observation")).unwrap();
        assert!(model.unsynced_items(true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn compute_applies_registered_functions() {
        let config = ModelConfig::new("observation").with_function(
            "doubled",
            Arc::new(|r: &Record| json!(r.get("n").and_then(Value::as_i64).unwrap_or(0) * 2)) as ComputeFn,
        );
        let model = Model::new(test_store(), config).unwrap();
        let record = json!({"n": 4});
        let record = record.as_object().unwrap();
        assert_eq!(model.compute("doubled", record), Some(json!(8)));
        assert_eq!(model.compute("missing", record), None);
    }
}
