use async_trait::async_trait;
use localist::{
    CachePolicy, FetchProvider, FormField, Model, ModelConfig, ModelError, Query, Store, Value,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

struct FixtureProvider {
    responses: Mutex<HashMap<String, Value>>,
    calls: AtomicUsize,
}

impl FixtureProvider {
    fn new() -> Arc<FixtureProvider> {
        Arc::new(FixtureProvider { responses: Mutex::new(HashMap::new()), calls: AtomicUsize::new(0) })
    }

    fn respond(&self, key: &str, value: Value) {
        self.responses.lock().unwrap().insert(key.to_string(), value);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn fixture_key(query: &Query) -> String {
    let mut key = query.url.clone();
    for (name, value) in &query.params {
        let rendered = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        key.push_str(&format!(";{}={}", name, rendered));
    }
    if let Some(page) = query.page {
        key.push_str(&format!(";page={}", page));
    }
    key
}

#[async_trait]
impl FetchProvider for FixtureProvider {
    async fn fetch(&self, query: &Query) -> Result<Value, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = fixture_key(query);
        self.responses
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or_else(|| ModelError::new(format!("no fixture for {}", key)))
    }
}

fn observation_config() -> ModelConfig {
    ModelConfig::new("observation").with_url("observations").with_form(vec![
        FormField::attr("notes"),
        FormField::attr("active"),
        FormField::repeat("readings"),
    ])
}

fn reading_config() -> ModelConfig {
    ModelConfig::new("reading")
        .with_url("readings")
        .with_form(vec![FormField::attr("value"), FormField::fk("observation", "observation")])
}

#[tokio::test]
async fn it_should_prefetch_page_one_on_first_load() {
    let provider = FixtureProvider::new();
    provider.respond(
        "observations",
        json!({
            "list": [{"id": 1, "notes": "a", "active": true}, {"id": 2, "notes": "b", "active": false}],
            "pages": 2, "count": 3, "per_page": 2
        }),
    );
    let store = Arc::new(Store::new("main", provider.clone()));
    let observations = Model::new(Arc::clone(&store), observation_config()).unwrap();

    let data = observations.load().await.expect("Failed to load");
    assert_eq!(provider.calls(), 1, "missing meta must trigger exactly one prefetch");
    assert_eq!(data.count, 3);
    assert_eq!(data.pages, 2);
    assert_eq!(data.list.len(), 2);
    assert_eq!(data.list[0]["id"], json!(2), "first_page lists are most-recent-first");

    observations.load().await.expect("Failed to reload");
    assert_eq!(provider.calls(), 1, "cached meta must serve load() locally");
}

#[tokio::test]
async fn it_should_always_fetch_for_cache_none() {
    let provider = FixtureProvider::new();
    provider.respond("sites", json!([{"id": 7, "name": "creek"}]));
    let store = Arc::new(Store::new("main", provider.clone()));
    let sites = Model::new(
        store,
        ModelConfig::new("site").with_url("sites").with_cache(CachePolicy::None),
    )
    .unwrap();

    let first = sites.load().await.expect("Failed to load");
    let second = sites.load().await.expect("Failed to reload");
    assert_eq!(provider.calls(), 2, "cache=none must fetch on every load");
    assert_eq!(first.list, second.list);
    assert_eq!(first.count, 1);
}

#[tokio::test]
async fn it_should_not_fetch_after_prefetch_for_cache_all() {
    let provider = FixtureProvider::new();
    provider.respond("species", json!([{"id": 1, "name": "walnut"}, {"id": 2, "name": "oak"}]));
    let store = Arc::new(Store::new("main", provider.clone()));
    let species = Model::new(
        store,
        ModelConfig::new("species").with_query("species").with_cache(CachePolicy::All),
    )
    .unwrap();

    species.prefetch().await.expect("Failed to prefetch");
    assert_eq!(provider.calls(), 1);

    let data = species.load().await.expect("Failed to load");
    assert_eq!(provider.calls(), 1, "cache=all must not fetch after prefetch");
    assert_eq!(data.count, 2);
    assert_eq!(data.list[0]["id"], json!(1), "all-policy lists keep natural order");

    let found = species.find(2i64, false).await.expect("Failed to find");
    assert_eq!(provider.calls(), 1, "find must resolve locally");
    assert_eq!(found.unwrap()["name"], json!("oak"));
}

#[tokio::test]
async fn it_should_serve_local_pages_and_fetch_beyond() {
    let provider = FixtureProvider::new();
    provider.respond(
        "observations",
        json!({"list": [{"id": 1}, {"id": 2}], "pages": 2, "count": 3, "per_page": 2}),
    );
    provider.respond(
        "observations;page=2",
        json!({"list": [{"id": 3}], "pages": 2, "count": 3, "per_page": 2, "page": 2}),
    );
    let store = Arc::new(Store::new("main", provider.clone()));
    let observations = Model::new(store, observation_config()).unwrap();

    observations.prefetch().await.expect("Failed to prefetch");
    assert_eq!(provider.calls(), 1);

    let local = observations.page(1).await.expect("Failed to load page 1");
    assert_eq!(provider.calls(), 1, "page(n) within the tracked page must stay local");
    assert_eq!(local.list.len(), 2);

    let remote = observations.page(2).await.expect("Failed to load page 2");
    assert_eq!(provider.calls(), 2);
    assert_eq!(remote.page, Some(2));
    assert_eq!(remote.list, vec![json!({"id": 3})]);
}

#[tokio::test]
async fn it_should_fail_fast_for_pages_beyond_local_without_a_url() {
    let provider = FixtureProvider::new();
    let store = Arc::new(Store::new("main", provider));
    let notes = Model::new(store, ModelConfig::new("note")).unwrap();

    let err = notes.page(2).await.unwrap_err();
    assert!(matches!(err, ModelError::NoUrl(2)));
    assert_eq!(err.to_string(), "No URL, cannot retrieve page 2");
}

#[tokio::test]
async fn it_should_find_locally_then_fall_back_to_server() {
    let provider = FixtureProvider::new();
    provider.respond(
        "observations",
        json!({"list": [{"id": 1, "notes": "a"}], "pages": 2, "count": 30, "per_page": 1}),
    );
    provider.respond("observations/99", json!({"id": 99, "notes": "remote"}));
    let store = Arc::new(Store::new("main", provider.clone()));
    let observations = Model::new(store, observation_config()).unwrap();

    let local = observations.find(1i64, false).await.expect("Failed to find");
    assert_eq!(provider.calls(), 1, "only the implicit prefetch may fetch");
    assert_eq!(local.unwrap()["notes"], json!("a"));

    let remote = observations.find(99i64, false).await.expect("Failed to find remotely");
    assert_eq!(provider.calls(), 2);
    assert_eq!(remote.unwrap()["notes"], json!("remote"));

    let missing = observations.find(100i64, true).await.expect("Failed to find locally");
    assert_eq!(provider.calls(), 2, "local_only must not fetch");
    assert!(missing.is_none());
}

#[tokio::test]
async fn it_should_filter_boolean_tokens_locally() {
    let provider = FixtureProvider::new();
    provider.respond(
        "observations",
        json!([
            {"id": 1, "notes": "a", "active": true},
            {"id": 2, "notes": "b", "active": false},
            {"id": 3, "notes": "c", "active": true}
        ]),
    );
    let store = Arc::new(Store::new("main", provider.clone()));
    let observations = Model::new(
        store,
        observation_config().with_cache(CachePolicy::All),
    )
    .unwrap();

    let active = observations
        .filter(&json!({"active": "true"}), false, false)
        .await
        .expect("Failed to filter");
    assert_eq!(provider.calls(), 1, "all-policy filters run locally after the implicit prefetch");
    assert_eq!(active.len(), 2, "string token \"true\" must match stored booleans");
    assert!(active.iter().all(|item| item["active"] == json!(true)));

    let either = observations
        .filter(&json!({"active": "false", "notes": "a"}), true, false)
        .await
        .expect("Failed to filter with match_any");
    assert_eq!(either.len(), 2);
}

#[tokio::test]
async fn it_should_query_the_server_for_filters_under_partial_policies() {
    let provider = FixtureProvider::new();
    provider.respond(
        "observations;active=true",
        json!({"list": [{"id": 5, "active": true}], "pages": 1, "count": 1, "per_page": 1}),
    );
    let store = Arc::new(Store::new("main", provider.clone()));
    let observations = Model::new(store, observation_config()).unwrap();

    let result = observations
        .filter_page(&json!({"active": "true"}), false, false)
        .await
        .expect("Failed to filter");
    assert_eq!(provider.calls(), 1, "a partial local list cannot answer filters");
    assert_eq!(result.count, 1);
    assert_eq!(result.list[0]["id"], json!(5));
}

#[tokio::test]
async fn it_should_drop_unrecognized_filter_fields() {
    let provider = FixtureProvider::new();
    provider.respond(
        "observations",
        json!([{"id": 1, "active": true}, {"id": 2, "active": false}]),
    );
    let store = Arc::new(Store::new("main", provider.clone()));
    let observations = Model::new(store, observation_config().with_cache(CachePolicy::All)).unwrap();
    observations.prefetch().await.expect("Failed to prefetch");

    let filtered = observations
        .filter(&json!({"bogus": "x", "active": "true"}), false, true)
        .await
        .expect("Failed to filter");
    assert_eq!(filtered.len(), 1, "unknown attributes are dropped, known ones still apply");

    let unfiltered = observations
        .filter(&json!({"bogus": "x"}), false, true)
        .await
        .expect("Failed to filter");
    assert_eq!(unfiltered.len(), 2, "an all-unknown filter degrades to load()");
}

#[tokio::test]
async fn it_should_embed_nested_children_on_read() {
    let provider = FixtureProvider::new();
    provider.respond(
        "observations",
        json!([
            {"id": 1, "notes": "creek", "readings": [
                {"id": 10, "value": 4},
                {"id": 11, "value": 5}
            ]},
            {"id": 2, "notes": "ridge", "readings": []}
        ]),
    );
    let store = Arc::new(Store::new("main", provider.clone()));
    let observations =
        Model::new(Arc::clone(&store), observation_config().with_cache(CachePolicy::All)).unwrap();
    let readings = Model::new(Arc::clone(&store), reading_config()).unwrap();

    observations.prefetch().await.expect("Failed to prefetch");

    let found = observations.find(1i64, true).await.expect("Failed to find").unwrap();
    let nested = found["readings"].as_array().unwrap();
    assert_eq!(nested.len(), 2, "nested children are reconstructed on read");
    assert!(nested.iter().all(|r| r["observation_id"] == json!(1)));

    let state = store.state().unwrap();
    assert_eq!(state.count("reading"), 2, "children are stored in their own collection");
    let stored = state.collection("observation").unwrap();
    assert!(stored.records.values().all(|r| !r.contains_key("readings")));

    let values = readings
        .filter(&json!({"observation_id": 1}), false, true)
        .await
        .expect("Failed to filter readings");
    assert_eq!(values.len(), 2);
}
