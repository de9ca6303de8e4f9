use async_trait::async_trait;
use localist::filter::check_value;
use localist::{
    info, AppConfig, ComputeFn, FetchProvider, Model, ModelError, Outbox, Query, Record, RecordId,
    Store, Value,
};
use serde_json::json;
use std::env;
use std::sync::Arc;

const PER_PAGE: usize = 2;

/// Serves canned survey data the way a wq-style REST backend would: bare
/// arrays for unpaginated endpoints, `{list, pages, count, per_page}` pages
/// elsewhere, and single records under `<url>/<id>`.
struct FieldProvider {
    sites: Vec<Value>,
    observations: Vec<Value>,
}

#[async_trait]
impl FetchProvider for FieldProvider {
    async fn fetch(&self, query: &Query) -> Result<Value, ModelError> {
        info!("GET {} params={:?} page={:?}", query.url, query.params, query.page);
        if let Some(rest) = query.url.strip_prefix("observations/") {
            let id: i64 = rest.parse().map_err(ModelError::fetch)?;
            let found = self.observations.iter().find(|o| o["id"] == json!(id)).cloned();
            return Ok(found.unwrap_or(Value::Null));
        }
        match query.url.as_str() {
            "sites" => Ok(Value::Array(self.sites.clone())),
            "observations" => {
                let list: Vec<Value> = self
                    .observations
                    .iter()
                    .filter(|item| {
                        query
                            .params
                            .iter()
                            .all(|(attr, comp)| check_value(&item[attr.as_str()], comp))
                    })
                    .cloned()
                    .collect();
                let count = list.len();
                let pages = count.div_ceil(PER_PAGE).max(1);
                let page = query.page.unwrap_or(1).max(1) as usize;
                let start = (page - 1) * PER_PAGE;
                let slice: Vec<Value> = list.into_iter().skip(start).take(PER_PAGE).collect();
                Ok(json!({
                    "list": slice,
                    "pages": pages,
                    "count": count,
                    "per_page": PER_PAGE,
                    "page": page,
                }))
            }
            other => Err(ModelError::new(format!("no route for {}", other))),
        }
    }
}

struct FieldOutbox {
    items: Vec<Value>,
}

#[async_trait]
impl Outbox for FieldOutbox {
    async fn unsynced_items(&self, query: Option<&Query>, _with_data: bool) -> Result<Vec<Value>, ModelError> {
        let Some(query) = query else {
            return Ok(self.items.clone());
        };
        Ok(self.items.iter().filter(|item| item["url"] == json!(query.url)).cloned().collect())
    }
}

fn sample_provider() -> FieldProvider {
    FieldProvider {
        sites: vec![
            json!({"id": 1, "name": "creek"}),
            json!({"id": 2, "name": "ridge"}),
        ],
        observations: vec![
            json!({"id": 1, "site_id": 1, "notes": "clear water", "active": true,
                   "readings": [{"id": 10, "value": 4.2}, {"id": 11, "value": 4.4}]}),
            json!({"id": 2, "site_id": 1, "notes": "after rainfall", "active": true, "readings": []}),
            json!({"id": 3, "site_id": 2, "notes": "dry channel", "active": false, "readings": []}),
            json!({"id": 4, "site_id": 2, "notes": "spring melt", "active": true,
                   "readings": [{"id": 12, "value": 7.1}]}),
        ],
    }
}

#[tokio::main]
async fn main() -> Result<(), ModelError> {
    let path = env::args().nth(1).unwrap_or_else(|| "demo/fieldlog".to_string());
    let app = AppConfig::new(&path)?;
    info!("Loaded {} model definitions from {}", app.models.len(), path);

    let outbox = Arc::new(FieldOutbox {
        items: vec![json!({"id": 1, "url": "observations", "data": {"notes": "unsent", "active": true}})],
    });
    let store = Arc::new(
        Store::new(app.store.name.clone(), Arc::new(sample_provider())).with_outbox(outbox),
    );

    let mut sites = None;
    let mut observations = None;
    let mut readings = None;
    for settings in app.models.clone() {
        let mut config = settings.into_config()?;
        if config.name == "observation" {
            let at_creek: ComputeFn = Arc::new(|record: &Record| {
                json!(record.get("site_id").and_then(Value::as_i64) == Some(1))
            });
            config = config.with_function("at_creek", at_creek);
        }
        let model = Model::new(Arc::clone(&store), config)?;
        let name = model.name().to_string();
        match name.as_str() {
            "site" => sites = Some(model),
            "observation" => observations = Some(model),
            "reading" => readings = Some(model),
            other => info!("No demo flow for model {}", other),
        }
    }
    let sites = sites.ok_or_else(|| ModelError::new("site model missing from config"))?;
    let observations = observations.ok_or_else(|| ModelError::new("observation model missing from config"))?;
    let readings = readings.ok_or_else(|| ModelError::new("reading model missing from config"))?;

    // cache=all: one prefetch, every later read is local.
    sites.prefetch().await?;
    let site_list = sites.load().await?;
    info!("{} sites cached locally", site_list.count);

    // cache=first_page: page 1 lands locally, page 2 goes to the server.
    let page1 = observations.load().await?;
    info!("observation page 1 of {}: {} of {} rows", page1.pages, page1.list.len(), page1.count);
    let page2 = observations.page(2).await?;
    info!("observation page 2: {} rows", page2.list.len());

    let found = observations.find(1i64, false).await?;
    if let Some(found) = found {
        info!("observation 1 has {} readings", found["readings"].as_array().map_or(0, Vec::len));
    }

    // Server-side filter (partial local list), then a local computed filter.
    let active = observations.filter(&json!({"active": "true"}), false, false).await?;
    info!("{} active observations according to the server", active.len());
    let at_creek = observations.filter(&json!({"at_creek": "true"}), false, true).await?;
    info!("{} locally cached observations were taken at the creek", at_creek.len());

    // Offline create: temporary id now, server-assigned id once synced.
    observations
        .create(json!({"id": "outbox-1", "site_id": 1, "notes": "draft entry", "active": true,
                       "readings": [{"id": "outbox-2", "value": 3.9}]}))
        .await?;
    observations
        .update(vec![json!({"id": 99, "site_id": 1, "notes": "synced entry", "active": true})],
                Some(RecordId::from("outbox-1")))
        .await?;
    let synced = observations.find(99i64, true).await?;
    if let Some(synced) = synced {
        info!(
            "outbox-1 became observation 99; its reading now points at {}",
            synced["readings"][0]["observation_id"]
        );
    }
    let reading_count = readings.load().await?.count;
    info!("{} readings tracked in their own collection", reading_count);

    let pending = observations.unsynced_items(true).await?;
    info!("{} unsynced observation(s) waiting in the outbox", pending.len());
    Ok(())
}
