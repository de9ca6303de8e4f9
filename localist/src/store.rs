use crate::error::ModelError;
use crate::provider::{FetchProvider, Outbox};
use crate::query::Query;
use crate::reducer::{reduce, Action};
use crate::schema::Registry;
use crate::state::OrmState;
use serde_json::Value;
use std::sync::{Arc, Mutex};

/// Holds the normalized state for one named store, together with its schema
/// registry and external collaborators.
///
/// All writes funnel through [`dispatch`](Store::dispatch), which applies
/// the reducer synchronously and atomically swaps in the new state; reads
/// take a cheap [`Arc`] snapshot. Dispatches apply in issue order. There is
/// no fetch deduplication: two concurrent identical fetches both apply their
/// result, which is safe because upserts are idempotent by id.
pub struct Store {
    name: String,
    registry: Arc<Registry>,
    state: Mutex<Arc<OrmState>>,
    provider: Arc<dyn FetchProvider>,
    outbox: Option<Arc<dyn Outbox>>,
}

impl Store {
    pub fn new(name: impl Into<String>, provider: Arc<dyn FetchProvider>) -> Self {
        Store {
            name: name.into(),
            registry: Arc::new(Registry::new()),
            state: Mutex::new(Arc::new(OrmState::default())),
            provider,
            outbox: None,
        }
    }

    pub fn with_outbox(mut self, outbox: Arc<dyn Outbox>) -> Self {
        self.outbox = Some(outbox);
        self
    }

    /// Replaces the default empty registry, e.g. to share one across stores
    /// or to pre-register schemas.
    pub fn with_registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    pub fn outbox(&self) -> Option<Arc<dyn Outbox>> {
        self.outbox.clone()
    }

    /// Applies one action through the reducer. Synchronous: when this
    /// returns, the new state is visible to every subsequent read.
    pub fn dispatch(&self, action: Action) -> Result<(), ModelError> {
        let mut guard = self.state.lock()?;
        let next = reduce(&self.registry, &guard, &action)?;
        *guard = Arc::new(next);
        Ok(())
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> Result<Arc<OrmState>, ModelError> {
        Ok(Arc::clone(&*self.state.lock()?))
    }

    pub async fn fetch(&self, query: &Query) -> Result<Value, ModelError> {
        self.provider.fetch(query).await
    }
}
