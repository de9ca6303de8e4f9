use crate::error::ModelError;
use crate::query::Query;
use async_trait::async_trait;
use serde_json::Value;

/// Network fetch abstraction. Implementations resolve a [`Query`] against
/// whatever transport backs the store (HTTP client, fixture data, ...) and
/// return the raw JSON response: either a page object
/// (`{list, pages, count, per_page}`) or a bare array.
///
/// Used as `Arc<dyn FetchProvider>`. Errors propagate untouched to the
/// caller of the read that triggered the fetch.
#[async_trait]
pub trait FetchProvider: Send + Sync {
    async fn fetch(&self, query: &Query) -> Result<Value, ModelError>;
}

/// Queue of local mutations not yet synchronized with the server.
///
/// External component; lists consume it through this narrow interface only.
#[async_trait]
pub trait Outbox: Send + Sync {
    /// Pending items matching `query` (all pending items when `None`); with
    /// `with_data`, each item carries its full payload.
    async fn unsynced_items(&self, query: Option<&Query>, with_data: bool) -> Result<Vec<Value>, ModelError>;
}
