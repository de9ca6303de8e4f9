//! localist keeps named lists of JSON records locally, synchronized with a
//! paginated remote source.
//!
//! Records live in a normalized in-memory store: nested child rows are split
//! into their own collections and re-attached on read, foreign keys are
//! tracked through a lazily computed reverse-relation index, and every
//! mutation flows through a pure reducer that maintains per-collection
//! pagination counts. A [`Model`] is the public facade over one list; its
//! cache policy decides when a read is served locally and when it costs a
//! network round-trip through the [`FetchProvider`].

pub mod cache;
pub mod error;
pub mod filter;
pub mod ids;
pub mod logger;
pub mod model;
pub mod provider;
pub mod query;
pub mod reducer;
pub mod relations;
pub mod schema;
pub mod settings;
pub mod state;
pub mod store;

pub use cache::{CacheOpts, CachePolicy};
pub use error::ModelError;
pub use filter::{ComputeFn, Functions};
pub use ids::RecordId;
pub use model::{Model, ModelConfig};
pub use provider::{FetchProvider, Outbox};
pub use query::{Page, Query};
pub use reducer::{reduce, Action, ActionKind};
pub use relations::ReverseRel;
pub use schema::{FieldDef, FieldKind, FormField, ModelDef, Registry};
pub use settings::{AppConfig, ModelSettings, StoreSettings};
pub use state::{Collection, CollectionMeta, OrmState, Record};
pub use store::Store;

pub use async_trait::async_trait;
pub use serde;
pub use serde::{Deserialize, Serialize};
pub use serde_json;
pub use serde_json::{Map, Value};
pub use std::sync::Arc;
