use crate::error::ModelError;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// How much of a list is kept locally vs fetched from the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// No data is cached locally; every read requires a network request.
    None,
    /// First page (e.g. 50 records) is stored locally; subsequent pages can
    /// be loaded from the server.
    #[default]
    FirstPage,
    /// All data is prefetched and stored locally, no subsequent requests are
    /// necessary.
    All,
    /// "Important" data is cached; other data can be accessed via filtered
    /// server queries.
    Filter,
}

/// Concrete read behavior for one policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOpts {
    /// Whether the server may be queried for data beyond the local set.
    pub server: bool,
    /// Whether locally stored data is authoritative.
    pub client: bool,
    /// Highest page number served from local data.
    pub page: i64,
    /// Whether lists are ordered most-recent-first.
    pub reversed: bool,
}

impl CachePolicy {
    pub fn opts(self) -> CacheOpts {
        match self {
            CachePolicy::None => CacheOpts { server: true, client: false, page: 0, reversed: false },
            CachePolicy::FirstPage => CacheOpts { server: true, client: true, page: 1, reversed: true },
            CachePolicy::All => CacheOpts { server: false, client: true, page: 0, reversed: false },
            CachePolicy::Filter => CacheOpts { server: true, client: true, page: 0, reversed: true },
        }
    }
}

impl FromStr for CachePolicy {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(CachePolicy::None),
            "first_page" => Ok(CachePolicy::FirstPage),
            "all" => Ok(CachePolicy::All),
            "filter" => Ok(CachePolicy::Filter),
            _ => Err(ModelError::Config(format!("Unknown cache option {}", s))),
        }
    }
}

impl fmt::Display for CachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CachePolicy::None => "none",
            CachePolicy::FirstPage => "first_page",
            CachePolicy::All => "all",
            CachePolicy::Filter => "filter",
        };
        write!(f, "{}", name)
    }
}

impl<'de> Deserialize<'de> for CachePolicy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        CachePolicy::from_str(&s).map_err(serde::de::Error::custom)
    }
}
