use crate::cache::CachePolicy;
use crate::error::ModelError;
use crate::model::ModelConfig;
use crate::query::Query;
use crate::schema::FormField;
use config::{Config, Environment, File};
use serde::Deserialize;

fn default_store_name() -> String {
    "main".to_string()
}

/// Declarative store + model configuration, loaded from a file with
/// `LOCALIST`-prefixed environment overrides.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub models: Vec<ModelSettings>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreSettings {
    #[serde(default = "default_store_name")]
    pub name: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        StoreSettings { name: default_store_name() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelSettings {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub cache: Option<CachePolicy>,
    #[serde(default)]
    pub id_col: Option<String>,
    #[serde(default)]
    pub form: Vec<FormField>,
    #[serde(default)]
    pub filter_fields: Vec<String>,
    #[serde(default)]
    pub filter_ignore: Vec<String>,

    // Pre-cache-policy options, rejected at conversion time.
    #[serde(default)]
    pub max_local_pages: Option<i64>,
    #[serde(default)]
    pub partial: Option<bool>,
    #[serde(default)]
    pub reversed: Option<bool>,
}

impl AppConfig {
    pub fn new(path: &str) -> Result<Self, ModelError> {
        let builder = Config::builder()
            .add_source(File::with_name(path).required(true))
            .add_source(Environment::with_prefix("LOCALIST").try_parsing(true).separator("__"));
        let config: AppConfig = builder.build()?.try_deserialize()?;
        Ok(config)
    }
}

impl ModelSettings {
    pub fn into_config(self) -> Result<ModelConfig, ModelError> {
        for (present, option) in [
            (self.max_local_pages.is_some(), "max_local_pages"),
            (self.partial.is_some(), "partial"),
            (self.reversed.is_some(), "reversed"),
        ] {
            if present {
                return Err(ModelError::Config(format!(
                    "\"{}\" is deprecated in favor of \"cache\"",
                    option
                )));
            }
        }
        let mut config = ModelConfig::new(&self.name)
            .with_form(self.form)
            .with_filter_fields(self.filter_fields)
            .with_filter_ignore(self.filter_ignore);
        if let Some(cache) = self.cache {
            config = config.with_cache(cache);
        }
        if let Some(id_col) = self.id_col {
            config = config.with_id_col(id_col);
        }
        if let Some(url) = self.url {
            config = config.with_url(url);
        }
        if let Some(query) = self.query {
            config = config.with_query(Query::new(query));
        }
        Ok(config)
    }
}
