use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A remote list query: relative url plus optional filter params and page
/// number. The fetch provider decides how these map onto actual requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub url: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,
}

impl Query {
    pub fn new(url: impl Into<String>) -> Self {
        Query { url: url.into(), ..Query::default() }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_params(mut self, params: impl IntoIterator<Item = (String, Value)>) -> Self {
        self.params.extend(params);
        self
    }

    pub fn with_page(mut self, page: i64) -> Self {
        self.page = Some(page);
        self
    }
}

impl From<&str> for Query {
    fn from(url: &str) -> Self {
        Query::new(url)
    }
}

/// One page of list data as returned by the remote source (or assembled from
/// local records).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub list: Vec<Value>,
    #[serde(default)]
    pub pages: i64,
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub per_page: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,
}

impl Page {
    pub fn from_list(list: Vec<Value>) -> Page {
        let n = list.len() as i64;
        Page { list, pages: 1, count: n, per_page: n, page: None }
    }

    /// Normalizes a raw fetch response: `null` becomes an empty list, a bare
    /// array becomes a single page, and missing or zero pagination fields
    /// default from the list length.
    pub fn process(data: Value) -> Result<Page, ModelError> {
        match data {
            Value::Null => Ok(Page::from_list(Vec::new())),
            Value::Array(list) => Ok(Page::from_list(list)),
            Value::Object(map) => {
                let list = match map.get("list") {
                    Some(Value::Array(list)) => list.clone(),
                    _ => return Err(ModelError::BadResponse("missing \"list\" array".to_string())),
                };
                let n = list.len() as i64;
                let field = |name: &str| map.get(name).and_then(Value::as_i64).filter(|v| *v != 0);
                Ok(Page {
                    pages: field("pages").unwrap_or(1),
                    count: field("count").unwrap_or(n),
                    per_page: field("per_page").unwrap_or(n),
                    page: map.get("page").and_then(Value::as_i64),
                    list,
                })
            }
            other => Err(ModelError::BadResponse(format!("unexpected response: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_arrays_become_single_pages() {
        let page = Page::process(json!([{"id": 1}, {"id": 2}])).unwrap();
        assert_eq!(page.pages, 1);
        assert_eq!(page.count, 2);
        assert_eq!(page.per_page, 2);
        assert_eq!(page.page, None);
    }

    #[test]
    fn null_responses_become_empty_pages() {
        let page = Page::process(Value::Null).unwrap();
        assert!(page.list.is_empty());
        assert_eq!(page.count, 0);
    }

    #[test]
    fn pagination_fields_default_from_list_length() {
        let page = Page::process(json!({"list": [{"id": 1}], "pages": 0})).unwrap();
        assert_eq!(page.pages, 1);
        assert_eq!(page.count, 1);
        assert_eq!(page.per_page, 1);

        let page = Page::process(json!({
            "list": [{"id": 1}],
            "pages": 3, "count": 120, "per_page": 50, "page": 2
        }))
        .unwrap();
        assert_eq!(page.pages, 3);
        assert_eq!(page.count, 120);
        assert_eq!(page.per_page, 50);
        assert_eq!(page.page, Some(2));
    }

    #[test]
    fn objects_without_a_list_are_rejected() {
        assert!(Page::process(json!({"count": 3})).is_err());
        assert!(Page::process(json!("nope")).is_err());
    }
}
