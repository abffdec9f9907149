//! Multi-get requests and raw endpoint requests.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::header::Header;

/// One read request inside a multi-get round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetRequest {
    /// Endpoint path, e.g. `/docs/users/1` or `/indexes/byName`.
    pub url: String,
    /// Query string without the leading `?`.
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl GetRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Decoded `name=value` pairs of the query string, in order.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let query = self.query.as_deref().unwrap_or_default();
        // Pairs of strings always deserialize; bad escapes decode lossily.
        serde_urlencoded::from_str(query).unwrap_or_default()
    }

    /// First value of a query string parameter.
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.query_pairs()
            .into_iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }
}

/// Response to one [`GetRequest`], aligned with its request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetResponse {
    pub status: u16,
    pub result: Value,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl GetResponse {
    pub fn new(status: u16, result: Value) -> Self {
        Self {
            status,
            result,
            headers: BTreeMap::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A request to a raw endpoint, as a remote transport would issue it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRequest {
    pub url: String,
    pub method: String,
    pub headers: Vec<Header>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_pairs_decode() {
        let req = GetRequest::new("/indexes/byName").with_query("query=Name%3AAda+Lovelace&start=5");
        assert_eq!(
            req.query_pairs(),
            vec![
                ("query".to_string(), "Name:Ada Lovelace".to_string()),
                ("start".to_string(), "5".to_string()),
            ]
        );
        assert_eq!(req.query_param("START").as_deref(), Some("5"));
        assert_eq!(req.query_param("pageSize"), None);
    }

    #[test]
    fn empty_query_has_no_pairs() {
        assert!(GetRequest::new("/docs/a").query_pairs().is_empty());
    }

    #[test]
    fn trailing_percent_is_kept() {
        let req = GetRequest::new("/docs").with_query("startsWith=abc%");
        assert_eq!(req.query_param("startsWith").as_deref(), Some("abc%"));
    }

    #[test]
    fn repeated_names_and_bare_names_keep_order() {
        let req = GetRequest::new("/queries").with_query("id=users%2F1&&id=users/2&flag");
        assert_eq!(
            req.query_pairs(),
            vec![
                ("id".to_string(), "users/1".to_string()),
                ("id".to_string(), "users/2".to_string()),
                ("flag".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn response_success_range() {
        assert!(GetResponse::new(200, json!({})).is_success());
        assert!(!GetResponse::new(404, Value::Null).is_success());
    }
}
