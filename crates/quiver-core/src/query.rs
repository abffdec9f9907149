//! Index definitions, queries and their results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::document::JsonDocument;

/// Default number of results per page when a query does not say otherwise.
pub const DEFAULT_PAGE_SIZE: usize = 128;

/// Definition of a static index.
///
/// Each field is a dotted path into the document body, optionally prefixed
/// with the name queries use for it (`AuthorName=Authors[].Name`). Without
/// an alias the field is queried by its path with `[]` removed. A segment
/// ending in `[]` steps into every element of an array, so a single
/// document may contribute several index entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDefinition {
    /// Set by the engine when the index is stored.
    #[serde(default)]
    pub name: String,
    /// Only documents whose `Collection` metadata matches are indexed.
    #[serde(default)]
    pub collection: Option<String>,
    pub fields: Vec<String>,
}

impl IndexDefinition {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: String::new(),
            collection: None,
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn for_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }
}

/// A query against an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexQuery {
    /// `Field:value` terms separated by whitespace or `AND`. Empty matches everything.
    pub query: String,
    pub start: usize,
    pub page_size: usize,
    #[serde(default)]
    pub wait_for_non_stale_results: bool,
}

impl Default for IndexQuery {
    fn default() -> Self {
        Self {
            query: String::new(),
            start: 0,
            page_size: DEFAULT_PAGE_SIZE,
            wait_for_non_stale_results: false,
        }
    }
}

impl IndexQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn skip(mut self, start: usize) -> Self {
        self.start = start;
        self
    }

    pub fn take(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }
}

/// Documents matched by a query plus paging statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub index_name: String,
    pub results: Vec<JsonDocument>,
    pub includes: Vec<JsonDocument>,
    /// Number of index entries matching the query.
    pub total_results: usize,
    /// Entries inside the page window dropped because their document was already returned.
    pub skipped_results: usize,
    /// Whether the index lagged behind recent writes when the query ran.
    pub is_stale: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionQuery {
    pub term: String,
    pub field: String,
    pub max_suggestions: usize,
    /// Maximum edit distance between the term and a suggestion.
    pub distance: usize,
}

impl SuggestionQuery {
    pub fn new(field: impl Into<String>, term: impl Into<String>) -> Self {
        Self {
            term: term.into(),
            field: field.into(),
            max_suggestions: 15,
            distance: 2,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionQueryResult {
    pub suggestions: Vec<String>,
}

/// One facet named in a facet setup document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Facet {
    pub name: String,
}

/// Body of a facet setup document: `{"Facets": [{"Name": "Field"}]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FacetSetup {
    pub facets: Vec<Facet>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetValue {
    pub range: String,
    pub hits: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetResult {
    pub values: Vec<FacetValue>,
}

/// Facet results keyed by facet name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetResults {
    pub results: BTreeMap<String, FacetResult>,
}
