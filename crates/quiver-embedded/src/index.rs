//! Index evaluation: entries, query terms, paging, terms, suggestions and facets.
//!
//! Indexes are evaluated against the current documents every time they are
//! queried. Each indexed document produces one or more entries; entries of
//! one document are contiguous and documents are visited in key order.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use quiver_core::{
    CommandError, CommandResult, DocumentBody, FacetValue, IndexDefinition, JsonDocument,
    SuggestionQuery,
};
use serde_json::Value;

#[derive(Debug, Clone)]
struct Segment {
    name: String,
    fan_out: bool,
}

#[derive(Debug, Clone)]
struct IndexField {
    alias: String,
    path: Vec<Segment>,
}

/// An index definition ready to produce entries.
#[derive(Debug, Clone)]
pub struct CompiledIndex {
    name: String,
    collection: Option<String>,
    fields: Vec<IndexField>,
}

/// One index entry: the document it came from and one value per field.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub doc: usize,
    pub values: Vec<Value>,
}

impl CompiledIndex {
    pub fn compile(definition: &IndexDefinition) -> CommandResult<Self> {
        if definition.fields.is_empty() {
            return Err(CommandError::InvalidQuery(format!(
                "index '{}' defines no fields",
                definition.name
            )));
        }
        let fields = definition
            .fields
            .iter()
            .map(|field| parse_field(field))
            .collect::<CommandResult<Vec<_>>>()?;
        Ok(Self {
            name: definition.name.clone(),
            collection: definition.collection.clone(),
            fields,
        })
    }

    /// Whether `doc` belongs to the index's collection.
    pub fn covers(&self, doc: &JsonDocument) -> bool {
        match (&self.collection, doc.collection()) {
            (None, _) => true,
            (Some(wanted), Some(actual)) => wanted.eq_ignore_ascii_case(actual),
            (Some(_), None) => false,
        }
    }

    /// Position of the field queried as `alias`.
    pub fn field(&self, alias: &str) -> CommandResult<usize> {
        self.fields
            .iter()
            .position(|f| f.alias.eq_ignore_ascii_case(alias))
            .ok_or_else(|| {
                CommandError::InvalidQuery(format!("index '{}' has no field '{alias}'", self.name))
            })
    }

    /// Entries for `docs`, in document order.
    pub fn entries(&self, docs: &[JsonDocument]) -> Vec<IndexEntry> {
        let mut entries = Vec::new();
        for (doc_index, doc) in docs.iter().enumerate() {
            if !self.covers(doc) {
                continue;
            }
            let body = Value::Object(doc.data.clone());
            let per_field: Vec<Vec<Value>> = self
                .fields
                .iter()
                .map(|field| {
                    let values = extract(&body, &field.path);
                    if values.is_empty() { vec![Value::Null] } else { values }
                })
                .collect();
            for values in cartesian(&per_field) {
                entries.push(IndexEntry {
                    doc: doc_index,
                    values,
                });
            }
        }
        entries
    }
}

fn parse_field(field: &str) -> CommandResult<IndexField> {
    let (alias, path) = match field.split_once('=') {
        Some((alias, path)) => (alias.trim().to_string(), path.trim()),
        None => (field.trim().replace("[]", ""), field.trim()),
    };
    let path = parse_path(path);
    if alias.is_empty() || path.iter().any(|s| s.name.is_empty()) {
        return Err(CommandError::InvalidQuery(format!("invalid index field '{field}'")));
    }
    Ok(IndexField { alias, path })
}

fn parse_path(path: &str) -> Vec<Segment> {
    path.split('.')
        .map(|raw| match raw.strip_suffix("[]") {
            Some(name) => Segment {
                name: name.to_string(),
                fan_out: true,
            },
            None => Segment {
                name: raw.to_string(),
                fan_out: false,
            },
        })
        .collect()
}

/// Values at a dotted `path` of `body`, stepping into arrays at `[]` segments.
pub fn values_at(body: &DocumentBody, path: &str) -> Vec<Value> {
    let segments = parse_path(path);
    let Some((first, rest)) = segments.split_first() else {
        return Vec::new();
    };
    match body.get(&first.name) {
        Some(Value::Array(items)) if first.fan_out => {
            items.iter().flat_map(|item| extract(item, rest)).collect()
        }
        Some(child) => extract(child, rest),
        None => Vec::new(),
    }
}

fn extract(value: &Value, path: &[Segment]) -> Vec<Value> {
    let Some((segment, rest)) = path.split_first() else {
        return vec![value.clone()];
    };
    let Some(child) = value.as_object().and_then(|obj| obj.get(&segment.name)) else {
        return Vec::new();
    };
    match child {
        Value::Array(items) if segment.fan_out => {
            items.iter().flat_map(|item| extract(item, rest)).collect()
        }
        other => extract(other, rest),
    }
}

fn cartesian(per_field: &[Vec<Value>]) -> Vec<Vec<Value>> {
    let mut combos: Vec<Vec<Value>> = vec![Vec::new()];
    for values in per_field {
        let mut next = Vec::with_capacity(combos.len() * values.len());
        for combo in &combos {
            for value in values {
                let mut extended = combo.clone();
                extended.push(value.clone());
                next.push(extended);
            }
        }
        combos = next;
    }
    combos
}

// ── Queries ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Matcher {
    Any,
    Prefix(String),
    Exact(String),
}

#[derive(Debug, Clone)]
pub struct Term {
    field: usize,
    matcher: Matcher,
}

/// Parse `Field:value` terms separated by whitespace or `AND`.
pub fn parse_query(index: &CompiledIndex, query: &str) -> CommandResult<Vec<Term>> {
    let mut terms = Vec::new();
    for token in tokenize(query) {
        if token == "AND" {
            continue;
        }
        let Some((field, value)) = token.split_once(':') else {
            return Err(CommandError::InvalidQuery(format!(
                "expected Field:value, got '{token}'"
            )));
        };
        let field = index.field(field)?;
        let value = unquote(value).to_lowercase();
        let matcher = if value == "*" {
            Matcher::Any
        } else if let Some(prefix) = value.strip_suffix('*') {
            Matcher::Prefix(prefix.to_string())
        } else {
            Matcher::Exact(value)
        };
        terms.push(Term { field, matcher });
    }
    Ok(terms)
}

fn tokenize(query: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for c in query.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

impl Term {
    pub fn matches(&self, entry: &IndexEntry) -> bool {
        entry
            .values
            .get(self.field)
            .is_some_and(|value| self.matches_value(value))
    }

    fn matches_value(&self, value: &Value) -> bool {
        match value {
            Value::Array(items) => items.iter().any(|item| self.matches_value(item)),
            Value::Object(_) => false,
            Value::Null => self.matcher == Matcher::Exact("null".into()),
            scalar => {
                let Some(text) = term_text(scalar) else {
                    return false;
                };
                let text = text.to_lowercase();
                match &self.matcher {
                    Matcher::Any => true,
                    Matcher::Prefix(prefix) => text.starts_with(prefix.as_str()),
                    Matcher::Exact(exact) => text == *exact,
                }
            }
        }
    }
}

/// Document index of every entry matching all `terms`, in entry order.
pub fn matching_entries(entries: &[IndexEntry], terms: &[Term]) -> Vec<usize> {
    entries
        .iter()
        .filter(|entry| terms.iter().all(|term| term.matches(entry)))
        .map(|entry| entry.doc)
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub docs: Vec<usize>,
    pub skipped: usize,
}

/// Walk matching entries from `start`, emitting each document once.
///
/// Entries repeating a document already emitted on this page are counted as
/// skipped, including those directly following the last emitted document,
/// so the next page starts at `start + page_size + skipped`.
pub fn page(matching: &[usize], start: usize, page_size: usize) -> Page {
    let mut page = Page::default();
    let mut seen = HashSet::new();
    for &doc in matching.iter().skip(start) {
        if seen.contains(&doc) {
            page.skipped += 1;
            continue;
        }
        if page.docs.len() == page_size {
            break;
        }
        seen.insert(doc);
        page.docs.push(doc);
    }
    page
}

// ── Terms, suggestions, facets ─────────────────────────────────────

/// Text form of a scalar index value.
fn term_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn flatten_terms(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Array(items) => items.iter().for_each(|item| flatten_terms(item, out)),
        other => out.extend(term_text(other)),
    }
}

/// Sorted distinct values of `field` greater than `from_value`.
pub fn terms(entries: &[IndexEntry], field: usize, from_value: &str, page_size: usize) -> Vec<String> {
    let mut all = BTreeSet::new();
    for entry in entries {
        let mut values = Vec::new();
        if let Some(value) = entry.values.get(field) {
            flatten_terms(value, &mut values);
        }
        all.extend(values);
    }
    all.into_iter()
        .filter(|term| from_value.is_empty() || term.as_str() > from_value)
        .take(page_size)
        .collect()
}

/// Terms within `query.distance` edits of `query.term`, closest first.
pub fn suggest(terms: &[String], query: &SuggestionQuery) -> Vec<String> {
    let wanted = query.term.to_lowercase();
    let mut scored: Vec<(usize, String)> = terms
        .iter()
        .map(|term| term.to_lowercase())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .filter(|term| *term != wanted)
        .map(|term| (levenshtein(&wanted, &term), term))
        .filter(|(distance, _)| *distance <= query.distance)
        .collect();
    scored.sort();
    scored
        .into_iter()
        .take(query.max_suggestions)
        .map(|(_, term)| term)
        .collect()
}

pub fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, ca) in a.chars().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != *cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

/// Hits per value of `field` over the matching entries, counting each
/// document once per value. Sorted by hits descending, then value.
pub fn facet_values(entries: &[IndexEntry], terms: &[Term], field: usize) -> Vec<FacetValue> {
    let mut docs_per_value: BTreeMap<String, HashSet<usize>> = BTreeMap::new();
    for entry in entries.iter().filter(|e| terms.iter().all(|t| t.matches(e))) {
        let mut values = Vec::new();
        if let Some(value) = entry.values.get(field) {
            flatten_terms(value, &mut values);
        }
        for value in values {
            docs_per_value.entry(value).or_default().insert(entry.doc);
        }
    }
    let mut facets: Vec<FacetValue> = docs_per_value
        .into_iter()
        .map(|(range, docs)| FacetValue {
            range,
            hits: docs.len(),
        })
        .collect();
    facets.sort_by(|a, b| b.hits.cmp(&a.hits).then_with(|| a.range.cmp(&b.range)));
    facets
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiver_core::{COLLECTION_METADATA_KEY, Metadata};
    use serde_json::json;

    fn doc(key: &str, collection: Option<&str>, data: Value) -> JsonDocument {
        let mut metadata = Metadata::new();
        if let Some(collection) = collection {
            metadata.insert(COLLECTION_METADATA_KEY.into(), json!(collection));
        }
        JsonDocument {
            key: key.into(),
            etag: None,
            data: data.as_object().cloned().unwrap(),
            metadata,
            last_modified: None,
        }
    }

    fn books() -> Vec<JsonDocument> {
        vec![
            doc("books/1", Some("Books"), json!({"Title": "My Favourite Dragon", "Categories": ["Fantasy"], "Authors": [{"Name": "George Martin"}]})),
            doc("books/2", Some("Books"), json!({"Title": "Space Adventure", "Categories": ["SciFi"], "Authors": [{"Name": "George Martin"}]})),
            doc("books/3", Some("Books"), json!({"Title": "Dwarves In Space", "Categories": ["SciFi", "Fantasy"], "Authors": [{"Name": "George Martin"}, {"Name": "Brandon Sanderson"}]})),
            doc("books/4", Some("Books"), json!({"Title": "Boy Learns Magic", "Categories": ["Fantasy"], "Authors": [{"Name": "George Martin"}, {"Name": "Brandon Sanderson"}]})),
            doc("books/5", Some("Books"), json!({"Title": "School Of Dragons", "Categories": ["Fantasy"], "Authors": [{"Name": "George Martin"}]})),
            doc("users/1", Some("Users"), json!({"Name": "Oren"})),
        ]
    }

    fn by_author() -> CompiledIndex {
        CompiledIndex::compile(
            &IndexDefinition::new(["AuthorName=Authors[].Name", "Categories"]).for_collection("Books"),
        )
        .unwrap()
    }

    #[test]
    fn fan_out_produces_contiguous_entries_per_document() {
        let entries = by_author().entries(&books());
        let docs: Vec<usize> = entries.iter().map(|e| e.doc).collect();
        assert_eq!(docs, vec![0, 1, 2, 2, 3, 3, 4]);
        assert_eq!(entries[3].values[0], json!("Brandon Sanderson"));
        assert_eq!(entries[3].values[1], json!(["SciFi", "Fantasy"]));
    }

    #[test]
    fn default_alias_strips_array_markers() {
        let index = CompiledIndex::compile(&IndexDefinition::new(["Authors[].Name"])).unwrap();
        assert_eq!(index.field("authors.name").unwrap(), 0);
        assert!(index.field("Authors[].Name").is_err());
    }

    #[test]
    fn missing_field_yields_null_entry() {
        let index = CompiledIndex::compile(&IndexDefinition::new(["Missing"])).unwrap();
        let entries = index.entries(&books()[..1]);
        assert_eq!(entries, vec![IndexEntry { doc: 0, values: vec![Value::Null] }]);
    }

    #[test]
    fn query_matches_array_members_case_insensitively() {
        let index = by_author();
        let entries = index.entries(&books());
        let terms = parse_query(&index, "Categories:fantasy").unwrap();
        assert_eq!(matching_entries(&entries, &terms), vec![0, 2, 2, 3, 3, 4]);
    }

    #[test]
    fn query_terms_combine_with_and() {
        let index = by_author();
        let entries = index.entries(&books());
        let terms = parse_query(&index, r#"Categories:Fantasy AND AuthorName:"Brandon Sanderson""#).unwrap();
        assert_eq!(matching_entries(&entries, &terms), vec![2, 3]);

        let prefix = parse_query(&index, "AuthorName:bran*").unwrap();
        assert_eq!(matching_entries(&entries, &prefix), vec![2, 3]);
    }

    #[test]
    fn empty_query_matches_everything() {
        let index = by_author();
        let entries = index.entries(&books());
        assert_eq!(matching_entries(&entries, &parse_query(&index, "  ").unwrap()).len(), 7);
    }

    #[test]
    fn malformed_and_unknown_terms_are_rejected() {
        let index = by_author();
        assert!(matches!(parse_query(&index, "Fantasy"), Err(CommandError::InvalidQuery(_))));
        assert!(matches!(parse_query(&index, "Title:x"), Err(CommandError::InvalidQuery(_))));
    }

    #[test]
    fn pages_balance_with_skipped_results() {
        let matching = vec![0, 2, 2, 3, 3, 4];

        let first = page(&matching, 0, 3);
        assert_eq!(first.docs, vec![0, 2, 3]);
        assert_eq!(first.skipped, 2);

        let second = page(&matching, 3 + first.skipped, 3);
        assert_eq!(second.docs, vec![4]);
        assert_eq!(first.docs.len() + second.docs.len(), 4);

        let last = page(&matching, 3, 128);
        assert_eq!(last.docs.len() + last.skipped + 3, matching.len());
    }

    #[test]
    fn terms_are_sorted_distinct_and_paged() {
        let index = by_author();
        let entries = index.entries(&books());
        let field = index.field("Categories").unwrap();
        assert_eq!(terms(&entries, field, "", 10), vec!["Fantasy", "SciFi"]);
        assert_eq!(terms(&entries, field, "Fantasy", 10), vec!["SciFi"]);
        assert_eq!(terms(&entries, field, "", 1), vec!["Fantasy"]);
    }

    #[test]
    fn suggestions_are_ordered_by_distance() {
        let candidates: Vec<String> = ["oren", "ayende", "owen", "orin", "karen"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let result = suggest(&candidates, &SuggestionQuery::new("Name", "Oren"));
        assert_eq!(result, vec!["orin", "owen", "karen"]);
    }

    #[test]
    fn values_at_steps_into_arrays() {
        let body = books()[2].data.clone();
        assert_eq!(
            values_at(&body, "Authors[].Name"),
            vec![json!("George Martin"), json!("Brandon Sanderson")]
        );
        assert_eq!(values_at(&body, "Title"), vec![json!("Dwarves In Space")]);
        assert!(values_at(&body, "Publisher.Name").is_empty());
    }

    #[test]
    fn levenshtein_distances() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }

    #[test]
    fn facets_count_documents_once_per_value() {
        let index = by_author();
        let entries = index.entries(&books());
        let field = index.field("AuthorName").unwrap();
        let terms = parse_query(&index, "Categories:Fantasy").unwrap();
        let facets = facet_values(&entries, &terms, field);
        assert_eq!(
            facets,
            vec![
                FacetValue { range: "George Martin".into(), hits: 4 },
                FacetValue { range: "Brandon Sanderson".into(), hits: 2 },
            ]
        );
    }
}
