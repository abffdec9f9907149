use std::sync::{Arc, Mutex};

/// A header as a name-value pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Handle to an engine's header collection, shared with the clients wrapping it.
pub type SharedHeaders = Arc<Mutex<HeaderMap>>;

/// An ordered, case-insensitive, multi-valued header collection.
///
/// Preserves insertion order and allows a name to carry several values.
/// [`add`](HeaderMap::add) appends another value under an existing name,
/// [`set`](HeaderMap::set) replaces every value of a name, and
/// [`get`](HeaderMap::get) returns all values of a name joined with `,`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<Header>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn into_shared(self) -> SharedHeaders {
        Arc::new(Mutex::new(self))
    }

    /// Append a value, keeping any values already stored under `name`.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push(Header::new(name, value));
    }

    /// Replace all values of `name` with `value`.
    ///
    /// The name keeps the position of its first occurrence.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter()
            .position(|h| h.name.eq_ignore_ascii_case(&name))
        {
            Some(first) => {
                self.entries[first].value = value;
                let mut index = 0;
                self.entries.retain(|h| {
                    let keep = index <= first || !h.name.eq_ignore_ascii_case(&name);
                    index += 1;
                    keep
                });
            }
            None => self.entries.push(Header::new(name, value)),
        }
    }

    /// All values of `name` (case-insensitive) joined with `,`.
    pub fn get(&self, name: &str) -> Option<String> {
        let values = self.get_all(name);
        if values.is_empty() {
            None
        } else {
            Some(values.join(","))
        }
    }

    /// Get all header values matching `name` (case-insensitive).
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
            .collect()
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.entries.iter().any(|h| h.name.eq_ignore_ascii_case(name))
    }

    /// Remove every value of `name`. Returns true if anything was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|h| !h.name.eq_ignore_ascii_case(name));
        self.entries.len() != before
    }

    /// Distinct names in order of first appearance, with their original casing.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::new();
        for h in &self.entries {
            if !keys.iter().any(|k| k.eq_ignore_ascii_case(&h.name)) {
                keys.push(h.name.as_str());
            }
        }
        keys
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Raw entries, one per stored value.
    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.entries.iter()
    }

    /// Number of distinct names.
    pub fn len(&self) -> usize {
        self.keys().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_vec(self) -> Vec<Header> {
        self.entries
    }
}

impl FromIterator<Header> for HeaderMap {
    fn from_iter<I: IntoIterator<Item = Header>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl FromIterator<(String, String)> for HeaderMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(n, v)| Header::new(n, v))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_get_case_insensitive() {
        let mut map = HeaderMap::new();
        map.add("Content-Type", "text/html");
        assert_eq!(map.get("content-type").as_deref(), Some("text/html"));
        assert_eq!(map.get("Content-Type").as_deref(), Some("text/html"));
    }

    #[test]
    fn get_missing() {
        let map = HeaderMap::new();
        assert_eq!(map.get("X-Missing"), None);
        assert!(!map.contains_key("X-Missing"));
    }

    #[test]
    fn add_existing_name_appends() {
        let mut map = HeaderMap::new();
        map.add("Accept", "a");
        map.add("accept", "b");

        assert_eq!(map.get("Accept").as_deref(), Some("a,b"));
        assert_eq!(map.get_all("ACCEPT"), vec!["a", "b"]);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn set_replaces_all_values_in_place() {
        let mut map = HeaderMap::new();
        map.add("A", "1");
        map.add("B", "2");
        map.add("a", "3");
        map.set("A", "9");

        assert_eq!(map.get("a").as_deref(), Some("9"));
        assert_eq!(map.keys(), vec!["A", "B"]);
        assert_eq!(map.iter().count(), 2);
    }

    #[test]
    fn set_new_name_appends() {
        let mut map = HeaderMap::new();
        map.set("X-New", "v");
        assert_eq!(map.get("x-new").as_deref(), Some("v"));
    }

    #[test]
    fn remove_drops_every_value() {
        let mut map = HeaderMap::new();
        map.add("Cookie", "a");
        map.add("Other", "b");
        map.add("cookie", "c");

        assert!(map.remove("COOKIE"));
        assert!(!map.contains_key("Cookie"));
        assert!(!map.remove("Cookie"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn keys_keep_first_appearance_order() {
        let map: HeaderMap = vec![
            ("Host".to_string(), "example.com".to_string()),
            ("Accept".to_string(), "*/*".to_string()),
            ("HOST".to_string(), "other".to_string()),
        ]
        .into_iter()
        .collect();

        assert_eq!(map.keys(), vec!["Host", "Accept"]);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn len_and_empty() {
        let mut map = HeaderMap::new();
        assert!(map.is_empty());
        assert_eq!(map.len(), 0);

        map.add("X-Test", "1");
        assert!(!map.is_empty());
        assert_eq!(map.len(), 1);

        map.clear();
        assert!(map.is_empty());
    }

    #[test]
    fn into_vec_preserves_order() {
        let mut map = HeaderMap::new();
        map.add("A", "1");
        map.add("B", "2");

        let vec = map.into_vec();
        assert_eq!(vec.len(), 2);
        assert_eq!(vec[0].name, "A");
        assert_eq!(vec[1].name, "B");
    }
}
