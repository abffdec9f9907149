//! Write commands: batch entries and patch requests.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{DocumentBody, Metadata};
use crate::etag::Etag;

/// One entry of an atomically applied batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "UPPERCASE")]
pub enum CommandData {
    Put {
        key: String,
        etag: Option<Etag>,
        document: DocumentBody,
        metadata: Metadata,
    },
    Delete {
        key: String,
        etag: Option<Etag>,
    },
    Patch {
        key: String,
        etag: Option<Etag>,
        patches: Vec<PatchRequest>,
    },
    #[serde(rename = "EVAL")]
    ScriptedPatch {
        key: String,
        etag: Option<Etag>,
        patch: ScriptedPatchRequest,
    },
}

impl CommandData {
    pub fn key(&self) -> &str {
        match self {
            CommandData::Put { key, .. }
            | CommandData::Delete { key, .. }
            | CommandData::Patch { key, .. }
            | CommandData::ScriptedPatch { key, .. } => key,
        }
    }

    pub fn etag(&self) -> Option<Etag> {
        match self {
            CommandData::Put { etag, .. }
            | CommandData::Delete { etag, .. }
            | CommandData::Patch { etag, .. }
            | CommandData::ScriptedPatch { etag, .. } => *etag,
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            CommandData::Put { .. } => "PUT",
            CommandData::Delete { .. } => "DELETE",
            CommandData::Patch { .. } => "PATCH",
            CommandData::ScriptedPatch { .. } => "EVAL",
        }
    }
}

/// Per-command outcome of a batch, aligned with the submitted commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub key: String,
    pub method: String,
    pub etag: Option<Etag>,
    pub metadata: Option<Metadata>,
    /// Set for deletes: whether a document was actually removed.
    pub deleted: Option<bool>,
    /// Set for patches.
    pub patch_result: Option<PatchResult>,
}

/// Outcome of patching a single document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchResult {
    DocumentDoesNotExist,
    Patched,
    /// The document was missing and was created from the default patches.
    Created,
}

/// Kind of a declarative patch operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchCommandType {
    /// Set a property to `value`.
    Set,
    /// Remove a property.
    Unset,
    /// Append `value` to an array property.
    Add,
    /// Insert `value` into an array property at `position`.
    Insert,
    /// Remove from an array property by `position`, or every element equal to `value`.
    Remove,
    /// Apply `nested` patches to an object property.
    Modify,
    /// Add the numeric `value` to a numeric property.
    Inc,
    /// Copy a property to the name given in `value`.
    Copy,
    /// Rename a property to the name given in `value`.
    Rename,
}

/// A declarative patch applied to one property of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchRequest {
    #[serde(rename = "type")]
    pub kind: PatchCommandType,
    pub name: String,
    #[serde(default)]
    pub value: Option<Value>,
    /// When present the property's current value must equal this one.
    #[serde(default)]
    pub prev_val: Option<Value>,
    #[serde(default)]
    pub position: Option<usize>,
    #[serde(default)]
    pub nested: Vec<PatchRequest>,
}

impl PatchRequest {
    fn new(kind: PatchCommandType, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            value: None,
            prev_val: None,
            position: None,
            nested: Vec::new(),
        }
    }

    pub fn set(name: impl Into<String>, value: Value) -> Self {
        Self {
            value: Some(value),
            ..Self::new(PatchCommandType::Set, name)
        }
    }

    pub fn unset(name: impl Into<String>) -> Self {
        Self::new(PatchCommandType::Unset, name)
    }

    pub fn add(name: impl Into<String>, value: Value) -> Self {
        Self {
            value: Some(value),
            ..Self::new(PatchCommandType::Add, name)
        }
    }

    pub fn insert(name: impl Into<String>, position: usize, value: Value) -> Self {
        Self {
            value: Some(value),
            position: Some(position),
            ..Self::new(PatchCommandType::Insert, name)
        }
    }

    pub fn remove_value(name: impl Into<String>, value: Value) -> Self {
        Self {
            value: Some(value),
            ..Self::new(PatchCommandType::Remove, name)
        }
    }

    pub fn remove_at(name: impl Into<String>, position: usize) -> Self {
        Self {
            position: Some(position),
            ..Self::new(PatchCommandType::Remove, name)
        }
    }

    pub fn modify(name: impl Into<String>, nested: Vec<PatchRequest>) -> Self {
        Self {
            nested,
            ..Self::new(PatchCommandType::Modify, name)
        }
    }

    pub fn inc(name: impl Into<String>, by: i64) -> Self {
        Self {
            value: Some(Value::from(by)),
            ..Self::new(PatchCommandType::Inc, name)
        }
    }

    pub fn copy(name: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            value: Some(Value::String(to.into())),
            ..Self::new(PatchCommandType::Copy, name)
        }
    }

    pub fn rename(name: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            value: Some(Value::String(to.into())),
            ..Self::new(PatchCommandType::Rename, name)
        }
    }

    pub fn with_prev_val(mut self, prev: Value) -> Self {
        self.prev_val = Some(prev);
        self
    }
}

/// A patch expressed as a transformation script.
///
/// `$name` placeholders in the script resolve from `values`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptedPatchRequest {
    pub script: String,
    #[serde(default)]
    pub values: BTreeMap<String, Value>,
}

impl ScriptedPatchRequest {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, name: impl Into<String>, value: Value) -> Self {
        self.values.insert(name.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn command_accessors() {
        let put = CommandData::Put {
            key: "users/1".into(),
            etag: Some(Etag::from_sequence(4)),
            document: DocumentBody::new(),
            metadata: Metadata::new(),
        };
        assert_eq!(put.key(), "users/1");
        assert_eq!(put.method(), "PUT");
        assert_eq!(put.etag(), Some(Etag::from_sequence(4)));

        let eval = CommandData::ScriptedPatch {
            key: "users/2".into(),
            etag: None,
            patch: ScriptedPatchRequest::new("this.Age = 3;"),
        };
        assert_eq!(eval.method(), "EVAL");
        assert_eq!(eval.etag(), None);
    }

    #[test]
    fn command_serializes_with_method_tag() {
        let delete = CommandData::Delete {
            key: "users/1".into(),
            etag: None,
        };
        let json = serde_json::to_value(&delete).unwrap();
        assert_eq!(json["method"], "DELETE");

        let eval = CommandData::ScriptedPatch {
            key: "users/1".into(),
            etag: None,
            patch: ScriptedPatchRequest::new(""),
        };
        assert_eq!(serde_json::to_value(&eval).unwrap()["method"], "EVAL");
    }

    #[test]
    fn patch_builders_fill_expected_fields() {
        let inc = PatchRequest::inc("Count", 5);
        assert_eq!(inc.kind, PatchCommandType::Inc);
        assert_eq!(inc.value, Some(json!(5)));

        let ins = PatchRequest::insert("Tags", 1, json!("b"));
        assert_eq!(ins.position, Some(1));

        let guarded = PatchRequest::set("Name", json!("x")).with_prev_val(json!("y"));
        assert_eq!(guarded.prev_val, Some(json!("y")));

        let rename = PatchRequest::rename("Old", "New");
        assert_eq!(rename.value, Some(json!("New")));
    }

    #[test]
    fn scripted_patch_collects_values() {
        let patch = ScriptedPatchRequest::new("this.Name = $name;").with_value("name", json!("Ada"));
        assert_eq!(patch.values["name"], json!("Ada"));
    }
}
