//! Server-level types: statistics, credentials and the remote-only admin payloads.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::etag::Etag;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseStatistics {
    pub database: String,
    pub count_of_documents: u64,
    pub count_of_indexes: u64,
    pub count_of_attachments: u64,
    pub stale_indexes: Vec<String>,
    pub last_doc_etag: Option<Etag>,
    pub last_attachment_etag: Option<Etag>,
}

/// Credentials a handle is rebound to.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub user_name: String,
    pub password: String,
    #[serde(default)]
    pub domain: Option<String>,
}

impl Credentials {
    pub fn new(user_name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            password: password.into(),
            domain: None,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user_name", &self.user_name)
            .field("password", &"<redacted>")
            .field("domain", &self.domain)
            .finish()
    }
}

// ── Remote-only payloads ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogItem {
    pub timestamp: u64,
    pub level: String,
    pub logger: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicensingStatus {
    pub status: String,
    pub error: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildNumber {
    pub product_version: String,
    pub build_version: String,
}

/// Database document sent along with a backup request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseDocument {
    pub id: String,
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_debug_hides_password() {
        let creds = Credentials::new("admin", "hunter2");
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("hunter2"));
    }
}
