//! redb-backed storage for Quiver documents.
//!
//! Document bodies, attachment headers and index definitions are
//! JSON-serialized into `&[u8]` value columns; attachment payloads are stored
//! raw. Every mutation runs inside one redb write transaction, which is what
//! makes a batch atomic: a failing command drops the transaction and nothing
//! it wrote becomes visible.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use quiver_core::{
    CommandError, CommandResult, Credentials, DocumentBody, Etag, HeaderMap, JsonDocument,
    LAST_MODIFIED_METADATA_KEY, Metadata, PatchResult, QuiverConfig, SYSTEM_DATABASE,
    SharedHeaders,
};
use redb::{
    Database, ReadOnlyTable, ReadTransaction, ReadableDatabase, ReadableTable, TableDefinition,
    TableError, WriteTransaction,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::DocumentCache;
use crate::tables::{DATABASES, DatabaseTables, LAST_ETAG, META};

/// Convert any `Display` error into a `CommandError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| CommandError::$variant(e.to_string())
    };
}

pub(crate) use map_err;

/// A transformation of a document body, as run by a patch.
pub(crate) type Transform<'a> = &'a dyn Fn(&mut DocumentBody) -> CommandResult<()>;

/// A document as persisted in a `{db}/docs` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredDocument {
    pub key: String,
    pub etag: Etag,
    pub data: DocumentBody,
    pub metadata: Metadata,
    pub last_modified: u64,
}

impl StoredDocument {
    pub fn into_document(self) -> JsonDocument {
        JsonDocument {
            key: self.key,
            etag: Some(self.etag),
            data: self.data,
            metadata: self.metadata,
            last_modified: Some(self.last_modified),
        }
    }
}

/// Attachment header as persisted in a `{db}/attachments` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredAttachment {
    pub key: String,
    pub etag: Etag,
    pub metadata: Metadata,
    pub size: u64,
}

/// Handle to one named database inside a shared redb file.
///
/// Handles are cheap to clone. Handles created by scoping share the
/// storage, the document cache and the read-from-master flag; each carries
/// its own operations headers and credentials.
#[derive(Clone)]
pub struct EmbeddedDatabase {
    db: Arc<Database>,
    database: String,
    pub(crate) tables: DatabaseTables,
    pub(crate) headers: SharedHeaders,
    credentials: Option<Credentials>,
    pub(crate) cache: Arc<DocumentCache>,
    read_from_master: Arc<AtomicBool>,
}

impl EmbeddedDatabase {
    /// Open (or create) a persistent store at the given path, scoped to the
    /// system database.
    pub fn open(path: &Path) -> CommandResult<Self> {
        let db = Database::create(path).map_err(map_err!(Storage))?;
        debug!(?path, "embedded database opened");
        Ok(Self::from_database(db, true))
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> CommandResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Storage))?;
        debug!("in-memory embedded database opened");
        Ok(Self::from_database(db, true))
    }

    /// Open the store described by `config`: its file (or memory), its
    /// caching switch and its default database.
    pub fn open_with_config(config: &QuiverConfig) -> CommandResult<Self> {
        let store = match &config.storage.path {
            Some(path) => Self::open(path)?,
            None => Self::open_in_memory()?,
        };
        let store = store.with_caching(config.caching.enabled);
        Ok(match &config.database.default {
            Some(name) => store.scoped(name),
            None => store,
        })
    }

    fn from_database(db: Database, caching: bool) -> Self {
        Self {
            db: Arc::new(db),
            database: SYSTEM_DATABASE.to_string(),
            tables: DatabaseTables::new(SYSTEM_DATABASE),
            headers: HeaderMap::new().into_shared(),
            credentials: None,
            cache: Arc::new(DocumentCache::new(caching)),
            read_from_master: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replace the document cache with a fresh one that is on or off.
    pub fn with_caching(mut self, enabled: bool) -> Self {
        self.cache = Arc::new(DocumentCache::new(enabled));
        self
    }

    pub fn database_name(&self) -> &str {
        &self.database
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn reads_from_master(&self) -> bool {
        self.read_from_master.load(Ordering::SeqCst)
    }

    pub(crate) fn set_read_from_master(&self) {
        self.read_from_master.store(true, Ordering::SeqCst);
    }

    pub(crate) fn with_credentials_handle(&self, credentials: Credentials) -> Self {
        debug!(user = %credentials.user_name, database = %self.database, "handle rebound to credentials");
        Self {
            credentials: Some(credentials),
            headers: self.copied_headers(),
            ..self.clone()
        }
    }

    /// A handle on `database` sharing this handle's storage.
    ///
    /// Non-system databases are recorded in the `databases` table; a failure
    /// to record one is logged and does not prevent scoping.
    pub fn scoped(&self, database: &str) -> Self {
        let name = if database.eq_ignore_ascii_case(SYSTEM_DATABASE) {
            SYSTEM_DATABASE.to_string()
        } else {
            database.to_string()
        };
        if name != SYSTEM_DATABASE {
            if let Err(err) = self.register_database(&name) {
                warn!(database = %name, error = %err, "failed to register database name");
            }
        }
        Self {
            database: name.clone(),
            tables: DatabaseTables::new(&name),
            headers: self.copied_headers(),
            ..self.clone()
        }
    }

    fn copied_headers(&self) -> SharedHeaders {
        lock_headers(&self.headers).clone().into_shared()
    }

    fn register_database(&self, name: &str) -> CommandResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Storage))?;
        {
            let mut table = txn.open_table(DATABASES).map_err(map_err!(Storage))?;
            table
                .insert(name.to_lowercase().as_str(), name)
                .map_err(map_err!(Storage))?;
        }
        txn.commit().map_err(map_err!(Storage))?;
        debug!(database = %name, "database registered");
        Ok(())
    }

    /// Cache partition of this handle's database.
    pub(crate) fn cache_scope(&self) -> String {
        self.database.to_lowercase()
    }

    // ── Transactions ───────────────────────────────────────────────

    pub(crate) fn begin_read(&self) -> CommandResult<ReadTransaction> {
        self.db.begin_read().map_err(map_err!(Storage))
    }

    /// Run `f` inside one write transaction and commit it. An error from
    /// `f` aborts the transaction.
    pub(crate) fn write<T>(
        &self,
        f: impl FnOnce(&WriteTransaction) -> CommandResult<T>,
    ) -> CommandResult<T> {
        let txn = self.db.begin_write().map_err(map_err!(Storage))?;
        let value = f(&txn)?;
        txn.commit().map_err(map_err!(Storage))?;
        self.cache.invalidate(&self.cache_scope());
        Ok(value)
    }

    // ── Documents ──────────────────────────────────────────────────

    /// Load one document, consulting the cache first.
    pub(crate) fn load(&self, key: &str) -> CommandResult<Option<JsonDocument>> {
        let lower = key.to_lowercase();
        let scope = self.cache_scope();
        if let Some(doc) = self.cache.get(&scope, &lower) {
            return Ok(Some(doc));
        }
        let generation = self.cache.generation();
        let txn = self.begin_read()?;
        let doc = self.read_document(&txn, &lower)?;
        if let Some(doc) = &doc {
            self.cache.insert(&scope, &lower, doc, generation);
        }
        Ok(doc)
    }

    /// Load one document from an open read transaction, bypassing the cache.
    pub(crate) fn read_document(
        &self,
        txn: &ReadTransaction,
        key: &str,
    ) -> CommandResult<Option<JsonDocument>> {
        let Some(table) = open_read(txn, self.tables.docs())? else {
            return Ok(None);
        };
        match table.get(key.to_lowercase().as_str()).map_err(map_err!(Storage))? {
            Some(guard) => {
                let stored: StoredDocument =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(stored.into_document()))
            }
            None => Ok(None),
        }
    }

    /// Every document of this database in key order.
    pub(crate) fn load_all(&self) -> CommandResult<Vec<JsonDocument>> {
        let txn = self.begin_read()?;
        let Some(table) = open_read(&txn, self.tables.docs())? else {
            return Ok(Vec::new());
        };
        let mut docs = Vec::new();
        for entry in table.iter().map_err(map_err!(Storage))? {
            let (_, value) = entry.map_err(map_err!(Storage))?;
            let stored: StoredDocument =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            docs.push(stored.into_document());
        }
        Ok(docs)
    }

    /// Documents whose lowercased key starts with `prefix`, in key order.
    pub(crate) fn load_prefixed(&self, prefix: &str) -> CommandResult<Vec<JsonDocument>> {
        let lower = prefix.to_lowercase();
        let txn = self.begin_read()?;
        let Some(table) = open_read(&txn, self.tables.docs())? else {
            return Ok(Vec::new());
        };
        let mut docs = Vec::new();
        for entry in table.range(lower.as_str()..).map_err(map_err!(Storage))? {
            let (key, value) = entry.map_err(map_err!(Storage))?;
            if !key.value().starts_with(lower.as_str()) {
                break;
            }
            let stored: StoredDocument =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            docs.push(stored.into_document());
        }
        Ok(docs)
    }

    pub(crate) fn stored_in(
        &self,
        txn: &WriteTransaction,
        key: &str,
    ) -> CommandResult<Option<StoredDocument>> {
        let table = txn.open_table(self.tables.docs()).map_err(map_err!(Storage))?;
        let stored = match table.get(key.to_lowercase().as_str()).map_err(map_err!(Storage))? {
            Some(guard) => Some(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?),
            None => None,
        };
        Ok(stored)
    }

    /// Store a document, checking `etag` against the stored one.
    ///
    /// A key that is empty or ends in `/` gets the new etag's sequence
    /// number appended, so `users/` becomes `users/17`.
    pub(crate) fn put_in(
        &self,
        txn: &WriteTransaction,
        key: &str,
        etag: Option<Etag>,
        data: DocumentBody,
        mut metadata: Metadata,
    ) -> CommandResult<StoredDocument> {
        let new_etag = next_etag(txn)?;
        let key = if key.is_empty() || key.ends_with('/') {
            format!("{key}{}", new_etag.sequence())
        } else {
            key.to_string()
        };

        let existing = self.stored_in(txn, &key)?;
        check_etag(&key, etag, existing.as_ref().map(|doc| doc.etag))?;

        let last_modified = unix_now();
        metadata.insert(LAST_MODIFIED_METADATA_KEY.to_string(), last_modified.into());
        let stored = StoredDocument {
            key,
            etag: new_etag,
            data,
            metadata,
            last_modified,
        };
        let value = serde_json::to_vec(&stored).map_err(map_err!(Serialize))?;
        {
            let mut table = txn.open_table(self.tables.docs()).map_err(map_err!(Storage))?;
            table
                .insert(stored.key.to_lowercase().as_str(), value.as_slice())
                .map_err(map_err!(Storage))?;
        }
        debug!(key = %stored.key, etag = %stored.etag, database = %self.database, "document stored");
        Ok(stored)
    }

    /// Delete a document. Returns true if it existed.
    pub(crate) fn delete_in(
        &self,
        txn: &WriteTransaction,
        key: &str,
        etag: Option<Etag>,
    ) -> CommandResult<bool> {
        let existing = self.stored_in(txn, key)?;
        check_etag(key, etag, existing.as_ref().map(|doc| doc.etag))?;
        if existing.is_none() {
            return Ok(false);
        }
        {
            let mut table = txn.open_table(self.tables.docs()).map_err(map_err!(Storage))?;
            table
                .remove(key.to_lowercase().as_str())
                .map_err(map_err!(Storage))?;
        }
        debug!(%key, database = %self.database, "document deleted");
        Ok(true)
    }

    /// Transform a document's body with `apply` and store the result.
    ///
    /// A missing document is created from `default` when one is given:
    /// an empty body transformed by its function, stored with its metadata.
    pub(crate) fn patch_in(
        &self,
        txn: &WriteTransaction,
        key: &str,
        etag: Option<Etag>,
        apply: Transform<'_>,
        default: Option<(Transform<'_>, &Metadata)>,
    ) -> CommandResult<(PatchResult, Option<StoredDocument>)> {
        match self.stored_in(txn, key)? {
            Some(existing) => {
                check_etag(key, etag, Some(existing.etag))?;
                let mut data = existing.data;
                apply(&mut data)?;
                let stored = self.put_in(txn, &existing.key, None, data, existing.metadata)?;
                Ok((PatchResult::Patched, Some(stored)))
            }
            None => match default {
                Some((apply_default, metadata)) => {
                    let mut data = DocumentBody::new();
                    apply_default(&mut data)?;
                    let stored = self.put_in(txn, key, None, data, metadata.clone())?;
                    Ok((PatchResult::Created, Some(stored)))
                }
                None => Ok((PatchResult::DocumentDoesNotExist, None)),
            },
        }
    }

    // ── Attachments ────────────────────────────────────────────────

    pub(crate) fn attachment_header_in(
        &self,
        txn: &WriteTransaction,
        key: &str,
    ) -> CommandResult<Option<StoredAttachment>> {
        let table = txn
            .open_table(self.tables.attachments())
            .map_err(map_err!(Storage))?;
        let header = match table.get(key.to_lowercase().as_str()).map_err(map_err!(Storage))? {
            Some(guard) => Some(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?),
            None => None,
        };
        Ok(header)
    }

    pub(crate) fn read_attachment(
        &self,
        txn: &ReadTransaction,
        key: &str,
    ) -> CommandResult<Option<(StoredAttachment, Vec<u8>)>> {
        let lower = key.to_lowercase();
        let Some(headers) = open_read(txn, self.tables.attachments())? else {
            return Ok(None);
        };
        let header: StoredAttachment = match headers.get(lower.as_str()).map_err(map_err!(Storage))? {
            Some(guard) => serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?,
            None => return Ok(None),
        };
        let data = match open_read(txn, self.tables.attachment_data())? {
            Some(table) => table
                .get(lower.as_str())
                .map_err(map_err!(Storage))?
                .map(|guard| guard.value().to_vec())
                .unwrap_or_default(),
            None => Vec::new(),
        };
        Ok(Some((header, data)))
    }

    pub(crate) fn read_attachment_headers(
        &self,
        txn: &ReadTransaction,
    ) -> CommandResult<Vec<StoredAttachment>> {
        let Some(table) = open_read(txn, self.tables.attachments())? else {
            return Ok(Vec::new());
        };
        let mut headers = Vec::new();
        for entry in table.iter().map_err(map_err!(Storage))? {
            let (_, value) = entry.map_err(map_err!(Storage))?;
            headers.push(serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?);
        }
        Ok(headers)
    }

    pub(crate) fn database_names(&self) -> CommandResult<Vec<String>> {
        let txn = self.begin_read()?;
        let Some(table) = open_read(&txn, DATABASES)? else {
            return Ok(Vec::new());
        };
        let mut names = Vec::new();
        for entry in table.iter().map_err(map_err!(Storage))? {
            let (_, value) = entry.map_err(map_err!(Storage))?;
            names.push(value.value().to_string());
        }
        Ok(names)
    }
}

/// Open a table for reading; a table never written to reads as absent.
pub(crate) fn open_read<K, V>(
    txn: &ReadTransaction,
    definition: TableDefinition<K, V>,
) -> CommandResult<Option<ReadOnlyTable<K, V>>>
where
    K: redb::Key + 'static,
    V: redb::Value + 'static,
{
    match txn.open_table(definition) {
        Ok(table) => Ok(Some(table)),
        Err(TableError::TableDoesNotExist(_)) => Ok(None),
        Err(e) => Err(CommandError::Storage(e.to_string())),
    }
}

/// Hand out the next etag from the persistent counter.
pub(crate) fn next_etag(txn: &WriteTransaction) -> CommandResult<Etag> {
    let mut meta = txn.open_table(META).map_err(map_err!(Storage))?;
    let last = meta
        .get(LAST_ETAG)
        .map_err(map_err!(Storage))?
        .map(|guard| guard.value())
        .unwrap_or(0);
    let next = last + 1;
    meta.insert(LAST_ETAG, next).map_err(map_err!(Storage))?;
    Ok(Etag::from_sequence(next))
}

/// Fail when an expected etag is given and the stored one differs (or
/// nothing is stored).
pub(crate) fn check_etag(key: &str, expected: Option<Etag>, actual: Option<Etag>) -> CommandResult<()> {
    match expected {
        Some(expected) if actual != Some(expected) => Err(CommandError::ConcurrencyViolation {
            key: key.to_string(),
            expected,
            actual,
        }),
        _ => Ok(()),
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Lock helper for shared header maps.
pub(crate) fn lock_headers(headers: &Mutex<HeaderMap>) -> std::sync::MutexGuard<'_, HeaderMap> {
    headers.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> EmbeddedDatabase {
        EmbeddedDatabase::open_in_memory().unwrap()
    }

    fn body(value: serde_json::Value) -> DocumentBody {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn open_in_memory_starts_on_system_database() {
        let db = store();
        assert_eq!(db.database_name(), SYSTEM_DATABASE);
        assert!(db.load_all().unwrap().is_empty());
        assert!(db.credentials().is_none());
        assert!(!db.reads_from_master());
    }

    #[test]
    fn put_then_load_is_case_insensitive() {
        let db = store();
        db.write(|txn| db.put_in(txn, "Users/1", None, body(json!({"Name": "Oren"})), Metadata::new()))
            .unwrap();

        let doc = db.load("users/1").unwrap().unwrap();
        assert_eq!(doc.key, "Users/1");
        assert_eq!(doc.data["Name"], json!("Oren"));
        assert!(doc.metadata.contains_key(LAST_MODIFIED_METADATA_KEY));
    }

    #[test]
    fn etags_increase_across_writes() {
        let db = store();
        let first = db
            .write(|txn| db.put_in(txn, "a", None, DocumentBody::new(), Metadata::new()))
            .unwrap();
        let second = db
            .write(|txn| db.put_in(txn, "b", None, DocumentBody::new(), Metadata::new()))
            .unwrap();
        assert_eq!(first.etag.sequence() + 1, second.etag.sequence());
    }

    #[test]
    fn trailing_slash_key_is_completed_from_etag() {
        let db = store();
        let stored = db
            .write(|txn| db.put_in(txn, "users/", None, DocumentBody::new(), Metadata::new()))
            .unwrap();
        assert_eq!(stored.key, format!("users/{}", stored.etag.sequence()));
    }

    #[test]
    fn failed_write_leaves_nothing_behind() {
        let db = store();
        let result: CommandResult<()> = db.write(|txn| {
            db.put_in(txn, "a", None, DocumentBody::new(), Metadata::new())?;
            Err(CommandError::Patch("boom".into()))
        });
        assert!(result.is_err());
        assert!(db.load("a").unwrap().is_none());
    }

    #[test]
    fn cached_document_is_refreshed_after_write() {
        let db = store();
        db.write(|txn| db.put_in(txn, "a", None, body(json!({"V": 1})), Metadata::new()))
            .unwrap();
        assert_eq!(db.load("a").unwrap().unwrap().data["V"], json!(1));

        db.write(|txn| db.put_in(txn, "a", None, body(json!({"V": 2})), Metadata::new()))
            .unwrap();
        assert_eq!(db.load("a").unwrap().unwrap().data["V"], json!(2));
    }

    #[test]
    fn prefixed_scan_stops_at_prefix_end() {
        let db = store();
        db.write(|txn| {
            for key in ["users/1", "users/2", "usersx", "orders/1"] {
                db.put_in(txn, key, None, DocumentBody::new(), Metadata::new())?;
            }
            Ok(())
        })
        .unwrap();
        let keys: Vec<String> = db
            .load_prefixed("Users/")
            .unwrap()
            .into_iter()
            .map(|d| d.key)
            .collect();
        assert_eq!(keys, vec!["users/1", "users/2"]);
    }

    #[test]
    fn scoped_databases_are_isolated_and_registered() {
        let db = store();
        let north = db.scoped("Northwind");
        north
            .write(|txn| north.put_in(txn, "a", None, DocumentBody::new(), Metadata::new()))
            .unwrap();

        assert!(db.load("a").unwrap().is_none());
        assert!(north.load("a").unwrap().is_some());
        assert_eq!(db.database_names().unwrap(), vec!["Northwind"]);
        assert_eq!(north.scoped("system").database_name(), SYSTEM_DATABASE);
    }

    #[test]
    fn persistent_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quiver.redb");
        {
            let db = EmbeddedDatabase::open(&path).unwrap();
            db.write(|txn| db.put_in(txn, "a", None, body(json!({"V": 1})), Metadata::new()))
                .unwrap();
        }
        let db = EmbeddedDatabase::open(&path).unwrap();
        assert_eq!(db.load("a").unwrap().unwrap().data["V"], json!(1));
    }

    #[test]
    fn check_etag_rules() {
        let one = Etag::from_sequence(1);
        let two = Etag::from_sequence(2);
        assert!(check_etag("k", None, None).is_ok());
        assert!(check_etag("k", None, Some(one)).is_ok());
        assert!(check_etag("k", Some(one), Some(one)).is_ok());
        assert!(check_etag("k", Some(one), Some(two)).unwrap_err().is_concurrency_violation());
        assert!(check_etag("k", Some(one), None).unwrap_err().is_concurrency_violation());
    }
}
