//! The synchronous command contract an engine implements.

use std::io::Read;
use std::sync::Arc;

use crate::admin::{Credentials, DatabaseStatistics};
use crate::commands::{BatchResult, CommandData, PatchRequest, PatchResult, ScriptedPatchRequest};
use crate::document::{
    Attachment, DocumentBody, JsonDocument, JsonDocumentMetadata, Metadata, MultiLoadResult,
    PutResult,
};
use crate::error::CommandResult;
use crate::etag::Etag;
use crate::header::SharedHeaders;
use crate::multi_get::{GetRequest, GetResponse};
use crate::query::{
    FacetResults, IndexDefinition, IndexQuery, QueryResult, SuggestionQuery, SuggestionQueryResult,
};
use crate::scope::CachingScope;

/// Name of the system database every engine handle can scope back to.
pub const SYSTEM_DATABASE: &str = "System";

/// Blocking command surface of a document store engine.
///
/// Every call executes on the caller's thread and returns once the engine
/// has finished. An operation given `Some(etag)` fails with
/// [`CommandError::ConcurrencyViolation`](crate::CommandError::ConcurrencyViolation)
/// when the stored etag differs; `None` skips the check.
pub trait DatabaseCommands: Send + Sync {
    /// Headers sent with every operation issued through this handle.
    fn operations_headers(&self) -> SharedHeaders;

    fn get(&self, key: &str) -> CommandResult<Option<JsonDocument>>;

    fn get_many(
        &self,
        keys: &[String],
        includes: &[String],
        metadata_only: bool,
    ) -> CommandResult<MultiLoadResult>;

    fn get_documents(
        &self,
        start: usize,
        page_size: usize,
        metadata_only: bool,
    ) -> CommandResult<Vec<JsonDocument>>;

    fn query(
        &self,
        index: &str,
        query: &IndexQuery,
        includes: &[String],
        metadata_only: bool,
    ) -> CommandResult<QueryResult>;

    /// Apply every command atomically; results align with `commands`.
    fn batch(&self, commands: &[CommandData]) -> CommandResult<Vec<BatchResult>>;

    fn suggest(&self, index: &str, query: &SuggestionQuery) -> CommandResult<SuggestionQueryResult>;

    fn get_index_names(&self, start: usize, page_size: usize) -> CommandResult<Vec<String>>;

    fn get_indexes(&self, start: usize, page_size: usize) -> CommandResult<Vec<IndexDefinition>>;

    fn reset_index(&self, name: &str) -> CommandResult<()>;

    fn get_index(&self, name: &str) -> CommandResult<Option<IndexDefinition>>;

    fn put_index(
        &self,
        name: &str,
        definition: &IndexDefinition,
        overwrite: bool,
    ) -> CommandResult<String>;

    fn delete_index(&self, name: &str) -> CommandResult<()>;

    fn delete_by_index(&self, index: &str, query: &IndexQuery, allow_stale: bool)
    -> CommandResult<()>;

    fn delete(&self, key: &str, etag: Option<Etag>) -> CommandResult<()>;

    fn put(
        &self,
        key: &str,
        etag: Option<Etag>,
        document: &DocumentBody,
        metadata: &Metadata,
    ) -> CommandResult<PutResult>;

    fn patch(
        &self,
        key: &str,
        patches: &[PatchRequest],
        etag: Option<Etag>,
    ) -> CommandResult<PatchResult>;

    /// Patch `key` if it exists, otherwise create it from `patches_to_default`
    /// applied to an empty document carrying `default_metadata`.
    fn patch_or_default(
        &self,
        key: &str,
        patches_to_existing: &[PatchRequest],
        patches_to_default: &[PatchRequest],
        default_metadata: &Metadata,
    ) -> CommandResult<PatchResult>;

    fn scripted_patch(
        &self,
        key: &str,
        patch: &ScriptedPatchRequest,
        etag: Option<Etag>,
    ) -> CommandResult<PatchResult>;

    fn scripted_patch_or_default(
        &self,
        key: &str,
        patch_existing: &ScriptedPatchRequest,
        patch_default: &ScriptedPatchRequest,
        default_metadata: &Metadata,
    ) -> CommandResult<PatchResult>;

    /// A new handle scoped to `database`, sharing this handle's storage.
    fn for_database(&self, database: &str) -> Arc<dyn DatabaseCommands>;

    fn for_system_database(&self) -> Arc<dyn DatabaseCommands>;

    /// A new handle issuing operations with `credentials`.
    fn with_credentials(&self, credentials: Credentials) -> Arc<dyn DatabaseCommands>;

    fn get_statistics(&self) -> CommandResult<DatabaseStatistics>;

    fn get_database_names(&self, page_size: usize, start: usize) -> CommandResult<Vec<String>>;

    fn put_attachment(
        &self,
        key: &str,
        etag: Option<Etag>,
        data: &mut dyn Read,
        metadata: &Metadata,
    ) -> CommandResult<Etag>;

    fn get_attachment(&self, key: &str) -> CommandResult<Option<Attachment>>;

    fn delete_attachment(&self, key: &str, etag: Option<Etag>) -> CommandResult<()>;

    fn get_terms(
        &self,
        index: &str,
        field: &str,
        from_value: &str,
        page_size: usize,
    ) -> CommandResult<Vec<String>>;

    fn disable_all_caching(&self) -> CachingScope;

    /// Execute independent reads in one round trip; responses align with `requests`.
    fn multi_get(&self, requests: &[GetRequest]) -> CommandResult<Vec<GetResponse>>;

    fn update_by_index(
        &self,
        index: &str,
        query: &IndexQuery,
        patch: &ScriptedPatchRequest,
        allow_stale: bool,
    ) -> CommandResult<()>;

    fn get_facets(
        &self,
        index: &str,
        query: &IndexQuery,
        facet_setup_doc: &str,
        start: usize,
        page_size: Option<usize>,
    ) -> CommandResult<FacetResults>;

    /// Documents whose key starts with `prefix`. `matches` filters the rest of
    /// the key with `*` wildcards and `|`-separated alternatives.
    fn starts_with(
        &self,
        prefix: &str,
        matches: Option<&str>,
        start: usize,
        page_size: usize,
        metadata_only: bool,
    ) -> CommandResult<Vec<JsonDocument>>;

    fn force_read_from_master(&self);

    fn head(&self, key: &str) -> CommandResult<Option<JsonDocumentMetadata>>;
}
