//! The non-blocking command surface of a document store client.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use quiver_core::{
    Attachment, BatchResult, BuildNumber, CachingScope, CommandData, CommandResult, Credentials,
    DatabaseDocument, DatabaseStatistics, DocumentBody, Etag, FacetResults, GetRequest,
    GetResponse, IndexDefinition, IndexQuery, JsonDocument, JsonDocumentMetadata,
    LicensingStatus, LogItem, Metadata, MultiLoadResult, PatchRequest, PatchResult, PutResult,
    QueryResult, RawRequest, ScriptedPatchRequest, SuggestionQuery, SuggestionQueryResult,
};

use crate::headers::HeaderDictionary;

/// Boxed future returned by every fallible client operation.
pub type CommandFuture<'a, T> = Pin<Box<dyn Future<Output = CommandResult<T>> + Send + 'a>>;

/// Async command contract shared by embedded and remote clients.
///
/// Arguments are borrowed only for the duration of the call; the returned
/// future owns whatever it needs. Faults from the store arrive unchanged.
/// Operations an implementation cannot perform at all resolve to
/// [`CommandError::NotSupported`](quiver_core::CommandError::NotSupported).
pub trait AsyncDatabaseCommands: Send + Sync {
    /// Headers sent with every operation issued through this client.
    fn operations_headers(&self) -> &HeaderDictionary;

    fn get(&self, key: &str) -> CommandFuture<'_, Option<JsonDocument>>;

    fn get_many(
        &self,
        keys: &[String],
        includes: &[String],
        metadata_only: bool,
    ) -> CommandFuture<'_, MultiLoadResult>;

    fn get_documents(
        &self,
        start: usize,
        page_size: usize,
        metadata_only: bool,
    ) -> CommandFuture<'_, Vec<JsonDocument>>;

    fn query(
        &self,
        index: &str,
        query: &IndexQuery,
        includes: &[String],
        metadata_only: bool,
    ) -> CommandFuture<'_, QueryResult>;

    /// Results align positionally with `commands`.
    fn batch(&self, commands: Vec<CommandData>) -> CommandFuture<'_, Vec<BatchResult>>;

    fn suggest(
        &self,
        index: &str,
        query: &SuggestionQuery,
    ) -> CommandFuture<'_, SuggestionQueryResult>;

    fn get_index_names(&self, start: usize, page_size: usize) -> CommandFuture<'_, Vec<String>>;

    fn get_indexes(
        &self,
        start: usize,
        page_size: usize,
    ) -> CommandFuture<'_, Vec<IndexDefinition>>;

    fn reset_index(&self, name: &str) -> CommandFuture<'_, ()>;

    fn get_index(&self, name: &str) -> CommandFuture<'_, Option<IndexDefinition>>;

    fn put_index(
        &self,
        name: &str,
        definition: &IndexDefinition,
        overwrite: bool,
    ) -> CommandFuture<'_, String>;

    fn delete_index(&self, name: &str) -> CommandFuture<'_, ()>;

    fn delete_by_index(
        &self,
        index: &str,
        query: &IndexQuery,
        allow_stale: bool,
    ) -> CommandFuture<'_, ()>;

    /// Delete `key` without an etag check.
    fn delete_document(&self, key: &str) -> CommandFuture<'_, ()>;

    fn put(
        &self,
        key: &str,
        etag: Option<Etag>,
        document: &DocumentBody,
        metadata: &Metadata,
    ) -> CommandFuture<'_, PutResult>;

    fn patch(
        &self,
        key: &str,
        patches: &[PatchRequest],
        etag: Option<Etag>,
    ) -> CommandFuture<'_, PatchResult>;

    fn patch_or_default(
        &self,
        key: &str,
        patches_to_existing: &[PatchRequest],
        patches_to_default: &[PatchRequest],
        default_metadata: &Metadata,
    ) -> CommandFuture<'_, PatchResult>;

    fn scripted_patch(
        &self,
        key: &str,
        patch: &ScriptedPatchRequest,
        etag: Option<Etag>,
    ) -> CommandFuture<'_, PatchResult>;

    fn scripted_patch_or_default(
        &self,
        key: &str,
        patch_existing: &ScriptedPatchRequest,
        patch_default: &ScriptedPatchRequest,
        default_metadata: &Metadata,
    ) -> CommandFuture<'_, PatchResult>;

    /// Build a raw request against the store's url space.
    fn create_request(&self, relative_url: &str, method: &str) -> CommandResult<RawRequest>;

    fn for_database(&self, database: &str) -> Box<dyn AsyncDatabaseCommands>;

    fn for_system_database(&self) -> Box<dyn AsyncDatabaseCommands>;

    fn with_credentials(&self, credentials: Credentials) -> Box<dyn AsyncDatabaseCommands>;

    fn get_statistics(&self) -> CommandFuture<'_, DatabaseStatistics>;

    fn get_database_names(&self, page_size: usize, start: usize) -> CommandFuture<'_, Vec<String>>;

    fn put_attachment(
        &self,
        key: &str,
        etag: Option<Etag>,
        data: Bytes,
        metadata: &Metadata,
    ) -> CommandFuture<'_, Etag>;

    fn get_attachment(&self, key: &str) -> CommandFuture<'_, Option<Attachment>>;

    fn delete_attachment(&self, key: &str, etag: Option<Etag>) -> CommandFuture<'_, ()>;

    fn get_terms(
        &self,
        index: &str,
        field: &str,
        from_value: &str,
        page_size: usize,
    ) -> CommandFuture<'_, Vec<String>>;

    /// Caching stays off until the returned scope is dropped.
    fn disable_all_caching(&self) -> CachingScope;

    /// Responses align positionally with `requests`.
    fn multi_get(&self, requests: Vec<GetRequest>) -> CommandFuture<'_, Vec<GetResponse>>;

    fn update_by_index(
        &self,
        index: &str,
        query: &IndexQuery,
        patch: &ScriptedPatchRequest,
        allow_stale: bool,
    ) -> CommandFuture<'_, ()>;

    fn get_facets(
        &self,
        index: &str,
        query: &IndexQuery,
        facet_setup_doc: &str,
        start: usize,
        page_size: Option<usize>,
    ) -> CommandFuture<'_, FacetResults>;

    fn get_logs(&self, errors_only: bool) -> CommandFuture<'_, Vec<LogItem>>;

    fn get_license_status(&self) -> CommandFuture<'_, LicensingStatus>;

    fn get_build_number(&self) -> CommandFuture<'_, BuildNumber>;

    fn start_backup(
        &self,
        backup_location: &str,
        database_document: &DatabaseDocument,
    ) -> CommandFuture<'_, ()>;

    fn start_restore(
        &self,
        restore_location: &str,
        database_location: &str,
        database_name: Option<&str>,
    ) -> CommandFuture<'_, ()>;

    fn start_indexing(&self) -> CommandFuture<'_, ()>;

    fn stop_indexing(&self) -> CommandFuture<'_, ()>;

    fn get_indexing_status(&self) -> CommandFuture<'_, String>;

    fn starts_with(
        &self,
        prefix: &str,
        start: usize,
        page_size: usize,
        metadata_only: bool,
    ) -> CommandFuture<'_, Vec<JsonDocument>>;

    /// Route subsequent reads through this handle to the primary store.
    fn force_read_from_primary(&self);

    fn head(&self, key: &str) -> CommandFuture<'_, Option<JsonDocumentMetadata>>;
}
