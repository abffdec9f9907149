//! Async facade over an in-process synchronous engine.

use std::io::Cursor;
use std::sync::Arc;

use bytes::Bytes;
use quiver_core::{
    Attachment, BatchResult, BuildNumber, CachingScope, CommandData, CommandError, CommandResult,
    Credentials, DatabaseCommands, DatabaseDocument, DatabaseStatistics, DispatchMode,
    DocumentBody, Etag, FacetResults, GetRequest, GetResponse, IndexDefinition, IndexQuery,
    JsonDocument, JsonDocumentMetadata, LicensingStatus, LogItem, Metadata, MultiLoadResult,
    PatchRequest, PatchResult, PutResult, QueryResult, QuiverConfig, RawRequest,
    ScriptedPatchRequest, SuggestionQuery, SuggestionQueryResult,
};
use quiver_embedded::EmbeddedDatabase;
use tracing::{debug, warn};

use crate::contract::{AsyncDatabaseCommands, CommandFuture};
use crate::dispatch::{Dispatcher, resolved};
use crate::headers::HeaderDictionary;

/// [`AsyncDatabaseCommands`] backed by a [`DatabaseCommands`] engine in the
/// same process.
///
/// Each operation makes exactly one engine call. Scoping operations return
/// a new client over a newly scoped engine handle; an existing client never
/// changes database or credentials. Operations that only make sense against
/// a remote server resolve to [`CommandError::NotSupported`].
pub struct EmbeddedAsyncClient {
    dispatcher: Dispatcher,
    headers: HeaderDictionary,
}

impl EmbeddedAsyncClient {
    pub fn new(engine: Arc<dyn DatabaseCommands>) -> Self {
        Self::from_dispatcher(Dispatcher::new(engine, DispatchMode::Inline))
    }

    /// Open an embedded engine as described by `config` and wrap it.
    pub fn open(config: &QuiverConfig) -> CommandResult<Self> {
        let engine = EmbeddedDatabase::open_with_config(config)?;
        debug!(
            database = %engine.database_name(),
            dispatch = ?config.client.dispatch,
            "embedded client opened"
        );
        Ok(Self::new(Arc::new(engine)).with_dispatch(config.client.dispatch))
    }

    pub fn with_dispatch(self, mode: DispatchMode) -> Self {
        Self::from_dispatcher(Dispatcher::new(self.dispatcher.engine().clone(), mode))
    }

    pub fn dispatch_mode(&self) -> DispatchMode {
        self.dispatcher.mode()
    }

    pub fn engine(&self) -> &Arc<dyn DatabaseCommands> {
        self.dispatcher.engine()
    }

    fn from_dispatcher(dispatcher: Dispatcher) -> Self {
        let headers = HeaderDictionary::new(dispatcher.engine().operations_headers());
        Self {
            dispatcher,
            headers,
        }
    }

    fn rescoped(&self, engine: Arc<dyn DatabaseCommands>) -> Box<dyn AsyncDatabaseCommands> {
        Box::new(Self::from_dispatcher(self.dispatcher.with_engine(engine)))
    }
}

fn not_supported<'a, T: Send + 'a>(operation: &'static str) -> CommandFuture<'a, T> {
    warn!(operation, "operation is not supported by the embedded client");
    resolved(Err(CommandError::NotSupported(operation)))
}

impl AsyncDatabaseCommands for EmbeddedAsyncClient {
    fn operations_headers(&self) -> &HeaderDictionary {
        &self.headers
    }

    fn get(&self, key: &str) -> CommandFuture<'_, Option<JsonDocument>> {
        let key = key.to_string();
        self.dispatcher.run(move |db| db.get(&key))
    }

    fn get_many(
        &self,
        keys: &[String],
        includes: &[String],
        metadata_only: bool,
    ) -> CommandFuture<'_, MultiLoadResult> {
        let keys = keys.to_vec();
        let includes = includes.to_vec();
        self.dispatcher
            .run(move |db| db.get_many(&keys, &includes, metadata_only))
    }

    fn get_documents(
        &self,
        start: usize,
        page_size: usize,
        metadata_only: bool,
    ) -> CommandFuture<'_, Vec<JsonDocument>> {
        self.dispatcher
            .run(move |db| db.get_documents(start, page_size, metadata_only))
    }

    fn query(
        &self,
        index: &str,
        query: &IndexQuery,
        includes: &[String],
        metadata_only: bool,
    ) -> CommandFuture<'_, QueryResult> {
        let index = index.to_string();
        let query = query.clone();
        let includes = includes.to_vec();
        self.dispatcher
            .run(move |db| db.query(&index, &query, &includes, metadata_only))
    }

    fn batch(&self, commands: Vec<CommandData>) -> CommandFuture<'_, Vec<BatchResult>> {
        self.dispatcher.run(move |db| db.batch(&commands))
    }

    fn suggest(
        &self,
        index: &str,
        query: &SuggestionQuery,
    ) -> CommandFuture<'_, SuggestionQueryResult> {
        let index = index.to_string();
        let query = query.clone();
        self.dispatcher.run(move |db| db.suggest(&index, &query))
    }

    fn get_index_names(&self, start: usize, page_size: usize) -> CommandFuture<'_, Vec<String>> {
        self.dispatcher
            .run(move |db| db.get_index_names(start, page_size))
    }

    fn get_indexes(
        &self,
        start: usize,
        page_size: usize,
    ) -> CommandFuture<'_, Vec<IndexDefinition>> {
        self.dispatcher.run(move |db| db.get_indexes(start, page_size))
    }

    fn reset_index(&self, name: &str) -> CommandFuture<'_, ()> {
        let name = name.to_string();
        self.dispatcher.run(move |db| db.reset_index(&name))
    }

    fn get_index(&self, name: &str) -> CommandFuture<'_, Option<IndexDefinition>> {
        let name = name.to_string();
        self.dispatcher.run(move |db| db.get_index(&name))
    }

    fn put_index(
        &self,
        name: &str,
        definition: &IndexDefinition,
        overwrite: bool,
    ) -> CommandFuture<'_, String> {
        let name = name.to_string();
        let definition = definition.clone();
        self.dispatcher
            .run(move |db| db.put_index(&name, &definition, overwrite))
    }

    fn delete_index(&self, name: &str) -> CommandFuture<'_, ()> {
        let name = name.to_string();
        self.dispatcher.run(move |db| db.delete_index(&name))
    }

    fn delete_by_index(
        &self,
        index: &str,
        query: &IndexQuery,
        allow_stale: bool,
    ) -> CommandFuture<'_, ()> {
        let index = index.to_string();
        let query = query.clone();
        self.dispatcher
            .run(move |db| db.delete_by_index(&index, &query, allow_stale))
    }

    fn delete_document(&self, key: &str) -> CommandFuture<'_, ()> {
        let key = key.to_string();
        self.dispatcher.run(move |db| db.delete(&key, None))
    }

    fn put(
        &self,
        key: &str,
        etag: Option<Etag>,
        document: &DocumentBody,
        metadata: &Metadata,
    ) -> CommandFuture<'_, PutResult> {
        let key = key.to_string();
        let document = document.clone();
        let metadata = metadata.clone();
        self.dispatcher
            .run(move |db| db.put(&key, etag, &document, &metadata))
    }

    fn patch(
        &self,
        key: &str,
        patches: &[PatchRequest],
        etag: Option<Etag>,
    ) -> CommandFuture<'_, PatchResult> {
        let key = key.to_string();
        let patches = patches.to_vec();
        self.dispatcher.run(move |db| db.patch(&key, &patches, etag))
    }

    fn patch_or_default(
        &self,
        key: &str,
        patches_to_existing: &[PatchRequest],
        patches_to_default: &[PatchRequest],
        default_metadata: &Metadata,
    ) -> CommandFuture<'_, PatchResult> {
        let key = key.to_string();
        let existing = patches_to_existing.to_vec();
        let default = patches_to_default.to_vec();
        let metadata = default_metadata.clone();
        self.dispatcher
            .run(move |db| db.patch_or_default(&key, &existing, &default, &metadata))
    }

    fn scripted_patch(
        &self,
        key: &str,
        patch: &ScriptedPatchRequest,
        etag: Option<Etag>,
    ) -> CommandFuture<'_, PatchResult> {
        let key = key.to_string();
        let patch = patch.clone();
        self.dispatcher
            .run(move |db| db.scripted_patch(&key, &patch, etag))
    }

    fn scripted_patch_or_default(
        &self,
        key: &str,
        patch_existing: &ScriptedPatchRequest,
        patch_default: &ScriptedPatchRequest,
        default_metadata: &Metadata,
    ) -> CommandFuture<'_, PatchResult> {
        let key = key.to_string();
        let existing = patch_existing.clone();
        let default = patch_default.clone();
        let metadata = default_metadata.clone();
        self.dispatcher.run(move |db| {
            db.scripted_patch_or_default(&key, &existing, &default, &metadata)
        })
    }

    fn create_request(&self, relative_url: &str, method: &str) -> CommandResult<RawRequest> {
        warn!(url = relative_url, method, "raw requests need a remote server");
        Err(CommandError::NotSupported("create_request"))
    }

    fn for_database(&self, database: &str) -> Box<dyn AsyncDatabaseCommands> {
        self.rescoped(self.engine().for_database(database))
    }

    fn for_system_database(&self) -> Box<dyn AsyncDatabaseCommands> {
        self.rescoped(self.engine().for_system_database())
    }

    fn with_credentials(&self, credentials: Credentials) -> Box<dyn AsyncDatabaseCommands> {
        self.rescoped(self.engine().with_credentials(credentials))
    }

    fn get_statistics(&self) -> CommandFuture<'_, DatabaseStatistics> {
        self.dispatcher.run(|db| db.get_statistics())
    }

    fn get_database_names(&self, page_size: usize, start: usize) -> CommandFuture<'_, Vec<String>> {
        self.dispatcher
            .run(move |db| db.get_database_names(page_size, start))
    }

    fn put_attachment(
        &self,
        key: &str,
        etag: Option<Etag>,
        data: Bytes,
        metadata: &Metadata,
    ) -> CommandFuture<'_, Etag> {
        let key = key.to_string();
        let metadata = metadata.clone();
        self.dispatcher.run(move |db| {
            let mut body = Cursor::new(data);
            db.put_attachment(&key, etag, &mut body, &metadata)
        })
    }

    fn get_attachment(&self, key: &str) -> CommandFuture<'_, Option<Attachment>> {
        let key = key.to_string();
        self.dispatcher.run(move |db| db.get_attachment(&key))
    }

    fn delete_attachment(&self, key: &str, etag: Option<Etag>) -> CommandFuture<'_, ()> {
        let key = key.to_string();
        self.dispatcher
            .run(move |db| db.delete_attachment(&key, etag))
    }

    fn get_terms(
        &self,
        index: &str,
        field: &str,
        from_value: &str,
        page_size: usize,
    ) -> CommandFuture<'_, Vec<String>> {
        let index = index.to_string();
        let field = field.to_string();
        let from_value = from_value.to_string();
        self.dispatcher
            .run(move |db| db.get_terms(&index, &field, &from_value, page_size))
    }

    fn disable_all_caching(&self) -> CachingScope {
        self.engine().disable_all_caching()
    }

    fn multi_get(&self, requests: Vec<GetRequest>) -> CommandFuture<'_, Vec<GetResponse>> {
        self.dispatcher.run(move |db| db.multi_get(&requests))
    }

    fn update_by_index(
        &self,
        index: &str,
        query: &IndexQuery,
        patch: &ScriptedPatchRequest,
        allow_stale: bool,
    ) -> CommandFuture<'_, ()> {
        let index = index.to_string();
        let query = query.clone();
        let patch = patch.clone();
        self.dispatcher
            .run(move |db| db.update_by_index(&index, &query, &patch, allow_stale))
    }

    fn get_facets(
        &self,
        index: &str,
        query: &IndexQuery,
        facet_setup_doc: &str,
        start: usize,
        page_size: Option<usize>,
    ) -> CommandFuture<'_, FacetResults> {
        let index = index.to_string();
        let query = query.clone();
        let setup = facet_setup_doc.to_string();
        self.dispatcher
            .run(move |db| db.get_facets(&index, &query, &setup, start, page_size))
    }

    fn get_logs(&self, _errors_only: bool) -> CommandFuture<'_, Vec<LogItem>> {
        not_supported("get_logs")
    }

    fn get_license_status(&self) -> CommandFuture<'_, LicensingStatus> {
        not_supported("get_license_status")
    }

    fn get_build_number(&self) -> CommandFuture<'_, BuildNumber> {
        not_supported("get_build_number")
    }

    fn start_backup(
        &self,
        _backup_location: &str,
        _database_document: &DatabaseDocument,
    ) -> CommandFuture<'_, ()> {
        not_supported("start_backup")
    }

    fn start_restore(
        &self,
        _restore_location: &str,
        _database_location: &str,
        _database_name: Option<&str>,
    ) -> CommandFuture<'_, ()> {
        not_supported("start_restore")
    }

    fn start_indexing(&self) -> CommandFuture<'_, ()> {
        not_supported("start_indexing")
    }

    fn stop_indexing(&self) -> CommandFuture<'_, ()> {
        not_supported("stop_indexing")
    }

    fn get_indexing_status(&self) -> CommandFuture<'_, String> {
        not_supported("get_indexing_status")
    }

    fn starts_with(
        &self,
        prefix: &str,
        start: usize,
        page_size: usize,
        metadata_only: bool,
    ) -> CommandFuture<'_, Vec<JsonDocument>> {
        let prefix = prefix.to_string();
        self.dispatcher
            .run(move |db| db.starts_with(&prefix, None, start, page_size, metadata_only))
    }

    fn force_read_from_primary(&self) {
        self.engine().force_read_from_master();
    }

    fn head(&self, key: &str) -> CommandFuture<'_, Option<JsonDocumentMetadata>> {
        let key = key.to_string();
        self.dispatcher.run(move |db| db.head(&key))
    }
}
