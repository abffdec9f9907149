//! [`DatabaseCommands`] on top of [`EmbeddedDatabase`].

use std::collections::HashSet;
use std::io::Read;
use std::sync::Arc;

use bytes::Bytes;
use quiver_core::{
    Attachment, BatchResult, CachingScope, CommandData, CommandError, CommandResult, Credentials,
    DatabaseCommands, DatabaseStatistics, DocumentBody, Etag, FacetResult, FacetResults,
    FacetSetup, GetRequest, GetResponse, IndexDefinition, IndexQuery, JsonDocument,
    JsonDocumentMetadata, Metadata, MultiLoadResult, PatchRequest, PatchResult, PutResult,
    QueryResult, SYSTEM_DATABASE, ScriptedPatchRequest, SharedHeaders, SuggestionQuery,
    SuggestionQueryResult,
};
use redb::{ReadTransaction, ReadableTable};
use serde_json::Value;
use tracing::debug;

use crate::index::{self, CompiledIndex, IndexEntry, Term};
use crate::multi_get;
use crate::patch::apply_patches;
use crate::script::run_script;
use crate::store::{
    EmbeddedDatabase, StoredAttachment, StoredDocument, Transform, check_etag, map_err,
    next_etag, open_read,
};

/// An index evaluated against the current documents for one query.
struct Evaluation {
    index: CompiledIndex,
    docs: Vec<JsonDocument>,
    entries: Vec<IndexEntry>,
    terms: Vec<Term>,
}

impl Evaluation {
    fn matching(&self) -> Vec<usize> {
        index::matching_entries(&self.entries, &self.terms)
    }

    /// Keys of the matched documents, each once, in entry order.
    fn matched_keys(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.matching()
            .into_iter()
            .filter(|doc| seen.insert(*doc))
            .map(|doc| self.docs[doc].key.clone())
            .collect()
    }
}

fn strip_body(mut doc: JsonDocument, metadata_only: bool) -> JsonDocument {
    if metadata_only {
        doc.data.clear();
    }
    doc
}

fn batch_result(command: &CommandData, key: &str, stored: Option<StoredDocument>) -> BatchResult {
    let (key, etag, metadata) = match stored {
        Some(stored) => (stored.key, Some(stored.etag), Some(stored.metadata)),
        None => (key.to_string(), None, None),
    };
    BatchResult {
        key,
        method: command.method().to_string(),
        etag,
        metadata,
        deleted: None,
        patch_result: None,
    }
}

/// Whether `text` matches any `|`-separated alternative of `pattern`, where
/// `*` stands for any run of characters and `?` for exactly one.
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let text: Vec<char> = text.chars().collect();
    pattern.split('|').any(|alternative| {
        let alternative: Vec<char> = alternative.chars().collect();
        glob_match(&alternative, &text)
    })
}

/// Case-insensitive glob match in O(pattern × text).
///
/// On a mismatch only the most recent `*` is retried, one character
/// further along the text.
fn glob_match(pattern: &[char], text: &[char]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut last_star: Option<(usize, usize)> = None;
    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                last_star = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '?' || same_char(c, text[t]) => {
                p += 1;
                t += 1;
            }
            _ => match last_star {
                Some((star, resume)) => {
                    p = star + 1;
                    t = resume + 1;
                    last_star = Some((star, resume + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}

fn same_char(a: char, b: char) -> bool {
    a == b || a.to_lowercase().eq(b.to_lowercase())
}

impl EmbeddedDatabase {
    fn index_definition(&self, name: &str) -> CommandResult<Option<IndexDefinition>> {
        let txn = self.begin_read()?;
        let Some(table) = open_read(&txn, self.tables.indexes())? else {
            return Ok(None);
        };
        match table.get(name.to_lowercase().as_str()).map_err(map_err!(Storage))? {
            Some(guard) => Ok(Some(
                serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?,
            )),
            None => Ok(None),
        }
    }

    fn index_definitions(&self) -> CommandResult<Vec<IndexDefinition>> {
        let txn = self.begin_read()?;
        let Some(table) = open_read(&txn, self.tables.indexes())? else {
            return Ok(Vec::new());
        };
        let mut definitions = Vec::new();
        for entry in table.iter().map_err(map_err!(Storage))? {
            let (_, value) = entry.map_err(map_err!(Storage))?;
            definitions.push(serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?);
        }
        Ok(definitions)
    }

    fn evaluate(&self, index: &str, query: &str) -> CommandResult<Evaluation> {
        let definition = self
            .index_definition(index)?
            .ok_or_else(|| CommandError::IndexNotFound(index.to_string()))?;
        let compiled = CompiledIndex::compile(&definition)?;
        let docs = self.load_all()?;
        let entries = compiled.entries(&docs);
        let terms = index::parse_query(&compiled, query)?;
        Ok(Evaluation {
            index: compiled,
            docs,
            entries,
            terms,
        })
    }

    /// Documents named by the string values found at `includes` paths of `docs`.
    fn load_includes(
        &self,
        txn: &ReadTransaction,
        docs: &[JsonDocument],
        includes: &[String],
    ) -> CommandResult<Vec<JsonDocument>> {
        let mut seen = HashSet::new();
        let mut included = Vec::new();
        for doc in docs {
            for path in includes {
                for value in index::values_at(&doc.data, path) {
                    let keys: Vec<Value> = match value {
                        Value::Array(items) => items,
                        other => vec![other],
                    };
                    for key in keys.iter().filter_map(Value::as_str) {
                        if !seen.insert(key.to_lowercase()) {
                            continue;
                        }
                        if let Some(found) = self.read_document(txn, key)? {
                            included.push(found);
                        }
                    }
                }
            }
        }
        Ok(included)
    }

    fn execute_in(
        &self,
        txn: &redb::WriteTransaction,
        command: &CommandData,
    ) -> CommandResult<BatchResult> {
        match command {
            CommandData::Put {
                key,
                etag,
                document,
                metadata,
            } => {
                let stored = self.put_in(txn, key, *etag, document.clone(), metadata.clone())?;
                Ok(batch_result(command, key, Some(stored)))
            }
            CommandData::Delete { key, etag } => {
                let deleted = self.delete_in(txn, key, *etag)?;
                Ok(BatchResult {
                    deleted: Some(deleted),
                    ..batch_result(command, key, None)
                })
            }
            CommandData::Patch { key, etag, patches } => {
                let apply: Transform<'_> = &|doc| apply_patches(doc, patches);
                let (outcome, stored) = self.patch_in(txn, key, *etag, apply, None)?;
                Ok(BatchResult {
                    patch_result: Some(outcome),
                    ..batch_result(command, key, stored)
                })
            }
            CommandData::ScriptedPatch { key, etag, patch } => {
                let apply: Transform<'_> = &|doc| run_script(doc, patch);
                let (outcome, stored) = self.patch_in(txn, key, *etag, apply, None)?;
                Ok(BatchResult {
                    patch_result: Some(outcome),
                    ..batch_result(command, key, stored)
                })
            }
        }
    }
}

impl DatabaseCommands for EmbeddedDatabase {
    fn operations_headers(&self) -> SharedHeaders {
        Arc::clone(&self.headers)
    }

    fn get(&self, key: &str) -> CommandResult<Option<JsonDocument>> {
        self.load(key)
    }

    fn get_many(
        &self,
        keys: &[String],
        includes: &[String],
        metadata_only: bool,
    ) -> CommandResult<MultiLoadResult> {
        let txn = self.begin_read()?;
        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            results.push(self.read_document(&txn, key)?);
        }
        let found: Vec<JsonDocument> = results.iter().flatten().cloned().collect();
        let includes = self.load_includes(&txn, &found, includes)?;
        Ok(MultiLoadResult {
            results: results
                .into_iter()
                .map(|doc| doc.map(|doc| strip_body(doc, metadata_only)))
                .collect(),
            includes,
        })
    }

    fn get_documents(
        &self,
        start: usize,
        page_size: usize,
        metadata_only: bool,
    ) -> CommandResult<Vec<JsonDocument>> {
        let mut docs = self.load_all()?;
        docs.sort_by(|a, b| b.etag.cmp(&a.etag));
        Ok(docs
            .into_iter()
            .skip(start)
            .take(page_size)
            .map(|doc| strip_body(doc, metadata_only))
            .collect())
    }

    fn query(
        &self,
        index: &str,
        query: &IndexQuery,
        includes: &[String],
        metadata_only: bool,
    ) -> CommandResult<QueryResult> {
        let evaluation = self.evaluate(index, &query.query)?;
        let matching = evaluation.matching();
        let page = index::page(&matching, query.start, query.page_size);
        let results: Vec<JsonDocument> = page
            .docs
            .iter()
            .map(|&doc| evaluation.docs[doc].clone())
            .collect();

        let txn = self.begin_read()?;
        let included = self.load_includes(&txn, &results, includes)?;
        debug!(
            index,
            query = %query.query,
            total = matching.len(),
            returned = results.len(),
            skipped = page.skipped,
            "index queried"
        );
        Ok(QueryResult {
            index_name: index.to_string(),
            results: results
                .into_iter()
                .map(|doc| strip_body(doc, metadata_only))
                .collect(),
            includes: included,
            total_results: matching.len(),
            skipped_results: page.skipped,
            is_stale: false,
        })
    }

    fn batch(&self, commands: &[CommandData]) -> CommandResult<Vec<BatchResult>> {
        let results = self.write(|txn| {
            commands
                .iter()
                .map(|command| self.execute_in(txn, command))
                .collect::<CommandResult<Vec<_>>>()
        })?;
        debug!(count = results.len(), database = %self.database_name(), "batch committed");
        Ok(results)
    }

    fn suggest(&self, index: &str, query: &SuggestionQuery) -> CommandResult<SuggestionQueryResult> {
        let evaluation = self.evaluate(index, "")?;
        let field = evaluation.index.field(&query.field)?;
        let candidates = index::terms(&evaluation.entries, field, "", usize::MAX);
        Ok(SuggestionQueryResult {
            suggestions: index::suggest(&candidates, query),
        })
    }

    fn get_index_names(&self, start: usize, page_size: usize) -> CommandResult<Vec<String>> {
        Ok(self
            .index_definitions()?
            .into_iter()
            .skip(start)
            .take(page_size)
            .map(|definition| definition.name)
            .collect())
    }

    fn get_indexes(&self, start: usize, page_size: usize) -> CommandResult<Vec<IndexDefinition>> {
        Ok(self
            .index_definitions()?
            .into_iter()
            .skip(start)
            .take(page_size)
            .collect())
    }

    fn reset_index(&self, name: &str) -> CommandResult<()> {
        if self.index_definition(name)?.is_none() {
            return Err(CommandError::IndexNotFound(name.to_string()));
        }
        debug!(index = %name, "index reset");
        Ok(())
    }

    fn get_index(&self, name: &str) -> CommandResult<Option<IndexDefinition>> {
        self.index_definition(name)
    }

    fn put_index(
        &self,
        name: &str,
        definition: &IndexDefinition,
        overwrite: bool,
    ) -> CommandResult<String> {
        let definition = IndexDefinition {
            name: name.to_string(),
            ..definition.clone()
        };
        CompiledIndex::compile(&definition)?;
        let value = serde_json::to_vec(&definition).map_err(map_err!(Serialize))?;

        self.write(|txn| {
            let mut table = txn
                .open_table(self.tables.indexes())
                .map_err(map_err!(Storage))?;
            let lower = name.to_lowercase();
            let exists = table
                .get(lower.as_str())
                .map_err(map_err!(Storage))?
                .is_some();
            if exists && !overwrite {
                return Err(CommandError::IndexExists(name.to_string()));
            }
            table
                .insert(lower.as_str(), value.as_slice())
                .map_err(map_err!(Storage))?;
            Ok(())
        })?;
        debug!(index = %name, fields = ?definition.fields, "index stored");
        Ok(name.to_string())
    }

    fn delete_index(&self, name: &str) -> CommandResult<()> {
        let existed = self.write(|txn| {
            let mut table = txn
                .open_table(self.tables.indexes())
                .map_err(map_err!(Storage))?;
            let existed = table
                .remove(name.to_lowercase().as_str())
                .map_err(map_err!(Storage))?
                .is_some();
            Ok(existed)
        })?;
        debug!(index = %name, existed, "index deleted");
        Ok(())
    }

    fn delete_by_index(
        &self,
        index: &str,
        query: &IndexQuery,
        allow_stale: bool,
    ) -> CommandResult<()> {
        let keys = self.evaluate(index, &query.query)?.matched_keys();
        self.write(|txn| {
            for key in &keys {
                self.delete_in(txn, key, None)?;
            }
            Ok(())
        })?;
        debug!(index, count = keys.len(), allow_stale, "documents deleted by index");
        Ok(())
    }

    fn delete(&self, key: &str, etag: Option<Etag>) -> CommandResult<()> {
        self.write(|txn| self.delete_in(txn, key, etag))?;
        Ok(())
    }

    fn put(
        &self,
        key: &str,
        etag: Option<Etag>,
        document: &DocumentBody,
        metadata: &Metadata,
    ) -> CommandResult<PutResult> {
        let stored =
            self.write(|txn| self.put_in(txn, key, etag, document.clone(), metadata.clone()))?;
        Ok(PutResult {
            key: stored.key,
            etag: stored.etag,
        })
    }

    fn patch(
        &self,
        key: &str,
        patches: &[PatchRequest],
        etag: Option<Etag>,
    ) -> CommandResult<PatchResult> {
        let apply: Transform<'_> = &|doc| apply_patches(doc, patches);
        let (outcome, _) = self.write(|txn| self.patch_in(txn, key, etag, apply, None))?;
        Ok(outcome)
    }

    fn patch_or_default(
        &self,
        key: &str,
        patches_to_existing: &[PatchRequest],
        patches_to_default: &[PatchRequest],
        default_metadata: &Metadata,
    ) -> CommandResult<PatchResult> {
        let apply: Transform<'_> = &|doc| apply_patches(doc, patches_to_existing);
        let default: Transform<'_> = &|doc| apply_patches(doc, patches_to_default);
        let (outcome, _) = self.write(|txn| {
            self.patch_in(txn, key, None, apply, Some((default, default_metadata)))
        })?;
        Ok(outcome)
    }

    fn scripted_patch(
        &self,
        key: &str,
        patch: &ScriptedPatchRequest,
        etag: Option<Etag>,
    ) -> CommandResult<PatchResult> {
        let apply: Transform<'_> = &|doc| run_script(doc, patch);
        let (outcome, _) = self.write(|txn| self.patch_in(txn, key, etag, apply, None))?;
        Ok(outcome)
    }

    fn scripted_patch_or_default(
        &self,
        key: &str,
        patch_existing: &ScriptedPatchRequest,
        patch_default: &ScriptedPatchRequest,
        default_metadata: &Metadata,
    ) -> CommandResult<PatchResult> {
        let apply: Transform<'_> = &|doc| run_script(doc, patch_existing);
        let default: Transform<'_> = &|doc| run_script(doc, patch_default);
        let (outcome, _) = self.write(|txn| {
            self.patch_in(txn, key, None, apply, Some((default, default_metadata)))
        })?;
        Ok(outcome)
    }

    fn for_database(&self, database: &str) -> Arc<dyn DatabaseCommands> {
        Arc::new(self.scoped(database))
    }

    fn for_system_database(&self) -> Arc<dyn DatabaseCommands> {
        Arc::new(self.scoped(SYSTEM_DATABASE))
    }

    fn with_credentials(&self, credentials: Credentials) -> Arc<dyn DatabaseCommands> {
        Arc::new(self.with_credentials_handle(credentials))
    }

    fn get_statistics(&self) -> CommandResult<DatabaseStatistics> {
        let docs = self.load_all()?;
        let txn = self.begin_read()?;
        let attachments = self.read_attachment_headers(&txn)?;
        let indexes = self.index_definitions()?;
        Ok(DatabaseStatistics {
            database: self.database_name().to_string(),
            count_of_documents: docs.len() as u64,
            count_of_indexes: indexes.len() as u64,
            count_of_attachments: attachments.len() as u64,
            stale_indexes: Vec::new(),
            last_doc_etag: docs.iter().filter_map(|doc| doc.etag).max(),
            last_attachment_etag: attachments.iter().map(|a| a.etag).max(),
        })
    }

    fn get_database_names(&self, page_size: usize, start: usize) -> CommandResult<Vec<String>> {
        Ok(self
            .database_names()?
            .into_iter()
            .skip(start)
            .take(page_size)
            .collect())
    }

    fn put_attachment(
        &self,
        key: &str,
        etag: Option<Etag>,
        data: &mut dyn Read,
        metadata: &Metadata,
    ) -> CommandResult<Etag> {
        let payload = quiver_io::read_data(data)?;
        let header = self.write(|txn| {
            let existing = self.attachment_header_in(txn, key)?;
            check_etag(key, etag, existing.map(|a| a.etag))?;
            let header = StoredAttachment {
                key: key.to_string(),
                etag: next_etag(txn)?,
                metadata: metadata.clone(),
                size: payload.len() as u64,
            };
            let value = serde_json::to_vec(&header).map_err(map_err!(Serialize))?;
            let lower = key.to_lowercase();
            {
                let mut table = txn
                    .open_table(self.tables.attachments())
                    .map_err(map_err!(Storage))?;
                table
                    .insert(lower.as_str(), value.as_slice())
                    .map_err(map_err!(Storage))?;
            }
            {
                let mut table = txn
                    .open_table(self.tables.attachment_data())
                    .map_err(map_err!(Storage))?;
                table
                    .insert(lower.as_str(), payload.as_slice())
                    .map_err(map_err!(Storage))?;
            }
            Ok(header)
        })?;
        debug!(%key, etag = %header.etag, size = header.size, "attachment stored");
        Ok(header.etag)
    }

    fn get_attachment(&self, key: &str) -> CommandResult<Option<Attachment>> {
        let txn = self.begin_read()?;
        Ok(self
            .read_attachment(&txn, key)?
            .map(|(header, data)| Attachment {
                key: header.key,
                etag: header.etag,
                data: Bytes::from(data),
                metadata: header.metadata,
            }))
    }

    fn delete_attachment(&self, key: &str, etag: Option<Etag>) -> CommandResult<()> {
        self.write(|txn| {
            let existing = self.attachment_header_in(txn, key)?;
            check_etag(key, etag, existing.map(|a| a.etag))?;
            let lower = key.to_lowercase();
            {
                let mut table = txn
                    .open_table(self.tables.attachments())
                    .map_err(map_err!(Storage))?;
                table.remove(lower.as_str()).map_err(map_err!(Storage))?;
            }
            {
                let mut table = txn
                    .open_table(self.tables.attachment_data())
                    .map_err(map_err!(Storage))?;
                table.remove(lower.as_str()).map_err(map_err!(Storage))?;
            }
            Ok(())
        })?;
        debug!(%key, "attachment deleted");
        Ok(())
    }

    fn get_terms(
        &self,
        index: &str,
        field: &str,
        from_value: &str,
        page_size: usize,
    ) -> CommandResult<Vec<String>> {
        let evaluation = self.evaluate(index, "")?;
        let field = evaluation.index.field(field)?;
        Ok(index::terms(&evaluation.entries, field, from_value, page_size))
    }

    fn disable_all_caching(&self) -> CachingScope {
        self.cache.disable()
    }

    fn multi_get(&self, requests: &[GetRequest]) -> CommandResult<Vec<GetResponse>> {
        Ok(requests
            .iter()
            .map(|request| multi_get::execute(self, request))
            .collect())
    }

    fn update_by_index(
        &self,
        index: &str,
        query: &IndexQuery,
        patch: &ScriptedPatchRequest,
        allow_stale: bool,
    ) -> CommandResult<()> {
        let keys = self.evaluate(index, &query.query)?.matched_keys();
        let apply: Transform<'_> = &|doc| run_script(doc, patch);
        self.write(|txn| {
            for key in &keys {
                self.patch_in(txn, key, None, apply, None)?;
            }
            Ok(())
        })?;
        debug!(index, count = keys.len(), allow_stale, "documents updated by index");
        Ok(())
    }

    fn get_facets(
        &self,
        index: &str,
        query: &IndexQuery,
        facet_setup_doc: &str,
        start: usize,
        page_size: Option<usize>,
    ) -> CommandResult<FacetResults> {
        let setup_doc = self
            .load(facet_setup_doc)?
            .ok_or_else(|| CommandError::NotFound(facet_setup_doc.to_string()))?;
        let setup: FacetSetup = serde_json::from_value(Value::Object(setup_doc.data))
            .map_err(map_err!(Deserialize))?;

        let evaluation = self.evaluate(index, &query.query)?;
        let mut results = FacetResults::default();
        for facet in setup.facets {
            let field = evaluation.index.field(&facet.name)?;
            let values = index::facet_values(&evaluation.entries, &evaluation.terms, field)
                .into_iter()
                .skip(start)
                .take(page_size.unwrap_or(usize::MAX))
                .collect();
            results.results.insert(facet.name, FacetResult { values });
        }
        Ok(results)
    }

    fn starts_with(
        &self,
        prefix: &str,
        matches: Option<&str>,
        start: usize,
        page_size: usize,
        metadata_only: bool,
    ) -> CommandResult<Vec<JsonDocument>> {
        Ok(self
            .load_prefixed(prefix)?
            .into_iter()
            .filter(|doc| match matches {
                Some(pattern) if !pattern.is_empty() => {
                    let rest: String = doc.key.chars().skip(prefix.chars().count()).collect();
                    wildcard_match(pattern, &rest)
                }
                _ => true,
            })
            .skip(start)
            .take(page_size)
            .map(|doc| strip_body(doc, metadata_only))
            .collect())
    }

    fn force_read_from_master(&self) {
        self.set_read_from_master();
        debug!(database = %self.database_name(), "reads pinned to master");
    }

    fn head(&self, key: &str) -> CommandResult<Option<JsonDocumentMetadata>> {
        Ok(self.load(key)?.map(|doc| doc.to_metadata()))
    }
}
