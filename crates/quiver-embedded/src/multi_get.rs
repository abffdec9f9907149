//! Routing of multi-get requests onto engine reads.
//!
//! | url                        | parameters                              |
//! |----------------------------|-----------------------------------------|
//! | `/docs/{key}`              |                                         |
//! | `/docs`                    | `start`, `pageSize`, `startsWith`, `matches` |
//! | `/queries`                 | `id` (repeated), `include` (repeated)   |
//! | `/indexes/{name}`          | `query`, `start`, `pageSize`, `include` |
//! | `/stats`                   |                                         |
//!
//! Unknown urls and missing documents answer 404, unparsable parameters 400
//! and engine faults 500, each with an `{"Error": message}` body except the
//! plain 404.

use quiver_core::{
    CommandError, CommandResult, DEFAULT_PAGE_SIZE, DatabaseCommands, GetRequest, GetResponse,
    IndexQuery,
};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::store::{EmbeddedDatabase, map_err};

pub fn execute(db: &EmbeddedDatabase, request: &GetRequest) -> GetResponse {
    match route(db, request) {
        Ok(Some(response)) => response,
        Ok(None) => GetResponse::new(404, Value::Null),
        Err(err) => {
            let status = match err {
                CommandError::InvalidQuery(_) => 400,
                _ => 500,
            };
            debug!(url = %request.url, status, error = %err, "multi-get request failed");
            GetResponse::new(status, json!({ "Error": err.to_string() }))
        }
    }
}

fn route(db: &EmbeddedDatabase, request: &GetRequest) -> CommandResult<Option<GetResponse>> {
    let path = request.url.trim_start_matches('/');
    let (resource, rest) = path.split_once('/').unwrap_or((path, ""));

    match resource.to_ascii_lowercase().as_str() {
        "docs" if !rest.is_empty() => match db.get(rest)? {
            Some(doc) => {
                let etag = doc.etag.map(|etag| etag.to_string());
                let mut response = ok(&doc)?;
                if let Some(etag) = etag {
                    response.headers.insert("ETag".to_string(), etag);
                }
                Ok(Some(response))
            }
            None => Ok(None),
        },
        "docs" => {
            let start = number_param(request, "start", 0)?;
            let page_size = number_param(request, "pageSize", DEFAULT_PAGE_SIZE)?;
            let docs = match request.query_param("startsWith") {
                Some(prefix) => db.starts_with(
                    &prefix,
                    request.query_param("matches").as_deref(),
                    start,
                    page_size,
                    false,
                )?,
                None => db.get_documents(start, page_size, false)?,
            };
            ok(&docs).map(Some)
        }
        "queries" if rest.is_empty() => {
            let ids = repeated_param(request, "id");
            let includes = repeated_param(request, "include");
            ok(&db.get_many(&ids, &includes, false)?).map(Some)
        }
        "indexes" if !rest.is_empty() => {
            let query = IndexQuery {
                query: request.query_param("query").unwrap_or_default(),
                start: number_param(request, "start", 0)?,
                page_size: number_param(request, "pageSize", DEFAULT_PAGE_SIZE)?,
                wait_for_non_stale_results: false,
            };
            let includes = repeated_param(request, "include");
            ok(&db.query(rest, &query, &includes, false)?).map(Some)
        }
        "stats" if rest.is_empty() => ok(&db.get_statistics()?).map(Some),
        _ => Ok(None),
    }
}

fn ok<T: Serialize>(value: &T) -> CommandResult<GetResponse> {
    let result = serde_json::to_value(value).map_err(map_err!(Serialize))?;
    Ok(GetResponse::new(200, result))
}

fn number_param(request: &GetRequest, name: &str, default: usize) -> CommandResult<usize> {
    match request.query_param(name) {
        Some(raw) => raw.parse().map_err(|_| {
            CommandError::InvalidQuery(format!("parameter '{name}' is not a number: {raw}"))
        }),
        None => Ok(default),
    }
}

fn repeated_param(request: &GetRequest, name: &str) -> Vec<String> {
    request
        .query_pairs()
        .into_iter()
        .filter(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value)
        .collect()
}
