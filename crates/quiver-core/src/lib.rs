//! Shared model and contracts for the Quiver document store.
//!
//! Holds everything both sides of a Quiver connection agree on:
//!
//! - the document model ([`JsonDocument`], [`Etag`], [`Attachment`], batch
//!   commands, queries, multi-get requests),
//! - the native ordered [`HeaderMap`] carried by every engine handle,
//! - the synchronous [`DatabaseCommands`] contract an engine implements,
//! - the [`CommandError`] taxonomy and the [`QuiverConfig`] TOML loader.
//!
//! Document bodies and metadata are opaque `serde_json` objects. Nothing in
//! this crate stores state about documents; the engine behind
//! [`DatabaseCommands`] is the single source of truth.

pub mod admin;
pub mod commands;
pub mod config;
pub mod database;
pub mod document;
pub mod error;
pub mod etag;
pub mod header;
pub mod multi_get;
pub mod query;
pub mod scope;

pub use admin::*;
pub use commands::*;
pub use config::{CachingConfig, ClientConfig, DatabaseConfig, DispatchMode, QuiverConfig, StorageConfig};
pub use database::{DatabaseCommands, SYSTEM_DATABASE};
pub use document::*;
pub use error::{CommandError, CommandResult};
pub use etag::{Etag, EtagParseError};
pub use header::{Header, HeaderMap, SharedHeaders};
pub use multi_get::*;
pub use query::*;
pub use scope::CachingScope;
