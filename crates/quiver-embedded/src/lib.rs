//! In-process document engine for Quiver.
//!
//! [`EmbeddedDatabase`] implements the blocking
//! [`DatabaseCommands`](quiver_core::DatabaseCommands) contract on top of a
//! redb file (or an in-memory redb backend for tests). Documents are stored
//! as JSON per named database; indexes are definitions evaluated at query
//! time, so query results are never stale.

mod cache;
mod engine;
mod index;
mod multi_get;
mod patch;
mod script;
mod store;
mod tables;

pub use store::EmbeddedDatabase;
