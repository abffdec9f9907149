//! Async command contract and the embedded client facade.
//!
//! [`AsyncDatabaseCommands`] is the non-blocking command surface callers
//! program against. [`EmbeddedAsyncClient`] satisfies it by delegating each
//! call to a synchronous [`DatabaseCommands`](quiver_core::DatabaseCommands)
//! engine and handing back a boxed future, either already resolved
//! ([`DispatchMode::Inline`](quiver_core::DispatchMode::Inline)) or driven on
//! the tokio blocking pool.
//!
//! # Example
//!
//! ```no_run
//! # async fn run() -> quiver_core::CommandResult<()> {
//! use quiver_client::{AsyncDatabaseCommands, EmbeddedAsyncClient};
//! use quiver_core::QuiverConfig;
//!
//! let client = EmbeddedAsyncClient::open(&QuiverConfig::in_memory())?;
//! let doc = client.get("docs/1").await?;
//! assert!(doc.is_none());
//! # Ok(())
//! # }
//! ```

pub mod attachment_io;
pub mod contract;
pub mod dispatch;
pub mod embedded;
pub mod headers;

pub use attachment_io::{download_attachment, upload_attachment};
pub use contract::{AsyncDatabaseCommands, CommandFuture};
pub use dispatch::Dispatcher;
pub use embedded::EmbeddedAsyncClient;
pub use headers::HeaderDictionary;
