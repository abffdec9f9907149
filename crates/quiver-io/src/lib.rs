//! Stream primitives shared by Quiver clients and engines.
//!
//! - [`pump`] copies an async source into an async destination with a single
//!   reused buffer and strict read-then-write alternation.
//! - [`read_entire_block`] fills a buffer exactly or fails with
//!   [`StreamError::UnexpectedEof`].
//! - [`read_data`] slurps a stream of unknown length into one allocation.
//! - [`release_together`] ties secondary resources to a stream's lifetime.

mod error;
pub mod grouped;
pub mod pump;
pub mod read;

pub use error::{PumpError, StreamError, StreamResult};
pub use grouped::{GroupedStream, Release, ReleaseFn, Resource, release_fn, release_together};
pub use pump::{PUMP_BUFFER_SIZE, Pump, pump};
pub use read::{READ_DATA_CHUNK_SIZE, read_data, read_entire_block, read_entire_block_vec};
