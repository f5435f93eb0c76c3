//! Storage layer for dicomsync.
//!
//! - [`MappedFileReader`]: read a byte range of a file through a private
//!   memory map, falling back to a buffered read.
//! - [`ContentStore`]: blobs addressed by attachment UUID under a two-level
//!   sharded directory tree.

pub mod content_store;
pub mod error;
pub mod mapped;

pub use content_store::ContentStore;
pub use error::{Result, StorageError};
pub use mapped::{clamp_range, mapping_granularity, MappedFileReader};
