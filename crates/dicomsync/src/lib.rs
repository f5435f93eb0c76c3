//! dicomsync: keep watched folders and an imaging archive in step.
//!
//! The [`indexer`] module holds the engine: the folder scanner, the
//! ingestion coordinator shared by the scan and push paths, and the storage
//! callbacks the archive host drives.

pub mod indexer;
