//! # af-storage
//!
//! Storage adapters for Affix.
//!
//! Every backend implements [`Storage`]: store bytes at a key, fetch the bytes at
//! a key (or learn that nothing is there), and delete a key. Keys are produced by
//! the attachment interpolator; adapters treat them as opaque except for the
//! local filesystem, where a key is a path.
//!
//! - [`LocalStorage`]: local filesystem, confined to a root directory
//! - [`MemoryStorage`]: in-process map with an operation journal
//! - [`S3Storage`]: S3-compatible object store (feature `storage-s3`)
//! - [`DualStorage`]: writes and deletes go to two backends, reads to the primary
//!
//! ## Operational caveat
//!
//! A dual-backend write or delete can succeed on one side and fail on the
//! other. The failure is surfaced (see [`DualFailurePolicy`]) but never
//! reconciled; the two backends may disagree until an operator intervenes.

pub mod dual;
pub mod factory;
pub mod local;
pub mod memory;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod storage;

pub use af_core::{AccessPolicy, DualFailurePolicy, StorageBackend};
pub use dual::DualStorage;
pub use factory::create_storage;
pub use local::LocalStorage;
pub use memory::{MemoryStorage, StorageOperation};
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use storage::{calculate_digest, FileMetadata, PutOptions, Storage, StorageError, StorageResult};
