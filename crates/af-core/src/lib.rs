//! # af-core
//!
//! Core types, traits, and configuration for Affix.
//!
//! This crate provides the building blocks shared by the other crates:
//! - The parent-record contract ([`Record`]) and an in-memory implementation
//! - Attribute values stored on records
//! - Validation error collections
//! - Configuration types and loading

pub mod config;
pub mod error;
pub mod record;

pub use config::{
    AccessPolicy, AffixConfig, AttachmentSettings, DualConfig, DualFailurePolicy,
    LocalStorageConfig, S3Config, SizeRange, StorageBackend, StorageConfig, StyleSettings,
    ValidationSettings,
};
pub use error::*;
pub use record::*;
