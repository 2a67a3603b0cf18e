//! # af-cli
//!
//! The `affix` command: assign, inspect and remove attachments of records kept
//! as JSON files, using the storage and slots from an Affix configuration.

pub mod args;
pub mod commands;
pub mod json_record;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging. Output goes to stderr so command output stays clean.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,af_attachments=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .init();
}
