use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "affix")]
#[command(about = "Manage file attachments of JSON records", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (TOML), layered under AFFIX__ environment variables
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

/// The record and slot a command works on
#[derive(Args, Debug, Clone)]
pub struct Target {
    /// JSON record file; created on first assignment
    pub record: PathBuf,

    /// Attachment slot, e.g. avatar
    pub slot: String,

    /// Model name for a new record
    #[arg(long, default_value = "Record")]
    pub model: String,

    /// Id for a new record
    #[arg(long)]
    pub id: Option<i64>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Assign a file and save
    Assign {
        #[command(flatten)]
        target: Target,

        /// File to upload
        file: PathBuf,

        /// Content type, guessed from the file name when omitted
        #[arg(long)]
        content_type: Option<String>,
    },

    /// Remove the attached file
    Clear {
        #[command(flatten)]
        target: Target,
    },

    /// Print the URL of a style
    Url {
        #[command(flatten)]
        target: Target,

        #[arg(short, long)]
        style: Option<String>,

        /// Leave out the ?<updated_at> suffix
        #[arg(long)]
        no_timestamp: bool,
    },

    /// Print the storage path of a style
    Path {
        #[command(flatten)]
        target: Target,

        #[arg(short, long)]
        style: Option<String>,
    },

    /// Regenerate every style from the stored original
    Reprocess {
        #[command(flatten)]
        target: Target,
    },

    /// Delete every stored file and clear the metadata
    Destroy {
        #[command(flatten)]
        target: Target,
    },

    /// Print metadata and locations as JSON
    Show {
        #[command(flatten)]
        target: Target,
    },
}
