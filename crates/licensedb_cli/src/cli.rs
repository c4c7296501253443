use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "licensedb",
    about = "licensedb: inspect and maintain a License/System document store",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print core linkage and version
    Ping,

    /// Print document counts per collection
    Stats {
        #[command(flatten)]
        store: StoreArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Report License/System symmetry violations
    Check {
        #[command(flatten)]
        store: StoreArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Rebuild System back-references from the License side
    Repair {
        #[command(flatten)]
        store: StoreArgs,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Import a legacy combined JSON file into the store
    ImportLegacy {
        /// Path to the legacy file holding all collections under top-level keys
        file: PathBuf,

        #[command(flatten)]
        store: StoreArgs,
    },
}

/// Where the store lives.
#[derive(Args, Clone)]
pub struct StoreArgs {
    /// TOML config file; overrides the flags below
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Data directory
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,

    /// Use the SQLite backend instead of per-collection JSON files
    #[arg(long)]
    pub sqlite: bool,
}
