use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use twin_store::DriverKind;
use twin_types::Bucket;

#[derive(Parser)]
#[command(
    name = "twin",
    about = "Two-bucket content-addressed object store",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Backend driver (memory, sqlite, filesystem); overrides the config file
    #[arg(long, global = true)]
    pub driver: Option<DriverKind>,

    /// Storage folder; overrides the config file
    #[arg(long, global = true)]
    pub path: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Store a value under its digest in the active bucket
    Put(PutArgs),
    /// Print the value stored under a key
    Get(GetArgs),
    /// Print the root hash
    Root,
    /// Replace the root hash
    SetRoot(SetRootArgs),
    /// Erase every value in one bucket
    Empty(EmptyArgs),
    /// Keep only the given keys and rotate buckets
    Reclaim(ReclaimArgs),
    /// Show entry and byte counts per bucket
    Stats,
    /// Print the effective configuration
    Config,
}

#[derive(Args)]
pub struct PutArgs {
    /// File to read; stdin when omitted
    pub file: Option<PathBuf>,
}

#[derive(Args)]
pub struct GetArgs {
    pub key: String,
}

#[derive(Args)]
pub struct SetRootArgs {
    pub hash: String,
}

#[derive(Args)]
pub struct EmptyArgs {
    /// primary (a) or secondary (b)
    pub bucket: Bucket,
}

#[derive(Args)]
pub struct ReclaimArgs {
    /// Keys that must survive
    #[arg(required = true)]
    pub keys: Vec<String>,
}
