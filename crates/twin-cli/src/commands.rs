use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};
use twin_crypto::{Blake3Digest, OsRandom};
use twin_store::{DriverKind, GenerationalStore, Storage, StorageConfig};
use twin_types::{Bucket, Lookup};

use crate::cli::*;

/// Where the CLI remembers the active bucket between invocations.
const GENERATION_FILE: &str = "generation.json";

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
struct Generation {
    active: Bucket,
}

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = effective_config(&cli)?;
    let Cli { command, format, .. } = cli;
    match command {
        Command::Config => cmd_config(&config, &format),
        Command::Put(args) => cmd_put(&config, args, &format),
        Command::Get(args) => cmd_get(&config, args, &format),
        Command::Root => cmd_root(&config, &format),
        Command::SetRoot(args) => cmd_set_root(&config, args, &format),
        Command::Empty(args) => cmd_empty(&config, args, &format),
        Command::Reclaim(args) => cmd_reclaim(&config, args, &format),
        Command::Stats => cmd_stats(&config, &format),
    }
}

fn effective_config(cli: &Cli) -> anyhow::Result<StorageConfig> {
    let mut config = match &cli.config {
        Some(path) => StorageConfig::load(path)
            .with_context(|| format!("reading configuration {}", path.display()))?,
        None => StorageConfig::default(),
    };
    if let Some(driver) = cli.driver {
        config.driver = driver;
    }
    if let Some(path) = &cli.path {
        config.path = path.clone();
    }
    config.validate()?;
    Ok(config)
}

fn generation_path(config: &StorageConfig) -> Option<PathBuf> {
    if !config.driver.is_on_disk() || config.path == Path::new(":memory:") {
        return None;
    }
    Some(config.path.join(GENERATION_FILE))
}

fn load_generation(config: &StorageConfig) -> anyhow::Result<Bucket> {
    let Some(path) = generation_path(config) else {
        return Ok(Bucket::Primary);
    };
    match fs::read_to_string(&path) {
        Ok(text) => {
            let generation: Generation = serde_json::from_str(&text)
                .with_context(|| format!("parsing {}", path.display()))?;
            Ok(generation.active)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Bucket::Primary),
        Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
    }
}

fn save_generation(config: &StorageConfig, active: Bucket) -> anyhow::Result<()> {
    let Some(path) = generation_path(config) else {
        return Ok(());
    };
    let text = serde_json::to_string_pretty(&Generation { active })?;
    fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
    debug!(path = %path.display(), %active, "generation saved");
    Ok(())
}

fn open_store(config: &StorageConfig) -> anyhow::Result<GenerationalStore> {
    if config.driver == DriverKind::Memory {
        warn!("memory driver selected; nothing outlives this command");
    }
    let storage = Storage::try_new(config, Arc::new(Blake3Digest::OBJECT), Arc::new(OsRandom))
        .context("opening storage")?;
    Ok(GenerationalStore::new(storage, load_generation(config)?))
}

fn cmd_config(config: &StorageConfig, format: &OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => print!("{}", config.to_toml_string()?),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
    }
    Ok(())
}

fn cmd_put(config: &StorageConfig, args: PutArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let value = match &args.file {
        Some(file) => fs::read(file).with_context(|| format!("reading {}", file.display()))?,
        None => {
            let mut buf = Vec::new();
            io::stdin().read_to_end(&mut buf).context("reading stdin")?;
            buf
        }
    };
    let store = open_store(config)?;
    let key = store.put(&value)?;
    match format {
        OutputFormat::Text => println!(
            "{} {} ({} bytes, bucket {})",
            "✓".green(),
            key.yellow(),
            value.len(),
            store.active()
        ),
        OutputFormat::Json => println!(
            "{}",
            json!({ "key": key, "bytes": value.len(), "bucket": store.active() })
        ),
    }
    Ok(())
}

fn cmd_get(config: &StorageConfig, args: GetArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let Lookup::Found(value) = store.get(&args.key) else {
        bail!("no value stored under {}", args.key);
    };
    match format {
        OutputFormat::Text => {
            let mut out = io::stdout().lock();
            out.write_all(&value)?;
            out.flush()?;
        }
        OutputFormat::Json => println!(
            "{}",
            json!({
                "key": args.key,
                "bytes": value.len(),
                "value": String::from_utf8_lossy(&value),
            })
        ),
    }
    Ok(())
}

fn cmd_root(config: &StorageConfig, format: &OutputFormat) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let root = store.root();
    match format {
        OutputFormat::Text if root.is_empty() => println!("{}", "(no root)".dimmed()),
        OutputFormat::Text => println!("{root}"),
        OutputFormat::Json => println!("{}", json!({ "root": root })),
    }
    Ok(())
}

fn cmd_set_root(
    config: &StorageConfig,
    args: SetRootArgs,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    let store = open_store(config)?;
    store.set_root(&args.hash)?;
    match format {
        OutputFormat::Text => println!("{} Root set to {}", "✓".green(), args.hash.yellow()),
        OutputFormat::Json => println!("{}", json!({ "root": args.hash })),
    }
    Ok(())
}

fn cmd_empty(config: &StorageConfig, args: EmptyArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let store = open_store(config)?;
    if args.bucket == store.active() {
        eprintln!(
            "{} {} is the active bucket; its values are discarded",
            "!".yellow().bold(),
            args.bucket
        );
    }
    store.empty_bucket(args.bucket)?;
    let name = args.bucket.to_string();
    match format {
        OutputFormat::Text => println!("{} Emptied bucket {}", "✓".green(), name.bold()),
        OutputFormat::Json => println!("{}", json!({ "emptied": args.bucket })),
    }
    Ok(())
}

fn cmd_reclaim(
    config: &StorageConfig,
    args: ReclaimArgs,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let report = store.reclaim(&args.keys)?;
    save_generation(config, store.active())?;
    match format {
        OutputFormat::Text => {
            let reclaimed = store.inactive().to_string();
            println!("{} Reclaimed bucket {}", "✓".green().bold(), reclaimed.bold());
            println!("  Active: {}", store.active().to_string().cyan());
            println!("  Copied: {}", report.copied);
            println!("  Already present: {}", report.already_present);
            if report.missing > 0 {
                println!("  Missing: {}", report.missing.to_string().red());
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}

fn cmd_stats(config: &StorageConfig, format: &OutputFormat) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let stats = store.stats()?;
    match format {
        OutputFormat::Text => {
            println!("Driver: {}", store.storage().driver_name().bold());
            let rows = [
                (Bucket::Primary, stats.primary),
                (Bucket::Secondary, stats.secondary),
            ];
            for (bucket, counts) in rows {
                let marker = if bucket == stats.active {
                    "*".green().bold()
                } else {
                    " ".normal()
                };
                let name = bucket.to_string();
                println!("{marker} {name:<9} {} entries, {} bytes", counts.entries, counts.bytes);
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
    }
    Ok(())
}
