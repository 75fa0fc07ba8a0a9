//! switch-store-tool: inspect object store schemas and warm-boot dumps
//! offline.
//!
//! Paths not given on the command line come from the store configuration
//! file.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info};
use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use switch_store::{DumpSummary, SchemaRegistry, StoreConfig, SwitchStore, TypeDescriptor};

/// Switch object store operator tool
#[derive(Parser, Debug)]
#[command(name = "switch-store-tool")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Store configuration file
    #[arg(short = 'c', long, default_value = "/etc/switch/store.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the object types of a schema
    Types {
        /// Schema file, overrides the configuration
        #[arg(short = 's', long)]
        schema: Option<PathBuf>,
    },
    /// Replay a dump and print every object
    Dump {
        #[arg(short = 's', long)]
        schema: Option<PathBuf>,

        /// Dump file, overrides the configuration
        #[arg(short = 'f', long)]
        file: Option<PathBuf>,
    },
    /// Replay a dump and report whether it is consistent with the schema
    Verify {
        #[arg(short = 's', long)]
        schema: Option<PathBuf>,

        #[arg(short = 'f', long)]
        file: Option<PathBuf>,
    },
}

/// One line per type: id, name, attribute count, capacity, auto-objects.
fn describe_type(schema: &SchemaRegistry, desc: &TypeDescriptor) -> String {
    let mut line = format!(
        "{:>4}  {:<24} attrs={:<3} max={}",
        desc.object_type.0,
        desc.name,
        desc.attrs.len(),
        desc.max_objects
    );
    if !desc.auto_objects.is_empty() {
        let autos: Vec<&str> = desc
            .auto_objects
            .iter()
            .map(|t| schema.type_name(*t))
            .collect();
        let _ = write!(line, " auto=[{}]", autos.join(", "));
    }
    if !desc.counters.is_empty() {
        let _ = write!(line, " counters={}", desc.counters.len());
    }
    line
}

fn load_config(path: &Path) -> Result<StoreConfig> {
    let config = StoreConfig::load_or_default(path)
        .with_context(|| format!("loading configuration {}", path.display()))?;
    Ok(config)
}

/// Builds an empty store and replays `dump` into it without touching
/// counters.
fn replay(schema_path: &Path, dump: &Path) -> Result<(SwitchStore, DumpSummary)> {
    let schema = SchemaRegistry::load(schema_path)
        .with_context(|| format!("loading schema {}", schema_path.display()))?;
    let store = SwitchStore::new(schema);
    let file = File::open(dump).with_context(|| format!("opening dump {}", dump.display()))?;
    let summary = store
        .replay_from(BufReader::new(file), false)
        .with_context(|| format!("replaying {}", dump.display()))?;
    info!(
        "Replayed {} objects and {} fixups from {}",
        summary.objects,
        summary.fixups,
        dump.display()
    );
    Ok((store, summary))
}

fn run(args: Args) -> Result<()> {
    let config = load_config(&args.config)?;
    let mut out = io::stdout().lock();

    match args.command {
        Command::Types { schema } => {
            let path = schema.unwrap_or(config.schema.path);
            let schema = SchemaRegistry::load(&path)
                .with_context(|| format!("loading schema {}", path.display()))?;
            writeln!(out, "schema version {}", schema.version())?;
            for desc in schema.types() {
                writeln!(out, "{}", describe_type(&schema, desc))?;
            }
        }
        Command::Dump { schema, file } => {
            let schema = schema.unwrap_or(config.schema.path);
            let file = file.unwrap_or(config.warm_boot.dump_path);
            let (store, _) = replay(&schema, &file)?;
            store.object_dump(&mut out)?;
        }
        Command::Verify { schema, file } => {
            let schema = schema.unwrap_or(config.schema.path);
            let file = file.unwrap_or(config.warm_boot.dump_path);
            if !file.exists() {
                bail!("dump {} does not exist", file.display());
            }
            let (store, replayed) = replay(&schema, &file)?;
            // dumping the replayed store again must yield the same records
            let mut redump = Vec::new();
            let again = store.dump_to(&mut redump)?;
            if again.objects != replayed.objects || again.fixups != replayed.fixups {
                bail!(
                    "round trip mismatch: replayed {} objects/{} fixups, re-dumped {}/{}",
                    replayed.objects,
                    replayed.fixups,
                    again.objects,
                    again.fixups
                );
            }
            writeln!(
                out,
                "{}: OK, {} objects, {} fixups, {} references",
                file.display(),
                replayed.objects,
                replayed.fixups,
                store.reference_count()
            )?;
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
