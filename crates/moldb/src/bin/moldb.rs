//! moldb Command-Line Tool
//!
//! Builds stores from a structure corpus and inspects them.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use moldb::settings::DEFAULT_CONFIG_FILE;
use moldb::{Backend, DeleteResult, Identifier, Ingestor, Settings};
use tracing_subscriber::{fmt, EnvFilter};

/// moldb
#[derive(Parser, Debug)]
#[command(name = "moldb")]
#[command(about = "Molecular structure storage keyed by chemical identifier")]
#[command(version)]
struct Args {
    /// JSON config file (skipped if absent)
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Storage engine, lmdb or sqlite (overrides config and MOLECULES_BACKEND)
    #[arg(short, long)]
    backend: Option<Backend>,

    /// Store file (overrides the backend's configured path)
    #[arg(short, long)]
    path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build a store from a mapping table and a directory of structure files
    Build {
        /// Mapping table (CSV)
        #[arg(long)]
        mapping: Option<PathBuf>,

        /// Directory of structure files
        #[arg(long)]
        xyz_dir: Option<PathBuf>,

        /// Records per transaction
        #[arg(long)]
        batch_size: Option<usize>,

        /// Skip fsync on commit (faster; unsafe on power loss)
        #[arg(long)]
        no_sync: bool,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the content stored under an identifier
    Get {
        /// The identifier (e.g. an InChI string)
        identifier: String,

        /// The identifier is percent-encoded
        #[arg(long)]
        encoded: bool,
    },

    /// Store a file's content under an identifier
    Put {
        identifier: String,

        /// File whose bytes become the record content
        file: PathBuf,
    },

    /// Delete the record under an identifier
    Delete { identifier: String },

    /// Show record count and store location
    Stats,
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let mut settings = Settings::load(&args.config)
        .with_context(|| format!("loading settings from {}", args.config.display()))?;
    if let Some(backend) = args.backend {
        settings.backend = backend;
    }
    if let Some(path) = args.path {
        match settings.backend {
            Backend::Sqlite => settings.sqlite_path = path,
            Backend::Lmdb | Backend::Memory => settings.lmdb_path = path,
        }
    }
    settings.validate()?;

    match args.command {
        Commands::Build {
            mapping,
            xyz_dir,
            batch_size,
            no_sync,
            json,
        } => {
            if let Some(mapping) = mapping {
                settings.inchi_mapping = mapping;
            }
            if let Some(dir) = xyz_dir {
                settings.xyz_dir = dir;
            }
            if let Some(size) = batch_size {
                settings.batch_size = size;
            }
            settings.durable = !no_sync;

            let store = settings.open_store(false)?;
            let summary = Ingestor::new(store.as_ref(), settings.ingest_options())
                .run(&settings.inchi_mapping)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("{summary}");
            }
        }

        Commands::Get {
            identifier,
            encoded,
        } => {
            let id = if encoded {
                moldb::decode(&identifier)?
            } else {
                Identifier::new(identifier)?
            };
            let store = settings.open_store(true)?;
            match store.get(&id)? {
                Some(record) => std::io::stdout()
                    .write_all(&record.content)
                    .context("writing content")?,
                None => bail!("not found: {id}"),
            }
        }

        Commands::Put { identifier, file } => {
            let id = Identifier::new(identifier)?;
            let content =
                std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let store = settings.open_store(false)?;
            store.put(&id, &content)?;
            store.sync()?;
            tracing::info!(identifier = %id, bytes = content.len(), "stored");
        }

        Commands::Delete { identifier } => {
            let id = Identifier::new(identifier)?;
            let store = settings.open_store(false)?;
            match store.delete(&id)? {
                DeleteResult::Deleted => {
                    store.sync()?;
                    println!("deleted: {id}");
                }
                DeleteResult::NotFound => bail!("not found: {id}"),
            }
        }

        Commands::Stats => {
            let store = settings.open_store(true)?;
            println!("backend: {}", store.backend());
            println!("path:    {}", settings.store_path().display());
            println!("records: {}", store.len()?);
        }
    }

    Ok(())
}
