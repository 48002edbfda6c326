//! Maintenance commands for feature store files.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use index_classes::{class_label, ClassRanges};
use ingestion_extraction::import_word_vectors;
use storage_features::{FeatureStore, OpenMode, FEATURES_TABLE};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(author, version, about = "Create and inspect feature store files")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create an empty store file.
    Init {
        store: PathBuf,
    },
    /// Print every table with its width and row count.
    Info {
        store: PathBuf,
    },
    /// Append plain-text word vectors (`word v1 .. vD` per line).
    ImportWords {
        store: PathBuf,
        vectors: PathBuf,
        /// Width of each word vector.
        #[arg(long)]
        dim: usize,
        /// Rows appended per chunk.
        #[arg(long, default_value_t = 1024)]
        batch: usize,
        /// Only import words naming a class in this image store.
        #[arg(long, value_name = "STORE")]
        classes_from: Option<PathBuf>,
    },
    /// Rebuild the class range file from a store's image identifiers.
    ClassRanges {
        store: PathBuf,
        output: PathBuf,
    },
}

fn run(args: Args) -> Result<()> {
    match args.command {
        Command::Init { store } => {
            anyhow::ensure!(!store.exists(), "{} already exists", store.display());
            FeatureStore::open(&store, OpenMode::Create)?.close()?;
            println!("created {}", store.display());
        }
        Command::Info { store } => {
            let handle = FeatureStore::open(&store, OpenMode::Read)
                .with_context(|| format!("opening {}", store.display()))?;
            let tables = handle.tables()?;
            if tables.is_empty() {
                println!("{}: no tables", store.display());
            }
            for table in tables {
                println!(
                    "{}\tdim={}\trows={}",
                    table.name(),
                    table.dim(),
                    handle.size(&table)?
                );
            }
        }
        Command::ImportWords {
            store,
            vectors,
            dim,
            batch,
            classes_from,
        } => {
            let wanted = classes_from.map(|path| image_classes(&path)).transpose()?;
            let reader = BufReader::new(
                File::open(&vectors).with_context(|| format!("opening {}", vectors.display()))?,
            );
            let report = FeatureStore::scoped(&store, OpenMode::Create, |handle| {
                import_word_vectors(reader, handle, dim, batch, |word| {
                    wanted.as_ref().map_or(true, |classes| classes.contains(word))
                })
            })?;
            println!(
                "imported {} word vectors ({} filtered)",
                report.imported, report.filtered
            );
        }
        Command::ClassRanges { store, output } => {
            let handle = FeatureStore::open(&store, OpenMode::Read)
                .with_context(|| format!("opening {}", store.display()))?;
            let ids = handle.read_ids(&handle.table(FEATURES_TABLE)?)?;
            let ranges = ClassRanges::build(&ids)?;
            ranges.save(&output)?;
            println!("wrote {} class ranges to {}", ranges.len(), output.display());
        }
    }
    Ok(())
}

fn image_classes(path: &Path) -> Result<BTreeSet<String>> {
    let handle = FeatureStore::open(path, OpenMode::Read)
        .with_context(|| format!("opening {}", path.display()))?;
    let ids = handle.read_ids(&handle.table(FEATURES_TABLE)?)?;
    Ok(ids
        .iter()
        .filter_map(|id| class_label(id))
        .map(str::to_string)
        .collect())
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    if let Err(err) = run(Args::parse()) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
