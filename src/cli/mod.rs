//! Command-line interface for bookpack.
//!
//! Provides commands for materializing a package skeleton, importing
//! content files, and monitoring a package for external edits.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use crate::config;
use crate::keeper::Keeper;
use crate::media::MediaTypes;

/// bookpack - manifest and folder manager for EPUB-like packages
#[derive(Parser, Debug)]
#[command(name = "bookpack")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Materialize an empty package skeleton
    Init {
        /// Package root directory (created if missing)
        root: PathBuf,
    },

    /// Import content files into a package
    ///
    /// Filename uniqueness is guaranteed within one invocation only: each
    /// run starts from an empty registry, so importing a name that already
    /// exists under the root from an earlier run overwrites that file.
    Import {
        /// Package root directory
        root: PathBuf,

        /// Files to import
        files: Vec<PathBuf>,

        /// Declared media type, overriding extension classification
        #[arg(short, long)]
        media_type: Option<String>,

        /// Emit the resulting manifest entries as JSON
        #[arg(long)]
        json: bool,
    },

    /// Import files and monitor them for external edits until Ctrl+C
    Watch {
        /// Package root directory
        root: PathBuf,

        /// Files to import and watch
        files: Vec<PathBuf>,
    },

    /// Show resolved configuration (debug)
    Config,
}

/// One manifest entry in `import --json` output
#[derive(Debug, Serialize)]
struct ImportedEntry {
    id: String,
    book_path: String,
    kind: &'static str,
    media_type: String,
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Init { root } => init(&root),
            Commands::Import {
                root,
                files,
                media_type,
                json,
            } => import(&root, &files, media_type.as_deref(), json),
            Commands::Watch { root, files } => watch(&root, &files).await,
            Commands::Config => show_config(),
        }
    }
}

fn open_keeper(root: &PathBuf) -> Result<Arc<Keeper>> {
    let settings = config::settings()?;
    Keeper::create(root, Arc::new(MediaTypes::new()), &settings.default_version)
        .with_context(|| format!("Failed to materialize package at {}", root.display()))
}

fn init(root: &PathBuf) -> Result<()> {
    let keeper = open_keeper(root)?;
    println!("Package skeleton created at {}", keeper.layout().root_str());
    println!("  manifest: {}", keeper.opf().book_path());
    Ok(())
}

fn import(
    root: &PathBuf,
    files: &[PathBuf],
    media_type: Option<&str>,
    json: bool,
) -> Result<()> {
    let keeper = open_keeper(root)?;

    let mut entries = Vec::new();
    for file in files {
        let resource = keeper
            .add_file(file, true, media_type)
            .with_context(|| format!("Failed to import {}", file.display()))?;
        entries.push(ImportedEntry {
            id: resource.id().to_string(),
            book_path: resource.book_path(),
            kind: resource.kind().as_str(),
            media_type: resource.media_type().to_string(),
        });
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        for entry in &entries {
            println!("{:<12} {}", entry.kind, entry.book_path);
        }
        println!("{} file(s) imported", entries.len());
    }

    Ok(())
}

async fn watch(root: &PathBuf, files: &[PathBuf]) -> Result<()> {
    let keeper = open_keeper(root)?;

    for file in files {
        let resource = keeper
            .add_file(file, true, None)
            .with_context(|| format!("Failed to import {}", file.display()))?;
        keeper.watch_resource(&resource)?;
        println!("watching {}", resource.book_path());
    }

    let handle = keeper
        .spawn_watch_loop()
        .context("Watch loop already running")?;

    info!("Press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    handle.stop().await;

    Ok(())
}

fn show_config() -> Result<()> {
    let settings = config::settings()?;

    println!("Resolved configuration:");
    println!("  default version: {}", settings.default_version);
    match &settings.config_file {
        Some(path) => println!("  config file:     {}", path.display()),
        None => println!("  config file:     (none found, using defaults)"),
    }

    Ok(())
}
