//! Command handlers.
//!
//! Every handler resolves paths against the working directory, routes the
//! request through the history service and prints a short report.

use anyhow::Context as _;
use chrono::{DateTime, Local};
use clap::Subcommand;
use keepsake_history::{HistoryEntry, HistoryService};
use keepsake_store::ContentStore;
use keepsake_util::path;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Keepsake subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Record the current content of a file
    Add {
        /// File to record
        file: PathBuf,
        /// Why the entry is recorded (defaults to "saved")
        #[arg(short, long)]
        source: Option<String>,
    },
    /// List the history of a file, oldest first
    List {
        /// File whose history to show
        file: PathBuf,
        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the content of a history entry
    Show {
        /// File the entry belongs to
        file: PathBuf,
        /// Entry ID
        id: String,
    },
    /// Delete a history entry
    Remove {
        /// File the entry belongs to
        file: PathBuf,
        /// Entry ID
        id: String,
    },
    /// Change why an entry was recorded
    Relabel {
        /// File the entry belongs to
        file: PathBuf,
        /// Entry ID
        id: String,
        /// New source label
        source: String,
    },
    /// Move or rename a file or folder, carrying its history along
    Mv {
        /// Current path
        from: PathBuf,
        /// New path
        to: PathBuf,
    },
    /// List every file that has history
    Tracked {
        /// Print paths as JSON
        #[arg(long)]
        json: bool,
    },
    /// Overwrite a file with one of its history entries
    Restore {
        /// File to restore
        file: PathBuf,
        /// Entry ID
        id: String,
    },
    /// Delete all history
    Purge {
        /// Skip the safety check
        #[arg(short, long)]
        yes: bool,
    },
}

/// Shared state for command handlers.
pub struct Context {
    pub service: HistoryService,
    pub store: Arc<dyn ContentStore>,
    pub cwd: PathBuf,
    pub cancel: CancellationToken,
}

impl Context {
    fn resolve(&self, file: &Path) -> PathBuf {
        resolve_path(&self.cwd, file)
    }

    async fn find_entry(&self, file: &Path, id: &str) -> anyhow::Result<HistoryEntry> {
        self.service
            .get_entry(file, id, &self.cancel)
            .await
            .with_context(|| format!("No history entry {} for {}", id, file.display()))
    }
}

/// Make `file` absolute against `cwd` and normalize it.
pub fn resolve_path(cwd: &Path, file: &Path) -> PathBuf {
    if file.is_absolute() {
        path::normalize(file)
    } else {
        path::normalize(&cwd.join(file))
    }
}

/// Format epoch milliseconds in local time.
fn format_timestamp(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis)
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| millis.to_string())
}

/// Run a command. Resident history is flushed by the caller afterwards.
pub async fn run(command: Commands, ctx: &Context) -> anyhow::Result<()> {
    match command {
        Commands::Add { file, source } => {
            let file = ctx.resolve(&file);
            match ctx
                .service
                .add_entry(&file, source.as_deref(), None, &ctx.cancel)
                .await?
            {
                Some(entry) => println!("Recorded {} ({})", entry.id, entry.source),
                None => println!("Not tracked: {}", file.display()),
            }
        }
        Commands::List { file, json } => {
            let file = ctx.resolve(&file);
            let entries = ctx.service.get_entries(&file, &ctx.cancel).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if entries.is_empty() {
                println!("No history for {}", file.display());
            } else {
                println!("{:<16} {:<12} {:<20}", "ID", "SOURCE", "RECORDED");
                println!("{}", "-".repeat(50));
                for entry in entries {
                    println!(
                        "{:<16} {:<12} {:<20}",
                        entry.id,
                        entry.source,
                        format_timestamp(entry.timestamp)
                    );
                }
            }
        }
        Commands::Show { file, id } => {
            let file = ctx.resolve(&file);
            let entry = ctx.find_entry(&file, &id).await?;
            let content = ctx.service.read_entry(&entry).await?;
            std::io::stdout().write_all(&content)?;
        }
        Commands::Remove { file, id } => {
            let file = ctx.resolve(&file);
            let entry = ctx.find_entry(&file, &id).await?;
            if ctx.service.remove_entry(&entry, &ctx.cancel).await {
                println!("Removed {}", entry.id);
            } else {
                println!("Entry already gone: {}", entry.id);
            }
        }
        Commands::Relabel { file, id, source } => {
            let file = ctx.resolve(&file);
            let entry = ctx.find_entry(&file, &id).await?;
            ctx.service.update_entry(&entry, &source, &ctx.cancel).await;
            println!("Relabelled {} as {}", entry.id, source);
        }
        Commands::Mv { from, to } => {
            let from = ctx.resolve(&from);
            let to = ctx.resolve(&to);
            let metadata = tokio::fs::metadata(&from)
                .await
                .with_context(|| format!("Cannot move {}", from.display()))?;
            if metadata.is_dir() {
                ctx.store.move_folder(&from, &to, false).await?;
            } else {
                ctx.store.move_file(&from, &to).await?;
            }
            ctx.service.handle_move(&from, &to, &ctx.cancel).await;
            println!("Moved {} -> {}", from.display(), to.display());
        }
        Commands::Tracked { json } => {
            let all = ctx.service.get_all(&ctx.cancel).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&all)?);
            } else if all.is_empty() {
                println!("No files have history.");
            } else {
                for resource in all {
                    println!("{}", resource.display());
                }
            }
        }
        Commands::Restore { file, id } => {
            let file = ctx.resolve(&file);
            let entry = ctx.find_entry(&file, &id).await?;
            if ctx.service.restore_entry(&entry, &ctx.cancel).await? {
                println!("Restored {} from {}", file.display(), entry.id);
            }
        }
        Commands::Purge { yes } => {
            if !yes {
                anyhow::bail!("Refusing to delete all history without --yes");
            }
            ctx.service.remove_all(&ctx.cancel).await;
            println!("All history deleted.");
        }
    }

    Ok(())
}
