//! Keepsake - local per-file revision history.
//!
//! This is the main entry point for the keepsake CLI.

mod commands;

use clap::Parser;
use commands::{Commands, Context};
use keepsake_history::{HistoryConfig, HistoryService};
use keepsake_store::{ContentStore, LocalStore};
use keepsake_util::log::{self, LogConfig, LogLevel};
use keepsake_util::path;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Parser)]
#[command(name = "keepsake")]
#[command(author, version, about = "Local per-file revision history", long_about = None)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log level for the log file (trace, debug, info, warn, error)
    #[arg(long, global = true, value_parser = parse_log_level)]
    log_level: Option<LogLevel>,

    /// Project directory to read keepsake.json from
    #[arg(long, global = true)]
    project: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_level);

    let cwd = std::env::current_dir()?;
    let project = match &cli.project {
        Some(dir) => Some(commands::resolve_path(&cwd, dir)),
        None => path::find_project_root(&cwd),
    };

    let (config, sources) = HistoryConfig::load(project.as_deref()).await?;
    for source in &sources {
        debug!(path = %source.display(), "Loaded config");
    }

    let store: Arc<dyn ContentStore> = Arc::new(LocalStore::new());
    let Some(service) = HistoryService::from_config(Arc::clone(&store), config) else {
        anyhow::bail!("No history directory available. Set \"localRoot\" in keepsake.json");
    };

    let ctx = Context {
        service,
        store,
        cwd,
        cancel: CancellationToken::new(),
    };

    let result = commands::run(cli.command, &ctx).await;
    ctx.service.store_all(&ctx.cancel).await;
    result
}

/// Initialize logging based on verbosity.
///
/// Verbose runs log to stderr; otherwise logs go to the standard log file.
fn init_logging(verbose: bool, level: Option<LogLevel>) {
    let config = if verbose {
        LogConfig {
            print: true,
            level: level.unwrap_or(LogLevel::Debug),
            ..Default::default()
        }
    } else {
        LogConfig {
            file: log::default_log_path(),
            level: level.unwrap_or_default(),
            ..Default::default()
        }
    };

    if let Err(e) = log::init(config) {
        eprintln!("Warning: Could not initialize logging: {}", e);
    }
}

fn parse_log_level(s: &str) -> Result<LogLevel, String> {
    LogLevel::parse(s).ok_or_else(|| format!("unknown log level: {}", s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["keepsake", "list", "notes.md", "--verbose"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::List { .. }));
    }

    #[test]
    fn test_parse_project_dir() {
        let cli = Cli::try_parse_from(["keepsake", "--project", "/w", "tracked"]).unwrap();
        assert_eq!(cli.project, Some(PathBuf::from("/w")));
    }

    #[test]
    fn test_parse_log_level() {
        let cli = Cli::try_parse_from(["keepsake", "tracked", "--log-level", "WARN"]).unwrap();
        assert_eq!(cli.log_level, Some(LogLevel::Warn));
        assert!(Cli::try_parse_from(["keepsake", "tracked", "--log-level", "loud"]).is_err());
    }

    #[test]
    fn test_subcommand_is_required() {
        assert!(Cli::try_parse_from(["keepsake"]).is_err());
    }
}
