mod checksum_queue;
mod config;
mod document;
mod engine;
mod error;
mod filters;
mod local_watcher;
mod logging;
mod merge;
mod metadata_store;
mod prep;
mod remote;
mod workspace;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use config::{ConfigOverrides, EngineConfig};

#[derive(Parser, Debug)]
#[command(name = "twinsync", version)]
struct Cli {
    /// Path to config file
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Sync path override (takes precedence over env/config)
    #[arg(long = "sync-path")]
    sync_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the sync engine in the foreground
    Run,

    /// Print the resolved config file path
    ConfigPath,

    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli {
        config,
        sync_path,
        command,
    } = Cli::parse();
    let resolved_config = EngineConfig::resolve_config_path(config.as_deref());

    match command {
        Some(Commands::ConfigPath) => {
            println!("{}", resolved_config.display());
            Ok(())
        }
        Some(Commands::Version) => {
            println!("{}", detailed_version());
            Ok(())
        }
        Some(Commands::Run) | None => {
            let overrides = ConfigOverrides {
                sync_path,
                ..Default::default()
            };
            let cfg = EngineConfig::load_with_overrides(&resolved_config, overrides)?;
            let log_path = logging::init_default_log_file()?;
            logging::info(format!("log file: {}", log_path.display()));
            engine::run_until_shutdown(&cfg).await
        }
    }
}

fn detailed_version() -> String {
    let version = env!("CARGO_PKG_VERSION");
    let revision = option_env!("TWINSYNC_REVISION").unwrap_or("HEAD");
    format!(
        "{} ({}; rust; {}/{})",
        version,
        revision,
        std::env::consts::OS,
        std::env::consts::ARCH,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_cli_allows_no_subcommand() {
        let cli = Cli::try_parse_from(["twinsync"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn run_cli_accepts_sync_path_override() {
        let cli = Cli::try_parse_from(["twinsync", "--sync-path", "/tmp/x", "run"]).unwrap();
        assert_eq!(cli.sync_path, Some(PathBuf::from("/tmp/x")));
        assert!(matches!(cli.command, Some(Commands::Run)));
    }

    #[test]
    fn config_path_cli_parses() {
        let cli = Cli::try_parse_from(["twinsync", "config-path"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::ConfigPath)));
    }
}
