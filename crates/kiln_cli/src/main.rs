//! Kiln CLI: offline inspection and maintenance of a shader binary cache.
//!
//! Provides `kiln stats` and `kiln list` for looking at a cache directory,
//! `kiln verify` for checking every entry file, `kiln gc` for removing
//! orphaned entry files, and `kiln clear` for deleting the cache.

#![warn(missing_docs)]

mod inspect;
mod maintain;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use kiln_cache::{load_config, load_config_from_str, CacheConfig};
use tracing_subscriber::EnvFilter;

/// Kiln: persistent shader program binary cache.
#[derive(Parser, Debug)]
#[command(name = "kiln", version, about = "Kiln shader binary cache tool")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Cache root directory; overrides the configuration file.
    #[arg(long, global = true)]
    pub cache_root: Option<PathBuf>,

    /// Path to a `kiln.toml` configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print index statistics.
    Stats,
    /// List every cached program.
    List,
    /// Check that every indexed entry file is readable.
    Verify {
        /// Evict unreadable entries and save the index.
        #[arg(long)]
        evict: bool,
    },
    /// Delete entry files that the index does not reference.
    Gc,
    /// Delete the whole cache directory.
    Clear,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// The cache directory to operate on.
    pub cache_dir: PathBuf,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let config = match resolve_config(cli.cache_root.as_deref(), cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(2);
        }
    };
    let global = GlobalArgs {
        quiet: cli.quiet,
        cache_dir: config.cache_dir(),
    };

    let result = match cli.command {
        Command::Stats => inspect::stats(&global),
        Command::List => inspect::list(&global),
        Command::Verify { evict } => maintain::verify(evict, &global),
        Command::Gc => maintain::gc(&global),
        Command::Clear => maintain::clear(&global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let default = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Picks the cache configuration: `--cache-root` wins, then `--config`,
/// then `kiln.toml` in the current directory.
fn resolve_config(
    cache_root: Option<&Path>,
    config: Option<&Path>,
) -> Result<CacheConfig, Box<dyn std::error::Error>> {
    if let Some(root) = cache_root {
        return Ok(CacheConfig::new(root));
    }
    if let Some(path) = config {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
        return Ok(load_config_from_str(&content)?);
    }
    Ok(load_config(&std::env::current_dir()?)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parse_stats() {
        let cli = Cli::parse_from(["kiln", "stats"]);
        assert!(matches!(cli.command, Command::Stats));
        assert!(cli.cache_root.is_none());
    }

    #[test]
    fn parse_verify_with_evict() {
        let cli = Cli::parse_from(["kiln", "verify", "--evict"]);
        match cli.command {
            Command::Verify { evict } => assert!(evict),
            _ => panic!("expected Verify command"),
        }
    }

    #[test]
    fn parse_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["kiln", "list", "--cache-root", "/tmp/game", "-v"]);
        assert!(matches!(cli.command, Command::List));
        assert_eq!(cli.cache_root, Some(PathBuf::from("/tmp/game")));
        assert!(cli.verbose);
    }

    #[test]
    fn cache_root_overrides_config() {
        let config = resolve_config(
            Some(Path::new("/tmp/game")),
            Some(Path::new("/nonexistent/kiln.toml")),
        )
        .unwrap();
        assert_eq!(config.cache_dir(), PathBuf::from("/tmp/game/shadercache"));
    }

    #[test]
    fn config_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kiln.toml");
        std::fs::write(&path, r#"cache_root = "/var/cache/game""#).unwrap();
        let config = resolve_config(None, Some(&path)).unwrap();
        assert_eq!(config.cache_root, PathBuf::from("/var/cache/game"));
    }

    #[test]
    fn missing_config_file_errors() {
        let result = resolve_config(None, Some(Path::new("/nonexistent/kiln.toml")));
        assert!(result.is_err());
    }
}
