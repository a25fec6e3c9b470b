//! # cvault CLI
//!
//! Operator command-line interface for a Chunkvault vault chunk store.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cvault_config::logging::{init_logging, LogLevel};
use cvault_config::{log_cli_debug, Config};
use cvault_store::VaultChunkStore;

mod check;
mod chunk;
mod status;

/// Chunkvault - content-addressed chunk store for vaults
#[derive(Parser, Debug)]
#[command(name = "cvault")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Chunk store root directory (overrides config)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Space budget in bytes (overrides config)
    #[arg(long, global = true)]
    available_space: Option<u64>,

    /// Read configuration from this file instead of the standard locations
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show store location, chunk counts and space usage
    Status,

    /// Store a file as a permanent chunk (or queue it with --outgoing)
    Put(chunk::PutArgs),

    /// Admit a file into the vault cache
    Cache(chunk::CacheArgs),

    /// Write a chunk's content to a file or stdout
    Get(chunk::GetArgs),

    /// Delete a chunk
    Delete {
        /// Chunk name (hex)
        name: String,
    },

    /// Move a chunk to another type, e.g. `hashable:cache`
    Retype(chunk::RetypeArgs),

    /// List catalogued chunks
    List(chunk::ListArgs),

    /// Hash-check a single chunk
    Check {
        /// Chunk name (hex)
        name: String,
    },

    /// Hash-check every hashable chunk on disk
    CheckAll(check::CheckAllArgs),

    /// Evict cache chunks, least recently checked first
    FreeCache {
        /// Bytes to release
        bytes: u64,
    },

    /// Load a random hashable chunk (integrity challenge)
    Random(check::RandomArgs),

    /// Configuration commands
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,
    /// Print the config file locations
    Path,
    /// Print the default configuration
    Default,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(LogLevel::from_verbosity(cli.verbose));

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Config { command } => run_config(command, &config),
        command => {
            let vault = open_vault(&config)?;
            dispatch(&vault, command, &config)
        }
    }
}

fn dispatch(vault: &VaultChunkStore, command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Status => status::run(vault),
        Commands::Put(args) => chunk::run_put(vault, args),
        Commands::Cache(args) => chunk::run_cache(vault, args),
        Commands::Get(args) => chunk::run_get(vault, args),
        Commands::Delete { name } => chunk::run_delete(vault, &name),
        Commands::Retype(args) => chunk::run_retype(vault, args),
        Commands::List(args) => chunk::run_list(vault, args),
        Commands::Check { name } => check::run_check(vault, &name),
        Commands::CheckAll(args) => check::run_check_all(vault, args),
        Commands::FreeCache { bytes } => check::run_free_cache(vault, bytes),
        Commands::Random(args) => check::run_random(vault, args),
        Commands::Config { command } => run_config(command, config),
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load().context("Failed to load configuration")?,
    };
    if let Some(root) = &cli.root {
        config.store.root = root.clone();
    }
    if let Some(space) = cli.available_space {
        config.vault.available_space = space;
    }
    Ok(config)
}

fn open_vault(config: &Config) -> Result<VaultChunkStore> {
    let root = config.store.resolved_root();
    let vault = VaultChunkStore::new(
        &root,
        config.store.options(),
        config.vault.available_space,
    );
    vault
        .init()
        .with_context(|| format!("Failed to initialise chunk store at {}", root.display()))?;
    log_cli_debug!("Opened vault", chunks = vault.chunk_count());
    Ok(vault)
}

fn run_config(command: ConfigCommands, config: &Config) -> Result<()> {
    match command {
        ConfigCommands::Show => print!("{}", config.to_toml()?),
        ConfigCommands::Default => print!("{}", Config::default_toml()?),
        ConfigCommands::Path => {
            match Config::global_config_path() {
                Some(path) => println!("Global:  {}", path.display()),
                None => println!("Global:  (no home directory)"),
            }
            println!("Project: .cvault/config.toml");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cvault_store::ChunkType;

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "cvault",
            "status",
            "--root",
            "/tmp/store",
            "--available-space",
            "1024",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.root, Some(PathBuf::from("/tmp/store")));
        assert_eq!(cli.available_space, Some(1024));
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Status));
    }

    #[test]
    fn test_parse_retype() {
        let cli = Cli::try_parse_from(["cvault", "retype", "abcd", "nonhashable:cache"]).unwrap();
        match cli.command {
            Commands::Retype(args) => {
                assert_eq!(args.name, "abcd");
                assert_eq!(args.chunk_type, ChunkType::NON_HASHABLE_CACHE);
            }
            other => panic!("unexpected command: {:?}", other),
        }
        assert!(Cli::try_parse_from(["cvault", "retype", "abcd", "signed:normal"]).is_err());
    }

    #[test]
    fn test_parse_check_all_delete() {
        let cli = Cli::try_parse_from(["cvault", "check-all", "--delete"]).unwrap();
        match cli.command {
            Commands::CheckAll(args) => assert!(args.delete),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_required_args() {
        assert!(Cli::try_parse_from(["cvault", "put", "file.bin", "--outgoing"]).is_ok());
        assert!(Cli::try_parse_from(["cvault", "free-cache"]).is_err());
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let cli = Cli::try_parse_from([
            "cvault",
            "--config",
            "/definitely/missing.toml",
            "status",
        ])
        .unwrap();
        assert!(load_config(&cli).is_err());
    }
}
