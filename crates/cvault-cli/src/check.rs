//! Integrity commands: check, check-all, free-cache, random.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use cvault_config::{log_cli_error, log_cli_info};
use cvault_store::{StoreError, VaultChunkStore};

use crate::chunk::parse_name;
use crate::status::{format_bytes, format_number};

#[derive(Args, Debug)]
pub struct CheckAllArgs {
    /// Delete chunks that fail the hash check
    #[arg(long)]
    pub delete: bool,
}

#[derive(Args, Debug)]
pub struct RandomArgs {
    /// Write the chunk content to this file
    #[arg(short, long)]
    output: Option<PathBuf>,
}

pub fn run_check(vault: &VaultChunkStore, name: &str) -> Result<()> {
    let name = parse_name(vault, name)?;
    match vault.hash_check_chunk(name.as_bytes()) {
        Ok(()) => {
            println!("{}  ok", name);
            Ok(())
        }
        Err(StoreError::HashCheckFailure { .. }) => bail!("Hash check failed for {}", name),
        Err(StoreError::InvalidChunkType) => {
            bail!("{} is not a hashable chunk in this store", name)
        }
        Err(e) => Err(e.into()),
    }
}

pub fn run_check_all(vault: &VaultChunkStore, args: CheckAllArgs) -> Result<()> {
    match vault.hash_check_all_chunks(args.delete) {
        Ok(report) => {
            println!(
                "  ✅ {} chunks ok ({})",
                format_number(report.checked as u64),
                format_bytes(report.bytes_checked)
            );
            if report.adopted > 0 {
                println!("  Adopted {} uncatalogued chunks", format_number(report.adopted as u64));
            }
            Ok(())
        }
        Err(StoreError::HashCheckFailure { names }) => {
            for name in &names {
                println!("  ❌ {}", name);
            }
            log_cli_error!("Hash check failed", failures = names.len(), deleted = args.delete);
            if args.delete {
                bail!("{} chunks failed hash check and were deleted", names.len());
            }
            bail!("{} chunks failed hash check", names.len());
        }
        Err(e) => Err(e.into()),
    }
}

pub fn run_free_cache(vault: &VaultChunkStore, bytes: u64) -> Result<()> {
    match vault.free_cache_space(bytes) {
        Ok(cleared) => {
            log_cli_info!("Cache space freed", requested = bytes, cleared = cleared);
            println!("Cleared {}", format_bytes(cleared));
            Ok(())
        }
        Err(StoreError::NoCacheSpaceToClear) => {
            println!("Cache is empty, nothing to clear");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

pub fn run_random(vault: &VaultChunkStore, args: RandomArgs) -> Result<()> {
    let (name, content) = vault
        .load_random_chunk()
        .context("Failed to sample a chunk")?;
    println!("{}  {}", name, format_bytes(content.len() as u64));
    if let Some(path) = args.output {
        fs::write(&path, &content).with_context(|| format!("Failed to write {}", path.display()))?;
    }
    Ok(())
}
