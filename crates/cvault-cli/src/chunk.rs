//! Chunk commands: put, cache, get, delete, retype, list.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use cvault_config::{log_cli_info, log_cli_warn};
use cvault_store::{ChunkName, ChunkType, OutgoingStatus, VaultChunkStore};

use crate::status::format_bytes;

#[derive(Args, Debug)]
pub struct PutArgs {
    /// File to store
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Chunk name as hex (default: digest of the content)
    #[arg(long)]
    name: Option<String>,

    /// Queue the chunk for upload instead of storing it permanently
    #[arg(long)]
    outgoing: bool,
}

#[derive(Args, Debug)]
pub struct CacheArgs {
    /// File to cache
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Chunk name as hex (default: digest of the content)
    #[arg(long)]
    name: Option<String>,
}

#[derive(Args, Debug)]
pub struct GetArgs {
    /// Chunk name (hex)
    name: String,

    /// Write to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct RetypeArgs {
    /// Chunk name (hex)
    pub name: String,

    /// New type, `<hashable|nonhashable>:<normal|cache|outgoing|tempcache>` or a bitmask like `0x12`
    #[arg(value_name = "TYPE")]
    pub chunk_type: ChunkType,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only list chunks of this type
    #[arg(long = "type", value_name = "TYPE")]
    chunk_type: Option<ChunkType>,
}

pub fn run_put(vault: &VaultChunkStore, args: PutArgs) -> Result<()> {
    let content = read_input(&args.file)?;
    let name = name_for(vault, args.name.as_deref(), &content)?;

    if args.outgoing {
        match vault.add_chunk_to_outgoing(name.as_bytes(), &content)? {
            OutgoingStatus::Added => {
                log_cli_info!("Chunk queued", bytes = content.len());
                println!("{}", name);
            }
            OutgoingStatus::AlreadyPresent => {
                println!("{}  (already present)", name);
            }
        }
    } else {
        vault
            .store(name.as_bytes(), &content)
            .with_context(|| format!("Failed to store chunk {}", name))?;
        log_cli_info!("Chunk stored", bytes = content.len());
        println!("{}", name);
    }
    Ok(())
}

pub fn run_cache(vault: &VaultChunkStore, args: CacheArgs) -> Result<()> {
    let content = read_input(&args.file)?;
    let name = name_for(vault, args.name.as_deref(), &content)?;
    vault
        .cache_chunk(name.as_bytes(), &content)
        .with_context(|| format!("Failed to cache chunk {}", name))?;
    println!("{}", name);
    Ok(())
}

pub fn run_get(vault: &VaultChunkStore, args: GetArgs) -> Result<()> {
    let name = parse_name(vault, &args.name)?;
    let content = vault
        .load(name.as_bytes())
        .with_context(|| format!("Failed to load chunk {}", name))?;
    match args.output {
        Some(path) => fs::write(&path, &content)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => io::stdout().lock().write_all(&content)?,
    }
    Ok(())
}

pub fn run_delete(vault: &VaultChunkStore, name: &str) -> Result<()> {
    let name = parse_name(vault, name)?;
    if !vault.has(name.as_bytes()) {
        log_cli_warn!("Chunk not in store, nothing to delete");
    }
    vault.delete_chunk(name.as_bytes())?;
    println!("Deleted {}", name);
    Ok(())
}

pub fn run_retype(vault: &VaultChunkStore, args: RetypeArgs) -> Result<()> {
    let name = parse_name(vault, &args.name)?;
    vault
        .change_chunk_type(name.as_bytes(), args.chunk_type)
        .with_context(|| format!("Failed to move chunk {} to {}", name, args.chunk_type))?;
    println!("{} -> {}", name, args.chunk_type);
    Ok(())
}

pub fn run_list(vault: &VaultChunkStore, args: ListArgs) -> Result<()> {
    for name in vault.chunk_names() {
        let Some(info) = vault.chunk_info(name.as_bytes()) else {
            continue;
        };
        if args.chunk_type.is_some_and(|ty| ty != info.chunk_type) {
            continue;
        }
        println!("{}  {:<24} {}", info.name, info.chunk_type.to_string(), format_bytes(info.size));
    }
    Ok(())
}

/// Decode a hex chunk name and check it against the store's key size.
pub(crate) fn parse_name(vault: &VaultChunkStore, hex: &str) -> Result<ChunkName> {
    let name = ChunkName::from_hex(hex.trim())
        .with_context(|| format!("Invalid chunk name (expected hex): {}", hex))?;
    if name.len() != vault.key_size() {
        bail!(
            "Chunk name is {} bytes, this store uses {}-byte names",
            name.len(),
            vault.key_size()
        );
    }
    Ok(name)
}

fn name_for(vault: &VaultChunkStore, explicit: Option<&str>, content: &[u8]) -> Result<ChunkName> {
    match explicit {
        Some(hex) => parse_name(vault, hex),
        None => Ok(ChunkName::from(vault.hasher().digest(content))),
    }
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}
