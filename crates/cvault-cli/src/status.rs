//! `cvault status`: store location, per-type counts and space usage.

use anyhow::Result;
use cvault_store::{ChunkType, VaultChunkStore};

pub fn run(vault: &VaultChunkStore) -> Result<()> {
    println!();
    println!("  Chunkvault Status");
    println!("  =================");
    println!("  Root:     {}", vault.root().display());
    println!("  Digest:   {} ({} byte names)", vault.hasher().name(), vault.key_size());
    println!("  Chunks:   {}", format_number(vault.chunk_count() as u64));

    for ty in ChunkType::ALL {
        let count = vault.count_by_type(ty);
        if count > 0 {
            println!("    {:<24} {}", ty.to_string(), format_number(count as u64));
        }
    }

    println!();
    println!("  Available: {}", format_bytes(vault.available_space()));
    println!("  Used:      {}", format_bytes(vault.used_space()));
    println!("  Cache:     {}", format_bytes(vault.space_used_by_cache()));
    println!("  Free:      {}", format_bytes(vault.free_space()));

    if let Some(oldest) = vault.oldest_checked() {
        println!("  Oldest check: {} ({})", oldest.name, oldest.chunk_type);
    }
    println!();
    Ok(())
}

/// Format bytes in human-readable form
pub(crate) fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

/// Format number with comma separators
pub(crate) fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}
