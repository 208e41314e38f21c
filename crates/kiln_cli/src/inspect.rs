//! Read-only views of a cache directory: `kiln stats` and `kiln list`.

use std::path::Path;

use kiln_cache::{CacheError, CacheIndex, EntryStore};

use crate::GlobalArgs;

/// Reads the index without any of the engine's fallbacks, so a damaged or
/// outdated index is reported instead of silently discarded. A missing
/// index is an empty cache.
pub fn read_index(cache_dir: &Path) -> Result<CacheIndex, CacheError> {
    match CacheIndex::read(cache_dir) {
        Err(CacheError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
            Ok(CacheIndex::new())
        }
        other => other,
    }
}

/// Runs the `kiln stats` command.
pub fn stats(global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let index = read_index(&global.cache_dir)?;
    if !global.quiet {
        eprintln!("   Cache {}", global.cache_dir.display());
    }
    println!("entries:    {}", index.len());
    println!("free slots: {}", index.slots().free_len());
    println!("next slot:  {}", index.slots().next_id());
    Ok(0)
}

/// Runs the `kiln list` command.
pub fn list(global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let index = read_index(&global.cache_dir)?;
    let store = EntryStore::new(&global.cache_dir);

    for (key, id) in index.entries() {
        let rel = format!("{}/{}", id.shard_name(), id.file_name());
        match store.read(id) {
            Ok(entry) => {
                println!(
                    "{key}  slot {id} ({rel})  format {:#x}  {} bytes",
                    entry.binary.format,
                    entry.binary.len()
                );
                let mut stages: Vec<_> = entry.stages.into_iter().collect();
                stages.sort_by_key(|fp| (fp.stage, fp.hash));
                for fp in stages {
                    println!("    {fp}");
                }
            }
            Err(e) => println!("{key}  slot {id} ({rel})  unreadable: {e}"),
        }
    }
    Ok(0)
}
