//! Cache maintenance commands: `kiln verify`, `kiln gc`, `kiln clear`.

use std::collections::HashSet;

use kiln_cache::EntryStore;
use kiln_common::{ShaderKey, SlotId};

use crate::inspect::read_index;
use crate::GlobalArgs;

/// Runs the `kiln verify` command.
///
/// Returns exit code 1 if unreadable entries were found and left in place.
pub fn verify(evict: bool, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let mut index = read_index(&global.cache_dir)?;
    let store = EntryStore::new(&global.cache_dir);

    let entries: Vec<(ShaderKey, SlotId)> = index
        .entries()
        .into_iter()
        .map(|(key, id)| (key.clone(), id))
        .collect();

    let mut bad = Vec::new();
    for (key, id) in entries {
        if let Err(e) = store.read(id) {
            println!("{key}  slot {id}: {e}");
            bad.push((key, id));
        }
    }

    if bad.is_empty() {
        if !global.quiet {
            eprintln!("   All {} entries OK", index.len());
        }
        return Ok(0);
    }
    if !evict {
        eprintln!("   {} unreadable entries (rerun with --evict to drop them)", bad.len());
        return Ok(1);
    }

    for (key, id) in &bad {
        index.remove(key);
        store.delete(*id);
        index.release(*id);
        tracing::debug!(%key, slot = %id, "evicted unreadable entry");
    }
    index.flush_if_dirty(&global.cache_dir)?;
    if !global.quiet {
        eprintln!("   Evicted {} unreadable entries", bad.len());
    }
    Ok(0)
}

/// Runs the `kiln gc` command.
pub fn gc(global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let index = read_index(&global.cache_dir)?;
    let live: HashSet<SlotId> = index.entries().into_iter().map(|(_, id)| id).collect();
    let removed = EntryStore::new(&global.cache_dir).gc(&live)?;
    tracing::debug!(live = live.len(), removed, "collected orphaned entry files");
    if !global.quiet {
        eprintln!("   Removed {removed} orphaned entry files");
    }
    Ok(0)
}

/// Runs the `kiln clear` command.
pub fn clear(global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    EntryStore::new(&global.cache_dir).clear()?;
    if !global.quiet {
        eprintln!("   Cleared {}", global.cache_dir.display());
    }
    Ok(0)
}
