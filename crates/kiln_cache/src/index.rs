//! Persistent mapping from shader keys to entry slots.
//!
//! The index is stored as `entries.json` in the cache directory:
//!
//! ```json
//! { "version": 1, "cache": { "game:opaque": 0 }, "free": [3, 1], "counter": 4 }
//! ```
//!
//! `free` lists released slots with the top of the stack first. The index
//! is only written back when it has been mutated since the last flush.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use kiln_common::{ShaderKey, SlotId};
use serde::{Deserialize, Serialize};

use crate::allocator::SlotAllocator;
use crate::error::CacheError;

/// Name of the index file within the cache directory.
pub const INDEX_FILE: &str = "entries.json";

/// Current index schema version. A persisted index with any other version
/// is discarded together with every entry file.
pub const INDEX_VERSION: u32 = 1;

/// On-disk shape of the index.
#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    version: u32,
    cache: BTreeMap<String, SlotId>,
    #[serde(default)]
    free: Vec<SlotId>,
    counter: SlotId,
}

/// Only the version field, read before committing to the full schema.
#[derive(Deserialize)]
struct VersionHeader {
    #[serde(default)]
    version: u32,
}

/// Mapping from [`ShaderKey`] to [`SlotId`] plus slot allocation state.
///
/// Invariant: no slot is both mapped and on the free list, and every slot
/// in either is below the allocator's next id.
#[derive(Debug, Clone, Default)]
pub struct CacheIndex {
    entries: HashMap<ShaderKey, SlotId>,
    slots: SlotAllocator,
    dirty: bool,
}

impl CacheIndex {
    /// Creates an empty, clean index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the index from `cache_dir`, falling back to an empty index.
    ///
    /// A missing, unparseable, or inconsistent index yields an empty index.
    /// A version mismatch additionally deletes the whole cache directory,
    /// since its entry files can no longer be trusted.
    pub fn load(cache_dir: &Path) -> Self {
        match Self::read(cache_dir) {
            Ok(index) => {
                tracing::debug!(entries = index.len(), "loaded shader cache index");
                index
            }
            Err(CacheError::Io { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                tracing::debug!("no shader cache index, starting empty");
                Self::new()
            }
            Err(err @ CacheError::VersionMismatch { .. }) => {
                tracing::warn!("{err}; discarding shader cache");
                if let Err(e) = std::fs::remove_dir_all(cache_dir) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!("failed to delete {}: {e}", cache_dir.display());
                    }
                }
                Self::new()
            }
            Err(err) => {
                tracing::warn!("{err}; starting with an empty shader cache index");
                Self::new()
            }
        }
    }

    /// Reads and validates the persisted index without any fallback.
    pub fn read(cache_dir: &Path) -> Result<Self, CacheError> {
        let path = cache_dir.join(INDEX_FILE);
        let content = std::fs::read_to_string(&path).map_err(|e| CacheError::Io {
            path: path.clone(),
            source: e,
        })?;

        let header: VersionHeader =
            serde_json::from_str(&content).map_err(|e| CacheError::IndexParse {
                reason: e.to_string(),
            })?;
        if header.version != INDEX_VERSION {
            return Err(CacheError::VersionMismatch {
                path,
                expected: INDEX_VERSION,
                actual: header.version,
            });
        }

        let file: IndexFile =
            serde_json::from_str(&content).map_err(|e| CacheError::IndexParse {
                reason: e.to_string(),
            })?;
        Self::from_file(file)
    }

    fn from_file(file: IndexFile) -> Result<Self, CacheError> {
        let invalid = |reason: String| CacheError::IndexParse { reason };

        let mut seen = HashSet::new();
        let mut entries = HashMap::with_capacity(file.cache.len());
        let mut orphaned = Vec::new();
        for (raw, id) in file.cache {
            if id >= file.counter {
                return Err(invalid(format!("slot {id} for {raw} is beyond counter")));
            }
            if !seen.insert(id) {
                return Err(invalid(format!("slot {id} is mapped twice")));
            }
            match raw.parse::<ShaderKey>() {
                Ok(key) => {
                    entries.insert(key, id);
                }
                Err(e) => {
                    tracing::warn!("{e}; dropping slot {id} from the shader cache index");
                    orphaned.push(id);
                }
            }
        }
        for &id in &file.free {
            if id >= file.counter {
                return Err(invalid(format!("free slot {id} is beyond counter")));
            }
            if !seen.insert(id) {
                return Err(invalid(format!("free slot {id} is also in use")));
            }
        }

        // Unparseable keys can never be looked up; their slots go to the
        // bottom of the free stack and their stale files get overwritten.
        let dirty = !orphaned.is_empty();
        let mut free = file.free;
        free.extend(orphaned);
        Ok(Self {
            entries,
            slots: SlotAllocator::from_parts(free, file.counter),
            dirty,
        })
    }

    fn to_file(&self) -> IndexFile {
        IndexFile {
            version: INDEX_VERSION,
            cache: self
                .entries
                .iter()
                .map(|(key, &id)| (key.to_string(), id))
                .collect(),
            free: self.slots.free_top_first().collect(),
            counter: self.slots.next_id(),
        }
    }

    /// Writes the index to `cache_dir`, creating the directory if needed.
    pub fn save(&self, cache_dir: &Path) -> Result<(), CacheError> {
        std::fs::create_dir_all(cache_dir).map_err(|e| CacheError::Io {
            path: cache_dir.to_path_buf(),
            source: e,
        })?;
        let path = cache_dir.join(INDEX_FILE);
        let json = serde_json::to_string(&self.to_file()).map_err(|e| {
            CacheError::Serialization {
                reason: e.to_string(),
            }
        })?;
        std::fs::write(&path, json).map_err(|e| CacheError::Io { path, source: e })
    }

    /// Writes the index only if it changed since the last flush.
    ///
    /// Returns `true` if a write happened. The dirty flag is cleared only
    /// after a successful write.
    pub fn flush_if_dirty(&mut self, cache_dir: &Path) -> Result<bool, CacheError> {
        if !self.dirty {
            return Ok(false);
        }
        self.save(cache_dir)?;
        self.dirty = false;
        Ok(true)
    }

    /// Flags the index as needing a write at the next flush.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Returns `true` if the index changed since the last flush.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Returns the slot mapped to `key`.
    pub fn lookup(&self, key: &ShaderKey) -> Option<SlotId> {
        self.entries.get(key).copied()
    }

    /// Returns `true` if `key` is mapped.
    pub fn contains(&self, key: &ShaderKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Maps `key` to `id`, replacing any previous mapping.
    pub fn upsert(&mut self, key: ShaderKey, id: SlotId) {
        debug_assert!(!self.slots.is_free(id), "slot {id} is on the free list");
        self.entries.insert(key, id);
        self.dirty = true;
    }

    /// Removes the mapping for `key`, returning its slot for release.
    pub fn remove(&mut self, key: &ShaderKey) -> Option<SlotId> {
        let id = self.entries.remove(key)?;
        self.dirty = true;
        Some(id)
    }

    /// Returns the slot already mapped to `key`, or allocates and maps one.
    ///
    /// The boolean is `true` when the slot was newly assigned. Returns `None`
    /// if a new slot is needed and the id space is exhausted.
    pub fn assign_slot(&mut self, key: &ShaderKey) -> Option<(SlotId, bool)> {
        if let Some(id) = self.lookup(key) {
            return Some((id, false));
        }
        let id = self.slots.allocate()?;
        self.upsert(key.clone(), id);
        Some((id, true))
    }

    /// Returns a slot to the free list. Its entry file must already be gone.
    pub fn release(&mut self, id: SlotId) {
        self.slots.release(id);
        self.dirty = true;
    }

    /// Returns the number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no key is mapped.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the slot allocation state.
    pub fn slots(&self) -> &SlotAllocator {
        &self.slots
    }

    /// Iterates over live entries sorted by slot.
    pub fn entries(&self) -> Vec<(&ShaderKey, SlotId)> {
        let mut out: Vec<_> = self.entries.iter().map(|(k, &id)| (k, id)).collect();
        out.sort_by_key(|&(_, id)| id);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(pass: &str) -> ShaderKey {
        ShaderKey::new("game", pass)
    }

    #[test]
    fn new_index_is_empty_and_clean() {
        let index = CacheIndex::new();
        assert!(index.is_empty());
        assert!(!index.is_dirty());
        assert!(index.slots().is_pristine());
    }

    #[test]
    fn assign_slot_reuses_existing_mapping() {
        let mut index = CacheIndex::new();
        let (a, fresh) = index.assign_slot(&key("opaque")).unwrap();
        assert!(fresh);
        let (again, fresh) = index.assign_slot(&key("opaque")).unwrap();
        assert!(!fresh);
        assert_eq!(a, again);
        assert_eq!(index.len(), 1);
        assert!(index.is_dirty());
    }

    #[test]
    fn removed_slot_is_reused_first() {
        let mut index = CacheIndex::new();
        for pass in ["a", "b", "c", "d"] {
            index.assign_slot(&key(pass));
        }
        let freed = index.remove(&key("d")).unwrap();
        assert_eq!(freed, SlotId::from_raw(3));
        index.release(freed);
        let (reused, _) = index.assign_slot(&key("e")).unwrap();
        assert_eq!(reused, SlotId::from_raw(3));
        assert_eq!(index.slots().next_id(), SlotId::from_raw(4));
    }

    #[test]
    fn remove_missing_key_is_clean() {
        let mut index = CacheIndex::new();
        assert!(index.remove(&key("nothing")).is_none());
        assert!(!index.is_dirty());
    }

    #[test]
    fn save_and_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = CacheIndex::new();
        for pass in ["a", "b", "c"] {
            index.assign_slot(&key(pass));
        }
        let freed = index.remove(&key("a")).unwrap();
        index.release(freed);
        index.save(dir.path()).unwrap();

        let loaded = CacheIndex::read(dir.path()).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.lookup(&key("b")), Some(SlotId::from_raw(1)));
        assert_eq!(loaded.lookup(&key("c")), Some(SlotId::from_raw(2)));
        assert_eq!(loaded.slots(), index.slots());
        assert!(!loaded.is_dirty());
    }

    #[test]
    fn persisted_schema() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = CacheIndex::new();
        index.assign_slot(&key("opaque"));
        index.assign_slot(&key("sky"));
        index.assign_slot(&key("water"));
        index.remove(&key("opaque"));
        index.release(SlotId::from_raw(0));
        index.remove(&key("water"));
        index.release(SlotId::from_raw(2));
        index.save(dir.path()).unwrap();

        let raw = std::fs::read_to_string(dir.path().join(INDEX_FILE)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["version"], 1);
        assert_eq!(value["cache"]["game:sky"], 1);
        assert_eq!(value["free"], serde_json::json!([2, 0]));
        assert_eq!(value["counter"], 3);
    }

    #[test]
    fn load_nonexistent_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CacheIndex::load(dir.path()).is_empty());
    }

    #[test]
    fn load_corrupt_json_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(INDEX_FILE), "not valid json {{{").unwrap();
        assert!(CacheIndex::load(dir.path()).is_empty());
        assert!(dir.path().exists());
    }

    #[test]
    fn version_mismatch_deletes_directory() {
        let root = tempfile::tempdir().unwrap();
        let cache_dir = root.path().join("shadercache");
        std::fs::create_dir_all(cache_dir.join("00")).unwrap();
        std::fs::write(cache_dir.join("00").join("00000000"), b"stale").unwrap();
        std::fs::write(
            cache_dir.join(INDEX_FILE),
            r#"{"version":99,"cache":{"game:opaque":0},"free":[],"counter":1}"#,
        )
        .unwrap();

        assert!(matches!(
            CacheIndex::read(&cache_dir),
            Err(CacheError::VersionMismatch { actual: 99, .. })
        ));
        let index = CacheIndex::load(&cache_dir);
        assert!(index.is_empty());
        assert!(!cache_dir.exists());
    }

    #[test]
    fn unversioned_index_is_a_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(INDEX_FILE),
            r#"{"cache":{"game:opaque":0},"free":[],"counter":1}"#,
        )
        .unwrap();
        assert!(matches!(
            CacheIndex::read(dir.path()),
            Err(CacheError::VersionMismatch { actual: 0, .. })
        ));
    }

    #[test]
    fn overlapping_free_list_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(INDEX_FILE),
            r#"{"version":1,"cache":{"game:opaque":0},"free":[0],"counter":1}"#,
        )
        .unwrap();
        assert!(matches!(
            CacheIndex::read(dir.path()),
            Err(CacheError::IndexParse { .. })
        ));
        assert!(CacheIndex::load(dir.path()).is_empty());
    }

    #[test]
    fn slot_beyond_counter_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(INDEX_FILE),
            r#"{"version":1,"cache":{"game:opaque":5},"free":[],"counter":1}"#,
        )
        .unwrap();
        assert!(CacheIndex::read(dir.path()).is_err());
    }

    #[test]
    fn awkward_keys_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = CacheIndex::new();
        let colon = ShaderKey::new("mod:x", "opaque");
        let empty = ShaderKey::new("game", "");
        index.assign_slot(&key("opaque"));
        index.assign_slot(&colon);
        index.assign_slot(&empty);
        index.save(dir.path()).unwrap();

        let loaded = CacheIndex::read(dir.path()).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.lookup(&key("opaque")), Some(SlotId::from_raw(0)));
        assert_eq!(loaded.lookup(&colon), Some(SlotId::from_raw(1)));
        assert_eq!(loaded.lookup(&empty), Some(SlotId::from_raw(2)));
        assert!(!loaded.contains(&ShaderKey::new("mod", "x:opaque")));
    }

    #[test]
    fn unparseable_key_frees_only_its_slot() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(INDEX_FILE),
            r#"{"version":1,"cache":{"game:opaque":0,"garbage":1},"free":[2],"counter":3}"#,
        )
        .unwrap();

        let mut index = CacheIndex::load(dir.path());
        assert_eq!(index.len(), 1);
        assert_eq!(index.lookup(&key("opaque")), Some(SlotId::from_raw(0)));
        assert!(index.is_dirty());
        let free: Vec<_> = index.slots().free_top_first().collect();
        assert_eq!(free, vec![SlotId::from_raw(2), SlotId::from_raw(1)]);

        let (a, _) = index.assign_slot(&key("sky")).unwrap();
        let (b, _) = index.assign_slot(&key("water")).unwrap();
        assert_eq!((a, b), (SlotId::from_raw(2), SlotId::from_raw(1)));
    }

    #[test]
    fn exhausted_id_space_assigns_nothing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(INDEX_FILE),
            format!(r#"{{"version":1,"cache":{{}},"free":[],"counter":{}}}"#, u32::MAX),
        )
        .unwrap();
        let mut index = CacheIndex::read(dir.path()).unwrap();
        assert!(index.assign_slot(&key("opaque")).is_none());
        assert!(!index.contains(&key("opaque")));
        assert!(!index.is_dirty());
    }

    #[test]
    fn flush_only_when_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = CacheIndex::new();
        assert!(!index.flush_if_dirty(dir.path()).unwrap());
        assert!(!dir.path().join(INDEX_FILE).exists());

        index.assign_slot(&key("opaque"));
        assert!(index.flush_if_dirty(dir.path()).unwrap());
        assert!(!index.is_dirty());
        assert!(dir.path().join(INDEX_FILE).exists());
        assert!(!index.flush_if_dirty(dir.path()).unwrap());
    }

    #[test]
    fn save_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("deeply").join("nested");
        CacheIndex::new().save(&nested).unwrap();
        assert!(nested.join(INDEX_FILE).exists());
    }

    #[test]
    fn entries_sorted_by_slot() {
        let mut index = CacheIndex::new();
        for pass in ["z", "y", "x"] {
            index.assign_slot(&key(pass));
        }
        let slots: Vec<_> = index.entries().into_iter().map(|(_, id)| id.as_raw()).collect();
        assert_eq!(slots, vec![0, 1, 2]);
    }
}
