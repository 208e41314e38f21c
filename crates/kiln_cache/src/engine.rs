//! High-level program binary cache.
//!
//! [`ShaderCache`] ties together the index, the entry store, and the
//! graphics backend. The host calls [`ShaderCache::try_load`] before
//! compiling a program and [`ShaderCache::save`] after compiling one that
//! missed. Every failure degrades to "compile from source".

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use kiln_common::{ProgramBinary, ShaderKey, SlotId, StageFingerprint};

use crate::backend::ProgramBinaryBackend;
use crate::config::CacheConfig;
use crate::entry::{CacheEntry, EntryStore};
use crate::error::LoadError;
use crate::hasher::SourceHasher;
use crate::index::CacheIndex;

/// A program reconstructed from the cache.
#[derive(Debug)]
pub struct LoadedProgram<P> {
    /// The program object built by the backend.
    pub program: P,
    /// The stored binary it was built from.
    pub binary: ProgramBinary,
}

/// Snapshot of index bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of keys with a cached program.
    pub entries: usize,
    /// Released slots awaiting reuse.
    pub free_slots: usize,
    /// Next never-issued slot id.
    pub next_slot: SlotId,
    /// Whether the index has unflushed changes.
    pub dirty: bool,
}

/// Persistent cache of compiled program binaries keyed by [`ShaderKey`].
///
/// Owned by whatever manages the graphics context and used only from that
/// context's thread. The index is loaded lazily on first use and written
/// back by [`flush_index`](Self::flush_index) or on drop.
pub struct ShaderCache<B: ProgramBinaryBackend> {
    /// Directory holding the index file and shard directories.
    cache_dir: PathBuf,

    /// Cleared by configuration to turn the cache off.
    enabled: bool,

    /// Graphics API access.
    backend: B,

    /// Stage fingerprinting for the host's platform.
    hasher: SourceHasher,

    /// Entry file storage.
    store: EntryStore,

    /// `None` until first access.
    index: Option<CacheIndex>,

    /// Memoized backend capability.
    binary_supported: Option<bool>,
}

impl<B: ProgramBinaryBackend> ShaderCache<B> {
    /// Creates a cache for the given configuration. Nothing is read from
    /// disk until the first operation that needs the index.
    pub fn new(config: &CacheConfig, backend: B) -> Self {
        let cache_dir = config.cache_dir();
        Self {
            store: EntryStore::new(&cache_dir),
            cache_dir,
            enabled: config.enabled,
            backend,
            hasher: SourceHasher::from_config(config),
            index: None,
            binary_supported: None,
        }
    }

    /// Returns the cache directory.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Returns the stage hasher configured for this platform.
    pub fn hasher(&self) -> &SourceHasher {
        &self.hasher
    }

    /// Returns the graphics backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns the graphics backend mutably.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    fn index(&mut self) -> &mut CacheIndex {
        let cache_dir = &self.cache_dir;
        self.index.get_or_insert_with(|| CacheIndex::load(cache_dir))
    }

    /// Returns `true` if the index currently maps `key`.
    pub fn has_entry(&mut self, key: &ShaderKey) -> bool {
        self.index().contains(key)
    }

    /// Returns whether program binaries can be cached on this platform.
    pub fn capability_supported(&mut self) -> bool {
        if !self.enabled {
            return false;
        }
        match self.binary_supported {
            Some(supported) => supported,
            None => {
                let supported = self.backend.binary_supported();
                if !supported {
                    tracing::info!("program binaries unsupported, shader cache disabled");
                }
                self.binary_supported = Some(supported);
                supported
            }
        }
    }

    /// Loads the cached program for `key` if it was built from exactly the
    /// given stages.
    ///
    /// Corrupt, stale, and rejected entries are evicted before returning.
    pub fn try_load<I>(
        &mut self,
        key: &ShaderKey,
        stages: I,
    ) -> Result<LoadedProgram<B::Program>, LoadError>
    where
        I: IntoIterator<Item = StageFingerprint>,
    {
        if !self.capability_supported() {
            return Err(LoadError::Unsupported);
        }
        let Some(id) = self.index().lookup(key) else {
            tracing::debug!(%key, "shader cache miss");
            return Err(LoadError::NotFound);
        };

        let entry = match self.store.read(id) {
            Ok(entry) => entry,
            Err(err) => {
                if err.is_corruption() {
                    tracing::warn!(%key, "evicting corrupt cached program: {err}");
                } else {
                    tracing::warn!(%key, "evicting unreadable cached program: {err}");
                }
                self.evict(key);
                return Err(LoadError::Corrupt(err.to_string()));
            }
        };

        let wanted: HashSet<StageFingerprint> = stages.into_iter().collect();
        if entry.stages != wanted {
            tracing::debug!(%key, "shader sources changed, evicting cached program");
            self.evict(key);
            return Err(LoadError::HashMismatch);
        }

        match self.backend.link_binary(&entry.binary) {
            Ok(program) => {
                tracing::info!("loaded cached shader program for render pass {key}");
                Ok(LoadedProgram {
                    program,
                    binary: entry.binary,
                })
            }
            Err(reason) => {
                tracing::warn!(%key, "platform rejected cached program: {reason}");
                self.evict(key);
                Err(LoadError::PlatformRejected(reason))
            }
        }
    }

    /// Stores `binary` as the cached program for `key`.
    ///
    /// Returns `false` without touching disk when binaries are unsupported,
    /// `stages` is empty, or the binary is empty. Write failures and slot
    /// exhaustion are logged and also return `false`; a failed write evicts
    /// the key.
    pub fn save<I>(&mut self, key: &ShaderKey, binary: ProgramBinary, stages: I) -> bool
    where
        I: IntoIterator<Item = StageFingerprint>,
    {
        if !self.capability_supported() {
            return false;
        }
        let stages: HashSet<StageFingerprint> = stages.into_iter().collect();
        if stages.is_empty() || binary.is_empty() {
            return false;
        }

        let entry = CacheEntry::new(stages, binary);
        let Some((id, _)) = self.index().assign_slot(key) else {
            tracing::warn!(%key, "shader cache slot ids exhausted, not caching");
            return false;
        };
        match self.store.write(id, &entry) {
            Ok(()) => {
                self.index().mark_dirty();
                tracing::info!("cached shader program for render pass {key}");
                true
            }
            Err(err) => {
                tracing::warn!(%key, "failed to cache shader program: {err}");
                self.evict(key);
                false
            }
        }
    }

    /// Drops the cached program for `key`, if any.
    pub fn remove(&mut self, key: &ShaderKey) {
        self.evict(key);
    }

    /// Unmaps `key`, deletes its entry file, then frees its slot.
    fn evict(&mut self, key: &ShaderKey) {
        let Some(id) = self.index().remove(key) else {
            return;
        };
        self.store.delete(id);
        self.index().release(id);
    }

    /// Deletes the cache directory and resets the index.
    ///
    /// Does nothing if no slot has ever been allocated.
    pub fn clear_all(&mut self) {
        if self.index().slots().is_pristine() {
            return;
        }
        if let Err(err) = self.store.clear() {
            tracing::warn!("failed to clear shader cache: {err}");
        }
        self.index = Some(CacheIndex::new());
        tracing::info!("cleared shader cache");
    }

    /// Writes the index if it changed. Call at shutdown and whenever the
    /// host reloads its shaders.
    pub fn flush_index(&mut self) {
        let Some(index) = self.index.as_mut() else {
            return;
        };
        match index.flush_if_dirty(&self.cache_dir) {
            Ok(true) => tracing::debug!(entries = index.len(), "flushed shader cache index"),
            Ok(false) => {}
            Err(err) => tracing::warn!("failed to save shader cache index: {err}"),
        }
    }

    /// Returns index bookkeeping counters.
    pub fn stats(&mut self) -> CacheStats {
        let index = self.index();
        CacheStats {
            entries: index.len(),
            free_slots: index.slots().free_len(),
            next_slot: index.slots().next_id(),
            dirty: index.is_dirty(),
        }
    }
}

impl<B: ProgramBinaryBackend> Drop for ShaderCache<B> {
    fn drop(&mut self) {
        self.flush_index();
    }
}
