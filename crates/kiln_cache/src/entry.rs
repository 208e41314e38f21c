//! Sharded on-disk storage for cached program binaries.
//!
//! Each slot is stored at `<cache_dir>/<shard>/<slot>` where `<shard>` is
//! bits 4 through 11 of the slot id as two hex digits and `<slot>` is the
//! full id as eight hex digits. Entry layout, all integers little-endian:
//!
//! ```text
//! [version:u8][stage_count:u8]
//! { [size:i32][stage:i32][hash:u64] } * stage_count
//! [payload_len:i32][payload_format:i32][payload:u8 * payload_len]
//! ```
//!
//! Entries are always read and written whole.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use kiln_common::{ProgramBinary, SlotId, StageFingerprint, StageType};

use crate::error::CacheError;

/// Current entry format version, stored in the first byte of every entry.
pub const ENTRY_FORMAT_VERSION: u8 = 1;

/// Bytes per encoded stage record.
const STAGE_RECORD_LEN: usize = 16;

/// One cached program: the fingerprints it was built from and its binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Fingerprints of the stages the binary was compiled from.
    pub stages: HashSet<StageFingerprint>,
    /// The compiled program binary.
    pub binary: ProgramBinary,
}

impl CacheEntry {
    /// Creates an entry from a fingerprint set and a binary.
    pub fn new(stages: HashSet<StageFingerprint>, binary: ProgramBinary) -> Self {
        Self { stages, binary }
    }

    /// Encodes the entry into its on-disk byte layout.
    pub fn encode(&self) -> Result<Vec<u8>, CacheError> {
        let stage_count = u8::try_from(self.stages.len()).map_err(|_| {
            CacheError::Serialization {
                reason: format!("{} stages exceed the 255 stage limit", self.stages.len()),
            }
        })?;
        let payload_len = i32::try_from(self.binary.len()).map_err(|_| {
            CacheError::Serialization {
                reason: format!("payload of {} bytes is too large", self.binary.len()),
            }
        })?;

        let mut out = Vec::with_capacity(
            2 + self.stages.len() * STAGE_RECORD_LEN + 8 + self.binary.len(),
        );
        out.push(ENTRY_FORMAT_VERSION);
        out.push(stage_count);
        for fp in &self.stages {
            out.extend_from_slice(&fp.size.to_le_bytes());
            out.extend_from_slice(&fp.stage.code().to_le_bytes());
            out.extend_from_slice(&fp.hash.to_le_bytes());
        }
        out.extend_from_slice(&payload_len.to_le_bytes());
        out.extend_from_slice(&self.binary.format.to_le_bytes());
        out.extend_from_slice(&self.binary.bytes);
        Ok(out)
    }

    /// Decodes an entry, rejecting any byte sequence that is not exactly
    /// one well-formed entry.
    pub fn decode(path: &Path, raw: &[u8]) -> Result<Self, CacheError> {
        let corrupt = |reason: &str| CacheError::CorruptEntry {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };
        let mut reader = ByteReader::new(raw);

        let version = reader.u8().ok_or_else(|| corrupt("empty file"))?;
        if version != ENTRY_FORMAT_VERSION {
            return Err(CacheError::VersionMismatch {
                path: path.to_path_buf(),
                expected: u32::from(ENTRY_FORMAT_VERSION),
                actual: u32::from(version),
            });
        }

        let stage_count = reader.u8().ok_or_else(|| corrupt("missing stage count"))?;
        let mut stages = HashSet::with_capacity(usize::from(stage_count));
        for _ in 0..stage_count {
            let size = reader.i32().ok_or_else(|| corrupt("truncated stage record"))?;
            let code = reader.i32().ok_or_else(|| corrupt("truncated stage record"))?;
            let hash = reader.u64().ok_or_else(|| corrupt("truncated stage record"))?;
            let stage = StageType::from_code(code).map_err(|e| corrupt(&e.to_string()))?;
            stages.insert(StageFingerprint::new(stage, hash, size));
        }

        let payload_len = reader.i32().ok_or_else(|| corrupt("missing payload header"))?;
        let format = reader.i32().ok_or_else(|| corrupt("missing payload header"))?;
        let payload_len =
            usize::try_from(payload_len).map_err(|_| corrupt("negative payload length"))?;
        if reader.remaining() != payload_len {
            return Err(corrupt(&format!(
                "declared payload of {payload_len} bytes but {} are present",
                reader.remaining()
            )));
        }
        let bytes = reader.rest().to_vec();

        Ok(Self {
            stages,
            binary: ProgramBinary::new(format, bytes),
        })
    }
}

/// Forward-only little-endian reader over a byte slice.
struct ByteReader<'a> {
    buf: &'a [u8],
}

impl<'a> ByteReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let (head, tail) = self.buf.split_first_chunk::<N>()?;
        self.buf = tail;
        Some(*head)
    }

    fn u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|[b]| b)
    }

    fn i32(&mut self) -> Option<i32> {
        self.take().map(i32::from_le_bytes)
    }

    fn u64(&mut self) -> Option<u64> {
        self.take().map(u64::from_le_bytes)
    }

    fn remaining(&self) -> usize {
        self.buf.len()
    }

    fn rest(self) -> &'a [u8] {
        self.buf
    }
}

/// Slot-addressed store for cache entry files.
#[derive(Debug, Clone)]
pub struct EntryStore {
    /// Root cache directory.
    cache_dir: PathBuf,
}

impl EntryStore {
    /// Creates an entry store rooted at the given cache directory.
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            cache_dir: cache_dir.to_path_buf(),
        }
    }

    /// Returns the root cache directory.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Returns the shard directory holding `id`.
    pub fn shard_dir(&self, id: SlotId) -> PathBuf {
        self.cache_dir.join(id.shard_name())
    }

    /// Returns the entry file path for `id`.
    pub fn entry_path(&self, id: SlotId) -> PathBuf {
        self.shard_dir(id).join(id.file_name())
    }

    /// Reads and decodes the entry for `id`.
    ///
    /// A missing file is [`CacheError::EntryNotFound`]; a malformed one is
    /// [`CacheError::CorruptEntry`] or [`CacheError::VersionMismatch`].
    pub fn read(&self, id: SlotId) -> Result<CacheEntry, CacheError> {
        let path = self.entry_path(id);
        let raw = std::fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CacheError::EntryNotFound { slot: id },
            _ => CacheError::Io {
                path: path.clone(),
                source: e,
            },
        })?;
        CacheEntry::decode(&path, &raw)
    }

    /// Writes the entry for `id`, replacing any previous file.
    pub fn write(&self, id: SlotId, entry: &CacheEntry) -> Result<(), CacheError> {
        let bytes = entry.encode()?;
        let dir = self.shard_dir(id);
        std::fs::create_dir_all(&dir).map_err(|e| CacheError::Io {
            path: dir,
            source: e,
        })?;
        let path = self.entry_path(id);
        std::fs::write(&path, bytes).map_err(|e| CacheError::Io { path, source: e })
    }

    /// Deletes the entry for `id`. Failures are logged and otherwise ignored.
    pub fn delete(&self, id: SlotId) {
        let path = self.entry_path(id);
        if let Err(e) = std::fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("failed to delete cache entry {}: {e}", path.display());
            }
        }
    }

    /// Deletes the whole cache directory.
    pub fn clear(&self) -> Result<(), CacheError> {
        match std::fs::remove_dir_all(&self.cache_dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::Io {
                path: self.cache_dir.clone(),
                source: e,
            }),
        }
    }

    /// Removes entry files whose slot is not in `live`.
    ///
    /// Scans every shard directory and returns the number of files removed.
    /// Files whose names are not slot ids are left alone.
    pub fn gc(&self, live: &HashSet<SlotId>) -> Result<usize, CacheError> {
        if !self.cache_dir.exists() {
            return Ok(0);
        }
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |e: std::io::Error| CacheError::Io { path, source: e }
        };

        let mut removed = 0;
        for shard in std::fs::read_dir(&self.cache_dir).map_err(io_err(&self.cache_dir))? {
            let shard = shard.map_err(io_err(&self.cache_dir))?.path();
            if !shard.is_dir() {
                continue;
            }
            for file in std::fs::read_dir(&shard).map_err(io_err(&shard))? {
                let path = file.map_err(io_err(&shard))?.path();
                let Some(id) = parse_slot_file_name(&path) else {
                    continue;
                };
                if !live.contains(&id) {
                    std::fs::remove_file(&path).map_err(io_err(&path))?;
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}

fn parse_slot_file_name(path: &Path) -> Option<SlotId> {
    let name = path.file_name()?.to_str()?;
    if name.len() != 8 {
        return None;
    }
    u32::from_str_radix(name, 16).ok().map(SlotId::from_raw)
}
