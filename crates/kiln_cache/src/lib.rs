//! Persistent, content-addressed cache of compiled shader program binaries.
//!
//! Programs are keyed by a logical [`ShaderKey`](kiln_common::ShaderKey) and
//! validated against the fingerprints of the stage sources they were built
//! from, so an unchanged program skips compilation and linking on the next
//! run while an edited one is transparently evicted and rebuilt.

#![warn(missing_docs)]

pub mod allocator;
pub mod backend;
pub mod config;
pub mod engine;
pub mod entry;
pub mod error;
pub mod hasher;
pub mod index;

pub use backend::ProgramBinaryBackend;
pub use config::{load_config, load_config_from_str, CacheConfig};
pub use engine::{CacheStats, LoadedProgram, ShaderCache};
pub use entry::{CacheEntry, EntryStore};
pub use error::{CacheError, ConfigError, LoadError};
pub use hasher::{SourceHasher, StageSource};
pub use index::CacheIndex;
