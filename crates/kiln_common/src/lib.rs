//! Shared value types for the Kiln shader program binary cache.
//!
//! This crate provides the logical shader key used by the host, per-stage
//! content fingerprints, dense slot identifiers for on-disk addressing, and
//! the opaque compiled program binary exchanged with the graphics API.

#![warn(missing_docs)]

pub mod binary;
pub mod key;
pub mod slot;
pub mod stage;

pub use binary::ProgramBinary;
pub use key::{ParseShaderKeyError, ShaderKey};
pub use slot::SlotId;
pub use stage::{StageFingerprint, StageType, UnknownStageType};
