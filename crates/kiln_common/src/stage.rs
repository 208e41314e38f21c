//! Shader stages and their content fingerprints.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A programmable pipeline stage.
///
/// The numeric codes are the graphics-API shader type enumerants, which is
/// also how stages are tagged in cache entry files.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub enum StageType {
    /// Fragment (pixel) shader.
    Fragment,
    /// Vertex shader.
    Vertex,
    /// Geometry shader.
    Geometry,
    /// Tessellation evaluation shader.
    TessEvaluation,
    /// Tessellation control shader.
    TessControl,
    /// Compute shader.
    Compute,
}

/// Error returned when an on-disk stage code is not a known [`StageType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown shader stage code {0:#x}")]
pub struct UnknownStageType(pub i32);

impl StageType {
    /// All stage types, in code order.
    pub const ALL: [StageType; 6] = [
        StageType::Fragment,
        StageType::Vertex,
        StageType::Geometry,
        StageType::TessEvaluation,
        StageType::TessControl,
        StageType::Compute,
    ];

    /// Returns the graphics-API enumerant for this stage.
    pub fn code(self) -> i32 {
        match self {
            StageType::Fragment => 0x8B30,
            StageType::Vertex => 0x8B31,
            StageType::Geometry => 0x8DD9,
            StageType::TessEvaluation => 0x8E87,
            StageType::TessControl => 0x8E88,
            StageType::Compute => 0x91B9,
        }
    }

    /// Converts a graphics-API enumerant back into a stage type.
    pub fn from_code(code: i32) -> Result<Self, UnknownStageType> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.code() == code)
            .ok_or(UnknownStageType(code))
    }
}

impl fmt::Display for StageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageType::Fragment => "fragment",
            StageType::Vertex => "vertex",
            StageType::Geometry => "geometry",
            StageType::TessEvaluation => "tess-evaluation",
            StageType::TessControl => "tess-control",
            StageType::Compute => "compute",
        };
        f.write_str(name)
    }
}

/// Content-derived identity of one shader stage's normalized source.
///
/// Equality and hashing cover all three fields: two stages of the same type
/// and length but with different hashes are distinct. A program is
/// identified by the set of its stages' fingerprints.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct StageFingerprint {
    /// The stage this fingerprint describes.
    pub stage: StageType,
    /// 64-bit hash of the normalized stage source.
    pub hash: u64,
    /// Byte length of the hashed content.
    pub size: i32,
}

impl StageFingerprint {
    /// Creates a fingerprint from its parts.
    pub fn new(stage: StageType, hash: u64, size: i32) -> Self {
        Self { stage, hash, size }
    }
}

impl fmt::Display for StageFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:016x} ({} bytes)", self.stage, self.hash, self.size)
    }
}
