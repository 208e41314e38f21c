//! Opaque compiled program binaries.

use std::fmt;

/// A compiled program binary as retrieved from, or handed back to, the
/// graphics API.
///
/// The payload is never inspected by the cache. `format` is the
/// graphics-API binary format tag that must accompany the bytes when the
/// program is reconstructed.
#[derive(Clone, PartialEq, Eq)]
pub struct ProgramBinary {
    /// Graphics-API-defined binary format tag.
    pub format: i32,
    /// Raw binary payload.
    pub bytes: Vec<u8>,
}

impl ProgramBinary {
    /// Creates a binary from a format tag and payload bytes.
    pub fn new(format: i32, bytes: Vec<u8>) -> Self {
        Self { format, bytes }
    }

    /// Returns the payload length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for ProgramBinary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ProgramBinary(format={:#x}, {} bytes)",
            self.format,
            self.bytes.len()
        )
    }
}
