//! Interface to the graphics API that owns program objects.

use kiln_common::ProgramBinary;

/// The graphics-API side of the cache.
///
/// Implemented by the host renderer. All calls happen on the thread that
/// owns the graphics context.
pub trait ProgramBinaryBackend {
    /// Handle of a linked program object.
    type Program;

    /// Whether the platform can retrieve and load program binaries at all.
    ///
    /// Queried at most once per cache; the answer cannot change at runtime.
    fn binary_supported(&mut self) -> bool;

    /// Builds a program object from a stored binary.
    ///
    /// Returns the driver's reason on failure, for example after a driver
    /// update invalidated the binary format. The backend must release any
    /// partially created program before returning an error.
    fn link_binary(&mut self, binary: &ProgramBinary) -> Result<Self::Program, String>;
}
