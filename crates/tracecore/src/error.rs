//! Error taxonomy for the trace engine.
//!
//! Only failures that prevent a `trace()` call from producing a result at
//! all are modeled as [`TraceError`] variants. Everything else in the
//! taxonomy described by the design notes (configuration adjustments, budget
//! exhaustion, interpreter recovery, missing helper tools) is not an error —
//! it is recorded in `TraceResult::meta` by the driver.

use thiserror::Error;

/// Failure that aborts a trace run before or during emulation.
#[derive(Error, Debug)]
pub enum TraceError {
    /// The input blob failed validation before any emulator state was built:
    /// too short to be the ELF class it claims, bad endianness, an
    /// unsupported ELF class, or an unsupported machine.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The emulator itself rejected a setup call (failed to map memory,
    /// write a segment, install a hook, or similar) outside of the run loop.
    /// Faults raised *during* stepping are not this variant — they are
    /// surfaced as `meta.error` per the design, with snapshots retained.
    #[error("emulation setup failed: {0}")]
    EmulationError(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TraceError>;
