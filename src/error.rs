//! Error hierarchy.
//!
//! Layered the way the teacher layers register/memory errors into a
//! single execution trap: each leaf error implements
//! [`std::error::Error`] via `thiserror`, and [`Fault`] is the sum type
//! a failed [`crate::executor::Machine::step`] returns, with `From`
//! impls so `?` composes through the decoder, the router, and the
//! branch/jump target check.

use thiserror::Error;

/// Failure decoding the 32-bit word at the program counter.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unrecognized opcode/funct3/funct7 combination in instruction 0x{0:08x}")]
    UnknownEncoding(u32),
}

/// Failure accessing memory: an out-of-range address, a disallowed
/// store, an undefined virtual-routine slot, or a heap access that
/// touches an unallocated bank.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessError {
    #[error("address 0x{0:08x} is outside the addressable range")]
    OutOfRange(u32),
    #[error("address 0x{0:08x} names no defined virtual routine")]
    UndefinedRoutine(u32),
    #[error("store to instruction memory at address 0x{0:08x} is not permitted")]
    StoreToInstructionMemory(u32),
    #[error("heap access at address 0x{0:08x} touches an unallocated bank")]
    UnallocatedBank(u32),
    #[error("free at address 0x{0:08x} does not name an allocated chunk")]
    FreeFailure(u32),
}

/// Failure validating a branch or jump target.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlError {
    #[error("branch/jump target 0x{0:08x} falls outside instruction memory")]
    TargetOutOfRange(u32),
    #[error("branch/jump target 0x{0:08x} is not 4-byte aligned")]
    TargetMisaligned(u32),
}

/// Any of the fault kinds that terminate execution with a diagnostic
/// dump and exit code 1.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    #[error("instruction decode failed: {0}")]
    Decode(#[from] DecodeError),
    #[error("memory access failed: {0}")]
    Access(#[from] AccessError),
    #[error("control flow failed: {0}")]
    Control(#[from] ControlError),
}

impl Fault {
    /// The header line the diagnostic dump must print for this fault,
    /// per the byte-exact format in spec.md's External Interfaces.
    pub fn diagnostic_header(&self, instruction: u32) -> String {
        match self {
            Fault::Decode(DecodeError::UnknownEncoding(_)) => {
                format!("Instruction Not Implemented: 0x{instruction:08x}")
            }
            Fault::Access(_) | Fault::Control(_) => {
                format!("Illegal Operation: 0x{instruction:08x}")
            }
        }
    }
}

impl From<crate::registers::RegisterIndexError> for AccessError {
    fn from(e: crate::registers::RegisterIndexError) -> Self {
        AccessError::OutOfRange(e.0 as u32)
    }
}

/// Failure loading the flat binary image from disk. This never reaches
/// [`crate::executor::Machine`] — the loader reports it and the core
/// never starts, per spec.md's LoadError.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("could not open image file {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("short read of {region}: expected {expected} bytes, got {got}")]
    ShortRead {
        region: &'static str,
        expected: usize,
        got: usize,
    },
}
