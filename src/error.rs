// src/error.rs
//! Unified error type for the ZENEDGE core.
//!
//! Every fallible operation in this crate returns `Result<T, Error>`. There
//! are no exceptions and no panics outside test code; callers that hit an
//! error either retry, escalate through the contract state machine, or
//! treat the affected region as foreign and move on (see `spec.md` §7).

use core::fmt;

/// Discriminated error kinds shared across every subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A ring, heap, blob table, or span table had no room left.
    CapacityExhausted(Capacity),
    /// A caller-supplied id, shape, or magic word did not validate.
    Invalid(Invalid),
    /// A CPU or memory budget was exceeded (state machine already advanced).
    BudgetExceeded(Budget),
    /// The operation was refused because the contract is in `SAFE_MODE`.
    Denied,
    /// A poll deadline elapsed with no matching response.
    Timeout,
    /// The peer returned a non-OK response status.
    PeerError(u16),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::CapacityExhausted(c) => write!(f, "capacity exhausted: {c}"),
            Error::Invalid(i) => write!(f, "invalid: {i}"),
            Error::BudgetExceeded(b) => write!(f, "budget exceeded: {b}"),
            Error::Denied => write!(f, "denied: contract in SAFE_MODE"),
            Error::Timeout => write!(f, "poll deadline elapsed"),
            Error::PeerError(status) => write!(f, "peer returned status 0x{status:04x}"),
        }
    }
}

/// Which bounded resource ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacity {
    /// The command or response ring has no free slot.
    RingFull,
    /// The shared heap has no contiguous free run of the requested length.
    HeapFull,
    /// The blob table (cache of id -> offset) is full.
    BlobTable,
    /// The flight recorder's active-span table is full.
    SpanTable,
    /// A job's step or tensor array is already at its fixed capacity.
    JobGraph,
    /// The contract registry has no free slot for a new job id.
    ContractRegistry,
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Capacity::RingFull => "ring full",
            Capacity::HeapFull => "heap full",
            Capacity::BlobTable => "blob table full",
            Capacity::SpanTable => "span table full",
            Capacity::JobGraph => "job graph array full",
            Capacity::ContractRegistry => "contract registry full",
        };
        f.write_str(s)
    }
}

/// Why a value failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invalid {
    /// Blob id was 0 (reserved) or not found.
    UnknownBlobId,
    /// A region's magic word did not match the expected constant.
    MagicMismatch,
    /// Tensor `ndim` was outside `[1, 4]`.
    TensorRank,
    /// Declared tensor shape does not fit the enclosing blob's size.
    TensorShape,
    /// The ring or heap was asked to store more than it can address.
    SizeOutOfBounds,
    /// A step or tensor id was not found in the job graph.
    UnknownGraphId,
    /// `trace_buffer_size` was not a power of two.
    NotPowerOfTwo,
}

impl fmt::Display for Invalid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Invalid::UnknownBlobId => "unknown or reserved blob id",
            Invalid::MagicMismatch => "magic word mismatch",
            Invalid::TensorRank => "tensor rank out of range",
            Invalid::TensorShape => "tensor shape does not fit blob",
            Invalid::SizeOutOfBounds => "size out of bounds",
            Invalid::UnknownGraphId => "unknown step or tensor id",
            Invalid::NotPowerOfTwo => "value must be a power of two",
        };
        f.write_str(s)
    }
}

/// Which budget a contract exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Budget {
    /// CPU time budget exceeded.
    Cpu,
    /// Memory budget exceeded.
    Memory,
}

impl fmt::Display for Budget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Budget::Cpu => "cpu",
            Budget::Memory => "memory",
        };
        f.write_str(s)
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_non_empty() {
        let errs = [
            Error::CapacityExhausted(Capacity::RingFull),
            Error::Invalid(Invalid::UnknownBlobId),
            Error::BudgetExceeded(Budget::Cpu),
            Error::Denied,
            Error::Timeout,
            Error::PeerError(0x8001),
        ];
        for e in errs {
            let s = alloc::format!("{e}");
            assert!(!s.is_empty());
        }
    }
}
