//! Error taxonomy for the system fabric.
//!
//! See the module docs on [`crate::memory`], [`crate::bus::spi`], and
//! [`crate::flash::spi_nor`] for where each variant is actually raised.

use core::fmt;

use crate::memory::AccessKind;

/// Errors produced by the fabric's public entry points.
///
/// [`Error::BusFault`] is also used internally by [`crate::memory::MemoryRouter`]
/// before [`crate::soc::Soc::step`] translates it into a pended CPU exception; a
/// real front end should rarely see it escape a `step()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Access to an unmapped address, or an access whose size does not match
    /// its address alignment (word: 4-aligned, half: 2-aligned).
    BusFault {
        /// The address that faulted.
        address: u32,
        /// The kind of access that faulted.
        kind: AccessKind,
    },
    /// An SPI transfer was attempted with zero or more than one chip-select
    /// pin asserted low. Not fatal: a well-behaved master treats this as a
    /// stall.
    NoSlaveSelected,
    /// The simulated guest diverged from real hardware behavior in a way
    /// that cannot be recovered from (malformed flash command, command
    /// buffer overflow, address out of range for the operation). Mirrors the
    /// reference implementation's `abort()`.
    ProtocolViolation {
        /// Human-readable description of what went wrong.
        reason: &'static str,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BusFault { address, kind } => {
                write!(f, "bus fault: {kind:?} access to 0x{address:08X}")
            }
            Error::NoSlaveSelected => write!(f, "no slave selected (zero or multiple CS lines asserted)"),
            Error::ProtocolViolation { reason } => write!(f, "protocol violation: {reason}"),
        }
    }
}

impl std::error::Error for Error {}

/// Crate-wide result alias, matching the teacher's `spi::Result<T>` convention.
pub type Result<T> = core::result::Result<T, Error>;
