//! The peripheral base contract every nRF52832 peripheral implements.

use crate::memory::AccessKind;

/// Result of a single register operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpResult {
    /// The offset/size combination was recognized and handled.
    Ok,
    /// Unknown offset, or a size that does not match the addressed
    /// register. The router turns this into a bus fault.
    Unhandled,
}

/// Uniform register-operation contract every peripheral exposes.
///
/// Implementers must, per the silicon's conventions:
/// - on [`AccessKind::Reset`], zero all software-visible state except
///   reset-defined defaults, never fire an event, and leave PPI
///   subscriptions alone (they are owned by the `Ppi`, not the peripheral);
/// - return [`OpResult::Unhandled`] for an unknown offset or a wrong access
///   size for the addressed register.
pub trait Peripheral {
    /// Dispatch a single register access. `value` carries the write payload
    /// in and the read result out.
    fn operation(&mut self, offset: u32, value: &mut u32, kind: AccessKind) -> OpResult;
}

/// Standard `INTENSET`/`INTENCLR` register pair, shared by every peripheral
/// that exposes one. `inten` is the peripheral's own interrupt-enable mask
/// field.
pub fn intenset(inten: &mut u32, value: &mut u32, kind: AccessKind) -> OpResult {
    match kind {
        AccessKind::ReadWord => {
            *value = *inten;
            OpResult::Ok
        }
        AccessKind::WriteWord => {
            *inten |= *value;
            OpResult::Ok
        }
        _ => OpResult::Unhandled,
    }
}

/// See [`intenset`].
pub fn intenclr(inten: &mut u32, value: &mut u32, kind: AccessKind) -> OpResult {
    match kind {
        AccessKind::ReadWord => {
            *value = *inten;
            OpResult::Ok
        }
        AccessKind::WriteWord => {
            *inten &= !*value;
            OpResult::Ok
        }
        _ => OpResult::Unhandled,
    }
}

/// Standard task register: a nonzero write triggers `on_trigger`; reads
/// always return 0.
pub fn task_write(value: &mut u32, kind: AccessKind, mut on_trigger: impl FnMut()) -> OpResult {
    match kind {
        AccessKind::ReadWord => {
            *value = 0;
            OpResult::Ok
        }
        AccessKind::WriteWord => {
            if *value != 0 {
                on_trigger();
            }
            OpResult::Ok
        }
        _ => OpResult::Unhandled,
    }
}

/// Standard event register: reads return 0/1; writing 0 clears, writing 1 to
/// an already-set event is idempotent (no callback either way — setting an
/// event is only ever done by the peripheral itself via the PPI, never by a
/// CPU write).
pub fn event_register(event: &mut bool, value: &mut u32, kind: AccessKind) -> OpResult {
    match kind {
        AccessKind::ReadWord => {
            *value = *event as u32;
            OpResult::Ok
        }
        AccessKind::WriteWord => {
            if *value == 0 {
                *event = false;
            }
            OpResult::Ok
        }
        _ => OpResult::Unhandled,
    }
}



#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Setting an arbitrary mask then clearing an arbitrary mask always
        /// leaves exactly the bits set that aren't also cleared, regardless
        /// of how `INTENSET`/`INTENCLR` are interleaved.
        #[test]
        fn intenset_then_intenclr_round_trips(set_mask: u32, clear_mask: u32) {
            let mut inten = 0u32;
            let mut value = set_mask;
            intenset(&mut inten, &mut value, AccessKind::WriteWord);
            prop_assert_eq!(inten, set_mask);

            let mut value = clear_mask;
            intenclr(&mut inten, &mut value, AccessKind::WriteWord);
            prop_assert_eq!(inten, set_mask & !clear_mask);
        }
    }
}
