//! CLOCK peripheral: the exemplar concrete [`Peripheral`] showing how a real
//! instance uses the base contract, the PPI back-reference, and the standard
//! register helpers together.

use crate::memory::AccessKind;
use crate::peripheral::{event_register, intenclr, intenset, OpResult, Peripheral};
use crate::ppi::PpiHandle;

/// Peripheral id CLOCK shares with POWER on real silicon: MMIO base
/// `0x40000000 | (0 << 12)`.
pub const INSTANCE_ID: u8 = 0;

const TASKS_HFCLKSTART: u32 = 0x000;
const TASKS_HFCLKSTOP: u32 = 0x004;
const TASKS_LFCLKSTART: u32 = 0x008;
const TASKS_LFCLKSTOP: u32 = 0x00C;
const EVENTS_HFCLKSTARTED: u32 = 0x100;
const EVENTS_LFCLKSTARTED: u32 = 0x104;
const EVENTS_DONE: u32 = 0x10C;
const EVENTS_CTTO: u32 = 0x110;
const INTENSET: u32 = 0x304;
const INTENCLR: u32 = 0x308;
const LFCLKSTAT: u32 = 0x418;
const LFCLKSRC: u32 = 0x518;
const CTIV: u32 = 0x538;
const UNDOCUMENTED_SINK: u32 = 0x53C;
const ERRATA_MAGIC: u32 = 0xEE4;

/// nRF52832 CLOCK peripheral: LFCLK/HFCLK start/stop, their `EVENTS_x`
/// registers, `INTEN`, and the handful of silicon-errata register sinks the
/// reference implementation models as always-zero/always-constant.
pub struct Clock {
    ppi: PpiHandle,
    inten: u32,
    lfclk_source: u8,
    lfclk_running: bool,
    events_hfclkstarted: bool,
    events_lfclkstarted: bool,
}

impl Clock {
    /// Construct a CLOCK wired to the system PPI so it can raise its events.
    pub fn new(ppi: PpiHandle) -> Self {
        Self {
            ppi,
            inten: 0,
            lfclk_source: 0,
            lfclk_running: false,
            events_hfclkstarted: false,
            events_lfclkstarted: false,
        }
    }

    fn start_hfclk(&mut self) {
        self.events_hfclkstarted = true;
        self.ppi.borrow_mut().fire_event(INSTANCE_ID, event_index(EVENTS_HFCLKSTARTED), self.inten);
    }

    fn start_lfclk(&mut self) {
        self.lfclk_running = true;
        self.events_lfclkstarted = true;
        self.ppi.borrow_mut().fire_event(INSTANCE_ID, event_index(EVENTS_LFCLKSTARTED), self.inten);
    }
}

/// Convert a register offset within this peripheral's window into a PPI
/// event index / `INTEN` bit position, matching the reference
/// implementation's `EVENT_ID` macro (`(offset & 0xFF) / 4`) — masking keeps
/// this in the 0-63 range regardless of which 0x100-aligned window the
/// register lives in, so it fits as a shift amount into a `u32` `INTEN` mask.
fn event_index(offset: u32) -> u8 {
    ((offset & 0xFF) / 4) as u8
}

fn sink(value: &mut u32, kind: AccessKind) -> OpResult {
    match kind {
        AccessKind::ReadWord => {
            *value = 0;
            OpResult::Ok
        }
        AccessKind::WriteWord => OpResult::Ok,
        _ => OpResult::Unhandled,
    }
}

impl Peripheral for Clock {
    fn operation(&mut self, offset: u32, value: &mut u32, kind: AccessKind) -> OpResult {
        if kind == AccessKind::Reset {
            self.inten = 0;
            self.lfclk_source = 0;
            self.lfclk_running = false;
            self.events_hfclkstarted = false;
            self.events_lfclkstarted = false;
            return OpResult::Ok;
        }

        match offset {
            TASKS_HFCLKSTART => {
                let triggered = *value != 0 && kind == AccessKind::WriteWord;
                let result = crate::peripheral::task_write(value, kind, || {});
                if triggered {
                    self.start_hfclk();
                }
                result
            }
            TASKS_HFCLKSTOP => crate::peripheral::task_write(value, kind, || {}),
            TASKS_LFCLKSTART => {
                let triggered = *value != 0 && kind == AccessKind::WriteWord;
                let result = crate::peripheral::task_write(value, kind, || {});
                if triggered {
                    self.start_lfclk();
                }
                result
            }
            TASKS_LFCLKSTOP => {
                let running_before = self.lfclk_running;
                let result = crate::peripheral::task_write(value, kind, || {});
                if running_before && kind == AccessKind::WriteWord && *value != 0 {
                    self.lfclk_running = false;
                }
                result
            }
            EVENTS_HFCLKSTARTED => event_register(&mut self.events_hfclkstarted, value, kind),
            EVENTS_LFCLKSTARTED => event_register(&mut self.events_lfclkstarted, value, kind),
            EVENTS_DONE | EVENTS_CTTO | CTIV | UNDOCUMENTED_SINK => sink(value, kind),
            INTENSET => intenset(&mut self.inten, value, kind),
            INTENCLR => intenclr(&mut self.inten, value, kind),
            LFCLKSTAT => match kind {
                AccessKind::ReadWord => {
                    *value = u32::from(self.lfclk_source & 0b11) | (u32::from(self.lfclk_running) << 16);
                    OpResult::Ok
                }
                _ => OpResult::Unhandled,
            },
            LFCLKSRC => match kind {
                AccessKind::ReadWord => {
                    *value = u32::from(self.lfclk_source);
                    OpResult::Ok
                }
                AccessKind::WriteWord => {
                    self.lfclk_source = (*value & 0b11) as u8;
                    OpResult::Ok
                }
                _ => OpResult::Unhandled,
            },
            ERRATA_MAGIC => match kind {
                AccessKind::ReadWord => {
                    *value = 0x4F;
                    OpResult::Ok
                }
                _ => OpResult::Unhandled,
            },
            _ => OpResult::Unhandled,
        }
    }
}
