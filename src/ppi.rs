//! The Programmable Peripheral Interconnect: the event/task crossbar that
//! lets one peripheral trigger another without CPU involvement, and the
//! mechanism by which peripheral events raise CPU exceptions.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::cpu::Cpu;
use crate::memory::{AccessKind, PeripheralHandle};
use crate::peripheral::{OpResult, Peripheral};

/// Non-owning back-reference to the PPI, handed to every peripheral at
/// construction instead of the reference implementation's thread-local
/// `current_ppi`. Sound because the `Soc` that owns both the `Ppi` and every
/// peripheral never lets one outlive the other.
pub type PpiHandle = Rc<RefCell<Ppi>>;

/// PPI's own peripheral instance id on real silicon: MMIO base
/// `0x40000000 | (0x1F << 12)`.
pub const INSTANCE_ID: u8 = 0x1F;

const PROGRAMMABLE_CHANNELS: usize = 20;
const PREPROGRAMMED_CHANNELS: usize = 12;
const TOTAL_CHANNELS: usize = PROGRAMMABLE_CHANNELS + PREPROGRAMMED_CHANNELS;
const GROUPS: usize = 6;

#[derive(Debug, Clone, Copy, Default)]
struct Channel {
    enabled: bool,
    /// Full MMIO address of the bound `EVENTS_x` register, or 0 if unset.
    event_addr: u32,
    /// Full MMIO address of the bound `TASKS_x` register, or 0 if unset.
    task_addr: u32,
}

#[derive(Debug, Clone, Copy, Default)]
struct Group {
    /// Bitmask (low 20 bits) of programmable channels that are members of
    /// this fork group.
    members: u32,
}

/// Decode a peripheral id and register index out of a full MMIO address,
/// per the `0x40000000 | (id << 12)` base-address convention (spec §3). The
/// index only looks at the low byte of the in-peripheral offset, matching
/// the reference implementation's `EVENT_ID`/`TASK_ID` macros
/// (`((offset) & 0xFF) / 4`) — every real `TASKS_x`/`EVENTS_x` register lives
/// well within a peripheral's first 256 bytes, so this is exact for any
/// register a channel can actually be wired to, and keeps the index small
/// enough to use as an `INTEN` bit position.
fn decode_endpoint(addr: u32) -> Option<(u8, u8)> {
    if addr == 0 {
        return None;
    }
    let peripheral = ((addr >> 12) & 0xFF) as u8;
    let index = ((addr & 0xFF) / 4) as u8;
    Some((peripheral, index))
}

/// The event/task crossbar. Owns the registry of peripherals that can
/// receive dispatched tasks, the sparse set of raised events, and the
/// channel/group programming state.
pub struct Ppi {
    peripherals: HashMap<u8, PeripheralHandle>,
    event_set: HashMap<(u8, u8), bool>,
    channels: [Channel; TOTAL_CHANNELS],
    groups: [Group; GROUPS],
    cpu: Rc<RefCell<dyn Cpu>>,
}

impl Ppi {
    /// Create a PPI wired to the CPU it pends exceptions on.
    pub fn new(cpu: Rc<RefCell<dyn Cpu>>) -> PpiHandle {
        Rc::new(RefCell::new(Self {
            peripherals: HashMap::new(),
            event_set: HashMap::new(),
            channels: [Channel::default(); TOTAL_CHANNELS],
            groups: [Group::default(); GROUPS],
            cpu,
        }))
    }

    /// Register a peripheral so it can receive dispatched tasks and have its
    /// `INTEN` mask consulted when one of its events fires.
    pub fn add_peripheral(&mut self, id: u8, handle: PeripheralHandle) {
        self.peripherals.insert(id, handle);
    }

    /// Unregister a peripheral.
    pub fn remove_peripheral(&mut self, id: u8) {
        self.peripherals.remove(&id);
    }

    /// Software task-fire path: a peripheral's own task-register write calls
    /// this to trigger another (or its own) peripheral's task handler.
    /// Equivalent, by construction, to writing a nonzero value to that
    /// peripheral's task register at `task_index * 4`.
    pub fn fire_task(&mut self, peripheral_id: u8, task_index: u8) {
        let Some(handle) = self.peripherals.get(&peripheral_id).cloned() else {
            log::warn!("ppi: fire_task for unregistered peripheral {peripheral_id}");
            return;
        };
        let mut value = 1u32;
        let offset = u32::from(task_index) * 4;
        let _ = handle.borrow_mut().operation(offset, &mut value, AccessKind::WriteWord);
    }

    /// A peripheral calls this to raise one of its own events.
    ///
    /// 1. Marks the event set.
    /// 2. Dispatches the task bound to every enabled channel whose event
    ///    endpoint matches, in ascending channel index order (observable,
    ///    must be preserved).
    /// 3. Expands fork groups: for every group a just-fired channel belongs
    ///    to, the group's other member channels fire too.
    /// 4. If the event's bit is set in `inten` (the firing peripheral's own
    ///    `INTEN` mask, passed by the caller rather than read back through
    ///    the peripheral registry — the peripheral that is raising this
    ///    event is, by construction, already mutably borrowed by its own
    ///    `operation()` call, so re-entering it here would panic), pends
    ///    that peripheral's external interrupt.
    pub fn fire_event(&mut self, peripheral_id: u8, event_index: u8, inten: u32) {
        self.event_set.insert((peripheral_id, event_index), true);
        log::trace!("ppi: event ({peripheral_id}, {event_index}) set");

        let mut fired_channels = Vec::new();
        for idx in 0..TOTAL_CHANNELS {
            let channel = self.channels[idx];
            if !channel.enabled {
                continue;
            }
            if decode_endpoint(channel.event_addr) == Some((peripheral_id, event_index)) {
                if let Some((task_peripheral, task_index)) = decode_endpoint(channel.task_addr) {
                    self.fire_task(task_peripheral, task_index);
                }
                fired_channels.push(idx);
            }
        }

        for idx in fired_channels {
            if idx >= PROGRAMMABLE_CHANNELS {
                continue;
            }
            for group in self.groups {
                if group.members & (1 << idx) == 0 {
                    continue;
                }
                for member in 0..PROGRAMMABLE_CHANNELS {
                    if member == idx || group.members & (1 << member) == 0 {
                        continue;
                    }
                    if let Some((task_peripheral, task_index)) = decode_endpoint(self.channels[member].task_addr) {
                        self.fire_task(task_peripheral, task_index);
                    }
                }
            }
        }

        if inten & (1 << event_index) != 0 {
            self.cpu.borrow_mut().pend_exception(u16::from(peripheral_id));
        }
    }

    /// Zero an event's bit. Does not cancel any already-dispatched task —
    /// there is none to cancel, since dispatch is synchronous.
    pub fn clear_event(&mut self, peripheral_id: u8, event_index: u8) {
        self.event_set.insert((peripheral_id, event_index), false);
    }

    /// Whether an event's bit is currently set.
    pub fn event_is_set(&self, peripheral_id: u8, event_index: u8) -> bool {
        self.event_set.get(&(peripheral_id, event_index)).copied().unwrap_or(false)
    }

    fn chen_mask(&self) -> u32 {
        let mut mask = 0u32;
        for (idx, channel) in self.channels.iter().enumerate() {
            if channel.enabled {
                mask |= 1 << idx;
            }
        }
        mask
    }

    fn set_chen_mask(&mut self, mask: u32) {
        for (idx, channel) in self.channels.iter_mut().enumerate() {
            channel.enabled = mask & (1 << idx) != 0;
        }
    }
}

impl Peripheral for Ppi {
    fn operation(&mut self, offset: u32, value: &mut u32, kind: AccessKind) -> OpResult {
        if kind == AccessKind::Reset {
            self.channels = [Channel::default(); TOTAL_CHANNELS];
            self.groups = [Group::default(); GROUPS];
            self.event_set.clear();
            return OpResult::Ok;
        }

        match offset {
            0x500 => match kind {
                AccessKind::ReadWord => {
                    *value = self.chen_mask();
                    OpResult::Ok
                }
                AccessKind::WriteWord => {
                    self.set_chen_mask(*value);
                    OpResult::Ok
                }
                _ => OpResult::Unhandled,
            },
            0x504 => match kind {
                AccessKind::ReadWord => {
                    *value = self.chen_mask();
                    OpResult::Ok
                }
                AccessKind::WriteWord => {
                    self.set_chen_mask(self.chen_mask() | *value);
                    OpResult::Ok
                }
                _ => OpResult::Unhandled,
            },
            0x508 => match kind {
                AccessKind::ReadWord => {
                    *value = self.chen_mask();
                    OpResult::Ok
                }
                AccessKind::WriteWord => {
                    self.set_chen_mask(self.chen_mask() & !*value);
                    OpResult::Ok
                }
                _ => OpResult::Unhandled,
            },
            _ if (0x510..0x510 + 8 * PROGRAMMABLE_CHANNELS as u32).contains(&offset) => {
                let rel = offset - 0x510;
                let n = (rel / 8) as usize;
                let is_task = rel % 8 == 4;
                if kind != AccessKind::ReadWord && kind != AccessKind::WriteWord {
                    return OpResult::Unhandled;
                }
                let field = if is_task {
                    &mut self.channels[n].task_addr
                } else {
                    &mut self.channels[n].event_addr
                };
                if kind == AccessKind::ReadWord {
                    *value = *field;
                } else {
                    *field = *value;
                }
                OpResult::Ok
            }
            _ if (0x800..0x800 + 4 * GROUPS as u32).contains(&offset) => {
                let g = ((offset - 0x800) / 4) as usize;
                match kind {
                    AccessKind::ReadWord => {
                        *value = self.groups[g].members;
                        OpResult::Ok
                    }
                    AccessKind::WriteWord => {
                        self.groups[g].members = *value & ((1 << PROGRAMMABLE_CHANNELS) - 1);
                        OpResult::Ok
                    }
                    _ => OpResult::Unhandled,
                }
            }
            _ => OpResult::Unhandled,
        }
    }
}
