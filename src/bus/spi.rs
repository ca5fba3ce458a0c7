//! SPI bus controller: shuttles bytes between a controller peripheral and
//! whichever slave currently has its chip-select asserted.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::pins::{PinId, PinMatrix};

/// A device that can sit on the SPI bus as a slave.
///
/// `write`/`read` are separate bus operations, not a single full-duplex
/// transfer: a controller issues one or the other depending on what the
/// wire protocol at the moment calls for (matches the reference
/// implementation, which never treats SPI as symmetric shift-register
/// duplex at the bus-controller layer).
pub trait SpiSlave {
    /// The controller clocked a byte out to this slave.
    fn write(&mut self, byte: u8);
    /// The controller clocked a byte in from this slave.
    fn read(&mut self) -> u8;
    /// Reset internal state to power-on defaults.
    fn reset(&mut self);
    /// The slave's chip-select line changed. `true` means this slave is now
    /// selected.
    fn cs_changed(&mut self, selected: bool);
}

type SlaveHandle = Rc<RefCell<dyn SpiSlave>>;

struct Entry {
    slave: SlaveHandle,
    asserted: bool,
}

/// A single SPI bus: a flat set of slaves, each wired to its own
/// chip-select pin, with at most one selected at a time.
#[derive(Default)]
pub struct SpiBus {
    slaves: Vec<Entry>,
}

impl SpiBus {
    /// Create an empty bus, already wrapped for sharing with
    /// [`PinMatrix`] chip-select callbacks.
    pub fn new() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::default()))
    }

    /// Register a slave, returning its index for use with [`SpiBus::wire_cs`].
    pub fn add_slave(&mut self, slave: SlaveHandle) -> usize {
        self.slaves.push(Entry { slave, asserted: false });
        self.slaves.len() - 1
    }

    /// Subscribe `cs` so its level drives the given slave's chip-select.
    /// Active low: the slave is selected while the pin reads low.
    pub fn wire_cs(bus: &Rc<RefCell<Self>>, pins: &mut PinMatrix, cs: PinId, slave_index: usize) {
        let bus = bus.clone();
        pins.subscribe(cs, move |_, level| {
            bus.borrow_mut().set_cs(slave_index, !level);
        });
    }

    /// Directly drive a slave's chip-select state, bypassing the pin matrix
    /// (used by tests, and by front ends that model chip-select out of
    /// band).
    pub fn set_cs(&mut self, slave_index: usize, asserted: bool) {
        let entry = &mut self.slaves[slave_index];
        if entry.asserted != asserted {
            entry.asserted = asserted;
            entry.slave.borrow_mut().cs_changed(asserted);
        }
    }

    /// The index of the single asserted slave, or `None` if zero or more
    /// than one are asserted.
    fn selected(&self) -> Option<usize> {
        let mut found = None;
        for (idx, entry) in self.slaves.iter().enumerate() {
            if entry.asserted {
                if found.is_some() {
                    return None;
                }
                found = Some(idx);
            }
        }
        found
    }

    /// Clock a byte out to the selected slave.
    pub fn write(&mut self, byte: u8) -> Result<()> {
        let idx = self.selected().ok_or(Error::NoSlaveSelected)?;
        self.slaves[idx].slave.borrow_mut().write(byte);
        Ok(())
    }

    /// Clock a byte in from the selected slave.
    pub fn read(&mut self) -> Result<u8> {
        let idx = self.selected().ok_or(Error::NoSlaveSelected)?;
        Ok(self.slaves[idx].slave.borrow_mut().read())
    }

    /// Reset every slave and clear chip-select state.
    pub fn reset(&mut self) {
        for entry in &mut self.slaves {
            entry.asserted = false;
            entry.slave.borrow_mut().reset();
        }
    }

    /// Per-cycle hook called from the SoC step loop. Synchronous slaves need
    /// no stepping; this exists for parity with the step-loop contract and
    /// for any slave that models multi-cycle latency in the future.
    pub fn step(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingSlave {
        written: Vec<u8>,
        next_read: u8,
        reset_count: u32,
        select_events: Vec<bool>,
    }

    impl SpiSlave for RecordingSlave {
        fn write(&mut self, byte: u8) {
            self.written.push(byte);
        }

        fn read(&mut self) -> u8 {
            self.next_read
        }

        fn reset(&mut self) {
            self.reset_count += 1;
        }

        fn cs_changed(&mut self, selected: bool) {
            self.select_events.push(selected);
        }
    }

    #[test]
    fn write_and_read_route_to_selected_slave() {
        let bus = SpiBus::new();
        let slave = Rc::new(RefCell::new(RecordingSlave { next_read: 0x42, ..Default::default() }));
        let idx = bus.borrow_mut().add_slave(slave.clone());
        bus.borrow_mut().set_cs(idx, true);

        bus.borrow_mut().write(0x01).unwrap();
        let byte = bus.borrow_mut().read().unwrap();

        assert_eq!(byte, 0x42);
        assert_eq!(slave.borrow().written, vec![0x01]);
    }

    #[test]
    fn no_slave_selected_faults() {
        let bus = SpiBus::new();
        let slave = Rc::new(RefCell::new(RecordingSlave::default()));
        bus.borrow_mut().add_slave(slave);

        assert_eq!(bus.borrow_mut().write(0xAB).unwrap_err(), Error::NoSlaveSelected);
    }

    #[test]
    fn double_selected_slaves_fault() {
        let bus = SpiBus::new();
        let a = Rc::new(RefCell::new(RecordingSlave::default()));
        let b = Rc::new(RefCell::new(RecordingSlave::default()));
        let ia = bus.borrow_mut().add_slave(a);
        let ib = bus.borrow_mut().add_slave(b);
        bus.borrow_mut().set_cs(ia, true);
        bus.borrow_mut().set_cs(ib, true);

        assert_eq!(bus.borrow_mut().read().unwrap_err(), Error::NoSlaveSelected);
    }

    #[test]
    fn cs_pin_wiring_drives_selection() {
        let bus = SpiBus::new();
        let slave = Rc::new(RefCell::new(RecordingSlave { next_read: 0x7, ..Default::default() }));
        let idx = bus.borrow_mut().add_slave(slave.clone());
        let mut pins = PinMatrix::new(1);
        let cs = PinId::new(0, 5);
        SpiBus::wire_cs(&bus, &mut pins, cs, idx);

        pins.set(cs, crate::pins::PinState::OutputLow);
        assert_eq!(bus.borrow_mut().read().unwrap(), 0x7);

        pins.set(cs, crate::pins::PinState::OutputHigh);
        assert_eq!(bus.borrow_mut().read().unwrap_err(), Error::NoSlaveSelected);
        assert_eq!(slave.borrow().select_events, vec![true, false]);
    }

    #[test]
    fn reset_clears_selection_and_resets_slaves() {
        let bus = SpiBus::new();
        let slave = Rc::new(RefCell::new(RecordingSlave::default()));
        let idx = bus.borrow_mut().add_slave(slave.clone());
        bus.borrow_mut().set_cs(idx, true);

        bus.borrow_mut().reset();

        assert_eq!(slave.borrow().reset_count, 1);
        assert_eq!(bus.borrow_mut().write(0).unwrap_err(), Error::NoSlaveSelected);
    }
}
