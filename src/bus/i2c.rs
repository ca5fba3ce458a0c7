//! I2C bus controller: address-based slave selection, byte-at-a-time
//! transfer, ack/nack on every written byte.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{Error, Result};

/// Outcome of asking a slave for its next byte.
///
/// Real I²C clock stretching holds SCL low while the slave isn't ready;
/// this crate doesn't model SCL timing, so a slave signals the same thing
/// by returning [`ReadOutcome::Stretching`] instead of a byte — the
/// controller must retry the read on a later `step()` rather than treat the
/// shortfall as received data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The slave produced a byte.
    Byte(u8),
    /// The slave isn't ready yet; retry this read later.
    Stretching,
}

/// A device that can sit on the I2C bus as a slave.
pub trait I2cSlave {
    /// A START condition addressed this slave. `read` is the transfer
    /// direction requested by the controller.
    fn start(&mut self, read: bool);
    /// The controller clocked a byte out to this slave. Returns whether the
    /// slave acknowledges it.
    fn write(&mut self, byte: u8) -> bool;
    /// The controller clocked a byte in from this slave, or
    /// [`ReadOutcome::Stretching`] if it needs another step before it has one.
    fn read(&mut self) -> ReadOutcome;
    /// A STOP condition ended the transfer.
    fn stop(&mut self);
    /// Reset internal state to power-on defaults.
    fn reset(&mut self);
}

type SlaveHandle = Rc<RefCell<dyn I2cSlave>>;

struct Entry {
    address: u8,
    slave: SlaveHandle,
}

/// A single I2C bus: slaves registered by their 7-bit address, with at most
/// one addressed at a time between a START and the matching STOP.
#[derive(Default)]
pub struct I2cBus {
    slaves: Vec<Entry>,
    selected: Option<usize>,
}

impl I2cBus {
    /// Create an empty bus.
    pub fn new() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::default()))
    }

    /// Register a slave at its fixed 7-bit address.
    pub fn add_slave(&mut self, address: u8, slave: SlaveHandle) {
        self.slaves.push(Entry { address, slave });
    }

    /// Issue a START condition. Returns [`Error::NoSlaveSelected`] if no
    /// registered slave matches `address` — mirrors an unacknowledged
    /// address phase on real hardware, surfaced the same way a chip-select
    /// mismatch is on the SPI bus.
    pub fn start(&mut self, address: u8, read: bool) -> Result<()> {
        let idx = self.slaves.iter().position(|e| e.address == address).ok_or(Error::NoSlaveSelected)?;
        self.slaves[idx].slave.borrow_mut().start(read);
        self.selected = Some(idx);
        Ok(())
    }

    /// Clock a byte out to the addressed slave. Returns the slave's ack bit.
    pub fn write(&mut self, byte: u8) -> Result<bool> {
        let idx = self.selected.ok_or(Error::NoSlaveSelected)?;
        Ok(self.slaves[idx].slave.borrow_mut().write(byte))
    }

    /// Clock a byte in from the addressed slave. A [`ReadOutcome::Stretching`]
    /// result means the transfer is still in progress — the controller must
    /// call `read` again on a later `step()` rather than treat it as a fault.
    pub fn read(&mut self) -> Result<ReadOutcome> {
        let idx = self.selected.ok_or(Error::NoSlaveSelected)?;
        Ok(self.slaves[idx].slave.borrow_mut().read())
    }

    /// Issue a STOP condition, ending the current transfer.
    pub fn stop(&mut self) {
        if let Some(idx) = self.selected.take() {
            self.slaves[idx].slave.borrow_mut().stop();
        }
    }

    /// Reset every slave and clear the current transfer.
    pub fn reset(&mut self) {
        self.selected = None;
        for entry in &mut self.slaves {
            entry.slave.borrow_mut().reset();
        }
    }

    /// Per-cycle hook called from the SoC step loop; synchronous slaves need
    /// no stepping.
    pub fn step(&mut self) {}
}
