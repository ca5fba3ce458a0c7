//! Memory region router: dispatches word/half/byte accesses to flash, SRAM,
//! and memory-mapped peripheral registers.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::peripheral::{OpResult, Peripheral};

/// The kind of access being performed, mirroring the register-operation
/// shape every [`Peripheral`] implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    /// 1-byte read.
    ReadByte,
    /// 2-byte read, must be 2-aligned.
    ReadHalf,
    /// 4-byte read, must be 4-aligned.
    ReadWord,
    /// 1-byte write.
    WriteByte,
    /// 2-byte write, must be 2-aligned.
    WriteHalf,
    /// 4-byte write, must be 4-aligned.
    WriteWord,
    /// Not a real bus access: resets operation-backed peripherals to their
    /// defined state. Never routed to a backed (flash/SRAM) region.
    Reset,
}

impl AccessKind {
    /// Size in bytes, or `0` for [`AccessKind::Reset`].
    pub fn size(self) -> u32 {
        match self {
            AccessKind::ReadByte | AccessKind::WriteByte => 1,
            AccessKind::ReadHalf | AccessKind::WriteHalf => 2,
            AccessKind::ReadWord | AccessKind::WriteWord => 4,
            AccessKind::Reset => 0,
        }
    }

    /// Whether this is a write (or the pseudo-access `Reset`, which is
    /// dispatched like a write with no payload).
    pub fn is_write(self) -> bool {
        matches!(
            self,
            AccessKind::WriteByte | AccessKind::WriteHalf | AccessKind::WriteWord | AccessKind::Reset
        )
    }
}

/// A shared, mutably-aliased byte buffer — used for SRAM, which both the CPU
/// (through the router) and the SPI/I2C buses (through DMA) touch directly.
pub type SharedBuffer = Rc<RefCell<Vec<u8>>>;

/// Shared handle to a register-operation peripheral, so the same object can
/// be registered with both the router and the [`crate::ppi::Ppi`] task
/// dispatcher.
pub type PeripheralHandle = Rc<RefCell<dyn Peripheral>>;

enum Backing {
    Backed { buffer: SharedBuffer, writable: bool },
    Operation(PeripheralHandle),
}

struct Region {
    base: u32,
    len: u32,
    backing: Backing,
}

impl Region {
    fn contains(&self, address: u32) -> bool {
        address >= self.base && address < self.base.wrapping_add(self.len)
    }
}

/// Dispatches CPU memory accesses to the region that owns the address.
///
/// Regions are linearly scanned in insertion order — acceptable for the
/// handful (well under 40) of regions a single nRF52832 map has; see the
/// design notes for why this stays a `Vec` rather than a hash map (range
/// queries are required) or an intrusive linked list (needless `unsafe` in
/// Rust for no benefit over a `Vec`).
#[derive(Default)]
pub struct MemoryRouter {
    regions: Vec<Region>,
}

impl MemoryRouter {
    /// Create an empty router.
    pub fn new() -> Self {
        Self { regions: Vec::new() }
    }

    /// Map a backed (flash/SRAM-like) region at `base` covering `buffer`'s
    /// length.
    ///
    /// # Panics
    /// Panics if the new region overlaps an already-mapped region: region
    /// overlap can only be introduced by the emulator's own construction
    /// code, never by guest behavior, so it is a programmer error rather
    /// than a runtime fault.
    pub fn map_backed(&mut self, base: u32, buffer: SharedBuffer, writable: bool) {
        let len = buffer.borrow().len() as u32;
        self.insert(base, len, Backing::Backed { buffer, writable });
    }

    /// Map an operation-backed (peripheral register) region of `len` bytes
    /// at `base`. See [`MemoryRouter::map_backed`] for the overlap panic.
    pub fn map_operation(&mut self, base: u32, len: u32, peripheral: PeripheralHandle) {
        self.insert(base, len, Backing::Operation(peripheral));
    }

    fn insert(&mut self, base: u32, len: u32, backing: Backing) {
        let end = base.wrapping_add(len);
        for region in &self.regions {
            let region_end = region.base.wrapping_add(region.len);
            if base < region_end && region.base < end {
                panic!("memory region 0x{base:08X}..0x{end:08X} overlaps existing region 0x{:08X}..0x{:08X}", region.base, region_end);
            }
        }
        self.regions.push(Region { base, len, backing });
    }

    fn find_mut(&mut self, address: u32) -> Option<&mut Region> {
        self.regions.iter_mut().find(|r| r.contains(address))
    }

    /// Perform a single access. `value` carries the write payload in and the
    /// read result out (for writes, the returned value is unspecified and
    /// should be ignored).
    pub fn access(&mut self, address: u32, kind: AccessKind, value: &mut u32) -> Result<()> {
        let size = kind.size();
        if size > 1 && address % size != 0 {
            return Err(Error::BusFault { address, kind });
        }

        let Some(region) = self.find_mut(address) else {
            return Err(Error::BusFault { address, kind });
        };

        match &mut region.backing {
            Backing::Backed { buffer, writable } => {
                if kind.is_write() && !*writable {
                    return Err(Error::BusFault { address, kind });
                }
                let offset = (address - region.base) as usize;
                let mut buf = buffer.borrow_mut();
                access_bytes(&mut buf, offset, kind, value)
                    .ok_or(Error::BusFault { address, kind })?;
                Ok(())
            }
            Backing::Operation(peripheral) => {
                let offset = address - region.base;
                match peripheral.borrow_mut().operation(offset, value, kind) {
                    OpResult::Ok => Ok(()),
                    OpResult::Unhandled => Err(Error::BusFault { address, kind }),
                }
            }
        }
    }

    /// Convenience wrapper around [`MemoryRouter::access`] for a 32-bit read.
    pub fn read_word(&mut self, address: u32) -> Result<u32> {
        let mut value = 0;
        self.access(address, AccessKind::ReadWord, &mut value)?;
        Ok(value)
    }

    /// Convenience wrapper around [`MemoryRouter::access`] for a 32-bit write.
    pub fn write_word(&mut self, address: u32, value: u32) -> Result<()> {
        let mut value = value;
        self.access(address, AccessKind::WriteWord, &mut value)
    }

    /// Convenience wrapper around [`MemoryRouter::access`] for an 8-bit read.
    pub fn read_byte(&mut self, address: u32) -> Result<u8> {
        let mut value = 0;
        self.access(address, AccessKind::ReadByte, &mut value)?;
        Ok(value as u8)
    }

    /// Convenience wrapper around [`MemoryRouter::access`] for an 8-bit write.
    pub fn write_byte(&mut self, address: u32, value: u8) -> Result<()> {
        let mut value = value as u32;
        self.access(address, AccessKind::WriteByte, &mut value)
    }

    /// Send [`AccessKind::Reset`] to every operation-backed region. Backed
    /// (flash/SRAM) regions are left untouched — a device reset does not
    /// re-flash program memory.
    pub fn reset_all(&mut self) {
        for region in &mut self.regions {
            if let Backing::Operation(peripheral) = &mut region.backing {
                let mut unused = 0;
                let _ = peripheral.borrow_mut().operation(0, &mut unused, AccessKind::Reset);
            }
        }
    }
}

/// Little-endian byte access into a backed buffer. Returns `None` on an
/// out-of-bounds offset.
fn access_bytes(buf: &mut [u8], offset: usize, kind: AccessKind, value: &mut u32) -> Option<()> {
    let size = kind.size() as usize;
    let slice = buf.get_mut(offset..offset + size)?;
    if kind.is_write() {
        let bytes = value.to_le_bytes();
        slice.copy_from_slice(&bytes[..size]);
    } else {
        let mut bytes = [0u8; 4];
        bytes[..size].copy_from_slice(slice);
        *value = u32::from_le_bytes(bytes);
    }
    Some(())
}
