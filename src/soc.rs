//! SoC aggregate: owns every collaborator the fabric needs and the step
//! loop that advances them in the causally-correct order.

use std::cell::RefCell;
use std::rc::Rc;

use crate::bus::i2c::I2cBus;
use crate::bus::spi::SpiBus;
use crate::clock::Clock;
use crate::config::{self, SocConfig};
use crate::cpu::Cpu;
use crate::memory::{MemoryRouter, PeripheralHandle};
use crate::peripheral::Peripheral;
use crate::pins::PinMatrix;
use crate::ppi::{Ppi, PpiHandle};
use crate::ticker::Ticker;

/// Nothing-to-it nRF52832 GPIO port count: the chip has one.
const GPIO_PORTS: usize = 1;

/// Construction context handed to each [`PeripheralFactory`].
pub struct PeripheralCtx {
    /// Back-reference every peripheral needs to raise its own events and
    /// consult `INTEN`-gated interrupt delivery, replacing the reference
    /// implementation's thread-local `current_ppi`.
    pub ppi: PpiHandle,
}

type FactoryFn = fn(&PeripheralCtx) -> PeripheralHandle;

/// One entry in the data-driven peripheral table [`Soc::new`] consumes,
/// replacing the reference implementation's per-instance macro expansion
/// (`NEW_NRF52_PERIPH`).
pub struct PeripheralFactory {
    /// Peripheral instance id; its MMIO base is `0x40000000 | (id << 12)`.
    pub instance_id: u8,
    /// Name used only for log messages.
    pub name: &'static str,
    /// Builds the peripheral given the shared construction context.
    pub factory: FactoryFn,
}

const PERIPHERALS: &[PeripheralFactory] = &[PeripheralFactory {
    instance_id: crate::clock::INSTANCE_ID,
    name: "CLOCK",
    factory: |ctx| Rc::new(RefCell::new(Clock::new(ctx.ppi.clone()))),
}];

/// The assembled SoC.
pub struct Soc {
    memory: Rc<RefCell<MemoryRouter>>,
    pins: PinMatrix,
    ppi: PpiHandle,
    spi: Rc<RefCell<SpiBus>>,
    i2c: Rc<RefCell<I2cBus>>,
    ticker: Ticker,
    cpu: Rc<RefCell<dyn Cpu>>,
}

impl Soc {
    /// Build a SoC with the default [`SocConfig`] and the given program
    /// image. `build_cpu` receives a shared handle to the assembled memory
    /// map and must return the CPU implementation a real front end supplies
    /// (this crate's own `NullCpu` is for its tests only) — matching the
    /// reference implementation's "memory exists before the CPU does"
    /// construction order.
    pub fn new<F>(program: &[u8], build_cpu: F) -> Self
    where
        F: FnOnce(Rc<RefCell<MemoryRouter>>) -> Rc<RefCell<dyn Cpu>>,
    {
        Self::with_config(program, SocConfig::default(), build_cpu)
    }

    /// As [`Soc::new`], with an explicit [`SocConfig`].
    pub fn with_config<F>(program: &[u8], cfg: SocConfig, build_cpu: F) -> Self
    where
        F: FnOnce(Rc<RefCell<MemoryRouter>>) -> Rc<RefCell<dyn Cpu>>,
    {
        let mut flash = vec![0xFFu8; cfg.flash_size];
        let copy_len = program.len().min(flash.len());
        flash[..copy_len].copy_from_slice(&program[..copy_len]);
        let sram = vec![0u8; cfg.sram_size];

        let memory = Rc::new(RefCell::new(MemoryRouter::new()));
        {
            let mut router = memory.borrow_mut();
            router.map_backed(config::FLASH_BASE, Rc::new(RefCell::new(flash)), true);
            router.map_backed(config::SRAM_BASE, Rc::new(RefCell::new(sram)), true);
            router.map_backed(config::FICR_BASE, Rc::new(RefCell::new(cfg.ficr)), false);
            router.map_backed(config::UICR_BASE, Rc::new(RefCell::new(cfg.uicr)), false);
            router.map_backed(config::FACTORY_SECRET_BASE, Rc::new(RefCell::new(cfg.factory_secret)), false);
        }

        let cpu = build_cpu(memory.clone());
        let ppi = Ppi::new(cpu.clone());
        let ctx = PeripheralCtx { ppi: ppi.clone() };

        {
            let mut router = memory.borrow_mut();
            let ppi_base = 0x4000_0000 | (u32::from(crate::ppi::INSTANCE_ID) << 12);
            router.map_operation(ppi_base, 0x1000, ppi.clone());
            for entry in PERIPHERALS {
                let peripheral = (entry.factory)(&ctx);
                ppi.borrow_mut().add_peripheral(entry.instance_id, peripheral.clone());
                let base = 0x4000_0000 | (u32::from(entry.instance_id) << 12);
                router.map_operation(base, 0x1000, peripheral);
                log::debug!("soc: mapped {} at 0x{base:08X}", entry.name);
            }
        }

        Self {
            memory,
            pins: PinMatrix::new(GPIO_PORTS),
            ppi,
            spi: SpiBus::new(),
            i2c: I2cBus::new(),
            ticker: Ticker::new(),
            cpu,
        }
    }

    /// Reset every collaborator: memory (operation-backed regions only),
    /// pins, SPI, I2C, ticker, then the CPU — in that order (§5: observed as
    /// atomic from the caller's perspective, since this crate is
    /// single-threaded).
    pub fn reset(&mut self) {
        log::debug!("soc: reset");
        self.memory.borrow_mut().reset_all();
        self.pins.reset();
        self.spi.borrow_mut().reset();
        self.i2c.borrow_mut().reset();
        self.ticker.reset();
        self.cpu.borrow_mut().reset();
    }

    /// Advance the SoC by one cycle: the ticker fires any due callbacks,
    /// then the SPI bus steps, then the CPU executes one instruction — a
    /// fixed order so peripherals settle before the CPU observes them.
    pub fn step(&mut self) {
        self.ticker.tick();
        self.spi.borrow_mut().step();
        self.cpu.borrow_mut().step();
    }

    /// Shared handle to the memory router, for a front end's own CPU
    /// implementation to perform instruction fetch/decode against.
    pub fn memory(&self) -> Rc<RefCell<MemoryRouter>> {
        self.memory.clone()
    }

    /// Attach external SPI slaves (display, touch, external flash) from the
    /// front end.
    pub fn spi_mut(&self) -> Rc<RefCell<SpiBus>> {
        self.spi.clone()
    }

    /// Attach external I2C slaves (touch controller, accelerometer, heart
    /// rate sensor) from the front end.
    pub fn i2c_mut(&self) -> Rc<RefCell<I2cBus>> {
        self.i2c.clone()
    }

    /// Drive or observe pin state from the front end.
    pub fn pins_mut(&mut self) -> &mut PinMatrix {
        &mut self.pins
    }

    /// Shared handle to the PPI, for a front end wiring additional channels
    /// or registering its own peripherals.
    pub fn ppi(&self) -> PpiHandle {
        self.ppi.clone()
    }
}
