//! End-to-end scenarios assembling a full `Soc`, matching the concrete
//! scenarios in the specification this crate implements.

use std::cell::RefCell;
use std::rc::Rc;

use pinetime_core::bus::spi::SpiBus;
use pinetime_core::clock;
use pinetime_core::cpu::{Cpu, NullCpu};
use pinetime_core::error::Error;
use pinetime_core::flash::spi_nor::SpiNorFlash;
use pinetime_core::memory::{AccessKind, MemoryRouter, PeripheralHandle};
use pinetime_core::peripheral::{OpResult, Peripheral};
use pinetime_core::pins::{PinId, PinState};
use pinetime_core::ppi;
use pinetime_core::Soc;

/// Real nRF52832 RTC0 instance id, used only as a task-counting test double
/// here — this crate's peripheral table only ships the `CLOCK` exemplar.
const RTC0_INSTANCE_ID: u8 = 0x11;

/// Guarded so repeated test invocations within the same process don't panic
/// on double-init; every scenario below calls this first.
fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn build(program: &[u8]) -> (Soc, Rc<RefCell<NullCpu>>) {
    init_logger();
    let cpu = Rc::new(RefCell::new(NullCpu::new()));
    let cpu_for_soc = cpu.clone();
    let soc = Soc::new(program, move |_memory: Rc<RefCell<MemoryRouter>>| -> Rc<RefCell<dyn Cpu>> {
        cpu_for_soc
    });
    (soc, cpu)
}

fn clock_base() -> u32 {
    0x4000_0000 | (u32::from(clock::INSTANCE_ID) << 12)
}

fn ppi_base() -> u32 {
    0x4000_0000 | (u32::from(ppi::INSTANCE_ID) << 12)
}

#[test]
fn cold_boot_runs_a_thousand_steps_without_fault() {
    let (mut soc, cpu) = build(&[]);
    for _ in 0..1000 {
        soc.step();
    }
    // A free-running program counter proves the CPU actually executed.
    assert!(cpu.borrow().reg_read(pinetime_core::cpu::ArmRegister::Pc) > 0);
}

/// A task-counting stand-in for RTC0: this crate does not implement RTC0 as
/// a concrete peripheral, only wiring through the PPI to *some* peripheral's
/// task register, which this double makes observable.
#[derive(Default)]
struct CountingTaskPeripheral {
    starts: u32,
}

impl Peripheral for CountingTaskPeripheral {
    fn operation(&mut self, offset: u32, value: &mut u32, kind: AccessKind) -> OpResult {
        if kind == AccessKind::Reset {
            self.starts = 0;
            return OpResult::Ok;
        }
        if offset == 0 && kind == AccessKind::WriteWord && *value != 0 {
            self.starts += 1;
            return OpResult::Ok;
        }
        OpResult::Unhandled
    }
}

#[test]
fn lfclk_start_via_ppi_starts_rtc0() {
    let (mut soc, _cpu) = build(&[]);
    let rtc0: PeripheralHandle = Rc::new(RefCell::new(CountingTaskPeripheral::default()));
    soc.ppi().borrow_mut().add_peripheral(RTC0_INSTANCE_ID, rtc0.clone());

    let memory = soc.memory();
    let clock_base = clock_base();
    let ppi_base = ppi_base();

    // Select LFCLK source 1 so LFCLKSTAT's expected bit pattern matches the
    // scenario's literal 0x10001.
    memory.borrow_mut().write_word(clock_base + 0x518, 1).unwrap(); // LFCLKSRC

    // Program channel 0: EEP = CLOCK.EVENTS_LFCLKSTARTED, TEP = RTC0.TASKS_START.
    let eep = clock_base + 0x104;
    let tep = 0x4000_0000 | (u32::from(RTC0_INSTANCE_ID) << 12);
    memory.borrow_mut().write_word(ppi_base + 0x510, eep).unwrap();
    memory.borrow_mut().write_word(ppi_base + 0x514, tep).unwrap();
    memory.borrow_mut().write_word(ppi_base + 0x504, 0b1).unwrap(); // CHENSET channel 0

    memory.borrow_mut().write_word(clock_base + 0x008, 1).unwrap(); // TASKS_LFCLKSTART

    let lfclkstat = memory.borrow_mut().read_word(clock_base + 0x418).unwrap();
    assert_eq!(lfclkstat, 0x1_0001);
    let events_lfclkstarted = memory.borrow_mut().read_word(clock_base + 0x104).unwrap();
    assert_eq!(events_lfclkstarted, 1);
    assert_eq!(rtc0.borrow().starts, 1);

    soc.step();
}

#[test]
fn flash_wren_pp_read_round_trip() {
    let (mut soc, _cpu) = build(&[]);
    let flash = Rc::new(RefCell::new(SpiNorFlash::new(8 * 1024 * 1024)));
    let bus: Rc<RefCell<SpiBus>> = soc.spi_mut();
    let idx = bus.borrow_mut().add_slave(flash.clone());
    let cs5 = PinId::new(0, 5);
    SpiBus::wire_cs(&bus, soc.pins_mut(), cs5, idx);

    soc.pins_mut().set(cs5, PinState::OutputLow);
    bus.borrow_mut().write(0x06).unwrap(); // WREN
    soc.pins_mut().set(cs5, PinState::OutputHigh);

    soc.pins_mut().set(cs5, PinState::OutputLow);
    for byte in [0x02, 0x00, 0x10, 0x00, 0xDE, 0xAD, 0xBE, 0xEF] {
        bus.borrow_mut().write(byte).unwrap();
    }
    soc.pins_mut().set(cs5, PinState::OutputHigh);

    soc.pins_mut().set(cs5, PinState::OutputLow);
    for byte in [0x03, 0x00, 0x10, 0x00] {
        bus.borrow_mut().write(byte).unwrap();
    }
    let bytes: Vec<u8> = (0..4).map(|_| bus.borrow_mut().read().unwrap()).collect();
    soc.pins_mut().set(cs5, PinState::OutputHigh);

    assert_eq!(bytes, vec![0xDE, 0xAD, 0xBE, 0xEF]);

    soc.pins_mut().set(cs5, PinState::OutputLow);
    bus.borrow_mut().write(0x05).unwrap(); // RDSR
    let status = bus.borrow_mut().read().unwrap();
    soc.pins_mut().set(cs5, PinState::OutputHigh);
    assert_eq!(status & 0x01, 0, "WIP must read 0 after the CS that ended the program");
    assert_eq!(&flash.borrow().contents()[0x1000..0x1004], &[0xDE, 0xAD, 0xBE, 0xEF]);
}

#[test]
fn sector_erase_boundary() {
    init_logger();
    let flash_rc = Rc::new(RefCell::new(SpiNorFlash::new(8 * 1024 * 1024)));
    let mut flash = flash_rc.borrow_mut();
    use pinetime_core::bus::spi::SpiSlave;

    flash.cs_changed(true);
    flash.write(0x06); // WREN
    flash.cs_changed(false);
    flash.cs_changed(true);
    for byte in [0x02, 0x00, 0x20, 0x00, 0x01] {
        flash.write(byte);
    }
    flash.cs_changed(false);

    flash.cs_changed(true);
    flash.write(0x06); // WREN
    flash.cs_changed(false);
    flash.cs_changed(true);
    for byte in [0x20, 0x00, 0x10, 0x00] {
        flash.write(byte);
    }
    flash.cs_changed(false);

    assert_eq!(flash.contents()[0x2000], 0x01);

    flash.cs_changed(true);
    flash.write(0x06); // WREN
    flash.cs_changed(false);
    flash.cs_changed(true);
    for byte in [0x20, 0x00, 0x20, 0x00] {
        flash.write(byte);
    }
    flash.cs_changed(false);

    assert!(flash.contents()[0x2000..0x3000].iter().all(|&b| b == 0xFF));
}

#[test]
fn double_selected_spi_faults() {
    let (mut soc, _cpu) = build(&[]);
    let bus = soc.spi_mut();
    let a = Rc::new(RefCell::new(SpiNorFlash::new(4096)));
    let b = Rc::new(RefCell::new(SpiNorFlash::new(4096)));
    let ia = bus.borrow_mut().add_slave(a);
    let ib = bus.borrow_mut().add_slave(b);
    let cs5 = PinId::new(0, 5);
    SpiBus::wire_cs(&bus, soc.pins_mut(), cs5, ia);
    SpiBus::wire_cs(&bus, soc.pins_mut(), cs5, ib);

    soc.pins_mut().set(cs5, PinState::OutputLow);

    assert_eq!(bus.borrow_mut().write(0xAB).unwrap_err(), Error::NoSlaveSelected);
}

#[test]
fn interrupt_pending_via_ppi() {
    let (mut soc, cpu) = build(&[]);
    let memory = soc.memory();
    let clock_base = clock_base();

    memory.borrow_mut().write_word(clock_base + 0x304, 1 << 1).unwrap(); // INTENSET bit for EVENTS_LFCLKSTARTED
    memory.borrow_mut().write_word(clock_base + 0x008, 1).unwrap(); // TASKS_LFCLKSTART

    assert_eq!(cpu.borrow().pended, vec![u16::from(clock::INSTANCE_ID)]);

    soc.step();
}
