//! SPI NOR flash slave peripheral: the PineTime's external program/data
//! flash, modeled as a [`crate::bus::spi::SpiSlave`] command state machine.

pub mod spi_nor;
