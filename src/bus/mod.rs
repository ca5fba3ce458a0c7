//! Serial bus controllers: SPI and I2C masters that shuttle bytes between a
//! controller peripheral and whichever slave currently has the bus.

pub mod i2c;
pub mod spi;
