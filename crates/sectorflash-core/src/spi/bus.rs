//! Transport trait consumed by the command protocol driver
//!
//! The transport is a full-duplex, chip-select addressed byte channel that
//! may be shared with other devices. It is the only thing a board has to
//! provide to drive a part.

use crate::error::{Error, Result};

/// Default SPI clock frequency in Hz
pub const DEFAULT_FREQUENCY_HZ: u32 = 20_000_000;

/// Word width used by every transfer
pub const BITS_PER_WORD: u8 = 8;

/// SPI clock polarity/phase mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SpiMode {
    /// CPOL=0, CPHA=0
    #[default]
    Mode0,
    /// CPOL=0, CPHA=1
    Mode1,
    /// CPOL=1, CPHA=0
    Mode2,
    /// CPOL=1, CPHA=1
    Mode3,
}

impl TryFrom<u8> for SpiMode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Mode0),
            1 => Ok(Self::Mode1),
            2 => Ok(Self::Mode2),
            3 => Ok(Self::Mode3),
            _ => Err(Error::InvalidConfig),
        }
    }
}

/// Bus settings reapplied every time the bus is locked
///
/// A shared bus may have been left in another device's configuration, so
/// these are pushed to the transport after each lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusConfig {
    /// Clock polarity/phase
    pub mode: SpiMode,
    /// Bits per word
    pub bits: u8,
    /// Clock frequency in Hz
    pub frequency_hz: u32,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            mode: SpiMode::Mode0,
            bits: BITS_PER_WORD,
            frequency_hz: DEFAULT_FREQUENCY_HZ,
        }
    }
}

/// Chip select line of the flash part on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ChipSelect(pub u8);

/// Byte-level transport to a serial flash part
///
/// Implementations report failures as [`Error::Transport`].
pub trait SpiBus {
    /// Acquire (`true`) or release (`false`) exclusive access to the bus
    ///
    /// Acquiring blocks until no other device holds the bus.
    fn lock(&mut self, exclusive: bool) -> Result<()>;

    /// Apply mode, word width and frequency
    fn configure(&mut self, config: &BusConfig) -> Result<()>;

    /// Assert (`true`) or release (`false`) a chip select line
    fn select(&mut self, cs: ChipSelect, asserted: bool) -> Result<()>;

    /// Shift one byte out and return the byte shifted in at the same time
    fn send_byte(&mut self, byte: u8) -> Result<u8>;

    /// Shift a block of bytes out, discarding what is shifted in
    fn send_block(&mut self, data: &[u8]) -> Result<()>;

    /// Shift `buf.len()` bytes in
    fn receive_block(&mut self, buf: &mut [u8]) -> Result<()>;
}

impl<B: SpiBus + ?Sized> SpiBus for &mut B {
    fn lock(&mut self, exclusive: bool) -> Result<()> {
        (**self).lock(exclusive)
    }

    fn configure(&mut self, config: &BusConfig) -> Result<()> {
        (**self).configure(config)
    }

    fn select(&mut self, cs: ChipSelect, asserted: bool) -> Result<()> {
        (**self).select(cs, asserted)
    }

    fn send_byte(&mut self, byte: u8) -> Result<u8> {
        (**self).send_byte(byte)
    }

    fn send_block(&mut self, data: &[u8]) -> Result<()> {
        (**self).send_block(data)
    }

    fn receive_block(&mut self, buf: &mut [u8]) -> Result<()> {
        (**self).receive_block(buf)
    }
}
