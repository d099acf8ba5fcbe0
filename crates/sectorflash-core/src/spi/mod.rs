//! SPI types and command structures
//!
//! This module provides the transport trait, 24-bit address framing,
//! command headers and the opcodes understood by the supported parts.

pub mod address;
mod bus;
mod command;
pub mod opcodes;

pub use bus::{BusConfig, ChipSelect, SpiBus, SpiMode, BITS_PER_WORD, DEFAULT_FREQUENCY_HZ};
pub use command::{CommandHeader, MAX_HEADER_LEN};
pub use opcodes::StatusFlags;
