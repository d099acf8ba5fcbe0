//! sectorflash-core - Small-sector block device on serial NOR flash
//!
//! Serial NOR parts erase in blocks (4 KiB on the supported SST25/MT25
//! family) while filesystems want to rewrite small sectors in place. This
//! crate drives such a part over a byte-level SPI transport and emulates
//! individually writable sectors on top of it, using a one-block cache so
//! that a burst of sector writes to the same block costs a single erase.
//!
//! The crate is `no_std`; the cache needs `alloc`.
//!
//! # Features
//!
//! - `std` - Enable standard library support (includes `alloc`), TOML
//!   configuration files
//! - `alloc` - Enable the block cache and the block device
//!
//! # Example
//!
//! ```ignore
//! use sectorflash_core::config::FlashConfig;
//! use sectorflash_core::flash::{BlockDevice, SerialFlash};
//!
//! fn store<B: SpiBus>(bus: B, sector: &[u8; 512]) -> Result<B> {
//!     let mut flash = SerialFlash::attach(bus, FlashConfig::default())?;
//!     flash.write(3, 1, sector)?;
//!     flash.detach()
//! }
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(any(feature = "alloc", test))]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

#[cfg(feature = "alloc")]
pub mod cache;
pub mod chip;
pub mod config;
pub mod error;
#[cfg(feature = "alloc")]
pub mod flash;
pub mod program;
pub mod protocol;
pub mod spi;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
