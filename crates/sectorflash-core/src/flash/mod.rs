//! Block device over serial NOR flash
//!
//! This module provides the [`BlockDevice`] contract and [`SerialFlash`],
//! which implements it on top of the command driver and block cache.

mod device;
mod serial;

pub use device::{BlockDevice, Ioctl, IoctlReply, MtdGeometry, PartitionInfo};
pub use serial::SerialFlash;
