//! Serial flash command protocol
//!
//! This module implements the fixed command sequences understood by the
//! supported parts on top of the [`SpiBus`](crate::spi::SpiBus) transport.

mod driver;

pub use driver::{CommandDriver, DriverParams, JedecId, ReadMode, DEFAULT_MAX_BUSY_POLLS};
