//! Part geometry and identification
//!
//! This module describes the erase-block/logical-sector layout of a part and
//! the table of parts that can be recognised from their JEDEC ID.

mod database;
mod types;

pub use database::*;
pub use types::Geometry;
