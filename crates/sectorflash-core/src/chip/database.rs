//! Known parts and JEDEC identification

use super::types::Geometry;
use crate::error::{Error, Result};
use crate::protocol::{CommandDriver, JedecId};
use crate::spi::SpiBus;

/// JEDEC manufacturer ID reported by the supported parts
pub const MANUFACTURER_ID: u8 = 0xBF;

/// JEDEC memory type reported by the supported parts
pub const MEMORY_TYPE: u8 = 0x25;

/// Default log2 of the logical sector size (512 bytes)
pub const DEFAULT_SECTOR_SHIFT: u8 = 9;

/// A part recognised by its JEDEC capacity code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownPart {
    /// Part name
    pub name: &'static str,
    /// JEDEC capacity code
    pub capacity: u8,
    /// log2 of the erase block size
    pub erase_shift: u8,
    /// Number of erase blocks
    pub block_count: u32,
}

impl KnownPart {
    /// Geometry of this part with the given logical sector size
    pub const fn geometry(&self, sector_shift: u8) -> Result<Geometry> {
        Geometry::new(self.erase_shift, sector_shift, self.block_count)
    }
}

/// All parts that can be identified
pub const KNOWN_PARTS: &[KnownPart] = &[
    KnownPart {
        name: "SST25VF016B",
        capacity: 0x41,
        erase_shift: 12,
        block_count: 512,
    },
    KnownPart {
        name: "SST25VF032B",
        capacity: 0x4A,
        erase_shift: 12,
        block_count: 1024,
    },
    KnownPart {
        name: "MT25064",
        capacity: 0x4B,
        erase_shift: 12,
        block_count: 2048,
    },
];

/// Look up a part by its JEDEC ID
pub fn find_part(id: &JedecId) -> Option<&'static KnownPart> {
    if id.manufacturer != MANUFACTURER_ID || id.memory_type != MEMORY_TYPE {
        return None;
    }
    KNOWN_PARTS.iter().find(|part| part.capacity == id.capacity)
}

/// Read the JEDEC ID and return the geometry of the part
///
/// Fails with [`Error::UnsupportedCapacity`] for anything not in
/// [`KNOWN_PARTS`].
pub fn identify<B: SpiBus + ?Sized>(
    driver: &mut CommandDriver<'_, B>,
    sector_shift: u8,
) -> Result<Geometry> {
    driver.wait_ready()?;
    let id = driver.read_jedec_id()?;
    log::debug!(
        "JEDEC ID: manufacturer 0x{:02X} type 0x{:02X} capacity 0x{:02X}",
        id.manufacturer,
        id.memory_type,
        id.capacity
    );

    let part = find_part(&id).ok_or(Error::UnsupportedCapacity {
        manufacturer: id.manufacturer,
        memory_type: id.memory_type,
        capacity: id.capacity,
    })?;
    log::debug!("found {} ({} blocks)", part.name, part.block_count);
    part.geometry(sector_shift)
}
