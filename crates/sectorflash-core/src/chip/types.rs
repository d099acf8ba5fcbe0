//! Device geometry

use crate::error::{Error, Result};
use crate::spi::address;

/// Erase-block and logical-sector layout of a part
///
/// Immutable once discovered. Sizes are powers of two, so the block owning a
/// logical sector is a shift away:
/// `block = sector >> (erase_shift - sector_shift)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Geometry {
    erase_shift: u8,
    sector_shift: u8,
    block_count: u32,
}

impl Geometry {
    /// Create a geometry
    ///
    /// Fails with [`Error::InvalidGeometry`] unless
    /// `sector_shift <= erase_shift`, there is at least one block, and the
    /// whole part fits in 24-bit addressing.
    pub const fn new(erase_shift: u8, sector_shift: u8, block_count: u32) -> Result<Self> {
        if sector_shift > erase_shift || erase_shift > 24 || block_count == 0 {
            return Err(Error::InvalidGeometry);
        }
        let total = (block_count as u64) << erase_shift;
        if total > usize::MAX as u64 || !address::fits(0, total as usize) {
            return Err(Error::InvalidGeometry);
        }
        Ok(Self {
            erase_shift,
            sector_shift,
            block_count,
        })
    }

    /// Same erase layout with a different logical sector size
    pub const fn with_sector_shift(self, sector_shift: u8) -> Result<Self> {
        Self::new(self.erase_shift, sector_shift, self.block_count)
    }

    /// log2 of the erase block size
    pub const fn erase_shift(&self) -> u8 {
        self.erase_shift
    }

    /// log2 of the logical sector size
    pub const fn sector_shift(&self) -> u8 {
        self.sector_shift
    }

    /// Number of erase blocks
    pub const fn block_count(&self) -> u32 {
        self.block_count
    }

    /// Erase block size in bytes
    pub const fn erase_size(&self) -> u32 {
        1 << self.erase_shift
    }

    /// Logical sector size in bytes
    pub const fn sector_size(&self) -> u32 {
        1 << self.sector_shift
    }

    /// Logical sectors in one erase block
    pub const fn sectors_per_block(&self) -> u32 {
        1 << (self.erase_shift - self.sector_shift)
    }

    /// Logical sectors on the part
    pub const fn sector_count(&self) -> u32 {
        self.block_count << (self.erase_shift - self.sector_shift)
    }

    /// Total size in bytes
    pub const fn total_size(&self) -> u32 {
        self.block_count << self.erase_shift
    }

    /// Erase block holding `sector`
    pub const fn block_of(&self, sector: u32) -> u32 {
        sector >> (self.erase_shift - self.sector_shift)
    }

    /// Byte offset of `sector` inside its erase block
    pub const fn offset_in_block(&self, sector: u32) -> usize {
        ((sector & (self.sectors_per_block() - 1)) << self.sector_shift) as usize
    }

    /// Byte address of the first byte of `block`
    pub const fn block_address(&self, block: u32) -> u32 {
        block << self.erase_shift
    }

    /// Byte address of the first byte of `sector`
    pub const fn sector_address(&self, sector: u32) -> u32 {
        sector << self.sector_shift
    }

    /// Whether `count` sectors starting at `start` are all on the part
    pub fn contains_sectors(&self, start: u32, count: u32) -> bool {
        start
            .checked_add(count)
            .is_some_and(|end| end <= self.sector_count())
    }

    /// Whether `len` bytes starting at `offset` are all on the part
    pub fn contains_bytes(&self, offset: u32, len: usize) -> bool {
        offset as u64 + len as u64 <= self.total_size() as u64
    }
}
