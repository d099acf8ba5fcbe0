//! Block device trait
//!
//! This module provides the `BlockDevice` trait through which a storage
//! layer above talks to a flash instance in units of logical sectors.

use crate::error::Result;
use crate::spi::opcodes::ERASED_STATE;

/// Geometry as seen from above
///
/// The device is presented as an array of equally sized logical sectors, each
/// individually erasable, whatever the physical erase granularity is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MtdGeometry {
    /// Read/write unit in bytes
    pub block_size: u32,
    /// Erase unit in bytes
    pub erase_size: u32,
    /// Number of erase units
    pub erase_block_count: u32,
}

/// Partition description of the whole device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionInfo {
    /// Number of sectors
    pub num_sectors: u32,
    /// Sector size in bytes
    pub sector_size: u32,
    /// First sector of the partition
    pub start_sector: u32,
}

/// Control requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ioctl {
    /// Report the [`MtdGeometry`]
    Geometry,
    /// Report the [`PartitionInfo`]
    PartitionInfo,
    /// Erase the whole device
    BulkErase,
    /// Report the erased byte value
    ErasedState,
}

/// Replies to [`Ioctl`] requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoctlReply {
    /// Reply to [`Ioctl::Geometry`]
    Geometry(MtdGeometry),
    /// Reply to [`Ioctl::PartitionInfo`]
    PartitionInfo(PartitionInfo),
    /// Request completed without data
    Done,
    /// Reply to [`Ioctl::ErasedState`]
    ErasedState(u8),
}

/// Sector-addressed storage device
///
/// Sector arguments are logical sector indices. Counts returned are the
/// number of sectors (or bytes for [`read_bytes`](Self::read_bytes))
/// processed, which is always the full request on success.
///
/// # Example
///
/// ```ignore
/// use sectorflash_core::flash::BlockDevice;
///
/// fn wipe_first<D: BlockDevice>(device: &mut D) -> Result<()> {
///     device.erase(0, 1)?;
///     device.flush()
/// }
/// ```
pub trait BlockDevice {
    /// Geometry presented upwards
    fn geometry(&self) -> MtdGeometry;

    /// Value every byte reads as after an erase
    fn erased_value(&self) -> u8 {
        ERASED_STATE
    }

    /// Erase `count` sectors starting at `start`
    fn erase(&mut self, start: u32, count: usize) -> Result<usize>;

    /// Read `count` sectors starting at `start` into `buf`
    fn read(&mut self, start: u32, count: usize, buf: &mut [u8]) -> Result<usize>;

    /// Write `count` sectors starting at `start` from `buf`
    ///
    /// Data may be held back until [`flush`](Self::flush).
    fn write(&mut self, start: u32, count: usize, buf: &[u8]) -> Result<usize>;

    /// Read `buf.len()` bytes starting at byte `offset`
    fn read_bytes(&mut self, offset: u32, buf: &mut [u8]) -> Result<usize>;

    /// Commit any held-back writes
    fn flush(&mut self) -> Result<()>;

    /// Erase the whole device
    fn bulk_erase(&mut self) -> Result<()>;

    /// The whole device as a single partition
    fn partition_info(&self) -> PartitionInfo {
        let geometry = self.geometry();
        PartitionInfo {
            num_sectors: geometry.erase_block_count,
            sector_size: geometry.block_size,
            start_sector: 0,
        }
    }

    /// Handle a control request
    fn ioctl(&mut self, request: Ioctl) -> Result<IoctlReply> {
        match request {
            Ioctl::Geometry => Ok(IoctlReply::Geometry(self.geometry())),
            Ioctl::PartitionInfo => Ok(IoctlReply::PartitionInfo(self.partition_info())),
            Ioctl::BulkErase => self.bulk_erase().map(|_| IoctlReply::Done),
            Ioctl::ErasedState => Ok(IoctlReply::ErasedState(self.erased_value())),
        }
    }
}
