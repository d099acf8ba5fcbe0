//! Serial NOR flash block device
//!
//! [`SerialFlash`] owns the transport and the block cache of one part. Every
//! operation validates its arguments, then locks the bus for the whole
//! multi-step sequence it runs.

use crate::cache::{BlockCache, CacheState};
use crate::chip::{self, Geometry};
use crate::config::FlashConfig;
use crate::error::{Error, Result, TransportFault};
use crate::protocol::{CommandDriver, DriverParams};
use crate::spi::SpiBus;

use super::device::{BlockDevice, MtdGeometry};

/// A serial NOR part presented as a small-sector block device
///
/// Writes are staged in a one-block cache and committed by [`flush`],
/// [`detach`], eviction by an access to another block, or (best effort) when
/// the device is dropped.
///
/// [`flush`]: BlockDevice::flush
/// [`detach`]: SerialFlash::detach
pub struct SerialFlash<B: SpiBus> {
    // Only None after detach
    bus: Option<B>,
    params: DriverParams,
    geometry: Geometry,
    cache: Option<BlockCache>,
}

impl<B: SpiBus> SerialFlash<B> {
    /// Bring up the part on `bus`
    ///
    /// Releases the chip select, identifies the part unless
    /// [`FlashConfig::geometry`] is set, and clears block protection unless
    /// the instance is read-only. Read-only instances get no cache.
    pub fn attach(mut bus: B, config: FlashConfig) -> Result<Self> {
        config.validate()?;
        let params = config.driver_params();

        let geometry = {
            let mut driver = CommandDriver::lock(&mut bus, params)?;
            driver.deselect()?;

            let geometry = match config.geometry {
                Some(geometry) => geometry,
                None => chip::identify(&mut driver, config.sector_shift)?,
            };
            config.validate_for(&geometry)?;

            if !config.read_only {
                driver.wait_ready()?;
                driver.unprotect()?;
            }
            geometry
        };

        log::debug!(
            "attached: {} blocks of {} bytes, {}-byte sectors{}",
            geometry.block_count(),
            geometry.erase_size(),
            geometry.sector_size(),
            if config.read_only { ", read-only" } else { "" }
        );

        let cache = (!config.read_only).then(|| BlockCache::new(geometry, config.program_writer()));
        Ok(Self {
            bus: Some(bus),
            params,
            geometry,
            cache,
        })
    }

    /// Flush pending data and hand the transport back
    pub fn detach(mut self) -> Result<B> {
        BlockDevice::flush(&mut self)?;
        self.bus
            .take()
            .ok_or(Error::Transport(TransportFault::Lock))
    }

    /// Physical geometry of the part
    pub fn chip_geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Whether writes and erases are rejected
    pub fn is_read_only(&self) -> bool {
        self.cache.is_none()
    }

    /// State of the cache slot, `None` on read-only instances
    pub fn cache_state(&self) -> Option<CacheState> {
        self.cache.as_ref().map(BlockCache::state)
    }

    /// Block held in the cache, if any
    pub fn resident_block(&self) -> Option<u32> {
        self.cache.as_ref().and_then(BlockCache::resident_block)
    }

    /// The transport, e.g. to reach other devices on it between operations
    pub fn bus_mut(&mut self) -> Result<&mut B> {
        self.bus
            .as_mut()
            .ok_or(Error::Transport(TransportFault::Lock))
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.cache.is_none() {
            return Err(Error::ReadOnlyViolation);
        }
        Ok(())
    }

    /// Validate a sector range and return its length in bytes
    fn check_sectors(&self, start: u32, count: usize, buf_len: Option<usize>) -> Result<usize> {
        let count32 = u32::try_from(count).map_err(|_| Error::AddressOutOfBounds)?;
        if !self.geometry.contains_sectors(start, count32) {
            return Err(Error::AddressOutOfBounds);
        }
        let len = count * self.geometry.sector_size() as usize;
        if buf_len.is_some_and(|buf_len| buf_len < len) {
            return Err(Error::BufferTooSmall);
        }
        Ok(len)
    }

    /// Lock the bus for one operation
    fn session(&mut self) -> Result<(CommandDriver<'_, B>, Option<&mut BlockCache>)> {
        // Field borrows, so the cache stays reachable next to the driver
        let bus = self
            .bus
            .as_mut()
            .ok_or(Error::Transport(TransportFault::Lock))?;
        let driver = CommandDriver::lock(bus, self.params)?;
        Ok((driver, self.cache.as_mut()))
    }

    fn writable_session(&mut self) -> Result<(CommandDriver<'_, B>, &mut BlockCache)> {
        let (driver, cache) = self.session()?;
        Ok((driver, cache.ok_or(Error::ReadOnlyViolation)?))
    }

    fn read_range(&mut self, address: u32, out: &mut [u8]) -> Result<()> {
        let (mut driver, cache) = self.session()?;
        match cache {
            Some(cache) => cache.read(&mut driver, address, out),
            None => driver.read(address, out),
        }
    }
}

impl<B: SpiBus> BlockDevice for SerialFlash<B> {
    fn geometry(&self) -> MtdGeometry {
        MtdGeometry {
            block_size: self.geometry.sector_size(),
            erase_size: self.geometry.sector_size(),
            erase_block_count: self.geometry.sector_count(),
        }
    }

    fn erase(&mut self, start: u32, count: usize) -> Result<usize> {
        self.ensure_writable()?;
        self.check_sectors(start, count, None)?;
        log::debug!("erase sectors {}..{}", start, start as usize + count);

        let (mut driver, cache) = self.writable_session()?;
        for sector in start..start + count as u32 {
            cache.erase_sector(&mut driver, sector)?;
        }
        Ok(count)
    }

    fn read(&mut self, start: u32, count: usize, buf: &mut [u8]) -> Result<usize> {
        let len = self.check_sectors(start, count, Some(buf.len()))?;
        let address = self.geometry.sector_address(start);
        self.read_range(address, &mut buf[..len])?;
        Ok(count)
    }

    fn write(&mut self, start: u32, count: usize, buf: &[u8]) -> Result<usize> {
        self.ensure_writable()?;
        self.check_sectors(start, count, Some(buf.len()))?;
        log::debug!("write sectors {}..{}", start, start as usize + count);

        let sector_size = self.geometry.sector_size() as usize;
        let (mut driver, cache) = self.writable_session()?;
        for (sector, data) in (start..).zip(buf.chunks_exact(sector_size).take(count)) {
            cache.write_sector(&mut driver, sector, data)?;
        }
        Ok(count)
    }

    fn read_bytes(&mut self, offset: u32, buf: &mut [u8]) -> Result<usize> {
        if !self.geometry.contains_bytes(offset, buf.len()) {
            return Err(Error::AddressOutOfBounds);
        }
        self.read_range(offset, buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<()> {
        if !self.cache_state().is_some_and(CacheState::is_pending) {
            return Ok(());
        }
        let (mut driver, cache) = self.writable_session()?;
        cache.flush(&mut driver)
    }

    fn bulk_erase(&mut self) -> Result<()> {
        self.ensure_writable()?;
        log::debug!("bulk erase");

        let (mut driver, cache) = self.writable_session()?;
        driver.chip_erase()?;
        driver.wait_ready()?;
        cache.invalidate();
        Ok(())
    }
}

impl<B: SpiBus> Drop for SerialFlash<B> {
    fn drop(&mut self) {
        if let Err(e) = BlockDevice::flush(self) {
            log::warn!("failed to flush on drop: {}", e);
        }
    }
}
