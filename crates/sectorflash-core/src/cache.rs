//! Block-translation cache
//!
//! The part only erases whole blocks (4 KiB on the supported parts) while the
//! layer above works in small logical sectors. [`BlockCache`] keeps a single
//! erase block in RAM, applies sector erases and writes to that copy, and
//! commits the whole block with one erase and one program run when the block
//! is flushed or evicted.
//!
//! Slot states:
//!
//! | state    | flash block      | buffer                        |
//! |----------|------------------|-------------------------------|
//! | `Empty`  | -                | undefined, never read         |
//! | `Valid`  | holds the data   | equal to flash                |
//! | `Erased` | erased           | intended contents, unflushed  |
//! | `Dirty`  | erased           | intended contents with writes |
//!
//! The physical block is erased only on the `Valid -> Erased/Dirty`
//! transition, so any number of sector updates to the resident block cost a
//! single erase.

use alloc::vec;
use alloc::vec::Vec;

use crate::chip::Geometry;
use crate::error::{Error, Result};
use crate::program::ProgramWriter;
use crate::protocol::CommandDriver;
use crate::spi::opcodes::ERASED_STATE;
use crate::spi::SpiBus;

/// State of the cache slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheState {
    /// No block loaded
    #[default]
    Empty,
    /// Buffer matches flash
    Valid,
    /// Block erased on flash, buffer not yet programmed back
    Erased,
    /// Block erased on flash, buffer holds staged sector writes
    Dirty,
}

impl CacheState {
    /// Whether the physical block has been erased and awaits a program
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Erased | Self::Dirty)
    }
}

/// Single-slot erase block cache
#[derive(Debug)]
pub struct BlockCache {
    geometry: Geometry,
    writer: ProgramWriter,
    buffer: Vec<u8>,
    block: u32,
    state: CacheState,
}

impl BlockCache {
    /// Allocate a cache for a part with the given geometry
    pub fn new(geometry: Geometry, writer: ProgramWriter) -> Self {
        Self {
            geometry,
            writer,
            buffer: vec![ERASED_STATE; geometry.erase_size() as usize],
            block: 0,
            state: CacheState::Empty,
        }
    }

    /// Geometry the cache translates for
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Current slot state
    pub fn state(&self) -> CacheState {
        self.state
    }

    /// Block held in the slot, if any
    pub fn resident_block(&self) -> Option<u32> {
        match self.state {
            CacheState::Empty => None,
            _ => Some(self.block),
        }
    }

    /// Make `block` the resident block
    ///
    /// A different pending block is flushed first. If that flush fails the
    /// old block stays resident and pending. If loading the new block fails
    /// the slot is left empty.
    pub fn ensure_resident<B: SpiBus + ?Sized>(
        &mut self,
        driver: &mut CommandDriver<'_, B>,
        block: u32,
    ) -> Result<()> {
        if self.resident_block() == Some(block) {
            return Ok(());
        }
        self.flush(driver)?;

        log::trace!("loading block {}", block);
        self.state = CacheState::Empty;
        self.block = block;
        driver.read(self.geometry.block_address(block), &mut self.buffer)?;
        self.state = CacheState::Valid;
        Ok(())
    }

    /// Erase the physical block unless it already is
    fn erase_resident<B: SpiBus + ?Sized>(
        &mut self,
        driver: &mut CommandDriver<'_, B>,
    ) -> Result<()> {
        if self.state == CacheState::Valid {
            log::debug!("erasing block {}", self.block);
            driver.erase_block(self.block, self.geometry.erase_shift())?;
            self.state = CacheState::Erased;
        }
        Ok(())
    }

    /// Erase one logical sector
    ///
    /// The rest of the block is kept in the buffer and written back by the
    /// next flush.
    pub fn erase_sector<B: SpiBus + ?Sized>(
        &mut self,
        driver: &mut CommandDriver<'_, B>,
        sector: u32,
    ) -> Result<()> {
        self.ensure_resident(driver, self.geometry.block_of(sector))?;
        self.erase_resident(driver)?;

        let range = self.sector_range(sector);
        self.buffer[range].fill(ERASED_STATE);
        Ok(())
    }

    /// Stage a write of one logical sector
    ///
    /// Only the first `sector_size` bytes of `data` are used.
    pub fn write_sector<B: SpiBus + ?Sized>(
        &mut self,
        driver: &mut CommandDriver<'_, B>,
        sector: u32,
        data: &[u8],
    ) -> Result<()> {
        let size = self.geometry.sector_size() as usize;
        let data = data.get(..size).ok_or(Error::BufferTooSmall)?;

        self.ensure_resident(driver, self.geometry.block_of(sector))?;
        self.erase_resident(driver)?;

        let range = self.sector_range(sector);
        self.buffer[range].copy_from_slice(data);
        self.state = CacheState::Dirty;
        Ok(())
    }

    /// Program the resident block back if it is pending
    ///
    /// On failure the slot stays pending so a later flush retries it.
    pub fn flush<B: SpiBus + ?Sized>(&mut self, driver: &mut CommandDriver<'_, B>) -> Result<()> {
        if !self.state.is_pending() {
            return Ok(());
        }
        log::debug!("flushing block {} ({:?})", self.block, self.state);
        let addr = self.geometry.block_address(self.block);
        self.writer.commit(driver, addr, &self.buffer)?;
        self.state = CacheState::Valid;
        Ok(())
    }

    /// Read one logical sector into the first `sector_size` bytes of `out`
    pub fn read_sector<B: SpiBus + ?Sized>(
        &mut self,
        driver: &mut CommandDriver<'_, B>,
        sector: u32,
        out: &mut [u8],
    ) -> Result<()> {
        let size = self.geometry.sector_size() as usize;
        let out = out.get_mut(..size).ok_or(Error::BufferTooSmall)?;
        self.read(driver, self.geometry.sector_address(sector), out)
    }

    /// Read `out.len()` bytes starting at byte `address`
    ///
    /// Bytes of the resident block come from the buffer. Anything else is
    /// read from flash after pending data has been flushed; the resident
    /// block is not evicted.
    pub fn read<B: SpiBus + ?Sized>(
        &mut self,
        driver: &mut CommandDriver<'_, B>,
        address: u32,
        out: &mut [u8],
    ) -> Result<()> {
        let erase_size = self.geometry.erase_size() as usize;
        let mut addr = address;
        let mut done = 0;

        while done < out.len() {
            let block = addr >> self.geometry.erase_shift();
            let offset = addr as usize & (erase_size - 1);
            let len = core::cmp::min(erase_size - offset, out.len() - done);
            let chunk = &mut out[done..done + len];

            if self.resident_block() == Some(block) {
                chunk.copy_from_slice(&self.buffer[offset..offset + len]);
            } else {
                self.flush(driver)?;
                driver.read(addr, chunk)?;
            }
            addr += len as u32;
            done += len;
        }
        Ok(())
    }

    /// Forget the resident block without writing it back
    pub fn invalidate(&mut self) {
        if self.state.is_pending() {
            log::debug!("discarding pending block {}", self.block);
        }
        self.state = CacheState::Empty;
    }

    fn sector_range(&self, sector: u32) -> core::ops::Range<usize> {
        let start = self.geometry.offset_in_block(sector);
        start..start + self.geometry.sector_size() as usize
    }
}
