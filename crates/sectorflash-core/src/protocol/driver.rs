//! Command protocol driver
//!
//! Translates named flash operations into the exact byte sequences sent over
//! the transport. Every exchange is bracketed by its own select/deselect pair,
//! and the chip select is always released again, even when a transfer in the
//! middle fails.
//!
//! A [`CommandDriver`] only exists while the bus is locked: it acquires
//! exclusive access and reapplies the bus configuration when it is created,
//! and releases the bus when it is dropped. Multi-step sequences such as an
//! erase followed by a program therefore run under a single lock.

use crate::error::{Error, Result};
use crate::spi::{opcodes, BusConfig, ChipSelect, CommandHeader, SpiBus, StatusFlags};

/// Default ceiling on status polls before giving up on a busy part
///
/// A status read is two bytes on the wire, so at typical clock rates this is
/// well above the tens of milliseconds a sector erase takes.
pub const DEFAULT_MAX_BUSY_POLLS: u32 = 1_000_000;

/// Read command used for array reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "std", serde(rename_all = "lowercase"))]
pub enum ReadMode {
    /// READ (0x03), no filler byte
    Normal,
    /// FAST_READ (0x0B), one filler byte after the address
    #[default]
    Fast,
}

/// Per-device parameters used by every command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverParams {
    /// Chip select of the part
    pub chip_select: ChipSelect,
    /// Bus settings applied after locking
    pub bus: BusConfig,
    /// Array read command
    pub read_mode: ReadMode,
    /// Status polls before [`Error::DeviceNotResponding`]
    pub max_busy_polls: u32,
}

impl Default for DriverParams {
    fn default() -> Self {
        Self {
            chip_select: ChipSelect::default(),
            bus: BusConfig::default(),
            read_mode: ReadMode::default(),
            max_busy_polls: DEFAULT_MAX_BUSY_POLLS,
        }
    }
}

/// JEDEC identification bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JedecId {
    /// Manufacturer ID
    pub manufacturer: u8,
    /// Memory type
    pub memory_type: u8,
    /// Capacity code
    pub capacity: u8,
}

/// Command sequencer holding exclusive access to the bus
pub struct CommandDriver<'a, B: SpiBus + ?Sized> {
    bus: &'a mut B,
    params: DriverParams,
}

impl<'a, B: SpiBus + ?Sized> CommandDriver<'a, B> {
    /// Lock the bus and configure it for this part
    pub fn lock(bus: &'a mut B, params: DriverParams) -> Result<Self> {
        bus.lock(true)?;
        if let Err(e) = bus.configure(&params.bus) {
            let _ = bus.lock(false);
            return Err(e);
        }
        Ok(Self { bus, params })
    }

    /// Parameters this driver was locked with
    pub fn params(&self) -> &DriverParams {
        &self.params
    }

    /// Run `f` with the part selected, deselecting afterwards in all cases
    fn transaction<T>(&mut self, f: impl FnOnce(&mut B) -> Result<T>) -> Result<T> {
        let cs = self.params.chip_select;
        self.bus.select(cs, true)?;
        let result = f(&mut *self.bus);
        let deselect = self.bus.select(cs, false);
        let value = result?;
        deselect?;
        Ok(value)
    }

    /// Release the chip select without sending anything
    ///
    /// Used at attach time, when the line may have been left asserted.
    pub fn deselect(&mut self) -> Result<()> {
        self.bus.select(self.params.chip_select, false)
    }

    /// Send a command consisting of a single opcode
    pub fn command(&mut self, opcode: u8) -> Result<()> {
        log::trace!("cmd 0x{:02X}", opcode);
        self.transaction(|bus| bus.send_byte(opcode).map(|_| ()))
    }

    /// Read the status register
    pub fn read_status(&mut self) -> Result<StatusFlags> {
        let status = self.transaction(|bus| {
            bus.send_byte(opcodes::RDSR)?;
            bus.send_byte(opcodes::FILLER)
        })?;
        Ok(StatusFlags::from_bits_retain(status))
    }

    /// Poll the status register until the busy bit clears
    ///
    /// Returns the first non-busy status, or [`Error::DeviceNotResponding`]
    /// once `max_busy_polls` reads have all reported busy.
    pub fn wait_ready(&mut self) -> Result<StatusFlags> {
        let max_polls = self.params.max_busy_polls;
        for _ in 0..max_polls {
            let status = self.read_status()?;
            if !status.is_busy() {
                return Ok(status);
            }
        }
        log::debug!("part still busy after {} polls", max_polls);
        Err(Error::DeviceNotResponding { polls: max_polls })
    }

    /// Send the Write Enable command
    pub fn write_enable(&mut self) -> Result<()> {
        self.command(opcodes::WREN)
    }

    /// Send the Write Disable command
    pub fn write_disable(&mut self) -> Result<()> {
        self.command(opcodes::WRDI)
    }

    /// Erase the erase block with index `block`
    ///
    /// Waits for any previous operation, sets the write enable latch, then
    /// issues the sector erase. Does not wait for the erase to finish; the
    /// next command's ready check does that.
    pub fn erase_block(&mut self, block: u32, erase_shift: u8) -> Result<()> {
        let addr = block << erase_shift;
        log::trace!("erase block {} at 0x{:06X}", block, addr);

        self.wait_ready()?;
        self.write_enable()?;
        let header = CommandHeader::addressed(opcodes::SE_20, addr);
        self.transaction(|bus| bus.send_block(header.as_bytes()))
    }

    /// Erase the whole part
    pub fn chip_erase(&mut self) -> Result<()> {
        log::trace!("chip erase");
        self.wait_ready()?;
        self.write_enable()?;
        self.command(opcodes::CE_C7)
    }

    /// Read `buf.len()` bytes starting at `addr`
    pub fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        log::trace!("read 0x{:06X} len {}", addr, buf.len());

        self.wait_ready()?;
        let header = match self.params.read_mode {
            ReadMode::Normal => CommandHeader::addressed(opcodes::READ, addr),
            ReadMode::Fast => CommandHeader::addressed(opcodes::FAST_READ, addr).with_filler(),
        };
        self.transaction(|bus| {
            bus.send_block(header.as_bytes())?;
            bus.receive_block(buf)
        })
    }

    /// Issue a single-byte program
    ///
    /// The caller must have waited for ready and set the write enable latch.
    pub fn byte_program(&mut self, addr: u32, value: u8) -> Result<()> {
        let header = CommandHeader::addressed(opcodes::PP, addr);
        self.transaction(|bus| {
            bus.send_block(header.as_bytes())?;
            bus.send_byte(value).map(|_| ())
        })
    }

    /// Issue a page program of `data`, which must not cross a page boundary
    ///
    /// The caller must have waited for ready and set the write enable latch.
    pub fn page_program(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        let header = CommandHeader::addressed(opcodes::PP, addr);
        self.transaction(|bus| {
            bus.send_block(header.as_bytes())?;
            bus.send_block(data)
        })
    }

    /// Enter auto-increment mode and program the first word at `addr`
    ///
    /// `addr` must be even. The caller must have waited for ready and set the
    /// write enable latch.
    pub fn aai_start(&mut self, addr: u32, word: [u8; 2]) -> Result<()> {
        let header = CommandHeader::addressed(opcodes::AAI, addr);
        self.transaction(|bus| {
            bus.send_block(header.as_bytes())?;
            bus.send_block(&word)
        })
    }

    /// Program the next word in auto-increment mode (no address)
    pub fn aai_continue(&mut self, word: [u8; 2]) -> Result<()> {
        self.transaction(|bus| {
            bus.send_byte(opcodes::AAI)?;
            bus.send_block(&word)
        })
    }

    /// Clear all block protect bits
    pub fn unprotect(&mut self) -> Result<()> {
        log::trace!("clearing block protection");
        self.command(opcodes::EWSR)?;
        self.transaction(|bus| {
            bus.send_byte(opcodes::WRSR)?;
            bus.send_byte(0).map(|_| ())
        })
    }

    /// Read the JEDEC manufacturer, memory type and capacity bytes
    pub fn read_jedec_id(&mut self) -> Result<JedecId> {
        self.transaction(|bus| {
            bus.send_byte(opcodes::RDID)?;
            let manufacturer = bus.send_byte(opcodes::FILLER)?;
            let memory_type = bus.send_byte(opcodes::FILLER)?;
            let capacity = bus.send_byte(opcodes::FILLER)?;
            Ok(JedecId {
                manufacturer,
                memory_type,
                capacity,
            })
        })
    }
}

impl<B: SpiBus + ?Sized> Drop for CommandDriver<'_, B> {
    fn drop(&mut self) {
        if let Err(e) = self.bus.lock(false) {
            log::warn!("failed to release bus: {}", e);
        }
    }
}
