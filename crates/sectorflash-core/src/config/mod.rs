//! Device configuration
//!
//! [`FlashConfig`] collects everything [`SerialFlash::attach`] needs to know
//! about how a part is wired and how it should be driven. It can be built in
//! code, parsed from `key=value` options, or (with `std`) loaded from TOML.
//!
//! [`SerialFlash::attach`]: crate::flash::SerialFlash::attach

#[cfg(feature = "std")]
mod toml;

#[cfg(feature = "std")]
pub use self::toml::ConfigError;

use crate::chip::{Geometry, DEFAULT_SECTOR_SHIFT};
use crate::error::{Error, Result};
use crate::program::{ProgramWriter, WriteMode, DEFAULT_PAGE_SHIFT};
use crate::protocol::{DriverParams, ReadMode, DEFAULT_MAX_BUSY_POLLS};
use crate::spi::{BusConfig, ChipSelect, SpiMode, BITS_PER_WORD};

/// Configuration of one serial flash instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashConfig {
    /// Chip select of the part
    pub chip_select: ChipSelect,
    /// Bus mode, word width and frequency
    pub bus: BusConfig,
    /// Array read command
    pub read_mode: ReadMode,
    /// Programming strategy used by flushes
    pub write_mode: WriteMode,
    /// log2 of the logical sector size presented upwards
    pub sector_shift: u8,
    /// log2 of the program page size, used by [`WriteMode::Page`]
    pub page_shift: u8,
    /// Status polls before a busy part is reported as not responding
    pub max_busy_polls: u32,
    /// Reject writes and erases, skip unprotect, allocate no cache
    pub read_only: bool,
    /// Fixed geometry; skips JEDEC identification when set
    pub geometry: Option<Geometry>,
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            chip_select: ChipSelect::default(),
            bus: BusConfig::default(),
            read_mode: ReadMode::default(),
            write_mode: WriteMode::default(),
            sector_shift: DEFAULT_SECTOR_SHIFT,
            page_shift: DEFAULT_PAGE_SHIFT,
            max_busy_polls: DEFAULT_MAX_BUSY_POLLS,
            read_only: false,
            geometry: None,
        }
    }
}

impl FlashConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the chip select line
    pub fn with_chip_select(mut self, cs: u8) -> Self {
        self.chip_select = ChipSelect(cs);
        self
    }

    /// Set the SPI mode
    pub fn with_spi_mode(mut self, mode: SpiMode) -> Self {
        self.bus.mode = mode;
        self
    }

    /// Set the SPI clock frequency in Hz
    pub fn with_frequency(mut self, hz: u32) -> Self {
        self.bus.frequency_hz = hz;
        self
    }

    /// Set the array read command
    pub fn with_read_mode(mut self, mode: ReadMode) -> Self {
        self.read_mode = mode;
        self
    }

    /// Set the programming strategy
    pub fn with_write_mode(mut self, mode: WriteMode) -> Self {
        self.write_mode = mode;
        self
    }

    /// Set log2 of the logical sector size
    pub fn with_sector_shift(mut self, shift: u8) -> Self {
        self.sector_shift = shift;
        self
    }

    /// Set log2 of the program page size
    pub fn with_page_shift(mut self, shift: u8) -> Self {
        self.page_shift = shift;
        self
    }

    /// Set the busy-poll ceiling
    pub fn with_max_busy_polls(mut self, polls: u32) -> Self {
        self.max_busy_polls = polls;
        self
    }

    /// Make the instance read-only
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Use a fixed geometry instead of identifying the part
    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = Some(geometry);
        self
    }

    /// Check values that do not depend on the part
    pub fn validate(&self) -> Result<()> {
        if self.max_busy_polls == 0
            || self.bus.bits != BITS_PER_WORD
            || self.bus.frequency_hz == 0
            || self.sector_shift > 24
            || self.page_shift == 0
        {
            return Err(Error::InvalidConfig);
        }
        Ok(())
    }

    /// Check values against the geometry of the attached part
    pub fn validate_for(&self, geometry: &Geometry) -> Result<()> {
        self.validate()?;
        if self.write_mode == WriteMode::Page && self.page_shift > geometry.erase_shift() {
            return Err(Error::InvalidConfig);
        }
        Ok(())
    }

    /// Parameters for the command protocol driver
    pub fn driver_params(&self) -> DriverParams {
        DriverParams {
            chip_select: self.chip_select,
            bus: self.bus,
            read_mode: self.read_mode,
            max_busy_polls: self.max_busy_polls,
        }
    }

    /// Program writer for cache flushes
    pub fn program_writer(&self) -> ProgramWriter {
        ProgramWriter::new(self.write_mode, self.page_shift)
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value {
        "1" | "yes" | "true" | "on" => Ok(true),
        "0" | "no" | "false" | "off" => Ok(false),
        _ => Err(Error::InvalidConfig),
    }
}

fn parse_number<T: core::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| {
        log::warn!("invalid value for {}: {}", key, value);
        Error::InvalidConfig
    })
}

/// Parse configuration options from key-value pairs
///
/// # Supported options
/// - `cs=N` - chip select line
/// - `mode=N` - SPI mode 0-3
/// - `spispeed=N` - SPI clock in kHz
/// - `read=normal|fast` - array read command
/// - `write=byte|word|page` - programming strategy
/// - `sectorshift=N` - log2 of the logical sector size
/// - `pageshift=N` - log2 of the program page size
/// - `polls=N` - busy-poll ceiling
/// - `ro=yes|no` - read-only instance
///
/// Unknown keys are logged and ignored.
///
/// # Example
/// ```
/// use sectorflash_core::config::parse_options;
/// use sectorflash_core::program::WriteMode;
///
/// let config = parse_options(&[("spispeed", "10000"), ("write", "byte")]).unwrap();
/// assert_eq!(config.bus.frequency_hz, 10_000_000);
/// assert_eq!(config.write_mode, WriteMode::Byte);
/// ```
pub fn parse_options(options: &[(&str, &str)]) -> Result<FlashConfig> {
    let mut config = FlashConfig::default();

    for &(key, value) in options {
        match key {
            "cs" => config.chip_select = ChipSelect(parse_number(key, value)?),
            "mode" => config.bus.mode = SpiMode::try_from(parse_number::<u8>(key, value)?)?,
            "spispeed" => {
                let khz: u32 = parse_number(key, value)?;
                config.bus.frequency_hz = khz.checked_mul(1000).ok_or(Error::InvalidConfig)?;
            }
            "read" => {
                config.read_mode = match value {
                    "normal" => ReadMode::Normal,
                    "fast" => ReadMode::Fast,
                    _ => return Err(Error::InvalidConfig),
                }
            }
            "write" => {
                config.write_mode = match value {
                    "byte" => WriteMode::Byte,
                    "word" => WriteMode::Word,
                    "page" => WriteMode::Page,
                    _ => return Err(Error::InvalidConfig),
                }
            }
            "sectorshift" => config.sector_shift = parse_number(key, value)?,
            "pageshift" => config.page_shift = parse_number(key, value)?,
            "polls" => config.max_busy_polls = parse_number(key, value)?,
            "ro" => config.read_only = parse_bool(value)?,
            _ => log::warn!("unknown option: {}={}", key, value),
        }
    }

    config.validate()?;
    Ok(config)
}
