//! TOML configuration files
//!
//! ```toml
//! chip_select = 0
//! read_only = false
//! read_mode = "fast"
//! write_mode = "word"
//! sector_shift = 9
//!
//! [bus]
//! mode = 0
//! frequency = "20 MHz"
//!
//! # Optional; the part is identified over JEDEC ID when absent
//! [geometry]
//! erase_size = "4 KiB"
//! block_count = 512
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::string::{String, ToString};

use thiserror::Error;

use super::FlashConfig;
use crate::chip::Geometry;
use crate::program::WriteMode;
use crate::protocol::ReadMode;
use crate::spi::SpiMode;

/// Errors loading a configuration file
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("failed to read '{}': {source}", .path.display())]
    Io {
        /// File that was being read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// The file is not valid TOML or has unexpected fields
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] ::toml::de::Error),

    /// A size or frequency string could not be understood
    #[error("invalid {field}: {value}")]
    InvalidValue {
        /// Field name
        field: &'static str,
        /// Offending value
        value: String,
    },

    /// The values parsed but do not form a usable configuration
    #[error("invalid configuration: {0}")]
    Invalid(#[from] crate::error::Error),
}

#[derive(Debug, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
struct TomlConfig {
    chip_select: u8,
    read_only: bool,
    read_mode: ReadMode,
    write_mode: WriteMode,
    sector_shift: u8,
    page_shift: u8,
    max_busy_polls: u32,
    bus: TomlBus,
    geometry: Option<TomlGeometry>,
}

impl Default for TomlConfig {
    fn default() -> Self {
        let config = FlashConfig::default();
        Self {
            chip_select: config.chip_select.0,
            read_only: config.read_only,
            read_mode: config.read_mode,
            write_mode: config.write_mode,
            sector_shift: config.sector_shift,
            page_shift: config.page_shift,
            max_busy_polls: config.max_busy_polls,
            bus: TomlBus::default(),
            geometry: None,
        }
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
struct TomlBus {
    mode: u8,
    frequency: SizeOrInt,
}

impl Default for TomlBus {
    fn default() -> Self {
        let bus = FlashConfig::default().bus;
        Self {
            mode: 0,
            frequency: SizeOrInt::Int(bus.frequency_hz),
        }
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlGeometry {
    erase_size: SizeOrInt,
    block_count: u32,
}

/// A plain number or a string with a unit suffix
#[derive(Debug, serde::Deserialize)]
#[serde(untagged)]
enum SizeOrInt {
    Int(u32),
    Str(String),
}

impl SizeOrInt {
    fn resolve(&self, field: &'static str, units: &[(&str, u32)]) -> Result<u32, ConfigError> {
        let invalid = || ConfigError::InvalidValue {
            field,
            value: match self {
                SizeOrInt::Int(n) => n.to_string(),
                SizeOrInt::Str(s) => s.clone(),
            },
        };

        let s = match self {
            SizeOrInt::Int(n) => return Ok(*n),
            SizeOrInt::Str(s) => s.trim(),
        };
        if let Ok(n) = s.parse::<u32>() {
            return Ok(n);
        }

        let lower = s.to_lowercase();
        for &(suffix, multiplier) in units {
            if let Some(num) = lower.strip_suffix(suffix) {
                let num: u32 = num.trim().parse().map_err(|_| invalid())?;
                return num.checked_mul(multiplier).ok_or_else(invalid);
            }
        }
        Err(invalid())
    }
}

const SIZE_UNITS: &[(&str, u32)] = &[("mib", 1024 * 1024), ("kib", 1024), ("b", 1)];
const FREQUENCY_UNITS: &[(&str, u32)] = &[("mhz", 1_000_000), ("khz", 1_000), ("hz", 1)];

impl FlashConfig {
    /// Load a configuration from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse a configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: TomlConfig = ::toml::from_str(content)?;

        let mut config = FlashConfig::default()
            .with_chip_select(file.chip_select)
            .with_read_only(file.read_only)
            .with_read_mode(file.read_mode)
            .with_write_mode(file.write_mode)
            .with_sector_shift(file.sector_shift)
            .with_page_shift(file.page_shift)
            .with_max_busy_polls(file.max_busy_polls)
            .with_spi_mode(SpiMode::try_from(file.bus.mode)?)
            .with_frequency(file.bus.frequency.resolve("frequency", FREQUENCY_UNITS)?);

        if let Some(geometry) = file.geometry {
            let erase_size = geometry.erase_size.resolve("erase_size", SIZE_UNITS)?;
            if !erase_size.is_power_of_two() {
                return Err(ConfigError::InvalidValue {
                    field: "erase_size",
                    value: erase_size.to_string(),
                });
            }
            let erase_shift = erase_size.trailing_zeros() as u8;
            config = config.with_geometry(Geometry::new(
                erase_shift,
                config.sector_shift,
                geometry.block_count,
            )?);
        }

        config.validate()?;
        Ok(config)
    }
}
