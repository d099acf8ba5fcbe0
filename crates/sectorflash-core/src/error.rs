//! Error types for sectorflash-core
//!
//! This module provides a no_std compatible error type that can be used
//! throughout the crate.

use core::fmt;

/// Which transport primitive failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFault {
    /// Acquiring or releasing exclusive bus access failed
    Lock,
    /// Applying mode, word width or frequency failed
    Configure,
    /// Asserting or releasing the chip select failed
    Select,
    /// Shifting bytes out to the device failed
    Send,
    /// Shifting bytes in from the device failed
    Receive,
}

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // Transport errors
    /// Bus-level failure reported by the transport; never retried here
    Transport(TransportFault),

    // Device errors
    /// The busy bit did not clear within the configured number of polls
    DeviceNotResponding {
        /// Number of status reads issued before giving up
        polls: u32,
    },
    /// The part identified itself but its geometry is not known
    UnsupportedCapacity {
        /// JEDEC manufacturer ID
        manufacturer: u8,
        /// JEDEC memory type
        memory_type: u8,
        /// JEDEC capacity code
        capacity: u8,
    },

    // Operation errors
    /// Write or erase attempted on a read-only instance
    ReadOnlyViolation,

    // Address/size errors
    /// Sector or byte range is beyond the end of the device
    AddressOutOfBounds,
    /// Provided buffer is too small for the operation
    BufferTooSmall,
    /// Geometry violates `sector_shift <= erase_shift` or exceeds 24-bit addressing
    InvalidGeometry,

    // Configuration errors
    /// A configuration value is out of range
    InvalidConfig,
}

impl fmt::Display for TransportFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lock => write!(f, "bus lock"),
            Self::Configure => write!(f, "bus configure"),
            Self::Select => write!(f, "chip select"),
            Self::Send => write!(f, "send"),
            Self::Receive => write!(f, "receive"),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(fault) => write!(f, "transport error during {}", fault),
            Self::DeviceNotResponding { polls } => {
                write!(f, "device still busy after {} status polls", polls)
            }
            Self::UnsupportedCapacity {
                manufacturer,
                memory_type,
                capacity,
            } => write!(
                f,
                "unsupported flash part: manufacturer 0x{:02X} type 0x{:02X} capacity 0x{:02X}",
                manufacturer, memory_type, capacity
            ),
            Self::ReadOnlyViolation => write!(f, "device is read-only"),
            Self::AddressOutOfBounds => write!(f, "address out of bounds"),
            Self::BufferTooSmall => write!(f, "buffer too small"),
            Self::InvalidGeometry => write!(f, "invalid device geometry"),
            Self::InvalidConfig => write!(f, "invalid configuration"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_display() {
        assert_eq!(
            Error::Transport(TransportFault::Receive).to_string(),
            "transport error during receive"
        );
        assert_eq!(
            Error::UnsupportedCapacity {
                manufacturer: 0xBF,
                memory_type: 0x25,
                capacity: 0x8E,
            }
            .to_string(),
            "unsupported flash part: manufacturer 0xBF type 0x25 capacity 0x8E"
        );
    }
}
