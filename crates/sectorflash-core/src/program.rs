//! Program writer
//!
//! Commits an in-memory byte run to flash that the caller has already erased.
//! Flash programming can only clear bits, so bytes equal to the erased state
//! are never sent: they already read back correctly.
//!
//! Three interchangeable strategies are provided:
//!
//! - **Byte**: one byte-program command per non-erased byte.
//! - **Word**: auto-address-increment programming in 2-byte units. Only the
//!   first word of each non-erased run carries an address; a Write Disable
//!   ends the run. AAI needs an even start address, so a leading byte at an
//!   odd address and a trailing odd byte are committed with a single
//!   byte-program each. Nothing outside the run is ever written.
//! - **Page**: one page-program per page-sized chunk that is not entirely
//!   erased, for parts with a page buffer.

use crate::error::Result;
use crate::protocol::CommandDriver;
use crate::spi::opcodes::ERASED_STATE;
use crate::spi::SpiBus;

/// Default log2 of the program page size (256 bytes)
pub const DEFAULT_PAGE_SHIFT: u8 = 8;

/// Programming strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "std", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "std", serde(rename_all = "lowercase"))]
pub enum WriteMode {
    /// One program cycle per byte
    Byte,
    /// Auto-address-increment word programming
    #[default]
    Word,
    /// Page programming
    Page,
}

/// Commits byte runs using the configured strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramWriter {
    mode: WriteMode,
    page_shift: u8,
}

impl Default for ProgramWriter {
    fn default() -> Self {
        Self::new(WriteMode::default(), DEFAULT_PAGE_SHIFT)
    }
}

impl ProgramWriter {
    /// Create a writer; `page_shift` is only used by [`WriteMode::Page`]
    pub const fn new(mode: WriteMode, page_shift: u8) -> Self {
        Self { mode, page_shift }
    }

    /// The strategy in use
    pub fn mode(&self) -> WriteMode {
        self.mode
    }

    /// Program `data` at `addr`, which must already be erased
    pub fn commit<B: SpiBus + ?Sized>(
        &self,
        driver: &mut CommandDriver<'_, B>,
        addr: u32,
        data: &[u8],
    ) -> Result<()> {
        log::debug!(
            "program 0x{:06X} len {} ({:?} mode)",
            addr,
            data.len(),
            self.mode
        );
        match self.mode {
            WriteMode::Byte => program_bytes(driver, addr, data),
            WriteMode::Word => program_words(driver, addr, data),
            WriteMode::Page => program_pages(driver, addr, data, 1usize << self.page_shift),
        }
    }
}

fn is_erased(bytes: &[u8]) -> bool {
    bytes.iter().all(|&b| b == ERASED_STATE)
}

/// Program `data` one byte at a time, skipping erased-state bytes
pub fn program_bytes<B: SpiBus + ?Sized>(
    driver: &mut CommandDriver<'_, B>,
    addr: u32,
    data: &[u8],
) -> Result<()> {
    for (i, &byte) in data.iter().enumerate() {
        if byte == ERASED_STATE {
            continue;
        }
        driver.wait_ready()?;
        driver.write_enable()?;
        driver.byte_program(addr + i as u32, byte)?;
    }
    Ok(())
}

/// Program `data` with auto-address-increment word programming
pub fn program_words<B: SpiBus + ?Sized>(
    driver: &mut CommandDriver<'_, B>,
    addr: u32,
    data: &[u8],
) -> Result<()> {
    let (mut addr, mut data) = (addr, data);

    if addr & 1 != 0 && !data.is_empty() {
        program_bytes(driver, addr, &data[..1])?;
        addr += 1;
        data = &data[1..];
    }

    let (words, tail) = data.split_at(data.len() & !1);
    let nwords = words.len() / 2;
    let word = |i: usize| [words[2 * i], words[2 * i + 1]];

    let mut i = 0;
    while i < nwords {
        while i < nwords && is_erased(&word(i)) {
            i += 1;
        }
        if i == nwords {
            break;
        }

        driver.wait_ready()?;
        driver.write_enable()?;
        driver.aai_start(addr + 2 * i as u32, word(i))?;
        i += 1;

        let run = program_word_run(driver, &word, &mut i, nwords);
        if run.is_err() {
            // Leave AAI mode so the part accepts other commands again
            let _ = driver.write_disable();
            return run;
        }
    }

    if !tail.is_empty() {
        program_bytes(driver, addr + words.len() as u32, tail)?;
    }
    Ok(())
}

/// Continue an AAI sequence until an erased word or the end of the run
fn program_word_run<B: SpiBus + ?Sized>(
    driver: &mut CommandDriver<'_, B>,
    word: &impl Fn(usize) -> [u8; 2],
    i: &mut usize,
    nwords: usize,
) -> Result<()> {
    while *i < nwords && !is_erased(&word(*i)) {
        driver.wait_ready()?;
        driver.aai_continue(word(*i))?;
        *i += 1;
    }
    driver.wait_ready()?;
    driver.write_disable()
}

/// Program `data` in page-sized chunks, skipping fully erased chunks
pub fn program_pages<B: SpiBus + ?Sized>(
    driver: &mut CommandDriver<'_, B>,
    addr: u32,
    data: &[u8],
    page_size: usize,
) -> Result<()> {
    let mut offset = 0;
    while offset < data.len() {
        let current = addr + offset as u32;
        let page_offset = current as usize & (page_size - 1);
        let chunk_len = core::cmp::min(page_size - page_offset, data.len() - offset);
        let chunk = &data[offset..offset + chunk_len];

        if !is_erased(chunk) {
            driver.wait_ready()?;
            driver.write_enable()?;
            driver.page_program(current, chunk)?;
        }
        offset += chunk_len;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, TransportFault};
    use crate::protocol::DriverParams;
    use crate::spi::opcodes;
    use crate::testing::RecordingBus;
    use alloc::vec;
    use alloc::vec::Vec;

    fn commit(mode: WriteMode, addr: u32, data: &[u8]) -> RecordingBus {
        let mut bus = RecordingBus::new();
        {
            let mut driver = CommandDriver::lock(&mut bus, DriverParams::default()).unwrap();
            ProgramWriter::new(mode, 2).commit(&mut driver, addr, data).unwrap();
        }
        bus
    }

    #[test]
    fn test_byte_mode_skips_erased_bytes() {
        let bus = commit(WriteMode::Byte, 0x100, &[0x12, 0xFF, 0x34]);
        assert_eq!(
            bus.commands(),
            vec![
                vec![opcodes::WREN],
                vec![opcodes::PP, 0x00, 0x01, 0x00, 0x12],
                vec![opcodes::WREN],
                vec![opcodes::PP, 0x00, 0x01, 0x02, 0x34],
            ]
        );
    }

    #[test]
    fn test_word_mode_runs() {
        // Two runs separated by an erased word
        let data = [0x01, 0x02, 0x03, 0x04, 0xFF, 0xFF, 0x05, 0xFF];
        let bus = commit(WriteMode::Word, 0x1000, &data);
        assert_eq!(
            bus.commands(),
            vec![
                vec![opcodes::WREN],
                vec![opcodes::AAI, 0x00, 0x10, 0x00, 0x01, 0x02],
                vec![opcodes::AAI, 0x03, 0x04],
                vec![opcodes::WRDI],
                vec![opcodes::WREN],
                vec![opcodes::AAI, 0x00, 0x10, 0x06, 0x05, 0xFF],
                vec![opcodes::WRDI],
            ]
        );
    }

    #[test]
    fn test_word_mode_waits_between_words() {
        let bus = commit(WriteMode::Word, 0, &[0x00, 0x00, 0x00, 0x00]);
        assert_eq!(
            bus.opcodes(),
            vec![
                opcodes::RDSR,
                opcodes::WREN,
                opcodes::AAI,
                opcodes::RDSR,
                opcodes::AAI,
                opcodes::RDSR,
                opcodes::WRDI,
            ]
        );
    }

    #[test]
    fn test_word_mode_all_erased_sends_nothing() {
        let bus = commit(WriteMode::Word, 0, &[0xFF; 64]);
        assert!(bus.frames.is_empty());
    }

    #[test]
    fn test_word_mode_odd_boundaries_use_byte_program() {
        let bus = commit(WriteMode::Word, 0x201, &[0xA1, 0xB2, 0xC3, 0xD4]);
        assert_eq!(
            bus.commands(),
            vec![
                vec![opcodes::WREN],
                vec![opcodes::PP, 0x00, 0x02, 0x01, 0xA1],
                vec![opcodes::WREN],
                vec![opcodes::AAI, 0x00, 0x02, 0x02, 0xB2, 0xC3],
                vec![opcodes::WRDI],
                vec![opcodes::WREN],
                vec![opcodes::PP, 0x00, 0x02, 0x04, 0xD4],
            ]
        );
    }

    #[test]
    fn test_word_mode_error_leaves_aai_mode() {
        let mut bus = RecordingBus::new();
        // Status read, WREN, addressed AAI succeed; the part then stays busy
        bus.busy_from_frame = Some(3);
        let params = DriverParams {
            max_busy_polls: 1,
            ..DriverParams::default()
        };
        let result = {
            let mut driver = CommandDriver::lock(&mut bus, params).unwrap();
            program_words(&mut driver, 0, &[0x00; 4])
        };
        assert_eq!(result, Err(Error::DeviceNotResponding { polls: 1 }));
        assert_eq!(
            bus.opcodes(),
            vec![
                opcodes::RDSR,
                opcodes::WREN,
                opcodes::AAI,
                opcodes::RDSR,
                opcodes::WRDI,
            ]
        );
    }

    #[test]
    fn test_page_mode_splits_and_skips_pages() {
        // Page size 4 (shift 2), starting mid-page
        let data = [0x11, 0x22, 0xFF, 0xFF, 0xFF, 0xFF, 0x33];
        let bus = commit(WriteMode::Page, 0x002, &data);
        assert_eq!(
            bus.commands(),
            vec![
                vec![opcodes::WREN],
                vec![opcodes::PP, 0x00, 0x00, 0x02, 0x11, 0x22],
                vec![opcodes::WREN],
                vec![opcodes::PP, 0x00, 0x00, 0x08, 0x33],
            ]
        );
    }

    #[test]
    fn test_transport_fault_propagates() {
        let mut bus = RecordingBus::new();
        bus.fail = Some(TransportFault::Send);
        let mut driver = CommandDriver::lock(&mut bus, DriverParams::default()).unwrap();
        let result = program_bytes(&mut driver, 0, &[0x00]);
        assert_eq!(result, Err(Error::Transport(TransportFault::Send)));
    }

    #[test]
    fn test_is_erased() {
        assert!(is_erased(&[]));
        assert!(is_erased(&[0xFF, 0xFF]));
        let mixed: Vec<u8> = vec![0xFF, 0xFE];
        assert!(!is_erased(&mixed));
    }
}
