//! sectorflash-dummy - In-memory serial NOR emulator for testing
//!
//! This crate provides [`DummyChip`], a byte-level emulation of an SST25-style
//! serial NOR part behind the [`SpiBus`] transport trait. Commands are
//! decoded from the bytes shifted in between select and deselect, exactly as
//! a real part sees them, so the command driver can be tested without
//! hardware.
//!
//! Besides the flash array the emulator keeps a trace of bus events, a few
//! counters, and a list of protocol violations (commands a real part would
//! ignore or mis-execute) that tests can assert to be empty.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "alloc")]
use alloc::vec;
#[cfg(feature = "alloc")]
use alloc::vec::Vec;

use sectorflash_core::error::{Error, Result, TransportFault};
use sectorflash_core::spi::{address, opcodes, BusConfig, ChipSelect, SpiBus, StatusFlags};

/// Configuration for the dummy part
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// JEDEC manufacturer ID
    pub manufacturer_id: u8,
    /// JEDEC memory type
    pub memory_type: u8,
    /// JEDEC capacity code
    pub capacity: u8,
    /// Array size in bytes
    pub size: usize,
    /// Sector erase size in bytes
    pub erase_size: usize,
    /// Page size for 0x02; `None` makes 0x02 a single-byte program
    pub page_size: Option<usize>,
    /// Status reads that report busy after each program or erase
    pub busy_polls: u32,
    /// Chip select the part is wired to
    pub chip_select: ChipSelect,
}

impl DummyConfig {
    /// SST25VF016B: 2 MiB, byte program + AAI
    pub fn sst25vf016b() -> Self {
        Self {
            manufacturer_id: 0xBF,
            memory_type: 0x25,
            capacity: 0x41,
            size: 2 * 1024 * 1024,
            erase_size: 4096,
            page_size: None,
            busy_polls: 1,
            chip_select: ChipSelect(0),
        }
    }

    /// SST25VF032B: 4 MiB, byte program + AAI
    pub fn sst25vf032b() -> Self {
        Self {
            capacity: 0x4A,
            size: 4 * 1024 * 1024,
            ..Self::sst25vf016b()
        }
    }

    /// MT25064: 8 MiB, 256-byte page program
    pub fn mt25064() -> Self {
        Self {
            capacity: 0x4B,
            size: 8 * 1024 * 1024,
            page_size: Some(256),
            ..Self::sst25vf016b()
        }
    }
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self::sst25vf016b()
    }
}

/// Something observable that happened on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusEvent {
    /// Exclusive access acquired
    Lock,
    /// Exclusive access released
    Unlock,
    /// Bus reconfigured
    Configure(BusConfig),
    /// A complete select..deselect frame addressed to this part
    Command {
        /// First byte of the frame
        opcode: u8,
        /// 24-bit address, for commands that carry one
        address: Option<u32>,
    },
}

/// Sequencing errors a real part would not report but would act on wrongly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    /// The part was selected without the bus being locked
    NotLocked,
    /// A command other than a status read arrived while busy
    CommandWhileBusy(u8),
    /// Program, erase or status write without the write enable latch
    WriteNotEnabled(u8),
    /// Program or erase while block protection is set
    WriteProtected(u8),
    /// A program tried to turn a 0 bit back into 1
    ProgramOverData(u32),
    /// Malformed or misplaced auto-increment frame
    BadAai,
    /// A command other than AAI, WRDI or RDSR during auto-increment mode
    CommandInAai(u8),
    /// Frame too short for its opcode
    ShortFrame(u8),
    /// Opcode the part does not implement
    UnknownOpcode(u8),
}

/// Dummy serial NOR part
///
/// Emulates the array, status register, write enable latch, busy timing and
/// auto-address-increment mode of the parts driven by `sectorflash-core`.
/// Programming follows NOR semantics: bits can only be cleared.
#[cfg(feature = "alloc")]
pub struct DummyChip {
    config: DummyConfig,
    data: Vec<u8>,
    /// Block protect and BPL bits
    protection: u8,
    write_enabled: bool,
    ewsr_latched: bool,
    /// Next address while in auto-increment mode
    aai_address: Option<u32>,
    busy_remaining: u32,
    stuck_busy: bool,
    locked: bool,
    frame: Option<Vec<u8>>,
    fault: Option<(TransportFault, u32)>,
    events: Vec<BusEvent>,
    violations: Vec<Violation>,
    erase_count: usize,
    program_count: usize,
    read_count: usize,
}

#[cfg(feature = "alloc")]
impl DummyChip {
    /// Create an erased part with the given configuration
    ///
    /// Like the real parts, it powers up with all block protect bits set.
    pub fn new(config: DummyConfig) -> Self {
        let data = vec![opcodes::ERASED_STATE; config.size];
        Self {
            config,
            data,
            protection: StatusFlags::BP_MASK.bits(),
            write_enabled: false,
            ewsr_latched: false,
            aai_address: None,
            busy_remaining: 0,
            stuck_busy: false,
            locked: false,
            frame: None,
            fault: None,
            events: Vec::new(),
            violations: Vec::new(),
            erase_count: 0,
            program_count: 0,
            read_count: 0,
        }
    }

    /// Create an erased SST25VF016B
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Create a part with pre-filled data
    pub fn with_data(config: DummyConfig, initial_data: &[u8]) -> Self {
        let mut chip = Self::new(config);
        let len = core::cmp::min(initial_data.len(), chip.data.len());
        chip.data[..len].copy_from_slice(&initial_data[..len]);
        chip
    }

    /// Array contents
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable array contents, bypassing the command set
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// The configuration
    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    /// Bus events since creation or the last [`clear_events`](Self::clear_events)
    pub fn events(&self) -> &[BusEvent] {
        &self.events
    }

    /// Opcodes of all recorded commands, in order
    pub fn opcodes(&self) -> Vec<u8> {
        self.events
            .iter()
            .filter_map(|event| match event {
                BusEvent::Command { opcode, .. } => Some(*opcode),
                _ => None,
            })
            .collect()
    }

    /// Forget recorded events and reset the counters
    pub fn clear_events(&mut self) {
        self.events.clear();
        self.erase_count = 0;
        self.program_count = 0;
        self.read_count = 0;
    }

    /// Sequencing errors seen so far
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// Sector and chip erases executed
    pub fn erase_count(&self) -> usize {
        self.erase_count
    }

    /// Program commands executed (byte, page or AAI word)
    pub fn program_count(&self) -> usize {
        self.program_count
    }

    /// Array read commands executed
    pub fn read_count(&self) -> usize {
        self.read_count
    }

    /// Current status register value
    pub fn status(&self) -> StatusFlags {
        let mut status = StatusFlags::from_bits_retain(self.protection);
        status.set(StatusFlags::BUSY, self.stuck_busy || self.busy_remaining > 0);
        status.set(StatusFlags::WEL, self.write_enabled);
        status.set(StatusFlags::AAI, self.aai_address.is_some());
        status
    }

    /// Whether the bus is currently locked
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Make every status read report busy from now on
    pub fn set_stuck_busy(&mut self, stuck: bool) {
        self.stuck_busy = stuck;
    }

    /// Make the transport primitive `fault` fail after `after` successful uses
    pub fn inject_fault(&mut self, fault: TransportFault, after: u32) {
        self.fault = Some((fault, after));
    }

    fn check_fault(&mut self, kind: TransportFault) -> Result<()> {
        let Some((fault, after)) = self.fault else {
            return Ok(());
        };
        if fault != kind {
            return Ok(());
        }
        if after > 0 {
            self.fault = Some((fault, after - 1));
            return Ok(());
        }
        self.fault = None;
        log::trace!("dummy: injected {} fault", kind);
        Err(Error::Transport(kind))
    }

    fn is_busy(&self) -> bool {
        self.stuck_busy || self.busy_remaining > 0
    }

    fn start_busy(&mut self) {
        self.busy_remaining = self.config.busy_polls;
    }

    /// Shift one byte in, return the byte shifted out
    fn shift(&mut self, byte: u8) -> Result<u8> {
        let frame = self
            .frame
            .as_mut()
            .ok_or(Error::Transport(TransportFault::Send))?;
        frame.push(byte);
        let n = frame.len();
        let opcode = frame[0];
        let base = frame
            .get(1..4)
            .map(|a| decode_address([a[0], a[1], a[2]]))
            .unwrap_or(0);

        let reply = match opcode {
            opcodes::RDSR if n >= 2 => {
                let status = self.status().bits();
                // Each status read counts down the remaining busy time
                if n == 2 && self.busy_remaining > 0 {
                    self.busy_remaining -= 1;
                }
                status
            }
            opcodes::RDID => match n {
                2 => self.config.manufacturer_id,
                3 => self.config.memory_type,
                4 => self.config.capacity,
                _ => 0xFF,
            },
            opcodes::READ if n > 4 => self.read_byte(base, n - 5),
            opcodes::FAST_READ if n > 5 => self.read_byte(base, n - 6),
            _ => 0xFF,
        };
        Ok(reply)
    }

    fn read_byte(&self, base: u32, offset: usize) -> u8 {
        self.data[(base as usize + offset) % self.data.len()]
    }

    fn program_byte(&mut self, addr: u32, value: u8) {
        let index = addr as usize % self.data.len();
        let current = self.data[index];
        if current & value != value {
            self.violations.push(Violation::ProgramOverData(addr));
        }
        self.data[index] = current & value;
    }

    /// Execute the frame that just ended
    fn execute(&mut self, frame: Vec<u8>) {
        let Some(&opcode) = frame.first() else {
            return;
        };
        let address = match opcode {
            opcodes::READ | opcodes::FAST_READ | opcodes::PP | opcodes::SE_20 => {
                frame.get(1..4).map(|a| decode_address([a[0], a[1], a[2]]))
            }
            opcodes::AAI if frame.len() == 6 => Some(decode_address([frame[1], frame[2], frame[3]])),
            _ => None,
        };
        self.events.push(BusEvent::Command { opcode, address });
        log::trace!("dummy: cmd 0x{:02X} {:?} len {}", opcode, address, frame.len());

        if opcode == opcodes::RDSR {
            return;
        }
        if self.is_busy() {
            self.violations.push(Violation::CommandWhileBusy(opcode));
            return;
        }
        if self.aai_address.is_some() && !matches!(opcode, opcodes::AAI | opcodes::WRDI) {
            self.violations.push(Violation::CommandInAai(opcode));
            return;
        }

        match opcode {
            opcodes::RDID => {}
            opcodes::READ | opcodes::FAST_READ => self.read_count += 1,
            opcodes::WREN => self.write_enabled = true,
            opcodes::WRDI => {
                self.write_enabled = false;
                self.aai_address = None;
            }
            opcodes::EWSR => {
                self.ewsr_latched = true;
                return;
            }
            opcodes::WRSR => self.write_status(&frame),
            opcodes::PP => self.program(&frame, address),
            opcodes::AAI => self.program_aai(&frame, address),
            opcodes::SE_20 => self.erase_sector(address),
            opcodes::CE_C7 | opcodes::CE_60 => self.erase_chip(),
            _ => self.violations.push(Violation::UnknownOpcode(opcode)),
        }
        // EWSR only enables the command directly following it
        self.ewsr_latched = false;
    }

    /// Check the latch and protection for a program or erase
    fn may_modify(&mut self, opcode: u8) -> bool {
        if !self.write_enabled {
            self.violations.push(Violation::WriteNotEnabled(opcode));
            return false;
        }
        if StatusFlags::from_bits_retain(self.protection).is_protected() {
            self.violations.push(Violation::WriteProtected(opcode));
            self.write_enabled = false;
            return false;
        }
        true
    }

    fn write_status(&mut self, frame: &[u8]) {
        let Some(&value) = frame.get(1) else {
            self.violations.push(Violation::ShortFrame(opcodes::WRSR));
            return;
        };
        if !(self.ewsr_latched || self.write_enabled) {
            self.violations.push(Violation::WriteNotEnabled(opcodes::WRSR));
            return;
        }
        self.protection = value & (StatusFlags::BP_MASK | StatusFlags::BPL).bits();
        self.write_enabled = false;
    }

    fn program(&mut self, frame: &[u8], address: Option<u32>) {
        let (Some(addr), Some(data)) = (address, frame.get(4..)) else {
            self.violations.push(Violation::ShortFrame(opcodes::PP));
            return;
        };
        if data.is_empty() {
            self.violations.push(Violation::ShortFrame(opcodes::PP));
            return;
        }
        if !self.may_modify(opcodes::PP) {
            return;
        }

        match self.config.page_size {
            // Byte program: only the first data byte is used
            None => self.program_byte(addr, data[0]),
            // Page program: the address wraps inside the page
            Some(page_size) => {
                let page = addr & !(page_size as u32 - 1);
                let start = addr as usize & (page_size - 1);
                let data = &data[data.len().saturating_sub(page_size)..];
                for (i, &byte) in data.iter().enumerate() {
                    let offset = ((start + i) & (page_size - 1)) as u32;
                    self.program_byte(page + offset, byte);
                }
            }
        }
        self.program_count += 1;
        self.write_enabled = false;
        self.start_busy();
    }

    fn program_aai(&mut self, frame: &[u8], address: Option<u32>) {
        let (addr, word) = match (self.aai_address, address) {
            // First word: opcode, address, two data bytes
            (None, Some(addr)) if addr & 1 == 0 => {
                if !self.may_modify(opcodes::AAI) {
                    return;
                }
                (addr, [frame[4], frame[5]])
            }
            // Continuation: opcode and two data bytes
            (Some(addr), None) if frame.len() == 3 => (addr, [frame[1], frame[2]]),
            _ => {
                self.violations.push(Violation::BadAai);
                return;
            }
        };

        self.program_byte(addr, word[0]);
        self.program_byte(addr + 1, word[1]);
        self.aai_address = Some((addr + 2) % self.data.len() as u32);
        self.program_count += 1;
        self.start_busy();
    }

    fn erase_sector(&mut self, address: Option<u32>) {
        let Some(addr) = address else {
            self.violations.push(Violation::ShortFrame(opcodes::SE_20));
            return;
        };
        if !self.may_modify(opcodes::SE_20) {
            return;
        }
        let size = self.config.erase_size;
        let start = (addr as usize % self.data.len()) & !(size - 1);
        self.data[start..start + size].fill(opcodes::ERASED_STATE);
        self.erase_count += 1;
        self.write_enabled = false;
        self.start_busy();
    }

    fn erase_chip(&mut self) {
        if !self.may_modify(opcodes::CE_C7) {
            return;
        }
        self.data.fill(opcodes::ERASED_STATE);
        self.erase_count += 1;
        self.write_enabled = false;
        self.start_busy();
    }
}

fn decode_address(bytes: [u8; address::ADDRESS_BYTES]) -> u32 {
    u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]])
}

#[cfg(feature = "alloc")]
impl SpiBus for DummyChip {
    fn lock(&mut self, exclusive: bool) -> Result<()> {
        self.check_fault(TransportFault::Lock)?;
        if exclusive == self.locked {
            // Nested lock or unlock without lock
            return Err(Error::Transport(TransportFault::Lock));
        }
        self.locked = exclusive;
        self.events.push(if exclusive {
            BusEvent::Lock
        } else {
            BusEvent::Unlock
        });
        Ok(())
    }

    fn configure(&mut self, config: &BusConfig) -> Result<()> {
        self.check_fault(TransportFault::Configure)?;
        self.events.push(BusEvent::Configure(*config));
        Ok(())
    }

    fn select(&mut self, cs: ChipSelect, asserted: bool) -> Result<()> {
        self.check_fault(TransportFault::Select)?;
        if cs != self.config.chip_select {
            return Ok(());
        }
        if asserted {
            if !self.locked {
                self.violations.push(Violation::NotLocked);
            }
            self.frame = Some(Vec::new());
        } else if let Some(frame) = self.frame.take() {
            self.execute(frame);
        }
        Ok(())
    }

    fn send_byte(&mut self, byte: u8) -> Result<u8> {
        self.check_fault(TransportFault::Send)?;
        self.shift(byte)
    }

    fn send_block(&mut self, data: &[u8]) -> Result<()> {
        self.check_fault(TransportFault::Send)?;
        for &byte in data {
            self.shift(byte)?;
        }
        Ok(())
    }

    fn receive_block(&mut self, buf: &mut [u8]) -> Result<()> {
        self.check_fault(TransportFault::Receive)?;
        for byte in buf.iter_mut() {
            *byte = self.shift(opcodes::FILLER)?;
        }
        Ok(())
    }
}
