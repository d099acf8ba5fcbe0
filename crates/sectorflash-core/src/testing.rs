//! Recording transport for unit tests
//!
//! Captures every select..deselect frame as the bytes shifted out, answers
//! status reads from a script, and can be told to fail a primitive.

use alloc::vec::Vec;

use crate::error::{Error, Result, TransportFault};
use crate::spi::{opcodes, BusConfig, ChipSelect, SpiBus};

#[derive(Default)]
pub(crate) struct RecordingBus {
    /// Bytes shifted out, one entry per select..deselect frame
    pub frames: Vec<Vec<u8>>,
    /// Sequence of lock(true)/lock(false) calls
    pub locks: Vec<bool>,
    /// Configurations applied
    pub configs: Vec<BusConfig>,
    /// Number of upcoming status reads that report busy
    pub busy_polls: u32,
    /// Report busy on every status read once this many frames are recorded
    pub busy_from_frame: Option<usize>,
    /// Status bits reported when not busy
    pub idle_status: u8,
    /// Bytes returned for JEDEC ID reads
    pub jedec_id: [u8; 3],
    /// Primitive that fails on its next use
    pub fail: Option<TransportFault>,
    current: Option<Vec<u8>>,
}

impl RecordingBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opcodes of all frames, in order
    pub fn opcodes(&self) -> Vec<u8> {
        self.frames.iter().filter_map(|f| f.first().copied()).collect()
    }

    /// Frames other than status reads
    pub fn commands(&self) -> Vec<Vec<u8>> {
        self.frames
            .iter()
            .filter(|f| f.first() != Some(&opcodes::RDSR))
            .cloned()
            .collect()
    }

    fn check(&mut self, fault: TransportFault) -> Result<()> {
        if self.fail == Some(fault) {
            self.fail = None;
            return Err(Error::Transport(fault));
        }
        Ok(())
    }
}

impl SpiBus for RecordingBus {
    fn lock(&mut self, exclusive: bool) -> Result<()> {
        self.check(TransportFault::Lock)?;
        self.locks.push(exclusive);
        Ok(())
    }

    fn configure(&mut self, config: &BusConfig) -> Result<()> {
        self.check(TransportFault::Configure)?;
        self.configs.push(*config);
        Ok(())
    }

    fn select(&mut self, _cs: ChipSelect, asserted: bool) -> Result<()> {
        self.check(TransportFault::Select)?;
        if asserted {
            self.current = Some(Vec::new());
        } else if let Some(frame) = self.current.take() {
            self.frames.push(frame);
        }
        Ok(())
    }

    fn send_byte(&mut self, byte: u8) -> Result<u8> {
        self.check(TransportFault::Send)?;
        let stuck = self
            .busy_from_frame
            .is_some_and(|n| self.frames.len() >= n);
        let frame = self.current.get_or_insert_with(Vec::new);
        frame.push(byte);
        let reply = match (frame[0], frame.len()) {
            (opcodes::RDSR, 2) => {
                if stuck {
                    self.idle_status | opcodes::StatusFlags::BUSY.bits()
                } else if self.busy_polls > 0 {
                    self.busy_polls -= 1;
                    self.idle_status | opcodes::StatusFlags::BUSY.bits()
                } else {
                    self.idle_status
                }
            }
            (opcodes::RDID, n @ 2..=4) => self.jedec_id[n - 2],
            _ => 0xFF,
        };
        Ok(reply)
    }

    fn send_block(&mut self, data: &[u8]) -> Result<()> {
        self.check(TransportFault::Send)?;
        self.current
            .get_or_insert_with(Vec::new)
            .extend_from_slice(data);
        Ok(())
    }

    fn receive_block(&mut self, buf: &mut [u8]) -> Result<()> {
        self.check(TransportFault::Receive)?;
        buf.fill(opcodes::ERASED_STATE);
        Ok(())
    }
}
