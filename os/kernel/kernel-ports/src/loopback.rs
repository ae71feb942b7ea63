//! Hardware-free stand-ins for running the bridge on a host.

use crate::{Delay, PortIo, SmiRegisters, SmiTrap};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::time::Duration;

/// A byte-addressed port bus that returns whatever was last written.
///
/// Multi-byte accesses are little-endian over consecutive port numbers.
/// Ports never written read as zero.
#[derive(Debug, Default)]
pub struct LoopbackPorts {
    bytes: RefCell<BTreeMap<u16, u8>>,
}

impl LoopbackPorts {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ports that have been written at least once, with their current byte.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(u16, u8)> {
        self.bytes.borrow().iter().map(|(&p, &v)| (p, v)).collect()
    }

    fn load<const N: usize>(&self, port: u16) -> [u8; N] {
        let bytes = self.bytes.borrow();
        let mut out = [0u8; N];
        for (i, b) in (0u16..).zip(out.iter_mut()) {
            *b = bytes.get(&port.wrapping_add(i)).copied().unwrap_or(0);
        }
        out
    }

    fn store(&self, port: u16, value: &[u8]) {
        let mut bytes = self.bytes.borrow_mut();
        for (i, &b) in (0u16..).zip(value) {
            bytes.insert(port.wrapping_add(i), b);
        }
    }
}

impl PortIo for LoopbackPorts {
    fn read_u8(&self, port: u16) -> u8 {
        u8::from_le_bytes(self.load(port))
    }

    fn read_u16(&self, port: u16) -> u16 {
        u16::from_le_bytes(self.load(port))
    }

    fn read_u32(&self, port: u16) -> u32 {
        u32::from_le_bytes(self.load(port))
    }

    fn write_u8(&self, port: u16, value: u8) {
        self.store(port, &[value]);
    }

    fn write_u16(&self, port: u16, value: u16) {
        self.store(port, &value.to_le_bytes());
    }

    fn write_u32(&self, port: u16, value: u32) {
        self.store(port, &value.to_le_bytes());
    }
}

/// An SMI trap that records its inputs and answers with a fixed function.
#[derive(Debug)]
pub struct RecordingSmi {
    handler: fn(SmiRegisters) -> SmiRegisters,
    calls: RefCell<Vec<SmiRegisters>>,
}

impl RecordingSmi {
    /// Returns the registers unchanged.
    #[must_use]
    pub fn echo() -> Self {
        Self::with_handler(|regs| regs)
    }

    /// Answers every trap with `handler(registers)`.
    #[must_use]
    pub fn with_handler(handler: fn(SmiRegisters) -> SmiRegisters) -> Self {
        Self {
            handler,
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Register files passed in, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<SmiRegisters> {
        self.calls.borrow().clone()
    }
}

impl SmiTrap for RecordingSmi {
    fn trap(&self, registers: SmiRegisters) -> SmiRegisters {
        self.calls.borrow_mut().push(registers);
        (self.handler)(registers)
    }
}

/// A delay that returns immediately and remembers what it was asked to wait.
#[derive(Debug, Default)]
pub struct RecordingDelay {
    waits: RefCell<Vec<Duration>>,
}

impl RecordingDelay {
    #[must_use]
    pub fn waits(&self) -> Vec<Duration> {
        self.waits.borrow().clone()
    }
}

impl Delay for RecordingDelay {
    fn delay(&self, duration: Duration) {
        self.waits.borrow_mut().push(duration);
    }
}
