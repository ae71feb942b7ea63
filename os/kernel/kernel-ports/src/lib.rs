//! # Register bridge
//!
//! Raw hardware access that user space cannot perform on its own:
//!
//! * sized (1/2/4/8-byte) port-mapped reads and writes, and
//! * the legacy System Management Interrupt call sequence: load six general
//!   purpose registers, trap into firmware, wait for the handler to settle,
//!   and hand the post-trap registers back.
//!
//! The architecture-specific parts sit behind three narrow traits so that
//! [`RegisterBridge`] itself stays architecture-neutral:
//!
//! | Trait | Kernel implementation | Purpose |
//! |-------|-----------------------|---------|
//! | [`PortIo`] | [`X86Ports`] | `in`/`out` of 8, 16 and 32 bits |
//! | [`SmiTrap`] | [`X86Smi`] | six registers in, trap, six registers out |
//! | [`Delay`] | [`TscDelay`] | blocking settle delay after the trap |
//!
//! The `host` feature adds [`LoopbackPorts`], [`RecordingSmi`] and
//! [`RecordingDelay`] for tests that run without hardware.
//!
//! ## Example
//! ```rust,ignore
//! use core::time::Duration;
//! use kernel_ports::{IoWidth, LoopbackPorts, RecordingDelay, RecordingSmi, RegisterBridge};
//!
//! let bridge = RegisterBridge::new(
//!     LoopbackPorts::new(),
//!     RecordingSmi::echo(),
//!     RecordingDelay::default(),
//!     Duration::from_millis(500),
//! );
//! bridge.write(0x80, IoWidth::Qword, 0x1122_3344_5566_7788);
//! assert_eq!(bridge.read(0x80, IoWidth::Qword), 0x1122_3344_5566_7788);
//! ```

#![cfg_attr(not(any(test, doctest, feature = "host")), no_std)]
#![allow(unsafe_code)]

mod bridge;
mod delay;
#[cfg(any(test, feature = "host"))]
mod loopback;
mod smi;
#[cfg(target_arch = "x86_64")]
mod x86;

pub use bridge::RegisterBridge;
pub use delay::Delay;
#[cfg(target_arch = "x86_64")]
pub use delay::TscDelay;
#[cfg(any(test, feature = "host"))]
pub use loopback::{LoopbackPorts, RecordingDelay, RecordingSmi};
pub use smi::{SmiRegisters, SmiTrap};
#[cfg(target_arch = "x86_64")]
pub use x86::{X86Ports, X86Smi};

/// Access to the 16-bit I/O port address space.
///
/// Implementations are expected to be obtained through an `unsafe`
/// constructor that establishes the privilege to touch ports at all; the
/// accessors themselves are safe to call.
pub trait PortIo {
    fn read_u8(&self, port: u16) -> u8;
    fn read_u16(&self, port: u16) -> u16;
    fn read_u32(&self, port: u16) -> u32;
    fn write_u8(&self, port: u16, value: u8);
    fn write_u16(&self, port: u16, value: u16);
    fn write_u32(&self, port: u16, value: u32);
}

impl<T> PortIo for &T
where
    T: PortIo + ?Sized,
{
    fn read_u8(&self, port: u16) -> u8 {
        (**self).read_u8(port)
    }

    fn read_u16(&self, port: u16) -> u16 {
        (**self).read_u16(port)
    }

    fn read_u32(&self, port: u16) -> u32 {
        (**self).read_u32(port)
    }

    fn write_u8(&self, port: u16, value: u8) {
        (**self).write_u8(port, value);
    }

    fn write_u16(&self, port: u16, value: u16) {
        (**self).write_u16(port, value);
    }

    fn write_u32(&self, port: u16, value: u32) {
        (**self).write_u32(port, value);
    }
}

/// Width of a port transfer.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum IoWidth {
    Byte = 1,
    Word = 2,
    Dword = 4,
    /// Two 32-bit transfers at `port` (low half) and `port + 4` (high half).
    Qword = 8,
}

impl IoWidth {
    /// Returns `None` for every byte count other than 1, 2, 4 and 8.
    #[must_use]
    pub const fn from_bytes(bytes: u8) -> Option<Self> {
        match bytes {
            1 => Some(Self::Byte),
            2 => Some(Self::Word),
            4 => Some(Self::Dword),
            8 => Some(Self::Qword),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn bytes(self) -> u8 {
        self as u8
    }
}
