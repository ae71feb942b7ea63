use crate::{Delay, IoWidth, PortIo, SmiRegisters, SmiTrap};
use core::time::Duration;
use log::{debug, trace};

/// Sized port I/O and the SMI call sequence over pluggable platform primitives.
///
/// The bridge holds no state beyond its collaborators and is shared by
/// reference; serialization is the caller's concern.
pub struct RegisterBridge<P, T, D> {
    ports: P,
    trap: T,
    delay: D,
    settle: Duration,
}

impl<P, T, D> RegisterBridge<P, T, D>
where
    P: PortIo,
    T: SmiTrap,
    D: Delay,
{
    /// Creates a bridge that waits `settle` after every SMI trap.
    pub const fn new(ports: P, trap: T, delay: D, settle: Duration) -> Self {
        Self {
            ports,
            trap,
            delay,
            settle,
        }
    }

    #[must_use]
    pub const fn settle(&self) -> Duration {
        self.settle
    }

    pub const fn ports(&self) -> &P {
        &self.ports
    }

    pub const fn trap(&self) -> &T {
        &self.trap
    }

    pub const fn delay(&self) -> &D {
        &self.delay
    }

    /// Port input of `width`. A quad word is two double word reads,
    /// low half at `port` and high half at `port + 4`.
    pub fn read(&self, port: u16, width: IoWidth) -> u64 {
        let value = match width {
            IoWidth::Byte => u64::from(self.ports.read_u8(port)),
            IoWidth::Word => u64::from(self.ports.read_u16(port)),
            IoWidth::Dword => u64::from(self.ports.read_u32(port)),
            IoWidth::Qword => {
                let lo = self.ports.read_u32(port);
                let hi = self.ports.read_u32(port.wrapping_add(4));
                (u64::from(hi) << 32) | u64::from(lo)
            }
        };
        trace!("in  {port:#06x}/{} -> {value:#x}", width.bytes());
        value
    }

    /// Port output of `width`; `value` is truncated to the width.
    #[allow(clippy::cast_possible_truncation)]
    pub fn write(&self, port: u16, width: IoWidth, value: u64) {
        trace!("out {port:#06x}/{} <- {value:#x}", width.bytes());
        match width {
            IoWidth::Byte => self.ports.write_u8(port, value as u8),
            IoWidth::Word => self.ports.write_u16(port, value as u16),
            IoWidth::Dword => self.ports.write_u32(port, value as u32),
            IoWidth::Qword => {
                self.ports.write_u32(port, value as u32);
                self.ports.write_u32(port.wrapping_add(4), (value >> 32) as u32);
            }
        }
    }

    /// Reads `width` bytes from `port` into `value`.
    ///
    /// Widths other than 1, 2, 4 and 8 are ignored and leave `value` untouched.
    pub fn port_read(&self, port: u16, width: u8, value: &mut u64) {
        match IoWidth::from_bytes(width) {
            Some(width) => *value = self.read(port, width),
            None => trace!("in  {port:#06x}: unsupported width {width}, ignored"),
        }
    }

    /// Writes the low `width` bytes of `value` to `port`.
    ///
    /// Widths other than 1, 2, 4 and 8 are ignored.
    pub fn port_write(&self, port: u16, width: u8, value: u64) {
        match IoWidth::from_bytes(width) {
            Some(width) => self.write(port, width, value),
            None => trace!("out {port:#06x}: unsupported width {width}, ignored"),
        }
    }

    /// Loads the registers, raises the SMI and blocks for the settle delay.
    ///
    /// Always completes; whatever the firmware handler did is reflected only
    /// in the returned registers.
    pub fn invoke_smi(&self, registers: SmiRegisters) -> SmiRegisters {
        debug!("SMI in:  {registers:?}");
        let out = self.trap.trap(registers);
        self.delay.delay(self.settle);
        debug!("SMI out: {out:?}");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LoopbackPorts, RecordingDelay, RecordingSmi};

    fn bridge() -> RegisterBridge<LoopbackPorts, RecordingSmi, RecordingDelay> {
        RegisterBridge::new(
            LoopbackPorts::new(),
            RecordingSmi::echo(),
            RecordingDelay::default(),
            Duration::from_millis(500),
        )
    }

    #[test]
    fn write_then_read_at_every_width() {
        let bridge = bridge();
        for (width, value) in [
            (1, 0xA5),
            (2, 0xBEEF),
            (4, 0xDEAD_BEEF),
            (8, 0x0123_4567_89AB_CDEF),
        ] {
            let port = 0x300 + u16::from(width) * 0x10;
            bridge.port_write(port, width, value);
            let mut read = 0;
            bridge.port_read(port, width, &mut read);
            assert_eq!(read, value, "width {width}");
        }
    }

    #[test]
    fn narrow_writes_truncate() {
        let bridge = bridge();
        bridge.write(0x70, IoWidth::Byte, 0x1234);
        assert_eq!(bridge.read(0x70, IoWidth::Byte), 0x34);
        assert_eq!(bridge.read(0x71, IoWidth::Byte), 0);
    }

    #[test]
    fn qword_is_split_across_port_and_port_plus_four() {
        let bridge = bridge();
        bridge.write(0xCF8, IoWidth::Qword, 0xAAAA_BBBB_CCCC_DDDD);
        assert_eq!(bridge.read(0xCF8, IoWidth::Dword), 0xCCCC_DDDD);
        assert_eq!(bridge.read(0xCFC, IoWidth::Dword), 0xAAAA_BBBB);
    }

    #[test]
    fn unsupported_width_is_ignored() {
        let bridge = bridge();
        bridge.port_write(0x80, 3, 0xFFFF_FFFF);
        assert_eq!(bridge.read(0x80, IoWidth::Dword), 0);

        let mut value = 0x55;
        bridge.port_read(0x80, 0, &mut value);
        assert_eq!(value, 0x55);
        bridge.port_read(0x80, 16, &mut value);
        assert_eq!(value, 0x55);
    }

    #[test]
    fn smi_waits_for_settle_after_trap() {
        let bridge = bridge();
        let regs = SmiRegisters {
            eax: 0xEF,
            edx: 0xB2,
            ..SmiRegisters::default()
        };
        let out = bridge.invoke_smi(regs);
        assert_eq!(out, regs);
        assert_eq!(bridge.trap().calls(), [regs]);
        assert_eq!(bridge.delay().waits(), [Duration::from_millis(500)]);
    }
}
