use core::fmt::{self, Write};
use kernel_ports::PortIo;

/// [`fmt::Write`] onto a single output port, one byte per character byte.
pub struct PortSink<'a, P> {
    ports: &'a P,
    port: u16,
}

impl<'a, P> PortSink<'a, P>
where
    P: PortIo,
{
    #[must_use]
    pub const fn new(ports: &'a P, port: u16) -> Self {
        Self { ports, port }
    }
}

impl<P> Write for PortSink<'_, P>
where
    P: PortIo,
{
    #[inline]
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for b in s.bytes() {
            self.ports.write_u8(self.port, b);
        }
        Ok(())
    }
}
