//! # Debug console logging
//!
//! A [`log::Log`] sink that writes every record, one byte at a time, to a
//! debug console I/O port. Under QEMU that is port `0x402`, captured on the
//! host with `-debugcon stdio` or `-debugcon file:debug.log`; on real
//! hardware the port is normally unused and writes are dropped.
//!
//! Records are formatted as `[LEVEL] target: message\n` without allocating.
//!
//! ## Features
//! * `enabled` (default): port output is compiled in. Without it the logger
//!   still installs and filters but never touches a port.
//!
//! ## Usage
//! ```rust,ignore
//! use kernel_debugcon::{DEFAULT_DEBUG_PORT, DebugconLogger};
//! use kernel_ports::X86Ports;
//! use log::LevelFilter;
//!
//! static LOGGER: DebugconLogger<X86Ports> =
//!     DebugconLogger::new(unsafe { X86Ports::new() }, DEFAULT_DEBUG_PORT, LevelFilter::Debug);
//!
//! LOGGER.install().expect("logger installed once");
//! log::info!("phy_alloc ready");
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

mod sink;

pub use sink::PortSink;

use kernel_ports::PortIo;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

/// QEMU's debug console port.
pub const DEFAULT_DEBUG_PORT: u16 = 0x402;

pub struct DebugconLogger<P> {
    ports: P,
    port: u16,
    max_level: LevelFilter,
}

impl<P> DebugconLogger<P>
where
    P: PortIo,
{
    #[must_use]
    pub const fn new(ports: P, port: u16, max_level: LevelFilter) -> Self {
        Self {
            ports,
            port,
            max_level,
        }
    }

    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub const fn max_level(&self) -> LevelFilter {
        self.max_level
    }

    /// Registers this logger with the `log` facade. Call once during init.
    ///
    /// # Errors
    /// Another logger has already been installed.
    pub fn install(&'static self) -> Result<(), SetLoggerError>
    where
        P: Sync + Send,
    {
        log::set_logger(self)?;
        log::set_max_level(self.max_level);
        Ok(())
    }

    #[cfg(feature = "enabled")]
    fn emit(&self, record: &Record) {
        use core::fmt::Write;
        let mut sink = PortSink::new(&self.ports, self.port);
        // Best effort; there is nowhere to report a failed debug write.
        let _ = writeln!(
            sink,
            "[{}] {}: {}",
            record.level(),
            record.target(),
            record.args()
        );
    }

    #[cfg(not(feature = "enabled"))]
    #[allow(clippy::unused_self)]
    const fn emit(&self, _: &Record) {}
}

impl<P> Log for DebugconLogger<P>
where
    P: PortIo + Sync + Send,
{
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            self.emit(record);
        }
    }

    fn flush(&self) {}
}
