use core::time::Duration;
use kernel_debugcon::{DEFAULT_DEBUG_PORT, DebugconLogger};
use kernel_ports::PortIo;
use log::LevelFilter;

/// Load-time parameters of the service.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DriverConfig {
    /// Base page size of the host; a power of two. The device replaces it
    /// with its page allocator's page size.
    pub page_size: u64,
    /// How long the caller is blocked after every SMI trap.
    pub smi_settle: Duration,
    /// Debug console port the logger writes to.
    pub debug_port: u16,
    pub log_level: LevelFilter,
    /// First physical address past installed RAM. Mappings at or above it
    /// are uncached.
    pub top_of_ram: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl DriverConfig {
    pub const DEFAULT_SMI_SETTLE: Duration = Duration::from_millis(500);

    #[must_use]
    pub const fn new() -> Self {
        Self {
            page_size: kernel_phys_buffers::PAGE_SIZE,
            smi_settle: Self::DEFAULT_SMI_SETTLE,
            debug_port: DEFAULT_DEBUG_PORT,
            log_level: LevelFilter::Info,
            top_of_ram: u64::MAX,
        }
    }

    #[must_use]
    pub const fn with_smi_settle(mut self, settle: Duration) -> Self {
        self.smi_settle = settle;
        self
    }

    #[must_use]
    pub const fn with_top_of_ram(mut self, top_of_ram: u64) -> Self {
        self.top_of_ram = top_of_ram;
        self
    }

    #[must_use]
    pub const fn with_log_level(mut self, level: LevelFilter) -> Self {
        self.log_level = level;
        self
    }

    /// # Panics
    /// `page_size` is not a power of two.
    #[must_use]
    pub const fn with_page_size(mut self, page_size: u64) -> Self {
        assert!(page_size.is_power_of_two(), "page size must be a power of two");
        self.page_size = page_size;
        self
    }

    /// `log2(page_size)`.
    #[must_use]
    pub const fn page_shift(&self) -> u32 {
        self.page_size.trailing_zeros()
    }

    /// A debug console logger for [`debug_port`](Self::debug_port) at
    /// [`log_level`](Self::log_level); install it with
    /// [`DebugconLogger::install`].
    pub const fn logger<P>(&self, ports: P) -> DebugconLogger<P>
    where
        P: PortIo,
    {
        DebugconLogger::new(ports, self.debug_port, self.log_level)
    }
}
