use crate::mmap::{self, CachePolicy, MmapError, MmapRequest, PageRemapper};
use crate::{DispatchLock, Dispatcher, DriverConfig};
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use kernel_phys_buffers::{AllocationTracker, PageAllocator};
use kernel_ports::{Delay, PortIo, RegisterBridge, SmiTrap};
use kernel_uaccess::{UserMemory, UserPtr};
use log::{debug, info, warn};
use phy_alloc_abi::{IoctlNumber, Status};

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum DeviceError {
    #[error("device is busy")]
    Busy,
}

impl DeviceError {
    #[must_use]
    pub const fn status(self) -> Status {
        match self {
            Self::Busy => Status::DeviceBusy,
        }
    }
}

/// An open handle on the device that issued it.
///
/// Dropping the session closes it; [`PhyAllocDevice::release`] does the same
/// explicitly. Only the issuing device's count is ever touched, so a session
/// handed to the wrong device cannot unbalance either one.
#[derive(Debug)]
#[must_use = "dropping a session closes it"]
pub struct Session<'dev> {
    open: &'dev AtomicUsize,
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        let left = self.open.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        debug!("release, {left} session(s)");
    }
}

struct DriverState<A, P, T, D> {
    tracker: AllocationTracker<A>,
    bridge: RegisterBridge<P, T, D>,
}

/// The `phy_alloc` character device.
///
/// Owns the tracker and the register bridge behind one [`DispatchLock`] so
/// that at most one command runs at a time, and counts open sessions so
/// that teardown can be refused while user space still holds the device.
pub struct PhyAllocDevice<A, P, T, D> {
    config: DriverConfig,
    state: DispatchLock<DriverState<A, P, T, D>>,
    sessions: AtomicUsize,
    closing: AtomicBool,
}

impl<A, P, T, D> PhyAllocDevice<A, P, T, D>
where
    A: PageAllocator,
    P: PortIo,
    T: SmiTrap,
    D: Delay,
{
    /// The page size always comes from `pages`; a differing
    /// [`DriverConfig::page_size`] is overridden so that buffer orders and
    /// mmap offsets agree.
    pub fn new(mut config: DriverConfig, pages: A, ports: P, trap: T, delay: D) -> Self {
        let page_size = pages.page_size();
        if config.page_size != page_size {
            warn!(
                "configured page size {:#x} differs from the allocator's {page_size:#x}; using the latter",
                config.page_size
            );
            config.page_size = page_size;
        }
        info!(
            "{} ready, protocol {:#x}",
            phy_alloc_abi::DEVICE_NAME,
            phy_alloc_abi::DRIVER_VERSION
        );
        Self {
            config,
            state: DispatchLock::new(DriverState {
                tracker: AllocationTracker::new(pages),
                bridge: RegisterBridge::new(ports, trap, delay, config.smi_settle),
            }),
            sessions: AtomicUsize::new(0),
            closing: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Number of currently open sessions.
    #[must_use]
    pub fn sessions(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }

    /// Opens a session.
    ///
    /// # Errors
    /// [`DeviceError::Busy`] once teardown has started.
    pub fn open(&self) -> Result<Session<'_>, DeviceError> {
        let open = self.sessions.fetch_add(1, Ordering::SeqCst) + 1;
        if self.closing.load(Ordering::SeqCst) {
            self.sessions.fetch_sub(1, Ordering::SeqCst);
            warn!("open refused, device is going away");
            return Err(DeviceError::Busy);
        }
        debug!("open, {open} session(s)");
        Ok(Session {
            open: &self.sessions,
        })
    }

    /// Closes `session` on whichever device issued it.
    pub fn release(&self, session: Session<'_>) {
        if !self.issued(&session) {
            warn!("releasing a session of another device");
        }
        drop(session);
    }

    fn issued(&self, session: &Session<'_>) -> bool {
        core::ptr::eq(session.open, &self.sessions)
    }

    /// Runs the raw command number `cmd` under the dispatch lock.
    ///
    /// A session opened on another device gets [`Status::NotAllocated`].
    pub fn ioctl(&self, session: &Session<'_>, cmd: u32, arg: UserPtr, user: &impl UserMemory) -> i32 {
        if !self.issued(session) {
            warn!("ioctl {cmd:#010x} on a foreign session");
            return Status::NotAllocated.into();
        }
        let mut guard = self.state.lock();
        debug!("ioctl {cmd:#010x}, ticket {}", guard.ticket());
        let DriverState { tracker, bridge } = &mut *guard;
        Dispatcher::new(tracker, bridge)
            .dispatch(IoctlNumber::from_bits(cmd), arg, user)
            .into()
    }

    /// Maps physical memory into the caller; see [`mmap::map_physical`].
    ///
    /// # Errors
    /// Invalid range, failed remap, or a session of another device
    /// ([`MmapError::InvalidArgument`]).
    pub fn mmap(
        &self,
        session: &Session<'_>,
        request: &MmapRequest,
        remapper: &mut impl PageRemapper,
    ) -> Result<CachePolicy, MmapError> {
        if !self.issued(session) {
            warn!("mmap on a foreign session");
            return Err(MmapError::InvalidArgument);
        }
        mmap::map_physical(&self.config, request, remapper)
    }

    /// Number of live buffers.
    #[must_use]
    pub fn allocated_quantity(&self) -> usize {
        self.state.lock().tracker.count()
    }

    /// Frees every buffer ahead of unloading and returns how many there were.
    ///
    /// Once this succeeds, further [`open`](Self::open) calls are refused.
    ///
    /// # Errors
    /// [`DeviceError::Busy`] while any session is open; nothing is freed.
    pub fn teardown(&self) -> Result<usize, DeviceError> {
        let mut guard = self.state.lock();
        self.closing.store(true, Ordering::SeqCst);
        let open = self.sessions.load(Ordering::SeqCst);
        if open != 0 {
            self.closing.store(false, Ordering::SeqCst);
            warn!("teardown refused, {open} session(s) open");
            return Err(DeviceError::Busy);
        }
        let released = guard.tracker.release_all();
        info!("{} torn down, {released} buffer(s) released", phy_alloc_abi::DEVICE_NAME);
        Ok(released)
    }
}
