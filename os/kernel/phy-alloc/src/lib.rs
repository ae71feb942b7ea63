//! # `phy_alloc`
//!
//! The privileged half of a firmware update utility. User space opens the
//! device and issues one of eight commands (see [`phy_alloc_abi::Opcode`])
//! to
//!
//! * reserve physically contiguous buffers, fill them, read them back and
//!   release them again, and
//! * perform sized port I/O and raise System Management Interrupts.
//!
//! ## Architecture
//!
//! ```text
//! ioctl(cmd, arg)
//!     ↓  Session (bound to its device)
//! PhyAllocDevice ── DispatchLock (ticket order) ──► Dispatcher
//!                                                     ├─► AllocationTracker  (kernel-phys-buffers)
//!                                                     └─► RegisterBridge     (kernel-ports)
//!     ↑  Status (0, -1 … -7)
//! ```
//!
//! * **Sessions**: [`PhyAllocDevice::open`] hands out a [`Session`] that
//!   closes itself on drop. While any session is open,
//!   [`PhyAllocDevice::teardown`] refuses to free the buffers.
//! * **Serialization**: every command, SMI settle delay included, runs under
//!   one [`DispatchLock`]; waiting sessions are served in arrival order.
//! * **Status codes**: [`Dispatcher::dispatch`] decodes the command number and
//!   is the single place a failure becomes a [`Status`](phy_alloc_abi::Status).
//! * **Mapping**: [`mmap::map_physical`] maps arbitrary physical frames,
//!   uncached for synchronous files and for ranges past installed RAM.
//!
//! ## Configuration
//!
//! [`DriverConfig`] carries the load-time parameters: SMI settle time, debug
//! console port, log level and top of RAM. The page size is taken from the
//! page allocator so that buffer orders and mmap offsets always agree.
//!
//! ## Testing
//!
//! Payloads cross the privilege boundary only through a
//! [`UserMemory`](kernel_uaccess::UserMemory) implementation. The `host`
//! feature builds every collaborator against std
//! ([`HostPhyAllocDevice`]) so the whole device can be driven from tests.

#![cfg_attr(not(any(test, doctest, feature = "host")), no_std)]
#![allow(unsafe_code)]

mod config;
mod device;
mod dispatch;
mod lock;
pub mod mmap;

pub use config::DriverConfig;
pub use device::{DeviceError, PhyAllocDevice, Session};
pub use dispatch::{DispatchError, Dispatcher};
pub use lock::{DispatchGuard, DispatchLock};

/// The device as composed on x86-64 hardware.
#[cfg(target_arch = "x86_64")]
pub type X86PhyAllocDevice<A> =
    PhyAllocDevice<A, kernel_ports::X86Ports, kernel_ports::X86Smi, kernel_ports::TscDelay>;

/// The device built from host stand-ins, for tests.
#[cfg(any(test, feature = "host"))]
pub type HostPhyAllocDevice = PhyAllocDevice<
    kernel_phys_buffers::HostPageAllocator,
    kernel_ports::LoopbackPorts,
    kernel_ports::RecordingSmi,
    kernel_ports::RecordingDelay,
>;
