//! # `phy_alloc` device ABI
//!
//! The contract shared between the in-kernel `phy_alloc` service and the
//! user-space firmware update utility that drives it:
//!
//! * [`Opcode`] and the raw [`IoctlNumber`] each opcode is issued under,
//! * the signed [`Status`] codes every command returns,
//! * the fixed, packed payload layouts ([`AllocPayload`], [`SmiPayload`],
//!   [`IoPayload`]) that are copied across the privilege boundary.
//!
//! Payloads are encoded explicitly as little-endian byte arrays instead of
//! being transmuted, so both sides agree on the layout independent of the
//! compiler's struct layout:
//!
//! ```rust
//! # use phy_alloc_abi::*;
//! let request = AllocPayload { size: 0x2000, ..AllocPayload::default() };
//! let bytes = request.encode();
//! assert_eq!(bytes.len(), AllocPayload::SIZE);
//! assert_eq!(AllocPayload::decode(&bytes), request);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

mod ioctl;
mod payload;
mod status;

pub use ioctl::{IoctlDirection, IoctlNumber, Opcode};
pub use payload::{AllocPayload, IoMode, IoPayload, SmiPayload, U32Payload};
pub use status::Status;

/// Name of the device node.
pub const DEVICE_NAME: &str = "phy_alloc";

/// Path user space opens to reach the device.
pub const DEVICE_PATH: &str = "/dev/phy_alloc";

/// Major number of the device; doubles as the ioctl type byte.
pub const DEVICE_MAJOR: u8 = 100;

/// Protocol version reported by [`Opcode::ReadVersion`].
pub const DRIVER_VERSION: u32 = 0x0000_0008;
