//! # User-space access
//!
//! Every byte that crosses the privilege boundary goes through a
//! [`UserMemory`] implementation. The kernel-side implementation is
//! [`SmapUserMemory`], which validates the user range and performs the copy
//! inside a `stac`/`clac` window; the `host` feature adds
//! [`FlatUserMemory`], a simulated user address space for tests.
//!
//! ## Overview
//!
//! Command payloads and buffer contents arrive as raw user addresses. Before
//! the kernel dereferences one, the whole range is checked:
//!
//! | Check | Fault |
//! |-------|-------|
//! | pointer is null | [`BoundaryFault::Null`] |
//! | `ptr + len` overflows | [`BoundaryFault::Wraps`] |
//! | range reaches into the kernel half | [`BoundaryFault::NotUserSpace`] |
//! | range is not backed (host double only) | [`BoundaryFault::Unmapped`] |
//!
//! ## SMAP
//!
//! With Supervisor Mode Access Prevention enabled, a kernel load or store to
//! a user page faults unless `RFLAGS.AC` is set. [`SmapGuard`] sets it for
//! the lifetime of the guard and clears it again on drop, so the window
//! never outlives a single copy:
//!
//! ```text
//! check_user_range(ptr, len)
//!     ↓
//! SmapGuard::enter(smap)   stac
//!     ↓
//! copy_nonoverlapping
//!     ↓
//! drop(guard)              clac
//! ```
//!
//! ## Limitations
//!
//! Validity of the pages behind a user pointer remains the caller's
//! responsibility: this layer rejects ranges that cannot be user memory, it
//! does not recover from page faults.

#![cfg_attr(not(any(test, doctest, feature = "host")), no_std)]
#![allow(unsafe_code)]

#[cfg(any(test, feature = "host"))]
mod flat;
mod smap;

#[cfg(any(test, feature = "host"))]
pub use flat::FlatUserMemory;
pub use smap::{SmapGuard, SmapUserMemory};

use core::fmt;

/// First address past the lower (user) half of a 48-bit canonical address space.
pub const USER_SPACE_END: u64 = 0x0000_8000_0000_0000;

/// An untrusted address supplied by user space.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct UserPtr(u64);

impl UserPtr {
    #[inline]
    #[must_use]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    #[inline]
    #[must_use]
    pub const fn null() -> Self {
        Self(0)
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Pointer `bytes` further into the user range (wrapping).
    #[inline]
    #[must_use]
    pub const fn offset(self, bytes: u64) -> Self {
        Self(self.0.wrapping_add(bytes))
    }
}

impl fmt::Debug for UserPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UA(0x{:016X})", self.0)
    }
}

impl From<u64> for UserPtr {
    #[inline]
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

/// A copy across the user/kernel boundary could not be performed.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum BoundaryFault {
    #[error("null user pointer")]
    Null,
    #[error("user range {addr:#x}+{len:#x} wraps around the address space")]
    Wraps { addr: u64, len: usize },
    #[error("user range {addr:#x}+{len:#x} is not in user space")]
    NotUserSpace { addr: u64, len: usize },
    #[error("user range {addr:#x}+{len:#x} is not mapped")]
    Unmapped { addr: u64, len: usize },
}

/// Validates that `[ptr, ptr + len)` can only name user-space memory.
///
/// # Errors
/// The pointer is null, the range wraps, or it reaches into the kernel half.
pub fn check_user_range(ptr: UserPtr, len: usize) -> Result<(), BoundaryFault> {
    let addr = ptr.as_u64();
    if ptr.is_null() {
        return Err(BoundaryFault::Null);
    }
    let end = addr
        .checked_add(len as u64)
        .ok_or(BoundaryFault::Wraps { addr, len })?;
    if end > USER_SPACE_END {
        return Err(BoundaryFault::NotUserSpace { addr, len });
    }
    Ok(())
}

/// Copies between kernel buffers and user-space addresses.
pub trait UserMemory {
    /// Fill `dst` from the user range starting at `src`.
    ///
    /// # Errors
    /// The user range is invalid or inaccessible; `dst` may be partially written.
    fn copy_from_user(&self, dst: &mut [u8], src: UserPtr) -> Result<(), BoundaryFault>;

    /// Write `src` to the user range starting at `dst`.
    ///
    /// # Errors
    /// The user range is invalid or inaccessible.
    fn copy_to_user(&self, dst: UserPtr, src: &[u8]) -> Result<(), BoundaryFault>;
}

impl<T> UserMemory for &T
where
    T: UserMemory + ?Sized,
{
    #[inline]
    fn copy_from_user(&self, dst: &mut [u8], src: UserPtr) -> Result<(), BoundaryFault> {
        (**self).copy_from_user(dst, src)
    }

    #[inline]
    fn copy_to_user(&self, dst: UserPtr, src: &[u8]) -> Result<(), BoundaryFault> {
        (**self).copy_to_user(dst, src)
    }
}
