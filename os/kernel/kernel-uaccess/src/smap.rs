//! SMAP-aware user copies.
//!
//! With CR4.SMAP set the CPU blocks supervisor loads and stores to user
//! pages. A copy to or from user space therefore has to:
//!
//! 1. set RFLAGS.AC (`stac`),
//! 2. perform the copy,
//! 3. clear RFLAGS.AC (`clac`) again.
//!
//! [`SmapGuard`] does steps 1 and 3 via RAII; [`SmapUserMemory`] wraps the
//! range validation and the copy itself.

use crate::{BoundaryFault, UserMemory, UserPtr, check_user_range};
use log::trace;

/// RAII window in which supervisor code may touch user pages.
///
/// Creating an enabled guard executes `stac`; dropping it executes `clac`.
/// A disabled guard does nothing, for CPUs without SMAP where both
/// instructions raise `#UD`.
pub struct SmapGuard {
    enabled: bool,
}

impl SmapGuard {
    #[inline(always)]
    #[allow(clippy::inline_always)]
    #[must_use]
    pub fn enter(enabled: bool) -> Self {
        if enabled {
            #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
            unsafe {
                core::arch::asm!("stac", options(nomem, nostack));
            }
        }
        Self { enabled }
    }
}

impl Drop for SmapGuard {
    #[inline(always)]
    #[allow(clippy::inline_always)]
    fn drop(&mut self) {
        if self.enabled {
            #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
            unsafe {
                core::arch::asm!("clac", options(nomem, nostack));
            }
        }
    }
}

/// [`UserMemory`] for the live address space of the calling process.
#[derive(Debug, Copy, Clone)]
pub struct SmapUserMemory {
    smap: bool,
}

impl SmapUserMemory {
    /// # Safety
    /// - Must only be used in kernel mode, on behalf of the process whose
    ///   address space is currently active.
    /// - `smap` must reflect CR4.SMAP; `stac`/`clac` fault on CPUs without it.
    /// - The pages behind every user range passed in must be mapped: this type
    ///   performs no fault recovery.
    #[must_use]
    pub const unsafe fn new(smap: bool) -> Self {
        Self { smap }
    }
}

impl UserMemory for SmapUserMemory {
    fn copy_from_user(&self, dst: &mut [u8], src: UserPtr) -> Result<(), BoundaryFault> {
        check_user_range(src, dst.len())?;
        trace!("copy_from_user {src:?} len={:#x}", dst.len());
        let _guard = SmapGuard::enter(self.smap);
        // SAFETY: range validated as user memory; mapping guaranteed by the constructor contract.
        unsafe {
            core::ptr::copy_nonoverlapping(
                src.as_u64() as usize as *const u8,
                dst.as_mut_ptr(),
                dst.len(),
            );
        }
        Ok(())
    }

    fn copy_to_user(&self, dst: UserPtr, src: &[u8]) -> Result<(), BoundaryFault> {
        check_user_range(dst, src.len())?;
        trace!("copy_to_user {dst:?} len={:#x}", src.len());
        let _guard = SmapGuard::enter(self.smap);
        // SAFETY: as above.
        unsafe {
            core::ptr::copy_nonoverlapping(
                src.as_ptr(),
                dst.as_u64() as usize as *mut u8,
                src.len(),
            );
        }
        Ok(())
    }
}
