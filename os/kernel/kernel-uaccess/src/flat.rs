use crate::{BoundaryFault, UserMemory, UserPtr, check_user_range};
use std::cell::{Cell, RefCell};

/// A simulated user address space: one flat, byte-addressed window
/// `[base, base + len)` backed by a vector.
///
/// Any access outside the window fails with [`BoundaryFault::Unmapped`].
pub struct FlatUserMemory {
    base: u64,
    bytes: RefCell<Vec<u8>>,
    next: Cell<u64>,
}

impl FlatUserMemory {
    /// # Panics
    /// `base` is null or the window leaves user space.
    #[must_use]
    pub fn new(base: u64, len: usize) -> Self {
        assert!(
            check_user_range(UserPtr::new(base), len).is_ok(),
            "window must lie in user space"
        );
        Self {
            base,
            bytes: RefCell::new(vec![0; len]),
            next: Cell::new(base),
        }
    }

    /// Carves an 8-byte aligned block of `len` bytes out of the window.
    ///
    /// # Panics
    /// The window is exhausted.
    #[must_use]
    pub fn alloc(&self, len: usize) -> UserPtr {
        let start = self.next.get().next_multiple_of(8);
        let end = start + len as u64;
        assert!(
            end <= self.base + self.bytes.borrow().len() as u64,
            "simulated user window exhausted"
        );
        self.next.set(end);
        UserPtr::new(start)
    }

    /// Carves out a block and fills it with `bytes`.
    #[must_use]
    pub fn alloc_with(&self, bytes: &[u8]) -> UserPtr {
        let ptr = self.alloc(bytes.len());
        self.store(ptr, bytes);
        ptr
    }

    /// # Panics
    /// The range is outside the window.
    pub fn store(&self, ptr: UserPtr, bytes: &[u8]) {
        self.copy_to_user(ptr, bytes)
            .expect("store outside simulated user window");
    }

    /// # Panics
    /// The range is outside the window.
    #[must_use]
    pub fn load(&self, ptr: UserPtr, len: usize) -> Vec<u8> {
        let mut out = vec![0; len];
        self.copy_from_user(&mut out, ptr)
            .expect("load outside simulated user window");
        out
    }

    fn window(&self, ptr: UserPtr, len: usize) -> Result<usize, BoundaryFault> {
        check_user_range(ptr, len)?;
        let addr = ptr.as_u64();
        let size = self.bytes.borrow().len() as u64;
        if addr < self.base || addr + len as u64 > self.base + size {
            return Err(BoundaryFault::Unmapped { addr, len });
        }
        Ok(usize::try_from(addr - self.base).expect("window offset fits usize"))
    }
}

impl UserMemory for FlatUserMemory {
    fn copy_from_user(&self, dst: &mut [u8], src: UserPtr) -> Result<(), BoundaryFault> {
        let off = self.window(src, dst.len())?;
        dst.copy_from_slice(&self.bytes.borrow()[off..off + dst.len()]);
        Ok(())
    }

    fn copy_to_user(&self, dst: UserPtr, src: &[u8]) -> Result<(), BoundaryFault> {
        let off = self.window(dst, src.len())?;
        self.bytes.borrow_mut()[off..off + src.len()].copy_from_slice(src);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_inside_the_window() {
        let user = FlatUserMemory::new(0x4000_0000, 0x100);
        let ptr = user.alloc_with(b"firmware");
        assert_eq!(user.load(ptr, 8), b"firmware");
        assert_eq!(ptr.as_u64() % 8, 0);
    }

    #[test]
    fn rejects_accesses_outside_the_window() {
        let user = FlatUserMemory::new(0x4000_0000, 0x100);
        let mut buf = [0u8; 4];
        assert_eq!(
            user.copy_from_user(&mut buf, UserPtr::new(0x4000_00FE)),
            Err(BoundaryFault::Unmapped {
                addr: 0x4000_00FE,
                len: 4
            })
        );
        assert_eq!(
            user.copy_to_user(UserPtr::null(), &buf),
            Err(BoundaryFault::Null)
        );
    }
}
