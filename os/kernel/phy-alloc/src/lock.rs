//! The lock every command runs under.
//!
//! Sessions take a ticket on entry and are served strictly in ticket order,
//! so a caller hammering the device with IO requests cannot starve another
//! session waiting to FREE its buffer. Tickets wrap; only the distance
//! between `next` and `serving` matters.

use core::{
    cell::UnsafeCell,
    hint::spin_loop,
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicU32, Ordering},
};

pub struct DispatchLock<T> {
    next: AtomicU32,
    serving: AtomicU32,
    state: UnsafeCell<T>,
}

// Safety: `state` is only reached through a guard, and one guard exists at a time.
unsafe impl<T: Send> Sync for DispatchLock<T> {}

impl<T> DispatchLock<T> {
    pub const fn new(state: T) -> Self {
        Self {
            next: AtomicU32::new(0),
            serving: AtomicU32::new(0),
            state: UnsafeCell::new(state),
        }
    }

    /// Waits for this caller's turn.
    pub fn lock(&self) -> DispatchGuard<'_, T> {
        let ticket = self.next.fetch_add(1, Ordering::Relaxed);
        while self.serving.load(Ordering::Acquire) != ticket {
            spin_loop();
        }
        DispatchGuard { lock: self, ticket }
    }
}

/// Exclusive access to the driver state for the duration of one command.
pub struct DispatchGuard<'a, T> {
    lock: &'a DispatchLock<T>,
    ticket: u32,
}

impl<T> DispatchGuard<'_, T> {
    /// Position of this holder in the service order.
    #[must_use]
    pub const fn ticket(&self) -> u32 {
        self.ticket
    }
}

impl<T> Deref for DispatchGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.state.get() }
    }
}

impl<T> DerefMut for DispatchGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.state.get() }
    }
}

impl<T> Drop for DispatchGuard<'_, T> {
    fn drop(&mut self) {
        self.lock
            .serving
            .store(self.ticket.wrapping_add(1), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn tickets_are_served_in_order() {
        let lock = DispatchLock::new(());
        let first = lock.lock().ticket();
        let second = lock.lock().ticket();
        assert_eq!((first, second), (0, 1));
    }

    #[test]
    fn tickets_wrap_around() {
        let lock = DispatchLock::new(0_u8);
        lock.next.store(u32::MAX, Ordering::Relaxed);
        lock.serving.store(u32::MAX, Ordering::Relaxed);
        {
            let mut guard = lock.lock();
            assert_eq!(guard.ticket(), u32::MAX);
            *guard += 1;
        }
        let guard = lock.lock();
        assert_eq!(guard.ticket(), 0);
        assert_eq!(*guard, 1);
    }

    #[test]
    fn holders_never_overlap() {
        let lock = DispatchLock::new(Vec::new());
        let overlaps = Mutex::new(0_usize);
        std::thread::scope(|s| {
            for id in 0..4_u32 {
                let lock = &lock;
                let overlaps = &overlaps;
                s.spawn(move || {
                    for _ in 0..500 {
                        let mut guard = lock.lock();
                        guard.push(id);
                        let len = guard.len();
                        spin_loop();
                        if guard.len() != len {
                            *overlaps.lock().unwrap() += 1;
                        }
                    }
                });
            }
        });
        assert_eq!(*overlaps.lock().unwrap(), 0);
        assert_eq!(lock.lock().len(), 2000);
    }
}
