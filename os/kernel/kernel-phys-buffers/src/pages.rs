use crate::{PhysicalAddress, VirtualAddress};
use core::fmt;
use core::ptr::NonNull;

/// Base page size of the host page allocator on x86-64.
pub const PAGE_SIZE: u64 = 4096;

/// Power-of-two multiplier of the base page size: order `n` is `2^n` pages.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PageOrder(u8);

impl PageOrder {
    #[inline]
    #[must_use]
    pub const fn new(order: u8) -> Self {
        Self(order)
    }

    /// Smallest order whose block covers `size` bytes.
    ///
    /// `4096 -> 0`, `4097 -> 1`, `8192 -> 1` with 4 KiB pages; a zero size
    /// yields order 0.
    ///
    /// # Panics
    /// `page_size` is not a power of two.
    #[must_use]
    pub const fn for_size(size: u32, page_size: u64) -> Self {
        assert!(page_size.is_power_of_two(), "page size must be a power of two");
        let mut order = 0;
        while (page_size << order) < size as u64 {
            order += 1;
        }
        Self(order)
    }

    #[inline]
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn pages(self) -> u64 {
        1 << self.0
    }

    /// Bytes in a block of this order.
    #[inline]
    #[must_use]
    pub const fn bytes(self, page_size: u64) -> u64 {
        page_size << self.0
    }
}

impl fmt::Debug for PageOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "order {}", self.0)
    }
}

/// A block of physically contiguous, kernel-mapped pages.
///
/// The block is owned: it cannot be cloned, and the only way to give the
/// memory back is [`PageAllocator::free_pages`].
pub struct PageBlock {
    ptr: NonNull<u8>,
    len: usize,
    phys: PhysicalAddress,
    order: PageOrder,
}

// Safety: the block exclusively owns its pages; moving it between threads moves that ownership.
unsafe impl Send for PageBlock {}

impl PageBlock {
    /// # Safety
    /// - `[ptr, ptr + len)` must be mapped, writable and exclusively owned by
    ///   the returned block until it is handed back to its allocator.
    /// - `phys` must be the physical address backing `ptr`, and the range must
    ///   be physically contiguous.
    #[must_use]
    pub const unsafe fn from_raw(
        ptr: NonNull<u8>,
        len: usize,
        phys: PhysicalAddress,
        order: PageOrder,
    ) -> Self {
        Self {
            ptr,
            len,
            phys,
            order,
        }
    }

    #[inline]
    #[must_use]
    pub const fn physical_address(&self) -> PhysicalAddress {
        self.phys
    }

    #[inline]
    #[must_use]
    pub fn virtual_address(&self) -> VirtualAddress {
        VirtualAddress::new(self.ptr.as_ptr() as u64)
    }

    #[inline]
    #[must_use]
    pub const fn order(&self) -> PageOrder {
        self.order
    }

    #[inline]
    #[must_use]
    pub const fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    #[inline]
    #[must_use]
    #[allow(clippy::len_without_is_empty)]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    #[must_use]
    pub const fn as_slice(&self) -> &[u8] {
        unsafe { core::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    #[inline]
    pub const fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { core::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl fmt::Debug for PageBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageBlock")
            .field("virt", &self.virtual_address())
            .field("phys", &self.phys)
            .field("order", &self.order)
            .finish()
    }
}

/// Source of physically contiguous pages.
///
/// Kernel implementations should hand out memory that firmware can address
/// (below 4 GiB on x86-64) and must not sleep.
pub trait PageAllocator {
    /// Base page size in bytes; a power of two.
    fn page_size(&self) -> u64;

    /// Allocates `2^order` zeroed, contiguous pages, or `None` when exhausted.
    fn alloc_pages(&mut self, order: PageOrder) -> Option<PageBlock>;

    /// Returns a block previously produced by [`alloc_pages`](Self::alloc_pages).
    fn free_pages(&mut self, block: PageBlock);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_boundaries_at_page_multiples() {
        assert_eq!(PageOrder::for_size(1, PAGE_SIZE), PageOrder::new(0));
        assert_eq!(PageOrder::for_size(4096, PAGE_SIZE), PageOrder::new(0));
        assert_eq!(PageOrder::for_size(4097, PAGE_SIZE), PageOrder::new(1));
        assert_eq!(PageOrder::for_size(8192, PAGE_SIZE), PageOrder::new(1));
        assert_eq!(PageOrder::for_size(8193, PAGE_SIZE), PageOrder::new(2));
        assert_eq!(PageOrder::for_size(0x10_0000, PAGE_SIZE), PageOrder::new(8));
    }

    #[test]
    fn order_covers_the_largest_request() {
        let order = PageOrder::for_size(u32::MAX, PAGE_SIZE);
        assert_eq!(order, PageOrder::new(20));
        assert!(order.bytes(PAGE_SIZE) >= u64::from(u32::MAX));
    }

    #[test]
    fn order_sizes() {
        let order = PageOrder::new(3);
        assert_eq!(order.pages(), 8);
        assert_eq!(order.bytes(PAGE_SIZE), 32 * 1024);
        assert_eq!(format!("{order:?}"), "order 3");
    }
}
