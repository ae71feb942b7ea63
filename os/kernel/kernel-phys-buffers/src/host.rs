//! A [`PageAllocator`] on top of the host heap.

use crate::{PAGE_SIZE, PageAllocator, PageBlock, PageOrder, PhysicalAddress};
use std::alloc::{Layout, alloc_zeroed, dealloc};
use std::ptr::NonNull;

/// Page-aligned, zeroed heap blocks whose "physical" address is their
/// virtual address.
///
/// A failure budget makes it possible to exercise the exhaustion paths.
#[derive(Debug)]
pub struct HostPageAllocator {
    page_size: u64,
    remaining: Option<usize>,
    outstanding: usize,
    released: Vec<PageOrder>,
}

impl Default for HostPageAllocator {
    fn default() -> Self {
        Self::new(PAGE_SIZE)
    }
}

impl HostPageAllocator {
    /// # Panics
    /// `page_size` is not a power of two.
    #[must_use]
    pub fn new(page_size: u64) -> Self {
        assert!(page_size.is_power_of_two(), "page size must be a power of two");
        Self {
            page_size,
            remaining: None,
            outstanding: 0,
            released: Vec::new(),
        }
    }

    /// Lets only the next `allocations` requests succeed.
    #[must_use]
    pub const fn with_budget(mut self, allocations: usize) -> Self {
        self.remaining = Some(allocations);
        self
    }

    /// Blocks handed out and not yet returned.
    #[must_use]
    pub const fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Orders of all returned blocks, in the order they came back.
    #[must_use]
    pub fn released(&self) -> &[PageOrder] {
        &self.released
    }

    fn layout(&self, order: PageOrder) -> Option<Layout> {
        let size = usize::try_from(order.bytes(self.page_size)).ok()?;
        let align = usize::try_from(self.page_size).ok()?;
        Layout::from_size_align(size, align).ok()
    }
}

impl PageAllocator for HostPageAllocator {
    fn page_size(&self) -> u64 {
        self.page_size
    }

    fn alloc_pages(&mut self, order: PageOrder) -> Option<PageBlock> {
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining = remaining.checked_sub(1)?;
        }
        let layout = self.layout(order)?;
        let ptr = NonNull::new(unsafe { alloc_zeroed(layout) })?;
        self.outstanding += 1;
        let phys = PhysicalAddress::new(ptr.as_ptr() as u64);
        Some(unsafe { PageBlock::from_raw(ptr, layout.size(), phys, order) })
    }

    fn free_pages(&mut self, block: PageBlock) {
        let Some(layout) = self.layout(block.order()) else {
            return;
        };
        unsafe { dealloc(block.as_ptr().as_ptr(), layout) };
        self.outstanding -= 1;
        self.released.push(block.order());
    }
}
