use crate::slots::{SlotId, SlotList};
use crate::{PageAllocator, PageBlock, PageOrder, PhysicalAddress, VirtualAddress};
use kernel_uaccess::{BoundaryFault, UserMemory, UserPtr};
use log::{debug, warn};

/// One live buffer and the pages backing it.
#[derive(Debug)]
pub struct AllocationRecord {
    index: u32,
    size: u32,
    block: PageBlock,
}

impl AllocationRecord {
    #[inline]
    #[must_use]
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Requested length in bytes.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// Order the backing pages were allocated with, and will be freed with.
    #[inline]
    #[must_use]
    pub const fn order(&self) -> PageOrder {
        self.block.order()
    }

    #[inline]
    #[must_use]
    pub const fn physical_address(&self) -> PhysicalAddress {
        self.block.physical_address()
    }

    #[inline]
    #[must_use]
    pub fn virtual_address(&self) -> VirtualAddress {
        self.block.virtual_address()
    }

    /// The first [`size`](Self::size) bytes of the buffer.
    #[must_use]
    pub fn contents(&self) -> &[u8] {
        &self.block.as_slice()[..self.size as usize]
    }

    fn contents_mut(&mut self) -> &mut [u8] {
        let size = self.size as usize;
        &mut self.block.as_mut_slice()[..size]
    }
}

/// What [`AllocationTracker::allocate`] hands back to the caller.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Allocation {
    pub index: u32,
    pub physical_address: PhysicalAddress,
    pub virtual_address: VirtualAddress,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum TrackerError {
    #[error("allocation size must be non-zero")]
    ZeroSize,
    #[error("page allocator could not provide a block of {0:?}")]
    OutOfPages(PageOrder),
    #[error("no memory left for a tracking record")]
    OutOfNodes,
    #[error("no free buffer index left")]
    IndexExhausted,
    #[error("no buffer at physical address {0}")]
    UnknownAddress(PhysicalAddress),
    #[error("no buffer with index {0}")]
    UnknownIndex(u32),
    #[error("null user buffer")]
    NullBuffer,
    #[error("user copy failed: {0}")]
    Boundary(#[from] BoundaryFault),
}

/// Owns every physical buffer handed out to user space.
///
/// Buffers are kept in allocation order and looked up by linear scan; the
/// expected population is a few dozen at most.
///
/// # Invariants
/// - Indices and physical addresses are unique among live records.
/// - A record is only ever created fully linked by [`allocate`](Self::allocate),
///   and destroyed by [`free`](Self::free) or [`release_all`](Self::release_all),
///   which return its pages at the order they were allocated with.
///
/// Not internally synchronized; callers serialize access.
pub struct AllocationTracker<A> {
    pages: A,
    records: SlotList<AllocationRecord>,
    record_limit: usize,
}

impl<A> AllocationTracker<A>
where
    A: PageAllocator,
{
    #[must_use]
    pub const fn new(pages: A) -> Self {
        Self::with_record_limit(pages, usize::MAX)
    }

    /// A tracker that holds at most `record_limit` live buffers; further
    /// allocations fail with [`TrackerError::OutOfNodes`].
    #[must_use]
    pub const fn with_record_limit(pages: A, record_limit: usize) -> Self {
        Self {
            pages,
            records: SlotList::new(),
            record_limit,
        }
    }

    #[must_use]
    pub const fn page_allocator(&self) -> &A {
        &self.pages
    }

    /// Reserves a zeroed, physically contiguous buffer of at least `size` bytes.
    ///
    /// The index is one more than the largest live index, or 0 when nothing
    /// is allocated.
    ///
    /// # Errors
    /// - [`TrackerError::ZeroSize`] for `size == 0`.
    /// - [`TrackerError::OutOfPages`], [`TrackerError::OutOfNodes`] or
    ///   [`TrackerError::IndexExhausted`] on exhaustion. Nothing is linked and
    ///   any pages already obtained are returned.
    pub fn allocate(&mut self, size: u32) -> Result<Allocation, TrackerError> {
        if size == 0 {
            return Err(TrackerError::ZeroSize);
        }

        let index = self.next_index()?;
        let page_size = self.pages.page_size();
        let order = PageOrder::for_size(size, page_size);
        let block = self
            .pages
            .alloc_pages(order)
            .ok_or(TrackerError::OutOfPages(order))?;
        let wanted = usize::try_from(order.bytes(page_size)).unwrap_or(usize::MAX);
        if block.len() < wanted {
            warn!(
                "page allocator returned {:#x} bytes for {order:?}, need {wanted:#x}",
                block.len()
            );
            self.pages.free_pages(block);
            return Err(TrackerError::OutOfPages(order));
        }

        let record = AllocationRecord { index, size, block };
        let allocation = Allocation {
            index,
            physical_address: record.physical_address(),
            virtual_address: record.virtual_address(),
        };

        let pushed = if self.records.len() < self.record_limit {
            self.records.try_push_back(record)
        } else {
            Err(record)
        };
        if let Err(record) = pushed {
            self.pages.free_pages(record.block);
            return Err(TrackerError::OutOfNodes);
        }

        debug!(
            "allocated #{index}: {size:#x} bytes, {order:?}, {:?} {:?}",
            allocation.physical_address, allocation.virtual_address
        );
        Ok(allocation)
    }

    /// Releases the buffer at `physical_address`.
    ///
    /// The pages go back at the order stored in the record. `size` should be
    /// the size passed to [`allocate`](Self::allocate); a mismatch is logged
    /// and otherwise ignored.
    ///
    /// # Errors
    /// [`TrackerError::UnknownAddress`] if no live buffer starts there; the
    /// tracker is left unchanged.
    pub fn free(&mut self, physical_address: PhysicalAddress, size: u32) -> Result<(), TrackerError> {
        let id = self
            .records
            .find(|r| r.physical_address() == physical_address)
            .ok_or(TrackerError::UnknownAddress(physical_address))?;
        let record = self
            .records
            .remove(id)
            .ok_or(TrackerError::UnknownAddress(physical_address))?;

        if record.size != size {
            warn!(
                "free of #{} at {physical_address:?} with size {size:#x}, allocated as {:#x}; releasing {:?}",
                record.index,
                record.size,
                record.order()
            );
        }

        debug!("freed #{} at {physical_address:?}", record.index);
        self.pages.free_pages(record.block);
        Ok(())
    }

    #[must_use]
    pub fn find_by_physical(&self, physical_address: PhysicalAddress) -> Option<&AllocationRecord> {
        self.iter().find(|r| r.physical_address() == physical_address)
    }

    #[must_use]
    pub fn find_by_index(&self, index: u32) -> Option<&AllocationRecord> {
        self.iter().find(|r| r.index == index)
    }

    /// Copies the whole buffer `index` (its requested size) to user memory at `dst`.
    ///
    /// # Errors
    /// Null `dst`, unknown index, or a failed boundary copy.
    pub fn read(&self, index: u32, user: &impl UserMemory, dst: UserPtr) -> Result<(), TrackerError> {
        if dst.is_null() {
            return Err(TrackerError::NullBuffer);
        }
        let record = self
            .find_by_index(index)
            .ok_or(TrackerError::UnknownIndex(index))?;
        user.copy_to_user(dst, record.contents())?;
        debug!("read #{index}: {:#x} bytes to {dst:?}", record.size);
        Ok(())
    }

    /// Fills the whole buffer `index` (its requested size) from user memory at `src`.
    ///
    /// # Errors
    /// Null `src`, unknown index, or a failed boundary copy. On a failed copy
    /// the buffer contents are unspecified.
    pub fn write(&mut self, index: u32, user: &impl UserMemory, src: UserPtr) -> Result<(), TrackerError> {
        if src.is_null() {
            return Err(TrackerError::NullBuffer);
        }
        let id = self.id_of_index(index)?;
        let record = self
            .records
            .get_mut(id)
            .ok_or(TrackerError::UnknownIndex(index))?;
        user.copy_from_user(record.contents_mut(), src)?;
        debug!("wrote #{index}: {:#x} bytes from {src:?}", record.size);
        Ok(())
    }

    /// Number of live buffers.
    #[inline]
    #[must_use]
    pub const fn count(&self) -> usize {
        self.records.len()
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Live buffers, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &AllocationRecord> {
        self.records.iter().map(|(_, record)| record)
    }

    #[must_use]
    pub fn head(&self) -> Option<&AllocationRecord> {
        self.records.head().and_then(|id| self.records.get(id))
    }

    #[must_use]
    pub fn tail(&self) -> Option<&AllocationRecord> {
        self.records.tail().and_then(|id| self.records.get(id))
    }

    /// Indices of the buffers allocated immediately before and after `index`.
    #[must_use]
    pub fn neighbours(&self, index: u32) -> Option<(Option<u32>, Option<u32>)> {
        let id = self.id_of_index(index).ok()?;
        let (prev, next) = self.records.neighbours(id)?;
        let index_of = |id: SlotId| self.records.get(id).map(AllocationRecord::index);
        Some((prev.and_then(index_of), next.and_then(index_of)))
    }

    /// Frees every live buffer, oldest first, and returns how many there were.
    pub fn release_all(&mut self) -> usize {
        let mut released = 0;
        while let Some(record) = self.records.pop_front() {
            debug!("releasing #{} at {:?}", record.index, record.physical_address());
            self.pages.free_pages(record.block);
            released += 1;
        }
        released
    }

    fn id_of_index(&self, index: u32) -> Result<SlotId, TrackerError> {
        self.records
            .find(|r| r.index == index)
            .ok_or(TrackerError::UnknownIndex(index))
    }

    fn next_index(&self) -> Result<u32, TrackerError> {
        match self.iter().map(AllocationRecord::index).max() {
            None => Ok(0),
            Some(max) => max.checked_add(1).ok_or(TrackerError::IndexExhausted),
        }
    }
}
