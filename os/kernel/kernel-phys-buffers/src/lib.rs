//! # Physical buffer tracking
//!
//! Physically contiguous kernel buffers that user space refers to by an
//! opaque index, and that firmware refers to by physical address.
//!
//! | Type | Role |
//! |------|------|
//! | [`PageAllocator`] | source of zeroed, contiguous pages of a given [`PageOrder`] |
//! | [`PageBlock`] | exclusive ownership of one such block |
//! | [`AllocationTracker`] | live buffers, keyed by index and by physical address |
//!
//! The tracker keeps its records in an insertion-ordered doubly-linked list
//! whose links are slot numbers in a generation-tagged table, so unlinking
//! a head, tail, middle or sole record only rewrites the neighbours.
//!
//! With the `host` feature, [`HostPageAllocator`] backs blocks with the
//! process heap.
//!
//! ```rust,ignore
//! use kernel_phys_buffers::{AllocationTracker, HostPageAllocator, PageOrder};
//!
//! let mut tracker = AllocationTracker::new(HostPageAllocator::default());
//! let buffer = tracker.allocate(4097)?;
//! assert_eq!(tracker.find_by_index(buffer.index).unwrap().order(), PageOrder::new(1));
//! tracker.free(buffer.physical_address, 4097)?;
//! ```

#![cfg_attr(not(any(test, doctest, feature = "host")), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

mod addresses;
#[cfg(any(test, feature = "host"))]
mod host;
mod pages;
mod slots;
mod tracker;

pub use addresses::{PhysicalAddress, VirtualAddress};
#[cfg(any(test, feature = "host"))]
pub use host::HostPageAllocator;
pub use pages::{PAGE_SIZE, PageAllocator, PageBlock, PageOrder};
pub use slots::{SlotId, SlotList};
pub use tracker::{Allocation, AllocationRecord, AllocationTracker, TrackerError};
