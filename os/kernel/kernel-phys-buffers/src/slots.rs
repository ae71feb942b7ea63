//! Insertion-ordered doubly-linked list stored in a slot table.
//!
//! Links are slot numbers rather than pointers. Every slot carries a
//! generation that is bumped when its value is removed, so a stale
//! [`SlotId`] never resolves to the value that later reuses the slot.

use alloc::vec::Vec;
use core::mem;

/// Stable handle to a value in a [`SlotList`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct SlotId {
    slot: u32,
    generation: u32,
}

struct Slot<T> {
    generation: u32,
    entry: Entry<T>,
}

enum Entry<T> {
    Occupied(Node<T>),
    Vacant { next_free: Option<u32> },
}

struct Node<T> {
    value: T,
    prev: Option<u32>,
    next: Option<u32>,
}

/// # Invariants
/// - `head` is `None` iff `len == 0`, and likewise `tail`.
/// - Following `next` from `head` visits every occupied slot exactly once
///   and ends at `tail`; `prev` mirrors `next`.
/// - Vacant slots form a singly linked free chain starting at `free`.
pub struct SlotList<T> {
    slots: Vec<Slot<T>>,
    free: Option<u32>,
    head: Option<u32>,
    tail: Option<u32>,
    len: usize,
}

impl<T> Default for SlotList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SlotList<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: None,
            head: None,
            tail: None,
            len: 0,
        }
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub fn head(&self) -> Option<SlotId> {
        self.head.map(|slot| self.id_of(slot))
    }

    #[must_use]
    pub fn tail(&self) -> Option<SlotId> {
        self.tail.map(|slot| self.id_of(slot))
    }

    /// Appends `value` after the current tail.
    ///
    /// # Errors
    /// No slot is free and the table cannot grow; `value` is handed back
    /// and the list is unchanged.
    pub fn try_push_back(&mut self, value: T) -> Result<SlotId, T> {
        let slot = match self.free {
            Some(slot) => slot,
            None => {
                let Ok(slot) = u32::try_from(self.slots.len()) else {
                    return Err(value);
                };
                if self.slots.try_reserve(1).is_err() {
                    return Err(value);
                }
                self.slots.push(Slot {
                    generation: 0,
                    entry: Entry::Vacant { next_free: None },
                });
                slot
            }
        };

        let node = Node {
            value,
            prev: self.tail,
            next: None,
        };
        let Some(entry) = self.slots.get_mut(slot as usize).map(|s| &mut s.entry) else {
            return Err(node.value);
        };
        if let Entry::Vacant { next_free } = *entry {
            self.free = next_free;
        }
        *entry = Entry::Occupied(node);

        match self.tail {
            Some(tail) => {
                if let Some(node) = self.node_mut(tail) {
                    node.next = Some(slot);
                }
            }
            None => self.head = Some(slot),
        }
        self.tail = Some(slot);
        self.len += 1;
        Ok(self.id_of(slot))
    }

    /// Unlinks and returns the value behind `id`.
    ///
    /// Only the two neighbours of the removed node are rewritten.
    pub fn remove(&mut self, id: SlotId) -> Option<T> {
        self.get(id)?;
        let free = self.free;
        let slot = self.slots.get_mut(id.slot as usize)?;
        slot.generation = slot.generation.wrapping_add(1);
        let Entry::Occupied(node) =
            mem::replace(&mut slot.entry, Entry::Vacant { next_free: free })
        else {
            return None;
        };
        self.free = Some(id.slot);
        self.len -= 1;

        match (node.prev, node.next) {
            (None, None) => {
                self.head = None;
                self.tail = None;
            }
            (None, Some(next)) => {
                if let Some(n) = self.node_mut(next) {
                    n.prev = None;
                }
                self.head = Some(next);
            }
            (Some(prev), None) => {
                if let Some(p) = self.node_mut(prev) {
                    p.next = None;
                }
                self.tail = Some(prev);
            }
            (Some(prev), Some(next)) => {
                if let Some(p) = self.node_mut(prev) {
                    p.next = Some(next);
                }
                if let Some(n) = self.node_mut(next) {
                    n.prev = Some(prev);
                }
            }
        }

        Some(node.value)
    }

    /// Removes and returns the head.
    pub fn pop_front(&mut self) -> Option<T> {
        let head = self.head()?;
        self.remove(head)
    }

    #[must_use]
    pub fn get(&self, id: SlotId) -> Option<&T> {
        self.node(id).map(|node| &node.value)
    }

    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut T> {
        let slot = self.slots.get_mut(id.slot as usize)?;
        match &mut slot.entry {
            Entry::Occupied(node) if slot.generation == id.generation => Some(&mut node.value),
            _ => None,
        }
    }

    /// Predecessor and successor of `id` in list order.
    #[must_use]
    pub fn neighbours(&self, id: SlotId) -> Option<(Option<SlotId>, Option<SlotId>)> {
        let node = self.node(id)?;
        Some((
            node.prev.map(|slot| self.id_of(slot)),
            node.next.map(|slot| self.id_of(slot)),
        ))
    }

    /// First value, in list order, for which `predicate` holds.
    pub fn find(&self, mut predicate: impl FnMut(&T) -> bool) -> Option<SlotId> {
        self.iter()
            .find(|(_, value)| predicate(value))
            .map(|(id, _)| id)
    }

    /// Values from head to tail.
    #[must_use]
    pub const fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            cursor: self.head,
        }
    }

    fn id_of(&self, slot: u32) -> SlotId {
        let generation = self.slots.get(slot as usize).map_or(0, |s| s.generation);
        SlotId { slot, generation }
    }

    fn node(&self, id: SlotId) -> Option<&Node<T>> {
        let slot = self.slots.get(id.slot as usize)?;
        match &slot.entry {
            Entry::Occupied(node) if slot.generation == id.generation => Some(node),
            _ => None,
        }
    }

    fn node_mut(&mut self, slot: u32) -> Option<&mut Node<T>> {
        match &mut self.slots.get_mut(slot as usize)?.entry {
            Entry::Occupied(node) => Some(node),
            Entry::Vacant { .. } => None,
        }
    }
}

pub struct Iter<'a, T> {
    list: &'a SlotList<T>,
    cursor: Option<u32>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (SlotId, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.cursor?;
        let id = self.list.id_of(slot);
        let node = self.list.node(id)?;
        self.cursor = node.next;
        Some((id, &node.value))
    }
}
