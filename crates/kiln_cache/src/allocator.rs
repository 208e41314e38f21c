//! Dense slot id allocation with LIFO reuse.

use kiln_common::SlotId;

/// Hands out [`SlotId`]s, reusing released ids before issuing new ones.
///
/// The most recently released id is reused first, which keeps the live id
/// range compact. Callers must delete an id's entry file before releasing
/// it and must not release an id twice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotAllocator {
    /// Released ids; the last element is the top of the stack.
    free: Vec<SlotId>,
    /// Next never-issued id.
    next: SlotId,
}

impl SlotAllocator {
    /// Creates an allocator that has issued nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds an allocator from persisted state.
    ///
    /// `free_top_first` lists released ids with the top of the stack first.
    pub fn from_parts(free_top_first: Vec<SlotId>, next: SlotId) -> Self {
        let mut free = free_top_first;
        free.reverse();
        Self { free, next }
    }

    /// Returns the free list with the top of the stack first.
    pub fn free_top_first(&self) -> impl Iterator<Item = SlotId> + '_ {
        self.free.iter().rev().copied()
    }

    /// Returns the next never-issued id.
    pub fn next_id(&self) -> SlotId {
        self.next
    }

    /// Returns the number of released ids awaiting reuse.
    pub fn free_len(&self) -> usize {
        self.free.len()
    }

    /// Returns `true` if the id is waiting on the free list.
    pub fn is_free(&self, id: SlotId) -> bool {
        self.free.contains(&id)
    }

    /// Returns `true` if no id has ever been issued.
    pub fn is_pristine(&self) -> bool {
        self.next == SlotId::default()
    }

    /// Pops the most recently released id, or issues a fresh one.
    ///
    /// Returns `None` once every id below `u32::MAX` has been issued and
    /// none is free.
    pub fn allocate(&mut self) -> Option<SlotId> {
        if let Some(id) = self.free.pop() {
            return Some(id);
        }
        let id = self.next;
        self.next = id.checked_next()?;
        Some(id)
    }

    /// Returns an id to the free list.
    pub fn release(&mut self, id: SlotId) {
        debug_assert!(id < self.next, "released id {id} was never issued");
        self.free.push(id);
    }
}
