//! Bounded undo/redo over whole-sheet snapshots.
//!
//! `entries[index]` is the state the store is believed to be in. Undo and
//! redo only move the index; the caller restores the returned snapshot and
//! replays it to the server.

use super::store::SheetSnapshot;

pub const DEFAULT_CAPACITY: usize = 50;

#[derive(Debug)]
pub struct HistoryManager {
    entries: Vec<SheetSnapshot>,
    index: usize,
    capacity: usize,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl HistoryManager {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            index: 0,
            capacity: capacity.max(1),
        }
    }

    /// Forget everything (sheet switch).
    pub fn reset(&mut self) {
        self.entries.clear();
        self.index = 0;
    }

    /// Reset and record the freshly loaded sheet as entry 0.
    pub fn start(&mut self, loaded: SheetSnapshot) {
        self.reset();
        self.entries.push(loaded);
    }

    /// Drop the redo branch, append, and evict the oldest entry when over
    /// capacity. The index ends on the new entry either way.
    pub fn save_snapshot(&mut self, snapshot: SheetSnapshot) {
        if !self.entries.is_empty() {
            self.entries.truncate(self.index + 1);
        }
        self.entries.push(snapshot);
        if self.entries.len() > self.capacity {
            self.entries.remove(0);
        }
        self.index = self.entries.len() - 1;
    }

    /// Record `current` unless the head already equals it. Used before a
    /// commit so that changes which never went through history (remote
    /// edits, failed replays) can still be undone back to.
    pub fn checkpoint(&mut self, current: SheetSnapshot) -> bool {
        if self.head() == Some(&current) {
            return false;
        }
        self.save_snapshot(current);
        true
    }

    /// Replace the current entry (a reload brought computed values for the
    /// same edit).
    pub fn amend_current(&mut self, snapshot: SheetSnapshot) {
        match self.entries.get_mut(self.index) {
            Some(entry) => *entry = snapshot,
            None => self.save_snapshot(snapshot),
        }
    }

    pub fn head(&self) -> Option<&SheetSnapshot> {
        self.entries.get(self.index)
    }

    pub fn undo(&mut self) -> Option<&SheetSnapshot> {
        if !self.can_undo() {
            return None;
        }
        self.index -= 1;
        self.entries.get(self.index)
    }

    pub fn redo(&mut self) -> Option<&SheetSnapshot> {
        if !self.can_redo() {
            return None;
        }
        self.index += 1;
        self.entries.get(self.index)
    }

    pub fn can_undo(&self) -> bool {
        self.index > 0
    }

    pub fn can_redo(&self) -> bool {
        self.index + 1 < self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
