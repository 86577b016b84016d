/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Binary min-heap over values tagged with a `u64` priority.
//!
//! The heap lives in one contiguous arena. The children of the entry at index `i` are at `2i + 1` and
//! `2i + 2`, and its parent is at `(i - 1) / 2`. Entries of equal priority come out in no particular
//! order.

pub struct PriorityQueue<T> {
    arena: Vec<(u64, T)>,
}

impl<T> PriorityQueue<T> {
    pub fn new() -> Self {
        Self { arena: Vec::new() }
    }

    pub fn push(&mut self, priority: u64, value: T) {
        self.arena.push((priority, value));
        self.sift_up(self.arena.len() - 1);
    }

    /// Remove and return the entry with the lowest priority.
    pub fn pop(&mut self) -> Option<(u64, T)> {
        if self.arena.is_empty() {
            return None;
        }
        let last = self.arena.len() - 1;
        self.arena.swap(0, last);
        let min = self.arena.pop();
        self.sift_down(0);
        min
    }

    /// The lowest priority in the queue.
    pub fn peek_priority(&self) -> Option<u64> {
        self.arena.first().map(|(priority, _)| *priority)
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Every entry, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &T)> {
        self.arena.iter().map(|(priority, value)| (*priority, value))
    }

    pub fn clear(&mut self) {
        self.arena.clear()
    }

    fn sift_up(&mut self, mut index: usize) {
        while index > 0 {
            let parent = (index - 1) / 2;
            if self.arena[parent].0 <= self.arena[index].0 {
                break;
            }
            self.arena.swap(parent, index);
            index = parent;
        }
    }

    fn sift_down(&mut self, mut index: usize) {
        let len = self.arena.len();
        loop {
            let left = 2 * index + 1;
            let right = left + 1;
            let mut smallest = index;
            if left < len && self.arena[left].0 < self.arena[smallest].0 {
                smallest = left;
            }
            if right < len && self.arena[right].0 < self.arena[smallest].0 {
                smallest = right;
            }
            if smallest == index {
                return;
            }
            self.arena.swap(index, smallest);
            index = smallest;
        }
    }
}

impl<T> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
