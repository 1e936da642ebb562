// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! An append-only queue that is read through independent cursors.
//!
//! Several consumers drain the same growing log (reachable methods, new PAG
//! edges, new call sites, ...). Each consumer owns a `QueueReader` which only
//! records its position, so readers never borrow the queue between reads and
//! never disturb each other.

use arrayvec::ArrayVec;
use std::fmt::{Debug, Formatter, Result};

// The maximum number of elements a chunk can hold.
const CHUNK_CAP: usize = 60;

/// The queue is a list of fixed-size chunks so that pushing never moves
/// elements that have already been appended.
pub struct ChunkedQueue<T> {
    chunks: Vec<ArrayVec<T, CHUNK_CAP>>,
    len: usize,
}

impl<T: Debug> Debug for ChunkedQueue<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T> Default for ChunkedQueue<T> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ChunkedQueue<T> {
    #[inline]
    pub fn new() -> Self {
        ChunkedQueue {
            chunks: vec![ArrayVec::new()],
            len: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Appends an element to the back of a queue.
    pub fn push(&mut self, elem: T) {
        if self.chunks.last().map_or(true, |chunk| chunk.is_full()) {
            self.chunks.push(ArrayVec::new());
        }
        if let Some(tail) = self.chunks.last_mut() {
            tail.push(elem);
        }
        self.len += 1;
    }

    /// Returns a reader positioned at the head of the queue.
    #[inline]
    pub fn reader(&self) -> QueueReader {
        QueueReader { chunk: 0, index: 0 }
    }

    /// Iterates over every element pushed so far.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.chunks.iter().flat_map(|chunk| chunk.iter())
    }

    fn get(&self, chunk: usize, index: usize) -> Option<&T> {
        self.chunks.get(chunk).and_then(|c| c.get(index))
    }
}

/// A cursor into a `ChunkedQueue`. Copying a reader forks an independent
/// cursor at the same position.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct QueueReader {
    chunk: usize,
    index: usize,
}

impl QueueReader {
    /// Returns the next unread element, advancing the cursor.
    pub fn next<'q, T>(&mut self, queue: &'q ChunkedQueue<T>) -> Option<&'q T> {
        if self.index == CHUNK_CAP {
            if self.chunk + 1 >= queue.chunks.len() {
                return None;
            }
            self.chunk += 1;
            self.index = 0;
        }
        let elem = queue.get(self.chunk, self.index)?;
        self.index += 1;
        Some(elem)
    }

    /// Like `next` but copies the element out so that the queue can be
    /// mutated while the element is in use.
    #[inline]
    pub fn next_copied<T: Copy>(&mut self, queue: &ChunkedQueue<T>) -> Option<T> {
        self.next(queue).copied()
    }

    #[inline]
    pub fn next_cloned<T: Clone>(&mut self, queue: &ChunkedQueue<T>) -> Option<T> {
        self.next(queue).cloned()
    }

    /// Returns true if an element is waiting for this reader.
    pub fn has_next<T>(&self, queue: &ChunkedQueue<T>) -> bool {
        let mut cursor = *self;
        cursor.next(queue).is_some()
    }
}
