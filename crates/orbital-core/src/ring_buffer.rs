// SPDX-License-Identifier: MIT

//! Fixed-capacity ring buffer (spec.md §3, §4.2, §8).
//!
//! Writes never block or fail; once full, each write overwrites the oldest
//! entry. `read_all` always returns items in insertion order.

use parking_lot::Mutex;
use std::sync::Arc;

struct Inner<T> {
    buf: Vec<Option<T>>,
    capacity: usize,
    /// Index the next write will land on.
    write_pos: usize,
    /// Number of live entries, saturating at `capacity`.
    count: usize,
}

/// A locked, fixed-capacity ring buffer safe to share across threads.
#[derive(Clone)]
pub struct RingBuffer<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T: Clone> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be nonzero");
        Self {
            inner: Arc::new(Mutex::new(Inner {
                buf: (0..capacity).map(|_| None).collect(),
                capacity,
                write_pos: 0,
                count: 0,
            })),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }

    /// Append an item, overwriting the oldest entry once full.
    pub fn push(&self, item: T) {
        let mut inner = self.inner.lock();
        let pos = inner.write_pos;
        let cap = inner.capacity;
        inner.buf[pos] = Some(item);
        inner.write_pos = (pos + 1) % cap;
        inner.count = (inner.count + 1).min(cap);
    }

    /// Snapshot all live items in insertion order.
    pub fn read_all(&self) -> Vec<T> {
        let inner = self.inner.lock();
        let cap = inner.capacity;
        let count = inner.count;
        let start = if count < cap { 0 } else { inner.write_pos };

        let mut out = Vec::with_capacity(count);
        for i in 0..count {
            let idx = (start + i) % cap;
            if let Some(item) = &inner.buf[idx] {
                out.push(item.clone());
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.inner.lock().count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "ring_buffer_tests.rs"]
mod tests;
