//! Bounded free-list of reusable parse contexts.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::ParseContext;

/// Recycles `ParseContext` buffers between calls.
///
/// `acquire` hands out a blank context (recycled if one is free); `release`
/// resets it and keeps it while the pool is below capacity. A context is
/// owned by exactly one caller between the two calls.
#[derive(Debug)]
pub struct ContextPool {
    free: Mutex<Vec<ParseContext>>,
    capacity: usize,
    allocated: AtomicUsize,
    reused: AtomicUsize,
}

impl ContextPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            free: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
            allocated: AtomicUsize::new(0),
            reused: AtomicUsize::new(0),
        }
    }

    /// Take a blank context out of the pool
    pub fn acquire(&self) -> ParseContext {
        let recycled = self.free.lock().unwrap_or_else(|e| e.into_inner()).pop();
        match recycled {
            Some(ctx) => {
                self.reused.fetch_add(1, Ordering::Relaxed);
                ctx
            }
            None => {
                self.allocated.fetch_add(1, Ordering::Relaxed);
                ParseContext::default()
            }
        }
    }

    /// Take a context and fill it for a document
    pub fn acquire_for(&self, file_path: &str, content: &str, mod_time: i64) -> ParseContext {
        let mut ctx = self.acquire();
        ctx.fill(file_path, content, mod_time);
        ctx
    }

    /// Reset a context and return it to the pool; dropped when the pool is full
    pub fn release(&self, mut ctx: ParseContext) {
        ctx.reset();
        let mut free = self.free.lock().unwrap_or_else(|e| e.into_inner());
        if free.len() < self.capacity {
            free.push(ctx);
        }
    }

    /// Contexts currently waiting for reuse
    pub fn available(&self) -> usize {
        self.free.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Fresh allocations made by `acquire`
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }

    /// Acquisitions satisfied from the free list
    pub fn reused(&self) -> usize {
        self.reused.load(Ordering::Relaxed)
    }
}

impl Default for ContextPool {
    fn default() -> Self {
        Self::new(32)
    }
}
