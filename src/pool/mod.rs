//! # Pooled serialization buffers
//!
//! Rows and events borrow their serialization buffers from a shared pool
//! and hand them back when released. The pool bounds how many spare buffers
//! it retains; a buffer obtained from the pool keeps whatever capacity it
//! grew to, and its previous contents are cleared but its memory is not
//! zeroed.
//!
//! Release is expressed through ownership: [`PooledBuf`] returns its buffer
//! to the pool on drop, so a use-after-release cannot compile.

use std::sync::{Arc, Mutex};

/// Default number of spare buffers the pool retains
const DEFAULT_MAX_SPARE: usize = 64;

#[derive(Debug, Default)]
struct PoolInner {
    spare: Mutex<Vec<Vec<u8>>>,
    max_spare: usize,
}

/// Shared pool of byte buffers
#[derive(Debug, Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    /// Create a pool retaining up to the default number of spare buffers
    pub fn new() -> Self {
        Self::with_max_spare(DEFAULT_MAX_SPARE)
    }

    /// Create a pool retaining up to `max_spare` returned buffers
    pub fn with_max_spare(max_spare: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                spare: Mutex::new(Vec::new()),
                max_spare,
            }),
        }
    }

    /// Borrow a buffer from the pool.
    ///
    /// The buffer is empty but may carry capacity from a previous use.
    pub fn get(&self) -> PooledBuf {
        let buf = {
            let mut spare = lock(&self.inner.spare);
            spare.pop().unwrap_or_default()
        };
        PooledBuf {
            buf,
            pool: Arc::clone(&self.inner),
        }
    }

    /// Number of spare buffers currently retained
    pub fn spare_count(&self) -> usize {
        lock(&self.inner.spare).len()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

/// A buffer borrowed from a [`BufferPool`].
///
/// Dereferences to `Vec<u8>`; dropping it returns the buffer to the pool.
#[derive(Debug)]
pub struct PooledBuf {
    buf: Vec<u8>,
    pool: Arc<PoolInner>,
}

impl PooledBuf {
    /// The buffered bytes
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Copy `bytes` into a fresh pooled buffer
    pub fn copied_from(pool: &BufferPool, bytes: &[u8]) -> Self {
        let mut buf = pool.get();
        buf.extend_from_slice(bytes);
        buf
    }
}

impl std::ops::Deref for PooledBuf {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        &self.buf
    }
}

impl std::ops::DerefMut for PooledBuf {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }
}

impl Drop for PooledBuf {
    fn drop(&mut self) {
        let mut buf = std::mem::take(&mut self.buf);
        buf.clear();
        let mut spare = lock(&self.pool.spare);
        if spare.len() < self.pool.max_spare {
            spare.push(buf);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}
