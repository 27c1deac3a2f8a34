//! Buffer pool contract: `acquire(capacity, direct)` / `release(buf)`.
//!
//! The flush engine never allocates payload buffers (those are borrowed
//! from the submitter); it only allocates header buffers and the shared
//! aggregate through this pool, so callers can bound and reuse that
//! memory independently of application traffic.

use std::sync::Mutex;

use crate::error::FlushError;

/// A pool-owned, growable byte buffer.
///
/// `PoolBuf` wraps a plain `Vec<u8>`. A "direct" buffer (the `direct` flag
/// on `acquire`) is a hint to pool implementations that may back buffers
/// with off-heap or pinned memory for real transports; the default pools
/// ignore it and only honor the requested capacity.
#[derive(Debug)]
pub struct PoolBuf {
    data: Vec<u8>,
}

impl PoolBuf {
    pub(crate) fn with_capacity(capacity: usize) -> PoolBuf {
        PoolBuf { data: Vec::with_capacity(capacity) }
    }

    pub(crate) fn from_vec(data: Vec<u8>) -> PoolBuf {
        PoolBuf { data }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    pub fn clear(&mut self) {
        self.data.clear()
    }

    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes)
    }

    pub(crate) fn as_vec_mut(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }

    pub(crate) fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

/// Acquires and releases reusable buffers by capacity.
///
/// `acquire` must never block indefinitely; a failure surfaces as
/// `FlushError::PoolExhausted`, which the engine treats the same as a
/// transport write failure (it latches and fails the in-flight drain).
/// `release` is called at most once per buffer the engine acquired.
pub trait BufferPool: Send + Sync {
    fn acquire(&self, capacity: usize, direct: bool) -> Result<PoolBuf, FlushError>;
    fn release(&self, buf: PoolBuf);
}

/// The simplest legal pool: a fresh heap allocation on every `acquire`,
/// no reuse. Fine for low-throughput flushers or tests; `CachingPool` is
/// the one to reach for under sustained load.
#[derive(Debug, Default)]
pub struct HeapPool;

impl BufferPool for HeapPool {
    fn acquire(&self, capacity: usize, _direct: bool) -> Result<PoolBuf, FlushError> {
        Ok(PoolBuf::with_capacity(capacity))
    }

    fn release(&self, _buf: PoolBuf) {}
}

/// A pool that keeps released buffers around for reuse, bucketed loosely
/// by capacity.
pub struct CachingPool {
    free: Mutex<Vec<Vec<u8>>>,
    max_cached: usize,
}

impl CachingPool {
    pub fn new() -> CachingPool {
        CachingPool::with_max_cached(64)
    }

    pub fn with_max_cached(max_cached: usize) -> CachingPool {
        CachingPool { free: Mutex::new(Vec::new()), max_cached }
    }
}

impl Default for CachingPool {
    fn default() -> CachingPool {
        CachingPool::new()
    }
}

impl BufferPool for CachingPool {
    fn acquire(&self, capacity: usize, _direct: bool) -> Result<PoolBuf, FlushError> {
        let mut free = self.free.lock().map_err(|_| FlushError::PoolExhausted)?;
        if let Some(pos) = free.iter().position(|buf| buf.capacity() >= capacity) {
            let mut buf = free.swap_remove(pos);
            buf.clear();
            return Ok(PoolBuf::from_vec(buf));
        }
        Ok(PoolBuf::with_capacity(capacity))
    }

    fn release(&self, buf: PoolBuf) {
        if let Ok(mut free) = self.free.lock() {
            if free.len() < self.max_cached {
                free.push(buf.into_vec());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heap_pool_always_grants() {
        let pool = HeapPool;
        let buf = pool.acquire(128, false).unwrap();
        assert!(buf.capacity() >= 128);
        pool.release(buf);
    }

    #[test]
    fn caching_pool_reuses_released_buffers() {
        let pool = CachingPool::new();
        let mut buf = pool.acquire(64, false).unwrap();
        buf.extend_from_slice(b"hello");
        let cap = buf.capacity();
        pool.release(buf);

        let reused = pool.acquire(32, false).unwrap();
        assert!(reused.is_empty());
        assert!(reused.capacity() >= cap.min(32));
    }

    #[test]
    fn caching_pool_respects_max_cached() {
        let pool = CachingPool::with_max_cached(1);
        pool.release(PoolBuf::with_capacity(16));
        pool.release(PoolBuf::with_capacity(16));
        assert_eq!(pool.free.lock().unwrap().len(), 1);
    }
}
