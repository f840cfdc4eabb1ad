// SPDX-License-Identifier: GPL-3.0-only

//! Fixed-capacity pool of RGBA pixel buffers
//!
//! Buffers go back to the pool when the [`PooledBuffer`] is dropped, which
//! may happen on a GStreamer streaming thread long after the encoder handed
//! it over. When every buffer is in flight `acquire` returns `None` and the
//! caller drops the frame.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

struct PoolInner {
    free: Mutex<Vec<Vec<u8>>>,
    buffer_size: usize,
    capacity: usize,
    allocated: AtomicUsize,
}

/// Pool of equally sized byte buffers
#[derive(Clone)]
pub struct PixelBufferPool {
    inner: Arc<PoolInner>,
    width: u32,
    height: u32,
}

impl PixelBufferPool {
    /// Pool of `capacity` RGBA buffers of `width x height`
    ///
    /// Buffers are allocated lazily up to `capacity`.
    pub fn new(width: u32, height: u32, capacity: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                free: Mutex::new(Vec::with_capacity(capacity)),
                buffer_size: width as usize * height as usize * 4,
                capacity: capacity.max(1),
                allocated: AtomicUsize::new(0),
            }),
            width,
            height,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn buffer_size(&self) -> usize {
        self.inner.buffer_size
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Buffers currently held outside the pool
    pub fn in_flight(&self) -> usize {
        let free = self.inner.free.lock().map(|f| f.len()).unwrap_or(0);
        self.inner.allocated.load(Ordering::SeqCst).saturating_sub(free)
    }

    /// Take a buffer, or `None` when the pool is exhausted
    pub fn acquire(&self) -> Option<PooledBuffer> {
        let recycled = self.inner.free.lock().ok().and_then(|mut f| f.pop());
        let data = match recycled {
            Some(data) => data,
            None => {
                let claimed = self.inner.allocated.fetch_update(
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                    |n| (n < self.inner.capacity).then_some(n + 1),
                );
                claimed.ok()?;
                vec![0u8; self.inner.buffer_size]
            }
        };
        Some(PooledBuffer {
            data: Some(data),
            pool: Arc::clone(&self.inner),
        })
    }
}

/// A buffer on loan from a [`PixelBufferPool`]
pub struct PooledBuffer {
    data: Option<Vec<u8>>,
    pool: Arc<PoolInner>,
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.data.as_deref().unwrap_or(&[])
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.data.as_deref_mut().unwrap_or(&mut [])
    }
}

impl AsRef<[u8]> for PooledBuffer {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

impl AsMut<[u8]> for PooledBuffer {
    fn as_mut(&mut self) -> &mut [u8] {
        self
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(data) = self.data.take()
            && let Ok(mut free) = self.pool.free.lock()
        {
            free.push(data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_exhausts_at_capacity() {
        let pool = PixelBufferPool::new(2, 2, 2);
        let a = pool.acquire().expect("first");
        let b = pool.acquire().expect("second");
        assert!(pool.acquire().is_none());
        assert_eq!(pool.in_flight(), 2);
        drop(a);
        assert!(pool.acquire().is_some());
        drop(b);
    }

    #[test]
    fn test_buffers_sized_for_rgba() {
        let pool = PixelBufferPool::new(4, 3, 1);
        let buf = pool.acquire().expect("buffer");
        assert_eq!(buf.len(), 4 * 3 * 4);
        assert_eq!(pool.buffer_size(), 48);
    }

    #[test]
    fn test_returned_buffer_is_reused() {
        let pool = PixelBufferPool::new(1, 1, 1);
        {
            let mut buf = pool.acquire().expect("buffer");
            buf[0] = 42;
        }
        let buf = pool.acquire().expect("recycled");
        assert_eq!(buf[0], 42);
        assert_eq!(pool.in_flight(), 1);
    }
}
