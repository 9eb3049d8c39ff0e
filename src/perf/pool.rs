//! Reusable buffer pool.
//!
//! Frame crops handed to the secondary detector are large allocations made
//! at display rate; pooling them keeps the per-frame cost to a free-list
//! pop. Buffers are keyed by (width, height, channels) so a returned buffer
//! is only ever reused for an identical layout.

use std::collections::HashMap;

/// A reusable pixel buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub data: Vec<u8>,
}

impl PixelBuffer {
    #[must_use]
    pub fn new(width: u32, height: u32, channels: u8) -> Self {
        let len = width as usize * height as usize * channels as usize;
        Self {
            width,
            height,
            channels,
            data: vec![0; len],
        }
    }

    fn key(&self) -> BufferKey {
        (self.width, self.height, self.channels)
    }

    /// Zero the contents before the buffer re-enters the pool
    fn clear(&mut self) {
        self.data.fill(0);
    }
}

type BufferKey = (u32, u32, u8);

/// Pool statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolStats {
    pub pool_size: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub total_allocations: u64,
}

/// Size/type-keyed pool of reusable pixel buffers
pub struct BufferPool {
    free: HashMap<BufferKey, Vec<PixelBuffer>>,
    capacity: usize,
    stats: PoolStats,
}

impl BufferPool {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            free: HashMap::new(),
            capacity,
            stats: PoolStats::default(),
        }
    }

    /// Take a buffer of the requested layout from the pool, allocating a
    /// fresh one on a miss.
    pub fn acquire(&mut self, width: u32, height: u32, channels: u8) -> PixelBuffer {
        let key = (width, height, channels);
        if let Some(buffer) = self.free.get_mut(&key).and_then(Vec::pop) {
            self.stats.pool_size -= 1;
            self.stats.cache_hits += 1;
            return buffer;
        }

        self.stats.cache_misses += 1;
        self.stats.total_allocations += 1;
        PixelBuffer::new(width, height, channels)
    }

    /// Return a buffer to the pool. At capacity the buffer is dropped
    /// instead; otherwise its contents are cleared and it joins the
    /// free-list for its layout.
    pub fn release(&mut self, mut buffer: PixelBuffer) {
        if self.stats.pool_size >= self.capacity {
            return;
        }

        buffer.clear();
        let key = buffer.key();
        self.free.entry(key).or_default().push(buffer);
        self.stats.pool_size += 1;
    }

    /// Pre-allocate `count` buffers for a layout, bounded by the capacity
    pub fn preallocate(&mut self, width: u32, height: u32, channels: u8, count: usize) {
        log::debug!("preallocating {count} buffers of {width}x{height}x{channels}");
        let key = (width, height, channels);
        for _ in 0..count {
            if self.stats.pool_size >= self.capacity {
                break;
            }
            self.free
                .entry(key)
                .or_default()
                .push(PixelBuffer::new(width, height, channels));
            self.stats.pool_size += 1;
            self.stats.total_allocations += 1;
        }
    }

    /// Drop every pooled buffer
    pub fn clear(&mut self) {
        self.free.clear();
        self.stats.pool_size = 0;
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    #[must_use]
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.stats.cache_hits + self.stats.cache_misses;
        if total == 0 {
            return 0.0;
        }
        self.stats.cache_hits as f64 / total as f64
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn reset_stats(&mut self) {
        let pool_size = self.stats.pool_size;
        self.stats = PoolStats {
            pool_size,
            ..PoolStats::default()
        };
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(20)
    }
}

/// Run `f` with a pooled buffer, returning it on every exit path.
///
/// The buffer is released whether `f` succeeds or returns an error through
/// its own result type.
pub fn with_buffer<R>(
    pool: &mut BufferPool,
    width: u32,
    height: u32,
    channels: u8,
    f: impl FnOnce(&mut PixelBuffer) -> R,
) -> R {
    let mut buffer = pool.acquire(width, height, channels);
    let result = f(&mut buffer);
    pool.release(buffer);
    result
}

/// Run `f` with several pooled buffers, releasing all of them afterward
pub fn with_buffers<R>(
    pool: &mut BufferPool,
    specs: &[(u32, u32, u8)],
    f: impl FnOnce(&mut [PixelBuffer]) -> R,
) -> R {
    let mut buffers: Vec<PixelBuffer> = specs
        .iter()
        .map(|&(w, h, c)| pool.acquire(w, h, c))
        .collect();
    let result = f(&mut buffers);
    for buffer in buffers {
        pool.release(buffer);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_allocates_on_empty_pool() {
        let mut pool = BufferPool::new(10);
        let buffer = pool.acquire(40, 40, 1);
        assert_eq!(buffer.data.len(), 1600);
        assert_eq!(pool.stats().cache_misses, 1);
        assert_eq!(pool.stats().total_allocations, 1);
    }

    #[test]
    fn test_release_then_acquire_reuses_buffer() {
        let mut pool = BufferPool::new(10);
        let mut buffer = pool.acquire(40, 40, 1);
        buffer.data[0] = 77;
        let ptr = buffer.data.as_ptr();

        pool.release(buffer);
        let reused = pool.acquire(40, 40, 1);

        // Same underlying allocation, contents cleared
        assert_eq!(reused.data.as_ptr(), ptr);
        assert_eq!(reused.data[0], 0);
        assert_eq!(pool.stats().cache_hits, 1);
    }

    #[test]
    fn test_different_key_misses() {
        let mut pool = BufferPool::new(10);
        let buffer = pool.acquire(40, 40, 1);
        pool.release(buffer);

        let other = pool.acquire(40, 40, 3);
        assert_eq!(other.data.len(), 4800);
        assert_eq!(pool.stats().cache_hits, 0);
        assert_eq!(pool.stats().cache_misses, 2);
    }

    #[test]
    fn test_capacity_bound() {
        let mut pool = BufferPool::new(3);
        // Release more distinct-key buffers than the capacity allows
        for i in 1..=6u32 {
            let buffer = PixelBuffer::new(i * 8, 8, 1);
            pool.release(buffer);
        }
        assert_eq!(pool.stats().pool_size, 3);
    }

    #[test]
    fn test_preallocate_respects_capacity() {
        let mut pool = BufferPool::new(4);
        pool.preallocate(32, 32, 1, 10);
        assert_eq!(pool.stats().pool_size, 4);

        // All preallocated buffers are hits
        for _ in 0..4 {
            pool.acquire(32, 32, 1);
        }
        assert_eq!(pool.stats().cache_hits, 4);
    }

    #[test]
    fn test_with_buffer_releases_on_success() {
        let mut pool = BufferPool::new(10);
        let sum = with_buffer(&mut pool, 8, 8, 1, |buffer| {
            buffer.data[3] = 9;
            buffer.data.iter().map(|&b| u64::from(b)).sum::<u64>()
        });
        assert_eq!(sum, 9);
        assert_eq!(pool.stats().pool_size, 1);
    }

    #[test]
    fn test_with_buffer_releases_on_error_path() {
        let mut pool = BufferPool::new(10);
        let result: Result<(), String> =
            with_buffer(&mut pool, 8, 8, 1, |_buffer| Err("detector failed".into()));
        assert!(result.is_err());
        // Buffer still returned to the pool
        assert_eq!(pool.stats().pool_size, 1);
    }

    #[test]
    fn test_with_buffers_scoped_use() {
        let mut pool = BufferPool::new(10);
        with_buffers(&mut pool, &[(8, 8, 1), (16, 16, 3)], |buffers| {
            assert_eq!(buffers.len(), 2);
            assert_eq!(buffers[1].data.len(), 768);
        });
        assert_eq!(pool.stats().pool_size, 2);
    }

    #[test]
    fn test_clear_empties_pool() {
        let mut pool = BufferPool::new(10);
        pool.preallocate(8, 8, 1, 5);
        pool.clear();
        assert_eq!(pool.stats().pool_size, 0);
        pool.acquire(8, 8, 1);
        assert_eq!(pool.stats().cache_misses, 1);
    }
}
