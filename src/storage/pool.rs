//! Reusable buffer pools
//!
//! Directory listing and metadata probing run once per directory and once
//! per candidate object, so the buffers they need are checked out from
//! process-wide pools instead of being allocated per call.
//!
//! A checkout is a `Pooled` guard. The guard owns its buffer exclusively
//! until it is dropped, at which point the buffer goes back to the pool.
//! That holds on every exit path, including `?` returns.

use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;

/// Directory reads must be at least a filesystem block long
pub const DIRENT_BLOCK_SIZE: usize = 8 << 10;

/// Record buffer size: room for many entries per getdents call (1 MiB)
pub const DIRENT_BUFFER_SIZE: usize = DIRENT_BLOCK_SIZE * 128;

/// Initial metadata read size
pub const METADATA_READ_DEFAULT: usize = 4 << 10;

/// Block size for small direct reads
pub const BLOCK_SIZE_SMALL: usize = 128 << 10;

/// Block size for large direct reads
pub const BLOCK_SIZE_LARGE: usize = 2 << 20;

/// Alignment required by O_DIRECT on common filesystems
pub const DIRECT_IO_ALIGNMENT: usize = 4096;

/// Idle buffers kept per pool; extra returns are freed
const MAX_IDLE: usize = 64;

/// Raw getdents record buffers
pub static DIRENT_POOL: LazyLock<Pool<Vec<u8>>> = LazyLock::new(|| {
    Pool::new(
        "dirent",
        || vec![0u8; DIRENT_BUFFER_SIZE],
        |buf| buf.resize(DIRENT_BUFFER_SIZE, 0),
    )
});

/// Scratch space for building `name/` strings
pub static DIRENT_NAME_POOL: LazyLock<Pool<Vec<u8>>> = LazyLock::new(|| {
    Pool::new(
        "dirent-name",
        || Vec::with_capacity(DIRENT_BLOCK_SIZE),
        |buf| buf.clear(),
    )
});

/// Metadata scratch, handed out empty with at least 4 KiB capacity
pub static METADATA_POOL: LazyLock<Pool<Vec<u8>>> = LazyLock::new(|| {
    Pool::new(
        "metadata",
        || Vec::with_capacity(METADATA_READ_DEFAULT),
        reset_metadata,
    )
});

/// `read_more` can grow a probe buffer to the whole file; only the
/// default size goes back into the pool.
fn reset_metadata(buf: &mut Vec<u8>) {
    buf.clear();
    buf.shrink_to(METADATA_READ_DEFAULT);
}

/// Aligned blocks for small direct reads
pub static DIRECT_POOL_SMALL: LazyLock<Pool<AlignedBlock>> = LazyLock::new(|| {
    Pool::new("direct-small", || AlignedBlock::new(BLOCK_SIZE_SMALL), |_| {})
});

/// Aligned blocks for large direct reads
pub static DIRECT_POOL_LARGE: LazyLock<Pool<AlignedBlock>> = LazyLock::new(|| {
    Pool::new("direct-large", || AlignedBlock::new(BLOCK_SIZE_LARGE), |_| {})
});

/// A pooled buffer with automatic return to the pool on drop
pub struct Pooled<'a, T: Send> {
    /// The buffer (Option for taking on drop)
    item: Option<T>,
    /// Pool to return to
    pool: &'a Pool<T>,
}

impl<'a, T: Send> Deref for Pooled<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Only `Drop` takes the item
        self.item.as_ref().expect("pooled item already returned")
    }
}

impl<'a, T: Send> DerefMut for Pooled<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.item.as_mut().expect("pooled item already returned")
    }
}

impl<'a, T: Send> Drop for Pooled<'a, T> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            self.pool.put(item);
        }
    }
}

/// Pool of reusable buffers
pub struct Pool<T: Send> {
    /// Buffers ready for checkout
    available: Mutex<Vec<T>>,
    /// Builds a fresh buffer when none is idle
    make: fn() -> T,
    /// Restores a returned buffer to its checkout shape
    reset: fn(&mut T),
    /// Pool name for logging
    name: &'static str,
    /// Total checkouts
    checkouts: AtomicU64,
    /// Buffers built because none was idle
    allocations: AtomicU64,
}

impl<T: Send> Pool<T> {
    /// Create a new pool
    pub fn new(name: &'static str, make: fn() -> T, reset: fn(&mut T)) -> Self {
        Self {
            available: Mutex::new(Vec::new()),
            make,
            reset,
            name,
            checkouts: AtomicU64::new(0),
            allocations: AtomicU64::new(0),
        }
    }

    /// Check out a buffer, building one if the pool is empty
    pub fn get(&self) -> Pooled<'_, T> {
        self.checkouts.fetch_add(1, Ordering::Relaxed);

        let idle = self.available.lock().pop();
        let item = match idle {
            Some(item) => item,
            None => {
                self.allocations.fetch_add(1, Ordering::Relaxed);
                (self.make)()
            }
        };

        Pooled {
            item: Some(item),
            pool: self,
        }
    }

    fn put(&self, mut item: T) {
        (self.reset)(&mut item);
        let mut available = self.available.lock();
        if available.len() < MAX_IDLE {
            available.push(item);
        } else {
            tracing::trace!(pool = self.name, "pool full, dropping returned buffer");
        }
    }

    /// Number of idle buffers
    pub fn idle(&self) -> usize {
        self.available.lock().len()
    }

    /// Total checkouts so far
    pub fn checkouts(&self) -> u64 {
        self.checkouts.load(Ordering::Relaxed)
    }

    /// Buffers built so far
    pub fn allocations(&self) -> u64 {
        self.allocations.load(Ordering::Relaxed)
    }

    /// Pool name
    pub fn name(&self) -> &'static str {
        self.name
    }

    fn log_stats(&self) {
        tracing::debug!(
            pool = self.name(),
            checkouts = self.checkouts(),
            allocations = self.allocations(),
            idle = self.idle(),
            "buffer pool usage"
        );
    }
}

/// Log checkout and allocation counts of every buffer pool
pub fn log_pool_stats() {
    DIRENT_POOL.log_stats();
    DIRENT_NAME_POOL.log_stats();
    METADATA_POOL.log_stats();
    DIRECT_POOL_SMALL.log_stats();
    DIRECT_POOL_LARGE.log_stats();
}

/// A heap block whose usable region starts on a `DIRECT_IO_ALIGNMENT` boundary
pub struct AlignedBlock {
    raw: Vec<u8>,
    offset: usize,
    len: usize,
}

impl AlignedBlock {
    /// Allocate a zeroed block of `len` usable bytes
    pub fn new(len: usize) -> Self {
        let raw = vec![0u8; len + DIRECT_IO_ALIGNMENT];
        let offset = raw.as_ptr().align_offset(DIRECT_IO_ALIGNMENT);
        // align_offset may refuse; fall back to an unaligned start and let
        // the block reader drop O_DIRECT when the kernel rejects it
        let offset = if offset < DIRECT_IO_ALIGNMENT { offset } else { 0 };
        Self { raw, offset, len }
    }

    /// Usable length
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the block has no usable bytes
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the usable region really is aligned
    pub fn is_aligned(&self) -> bool {
        (self.raw.as_ptr() as usize + self.offset) % DIRECT_IO_ALIGNMENT == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.raw[self.offset..self.offset + self.len]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.raw[self.offset..self.offset + self.len]
    }
}
