//! Heap and allocation profiles
//!
//! The counters are fed by [`TrackingAllocator`], which a host installs as its
//! `#[global_allocator]`. Without it the heap and allocs profiles are written
//! with zero values.

#![allow(unsafe_code)] // GlobalAlloc is an unsafe trait

use std::alloc::{GlobalAlloc, Layout, System};
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::ProfileWriteError;

use super::encode::{write_profile, ProfileBuilder};

static ALLOC_OBJECTS: AtomicU64 = AtomicU64::new(0);
static ALLOC_BYTES: AtomicU64 = AtomicU64::new(0);
static FREE_OBJECTS: AtomicU64 = AtomicU64::new(0);
static FREE_BYTES: AtomicU64 = AtomicU64::new(0);

/// Global allocator wrapper that counts allocations and frees.
///
/// ```ignore
/// #[global_allocator]
/// static ALLOC: autoprof::TrackingAllocator = autoprof::TrackingAllocator::system();
/// ```
#[derive(Debug, Default)]
pub struct TrackingAllocator<A = System> {
    inner: A,
}

impl TrackingAllocator<System> {
    #[must_use]
    pub const fn system() -> Self {
        Self { inner: System }
    }
}

impl<A> TrackingAllocator<A> {
    pub const fn new(inner: A) -> Self {
        Self { inner }
    }
}

fn record_alloc(size: usize) {
    ALLOC_OBJECTS.fetch_add(1, Ordering::Relaxed);
    ALLOC_BYTES.fetch_add(size as u64, Ordering::Relaxed);
}

fn record_free(size: usize) {
    FREE_OBJECTS.fetch_add(1, Ordering::Relaxed);
    FREE_BYTES.fetch_add(size as u64, Ordering::Relaxed);
}

// SAFETY: every call is forwarded unchanged to the inner allocator; the
// wrapper only updates atomic counters, which never allocate.
unsafe impl<A: GlobalAlloc> GlobalAlloc for TrackingAllocator<A> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = self.inner.alloc(layout);
        if !ptr.is_null() {
            record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = self.inner.alloc_zeroed(layout);
        if !ptr.is_null() {
            record_alloc(layout.size());
        }
        ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        self.inner.dealloc(ptr, layout);
        record_free(layout.size());
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = self.inner.realloc(ptr, layout, new_size);
        if !new_ptr.is_null() {
            record_free(layout.size());
            record_alloc(new_size);
        }
        new_ptr
    }
}

/// Totals since process start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeapStats {
    pub alloc_objects: u64,
    pub alloc_bytes: u64,
    pub free_objects: u64,
    pub free_bytes: u64,
}

impl HeapStats {
    /// Read the current counters
    #[must_use]
    pub fn current() -> Self {
        // Frees are read first so in-use never goes negative under a racing alloc
        let free_objects = FREE_OBJECTS.load(Ordering::Relaxed);
        let free_bytes = FREE_BYTES.load(Ordering::Relaxed);
        Self {
            alloc_objects: ALLOC_OBJECTS.load(Ordering::Relaxed),
            alloc_bytes: ALLOC_BYTES.load(Ordering::Relaxed),
            free_objects,
            free_bytes,
        }
    }

    #[must_use]
    pub fn inuse_objects(&self) -> u64 {
        self.alloc_objects.saturating_sub(self.free_objects)
    }

    #[must_use]
    pub fn inuse_bytes(&self) -> u64 {
        self.alloc_bytes.saturating_sub(self.free_bytes)
    }
}

/// Whether a [`TrackingAllocator`] is this process's global allocator.
///
/// Makes a few allocations through the global allocator and checks that each
/// one was counted. A local instance only bumps the counters while it is in use,
/// so it is unlikely to make every check pass.
#[must_use]
pub fn tracking_installed() -> bool {
    (0..4).all(|_| {
        let before = ALLOC_OBJECTS.load(Ordering::SeqCst);
        let sentinel = std::hint::black_box(Box::new(0u64));
        let counted = ALLOC_OBJECTS.load(Ordering::SeqCst) > before;
        drop(sentinel);
        counted
    })
}

fn to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Build the heap-shaped profile; `default_type` selects what the viewer shows first.
fn heap_profile(stats: HeapStats, default_type: &str) -> super::encode::Profile {
    let mut builder = ProfileBuilder::new(&[
        ("alloc_objects", "count"),
        ("alloc_space", "bytes"),
        ("inuse_objects", "count"),
        ("inuse_space", "bytes"),
    ])
    .period("space", "bytes", 1)
    .default_sample_type(default_type);

    builder.sample(
        &[process_frame().as_str()],
        vec![
            to_i64(stats.alloc_objects),
            to_i64(stats.alloc_bytes),
            to_i64(stats.inuse_objects()),
            to_i64(stats.inuse_bytes()),
        ],
        &[],
    );
    builder.build()
}

/// Name of the synthetic root frame the totals are attributed to
fn process_frame() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "process".to_string())
}

fn write_heap_shaped(out: &mut dyn Write, default_type: &str) -> Result<(), ProfileWriteError> {
    if !tracking_installed() {
        log::warn!("TrackingAllocator is not the global allocator; heap counters are empty");
    }
    write_profile(&heap_profile(HeapStats::current(), default_type), out)
}

/// Live objects and bytes
///
/// # Errors
/// Returns the I/O error if the profile cannot be written.
pub fn write_heap(out: &mut dyn Write) -> Result<(), ProfileWriteError> {
    write_heap_shaped(out, "inuse_space")
}

/// Same counters as the heap profile, opened on total allocations
///
/// # Errors
/// Returns the I/O error if the profile cannot be written.
pub fn write_allocs(out: &mut dyn Write) -> Result<(), ProfileWriteError> {
    write_heap_shaped(out, "alloc_space")
}
