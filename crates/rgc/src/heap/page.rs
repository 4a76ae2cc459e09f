//! Page Management - Page helpers and the page source seam
//!
//! Regions are reserved from a [`PageSource`] one region at a time, so the
//! backing memory of the space may be discontiguous. [`MmapPageSource`]
//! backs each reservation with an anonymous `memmap2` mapping.

use crate::error::{Result, RgcError};
use memmap2::{MmapMut, MmapOptions};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// System page size (cached)
static SYSTEM_PAGE_SIZE: AtomicUsize = AtomicUsize::new(0);

/// Get system page size dynamically
///
/// Returns actual system page size from OS.
/// Caches result for performance.
pub fn get_page_size() -> usize {
    let cached = SYSTEM_PAGE_SIZE.load(Ordering::Relaxed);
    if cached != 0 {
        return cached;
    }

    let size = page_size::get();
    SYSTEM_PAGE_SIZE.store(size, Ordering::Relaxed);
    size
}

/// Convert pages to bytes
pub fn pages_to_bytes(pages: usize) -> usize {
    pages * get_page_size()
}

/// Convert bytes to pages (round up)
pub fn bytes_to_pages(bytes: usize) -> usize {
    bytes.div_ceil(get_page_size())
}

/// Check if address is page-aligned
pub fn is_page_aligned(addr: usize) -> bool {
    addr % get_page_size() == 0
}

/// Source of page-aligned memory for regions
pub trait PageSource: Send + Sync {
    /// Reserve `pages` contiguous, zeroed, writable pages.
    ///
    /// Returns the base address. The memory must stay mapped for the
    /// lifetime of the source.
    fn reserve_pages(&self, pages: usize) -> Result<usize>;

    /// Total pages handed out so far
    fn reserved_pages(&self) -> usize;
}

/// Page source backed by anonymous memory mappings
///
/// Every reservation is a separate mapping. Mappings are unmapped when
/// the source is dropped.
pub struct MmapPageSource {
    mappings: Mutex<Vec<MmapMut>>,
    reserved: AtomicUsize,
    limit: Option<usize>,
}

impl MmapPageSource {
    /// Create an unbounded source
    pub fn new() -> Self {
        Self {
            mappings: Mutex::new(Vec::new()),
            reserved: AtomicUsize::new(0),
            limit: None,
        }
    }

    /// Create a source that refuses to hand out more than `max_pages`
    pub fn with_limit(max_pages: usize) -> Self {
        Self {
            limit: Some(max_pages),
            ..Self::new()
        }
    }

    /// Number of live mappings
    pub fn mapping_count(&self) -> usize {
        self.mappings.lock().len()
    }
}

impl Default for MmapPageSource {
    fn default() -> Self {
        Self::new()
    }
}

impl PageSource for MmapPageSource {
    fn reserve_pages(&self, pages: usize) -> Result<usize> {
        if pages == 0 {
            return Err(RgcError::InvalidArgument(
                "cannot reserve zero pages".to_string(),
            ));
        }

        let mut mappings = self.mappings.lock();
        let reserved = self.reserved.load(Ordering::Relaxed);
        if let Some(limit) = self.limit {
            if reserved + pages > limit {
                return Err(RgcError::VirtualMemoryError(format!(
                    "page limit {} reached ({} reserved, {} requested)",
                    limit, reserved, pages
                )));
            }
        }

        let mut mmap = MmapOptions::new()
            .len(pages_to_bytes(pages))
            .map_anon()
            .map_err(|e| {
                RgcError::VirtualMemoryError(format!("Failed to create anonymous mapping: {}", e))
            })?;

        let base = mmap.as_mut_ptr() as usize;
        mappings.push(mmap);
        self.reserved.store(reserved + pages, Ordering::Relaxed);

        log::trace!("Reserved {} pages at {:#x}", pages, base);
        Ok(base)
    }

    fn reserved_pages(&self) -> usize {
        self.reserved.load(Ordering::Relaxed)
    }
}
