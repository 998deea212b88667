use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::{FrameId, PageId, INVALID_PAGE_ID, PAGE_SIZE};

/// A single slot in the buffer pool: the header for whatever page is
/// resident plus the page bytes themselves.
///
/// Header fields only change while the pool's bookkeeping lock is held;
/// they are atomics so guards and introspection can read them without
/// taking that lock. The byte buffer sits behind its own reader-writer
/// latch, which the page guards acquire on behalf of callers.
pub struct PageFrame {
    /// Position of this slot in the pool, fixed for the pool's lifetime
    frame_id: FrameId,
    /// Id of the resident page; INVALID_PAGE_ID while the slot is free
    page_id: AtomicI32,
    /// Outstanding pins; a pinned frame may not be evicted
    pin_count: AtomicU32,
    /// Set when the resident page diverges from its on-disk image
    dirty: AtomicBool,
    /// Page bytes behind the per-frame latch (pub(crate) so the guards
    /// can hold the latch for their whole lifetime)
    pub(crate) data: RwLock<Box<[u8; PAGE_SIZE]>>,
}

impl PageFrame {
    /// Creates the frame for slot `frame_id`, initially free.
    pub fn new(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            page_id: AtomicI32::new(INVALID_PAGE_ID.as_i32()),
            pin_count: AtomicU32::new(0),
            dirty: AtomicBool::new(false),
            data: RwLock::new(Box::new([0u8; PAGE_SIZE])),
        }
    }

    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    pub fn page_id(&self) -> PageId {
        PageId::new(self.page_id.load(Ordering::SeqCst))
    }

    pub fn set_page_id(&self, page_id: PageId) {
        self.page_id.store(page_id.as_i32(), Ordering::SeqCst);
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::SeqCst)
    }

    /// Takes one more pin on the frame.
    pub fn pin(&self) {
        self.pin_count.fetch_add(1, Ordering::SeqCst);
    }

    /// Releases one pin and returns the count that remains. A frame
    /// with no pins stays at zero and reports None instead of wrapping.
    pub fn unpin(&self) -> Option<u32> {
        self.pin_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                count.checked_sub(1)
            })
            .ok()
            .map(|previous| previous - 1)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    pub fn set_dirty(&self, dirty: bool) {
        self.dirty.store(dirty, Ordering::SeqCst);
    }

    /// Acquires the frame latch in shared mode.
    pub fn latch_read(&self) -> RwLockReadGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.data.read()
    }

    /// Acquires the frame latch in exclusive mode.
    pub fn latch_write(&self) -> RwLockWriteGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.data.write()
    }

    /// Replaces the page bytes with `src`, which must be exactly one
    /// page long.
    pub fn load(&self, src: &[u8]) {
        self.data.write().copy_from_slice(src);
    }

    /// Returns an owned copy of the current page bytes, e.g. to hand to
    /// the disk layer while the frame stays available to readers.
    pub fn snapshot(&self) -> Box<[u8; PAGE_SIZE]> {
        Box::new(**self.data.read())
    }

    /// Zeroes the page bytes without touching the header.
    pub fn reset_memory(&self) {
        self.data.write().fill(0);
    }

    /// Returns the slot to its free state: no resident page, no pins,
    /// clean, zeroed bytes.
    pub fn reset(&self) {
        self.set_page_id(INVALID_PAGE_ID);
        self.pin_count.store(0, Ordering::SeqCst);
        self.set_dirty(false);
        self.reset_memory();
    }
}
