use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{PageId, PAGE_SIZE};

use super::PageFrame;

/// Callback invoked exactly once when a guard releases its pin. Receives
/// the page id and the accumulated dirty flag.
type ReleaseCallback = Box<dyn FnOnce(PageId, bool) + Send + Sync>;

/// RAII guard holding a pin on a page without latching its data.
/// Unpins the page when dropped, reporting whether it was dirtied.
pub struct PageGuard {
    page_id: PageId,
    /// Keeps the frame alive for the guard's lifetime
    frame: Arc<PageFrame>,
    release_callback: Option<ReleaseCallback>,
    is_dirty: bool,
}

impl PageGuard {
    pub(crate) fn new(
        page_id: PageId,
        frame: Arc<PageFrame>,
        release_callback: ReleaseCallback,
    ) -> Self {
        Self {
            page_id,
            frame,
            release_callback: Some(release_callback),
            is_dirty: false,
        }
    }

    /// Returns the page ID.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns the pinned frame. Callers reading or writing its data
    /// must take the frame latch themselves.
    pub fn frame(&self) -> &Arc<PageFrame> {
        &self.frame
    }

    /// Marks the page as modified; the dirty flag is reported to the
    /// buffer pool when the guard drops.
    pub fn mark_dirty(&mut self) {
        self.is_dirty = true;
    }

    /// Drops this guard, releasing the pin.
    pub fn drop_guard(self) {
        drop(self);
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        if let Some(callback) = self.release_callback.take() {
            callback(self.page_id, self.is_dirty);
        }
    }
}

/// RAII guard for read-only access to a page. Holds the pin and the
/// frame's shared latch; both are released when the guard drops, latch
/// first.
pub struct ReadPageGuard {
    guard: PageGuard,
    /// Shared latch on the page data. Dropped before `guard` unpins.
    data_guard: Option<RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>>>,
}

impl ReadPageGuard {
    /// Creates a new ReadPageGuard, acquiring the frame's shared latch.
    ///
    /// # Safety
    ///
    /// The caller must ensure that the frame outlives this guard. The
    /// `Arc` held by the inner guard satisfies this.
    pub(crate) unsafe fn new(
        page_id: PageId,
        frame: Arc<PageFrame>,
        release_callback: ReleaseCallback,
    ) -> Self {
        let data_guard = frame.data.read();
        // Erase the borrow of `frame`; the Arc in the base guard keeps
        // the lock alive for as long as this guard exists.
        let data_guard: RwLockReadGuard<'static, Box<[u8; PAGE_SIZE]>> =
            std::mem::transmute(data_guard);

        Self {
            guard: PageGuard::new(page_id, frame, release_callback),
            data_guard: Some(data_guard),
        }
    }

    /// Returns the page ID.
    pub fn page_id(&self) -> PageId {
        self.guard.page_id()
    }

    /// Returns a reference to the page data.
    pub fn data(&self) -> &[u8] {
        &self.data_guard.as_ref().unwrap()[..]
    }

    /// Drops this guard, releasing the latch and the pin.
    pub fn drop_guard(self) {
        drop(self);
    }
}

impl Deref for ReadPageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        // Release the latch here; the inner guard then unpins when its
        // own drop runs.
        self.data_guard.take();
    }
}

/// RAII guard for exclusive access to a page. Holds the pin and the
/// frame's exclusive latch; the first mutable access marks the page
/// dirty. Drop releases the latch, then unpins.
pub struct WritePageGuard {
    guard: PageGuard,
    /// Exclusive latch on the page data. Dropped before `guard` unpins.
    data_guard: Option<RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>>>,
}

impl WritePageGuard {
    /// Creates a new WritePageGuard, acquiring the frame's exclusive
    /// latch.
    ///
    /// # Safety
    ///
    /// The caller must ensure that the frame outlives this guard. The
    /// `Arc` held by the inner guard satisfies this.
    pub(crate) unsafe fn new(
        page_id: PageId,
        frame: Arc<PageFrame>,
        release_callback: ReleaseCallback,
    ) -> Self {
        let data_guard = frame.data.write();
        // Erase the borrow of `frame`; the Arc in the base guard keeps
        // the lock alive for as long as this guard exists.
        let data_guard: RwLockWriteGuard<'static, Box<[u8; PAGE_SIZE]>> =
            std::mem::transmute(data_guard);

        Self {
            guard: PageGuard::new(page_id, frame, release_callback),
            data_guard: Some(data_guard),
        }
    }

    /// Returns the page ID.
    pub fn page_id(&self) -> PageId {
        self.guard.page_id()
    }

    /// Returns a reference to the page data.
    pub fn data(&self) -> &[u8] {
        &self.data_guard.as_ref().unwrap()[..]
    }

    /// Returns a mutable reference to the page data and marks the page
    /// dirty.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.guard.is_dirty = true;
        &mut self.data_guard.as_mut().unwrap()[..]
    }

    /// Drops this guard, releasing the latch and the pin.
    pub fn drop_guard(self) {
        drop(self);
    }
}

impl Deref for WritePageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl DerefMut for WritePageGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_mut()
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        // Release the latch here; the inner guard then unpins when its
        // own drop runs.
        self.data_guard.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::FrameId;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_basic_page_guard_release() {
        let frame = Arc::new(PageFrame::new(FrameId::new(0)));
        frame.set_page_id(PageId::new(1));

        let released = Arc::new(AtomicBool::new(false));
        let dirty = Arc::new(AtomicBool::new(false));
        let released_clone = released.clone();
        let dirty_clone = dirty.clone();

        let mut guard = PageGuard::new(
            PageId::new(1),
            frame,
            Box::new(move |_, is_dirty| {
                released_clone.store(true, Ordering::SeqCst);
                dirty_clone.store(is_dirty, Ordering::SeqCst);
            }),
        );

        assert_eq!(guard.page_id(), PageId::new(1));
        guard.mark_dirty();
        assert!(!released.load(Ordering::SeqCst));

        drop(guard);
        assert!(released.load(Ordering::SeqCst));
        assert!(dirty.load(Ordering::SeqCst));
    }

    #[test]
    fn test_read_page_guard() {
        let frame = Arc::new(PageFrame::new(FrameId::new(0)));
        frame.set_page_id(PageId::new(1));

        let mut data = [0u8; PAGE_SIZE];
        data[0] = 42;
        frame.load(&data);

        let released = Arc::new(AtomicBool::new(false));
        let released_clone = released.clone();

        let guard = unsafe {
            ReadPageGuard::new(
                PageId::new(1),
                frame.clone(),
                Box::new(move |_, _| {
                    released_clone.store(true, Ordering::SeqCst);
                }),
            )
        };

        assert_eq!(guard.page_id(), PageId::new(1));
        assert_eq!(guard.data()[0], 42);
        assert!(!released.load(Ordering::SeqCst));

        drop(guard);
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_write_page_guard() {
        let frame = Arc::new(PageFrame::new(FrameId::new(0)));
        frame.set_page_id(PageId::new(1));

        let released = Arc::new(AtomicBool::new(false));
        let dirty = Arc::new(AtomicBool::new(false));
        let released_clone = released.clone();
        let dirty_clone = dirty.clone();

        let mut guard = unsafe {
            WritePageGuard::new(
                PageId::new(1),
                frame.clone(),
                Box::new(move |_, is_dirty| {
                    released_clone.store(true, Ordering::SeqCst);
                    dirty_clone.store(is_dirty, Ordering::SeqCst);
                }),
            )
        };

        assert_eq!(guard.page_id(), PageId::new(1));

        guard.data_mut()[0] = 42;

        assert!(!released.load(Ordering::SeqCst));

        drop(guard);
        assert!(released.load(Ordering::SeqCst));
        assert!(dirty.load(Ordering::SeqCst));

        assert_eq!(frame.snapshot()[0], 42);
    }

    #[test]
    fn test_read_guard_untouched_is_clean() {
        let frame = Arc::new(PageFrame::new(FrameId::new(0)));

        let dirty = Arc::new(AtomicBool::new(true));
        let dirty_clone = dirty.clone();

        let guard = unsafe {
            ReadPageGuard::new(
                PageId::new(0),
                frame,
                Box::new(move |_, is_dirty| {
                    dirty_clone.store(is_dirty, Ordering::SeqCst);
                }),
            )
        };
        drop(guard);
        assert!(!dirty.load(Ordering::SeqCst));
    }
}
