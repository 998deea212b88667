use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::common::{FerroError, FrameId, PageId, Result, INVALID_PAGE_ID, PAGE_SIZE};
use crate::storage::disk::{DiskManager, DiskScheduler};
use crate::storage::LogManager;

use super::{AccessType, LruKReplacer, PageFrame, PageGuard, ReadPageGuard, WritePageGuard};

/// Bookkeeping that must change together: the resident-page map and the
/// free list. Every public operation holds this mutex for its full
/// duration, including any disk I/O it performs.
struct PoolInner {
    page_table: HashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
}

/// State shared between the buffer pool manager and the page guards it
/// hands out. Guards keep it alive, so a guard can outlive no frame.
struct PoolState {
    frames: Vec<Arc<PageFrame>>,
    inner: Mutex<PoolInner>,
    replacer: LruKReplacer,
}

impl PoolState {
    /// Releases one pin on a resident page, OR-ing in the dirty flag.
    /// Returns false if the page is not resident or was not pinned.
    fn unpin(&self, page_id: PageId, is_dirty: bool) -> bool {
        let inner = self.inner.lock();
        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return false;
        };
        let frame = &self.frames[frame_id.as_usize()];
        if frame.pin_count() == 0 {
            return false;
        }
        if is_dirty {
            frame.set_dirty(true);
        }
        if let Some(0) = frame.unpin() {
            self.replacer.set_evictable(frame_id, true);
        }
        true
    }
}

/// BufferPoolManager mediates between the disk and the rest of the
/// engine: it caches pages in a fixed set of frames, pins pages on
/// behalf of callers, and evicts cold pages with the LRU-K policy.
///
/// Page ids are allocated here, monotonically from zero, and are never
/// reused within a process lifetime.
pub struct BufferPoolManager {
    /// Number of frames in the buffer pool
    pool_size: usize,
    /// The next page id to be allocated
    next_page_id: AtomicI32,
    /// Shared state, also captured by outstanding page guards
    state: Arc<PoolState>,
    /// Disk scheduler backing all page I/O
    disk_scheduler: DiskScheduler,
    /// WAL hook; held for the recovery layer, never invoked here
    log_manager: Option<Arc<LogManager>>,
}

impl BufferPoolManager {
    /// Creates a new BufferPoolManager with the given pool size, disk
    /// manager, LRU-K constant, and optional log manager. All frames
    /// start on the free list.
    pub fn new(
        pool_size: usize,
        disk_manager: Arc<DiskManager>,
        replacer_k: usize,
        log_manager: Option<Arc<LogManager>>,
    ) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);

        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            frames.push(Arc::new(PageFrame::new(frame_id)));
            free_list.push_back(frame_id);
        }

        let state = Arc::new(PoolState {
            frames,
            inner: Mutex::new(PoolInner {
                page_table: HashMap::new(),
                free_list,
            }),
            replacer: LruKReplacer::new(pool_size, replacer_k),
        });

        Self {
            pool_size,
            next_page_id: AtomicI32::new(0),
            state,
            disk_scheduler: DiskScheduler::new(disk_manager),
            log_manager,
        }
    }

    /// Creates a new page in the buffer pool. The page arrives zeroed,
    /// clean, and pinned once. Returns None if every frame is pinned and
    /// nothing can be evicted.
    pub fn new_page(&self) -> Result<Option<(PageId, Arc<PageFrame>)>> {
        let mut inner = self.state.inner.lock();
        let Some(frame_id) = self.acquire_frame(&mut inner)? else {
            return Ok(None);
        };
        let frame = &self.state.frames[frame_id.as_usize()];

        let page_id = self.allocate_page();
        frame.reset();
        frame.set_page_id(page_id);
        frame.pin();

        inner.page_table.insert(page_id, frame_id);
        self.state
            .replacer
            .record_access(frame_id, AccessType::Unknown);
        self.state.replacer.set_evictable(frame_id, false);

        Ok(Some((page_id, Arc::clone(frame))))
    }

    /// Fetches the requested page, reading it from disk if it is not
    /// resident. The returned frame carries one additional pin. Returns
    /// None if the page would need a frame and none is obtainable.
    pub fn fetch_page(
        &self,
        page_id: PageId,
        access_type: AccessType,
    ) -> Result<Option<Arc<PageFrame>>> {
        if page_id == INVALID_PAGE_ID {
            return Err(FerroError::InvalidPageId(page_id));
        }

        let mut inner = self.state.inner.lock();

        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            let frame = &self.state.frames[frame_id.as_usize()];
            frame.pin();
            self.state.replacer.record_access(frame_id, access_type);
            self.state.replacer.set_evictable(frame_id, false);
            return Ok(Some(Arc::clone(frame)));
        }

        let Some(frame_id) = self.acquire_frame(&mut inner)? else {
            return Ok(None);
        };
        let frame = &self.state.frames[frame_id.as_usize()];

        let mut data = [0u8; PAGE_SIZE];
        self.disk_scheduler.schedule_read_sync(page_id, &mut data)?;

        frame.set_page_id(page_id);
        frame.load(&data);
        frame.set_dirty(false);
        frame.pin();

        inner.page_table.insert(page_id, frame_id);
        self.state.replacer.record_access(frame_id, access_type);
        self.state.replacer.set_evictable(frame_id, false);

        Ok(Some(Arc::clone(frame)))
    }

    /// Fetches a page and takes its shared latch, returning a read
    /// guard. Returns None when no frame is obtainable.
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<Option<ReadPageGuard>> {
        let Some(frame) = self.fetch_page(page_id, AccessType::Unknown)? else {
            return Ok(None);
        };
        let state = Arc::clone(&self.state);
        let guard = unsafe {
            ReadPageGuard::new(
                page_id,
                frame,
                Box::new(move |pid, is_dirty| {
                    state.unpin(pid, is_dirty);
                }),
            )
        };
        Ok(Some(guard))
    }

    /// Fetches a page and takes its exclusive latch, returning a write
    /// guard. Returns None when no frame is obtainable.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<Option<WritePageGuard>> {
        let Some(frame) = self.fetch_page(page_id, AccessType::Unknown)? else {
            return Ok(None);
        };
        let state = Arc::clone(&self.state);
        let guard = unsafe {
            WritePageGuard::new(
                page_id,
                frame,
                Box::new(move |pid, is_dirty| {
                    state.unpin(pid, is_dirty);
                }),
            )
        };
        Ok(Some(guard))
    }

    /// Creates a new page wrapped in a basic (unlatched) guard.
    pub fn new_page_guarded(&self) -> Result<Option<PageGuard>> {
        let Some((page_id, frame)) = self.new_page()? else {
            return Ok(None);
        };
        let state = Arc::clone(&self.state);
        Ok(Some(PageGuard::new(
            page_id,
            frame,
            Box::new(move |pid, is_dirty| {
                state.unpin(pid, is_dirty);
            }),
        )))
    }

    /// Releases one pin on the page. The dirty flag accumulates: once a
    /// page is reported dirty it stays dirty until flushed or reused.
    /// When the pin count reaches zero the frame becomes evictable.
    /// Returns false if the page is not resident or was not pinned.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool, _access_type: AccessType) -> bool {
        self.state.unpin(page_id, is_dirty)
    }

    /// Writes the page to disk if it is dirty and clears the dirty flag.
    /// Flushing a clean resident page is a no-op. The pin count is
    /// ignored. Returns false if the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if page_id == INVALID_PAGE_ID {
            return Err(FerroError::InvalidPageId(page_id));
        }

        let inner = self.state.inner.lock();
        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return Ok(false);
        };
        let frame = &self.state.frames[frame_id.as_usize()];

        if frame.is_dirty() {
            let image = frame.snapshot();
            self.disk_scheduler
                .schedule_write_sync(page_id, &image[..])?;
            frame.set_dirty(false);
            trace!("flushed {} from {}", page_id, frame_id);
        }

        Ok(true)
    }

    /// Flushes every resident dirty page to disk.
    pub fn flush_all_pages(&self) -> Result<()> {
        let inner = self.state.inner.lock();
        for (&page_id, &frame_id) in inner.page_table.iter() {
            let frame = &self.state.frames[frame_id.as_usize()];
            if frame.is_dirty() {
                let image = frame.snapshot();
                self.disk_scheduler
                    .schedule_write_sync(page_id, &image[..])?;
                frame.set_dirty(false);
            }
        }
        Ok(())
    }

    /// Removes the page from the buffer pool, writing it back first if
    /// dirty, and returns its frame to the free list. Deleting a
    /// non-resident page succeeds trivially; deleting a pinned page
    /// fails with false.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut inner = self.state.inner.lock();
        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return Ok(true);
        };
        let frame = &self.state.frames[frame_id.as_usize()];

        if frame.pin_count() > 0 {
            return Ok(false);
        }

        inner.page_table.remove(&page_id);
        if frame.is_dirty() {
            let image = frame.snapshot();
            self.disk_scheduler
                .schedule_write_sync(page_id, &image[..])?;
        }
        frame.reset();
        inner.free_list.push_back(frame_id);
        self.state.replacer.remove(frame_id);
        self.deallocate_page(page_id);
        trace!("deleted {} from {}", page_id, frame_id);

        Ok(true)
    }

    /// Returns the pin count for a page, or None if it is not resident.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let inner = self.state.inner.lock();
        inner
            .page_table
            .get(&page_id)
            .map(|&frame_id| self.state.frames[frame_id.as_usize()].pin_count())
    }

    /// Returns the pool size.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Returns the number of free frames.
    pub fn free_frame_count(&self) -> usize {
        self.state.inner.lock().free_list.len()
    }

    /// Returns the log manager handle, if one was attached.
    pub fn log_manager(&self) -> Option<&Arc<LogManager>> {
        self.log_manager.as_ref()
    }

    /// Hands out the next page id.
    fn allocate_page(&self) -> PageId {
        PageId::new(self.next_page_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Hook for reclaiming a page id. Ids are not reused, so this does
    /// nothing.
    fn deallocate_page(&self, _page_id: PageId) {}

    /// Obtains a frame for a new occupant: from the free list if
    /// possible, otherwise by evicting the replacer's victim. A dirty
    /// victim is written back before its page-table entry is erased, so
    /// a failed write leaves the old occupant resident and dirty.
    fn acquire_frame(&self, inner: &mut PoolInner) -> Result<Option<FrameId>> {
        if let Some(frame_id) = inner.free_list.pop_front() {
            return Ok(Some(frame_id));
        }

        let Some(frame_id) = self.state.replacer.evict() else {
            return Ok(None);
        };
        let frame = &self.state.frames[frame_id.as_usize()];
        let old_page_id = frame.page_id();
        trace!("evicting {} from {}", old_page_id, frame_id);

        if frame.is_dirty() {
            let image = frame.snapshot();
            self.disk_scheduler
                .schedule_write_sync(old_page_id, &image[..])?;
        }

        inner.page_table.remove(&old_page_id);
        frame.reset();

        Ok(Some(frame_id))
    }
}
