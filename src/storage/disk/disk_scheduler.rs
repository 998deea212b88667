use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::common::{FerroError, PageId, Result, PAGE_SIZE};

use super::DiskManager;

/// A disk I/O request. Requests own their buffers; completions are
/// signalled through the per-request callback channel.
pub enum DiskRequest {
    Read {
        page_id: PageId,
        callback: mpsc::Sender<Result<Box<[u8; PAGE_SIZE]>>>,
    },
    Write {
        page_id: PageId,
        data: Box<[u8; PAGE_SIZE]>,
        callback: mpsc::Sender<Result<()>>,
    },
}

/// DiskScheduler funnels page I/O through a background worker thread.
/// The `*_sync` entry points block on the request's completion, so
/// callers observe plain synchronous reads and writes.
pub struct DiskScheduler {
    /// The disk manager performing the actual I/O
    disk_manager: Arc<DiskManager>,
    /// Channel sender for queuing requests
    request_sender: Sender<DiskRequest>,
    /// Flag to signal shutdown
    shutdown: Arc<AtomicBool>,
    /// Handle to the background worker thread
    worker_handle: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    /// Creates a new DiskScheduler and spawns its worker thread.
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        let (sender, receiver) = bounded::<DiskRequest>(128);
        let shutdown = Arc::new(AtomicBool::new(false));

        let dm_clone = Arc::clone(&disk_manager);
        let shutdown_clone = Arc::clone(&shutdown);

        let worker_handle = thread::spawn(move || {
            Self::run_worker(dm_clone, receiver, shutdown_clone);
        });

        Self {
            disk_manager,
            request_sender: sender,
            shutdown,
            worker_handle: Some(worker_handle),
        }
    }

    /// Queues a request for the background worker.
    pub fn schedule(&self, request: DiskRequest) -> Result<()> {
        self.request_sender
            .send(request)
            .map_err(|e| FerroError::DiskScheduler(format!("Failed to schedule request: {}", e)))
    }

    /// Schedules a read and waits for it, copying the page into `data`.
    pub fn schedule_read_sync(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let (tx, rx) = mpsc::channel();
        self.schedule(DiskRequest::Read {
            page_id,
            callback: tx,
        })?;

        let page = rx.recv().map_err(|e| {
            FerroError::DiskScheduler(format!("Failed to receive completion: {}", e))
        })??;
        data.copy_from_slice(&page[..]);
        Ok(())
    }

    /// Schedules a write of `data` and waits for it.
    pub fn schedule_write_sync(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let mut page = Box::new([0u8; PAGE_SIZE]);
        page.copy_from_slice(data);

        let (tx, rx) = mpsc::channel();
        self.schedule(DiskRequest::Write {
            page_id,
            data: page,
            callback: tx,
        })?;

        rx.recv().map_err(|e| {
            FerroError::DiskScheduler(format!("Failed to receive completion: {}", e))
        })?
    }

    /// Worker loop: processes requests until shutdown, then drains the
    /// queue so no caller is left waiting.
    fn run_worker(
        disk_manager: Arc<DiskManager>,
        receiver: Receiver<DiskRequest>,
        shutdown: Arc<AtomicBool>,
    ) {
        loop {
            if shutdown.load(Ordering::Relaxed) {
                while let Ok(request) = receiver.try_recv() {
                    Self::process_request(&disk_manager, request);
                }
                break;
            }

            match receiver.recv_timeout(std::time::Duration::from_millis(100)) {
                Ok(request) => {
                    Self::process_request(&disk_manager, request);
                }
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                    // Re-check the shutdown flag.
                }
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                    break;
                }
            }
        }
    }

    /// Performs a single request and signals its completion. A caller
    /// that gave up on the result is ignored.
    fn process_request(disk_manager: &DiskManager, request: DiskRequest) {
        match request {
            DiskRequest::Read { page_id, callback } => {
                let mut page = Box::new([0u8; PAGE_SIZE]);
                let result = disk_manager
                    .read_page(page_id, &mut page[..])
                    .map(|_| page);
                let _ = callback.send(result);
            }
            DiskRequest::Write {
                page_id,
                data,
                callback,
            } => {
                let _ = callback.send(disk_manager.write_page(page_id, &data[..]));
            }
        }
    }

    /// Returns the underlying DiskManager.
    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}
