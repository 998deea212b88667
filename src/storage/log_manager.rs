use std::sync::atomic::{AtomicU64, Ordering};

use crate::common::{Lsn, INVALID_LSN};

/// LogManager is the attachment point for a write-ahead log. The buffer
/// pool holds a handle so that a recovery layer can sequence page writes
/// against log flushes; nothing in this crate emits log records yet.
pub struct LogManager {
    /// The next LSN to hand out
    next_lsn: AtomicU64,
    /// The highest LSN known to be durable
    persistent_lsn: AtomicU64,
}

impl LogManager {
    pub fn new() -> Self {
        Self {
            next_lsn: AtomicU64::new(INVALID_LSN + 1),
            persistent_lsn: AtomicU64::new(INVALID_LSN),
        }
    }

    /// Hands out the next log sequence number.
    pub fn next_lsn(&self) -> Lsn {
        self.next_lsn.fetch_add(1, Ordering::SeqCst)
    }

    /// Returns the highest LSN known to be durable.
    pub fn persistent_lsn(&self) -> Lsn {
        self.persistent_lsn.load(Ordering::Acquire)
    }

    /// Records that all LSNs up to `lsn` are durable.
    pub fn set_persistent_lsn(&self, lsn: Lsn) {
        self.persistent_lsn.store(lsn, Ordering::Release);
    }
}

impl Default for LogManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_manager_lsn_monotonic() {
        let lm = LogManager::new();
        let first = lm.next_lsn();
        let second = lm.next_lsn();
        assert!(first > INVALID_LSN);
        assert!(second > first);
    }

    #[test]
    fn test_log_manager_persistent_lsn() {
        let lm = LogManager::new();
        assert_eq!(lm.persistent_lsn(), INVALID_LSN);

        let lsn = lm.next_lsn();
        lm.set_persistent_lsn(lsn);
        assert_eq!(lm.persistent_lsn(), lsn);
    }
}
