use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap, VecDeque};

use parking_lot::Mutex;

use crate::common::{FrameId, Timestamp};

/// The kind of access being recorded. Carried through to the replacer so
/// scan-resistant policies can be layered on later; the LRU-K ordering
/// itself ignores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessType {
    #[default]
    Unknown,
    Lookup,
    Scan,
    Index,
}

/// Ordering key for the eviction sets: a timestamp plus the frame id as a
/// tiebreaker, so distinct frames never compare equal.
type OrderKey = (Timestamp, FrameId);

/// Access bookkeeping for a single frame.
#[derive(Debug)]
struct LruKNode {
    frame_id: FrameId,
    /// Up to the last k access timestamps, most recent at the back. The
    /// length doubles as the access count, saturating at k.
    history: VecDeque<Timestamp>,
    is_evictable: bool,
}

impl LruKNode {
    fn new(frame_id: FrameId, now: Timestamp) -> Self {
        let mut history = VecDeque::new();
        history.push_back(now);
        Self {
            frame_id,
            history,
            is_evictable: false,
        }
    }

    /// The key this node sorts under in whichever eviction set it
    /// belongs to. With the history capped at k samples, the front entry
    /// is the earliest recorded access for a partial history and the
    /// kth-most-recent access for a full one.
    fn order_key(&self) -> OrderKey {
        (self.history.front().copied().unwrap(), self.frame_id)
    }

    fn has_full_history(&self, k: usize) -> bool {
        self.history.len() >= k
    }
}

struct ReplacerInner {
    nodes: HashMap<FrameId, LruKNode>,
    /// Evictable frames with fewer than k recorded accesses, ordered by
    /// their earliest access. These have infinite backward k-distance and
    /// are preferred victims.
    history_set: BTreeSet<OrderKey>,
    /// Evictable frames with k recorded accesses, ordered by their
    /// kth-most-recent access.
    cache_set: BTreeSet<OrderKey>,
    current_timestamp: Timestamp,
    /// Number of evictable frames.
    curr_size: usize,
}

/// LruKReplacer implements the LRU-K replacement policy.
///
/// The policy evicts the frame whose backward k-distance (current time
/// minus the timestamp of the kth previous access) is largest. A frame
/// with fewer than k recorded accesses has infinite backward k-distance;
/// among those, the frame with the earliest recorded access is evicted
/// first.
pub struct LruKReplacer {
    /// Upper bound on accepted frame ids
    num_frames: usize,
    /// The look-back constant
    k: usize,
    inner: Mutex<ReplacerInner>,
}

impl LruKReplacer {
    /// Creates a new replacer accepting frame ids in `[0, num_frames)`
    /// with the given k value.
    pub fn new(num_frames: usize, k: usize) -> Self {
        assert!(k >= 1, "LRU-K requires k >= 1");
        Self {
            num_frames,
            k,
            inner: Mutex::new(ReplacerInner {
                nodes: HashMap::new(),
                history_set: BTreeSet::new(),
                cache_set: BTreeSet::new(),
                current_timestamp: 0,
                curr_size: 0,
            }),
        }
    }

    /// Evicts the frame with the largest backward k-distance, forgetting
    /// its access history. Frames with infinite distance are taken first,
    /// in order of their earliest access. Returns None if no frame is
    /// evictable.
    pub fn evict(&self) -> Option<FrameId> {
        let mut inner = self.inner.lock();
        if inner.curr_size == 0 {
            return None;
        }

        let key = inner
            .history_set
            .first()
            .copied()
            .or_else(|| inner.cache_set.first().copied())?;

        if !inner.history_set.remove(&key) {
            inner.cache_set.remove(&key);
        }
        let (_, frame_id) = key;
        inner.nodes.remove(&frame_id);
        inner.curr_size -= 1;
        Some(frame_id)
    }

    /// Records an access to the given frame at the current logical time,
    /// creating its history on first sight.
    ///
    /// # Panics
    ///
    /// Panics if `frame_id` is outside `[0, num_frames)`.
    pub fn record_access(&self, frame_id: FrameId, _access_type: AccessType) {
        assert!(
            frame_id.as_usize() < self.num_frames,
            "{frame_id} out of range for replacer of {} frames",
            self.num_frames
        );

        let mut inner = self.inner.lock();
        let now = inner.current_timestamp;
        inner.current_timestamp += 1;

        let ReplacerInner {
            nodes,
            history_set,
            cache_set,
            ..
        } = &mut *inner;

        match nodes.entry(frame_id) {
            Entry::Vacant(slot) => {
                slot.insert(LruKNode::new(frame_id, now));
            }
            Entry::Occupied(mut slot) => {
                let node = slot.get_mut();

                // The ordering key moves with the history, so an
                // evictable node is re-filed under its new key (possibly
                // crossing from the history set into the cache set).
                if node.is_evictable {
                    let set = if node.has_full_history(self.k) {
                        &mut *cache_set
                    } else {
                        &mut *history_set
                    };
                    set.remove(&node.order_key());
                }

                node.history.push_back(now);
                if node.history.len() > self.k {
                    node.history.pop_front();
                }

                if node.is_evictable {
                    let set = if node.has_full_history(self.k) {
                        cache_set
                    } else {
                        history_set
                    };
                    set.insert(node.order_key());
                }
            }
        }
    }

    /// Toggles whether a frame may be evicted. Unknown frames are
    /// ignored; repeating the current state is a no-op. The replacer's
    /// size counts evictable frames only.
    pub fn set_evictable(&self, frame_id: FrameId, evictable: bool) {
        let mut inner = self.inner.lock();
        let ReplacerInner {
            nodes,
            history_set,
            cache_set,
            curr_size,
            ..
        } = &mut *inner;

        let Some(node) = nodes.get_mut(&frame_id) else {
            return;
        };
        if node.is_evictable == evictable {
            return;
        }

        let set = if node.has_full_history(self.k) {
            cache_set
        } else {
            history_set
        };
        if evictable {
            set.insert(node.order_key());
            *curr_size += 1;
        } else {
            set.remove(&node.order_key());
            *curr_size -= 1;
        }
        node.is_evictable = evictable;
    }

    /// Removes a specific frame and its history, regardless of its
    /// k-distance. Unknown frames are ignored.
    ///
    /// # Panics
    ///
    /// Panics if the frame is known but not evictable.
    pub fn remove(&self, frame_id: FrameId) {
        let mut inner = self.inner.lock();
        let ReplacerInner {
            nodes,
            history_set,
            cache_set,
            curr_size,
            ..
        } = &mut *inner;

        let Some(node) = nodes.get(&frame_id) else {
            return;
        };
        if !node.is_evictable {
            panic!("cannot remove pinned {frame_id} from replacer");
        }

        let set = if node.has_full_history(self.k) {
            cache_set
        } else {
            history_set
        };
        set.remove(&node.order_key());
        *curr_size -= 1;
        nodes.remove(&frame_id);
    }

    /// Returns the number of evictable frames.
    pub fn size(&self) -> usize {
        self.inner.lock().curr_size
    }

    /// Returns whether the given frame is currently evictable.
    ///
    /// # Panics
    ///
    /// Panics if the frame is not tracked by the replacer.
    pub fn is_evictable(&self, frame_id: FrameId) -> bool {
        let inner = self.inner.lock();
        match inner.nodes.get(&frame_id) {
            Some(node) => node.is_evictable,
            None => panic!("{frame_id} is not tracked by the replacer"),
        }
    }

    /// Returns the k value of this replacer.
    pub fn k(&self) -> usize {
        self.k
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(replacer: &LruKReplacer, id: u32) {
        replacer.record_access(FrameId::new(id), AccessType::Unknown);
    }

    #[test]
    fn test_lru_k_replacer_new() {
        let replacer = LruKReplacer::new(10, 2);
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.k(), 2);
    }

    #[test]
    fn test_lru_k_replacer_evict_empty() {
        let replacer = LruKReplacer::new(10, 2);
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_lru_k_replacer_history_fifo() {
        let replacer = LruKReplacer::new(10, 2);

        record(&replacer, 0);
        record(&replacer, 1);
        record(&replacer, 2);

        replacer.set_evictable(FrameId::new(0), true);
        replacer.set_evictable(FrameId::new(1), true);
        replacer.set_evictable(FrameId::new(2), true);

        assert_eq!(replacer.size(), 3);

        // All have a single access (< k), so all have infinite
        // k-distance; evict by earliest first access.
        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
        assert_eq!(replacer.evict(), Some(FrameId::new(2)));
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_lru_k_replacer_history_precedes_cache() {
        let replacer = LruKReplacer::new(10, 2);

        // Frame 0 reaches k accesses (times 0, 1); frame 1 has a single
        // access at time 2.
        record(&replacer, 0);
        record(&replacer, 0);
        record(&replacer, 1);

        replacer.set_evictable(FrameId::new(0), true);
        replacer.set_evictable(FrameId::new(1), true);

        // The infinite-distance frame goes first even though its access
        // is the most recent.
        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
    }

    #[test]
    fn test_lru_k_replacer_kth_recent_ordering() {
        let replacer = LruKReplacer::new(10, 2);

        // Frame 0 accessed at times 0, 1; frame 1 at times 2, 3, 4, 5.
        record(&replacer, 0);
        record(&replacer, 0);
        for _ in 0..4 {
            record(&replacer, 1);
        }

        replacer.set_evictable(FrameId::new(0), true);
        replacer.set_evictable(FrameId::new(1), true);

        // Frame 0's 2nd-most-recent access (time 0) is older than frame
        // 1's (time 4).
        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
    }

    #[test]
    fn test_lru_k_replacer_set_evictable_idempotent() {
        let replacer = LruKReplacer::new(10, 2);

        record(&replacer, 0);
        replacer.set_evictable(FrameId::new(0), true);
        replacer.set_evictable(FrameId::new(0), true);
        assert_eq!(replacer.size(), 1);

        replacer.set_evictable(FrameId::new(0), false);
        replacer.set_evictable(FrameId::new(0), false);
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_lru_k_replacer_set_evictable_unknown_frame() {
        let replacer = LruKReplacer::new(10, 2);
        replacer.set_evictable(FrameId::new(5), true);
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    fn test_lru_k_replacer_remove() {
        let replacer = LruKReplacer::new(10, 2);

        record(&replacer, 0);
        record(&replacer, 1);
        replacer.set_evictable(FrameId::new(0), true);
        replacer.set_evictable(FrameId::new(1), true);

        replacer.remove(FrameId::new(0));
        assert_eq!(replacer.size(), 1);

        // Removing an unknown frame is a no-op.
        replacer.remove(FrameId::new(7));
        assert_eq!(replacer.size(), 1);

        assert_eq!(replacer.evict(), Some(FrameId::new(1)));
        assert_eq!(replacer.evict(), None);
    }

    #[test]
    #[should_panic]
    fn test_lru_k_replacer_remove_pinned_panics() {
        let replacer = LruKReplacer::new(10, 2);
        record(&replacer, 0);
        replacer.remove(FrameId::new(0));
    }

    #[test]
    #[should_panic]
    fn test_lru_k_replacer_out_of_range_panics() {
        let replacer = LruKReplacer::new(4, 2);
        record(&replacer, 4);
    }

    #[test]
    fn test_lru_k_replacer_is_evictable() {
        let replacer = LruKReplacer::new(10, 2);
        record(&replacer, 0);
        assert!(!replacer.is_evictable(FrameId::new(0)));
        replacer.set_evictable(FrameId::new(0), true);
        assert!(replacer.is_evictable(FrameId::new(0)));
    }

    #[test]
    fn test_lru_k_replacer_evict_forgets_history() {
        let replacer = LruKReplacer::new(10, 2);

        record(&replacer, 0);
        record(&replacer, 0);
        replacer.set_evictable(FrameId::new(0), true);
        assert_eq!(replacer.evict(), Some(FrameId::new(0)));

        // Re-admitted frame starts over with a fresh (partial) history.
        record(&replacer, 0);
        record(&replacer, 1);
        record(&replacer, 1);
        replacer.set_evictable(FrameId::new(0), true);
        replacer.set_evictable(FrameId::new(1), true);

        assert_eq!(replacer.evict(), Some(FrameId::new(0)));
    }
}
