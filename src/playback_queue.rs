//! Randomized draw order over the eligible set.
//!
//! With no-repeat enabled the queue is a uniformly shuffled copy of the
//! eligible pool, drained once per item before any repeat; with it
//! disabled every draw samples the pool with replacement. Any mutation
//! affecting eligibility must invalidate the queue before the next draw.

use std::collections::VecDeque;
use std::sync::Arc;

use rand::{rngs::StdRng, RngExt, SeedableRng};

use crate::filter::{eligible_items, FilterState};
use crate::library_index::{normalize_path_key, MediaItem};
use crate::library_store::LibraryStore;

pub struct PlaybackQueue {
    store: Arc<LibraryStore>,
    filter: FilterState,
    no_repeat: bool,
    queue: VecDeque<String>,
    pool: Vec<String>,
    needs_rebuild: bool,
    rng_seed: [u8; 32],
}

impl PlaybackQueue {
    pub fn new(store: Arc<LibraryStore>) -> Self {
        let mut seed = [0u8; 32];
        getrandom::fill(&mut seed).expect("Failed to generate random seed");
        Self::with_seed(store, seed)
    }

    /// Deterministic construction for tests and reproducible sessions.
    pub fn with_seed(store: Arc<LibraryStore>, seed: [u8; 32]) -> Self {
        Self {
            store,
            filter: FilterState::default(),
            no_repeat: true,
            queue: VecDeque::new(),
            pool: Vec::new(),
            needs_rebuild: true,
            rng_seed: seed,
        }
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    pub fn set_filter(&mut self, filter: FilterState) {
        if self.filter != filter {
            self.filter = filter;
            self.invalidate();
        }
    }

    pub fn no_repeat(&self) -> bool {
        self.no_repeat
    }

    pub fn set_no_repeat(&mut self, no_repeat: bool) {
        if self.no_repeat != no_repeat {
            self.no_repeat = no_repeat;
            self.queue.clear();
            self.invalidate();
        }
    }

    /// Marks the draw order stale. Call after any mutation that can change
    /// eligibility: filter edits, favorite or blacklist toggles, source
    /// enable/disable, imports and refreshes.
    pub fn invalidate(&mut self) {
        self.needs_rebuild = true;
    }

    /// Drops an item from the in-flight draw order immediately, without
    /// restarting the cycle. Used when the queued item is blacklisted or
    /// deleted mid-cycle.
    pub fn remove_path(&mut self, path: &str) {
        let key = normalize_path_key(path);
        self.queue.retain(|queued| *queued != key);
        self.pool.retain(|pooled| *pooled != key);
    }

    /// Number of items remaining in the current no-repeat cycle.
    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    /// Recomputes the eligible pool and draw order if anything invalidated
    /// them since the last draw.
    pub fn rebuild_if_needed(&mut self) {
        if !self.needs_rebuild {
            return;
        }
        let snapshot = self.store.snapshot();
        // Existence is validated lazily at play time; priming skips it.
        self.pool = eligible_items(&self.filter, &snapshot, false)
            .into_iter()
            .map(|item| item.path_key())
            .collect();
        self.queue = if self.no_repeat {
            self.shuffled_pool().into()
        } else {
            VecDeque::new()
        };
        self.needs_rebuild = false;
    }

    /// Pops the next item. An exhausted no-repeat queue reshuffles the
    /// pool before drawing, so every item is served once per cycle.
    pub fn draw(&mut self) -> Option<MediaItem> {
        self.rebuild_if_needed();
        if self.pool.is_empty() {
            return None;
        }

        if self.no_repeat {
            if self.queue.is_empty() {
                self.queue = self.shuffled_pool().into();
            }
            while let Some(key) = self.queue.pop_front() {
                if let Some(item) = self.store.find_item_by_path(&key) {
                    return Some(item);
                }
            }
            None
        } else {
            let index = self.next_rng().random_range(0..self.pool.len());
            let key = self.pool[index].clone();
            self.store.find_item_by_path(&key)
        }
    }

    fn shuffled_pool(&mut self) -> Vec<String> {
        let mut order = self.pool.clone();
        let mut rng = self.next_rng();
        for i in (1..order.len()).rev() {
            let j = rng.random_range(0..=i);
            order.swap(i, j);
        }
        order
    }

    fn next_rng(&mut self) -> StdRng {
        let rng = StdRng::from_seed(self.rng_seed);
        // Advance the seed so consecutive shuffles differ.
        let mut new_seed = [0u8; 32];
        for (i, val) in new_seed.iter_mut().enumerate() {
            *val = self.rng_seed[i].wrapping_add(1);
        }
        self.rng_seed = new_seed;
        rng
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media_file_discovery::RecursiveWalker;
    use std::collections::HashSet;

    fn seeded_store(file_count: usize) -> (tempfile::TempDir, tempfile::TempDir, Arc<LibraryStore>) {
        let data_dir = tempfile::tempdir().expect("data dir");
        let media_dir = tempfile::tempdir().expect("media dir");
        for index in 0..file_count {
            std::fs::write(media_dir.path().join(format!("clip_{index:02}.mp4")), b"x")
                .expect("seed file");
        }
        let store = Arc::new(LibraryStore::open(data_dir.path().join("library.json")));
        store
            .import_folder(media_dir.path(), None, &RecursiveWalker)
            .expect("import");
        (data_dir, media_dir, store)
    }

    #[test]
    fn test_no_repeat_serves_each_item_once_per_cycle() {
        let (_data, _media, store) = seeded_store(7);
        for seed_byte in [0u8, 7, 42, 200] {
            let mut queue = PlaybackQueue::with_seed(Arc::clone(&store), [seed_byte; 32]);
            for _cycle in 0..3 {
                let mut drawn = HashSet::new();
                for _ in 0..7 {
                    let item = queue.draw().expect("item available");
                    assert!(
                        drawn.insert(item.path_key()),
                        "item repeated within a cycle"
                    );
                }
                assert_eq!(drawn.len(), 7);
            }
        }
    }

    #[test]
    fn test_draw_on_empty_pool_returns_none() {
        let (_data, _media, store) = seeded_store(0);
        let mut queue = PlaybackQueue::with_seed(store, [1; 32]);
        assert!(queue.draw().is_none());
    }

    #[test]
    fn test_with_replacement_draws_from_pool() {
        let (_data, _media, store) = seeded_store(3);
        let mut queue = PlaybackQueue::with_seed(store, [9; 32]);
        queue.set_no_repeat(false);
        for _ in 0..20 {
            assert!(queue.draw().is_some());
        }
    }

    #[test]
    fn test_remove_path_drops_item_from_live_queue() {
        let (_data, _media, store) = seeded_store(5);
        let doomed = store.items_by_source(None)[0].full_path.clone();

        let mut queue = PlaybackQueue::with_seed(Arc::clone(&store), [3; 32]);
        queue.rebuild_if_needed();
        assert_eq!(queue.remaining(), 5);

        queue.remove_path(&doomed);
        assert_eq!(queue.remaining(), 4);

        let doomed_key = normalize_path_key(&doomed);
        for _ in 0..4 {
            let item = queue.draw().expect("item available");
            assert_ne!(item.path_key(), doomed_key);
        }
    }

    #[test]
    fn test_filter_change_invalidates_queue() {
        let (_data, _media, store) = seeded_store(4);
        let favorite = store.items_by_source(None)[0].full_path.clone();
        store.set_favorite(&favorite, true).expect("favorite");

        let mut queue = PlaybackQueue::with_seed(Arc::clone(&store), [5; 32]);
        queue.rebuild_if_needed();
        assert_eq!(queue.remaining(), 4);

        let mut favorites_only = FilterState::default();
        favorites_only.favorites_only = true;
        queue.set_filter(favorites_only);

        let item = queue.draw().expect("favorite available");
        assert_eq!(item.path_key(), normalize_path_key(&favorite));
        assert!(queue.draw().expect("cycle restarts").is_favorite);
    }

    #[test]
    fn test_blacklist_toggle_then_invalidate_excludes_item() {
        let (_data, _media, store) = seeded_store(3);
        let doomed = store.items_by_source(None)[1].full_path.clone();

        let mut queue = PlaybackQueue::with_seed(Arc::clone(&store), [8; 32]);
        queue.rebuild_if_needed();

        store.set_blacklisted(&doomed, true).expect("blacklist");
        queue.remove_path(&doomed);
        queue.invalidate();

        let doomed_key = normalize_path_key(&doomed);
        for _ in 0..6 {
            let item = queue.draw().expect("item available");
            assert_ne!(item.path_key(), doomed_key);
        }
    }
}
