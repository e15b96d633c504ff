//! Keymap resolver: foreground window -> ordered active chain.
//!
//! Inheritance is already flattened by the compiler, so resolution is a
//! filter over the declared keymap list (global fallback last) plus a small
//! LRU memo keyed on `(class, title)`. The memo is read from the hot path;
//! the mutex is uncontended except when focus actually changes.

use crate::Keymap;
use std::sync::{Arc, Mutex};
use tracing::{debug, trace};

/// Entries kept in the `(class, title)` memo.
const SELECT_CACHE_CAP: usize = 64;

type Chain = Arc<Vec<Arc<Keymap>>>;

struct CacheSlot {
    class: String,
    title: String,
    chain: Chain,
    stamp: u64,
}

#[derive(Default)]
struct SelectCache {
    slots: Vec<CacheSlot>,
    clock: u64,
}

impl SelectCache {
    fn get(&mut self, class: &str, title: &str) -> Option<Chain> {
        self.clock += 1;
        let clock = self.clock;
        let slot = self
            .slots
            .iter_mut()
            .find(|s| s.class == class && s.title == title)?;
        slot.stamp = clock;
        Some(Arc::clone(&slot.chain))
    }

    fn insert(&mut self, class: String, title: String, chain: Chain) {
        self.clock += 1;
        if self.slots.len() >= SELECT_CACHE_CAP
            && let Some(oldest) = self
                .slots
                .iter()
                .enumerate()
                .min_by_key(|(_, s)| s.stamp)
                .map(|(i, _)| i)
        {
            self.slots.swap_remove(oldest);
        }
        self.slots.push(CacheSlot {
            class,
            title,
            chain,
            stamp: self.clock,
        });
    }

    fn clear(&mut self) {
        self.slots.clear();
    }

    fn len(&self) -> usize {
        self.slots.len()
    }
}

/// Selects the ordered active keymap chain for a foreground window.
pub struct Resolver {
    keymaps: Vec<Arc<Keymap>>,
    cache: Mutex<SelectCache>,
}

impl Resolver {
    pub fn new(keymaps: Vec<Arc<Keymap>>) -> Self {
        Self {
            keymaps,
            cache: Mutex::new(SelectCache::default()),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Swap in a freshly compiled keymap list; invalidates the memo.
    pub fn rebuild(&mut self, keymaps: Vec<Arc<Keymap>>) {
        debug!(target: "keymap.resolve", keymaps = keymaps.len(), "rebuild");
        self.keymaps = keymaps;
        self.cache.lock().expect("resolver cache poisoned").clear();
    }

    /// Every keymap whose window predicate matches, in declaration order.
    /// The compiler guarantees the global fallback sits last in the list, so
    /// it ends the chain whenever it exists.
    pub fn select(&self, class: &str, title: &str) -> Chain {
        {
            let mut cache = self.cache.lock().expect("resolver cache poisoned");
            if let Some(chain) = cache.get(class, title) {
                trace!(target: "keymap.resolve", class, title, "select_cached");
                return chain;
            }
        }

        let chain: Chain = Arc::new(
            self.keymaps
                .iter()
                .filter(|map| map.matches_window(class, title))
                .cloned()
                .collect(),
        );
        debug!(
            target: "keymap.resolve",
            class,
            title,
            chain = chain.len(),
            "select_computed"
        );
        self.cache
            .lock()
            .expect("resolver cache poisoned")
            .insert(class.to_string(), title.to_string(), Arc::clone(&chain));
        chain
    }

    pub fn keymaps(&self) -> &[Arc<Keymap>] {
        &self.keymaps
    }

    #[cfg(test)]
    fn cached_entries(&self) -> usize {
        self.cache.lock().unwrap().len()
    }
}
