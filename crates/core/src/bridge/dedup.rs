use std::collections::HashMap;
use std::rc::{Rc, Weak};

const MIN_PRUNE_THRESHOLD: usize = 64;

/// Identity set over `Rc`-shared objects.
///
/// Membership is by allocation, not by value: two equal but distinct
/// objects are both "new", the same object delivered twice is not. Entries
/// hold `Weak` references, so tracking an object never keeps it alive, and
/// entries whose object was dropped are pruned as the set grows.
#[derive(Debug)]
pub struct SeenSet<T> {
    entries: HashMap<usize, Weak<T>>,
    prune_at: usize,
}

impl<T> SeenSet<T> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            prune_at: MIN_PRUNE_THRESHOLD,
        }
    }

    fn key(item: &Rc<T>) -> usize {
        Rc::as_ptr(item) as *const () as usize
    }

    /// Whether this exact object has been seen. An address whose previous
    /// occupant has been dropped does not count.
    pub fn contains(&self, item: &Rc<T>) -> bool {
        self.entries
            .get(&Self::key(item))
            .and_then(Weak::upgrade)
            .is_some_and(|seen| Rc::ptr_eq(&seen, item))
    }

    /// Record `item`. Returns `false` if it was already present.
    pub fn insert(&mut self, item: &Rc<T>) -> bool {
        if self.contains(item) {
            return false;
        }
        self.entries.insert(Self::key(item), Rc::downgrade(item));
        if self.entries.len() >= self.prune_at {
            self.prune();
        }
        true
    }

    pub fn remove(&mut self, item: &Rc<T>) {
        if self.contains(item) {
            self.entries.remove(&Self::key(item));
        }
    }

    /// Drop entries whose object no longer exists.
    pub fn prune(&mut self) {
        let before = self.entries.len();
        self.entries.retain(|_, weak| weak.strong_count() > 0);
        self.prune_at = (self.entries.len() * 2).max(MIN_PRUNE_THRESHOLD);
        tracing::trace!(
            before,
            after = self.entries.len(),
            "pruned dead change entries"
        );
    }

    /// Number of tracked entries, including ones not yet pruned.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> Default for SeenSet<T> {
    fn default() -> Self {
        Self::new()
    }
}
