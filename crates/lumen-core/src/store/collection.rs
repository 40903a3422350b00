// ── Reactive keyed collection ──
//
// Concurrent storage with O(1) lookups and push-based change
// notification. Every committed mutation republishes a snapshot
// ordered by key.

use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;

type Snapshot<T> = Arc<Vec<Arc<T>>>;

pub(crate) struct EntityCollection<K, T>
where
    K: Eq + Hash + Ord + Clone + Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    by_key: DashMap<K, Arc<T>>,
    snapshot: watch::Sender<Snapshot<T>>,
}

impl<K, T> EntityCollection<K, T>
where
    K: Eq + Hash + Ord + Clone + Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    pub(crate) fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            by_key: DashMap::new(),
            snapshot,
        }
    }

    /// Atomically derive the next value for `key` from the current one.
    ///
    /// `next` sees `None` when the key is absent. Returning `None` from
    /// `next` leaves the collection untouched and publishes nothing.
    /// Returns the committed value.
    pub(crate) fn upsert_with<F>(&self, key: K, next: F) -> Option<Arc<T>>
    where
        F: FnOnce(Option<&T>) -> Option<T>,
    {
        let committed = match self.by_key.entry(key) {
            Entry::Occupied(mut occupied) => next(Some(occupied.get())).map(|value| {
                let value = Arc::new(value);
                occupied.insert(Arc::clone(&value));
                value
            }),
            Entry::Vacant(vacant) => next(None).map(|value| {
                let value = Arc::new(value);
                vacant.insert(Arc::clone(&value));
                value
            }),
        };
        // The shard guard is released here; rebuilding iterates every shard.
        if committed.is_some() {
            self.rebuild_snapshot();
        }
        committed
    }

    /// Replace the whole contents in one publication.
    pub(crate) fn replace_all(&self, entries: impl IntoIterator<Item = (K, T)>) {
        self.by_key.clear();
        for (key, value) in entries {
            self.by_key.insert(key, Arc::new(value));
        }
        self.rebuild_snapshot();
    }

    /// Remove by key. Returns the removed value if it existed.
    pub(crate) fn remove(&self, key: &K) -> Option<Arc<T>> {
        let removed = self.by_key.remove(key).map(|(_, v)| v);
        if removed.is_some() {
            self.rebuild_snapshot();
        }
        removed
    }

    pub(crate) fn get(&self, key: &K) -> Option<Arc<T>> {
        self.by_key.get(key).map(|r| Arc::clone(r.value()))
    }

    /// Current snapshot (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> Snapshot<T> {
        self.snapshot.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Snapshot<T>> {
        self.snapshot.subscribe()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.len()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn rebuild_snapshot(&self) {
        // Collecting inside `send_modify` holds the channel's write lock,
        // so a slower rebuild can never publish over a newer one.
        self.snapshot.send_modify(|snap| {
            let mut entries: Vec<(K, Arc<T>)> = self
                .by_key
                .iter()
                .map(|r| (r.key().clone(), Arc::clone(r.value())))
                .collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            *snap = Arc::new(entries.into_iter().map(|(_, v)| v).collect());
        });
    }
}
