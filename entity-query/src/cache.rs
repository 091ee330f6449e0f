use std::{
    any::Any,
    collections::HashMap,
    sync::{Arc, LazyLock},
};

use leptos::prelude::{ArcRwSignal, Set};

use crate::{
    QueryOptions,
    gc::schedule_gc,
    query::Query,
    query_scope::ScopeCacheKey,
    trie::KeyTrie,
    utils::{KeyHash, new_buster_id, new_client_id},
};

#[derive(Debug)]
pub(crate) struct Scope<K, V> {
    cache: HashMap<KeyHash, Query<K, V>>,
    // To make sure parallel fetches for the same key aren't happening across different callers.
    fetcher_mutexes: HashMap<KeyHash, Arc<futures::lock::Mutex<()>>>,
    // One per key a resource has looked at. Resources hold a clone of the Arc while watching the key.
    busters: HashMap<KeyHash, Arc<ArcRwSignal<u64>>>,
}

impl<K, V> Default for Scope<K, V> {
    fn default() -> Self {
        Self {
            cache: HashMap::new(),
            fetcher_mutexes: HashMap::new(),
            busters: HashMap::new(),
        }
    }
}

impl<K: PartialEq, V> Scope<K, V> {
    /// Hash collisions are treated as misses.
    pub fn get_mut(&mut self, key_hash: &KeyHash, key: &K) -> Option<&mut Query<K, V>> {
        self.cache
            .get_mut(key_hash)
            .filter(|query| query.key() == key)
    }
}

impl<K, V> Scope<K, V> {
    /// A mounted resource is currently showing this key.
    fn watched(&self, key_hash: &KeyHash) -> bool {
        self.busters
            .get(key_hash)
            .is_some_and(|buster| Arc::strong_count(buster) > 1)
    }

    fn remove_query(&mut self, key_hash: &KeyHash) -> Option<Query<K, V>> {
        let removed = self.cache.remove(key_hash);
        self.prune();
        removed
    }

    // Keep what an in-flight fetch or a watching resource still holds:
    fn prune(&mut self) {
        let cache = &self.cache;
        self.fetcher_mutexes
            .retain(|key_hash, mutex| cache.contains_key(key_hash) || Arc::strong_count(mutex) > 1);
        self.busters
            .retain(|key_hash, buster| cache.contains_key(key_hash) || Arc::strong_count(buster) > 1);
    }
}

pub(crate) trait Busters: 'static {
    fn buster(&self, key_hash: &KeyHash) -> Option<ArcRwSignal<u64>>;

    fn busters(&self) -> Vec<ArcRwSignal<u64>>;
}

impl<K, V> Busters for Scope<K, V>
where
    K: 'static,
    V: 'static,
{
    fn buster(&self, key_hash: &KeyHash) -> Option<ArcRwSignal<u64>> {
        self.busters
            .get(key_hash)
            .map(|buster| ArcRwSignal::clone(buster))
    }

    fn busters(&self) -> Vec<ArcRwSignal<u64>> {
        self.busters
            .values()
            .map(|buster| ArcRwSignal::clone(buster))
            .collect()
    }
}

pub(crate) trait ScopeTrait: Busters + Send + Sync + 'static {
    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn invalidate(&mut self, key_hash: &KeyHash) -> bool;

    fn invalidate_scope(&mut self) -> usize;

    /// Drops every query past its gc time, returning what was removed so the prefix index can follow.
    fn collect_garbage(&mut self, now: chrono::DateTime<chrono::Utc>) -> Vec<(KeyHash, Vec<String>)>;

    fn clear(&mut self);

    fn size(&self) -> usize;
}

impl<K, V> ScopeTrait for Scope<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn invalidate(&mut self, key_hash: &KeyHash) -> bool {
        if let Some(query) = self.cache.get_mut(key_hash) {
            query.invalidate();
            true
        } else {
            false
        }
    }

    fn invalidate_scope(&mut self) -> usize {
        for query in self.cache.values_mut() {
            query.invalidate();
        }
        self.cache.len()
    }

    fn collect_garbage(&mut self, now: chrono::DateTime<chrono::Utc>) -> Vec<(KeyHash, Vec<String>)> {
        let due = self
            .cache
            .iter()
            .filter(|(key_hash, query)| query.gc_due(now) && !self.watched(key_hash))
            .map(|(key_hash, _)| *key_hash)
            .collect::<Vec<_>>();
        let mut removed = Vec::with_capacity(due.len());
        for key_hash in due {
            if let Some(query) = self.cache.remove(&key_hash) {
                removed.push((key_hash, query.prefix_path().to_vec()));
            }
        }
        self.prune();
        removed
    }

    fn clear(&mut self) {
        self.cache.clear();
        self.prune();
    }

    fn size(&self) -> usize {
        self.cache.len()
    }
}

/// Everything one [`crate::EntityQueryClient`] has cached.
pub(crate) struct ClientStore {
    scopes: HashMap<ScopeCacheKey, Box<dyn ScopeTrait>>,
    prefix_index: KeyTrie<(ScopeCacheKey, KeyHash)>,
    // Bumped by clear(), fetches started under an older epoch don't write back.
    epoch: u64,
}

impl ClientStore {
    fn new() -> Self {
        Self {
            scopes: HashMap::new(),
            prefix_index: KeyTrie::default(),
            epoch: 0,
        }
    }

    fn scope_mut<K, V>(&mut self, cache_key: ScopeCacheKey) -> &mut Scope<K, V>
    where
        K: Send + Sync + 'static,
        V: Send + Sync + 'static,
    {
        scope_in::<K, V>(&mut self.scopes, cache_key)
    }
}

/// Takes the map rather than the store, so the prefix index can be borrowed alongside.
fn scope_in<K, V>(
    scopes: &mut HashMap<ScopeCacheKey, Box<dyn ScopeTrait>>,
    cache_key: ScopeCacheKey,
) -> &mut Scope<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    scopes
        .entry(cache_key)
        .or_insert_with(|| Box::new(Scope::<K, V>::default()))
        .as_any_mut()
        .downcast_mut::<Scope<K, V>>()
        .expect("Cache entry type mismatch.")
}

static CLIENT_STORES: LazyLock<parking_lot::RwLock<HashMap<u64, ClientStore>>> =
    LazyLock::new(|| parking_lot::RwLock::new(HashMap::new()));

/// Handle to a client's store.
///
/// The store itself lives in a process-wide lookup keyed by client id, so the handle,
/// and the client holding it, can be `Copy`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ScopeLookup {
    client_id: u64,
}

impl ScopeLookup {
    pub fn new() -> Self {
        let client_id = new_client_id();
        CLIENT_STORES.write().insert(client_id, ClientStore::new());
        Self { client_id }
    }

    fn store_mut(&self) -> parking_lot::MappedRwLockWriteGuard<'_, ClientStore> {
        parking_lot::RwLockWriteGuard::map(CLIENT_STORES.write(), |stores| {
            stores
                .get_mut(&self.client_id)
                .expect("Client store not found (bug)")
        })
    }

    fn store(&self) -> parking_lot::MappedRwLockReadGuard<'_, ClientStore> {
        parking_lot::RwLockReadGuard::map(CLIENT_STORES.read(), |stores| {
            stores
                .get(&self.client_id)
                .expect("Client store not found (bug)")
        })
    }

    pub fn epoch(&self) -> u64 {
        self.store().epoch
    }

    /// The buster for one key. Resources track it, and hold the returned `Arc` while the key
    /// is theirs, which also keeps the page from being garbage collected.
    pub fn watch<K, V>(&self, cache_key: ScopeCacheKey, key_hash: KeyHash) -> Arc<ArcRwSignal<u64>>
    where
        K: Send + Sync + 'static,
        V: Send + Sync + 'static,
    {
        self.store_mut()
            .scope_mut::<K, V>(cache_key)
            .busters
            .entry(key_hash)
            .or_insert_with(|| Arc::new(ArcRwSignal::new(new_buster_id())))
            .clone()
    }

    // Only with the store unlocked, subscribers may read the cache straight away.
    fn bust(busters: impl IntoIterator<Item = ArcRwSignal<u64>>) {
        for buster in busters {
            buster.set(new_buster_id());
        }
    }

    pub fn fetcher_mutex<K, V>(
        &self,
        cache_key: ScopeCacheKey,
        key_hash: KeyHash,
    ) -> Arc<futures::lock::Mutex<()>>
    where
        K: Send + Sync + 'static,
        V: Send + Sync + 'static,
    {
        self.store_mut()
            .scope_mut::<K, V>(cache_key)
            .fetcher_mutexes
            .entry(key_hash)
            .or_insert_with(|| Arc::new(futures::lock::Mutex::new(())))
            .clone()
    }

    pub fn with_cached_query<K, V, R>(
        &self,
        cache_key: ScopeCacheKey,
        key_hash: &KeyHash,
        key: &K,
        cb: impl FnOnce(Option<&mut Query<K, V>>) -> R,
    ) -> R
    where
        K: PartialEq + Send + Sync + 'static,
        V: Send + Sync + 'static,
    {
        let mut guard = self.store_mut();
        cb(guard.scope_mut::<K, V>(cache_key).get_mut(key_hash, key))
    }

    /// Insert or replace the cached value for a key.
    ///
    /// With `notify`, resources watching the key re-run. A fetch writing back its own result
    /// doesn't notify: the resource that asked for it already has it.
    pub fn store_query<K, V>(
        &self,
        cache_key: ScopeCacheKey,
        key_hash: KeyHash,
        key: &K,
        value: V,
        combined_options: QueryOptions,
        prefix_path: Vec<String>,
        notify: bool,
    ) where
        K: Clone + PartialEq + Send + Sync + 'static,
        V: Send + Sync + 'static,
    {
        let (buster, new_gc_id) = {
            let mut guard = self.store_mut();
            let store = &mut *guard;
            let scope = scope_in::<K, V>(&mut store.scopes, cache_key);
            let new_gc_id = if let Some(cached) = scope.get_mut(&key_hash, key) {
                cached.set_value(value);
                cached.combined_options = combined_options;
                None
            } else {
                // A colliding entry for a different key is replaced, its index entry goes with it:
                if let Some(replaced) = scope.cache.remove(&key_hash) {
                    store
                        .prefix_index
                        .remove(replaced.prefix_path(), &(cache_key, key_hash));
                }
                store.prefix_index.insert(&prefix_path, (cache_key, key_hash));
                let query = Query::new(key.clone(), value, combined_options, prefix_path);
                let gc_id = query.gc_id();
                scope.cache.insert(key_hash, query);
                Some(gc_id)
            };
            let buster = if notify { scope.buster(&key_hash) } else { None };
            (buster, new_gc_id)
        };

        if let Some(gc_id) = new_gc_id {
            let this = *self;
            schedule_gc(
                move || this.gc_query::<K, V>(cache_key, key_hash, gc_id),
                combined_options.gc_time(),
            );
        }
        Self::bust(buster);
    }

    /// Timer callback for one entry: `true` once there's nothing left to collect for this timer.
    fn gc_query<K, V>(&self, cache_key: ScopeCacheKey, key_hash: KeyHash, gc_id: u64) -> bool
    where
        K: Send + Sync + 'static,
        V: Send + Sync + 'static,
    {
        let mut stores = CLIENT_STORES.write();
        // The client itself is gone:
        let Some(store) = stores.get_mut(&self.client_id) else {
            return true;
        };
        let Some(scope) = store
            .scopes
            .get_mut(&cache_key)
            .and_then(|scope| scope.as_any_mut().downcast_mut::<Scope<K, V>>())
        else {
            return true;
        };
        match scope.cache.get(&key_hash) {
            // Removed or replaced since, the replacement runs its own timer:
            None => true,
            Some(query) if query.gc_id() != gc_id => true,
            Some(query) => {
                if !query.gc_due(chrono::Utc::now()) || scope.watched(&key_hash) {
                    return false;
                }
                if let Some(removed) = scope.remove_query(&key_hash) {
                    store
                        .prefix_index
                        .remove(removed.prefix_path(), &(cache_key, key_hash));
                    tracing::trace!("Garbage collected entity page");
                }
                true
            }
        }
    }

    pub fn invalidate_query<K, V>(&self, cache_key: ScopeCacheKey, key_hash: &KeyHash, key: &K) -> bool
    where
        K: PartialEq + Send + Sync + 'static,
        V: Send + Sync + 'static,
    {
        let (invalidated, buster) = {
            let mut guard = self.store_mut();
            let scope = guard.scope_mut::<K, V>(cache_key);
            match scope.get_mut(key_hash, key) {
                Some(cached) => {
                    cached.invalidate();
                    (true, scope.buster(key_hash))
                }
                None => (false, None),
            }
        };
        Self::bust(buster);
        invalidated
    }

    pub fn invalidate_prefix<S: AsRef<str>>(&self, prefix: &[S]) -> usize {
        let busters = {
            let mut guard = self.store_mut();
            let store = &mut *guard;
            let targets = store
                .prefix_index
                .find_with_prefix(prefix)
                .into_iter()
                .copied()
                .collect::<Vec<_>>();
            let mut busters = Vec::with_capacity(targets.len());
            for (cache_key, key_hash) in targets {
                if let Some(scope) = store.scopes.get_mut(&cache_key) {
                    if scope.invalidate(&key_hash) {
                        busters.push(scope.buster(&key_hash));
                    }
                }
            }
            busters
        };
        let invalidated = busters.len();
        Self::bust(busters.into_iter().flatten());
        invalidated
    }

    pub fn invalidate_scope(&self, cache_key: ScopeCacheKey) -> usize {
        let (invalidated, busters) = {
            let mut guard = self.store_mut();
            match guard.scopes.get_mut(&cache_key) {
                Some(scope) => (scope.invalidate_scope(), scope.busters()),
                None => (0, vec![]),
            }
        };
        Self::bust(busters);
        invalidated
    }

    pub fn invalidate_all(&self) -> usize {
        let (invalidated, busters) = {
            let mut guard = self.store_mut();
            let mut invalidated = 0;
            let mut busters = vec![];
            for scope in guard.scopes.values_mut() {
                invalidated += scope.invalidate_scope();
                busters.extend(scope.busters());
            }
            (invalidated, busters)
        };
        Self::bust(busters);
        invalidated
    }

    pub fn clear(&self) {
        let busters = {
            let mut guard = self.store_mut();
            let mut busters = vec![];
            for scope in guard.scopes.values_mut() {
                scope.clear();
                busters.extend(scope.busters());
            }
            guard.prefix_index.clear();
            guard.epoch += 1;
            busters
        };
        Self::bust(busters);
    }

    pub fn collect_garbage(&self) -> usize {
        let now = chrono::Utc::now();
        let mut guard = self.store_mut();
        let store = &mut *guard;
        let mut collected = 0;
        for (cache_key, scope) in store.scopes.iter_mut() {
            for (key_hash, prefix_path) in scope.collect_garbage(now) {
                store.prefix_index.remove(&prefix_path, &(*cache_key, key_hash));
                collected += 1;
            }
        }
        collected
    }

    pub fn size(&self) -> usize {
        self.store().scopes.values().map(|scope| scope.size()).sum()
    }
}
