use std::borrow::Borrow;

use leptos::prelude::{expect_context, provide_context};

use crate::{
    FetchEntityResult, FetchOutcome, QueryKey, QueryOptions, cache::ScopeLookup,
    options_combine, query_scope::EntityScope, utils::KeyHash,
};

/// The [`EntityQueryClient`] caches entity pages per query key and deduplicates fetches.
///
/// Should be provided via leptos context at the top of the app.
///
/// # Example
///
/// ```
/// use leptos::prelude::*;
/// use entity_query::EntityQueryClient;
///
/// #[component]
/// pub fn App() -> impl IntoView {
///     EntityQueryClient::provide();
///     // ...
/// }
///
/// #[component]
/// pub fn HostsTable() -> impl IntoView {
///     let client = EntityQueryClient::expect();
///     // ...
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct EntityQueryClient {
    pub(crate) scope_lookup: ScopeLookup,
    options: QueryOptions,
}

impl Default for EntityQueryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityQueryClient {
    /// Creates a new [`EntityQueryClient`] with an empty cache.
    pub fn new() -> Self {
        Self {
            scope_lookup: ScopeLookup::new(),
            options: QueryOptions::default(),
        }
    }

    /// Create a new [`EntityQueryClient`] with custom options.
    ///
    /// These options will be combined with any options for a specific [`EntityScope`].
    pub fn new_with_options(options: QueryOptions) -> Self {
        Self {
            scope_lookup: ScopeLookup::new(),
            options,
        }
    }

    /// Create a new [`EntityQueryClient`] and provide it via leptos context.
    pub fn provide() {
        provide_context(Self::new())
    }

    /// Create a new [`EntityQueryClient`] with custom options and provide it via leptos context.
    pub fn provide_with_options(options: QueryOptions) {
        provide_context(Self::new_with_options(options))
    }

    /// Extract the [`EntityQueryClient`] out of leptos context.
    ///
    /// # Panics
    ///
    /// Panics if the client has not been provided via leptos context by a parent component.
    #[track_caller]
    pub fn expect() -> Self {
        expect_context()
    }

    /// Read the base [`QueryOptions`] for this client.
    pub fn options(&self) -> QueryOptions {
        self.options
    }

    /// Fetch one page, going through the cache.
    ///
    /// - Cached and fresh: returned without a request.
    /// - Missing, stale or invalidated: fetched, stored, returned.
    /// - Already being fetched by another caller: waits for that fetch and reuses its result.
    ///
    /// Errors are returned to the caller only, never cached; a previously cached page for the
    /// key survives a failed refetch. A fetch that started before [`EntityQueryClient::clear`]
    /// is returned but not stored.
    pub async fn fetch_query<K, T>(&self, scope: &EntityScope<K, T>, key: impl Borrow<K>) -> FetchOutcome<T>
    where
        K: QueryKey + Send + Sync + 'static,
        T: Clone + Send + Sync + 'static,
    {
        let key = key.borrow();
        let key_hash = KeyHash::new(key);
        let cache_key = scope.cache_key();

        if let Some(cached) = self.fresh_cached::<K, T>(scope, &key_hash, key) {
            tracing::trace!(entity = key.entity(), "Entity page served from cache");
            return Ok(cached);
        }

        let fetcher_mutex = self
            .scope_lookup
            .fetcher_mutex::<K, FetchEntityResult<T>>(cache_key, key_hash);
        let _fetcher_guard = match fetcher_mutex.try_lock() {
            Some(fetcher_guard) => fetcher_guard,
            None => {
                // If have to wait, should check cache again in case it was fetched while waiting.
                // Whatever landed while waiting is used even when already stale (zero stale time).
                let waiting_since = chrono::Utc::now();
                let fetcher_guard = fetcher_mutex.lock().await;
                if let Some(cached) = self.cached_since::<K, T>(scope, &key_hash, key, waiting_since) {
                    return Ok(cached);
                }
                fetcher_guard
            }
        };

        let epoch = self.scope_lookup.epoch();
        tracing::debug!(
            entity = key.entity(),
            key = %key.fingerprint(),
            scope = scope.title(),
            "Fetching entity page"
        );
        let outcome = scope.fetch(key.clone()).await;

        match &outcome {
            Ok(value) if self.scope_lookup.epoch() == epoch => {
                self.scope_lookup.store_query::<K, FetchEntityResult<T>>(
                    cache_key,
                    key_hash,
                    key,
                    value.clone(),
                    options_combine(self.options, scope.options()),
                    key.prefix_path(),
                    false,
                );
            }
            Ok(_) => {
                tracing::debug!(
                    entity = key.entity(),
                    "Cache cleared while fetching, result not stored"
                );
            }
            Err(error) => {
                tracing::warn!(entity = key.entity(), key = %key.fingerprint(), %error, "Entity fetch failed");
            }
        }
        outcome
    }

    /// Make sure a page is cached and fresh without needing its value.
    pub async fn prefetch_query<K, T>(&self, scope: &EntityScope<K, T>, key: impl Borrow<K>)
    where
        K: QueryKey + Send + Sync + 'static,
        T: Clone + Send + Sync + 'static,
    {
        // Failures were already logged, prefetching has no one to report to:
        let _ = self.fetch_query(scope, key).await;
    }

    /// Synchronously get a page from the cache, if it exists, stale or not.
    pub fn get_cached_query<K, T>(
        &self,
        scope: &EntityScope<K, T>,
        key: impl Borrow<K>,
    ) -> Option<FetchEntityResult<T>>
    where
        K: QueryKey + Send + Sync + 'static,
        T: Clone + Send + Sync + 'static,
    {
        let key = key.borrow();
        self.scope_lookup.with_cached_query::<K, FetchEntityResult<T>, _>(
            scope.cache_key(),
            &KeyHash::new(key),
            key,
            |maybe_cached| {
                maybe_cached.map(|cached| {
                    cached.mark_read();
                    cached.value().clone()
                })
            },
        )
    }

    /// The cached page, or the empty placeholder when nothing is cached for the key yet.
    pub fn get_cached_or_placeholder<K, T>(
        &self,
        scope: &EntityScope<K, T>,
        key: impl Borrow<K>,
    ) -> FetchEntityResult<T>
    where
        K: QueryKey + Send + Sync + 'static,
        T: Clone + Send + Sync + 'static,
    {
        self.get_cached_query(scope, key).unwrap_or_default()
    }

    /// Synchronously check if a page exists in the cache.
    pub fn query_exists<K, T>(&self, scope: &EntityScope<K, T>, key: impl Borrow<K>) -> bool
    where
        K: QueryKey + Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        let key = key.borrow();
        self.scope_lookup.with_cached_query::<K, FetchEntityResult<T>, _>(
            scope.cache_key(),
            &KeyHash::new(key),
            key,
            |maybe_cached| maybe_cached.is_some(),
        )
    }

    /// Replace the cached page for a key wholesale, e.g. after a mutation returned fresh rows.
    ///
    /// Resources showing the key pick the new page up.
    pub fn set_query<K, T>(&self, scope: &EntityScope<K, T>, key: impl Borrow<K>, value: FetchEntityResult<T>)
    where
        K: QueryKey + Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        let key = key.borrow();
        self.scope_lookup.store_query::<K, FetchEntityResult<T>>(
            scope.cache_key(),
            KeyHash::new(key),
            key,
            value,
            options_combine(self.options, scope.options()),
            key.prefix_path(),
            true,
        );
    }

    /// Mark a page as stale. The next time it's accessed it'll be refetched.
    ///
    /// Returns `true` if the page was cached.
    pub fn invalidate_query<K, T>(&self, scope: &EntityScope<K, T>, key: impl Borrow<K>) -> bool
    where
        K: QueryKey + Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        let key = key.borrow();
        let invalidated = self
            .scope_lookup
            .invalidate_query::<K, FetchEntityResult<T>>(scope.cache_key(), &KeyHash::new(key), key);
        tracing::trace!(entity = key.entity(), invalidated, "Invalidated entity page");
        invalidated
    }

    /// Mark every page whose key path starts with `prefix` as stale, across all scopes.
    ///
    /// Key paths are `[entity]`, or `[parent_entity, parent_id, entity]` for scoped keys:
    /// `["services"]` hits every services page, `["inbounds", "7"]` every list nested under inbound 7,
    /// and `["inbounds"]` every list nested under any inbound.
    ///
    /// Returns the number of pages invalidated.
    pub fn invalidate_queries_with_prefix<S: AsRef<str>>(&self, prefix: &[S]) -> usize {
        let invalidated = self.scope_lookup.invalidate_prefix(prefix);
        tracing::trace!(
            prefix = ?prefix.iter().map(AsRef::as_ref).collect::<Vec<_>>(),
            invalidated,
            "Invalidated entity pages by prefix"
        );
        invalidated
    }

    /// Mark every page of one scope as stale.
    pub fn invalidate_scope<K, T>(&self, scope: &EntityScope<K, T>) -> usize
    where
        K: 'static,
        T: 'static,
    {
        self.scope_lookup.invalidate_scope(scope.cache_key())
    }

    /// Mark every cached page as stale.
    pub fn invalidate_all_queries(&self) -> usize {
        self.scope_lookup.invalidate_all()
    }

    /// Empty the cache. [`EntityQueryClient::invalidate_all_queries`] is preferred in most cases,
    /// it keeps showing the old pages until their refetch lands.
    pub fn clear(&self) {
        self.scope_lookup.clear();
        tracing::debug!("Entity query cache cleared");
    }

    /// Drop pages that have not been read for longer than their gc time. Returns how many were dropped.
    ///
    /// Each page also schedules its own collection when stored, so this is only needed to collect
    /// early, or where no timers run. Pages a mounted [`crate::EntityQuery`] shows are kept.
    pub fn collect_garbage(&self) -> usize {
        let collected = self.scope_lookup.collect_garbage();
        if collected > 0 {
            tracing::debug!(collected, "Garbage collected entity pages");
        }
        collected
    }

    /// Number of cached pages across all scopes.
    pub fn size(&self) -> usize {
        self.scope_lookup.size()
    }

    fn fresh_cached<K, T>(
        &self,
        scope: &EntityScope<K, T>,
        key_hash: &KeyHash,
        key: &K,
    ) -> Option<FetchEntityResult<T>>
    where
        K: QueryKey + Send + Sync + 'static,
        T: Clone + Send + Sync + 'static,
    {
        self.scope_lookup.with_cached_query::<K, FetchEntityResult<T>, _>(
            scope.cache_key(),
            key_hash,
            key,
            |maybe_cached| {
                maybe_cached.and_then(|cached| {
                    if cached.stale() {
                        None
                    } else {
                        cached.mark_read();
                        Some(cached.value().clone())
                    }
                })
            },
        )
    }

    fn cached_since<K, T>(
        &self,
        scope: &EntityScope<K, T>,
        key_hash: &KeyHash,
        key: &K,
        since: chrono::DateTime<chrono::Utc>,
    ) -> Option<FetchEntityResult<T>>
    where
        K: QueryKey + Send + Sync + 'static,
        T: Clone + Send + Sync + 'static,
    {
        self.scope_lookup.with_cached_query::<K, FetchEntityResult<T>, _>(
            scope.cache_key(),
            key_hash,
            key,
            |maybe_cached| {
                maybe_cached
                    .filter(|cached| !cached.stale() || cached.updated_since(since))
                    .map(|cached| {
                        cached.mark_read();
                        cached.value().clone()
                    })
            },
        )
    }
}
