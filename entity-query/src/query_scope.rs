use std::{
    any::TypeId,
    fmt::{self, Debug, Formatter},
    future::Future,
    hash::{DefaultHasher, Hash, Hasher},
    pin::Pin,
    sync::Arc,
};

use crate::{FetchOutcome, QueryOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ScopeCacheKey(u64);

impl ScopeCacheKey {
    pub fn new(fetcher_type_id: TypeId) -> Self {
        let mut hasher = DefaultHasher::new();
        fetcher_type_id.hash(&mut hasher);
        Self(hasher.finish())
    }
}

impl Hash for ScopeCacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

type FetchFn<K, T> = dyn Fn(K) -> Pin<Box<dyn Future<Output = FetchOutcome<T>>>>;

/// An entity fetch function, bound to the cache partition it fills.
///
/// Scopes created from the same function type share cached pages,
/// so cloning a scope or rebuilding it from the same function is free.
/// Optional [`QueryOptions`] apply to this scope only and take precedence over the client's.
pub struct EntityScope<K, T> {
    fetch: Arc<FetchFn<K, T>>,
    cache_key: ScopeCacheKey,
    options: Option<QueryOptions>,
    title: &'static str,
}

impl<K, T> Clone for EntityScope<K, T> {
    fn clone(&self) -> Self {
        Self {
            fetch: self.fetch.clone(),
            cache_key: self.cache_key,
            options: self.options,
            title: self.title,
        }
    }
}

impl<K, T> Debug for EntityScope<K, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityScope")
            .field("title", &self.title)
            .field("options", &self.options)
            .finish()
    }
}

impl<K, T> EntityScope<K, T>
where
    K: 'static,
    T: 'static,
{
    /// Wrap a fetch function `Fn(K) -> Future<Output = FetchOutcome<T>>`.
    pub fn new<F, Fut>(fetch: F) -> Self
    where
        F: Fn(K) -> Fut + 'static,
        Fut: Future<Output = FetchOutcome<T>> + 'static,
    {
        Self {
            cache_key: ScopeCacheKey::new(TypeId::of::<F>()),
            title: std::any::type_name::<F>(),
            options: None,
            fetch: Arc::new(move |key| Box::pin(fetch(key))),
        }
    }

    /// Set specific [`QueryOptions`] to only apply to this scope.
    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = Some(options);
        self
    }

    pub fn options(&self) -> Option<QueryOptions> {
        self.options
    }

    /// The fetch function's type name, used in logs.
    pub fn title(&self) -> &'static str {
        self.title
    }

    /// Run the fetch function directly, bypassing the cache.
    pub fn fetch(&self, key: K) -> Pin<Box<dyn Future<Output = FetchOutcome<T>>>> {
        (self.fetch)(key)
    }

    pub(crate) fn cache_key(&self) -> ScopeCacheKey {
        self.cache_key
    }
}
