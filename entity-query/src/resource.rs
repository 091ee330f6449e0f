use std::sync::Arc;

use leptos::prelude::*;

use crate::{
    EntityQueryClient, FetchEntityResult, FetchError, FetchOutcome, QueryKey, query_scope::EntityScope,
    utils::KeyHash,
};

/// The reactive view of one entity table's query, see [`use_entity_query`].
///
/// The underlying resource re-runs whenever the key changes, or the page for the current key is
/// set, invalidated or cleared. Its own fetch landing doesn't re-run it. Results are tagged with the key they were fetched for, so one landing after
/// the key has moved on is never shown as the current page.
pub struct EntityQuery<K, T>
where
    K: QueryKey + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    client: EntityQueryClient,
    scope: EntityScope<K, T>,
    key: Memo<K>,
    resource: LocalResource<(K, FetchOutcome<T>)>,
    /// The page for the current key: fetched, else cached, else the empty placeholder.
    pub data: Signal<FetchEntityResult<T>>,
    /// The error of the latest fetch for the current key, if it failed.
    pub error: Signal<Option<FetchError>>,
    /// No result for the current key has landed yet.
    pub is_pending: Signal<bool>,
}

impl<K, T> Clone for EntityQuery<K, T>
where
    K: QueryKey + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            client: self.client,
            scope: self.scope.clone(),
            key: self.key,
            resource: self.resource,
            data: self.data,
            error: self.error,
            is_pending: self.is_pending,
        }
    }
}

impl<K, T> EntityQuery<K, T>
where
    K: QueryKey + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// The current key.
    pub fn key(&self) -> Memo<K> {
        self.key
    }

    /// The raw resource, resolving to the key it fetched and its outcome.
    pub fn resource(&self) -> LocalResource<(K, FetchOutcome<T>)> {
        self.resource
    }

    /// Invalidate the current key, the resource picks the refetch up on its own.
    pub fn refetch(&self) {
        self.client
            .invalidate_query(&self.scope, self.key.get_untracked());
    }
}

impl EntityQueryClient {
    /// Reactive query for an entity table: `keyer` is tracked, each key it produces is fetched
    /// through this client's cache.
    pub fn entity_query<K, T>(
        &self,
        scope: EntityScope<K, T>,
        keyer: impl Fn() -> K + Send + Sync + 'static,
    ) -> EntityQuery<K, T>
    where
        K: QueryKey + Send + Sync + 'static,
        T: Clone + Send + Sync + 'static,
    {
        let client = *self;
        let cache_key = scope.cache_key();
        let key = Memo::new(move |_| keyer());
        // The buster of the key currently shown, holding it keeps that page from being collected.
        let watching = parking_lot::Mutex::new(None::<Arc<ArcRwSignal<u64>>>);

        let resource = LocalResource::new({
            let scope = scope.clone();
            move || {
                let scope = scope.clone();
                let key = key.get();
                let buster = client
                    .scope_lookup
                    .watch::<K, FetchEntityResult<T>>(cache_key, KeyHash::new(&key));
                buster.track();
                *watching.lock() = Some(buster);
                async move {
                    let outcome = client.fetch_query(&scope, &key).await;
                    (key, outcome)
                }
            }
        });

        let data = Signal::derive(move || {
            let current = key.get();
            let fetched = resource.with(|latest| match latest {
                Some((fetched_key, Ok(page))) if *fetched_key == current => Some(page.clone()),
                _ => None,
            });
            fetched
                .or_else(|| {
                    client
                        .scope_lookup
                        .with_cached_query::<K, FetchEntityResult<T>, _>(
                            cache_key,
                            &KeyHash::new(&current),
                            &current,
                            |maybe_cached| maybe_cached.map(|cached| cached.value().clone()),
                        )
                })
                .unwrap_or_default()
        });

        let error = Signal::derive(move || {
            let current = key.get();
            resource.with(|latest| match latest {
                Some((fetched_key, Err(error))) if *fetched_key == current => Some(error.clone()),
                _ => None,
            })
        });

        let is_pending = Signal::derive(move || {
            let current = key.get();
            resource.with(|latest| match latest {
                Some((fetched_key, _)) => *fetched_key != current,
                None => true,
            })
        });

        EntityQuery {
            client,
            scope,
            key,
            resource,
            data,
            error,
            is_pending,
        }
    }
}

/// [`EntityQueryClient::entity_query`] on the client provided via leptos context.
///
/// # Panics
///
/// Panics if no [`EntityQueryClient`] was provided by a parent component.
#[track_caller]
pub fn use_entity_query<K, T>(
    scope: EntityScope<K, T>,
    keyer: impl Fn() -> K + Send + Sync + 'static,
) -> EntityQuery<K, T>
where
    K: QueryKey + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    EntityQueryClient::expect().entity_query(scope, keyer)
}
