#![allow(clippy::type_complexity)]
#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/README.md"))]

mod cache;
mod config;
mod entities;
mod error;
mod fetch;
mod gc;
mod query;
mod query_client;
mod query_key;
mod query_options;
mod query_scope;
mod resource;
mod table;
mod transport;
mod trie;
mod utils;

#[cfg(test)]
mod test_utils;

pub use config::*;
pub use entities::*;
pub use error::*;
pub use fetch::*;
pub use query_client::*;
pub use query_key::*;
pub use query_options::*;
pub use query_scope::*;
pub use resource::*;
pub use table::*;
pub use transport::*;

#[cfg(test)]
mod test {
    use std::time::Duration;

    use rstest::*;
    use serde_json::json;

    use super::*;
    use crate::test_utils::MockTransport;

    const FETCH_MS: u64 = 20;

    fn hosts_transport() -> MockTransport {
        let transport = MockTransport::new().with_delay(Duration::from_millis(FETCH_MS));
        for inbound_id in [7, 8] {
            transport.respond(
                &format!("/inbounds/{inbound_id}/hosts"),
                json!({
                    "items": [{"id": inbound_id, "remark": "r", "address": "a"}],
                    "pages": 1,
                }),
            );
        }
        transport
    }

    fn key(inbound_id: i64, page: u32) -> SidebarQueryKey {
        hosts_query_key(&EntityQueryProps::new(page, 10), Some(inbound_id.into()))
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum InvalidationType {
        Query,
        Prefix,
        Scope,
        All,
    }

    /// Concurrent fetches of one key share a single request.
    #[rstest]
    #[tokio::test]
    async fn test_fetch_dedup() {
        let transport = hosts_transport();
        let scope = hosts_scope(transport.clone());
        let client = EntityQueryClient::new();

        let (a, b, c) = futures::join!(
            client.fetch_query(&scope, key(7, 1)),
            client.fetch_query(&scope, key(7, 1)),
            client.fetch_query(&scope, key(7, 1)),
        );
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(a.unwrap().entity[0].id, 7);
        assert_eq!(transport.requests().len(), 1);
        assert_eq!(client.size(), 1);

        // Cached now:
        client.fetch_query(&scope, key(7, 1)).await.unwrap();
        assert_eq!(transport.requests().len(), 1);
    }

    /// Every distinct key gets its own request and its own value.
    #[rstest]
    #[tokio::test]
    async fn test_key_integrity() {
        let transport = hosts_transport();
        let scope = hosts_scope(transport.clone());
        let client = EntityQueryClient::new();

        let keys = [key(7, 1), key(7, 2), key(8, 1)];
        let results = futures::future::join_all(keys.iter().map(|key| client.fetch_query(&scope, key))).await;
        let ids = results
            .into_iter()
            .map(|result| result.unwrap().entity[0].id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![7, 7, 8]);
        assert_eq!(transport.requests().len(), 3);
        assert_eq!(client.size(), 3);
    }

    #[rstest]
    #[tokio::test]
    async fn test_stale_refetch() {
        let transport = hosts_transport();
        let scope = hosts_scope(transport.clone());
        let client = EntityQueryClient::new_with_options(
            QueryOptions::new().set_stale_time(Duration::from_millis(FETCH_MS)),
        );

        client.fetch_query(&scope, key(7, 1)).await.unwrap();
        client.fetch_query(&scope, key(7, 1)).await.unwrap();
        assert_eq!(transport.requests().len(), 1);

        tokio::time::sleep(Duration::from_millis(FETCH_MS + 5)).await;
        // Stale values are still readable synchronously:
        assert!(client.get_cached_query(&scope, key(7, 1)).is_some());
        client.fetch_query(&scope, key(7, 1)).await.unwrap();
        assert_eq!(transport.requests().len(), 2);
    }

    #[rstest]
    #[tokio::test]
    async fn test_invalidation(
        #[values(
            InvalidationType::Query,
            InvalidationType::Prefix,
            InvalidationType::Scope,
            InvalidationType::All
        )]
        invalidation_type: InvalidationType,
    ) {
        let transport = hosts_transport();
        let scope = hosts_scope(transport.clone());
        let client = EntityQueryClient::new();

        client.fetch_query(&scope, key(7, 1)).await.unwrap();
        assert!(client.query_exists(&scope, key(7, 1)));

        let invalidated = match invalidation_type {
            InvalidationType::Query => usize::from(client.invalidate_query(&scope, key(7, 1))),
            InvalidationType::Prefix => client.invalidate_queries_with_prefix(&["inbounds", "7", "hosts"]),
            InvalidationType::Scope => client.invalidate_scope(&scope),
            InvalidationType::All => client.invalidate_all_queries(),
        };
        assert_eq!(invalidated, 1);

        // Invalidated, not removed:
        assert!(client.query_exists(&scope, key(7, 1)));
        client.fetch_query(&scope, key(7, 1)).await.unwrap();
        assert_eq!(transport.requests().len(), 2);
    }

    #[rstest]
    #[tokio::test]
    async fn test_prefix_invalidation_is_hierarchical() {
        let transport = hosts_transport();
        let hosts = hosts_scope(transport.clone());
        let client = EntityQueryClient::new();
        transport.respond("/services", json!({"items": [], "pages": 0}));
        let services = services_scope(transport.clone());
        let services_key = services_query_key(&EntityQueryProps::new(1, 10));

        client.fetch_query(&hosts, key(7, 1)).await.unwrap();
        client.fetch_query(&hosts, key(7, 2)).await.unwrap();
        client.fetch_query(&hosts, key(8, 1)).await.unwrap();
        client.fetch_query(&services, &services_key).await.unwrap();

        assert_eq!(client.invalidate_queries_with_prefix(&["inbounds", "7"]), 2);
        assert_eq!(client.invalidate_queries_with_prefix(&["inbounds"]), 3);
        assert_eq!(client.invalidate_queries_with_prefix(&["services"]), 1);
        assert_eq!(client.invalidate_queries_with_prefix(&["users"]), 0);
        assert_eq!(client.invalidate_queries_with_prefix::<&str>(&[]), 4);
    }

    /// A failed fetch is returned but never cached, and leaves every other entry alone.
    #[rstest]
    #[tokio::test]
    async fn test_errors_not_cached() {
        let transport = hosts_transport();
        let scope = hosts_scope(transport.clone());
        let client = EntityQueryClient::new();
        let error = FetchError::Status {
            status: 500,
            body: "down".to_string(),
        };

        let first = client.fetch_query(&scope, key(7, 1)).await.unwrap();
        transport.fail("/inbounds/8/hosts", error.clone());
        assert_eq!(client.fetch_query(&scope, key(8, 1)).await, Err(error.clone()));
        assert!(!client.query_exists(&scope, key(8, 1)));
        assert_eq!(client.get_cached_query(&scope, key(7, 1)), Some(first.clone()));

        // A failed refetch keeps the previous value:
        transport.fail("/inbounds/7/hosts", error.clone());
        client.invalidate_query(&scope, key(7, 1));
        assert_eq!(client.fetch_query(&scope, key(7, 1)).await, Err(error));
        assert_eq!(client.get_cached_query(&scope, key(7, 1)), Some(first));
    }

    /// A fetch in flight while the cache is cleared doesn't repopulate it.
    #[rstest]
    #[tokio::test]
    async fn test_clear_during_fetch() {
        let transport = hosts_transport();
        let scope = hosts_scope(transport.clone());
        let client = EntityQueryClient::new();

        let (outcome, ()) = futures::join!(client.fetch_query(&scope, key(7, 1)), async {
            tokio::time::sleep(Duration::from_millis(FETCH_MS / 2)).await;
            client.clear();
        });
        assert!(outcome.is_ok());
        assert_eq!(client.size(), 0);

        client.fetch_query(&scope, key(7, 1)).await.unwrap();
        assert_eq!(client.size(), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn test_declaratives() {
        let transport = hosts_transport();
        let scope = hosts_scope(transport.clone());
        let client = EntityQueryClient::new();

        assert!(!client.query_exists(&scope, key(7, 1)));
        assert_eq!(
            client.get_cached_or_placeholder(&scope, key(7, 1)),
            FetchEntityResult::placeholder()
        );

        client.set_query(&scope, key(7, 1), FetchEntityResult::new(vec![], 9));
        assert_eq!(client.get_cached_query(&scope, key(7, 1)).unwrap().page_count, 9);
        // Set values are fresh:
        client.fetch_query(&scope, key(7, 1)).await.unwrap();
        assert!(transport.requests().is_empty());

        client.prefetch_query(&scope, key(8, 1)).await;
        assert!(client.query_exists(&scope, key(8, 1)));
        assert_eq!(client.size(), 2);

        client.clear();
        assert_eq!(client.size(), 0);
    }

    /// Clones of a scope, and scopes built from the same function, share cached pages.
    #[rstest]
    #[tokio::test]
    async fn test_shared_scope_cache() {
        let transport = hosts_transport();
        let scope = hosts_scope(transport.clone());
        let client = EntityQueryClient::new();

        client.fetch_query(&scope, key(7, 1)).await.unwrap();
        assert!(client.query_exists(&scope.clone(), key(7, 1)));
        assert!(client.query_exists(&hosts_scope(transport.clone()), key(7, 1)));

        // Separate clients never share:
        assert!(!EntityQueryClient::new().query_exists(&scope, key(7, 1)));
    }

    /// Pages are collected on their own once unread for their gc time, reading pushes that back.
    #[rstest]
    #[tokio::test]
    async fn test_gc() {
        const GC_TIME_MS: u64 = 60;

        let transport = hosts_transport();
        let scope = hosts_scope(transport.clone())
            .with_options(QueryOptions::new().set_gc_time(Duration::from_millis(GC_TIME_MS)));
        let client = EntityQueryClient::new();

        client.set_query(&scope, key(7, 1), FetchEntityResult::new(vec![], 1));
        client.set_query(&scope, key(8, 1), FetchEntityResult::new(vec![], 1));
        assert_eq!(client.collect_garbage(), 0);

        tokio::time::sleep(Duration::from_millis(GC_TIME_MS / 2)).await;
        // Reading keeps an entry alive:
        assert!(client.get_cached_query(&scope, key(8, 1)).is_some());
        tokio::time::sleep(Duration::from_millis(GC_TIME_MS / 2 + 20)).await;

        // Dropped by its timer, no collect_garbage call needed:
        assert!(!client.query_exists(&scope, key(7, 1)));
        assert!(client.query_exists(&scope, key(8, 1)));
        // Collected entries left the prefix index too:
        assert_eq!(client.invalidate_queries_with_prefix(&["inbounds"]), 1);

        // Due now, but its timer only checks again a full gc time after the read:
        tokio::time::sleep(Duration::from_millis(GC_TIME_MS / 2 - 5)).await;
        assert_eq!(client.collect_garbage(), 1);
        assert_eq!(client.size(), 0);
        assert!(transport.requests().is_empty());
    }
}
