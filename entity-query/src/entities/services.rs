use serde::{Deserialize, Serialize};

use crate::{
    ApiTransport, EntityEndpoint, EntityId, EntityQueryClient, EntityQueryKey, EntityQueryProps,
    EntityScope, FetchError, FetchOutcome, fetch_entities,
};

pub const SERVICES: EntityEndpoint = EntityEndpoint::new("services", "/services");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRow {
    pub id: i64,
    pub name: String,
}

pub fn services_query_key(props: &EntityQueryProps) -> EntityQueryKey {
    SERVICES.query_key(props)
}

pub async fn fetch_services<A: ApiTransport>(transport: &A, key: &EntityQueryKey) -> FetchOutcome<ServiceRow> {
    fetch_entities(transport, &SERVICES, key).await
}

pub fn services_scope<A>(transport: A) -> EntityScope<EntityQueryKey, ServiceRow>
where
    A: ApiTransport + Clone + 'static,
{
    EntityScope::new(move |key: EntityQueryKey| {
        let transport = transport.clone();
        async move { fetch_services(&transport, &key).await }
    })
}

/// Delete one service, then mark every cached services page stale.
///
/// Nothing is invalidated when the delete fails.
pub async fn delete_service<A: ApiTransport>(
    client: &EntityQueryClient,
    transport: &A,
    id: impl Into<EntityId>,
) -> Result<(), FetchError> {
    let id = id.into();
    transport
        .delete(&format!("{}/{id}", SERVICES.collection_path()))
        .await?;
    let invalidated = client.invalidate_queries_with_prefix(&[SERVICES.entity()]);
    tracing::debug!(%id, invalidated, "Service deleted");
    Ok(())
}

/// Whether at least one service exists. Users can't be created without one.
pub async fn services_exist(
    client: &EntityQueryClient,
    scope: &EntityScope<EntityQueryKey, ServiceRow>,
) -> Result<bool, FetchError> {
    let page = client
        .fetch_query(scope, services_query_key(&EntityQueryProps::new(1, 1)))
        .await?;
    Ok(page.page_count > 0)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{Filters, test_utils::MockTransport};

    #[tokio::test]
    async fn test_name_filter() {
        let transport = MockTransport::new();
        transport.respond(
            "/services",
            json!({"items": [{"id": 1, "name": "premium"}], "pages": 1}),
        );
        let props = EntityQueryProps::new(1, 10).with_filters(Filters::new().with("name", Some("prem")));
        let key = services_query_key(&props);
        assert_eq!(key.primary_filter, "prem");

        let page = fetch_services(&transport, &key).await.unwrap();
        assert_eq!(
            page.entity,
            vec![ServiceRow {
                id: 1,
                name: "premium".to_string()
            }]
        );
        assert_eq!(transport.requests()[0].param("name"), Some("prem"));
    }

    #[tokio::test]
    async fn test_delete_invalidates_services_only() {
        let transport = MockTransport::new();
        transport.respond("/services", json!({"items": [{"id": 1, "name": "a"}], "pages": 1}));
        transport.respond("/users", json!({"items": [], "pages": 0}));
        let client = EntityQueryClient::new();
        let scope = services_scope(transport.clone());
        let users = crate::entities::users_scope(transport.clone());
        let props = EntityQueryProps::new(1, 10);
        let key = services_query_key(&props);

        client.fetch_query(&scope, &key).await.unwrap();
        client
            .fetch_query(&users, crate::entities::users_query_key(&props))
            .await
            .unwrap();
        assert_eq!(transport.requests().len(), 2);

        delete_service(&client, &transport, 1).await.unwrap();
        assert_eq!(transport.deletes(), vec!["/services/1"]);

        // Services refetch, users are still fresh:
        client.fetch_query(&scope, &key).await.unwrap();
        client
            .fetch_query(&users, crate::entities::users_query_key(&props))
            .await
            .unwrap();
        let paths = transport
            .requests()
            .into_iter()
            .map(|request| request.path)
            .collect::<Vec<_>>();
        assert_eq!(paths, vec!["/services", "/users", "/services"]);
    }

    #[tokio::test]
    async fn test_services_exist() {
        let transport = MockTransport::new();
        transport.respond("/services", json!({"items": [], "pages": 0}));
        let client = EntityQueryClient::new();
        let scope = services_scope(transport.clone());
        assert_eq!(services_exist(&client, &scope).await, Ok(false));

        transport.respond("/services", json!({"items": [{"id": 4, "name": "b"}], "pages": 1}));
        client.invalidate_scope(&scope);
        assert_eq!(services_exist(&client, &scope).await, Ok(true));
        assert_eq!(transport.requests()[0].param("size"), Some("1"));
    }
}
