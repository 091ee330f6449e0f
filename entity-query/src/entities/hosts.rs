use serde::{Deserialize, Serialize};

use crate::{
    ApiTransport, EntityEndpoint, EntityId, EntityQueryProps, EntityScope, FetchOutcome,
    SidebarQueryKey, fetch_entities,
};

/// Hosts, listed across all inbounds or for one inbound. The user-facing search box filters
/// on `username` and is sent as `remark`.
pub const HOSTS: EntityEndpoint = EntityEndpoint::new("hosts", "/inbounds/hosts")
    .nested_under("inbounds")
    .with_primary_filter("username", "remark");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRow {
    pub id: i64,
    pub remark: String,
    pub address: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub inbound_id: Option<i64>,
    #[serde(default)]
    pub is_disabled: bool,
}

pub fn hosts_query_key(props: &EntityQueryProps, inbound_id: Option<EntityId>) -> SidebarQueryKey {
    HOSTS.sidebar_query_key(props, inbound_id)
}

pub async fn fetch_hosts<A: ApiTransport>(transport: &A, key: &SidebarQueryKey) -> FetchOutcome<HostRow> {
    fetch_entities(transport, &HOSTS, key).await
}

pub fn hosts_scope<A>(transport: A) -> EntityScope<SidebarQueryKey, HostRow>
where
    A: ApiTransport + Clone + 'static,
{
    EntityScope::new(move |key: SidebarQueryKey| {
        let transport = transport.clone();
        async move { fetch_hosts(&transport, &key).await }
    })
}
