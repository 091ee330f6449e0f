use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::{
    ApiTransport, EntityEndpoint, EntityQueryKey, EntityQueryProps, EntityScope, FetchOutcome,
    fetch_entities,
};

pub const USERS: EntityEndpoint =
    EntityEndpoint::new("users", "/users").with_primary_filter("username", "username");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub used_traffic: u64,
    /// Bytes, `None` for unlimited.
    #[serde(default)]
    pub data_limit: Option<u64>,
    #[serde(default)]
    pub expire: Option<NaiveDateTime>,
    #[serde(default)]
    pub created_at: Option<NaiveDateTime>,
}

pub fn users_query_key(props: &EntityQueryProps) -> EntityQueryKey {
    USERS.query_key(props)
}

pub async fn fetch_users<A: ApiTransport>(transport: &A, key: &EntityQueryKey) -> FetchOutcome<UserRow> {
    fetch_entities(transport, &USERS, key).await
}

pub fn users_scope<A>(transport: A) -> EntityScope<EntityQueryKey, UserRow>
where
    A: ApiTransport + Clone + 'static,
{
    EntityScope::new(move |key: EntityQueryKey| {
        let transport = transport.clone();
        async move { fetch_users(&transport, &key).await }
    })
}
