use std::collections::BTreeMap;

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    EntityId, EntityQueryKey, EntityQueryProps, FetchError, QueryKey, SidebarQueryKey,
    transport::ApiTransport,
};

/// One page of entities, normalized away from the remote field names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchEntityResult<T> {
    /// The rows of the current page, in remote order.
    pub entity: Vec<T>,
    /// Total pages for the current page size.
    pub page_count: u64,
}

/// The placeholder shown while a key has no data yet: no rows, no pages.
impl<T> Default for FetchEntityResult<T> {
    fn default() -> Self {
        Self {
            entity: Vec::new(),
            page_count: 0,
        }
    }
}

impl<T> FetchEntityResult<T> {
    pub fn new(entity: Vec<T>, page_count: u64) -> Self {
        Self { entity, page_count }
    }

    /// Same as [`Default::default`].
    pub fn placeholder() -> Self {
        Self::default()
    }
}

/// What every entity fetch function resolves to.
pub type FetchOutcome<T> = Result<FetchEntityResult<T>, FetchError>;

/// A list response as the remote API sends it.
#[derive(Debug, Clone, Deserialize)]
pub struct RemotePage<T> {
    pub items: Vec<T>,
    pub pages: u64,
}

impl<T> From<RemotePage<T>> for FetchEntityResult<T> {
    fn from(page: RemotePage<T>) -> Self {
        Self {
            entity: page.items,
            page_count: page.pages,
        }
    }
}

/// A list request ready to send: the path below the API base and the query-string parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ListRequest {
    pub path: String,
    pub query: BTreeMap<String, String>,
}

impl ListRequest {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }
}

/// How one entity type maps onto the remote API.
///
/// ```
/// use entity_query::{EntityEndpoint, EntityQueryProps};
///
/// const HOSTS: EntityEndpoint = EntityEndpoint::new("hosts", "/inbounds/hosts")
///     .nested_under("inbounds")
///     .with_primary_filter("remark", "remark");
///
/// let key = HOSTS.sidebar_query_key(&EntityQueryProps::new(1, 10), Some(7.into()));
/// assert_eq!(HOSTS.list_request(&key).path, "/inbounds/7/hosts");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityEndpoint {
    entity: &'static str,
    collection_path: &'static str,
    parent_collection: Option<&'static str>,
    primary_filter_field: &'static str,
    primary_filter_param: &'static str,
}

impl EntityEndpoint {
    /// `entity` is both the key name and the child collection name in nested paths.
    /// The primary filter defaults to a `name` filter sent as `name`.
    pub const fn new(entity: &'static str, collection_path: &'static str) -> Self {
        Self {
            entity,
            collection_path,
            parent_collection: None,
            primary_filter_field: "name",
            primary_filter_param: "name",
        }
    }

    /// Lists of this entity can be scoped to one parent: `/{parent}/{id}/{entity}`.
    pub const fn nested_under(mut self, parent_collection: &'static str) -> Self {
        self.parent_collection = Some(parent_collection);
        self
    }

    /// Which filter is primary, and the query parameter its value is sent as.
    pub const fn with_primary_filter(mut self, field: &'static str, param: &'static str) -> Self {
        self.primary_filter_field = field;
        self.primary_filter_param = param;
        self
    }

    pub const fn entity(&self) -> &'static str {
        self.entity
    }

    pub const fn collection_path(&self) -> &'static str {
        self.collection_path
    }

    pub const fn parent_collection(&self) -> Option<&'static str> {
        self.parent_collection
    }

    pub const fn primary_filter_field(&self) -> &'static str {
        self.primary_filter_field
    }

    /// Scoped path when nested and given a parent id, the collection path otherwise.
    pub fn path_for(&self, parent_id: Option<&EntityId>) -> String {
        match (self.parent_collection, parent_id) {
            (Some(parent), Some(parent_id)) => format!("/{parent}/{parent_id}/{}", self.entity),
            _ => self.collection_path.to_string(),
        }
    }

    pub fn query_key(&self, props: &EntityQueryProps) -> EntityQueryKey {
        props.query_key(self.entity, self.primary_filter_field)
    }

    /// Only meaningful for nested endpoints; the parent name falls back to the entity's own name otherwise.
    pub fn sidebar_query_key(
        &self,
        props: &EntityQueryProps,
        parent_id: Option<EntityId>,
    ) -> SidebarQueryKey {
        props.sidebar_query_key(
            self.parent_collection.unwrap_or(self.entity),
            parent_id,
            self.entity,
            self.primary_filter_field,
        )
    }

    /// Translate a key into the remote request.
    ///
    /// Parameters are merged in order, later ones winning on a name clash:
    /// `page`/`size`, then every filter, then the primary filter under its remote name
    /// (skipped when empty), then `descending` and `order_by`.
    ///
    /// The remote treats an empty filter as no filter, and [`crate::Filters`] drops empty values, so an
    /// empty primary filter is not sent: a cleared search box then shares its key and its request
    /// with one that was never typed in.
    pub fn list_request<K: QueryKey>(&self, key: &K) -> ListRequest {
        let pagination = key.pagination();
        let mut query = BTreeMap::new();
        query.insert("page".to_string(), pagination.page.to_string());
        query.insert("size".to_string(), pagination.size.to_string());
        for (field, value) in key.filters().iter() {
            query.insert(field.to_string(), value.to_string());
        }
        if !key.primary_filter().is_empty() {
            query.insert(
                self.primary_filter_param.to_string(),
                key.primary_filter().to_string(),
            );
        }
        let sort = key.sort();
        query.insert("descending".to_string(), sort.desc.to_string());
        query.insert("order_by".to_string(), sort.sort_by.clone());

        ListRequest {
            path: self.path_for(key.parent().and_then(|(_, parent_id)| parent_id)),
            query,
        }
    }
}

/// The generic entity fetch: build the request from the key, send it, normalize the page.
pub async fn fetch_entities<T, K, A>(
    transport: &A,
    endpoint: &EntityEndpoint,
    key: &K,
) -> FetchOutcome<T>
where
    T: DeserializeOwned,
    K: QueryKey,
    A: ApiTransport,
{
    let request = endpoint.list_request(key);
    tracing::debug!(
        entity = endpoint.entity(),
        path = %request.path,
        "Fetching entity page"
    );
    let body = transport.get(&request).await?;
    let page: RemotePage<T> = serde_json::from_value(body)?;
    Ok(page.into())
}
