use std::{collections::BTreeMap, fmt, hash::Hash};

use serde::{Deserialize, Serialize};

/// The field lists are sorted by when no explicit sort is requested.
pub const DEFAULT_SORT_BY: &str = "created_at";

/// Identifier of an entity row, the remote API uses both numeric and string ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    /// A numeric id, e.g. `7`.
    Int(i64),
    /// A string id.
    Str(String),
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Int(id) => write!(f, "{id}"),
            EntityId::Str(id) => f.write_str(id),
        }
    }
}

impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        EntityId::Int(id)
    }
}

impl From<i32> for EntityId {
    fn from(id: i32) -> Self {
        EntityId::Int(id.into())
    }
}

impl From<u32> for EntityId {
    fn from(id: u32) -> Self {
        EntityId::Int(id.into())
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        EntityId::Str(id.to_string())
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        EntityId::Str(id)
    }
}

/// One page of a list: 1-based page number and page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pagination {
    /// Page number, starting from 1.
    pub page: u32,
    /// Maximum rows per page, always > 0.
    pub size: u32,
}

impl Pagination {
    /// Zero pages and zero sizes are raised to 1.
    pub fn new(page: u32, size: u32) -> Self {
        Self {
            page: page.max(1),
            size: size.max(1),
        }
    }
}

/// The field a list is ordered by, and the direction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sort {
    /// Field name, sent to the remote as `order_by`.
    pub sort_by: String,
    /// Sent to the remote as `descending`.
    pub desc: bool,
}

impl Default for Sort {
    fn default() -> Self {
        Self {
            sort_by: DEFAULT_SORT_BY.to_string(),
            desc: false,
        }
    }
}

impl Sort {
    /// Create a new [`Sort`].
    pub fn new(sort_by: impl Into<String>, desc: bool) -> Self {
        Self {
            sort_by: sort_by.into(),
            desc,
        }
    }
}

/// Field name to filter value.
///
/// Absent values are never stored: inserting `None` or an empty string removes the field,
/// so a cleared search box and a never-touched one produce the same key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filters(BTreeMap<String, String>);

impl Filters {
    /// An empty filter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or clear a filter, returns the previous value.
    pub fn insert(
        &mut self,
        field: impl Into<String>,
        value: Option<impl Into<String>>,
    ) -> Option<String> {
        let field = field.into();
        match value.map(Into::into) {
            Some(value) if !value.is_empty() => self.0.insert(field, value),
            _ => self.0.remove(&field),
        }
    }

    /// Builder form of [`Filters::insert`].
    pub fn with(mut self, field: impl Into<String>, value: Option<impl Into<String>>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(field, value)| (field.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<F, V> FromIterator<(F, Option<V>)> for Filters
where
    F: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (F, Option<V>)>>(iter: I) -> Self {
        let mut filters = Filters::new();
        for (field, value) in iter {
            filters.insert(field, value);
        }
        filters
    }
}

/// The user-adjustable state of one list query.
///
/// `page` and `size` are always present, the rest fall back to
/// [`DEFAULT_SORT_BY`], ascending order, and no filters.
///
/// ```
/// use entity_query::{EntityQueryProps, Filters};
///
/// let props = EntityQueryProps::new(1, 10)
///     .with_sort_by("username")
///     .with_filters(Filters::new().with("username", Some("alice")));
/// let key = props.query_key("users", "username");
/// assert_eq!(key.primary_filter, "alice");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityQueryProps {
    pub page: u32,
    pub size: u32,
    pub sort_by: Option<String>,
    pub desc: Option<bool>,
    pub filters: Option<Filters>,
}

impl EntityQueryProps {
    /// Props for one page with every optional part defaulted.
    pub fn new(page: u32, size: u32) -> Self {
        Self {
            page,
            size,
            ..Default::default()
        }
    }

    pub fn with_sort_by(mut self, sort_by: impl Into<String>) -> Self {
        self.sort_by = Some(sort_by.into());
        self
    }

    pub fn with_desc(mut self, desc: bool) -> Self {
        self.desc = Some(desc);
        self
    }

    pub fn with_filters(mut self, filters: Filters) -> Self {
        self.filters = Some(filters);
        self
    }

    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.page, self.size)
    }

    /// The sort with defaults applied.
    pub fn sort(&self) -> Sort {
        Sort {
            sort_by: self
                .sort_by
                .clone()
                .unwrap_or_else(|| DEFAULT_SORT_BY.to_string()),
            desc: self.desc.unwrap_or(false),
        }
    }

    /// The filters with defaults applied.
    pub fn filters(&self) -> Filters {
        self.filters.clone().unwrap_or_default()
    }

    /// Build the key for a top-level entity list.
    ///
    /// `primary_filter_field` names the filter whose value is surfaced as the key's primary filter,
    /// `""` when that filter is not set.
    pub fn query_key(
        &self,
        entity: impl Into<String>,
        primary_filter_field: &str,
    ) -> EntityQueryKey {
        let filters = self.filters();
        EntityQueryKey {
            entity: entity.into(),
            pagination: self.pagination(),
            primary_filter: filters.get(primary_filter_field).unwrap_or_default().to_string(),
            sort: self.sort(),
            filters,
        }
    }

    /// Build the key for an entity list nested under a parent entity, e.g. hosts of an inbound.
    ///
    /// A `None` parent id still produces a scoped key, it lists the entity across all parents.
    pub fn sidebar_query_key(
        &self,
        parent_entity: impl Into<String>,
        parent_id: Option<EntityId>,
        entity: impl Into<String>,
        primary_filter_field: &str,
    ) -> SidebarQueryKey {
        SidebarQueryKey {
            parent_entity: parent_entity.into(),
            parent_id,
            key: self.query_key(entity, primary_filter_field),
        }
    }
}

/// Read access to the fixed parts of a query key, shared by [`EntityQueryKey`] and [`SidebarQueryKey`].
///
/// Fetch functions read everything they send from here, never from surrounding state,
/// so equal keys always produce equal requests.
pub trait QueryKey: Clone + Eq + Hash + fmt::Debug + Serialize {
    fn entity(&self) -> &str;

    fn pagination(&self) -> Pagination;

    fn primary_filter(&self) -> &str;

    fn sort(&self) -> &Sort;

    fn filters(&self) -> &Filters;

    /// The parent entity name and id, for keys scoped under a parent.
    fn parent(&self) -> Option<(&str, Option<&EntityId>)> {
        None
    }

    /// The hierarchical path used for prefix invalidation: `[entity]`, or
    /// `[parent_entity, parent_id, entity]` for scoped keys (empty segment for no parent id).
    fn prefix_path(&self) -> Vec<String> {
        match self.parent() {
            Some((parent_entity, parent_id)) => vec![
                parent_entity.to_string(),
                parent_id.map(ToString::to_string).unwrap_or_default(),
                self.entity().to_string(),
            ],
            None => vec![self.entity().to_string()],
        }
    }

    /// Stable serialized form, equal exactly when the keys are equal.
    fn fingerprint(&self) -> String {
        serde_json::to_string(self).expect("query keys only hold strings and integers (bug)")
    }
}

/// The identity of one page of one entity list under one set of filters and sort.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityQueryKey {
    pub entity: String,
    pub pagination: Pagination,
    /// Duplicates one entry of `filters`, kept so a change in the main search term is visible without walking the filters.
    ///
    /// Empty when that filter is absent. [`Filters`] never holds empty values, so an empty search
    /// term and no search term are the same key.
    pub primary_filter: String,
    pub sort: Sort,
    pub filters: Filters,
}

impl QueryKey for EntityQueryKey {
    fn entity(&self) -> &str {
        &self.entity
    }

    fn pagination(&self) -> Pagination {
        self.pagination
    }

    fn primary_filter(&self) -> &str {
        &self.primary_filter
    }

    fn sort(&self) -> &Sort {
        &self.sort
    }

    fn filters(&self) -> &Filters {
        &self.filters
    }
}

/// An [`EntityQueryKey`] scoped under a parent entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SidebarQueryKey {
    pub parent_entity: String,
    pub parent_id: Option<EntityId>,
    #[serde(flatten)]
    pub key: EntityQueryKey,
}

impl QueryKey for SidebarQueryKey {
    fn entity(&self) -> &str {
        &self.key.entity
    }

    fn pagination(&self) -> Pagination {
        self.key.pagination
    }

    fn primary_filter(&self) -> &str {
        &self.key.primary_filter
    }

    fn sort(&self) -> &Sort {
        &self.key.sort
    }

    fn filters(&self) -> &Filters {
        &self.key.filters
    }

    fn parent(&self) -> Option<(&str, Option<&EntityId>)> {
        Some((&self.parent_entity, self.parent_id.as_ref()))
    }
}
