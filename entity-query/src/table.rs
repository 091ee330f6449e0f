use crate::{
    EntityEndpoint, EntityQueryKey, EntityQueryProps, FetchEntityResult, FetchError, FetchOutcome,
    Filters, Pagination, Sort,
};

/// User-adjusted pagination, sort and filters of one entity table.
///
/// Every change that would show a different set of rows moves back to the first page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityTableState {
    pagination: Pagination,
    sort: Sort,
    filters: Filters,
}

impl Default for EntityTableState {
    fn default() -> Self {
        Self::new(10)
    }
}

impl EntityTableState {
    pub fn new(page_size: u32) -> Self {
        Self {
            pagination: Pagination::new(1, page_size),
            sort: Sort::default(),
            filters: Filters::new(),
        }
    }

    pub fn pagination(&self) -> Pagination {
        self.pagination
    }

    pub fn sort(&self) -> &Sort {
        &self.sort
    }

    pub fn filters(&self) -> &Filters {
        &self.filters
    }

    pub fn set_page(&mut self, page: u32) {
        self.pagination = Pagination::new(page, self.pagination.size);
    }

    pub fn set_page_size(&mut self, size: u32) {
        self.pagination = Pagination::new(1, size);
    }

    pub fn set_sort(&mut self, sort: Sort) {
        if sort != self.sort {
            self.sort = sort;
            self.set_page(1);
        }
    }

    /// Set or clear (`None` or `""`) one filter.
    pub fn set_filter(&mut self, field: impl Into<String>, value: Option<impl Into<String>>) {
        let before = self.filters.clone();
        self.filters.insert(field, value);
        if self.filters != before {
            self.set_page(1);
        }
    }

    /// Pull the page back into range after a result reported fewer pages, e.g. rows were deleted.
    pub fn clamp_page(&mut self, page_count: u64) {
        let last = u32::try_from(page_count).unwrap_or(u32::MAX).max(1);
        if self.pagination.page > last {
            self.set_page(last);
        }
    }

    pub fn props(&self) -> EntityQueryProps {
        EntityQueryProps {
            page: self.pagination.page,
            size: self.pagination.size,
            sort_by: Some(self.sort.sort_by.clone()),
            desc: Some(self.sort.desc),
            filters: Some(self.filters.clone()),
        }
    }

    pub fn query_key(&self, endpoint: &EntityEndpoint) -> EntityQueryKey {
        endpoint.query_key(&self.props())
    }
}

/// Keeps the result of the most recently requested key only.
///
/// For consumers outside the reactive layer: a result is accepted only when it was fetched
/// for the key requested last, so a slow response for an abandoned key cannot overwrite newer state.
#[derive(Debug, Clone)]
pub struct LatestResult<K, T> {
    requested: Option<K>,
    current: Option<FetchOutcome<T>>,
}

impl<K, T> Default for LatestResult<K, T> {
    fn default() -> Self {
        Self {
            requested: None,
            current: None,
        }
    }
}

impl<K: PartialEq, T: Clone> LatestResult<K, T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `key` as the one whose result is wanted. The previous result is kept until it lands.
    pub fn request(&mut self, key: K) {
        self.requested = Some(key);
    }

    pub fn requested(&self) -> Option<&K> {
        self.requested.as_ref()
    }

    /// Returns `false`, dropping the outcome, when `key` is not the latest requested key.
    pub fn accept(&mut self, key: &K, outcome: FetchOutcome<T>) -> bool {
        if self.requested.as_ref() != Some(key) {
            tracing::trace!("Discarding result for a superseded key");
            return false;
        }
        self.current = Some(outcome);
        true
    }

    /// The last accepted page, or the placeholder when none was accepted or it failed.
    pub fn current(&self) -> FetchEntityResult<T> {
        match &self.current {
            Some(Ok(page)) => page.clone(),
            _ => FetchEntityResult::placeholder(),
        }
    }

    pub fn error(&self) -> Option<&FetchError> {
        match &self.current {
            Some(Err(error)) => Some(error),
            _ => None,
        }
    }
}
