use std::time::Duration;

pub(crate) const DEFAULT_STALE_TIME: Duration = Duration::from_secs(10);
pub(crate) const DEFAULT_GC_TIME: Duration = Duration::from_secs(300);

/// Cache timings for [`crate::EntityQueryClient`] and individual [`crate::EntityScope`]s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions {
    stale_time: Option<Duration>,
    gc_time: Option<Duration>,
}

impl QueryOptions {
    /// Create new [`QueryOptions`] with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set how long a fetched page is served from the cache before the next access refetches it.
    ///
    /// To never mark as stale, set [`std::time::Duration::MAX`].
    /// Clamped to the gc time when that is shorter.
    ///
    /// Default: `10 seconds`
    pub fn set_stale_time(mut self, stale_time: Duration) -> Self {
        if let Some(gc_time) = self.gc_time {
            if stale_time > gc_time {
                self.stale_time = Some(gc_time);
                return self;
            }
        }
        self.stale_time = Some(stale_time);
        self
    }

    /// Set how long a page may go unread before [`crate::EntityQueryClient::collect_garbage`] drops it.
    ///
    /// Default: `5 minutes`
    pub fn set_gc_time(mut self, gc_time: Duration) -> Self {
        if let Some(stale_time) = self.stale_time {
            if stale_time > gc_time {
                self.stale_time = Some(gc_time);
            }
        }
        self.gc_time = Some(gc_time);
        self
    }

    pub fn stale_time(&self) -> Duration {
        self.stale_time.unwrap_or(DEFAULT_STALE_TIME)
    }

    pub fn gc_time(&self) -> Duration {
        self.gc_time.unwrap_or(DEFAULT_GC_TIME)
    }
}

/// Scope options take precedence over the client's, field by field.
pub(crate) fn options_combine(base: QueryOptions, scope: Option<QueryOptions>) -> QueryOptions {
    if let Some(scope) = scope {
        QueryOptions {
            stale_time: scope.stale_time.or(base.stale_time),
            gc_time: scope.gc_time.or(base.gc_time),
        }
    } else {
        base
    }
}
