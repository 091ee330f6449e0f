use std::fmt::Debug;

use crate::{
    QueryOptions,
    utils::{new_gc_id, safe_dt_dur_add},
};

/// One cached page and its bookkeeping.
pub(crate) struct Query<K, V> {
    key: K,
    value: V,
    pub combined_options: QueryOptions,
    updated_at: chrono::DateTime<chrono::Utc>,
    last_read_at: chrono::DateTime<chrono::Utc>,
    prefix_path: Vec<String>,
    invalidated: bool,
    // Identifies the gc timer scheduled for this entry, a replaced entry's timer stops on mismatch.
    gc_id: u64,
}

impl<K, V> Debug for Query<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("updated_at", &self.updated_at)
            .field("invalidated", &self.invalidated)
            .finish()
    }
}

impl<K, V> Query<K, V> {
    pub fn new(key: K, value: V, combined_options: QueryOptions, prefix_path: Vec<String>) -> Self {
        let now = chrono::Utc::now();
        Self {
            key,
            value,
            combined_options,
            updated_at: now,
            last_read_at: now,
            prefix_path,
            invalidated: false,
            gc_id: new_gc_id(),
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn prefix_path(&self) -> &[String] {
        &self.prefix_path
    }

    pub fn gc_id(&self) -> u64 {
        self.gc_id
    }

    /// Written at or after `since`.
    pub fn updated_since(&self, since: chrono::DateTime<chrono::Utc>) -> bool {
        self.updated_at >= since
    }

    /// Replace the value wholesale, the old one is dropped.
    pub fn set_value(&mut self, value: V) {
        self.value = value;
        self.updated_at = chrono::Utc::now();
        self.invalidated = false;
    }

    pub fn mark_read(&mut self) {
        self.last_read_at = chrono::Utc::now();
    }

    pub fn invalidate(&mut self) {
        self.invalidated = true;
    }

    pub fn stale(&self) -> bool {
        self.invalidated
            || chrono::Utc::now()
                > safe_dt_dur_add(self.updated_at, self.combined_options.stale_time())
    }

    /// Unread for longer than the gc time.
    pub fn gc_due(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        now > safe_dt_dur_add(self.last_read_at, self.combined_options.gc_time())
    }
}
