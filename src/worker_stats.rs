#[derive(Debug)]
pub struct WorkerStats {
    /// Human readable name used to identify this worker stats when it is reported.
    tag: &'static str,
    /// Number of `LoaderOp::Load` that were received by the worker.
    load_requests: u32,
    /// The total number of keys that were requested for loading (not necessarily unique).
    items_requested: u32,
    /// The number of keys that were immediately found in the loader cache.
    cache_hits: u32,
    /// Number of times that this worker executed the `LoaderWorker::execute_load` function.
    loads: u32,
    /// The average number of keys (not-unique) that were fetched during load operations.
    average_batch_size: f32,
    /// The max number of keys (not-unique) that were fetched during a single load.
    max_batch_size: u32,
    /// The min number of keys (not-unique) that were fetched during a single load.
    min_batch_size: u32,

    /// The max number of unique keys fetched during a single load.
    max_batch_unique: u32,
    /// The min number of unique keys fetched during a single load.
    min_batch_unique: u32,
    /// The total number of keys whose outcome was a value rather than an error.
    items_loaded: u32,
}

impl WorkerStats {
    pub fn new(tag: &'static str) -> Self {
        Self {
            tag,
            load_requests: 0,
            items_requested: 0,
            cache_hits: 0,
            loads: 0,
            average_batch_size: 0.0,
            max_batch_size: 0,
            min_batch_size: u32::MAX,
            max_batch_unique: 0,
            min_batch_unique: u32::MAX,
            items_loaded: 0,
        }
    }

    pub fn record_load_request(&mut self, items_requested: u32) {
        self.load_requests += 1;
        self.items_requested += items_requested;
    }

    pub fn record_cache_hits(&mut self, hits: u32) {
        self.cache_hits += hits;
    }

    pub fn record_load_exec(&mut self, batch_size: u32) {
        let new_total_load = self.loads + 1;
        self.average_batch_size = (((self.average_batch_size as f64 * self.loads as f64)
            + batch_size as f64)
            / new_total_load as f64) as f32;
        self.loads = new_total_load;
        self.max_batch_size = self.max_batch_size.max(batch_size);
        self.min_batch_size = self.min_batch_size.min(batch_size);
    }

    pub fn record_load_exec_completed(&mut self, unique_batch_size: u32, loaded_item_count: u32) {
        self.items_loaded += loaded_item_count;
        self.max_batch_unique = self.max_batch_unique.max(unique_batch_size);
        self.min_batch_unique = self.min_batch_unique.min(unique_batch_size);
    }
}

impl Drop for WorkerStats {
    fn drop(&mut self) {
        tracing::debug!(worker = self.tag, worker_stats = ?self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_batch_extrema() {
        let mut stats = WorkerStats::new("test");
        stats.record_load_exec(4);
        stats.record_load_exec(2);
        stats.record_load_exec_completed(3, 3);
        stats.record_load_exec_completed(1, 0);

        assert_eq!(stats.loads, 2);
        assert_eq!(stats.average_batch_size, 3.0);
        assert_eq!((stats.min_batch_size, stats.max_batch_size), (2, 4));
        assert_eq!((stats.min_batch_unique, stats.max_batch_unique), (1, 3));
        assert_eq!(stats.items_loaded, 3);
    }
}
