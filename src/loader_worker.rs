use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::slice;

use futures::future::{self, FutureExt};
use tokio::sync::mpsc;

use crate::{
    batch_function::BatchFunction,
    cache::Cache,
    distributor::{self, LoadOutcome},
    error::LoadError,
    loader_op::{LoadRequest, LoaderOp},
    options::CacheKeyFn,
};
#[cfg(feature = "stats")]
use crate::worker_stats::WorkerStats;

/// Where a requested key's outcome will come from.
enum Slot<V, E> {
    /// Settled from the cache when the request arrived.
    Ready(LoadOutcome<V, E>),
    /// Index of the key in the staged batch.
    Staged(usize),
}

struct PendingRequest<K, V, E> {
    request: LoadRequest<K, V, E>,
    slots: Vec<Slot<V, E>>,
}

/// A `LoaderWorker` is the "single-thread" worker task that actually does the loading work.
///
/// Once started, it runs in a loop until the parent Loader aborts it's `JoinHandle` or drops the
/// request queue tx channel.
///
/// The worker can be in one of three states during its lifetime:
///
/// 1. Waiting for requests
/// 2. Flushing the request queue and staging keys for loading.
/// 3. Executing its load batch function.
///
/// One cycle through this loop may be called an "execution frame".
///
/// In state (1), the worker awaits any messages on the request queue channel, idling until work
/// arrives.
///
/// In state (2), the worker synchronously pulls requests from the queue until there are no more
/// pending requests. Prime and Clear requests are resolved immediately against the cache. For
/// Load requests, every key is mapped to its cache-key. Keys with a cached outcome settle from
/// the cache; the rest are staged, at most once per cache-key, in first-request order. A request
/// whose keys are all cached is answered on the spot.
///
/// In state (3), the worker invokes its `BatchFunction` with the staged keys (split into chunks
/// when a max batch size is configured). The outcomes are distributed positionally, per-key
/// outcomes are cached, and every outstanding Load request is answered. Requests that arrive
/// while the batch function runs are left in the queue and form the next frame.
///
/// The drain in state (2) only sees ops already queued, so a frame matches "one tick" of the
/// callers only on a `current_thread` runtime or `LocalSet`.
pub struct LoaderWorker<K, V, CK, F, CacheT>
where
    K: Send + Sync,
    F: BatchFunction<K, V>,
{
    batch_fn: F,
    context: F::Context,
    cache: CacheT,
    cache_key: CacheKeyFn<K, CK>,
    max_batch_size: Option<usize>,
    request_rx: mpsc::UnboundedReceiver<LoaderOp<K, V, F::Error>>,
    /// Distinct keys for the next batch, paired with their cache-keys.
    keys_to_load: Vec<(K, CK)>,
    staged: HashMap<CK, usize>,
    pending_requests: Vec<PendingRequest<K, V, F::Error>>,
    debug_name: &'static str,
    #[cfg(feature = "stats")]
    stats: WorkerStats,
}

impl<K, V, CK, F, CacheT> LoaderWorker<K, V, CK, F, CacheT>
where
    K: 'static + Clone + Debug + Send + Sync,
    V: 'static + Clone + Send,
    CK: 'static + Clone + Eq + Hash + Send,
    F: 'static + BatchFunction<K, V>,
    F::Error: Clone + Debug + Send,
    CacheT: Cache<K = CK, V = Result<V, F::Error>>,
{
    pub fn new(
        batch_fn: F,
        context: F::Context,
        cache: CacheT,
        cache_key: CacheKeyFn<K, CK>,
        max_batch_size: Option<usize>,
        request_rx: mpsc::UnboundedReceiver<LoaderOp<K, V, F::Error>>,
        debug_name: &'static str,
    ) -> Self {
        Self {
            batch_fn,
            context,
            cache,
            cache_key,
            max_batch_size,
            request_rx,
            keys_to_load: Vec::new(),
            staged: HashMap::new(),
            pending_requests: Vec::new(),
            debug_name,
            #[cfg(feature = "stats")]
            stats: WorkerStats::new(debug_name),
        }
    }

    pub async fn start(mut self) {
        loop {
            // Async await until we receive the first op.
            match self.request_rx.recv().await {
                None => {
                    tracing::debug!(
                        loader = self.debug_name,
                        "Tx channel closed. Terminating LoaderWorker."
                    );
                    return;
                }
                Some(op) => self.mux_op(op),
            }
            // Flush remainder of the op queue before executing load.
            while let Some(Some(op)) = self.request_rx.recv().now_or_never() {
                self.mux_op(op);
            }
            if !self.pending_requests.is_empty() {
                self.execute_load().await;
            }
        }
    }

    #[tracing::instrument(level = "trace", skip_all)]
    fn mux_op(&mut self, op: LoaderOp<K, V, F::Error>) {
        match op {
            LoaderOp::Load(request) => self.stage_request(request),
            LoaderOp::Prime(key, value) => self.prime(slice::from_ref(&key), Some(value)),
            LoaderOp::PrimeMany(key_vals) => {
                for (key, value) in key_vals {
                    self.prime(slice::from_ref(&key), Some(value));
                }
            }
            LoaderOp::Clear(key) => self.prime(slice::from_ref(&key), None),
            LoaderOp::ClearMany(keys) => self.prime(&keys, None),
            LoaderOp::ClearAll => self.cache.flush(),
        }
    }

    /// Inserts `value` under each key's cache-key, or removes the keys when `value` is `None`.
    fn prime(&mut self, keys: &[K], value: Option<V>) {
        let cache_keys = keys.iter().map(|key| (self.cache_key)(key)).collect::<Vec<_>>();
        match value {
            Some(value) => {
                for cache_key in cache_keys {
                    self.cache.insert_if_absent(cache_key, Ok(value.clone()));
                }
            }
            None => self.cache.remove(&cache_keys),
        }
    }

    fn stage_request(&mut self, request: LoadRequest<K, V, F::Error>) {
        let mut slots = Vec::with_capacity(request.keys().len());
        let mut newly_staged = Vec::new();
        for key in request.keys() {
            let cache_key = (self.cache_key)(key);
            if let Some(settled) = self.cache.get(&cache_key) {
                slots.push(Slot::Ready(settled.clone().map_err(LoadError::Key)));
                continue;
            }
            let index = match self.staged.get(&cache_key) {
                Some(index) => *index,
                None => {
                    let index = self.keys_to_load.len();
                    self.staged.insert(cache_key.clone(), index);
                    self.keys_to_load.push((key.clone(), cache_key));
                    newly_staged.push(key);
                    index
                }
            };
            slots.push(Slot::Staged(index));
        }
        tracing::debug!(requested_keys = ?request.keys(), keys_to_load = ?newly_staged);

        #[cfg(feature = "stats")]
        {
            let hits = slots.iter().filter(|slot| matches!(slot, Slot::Ready(_))).count();
            self.stats.record_load_request(slots.len() as u32);
            self.stats.record_cache_hits(hits as u32);
        }

        if slots.iter().all(|slot| matches!(slot, Slot::Ready(_))) {
            request.send_response(slots.into_iter().filter_map(|slot| match slot {
                Slot::Ready(outcome) => Some(outcome),
                Slot::Staged(_) => None,
            }));
        } else {
            self.pending_requests.push(PendingRequest { request, slots });
        }
    }

    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(loader = self.debug_name, batch_size = self.keys_to_load.len())
    )]
    async fn execute_load(&mut self) {
        self.staged.clear();
        let (keys, cache_keys): (Vec<K>, Vec<CK>) = self.keys_to_load.drain(..).unzip();

        #[cfg(feature = "stats")]
        self.stats.record_load_exec(
            self.pending_requests
                .iter()
                .flat_map(|pending| &pending.slots)
                .filter(|slot| matches!(slot, Slot::Staged(_)))
                .count() as u32,
        );

        let outcomes = dispatch(&self.batch_fn, &self.context, &keys, self.max_batch_size).await;

        for (cache_key, outcome) in cache_keys.into_iter().zip(&outcomes) {
            match outcome {
                Ok(value) => self.cache.insert(cache_key, Ok(value.clone())),
                Err(LoadError::Key(error)) => self.cache.insert(cache_key, Err(error.clone())),
                // Whole-batch failures are not remembered; the next load retries.
                Err(_) => {}
            }
        }

        #[cfg(feature = "stats")]
        self.stats.record_load_exec_completed(
            keys.len() as u32,
            outcomes.iter().filter(|outcome| outcome.is_ok()).count() as u32,
        );

        for PendingRequest { request, slots } in self.pending_requests.drain(..) {
            let values = slots.into_iter().map(|slot| match slot {
                Slot::Ready(outcome) => outcome,
                Slot::Staged(index) => outcomes[index].clone(),
            });
            request.send_response(values);
        }
    }
}

/// Calls the batch function once per chunk of `keys`, concurrently, and concatenates the
/// distributed outcomes so that they line up with `keys`.
async fn dispatch<K, V, F>(
    batch_fn: &F,
    context: &F::Context,
    keys: &[K],
    max_batch_size: Option<usize>,
) -> Vec<LoadOutcome<V, F::Error>>
where
    K: Send + Sync,
    F: BatchFunction<K, V>,
    F::Error: Clone + Debug,
{
    let chunk_size = max_batch_size.unwrap_or(keys.len()).max(1);
    let batches = keys.chunks(chunk_size).map(|chunk| async move {
        distributor::distribute(batch_fn.load(chunk, context).await, chunk.len())
    });
    future::join_all(batches).await.into_iter().flatten().collect()
}
