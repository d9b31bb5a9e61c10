use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::marker::PhantomData;
use std::ops::Drop;

use tokio::sync::{mpsc, oneshot};
use tracing_futures::Instrument;

use crate::{
    batch_function::BatchFunction,
    cache::NoCache,
    distributor::LoadOutcome,
    error::LoadError,
    loader_op::{LoadRequest, LoaderOp},
    loader_worker::LoaderWorker,
    options::LoaderOptions,
};

/// Batch loads values from some expensive resource, primarily intended for mitigating GraphQL's
/// N+1 problem.
///
/// Users can call [`Loader::load`] and [`Loader::load_many`] to fetch values from the underlying
/// resource or cache. The cache can be cleared with calls to [`Loader::clear`],
/// [`Loader::clear_many`] and [`Loader::clear_all`], and values can be added to the cache
/// out-of-band through the use of [`Loader::prime`] and [`Loader::prime_many`].
///
/// The `Loader` struct acts as an intermediary between the async domain in which `load` calls are
/// invoked and the pseudo-single-threaded domain of the `LoaderWorker`. Callers can invoke the
/// `Loader` from multiple parallel tasks, and the loader will enqueue the requested operations on
/// the request queue for processing by its `LoaderWorker`. The worker processes the requests
/// sequentially and provides results via response oneshot channels back to the Loader.
///
/// A batch holds every op queued before the worker wakes up. On a `current_thread` runtime (or
/// inside a `LocalSet`) that is every `load` issued in the same poll. On a multi-thread runtime
/// the worker may wake between two sends, so loads issued together can land in separate
/// batches.
///
/// `CK` is the cache-key type, see [`LoaderOptions::cache_key`].
pub struct Loader<K, V, E, CK = K> {
    request_tx: mpsc::UnboundedSender<LoaderOp<K, V, E>>,
    load_task_handle: tokio::task::JoinHandle<()>,
    cache_enabled: bool,
    _cache_key: PhantomData<fn() -> CK>,
}

impl<K, V, E, CK> Drop for Loader<K, V, E, CK> {
    fn drop(&mut self) {
        self.load_task_handle.abort();
    }
}

impl<K, V, E> Loader<K, V, E, K>
where
    K: 'static + Clone + Debug + Eq + Hash + Send + Sync,
    V: 'static + Clone + Send,
    E: 'static + Clone + Debug + Send,
{
    /// Creates a new Loader for the provided BatchFunction and context, with default options.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<F>(batch_fn: F, context: F::Context) -> Self
    where
        F: 'static + BatchFunction<K, V, Error = E>,
        F::Context: 'static,
    {
        Self::with_options(batch_fn, context, LoaderOptions::new())
    }
}

impl<K, V, E, CK> Loader<K, V, E, CK>
where
    K: 'static + Clone + Debug + Send + Sync,
    V: 'static + Clone + Send,
    E: 'static + Clone + Debug + Send,
    CK: 'static + Clone + Eq + Hash + Send,
{
    /// Creates a new Loader with explicit options.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_options<F>(batch_fn: F, context: F::Context, options: LoaderOptions<K, CK>) -> Self
    where
        F: 'static + BatchFunction<K, V, Error = E>,
        F::Context: 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let LoaderOptions { cache, cache_key, max_batch_size, name } = options;
        let debug_name = name.unwrap_or_else(std::any::type_name::<(K, V)>);
        let span = tracing::trace_span!("LoaderWorker", loader = debug_name);

        let load_task_handle = if cache {
            tokio::task::spawn(
                LoaderWorker::new(
                    batch_fn,
                    context,
                    HashMap::<CK, Result<V, E>>::new(),
                    cache_key,
                    max_batch_size,
                    rx,
                    debug_name,
                )
                .start()
                .instrument(span),
            )
        } else {
            tokio::task::spawn(
                LoaderWorker::new(
                    batch_fn,
                    context,
                    NoCache::<CK, Result<V, E>>::default(),
                    cache_key,
                    max_batch_size,
                    rx,
                    debug_name,
                )
                .start()
                .instrument(span),
            )
        };

        Self { request_tx: tx, load_task_handle, cache_enabled: cache, _cache_key: PhantomData }
    }
}

impl<K, V, E, CK> Loader<K, V, E, CK> {
    /// Loads a value from the underlying resource.
    ///
    /// If the value is already in the loader cache, it is returned as soon as it is processed.
    /// Otherwise, the requested key is enqueued for batch loading in the next loader execution
    /// frame, sharing a slot with any other request for the same cache-key.
    pub async fn load(&self, key: K) -> LoadOutcome<V, E> {
        let (response_tx, response_rx) = oneshot::channel();
        self.request_tx
            .send(LoaderOp::Load(LoadRequest::One(key, response_tx)))
            .map_err(|_| LoadError::Closed)?;
        response_rx.await.map_err(|_| LoadError::Closed)?
    }

    /// Loads many values at once.
    ///
    /// Every position settles on its own: a failed key does not fail its siblings. If all the
    /// values are already present in the loader cache, they are returned as soon as the request
    /// is processed by the worker. Otherwise, the keys are enqueued for batch loading in the next
    /// loader execution frame.
    pub async fn load_many(&self, keys: Vec<K>) -> Vec<LoadOutcome<V, E>> {
        let key_count = keys.len();
        let closed = || -> Vec<LoadOutcome<V, E>> {
            (0..key_count).map(|_| Err(LoadError::Closed)).collect()
        };
        let (response_tx, response_rx) = oneshot::channel();
        if self.request_tx.send(LoaderOp::Load(LoadRequest::Many(keys, response_tx))).is_err() {
            return closed();
        }
        response_rx.await.unwrap_or_else(|_| closed())
    }

    /// Adds a value to the cache, unless the key is already cached.
    pub fn prime(&self, key: K, value: V) {
        self.send(LoaderOp::Prime(key, value));
    }

    /// Adds many values to the cache at once.
    pub fn prime_many(&self, key_vals: Vec<(K, V)>) {
        self.send(LoaderOp::PrimeMany(key_vals));
    }

    /// Removes a value from the cache.
    ///
    /// This key will be reloaded when it is next requested.
    pub fn clear(&self, key: K) {
        self.send(LoaderOp::Clear(key));
    }

    /// Removes multiple values from the cache at once.
    ///
    /// These keys will be reloaded when requested.
    pub fn clear_many(&self, keys: Vec<K>) {
        self.send(LoaderOp::ClearMany(keys));
    }

    pub fn clear_all(&self) {
        self.send(LoaderOp::ClearAll);
    }

    pub fn is_cache_enabled(&self) -> bool {
        self.cache_enabled
    }

    fn send(&self, op: LoaderOp<K, V, E>) {
        if self.request_tx.send(op).is_err() {
            tracing::debug!("loader worker has shut down; dropping cache operation");
        }
    }
}
