use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

/// What a `BatchFunction` produces for one batch: either an outright failure for the whole batch,
/// or one outcome per key, in the same order as the keys it was given.
pub type BatchResult<V, E> = Result<Vec<Result<V, E>>, E>;

/// A `BatchFunction` defines the method through which some `Loader` may fetch batched data from
/// some resource. The `BatchFunction` receives the distinct keys that have been requested during
/// the `Loader`'s most recent execution frame, in first-request order, and the context the
/// `Loader` was created with (typically the request context).
///
/// Like the reference facebook dataloader, the returned list must line up with the keys: the
/// outcome at position `i` belongs to `keys[i]`. An `Err` at a position fails only the requesters
/// of that key. Returning `Err` for the whole call fails every key of the batch. A list of the
/// wrong length is reported as [`LoadError::LengthMismatch`](crate::LoadError::LengthMismatch) to
/// every key of the batch.
///
/// Use [`Grouped`](crate::Grouped) or [`Sorted`](crate::Sorted) when the resource returns values
/// in its own order.
#[async_trait]
pub trait BatchFunction<K, V>: Send + Sync
where
    K: Send + Sync,
{
    type Context: Send + Sync;
    type Error;

    async fn load(&self, keys: &[K], context: &Self::Context) -> BatchResult<V, Self::Error>;
}

#[async_trait]
impl<K, V, T> BatchFunction<K, V> for Arc<T>
where
    K: Send + Sync,
    T: BatchFunction<K, V> + ?Sized,
{
    type Context = T::Context;
    type Error = T::Error;

    async fn load(&self, keys: &[K], context: &Self::Context) -> BatchResult<V, Self::Error> {
        (**self).load(keys, context).await
    }
}

/// Adapts an async closure `(keys, context) -> BatchResult` into a `BatchFunction`.
///
/// The closure receives an owned copy of the keys and a clone of the context, so the returned
/// future does not borrow from the loader.
pub struct LoadFn<F, C> {
    f: F,
    _context: PhantomData<fn(C)>,
}

/// Wraps `f` as a `BatchFunction` whose context is `C`.
pub fn load_fn<F, C>(f: F) -> LoadFn<F, C> {
    LoadFn { f, _context: PhantomData }
}

#[async_trait]
impl<K, V, E, C, F, Fut> BatchFunction<K, V> for LoadFn<F, C>
where
    K: Clone + Send + Sync + 'static,
    V: Send + 'static,
    E: Send + 'static,
    C: Clone + Send + Sync + 'static,
    F: Fn(Vec<K>, C) -> Fut + Send + Sync,
    Fut: Future<Output = BatchResult<V, E>> + Send,
{
    type Context = C;
    type Error = E;

    async fn load(&self, keys: &[K], context: &C) -> BatchResult<V, E> {
        (self.f)(keys.to_vec(), context.clone()).await
    }
}
