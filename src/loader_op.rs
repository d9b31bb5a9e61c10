use std::slice;

use tokio::sync::oneshot;

use crate::distributor::LoadOutcome;

/// Set of possible requests that can be sent to the [`LoaderWorker`](crate::loader_worker::LoaderWorker)
///
/// The three categories of commands are Load, Prime, and Clear; each of which has a single and
/// many variant for convenience.
#[derive(Debug)]
pub enum LoaderOp<K, V, E> {
    /// Fetch data from the resource wrapped by this data loader (or the cache).
    Load(LoadRequest<K, V, E>),
    /// Add values to the cache that were fetched from elsewhere.
    Prime(K, V),
    PrimeMany(Vec<(K, V)>),
    /// Remove values from the cache so that they will be reloaded when they are next requested.
    Clear(K),
    ClearMany(Vec<K>),
    ClearAll,
}

#[derive(Debug)]
pub enum LoadRequest<K, V, E> {
    One(K, oneshot::Sender<LoadOutcome<V, E>>),
    Many(Vec<K>, oneshot::Sender<Vec<LoadOutcome<V, E>>>),
}

impl<K, V, E> LoadRequest<K, V, E> {
    pub fn keys(&self) -> &[K] {
        match self {
            LoadRequest::One(ref key, _) => slice::from_ref(key),
            LoadRequest::Many(ref keys, _) => keys,
        }
    }

    /// Sends one outcome per requested key, in key order.
    pub fn send_response<I>(self, outcomes: I)
    where
        I: IntoIterator<Item = LoadOutcome<V, E>>,
    {
        let delivered = match self {
            LoadRequest::One(_, response_tx) => match outcomes.into_iter().next() {
                Some(outcome) => response_tx.send(outcome).is_ok(),
                None => {
                    tracing::error!("no outcome produced for single key request");
                    false
                }
            },
            LoadRequest::Many(_, response_tx) => {
                response_tx.send(outcomes.into_iter().collect()).is_ok()
            }
        };
        if !delivered {
            tracing::debug!("receiver dropped");
        }
    }
}
