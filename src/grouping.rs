use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::marker::PhantomData;

use async_trait::async_trait;

use crate::batch_function::{BatchFunction, BatchResult};

/// Buckets `values` by `group(value)` and returns one bucket per key, in key order.
///
/// `None` values are skipped, and a key without any value gets an empty bucket, so the output
/// always has exactly one entry per key.
pub fn group_values<K, V, G>(keys: &[K], values: Vec<Option<V>>, group: G) -> Vec<Vec<V>>
where
    K: Eq + Hash,
    V: Clone,
    G: Fn(&V) -> K,
{
    let mut groups: HashMap<K, Vec<V>> = HashMap::new();
    for value in values.into_iter().flatten() {
        groups.entry(group(&value)).or_default().push(value);
    }
    keys.iter().map(|key| groups.get(key).cloned().unwrap_or_default()).collect()
}

/// Matches unordered `values` back to `keys` using `sort(value)`. A key with no matching value
/// gets `None`; when several values sort to the same key the last one wins.
pub fn sort_values<K, V, S>(keys: &[K], values: Vec<V>, sort: S) -> Vec<Option<V>>
where
    K: Eq + Hash,
    V: Clone,
    S: Fn(&V) -> K,
{
    let by_key = values.into_iter().map(|value| (sort(&value), value)).collect::<HashMap<_, _>>();
    keys.iter().map(|key| by_key.get(key).cloned()).collect()
}

/// Turns a one-to-many fetch into a `BatchFunction` whose value for each key is the list of
/// values that belong to it.
///
/// `fetch` receives the batch keys and the loader context and returns every related value in
/// whatever order the resource produces; `group` extracts the key a value belongs to.
pub struct Grouped<F, G, C> {
    fetch: F,
    group: G,
    _context: PhantomData<fn(C)>,
}

impl<F, G, C> Grouped<F, G, C> {
    pub fn new(fetch: F, group: G) -> Self {
        Self { fetch, group, _context: PhantomData }
    }
}

#[async_trait]
impl<K, V, E, C, F, Fut, G> BatchFunction<K, Vec<V>> for Grouped<F, G, C>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + 'static,
    E: Send + 'static,
    C: Clone + Send + Sync + 'static,
    F: Fn(Vec<K>, C) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<Option<V>>, E>> + Send,
    G: Fn(&V) -> K + Send + Sync,
{
    type Context = C;
    type Error = E;

    async fn load(&self, keys: &[K], context: &C) -> BatchResult<Vec<V>, E> {
        let values = (self.fetch)(keys.to_vec(), context.clone()).await?;
        Ok(group_values(keys, values, &self.group).into_iter().map(Ok).collect())
    }
}

/// Turns an unordered fetch into a positional `BatchFunction`: each key receives the value whose
/// `sort` key equals it, or `None`.
pub struct Sorted<F, S, C> {
    fetch: F,
    sort: S,
    _context: PhantomData<fn(C)>,
}

impl<F, S, C> Sorted<F, S, C> {
    pub fn new(fetch: F, sort: S) -> Self {
        Self { fetch, sort, _context: PhantomData }
    }
}

#[async_trait]
impl<K, V, E, C, F, Fut, S> BatchFunction<K, Option<V>> for Sorted<F, S, C>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + 'static,
    E: Send + 'static,
    C: Clone + Send + Sync + 'static,
    F: Fn(Vec<K>, C) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<V>, E>> + Send,
    S: Fn(&V) -> K + Send + Sync,
{
    type Context = C;
    type Error = E;

    async fn load(&self, keys: &[K], context: &C) -> BatchResult<Option<V>, E> {
        let values = (self.fetch)(keys.to_vec(), context.clone()).await?;
        Ok(sort_values(keys, values, &self.sort).into_iter().map(Ok).collect())
    }
}
