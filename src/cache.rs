use std::collections::HashMap;
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;

/// Storage for settled load outcomes, keyed by cache-key.
///
/// A `LoaderWorker` owns its cache exclusively, so implementations need no synchronization.
pub trait Cache {
    type K;
    type V;

    fn get(&self, key: &Self::K) -> Option<&Self::V>;

    fn insert(&mut self, key: Self::K, value: Self::V);

    /// Inserts a value only if the key is not cached yet.
    fn insert_if_absent(&mut self, key: Self::K, value: Self::V);

    fn remove(&mut self, keys: &[Self::K]);
    fn flush(&mut self);
}

impl<K, V, S: BuildHasher> Cache for HashMap<K, V, S>
where
    K: Eq + Hash,
{
    type K = K;
    type V = V;

    fn get(&self, key: &K) -> Option<&V> {
        HashMap::get(self, key)
    }

    fn insert(&mut self, key: K, value: V) {
        HashMap::insert(self, key, value);
    }

    fn insert_if_absent(&mut self, key: K, value: V) {
        self.entry(key).or_insert(value);
    }

    fn remove(&mut self, keys: &[K]) {
        for key in keys {
            HashMap::remove(self, key);
        }
    }

    fn flush(&mut self) {
        self.clear();
    }
}

/// A cache that never holds anything. Used when a loader is built with caching disabled, so
/// every frame goes back to the batch function.
#[derive(Debug)]
pub struct NoCache<K, V>(PhantomData<fn(K) -> V>);

impl<K, V> Default for NoCache<K, V> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<K, V> Cache for NoCache<K, V> {
    type K = K;
    type V = V;

    fn get(&self, _key: &K) -> Option<&V> {
        None
    }

    fn insert(&mut self, _key: K, _value: V) {}

    fn insert_if_absent(&mut self, _key: K, _value: V) {}

    fn remove(&mut self, _keys: &[K]) {}

    fn flush(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_if_absent_keeps_existing_value() {
        let mut cache = HashMap::new();
        Cache::insert(&mut cache, 1, "first");
        cache.insert_if_absent(1, "second");
        cache.insert_if_absent(2, "other");

        assert_eq!(Cache::get(&cache, &1), Some(&"first"));
        assert_eq!(Cache::get(&cache, &2), Some(&"other"));
    }

    #[test]
    fn remove_and_flush() {
        let mut cache: HashMap<u32, char> = [(1, 'a'), (2, 'b'), (3, 'c')].into_iter().collect();
        Cache::remove(&mut cache, &[2]);
        assert_eq!((Cache::get(&cache, &1), Cache::get(&cache, &2)), (Some(&'a'), None));

        Cache::flush(&mut cache);
        assert!(cache.is_empty());
    }

    #[test]
    fn no_cache_stays_empty() {
        let mut cache = NoCache::<u32, u32>::default();
        cache.insert(1, 1);
        cache.insert_if_absent(2, 2);
        assert_eq!((cache.get(&1), cache.get(&2)), (None, None));
    }
}
