use std::fmt;
use std::sync::Arc;

pub type CacheKeyFn<K, CK> = Arc<dyn Fn(&K) -> CK + Send + Sync>;

/// Per-loader configuration, the `loaderOptions` of a loadable field.
///
/// `CK` is the cache-key type. Two keys with the same cache-key share one batch slot and one
/// cached outcome.
pub struct LoaderOptions<K, CK = K> {
    pub(crate) cache: bool,
    pub(crate) cache_key: CacheKeyFn<K, CK>,
    pub(crate) max_batch_size: Option<usize>,
    pub(crate) name: Option<&'static str>,
}

impl<K> LoaderOptions<K, K>
where
    K: Clone + 'static,
{
    /// Caching on, keys are their own cache-keys, batches unbounded.
    pub fn new() -> Self {
        Self { cache: true, cache_key: Arc::new(K::clone), max_batch_size: None, name: None }
    }
}

impl<K> Default for LoaderOptions<K, K>
where
    K: Clone + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, CK> LoaderOptions<K, CK> {
    /// Derives cache-keys with `f` instead of using the key itself.
    pub fn cache_key<CK2, F>(self, f: F) -> LoaderOptions<K, CK2>
    where
        F: Fn(&K) -> CK2 + Send + Sync + 'static,
    {
        LoaderOptions {
            cache: self.cache,
            cache_key: Arc::new(f),
            max_batch_size: self.max_batch_size,
            name: self.name,
        }
    }

    /// Disabling the cache still de-duplicates keys within one batch.
    pub fn cache(mut self, enabled: bool) -> Self {
        self.cache = enabled;
        self
    }

    /// Splits batches larger than `size` into several calls. A size of zero is treated as one.
    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = Some(size.max(1));
        self
    }

    /// Name used for the worker's tracing span.
    pub fn name(mut self, name: &'static str) -> Self {
        self.name = Some(name);
        self
    }

    pub fn is_cache_enabled(&self) -> bool {
        self.cache
    }
}

impl<K, CK> Clone for LoaderOptions<K, CK> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache,
            cache_key: Arc::clone(&self.cache_key),
            max_batch_size: self.max_batch_size,
            name: self.name,
        }
    }
}

impl<K, CK> fmt::Debug for LoaderOptions<K, CK> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderOptions")
            .field("cache", &self.cache)
            .field("max_batch_size", &self.max_batch_size)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cache_with_identity_keys() {
        let options = LoaderOptions::<String>::new();
        assert!(options.is_cache_enabled());
        assert_eq!((options.cache_key)(&"Key".to_owned()), "Key");
        assert_eq!(options.max_batch_size, None);
    }

    #[test]
    fn builder_overrides_defaults() {
        let options = LoaderOptions::<String>::new()
            .cache(false)
            .max_batch_size(0)
            .cache_key(|key: &String| key.len());

        assert!(!options.is_cache_enabled());
        assert_eq!(options.max_batch_size, Some(1));
        assert_eq!((options.cache_key)(&"four".to_owned()), 4);
    }
}
