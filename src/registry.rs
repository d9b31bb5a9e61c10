use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::error::RegistryError;

/// Identifies one request scope for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u64);

/// Identifies one loader definition, i.e. one loadable field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoaderId(u64);

impl ScopeId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl LoaderId {
    /// Allocates an id no other loader definition shares.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope#{}", self.0)
    }
}

impl fmt::Display for LoaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loader#{}", self.0)
    }
}

type Instances = HashMap<LoaderId, Arc<dyn Any + Send + Sync>>;

/// Holds the loader instances of every live request, one per (request scope, loader definition).
///
/// Instances are created lazily on first use and released when the request ends, so nothing
/// cached for one request is visible to another.
#[derive(Default)]
pub struct LoaderRegistry {
    scopes: DashMap<ScopeId, Instances>,
}

impl LoaderRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Opens a scope for a new request carrying `context`.
    pub fn begin_request<C>(self: &Arc<Self>, context: C) -> RequestScope<C> {
        let id = ScopeId::next();
        self.scopes.insert(id, HashMap::new());
        tracing::debug!(scope = %id, "request scope opened");
        let inner = ScopeInner { id, context: Arc::new(context), registry: Arc::clone(self) };
        RequestScope { inner: Arc::new(inner) }
    }

    /// Returns the scope's instance of `loader`, creating it with `init` on first use.
    pub fn get_or_create<L, F>(
        &self,
        scope: ScopeId,
        loader: LoaderId,
        init: F,
    ) -> Result<Arc<L>, RegistryError>
    where
        L: Any + Send + Sync,
        F: FnOnce() -> L,
    {
        let instance = {
            let mut instances =
                self.scopes.get_mut(&scope).ok_or(RegistryError::ScopeClosed(scope))?;
            Arc::clone(instances.entry(loader).or_insert_with(|| {
                tracing::trace!(scope = %scope, loader = %loader, "creating loader instance");
                Arc::new(init()) as Arc<dyn Any + Send + Sync>
            }))
        };
        instance.downcast::<L>().map_err(|_| RegistryError::TypeMismatch(loader))
    }

    /// Drops every loader instance of `scope`. Returns false if the scope was already released.
    pub fn end_request(&self, scope: ScopeId) -> bool {
        match self.scopes.remove(&scope) {
            Some((_, instances)) => {
                let loaders = instances.len();
                tracing::debug!(scope = %scope, loaders, "request scope released");
                true
            }
            None => false,
        }
    }

    pub fn active_scopes(&self) -> usize {
        self.scopes.len()
    }

    pub fn loader_count(&self, scope: ScopeId) -> usize {
        self.scopes.get(&scope).map(|instances| instances.len()).unwrap_or(0)
    }
}

impl fmt::Debug for LoaderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderRegistry").field("active_scopes", &self.active_scopes()).finish()
    }
}

struct ScopeInner<C> {
    id: ScopeId,
    context: Arc<C>,
    registry: Arc<LoaderRegistry>,
}

impl<C> Drop for ScopeInner<C> {
    fn drop(&mut self) {
        self.registry.end_request(self.id);
    }
}

/// Handle on one request: its context and its loader instances.
///
/// Clones share the scope. The scope ends when [`RequestScope::end`] is called or the last handle
/// is dropped, whichever comes first.
pub struct RequestScope<C> {
    inner: Arc<ScopeInner<C>>,
}

impl<C> Clone for RequestScope<C> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<C> RequestScope<C> {
    pub fn id(&self) -> ScopeId {
        self.inner.id
    }

    pub fn context(&self) -> &Arc<C> {
        &self.inner.context
    }

    /// This scope's instance of `loader`, see [`LoaderRegistry::get_or_create`].
    pub fn loader<L, F>(&self, loader: LoaderId, init: F) -> Result<Arc<L>, RegistryError>
    where
        L: Any + Send + Sync,
        F: FnOnce() -> L,
    {
        self.inner.registry.get_or_create(self.inner.id, loader, init)
    }

    /// Releases the scope's loaders now, even if other handles are still alive. Loads already
    /// in flight finish; later lookups fail with [`RegistryError::ScopeClosed`].
    pub fn end(self) {
        self.inner.registry.end_request(self.inner.id);
    }

    pub fn is_active(&self) -> bool {
        self.inner.registry.scopes.contains_key(&self.inner.id)
    }
}

impl<C> fmt::Debug for RequestScope<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestScope").field("id", &self.inner.id).finish_non_exhaustive()
    }
}
