use std::fmt::{Debug, Display};
use std::future::Future;
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::future;

use crate::{
    batch_function::BatchFunction,
    error::{AggregateError, FieldError, RegistryError},
    grouping::{Grouped, Sorted},
    loader::Loader,
    options::LoaderOptions,
    registry::LoaderId,
};

use super::{Field, FieldBuilder, FieldType, ResolveInfo};

/// What the id-resolving step of a loadable field produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ids<K> {
    /// Nothing to load; the field resolves to null.
    Null,
    One(K),
    /// Ids of a list field. `None` entries stay null and are not loaded.
    Many(Vec<Option<K>>),
}

impl<K> Ids<K> {
    pub fn many(ids: impl IntoIterator<Item = K>) -> Self {
        Ids::Many(ids.into_iter().map(Some).collect())
    }
}

impl<K> From<Option<K>> for Ids<K> {
    fn from(id: Option<K>) -> Self {
        id.map_or(Ids::Null, Ids::One)
    }
}

/// The resolved value of a loadable field, shaped like its [`Ids`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue<V> {
    Null,
    One(V),
    Many(Vec<Option<V>>),
}

impl<V> FieldValue<V> {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn into_one(self) -> Option<V> {
        match self {
            FieldValue::One(value) => Some(value),
            FieldValue::Null | FieldValue::Many(_) => None,
        }
    }

    pub fn into_many(self) -> Option<Vec<Option<V>>> {
        match self {
            FieldValue::Many(values) => Some(values),
            FieldValue::Null | FieldValue::One(_) => None,
        }
    }
}

/// Options of [`LoadableFieldBuilder::loadable`].
///
/// `load` is a positional [`BatchFunction`] whose context is the request context. `resolve`
/// turns the parent into the id(s) to load.
pub struct LoadableFieldOptions<F, R, K, CK = K> {
    pub ty: FieldType,
    pub load: F,
    pub loader_options: LoaderOptions<K, CK>,
    pub resolve: R,
}

impl<F, R, K> LoadableFieldOptions<F, R, K, K>
where
    K: Clone + 'static,
{
    pub fn new(ty: FieldType, load: F, resolve: R) -> Self {
        Self { ty, load, loader_options: LoaderOptions::new(), resolve }
    }
}

impl<F, R, K, CK> LoadableFieldOptions<F, R, K, CK> {
    pub fn loader_options<CK2>(
        self,
        loader_options: LoaderOptions<K, CK2>,
    ) -> LoadableFieldOptions<F, R, K, CK2> {
        LoadableFieldOptions { ty: self.ty, load: self.load, loader_options, resolve: self.resolve }
    }

    /// Treats `load` as an unordered fetch and matches its values back to the keys with `sort`.
    /// Keys without a value load as `None`.
    pub fn sort<C, S>(self, sort: S) -> LoadableFieldOptions<Sorted<F, S, C>, R, K, CK> {
        LoadableFieldOptions {
            ty: self.ty,
            load: Sorted::new(self.load, sort),
            loader_options: self.loader_options,
            resolve: self.resolve,
        }
    }
}

/// Options of [`LoadableFieldBuilder::loadable_list`]: `load` returns a whole list per key.
pub struct LoadableListFieldOptions<F, R, K, CK = K> {
    pub item_type: String,
    pub load: F,
    pub loader_options: LoaderOptions<K, CK>,
    pub resolve: R,
}

impl<F, R, K> LoadableListFieldOptions<F, R, K, K>
where
    K: Clone + 'static,
{
    pub fn new(item_type: impl Into<String>, load: F, resolve: R) -> Self {
        Self { item_type: item_type.into(), load, loader_options: LoaderOptions::new(), resolve }
    }
}

impl<F, R, K, CK> LoadableListFieldOptions<F, R, K, CK> {
    pub fn loader_options<CK2>(
        self,
        loader_options: LoaderOptions<K, CK2>,
    ) -> LoadableListFieldOptions<F, R, K, CK2> {
        LoadableListFieldOptions {
            item_type: self.item_type,
            load: self.load,
            loader_options,
            resolve: self.resolve,
        }
    }
}

/// Options of [`LoadableFieldBuilder::loadable_group`]: `load` fetches every related value for
/// the batch, `group` names the key each value belongs to.
pub struct LoadableGroupFieldOptions<F, G, R, K, CK = K> {
    pub item_type: String,
    pub load: F,
    pub group: G,
    pub loader_options: LoaderOptions<K, CK>,
    pub resolve: R,
}

impl<F, G, R, K> LoadableGroupFieldOptions<F, G, R, K, K>
where
    K: Clone + 'static,
{
    pub fn new(item_type: impl Into<String>, load: F, group: G, resolve: R) -> Self {
        Self {
            item_type: item_type.into(),
            load,
            group,
            loader_options: LoaderOptions::new(),
            resolve,
        }
    }
}

impl<F, G, R, K, CK> LoadableGroupFieldOptions<F, G, R, K, CK> {
    pub fn loader_options<CK2>(
        self,
        loader_options: LoaderOptions<K, CK2>,
    ) -> LoadableGroupFieldOptions<F, G, R, K, CK2> {
        LoadableGroupFieldOptions {
            item_type: self.item_type,
            load: self.load,
            group: self.group,
            loader_options,
            resolve: self.resolve,
        }
    }
}

/// One loader definition: the batch function and options every request's instance is built
/// from.
struct LoaderSource<F, K, V, E, CK> {
    id: LoaderId,
    load: Arc<F>,
    options: LoaderOptions<K, CK>,
    _marker: PhantomData<fn() -> (V, E)>,
}

impl<F, K, V, E, CK> LoaderSource<F, K, V, E, CK>
where
    K: 'static + Clone + Debug + Send + Sync,
    V: 'static + Clone + Send + Sync,
    E: 'static + Clone + Debug + Send + Sync,
    CK: 'static + Clone + Eq + Hash + Send + Sync,
{
    fn new(load: F, options: LoaderOptions<K, CK>) -> Self {
        Self { id: LoaderId::next(), load: Arc::new(load), options, _marker: PhantomData }
    }

    /// The request's loader instance, created on first use.
    fn get<C>(&self, info: &ResolveInfo<C>) -> Result<Arc<Loader<K, V, E, CK>>, RegistryError>
    where
        C: Send + Sync + 'static,
        F: 'static + BatchFunction<K, V, Context = Arc<C>, Error = E>,
    {
        let scope = info.scope();
        scope.loader(self.id, || {
            let context = Arc::clone(scope.context());
            Loader::with_options(Arc::clone(&self.load), context, self.options.clone())
        })
    }
}

/// Composes a [`FieldBuilder`] with the loadable field methods.
pub struct LoadableFieldBuilder<P, C, E> {
    fields: FieldBuilder<P, C, E>,
}

impl<P, C, E> LoadableFieldBuilder<P, C, E> {
    pub fn new(fields: FieldBuilder<P, C, E>) -> Self {
        Self { fields }
    }
}

impl<P, C, E> LoadableFieldBuilder<P, C, E>
where
    P: 'static,
    C: Send + Sync + 'static,
    E: Clone + Debug + Display + Send + Sync + 'static,
{
    /// A plain field, see [`FieldBuilder::field`].
    pub fn field<T, R, Fut>(
        &self,
        name: impl Into<String>,
        ty: FieldType,
        resolve: R,
    ) -> Field<P, C, T, E>
    where
        T: Send + 'static,
        R: Fn(&P, &ResolveInfo<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, FieldError<E>>> + Send + 'static,
    {
        self.fields.field(name, ty, resolve)
    }

    /// A field whose value is loaded by key through the request's batch loader.
    ///
    /// A null id resolves to null without touching the loader. For a list type, every non-null
    /// id is loaded in the same batch and any failure fails the whole field with an
    /// [`AggregateError`] listing the failed positions.
    pub fn loadable<K, CK, V, F, R, Fut>(
        &self,
        name: impl Into<String>,
        options: LoadableFieldOptions<F, R, K, CK>,
    ) -> Field<P, C, FieldValue<V>, E>
    where
        K: 'static + Clone + Debug + Send + Sync,
        CK: 'static + Clone + Eq + Hash + Send + Sync,
        V: 'static + Clone + Send + Sync,
        F: 'static + BatchFunction<K, V, Context = Arc<C>, Error = E>,
        R: Fn(&P, &ResolveInfo<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Ids<K>, E>> + Send + 'static,
    {
        let LoadableFieldOptions { ty, load, loader_options, resolve } = options;
        let name = name.into();
        let field_name = name.clone();
        let expects_list = ty.is_list();
        let source = Arc::new(LoaderSource::new(load, loader_options));
        self.fields.field(name, ty, move |parent: &P, info: &ResolveInfo<C>| {
            resolve_loadable(
                Arc::clone(&source),
                info.clone(),
                resolve(parent, info),
                expects_list,
                field_name.clone(),
            )
        })
    }

    /// A list field whose whole list is the loader value for one key.
    pub fn loadable_list<K, CK, V, F, R, Fut>(
        &self,
        name: impl Into<String>,
        options: LoadableListFieldOptions<F, R, K, CK>,
    ) -> Field<P, C, Vec<V>, E>
    where
        K: 'static + Clone + Debug + Send + Sync,
        CK: 'static + Clone + Eq + Hash + Send + Sync,
        V: 'static + Clone + Send + Sync,
        F: 'static + BatchFunction<K, Vec<V>, Context = Arc<C>, Error = E>,
        R: Fn(&P, &ResolveInfo<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<K, E>> + Send + 'static,
    {
        let LoadableListFieldOptions { item_type, load, loader_options, resolve } = options;
        self.keyed_list_field(name.into(), item_type, load, loader_options, resolve)
    }

    /// A list field built from a one-to-many fetch: values are grouped per key with `group`, and
    /// a key without values resolves to an empty list.
    pub fn loadable_group<K, CK, V, F, G, R, Fut>(
        &self,
        name: impl Into<String>,
        options: LoadableGroupFieldOptions<F, G, R, K, CK>,
    ) -> Field<P, C, Vec<V>, E>
    where
        K: 'static + Clone + Debug + Send + Sync,
        CK: 'static + Clone + Eq + Hash + Send + Sync,
        V: 'static + Clone + Send + Sync,
        F: 'static,
        G: 'static,
        Grouped<F, G, Arc<C>>: BatchFunction<K, Vec<V>, Context = Arc<C>, Error = E>,
        R: Fn(&P, &ResolveInfo<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<K, E>> + Send + 'static,
    {
        let LoadableGroupFieldOptions { item_type, load, group, loader_options, resolve } = options;
        self.keyed_list_field(
            name.into(),
            item_type,
            Grouped::new(load, group),
            loader_options,
            resolve,
        )
    }

    fn keyed_list_field<K, CK, V, F, R, Fut>(
        &self,
        name: String,
        item_type: String,
        load: F,
        loader_options: LoaderOptions<K, CK>,
        resolve: R,
    ) -> Field<P, C, Vec<V>, E>
    where
        K: 'static + Clone + Debug + Send + Sync,
        CK: 'static + Clone + Eq + Hash + Send + Sync,
        V: 'static + Clone + Send + Sync,
        F: 'static + BatchFunction<K, Vec<V>, Context = Arc<C>, Error = E>,
        R: Fn(&P, &ResolveInfo<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<K, E>> + Send + 'static,
    {
        let source = Arc::new(LoaderSource::new(load, loader_options));
        let ty = FieldType::list(item_type);
        self.fields.field(name, ty, move |parent: &P, info: &ResolveInfo<C>| {
            resolve_keyed(Arc::clone(&source), info.clone(), resolve(parent, info))
        })
    }
}

async fn resolve_loadable<K, CK, V, E, C, F, Fut>(
    source: Arc<LoaderSource<F, K, V, E, CK>>,
    info: ResolveInfo<C>,
    ids: Fut,
    expects_list: bool,
    field: String,
) -> Result<FieldValue<V>, FieldError<E>>
where
    K: 'static + Clone + Debug + Send + Sync,
    CK: 'static + Clone + Eq + Hash + Send + Sync,
    V: 'static + Clone + Send + Sync,
    E: 'static + Clone + Debug + Send + Sync,
    C: Send + Sync + 'static,
    F: 'static + BatchFunction<K, V, Context = Arc<C>, Error = E>,
    Fut: Future<Output = Result<Ids<K>, E>>,
{
    match (ids.await.map_err(FieldError::Resolve)?, expects_list) {
        (Ids::Null, _) => Ok(FieldValue::Null),
        (Ids::One(id), false) => {
            let loader = source.get(&info)?;
            Ok(FieldValue::One(loader.load(id).await?))
        }
        (Ids::Many(ids), true) => {
            let loader = source.get(&info)?;
            load_entries(&loader, ids).await.map(FieldValue::Many)
        }
        (Ids::One(_), true) => Err(FieldError::ShapeMismatch { field, expected: "a list of ids" }),
        (Ids::Many(_), false) => Err(FieldError::ShapeMismatch { field, expected: "a single id" }),
    }
}

async fn resolve_keyed<K, CK, V, E, C, F, Fut>(
    source: Arc<LoaderSource<F, K, Vec<V>, E, CK>>,
    info: ResolveInfo<C>,
    key: Fut,
) -> Result<Vec<V>, FieldError<E>>
where
    K: 'static + Clone + Debug + Send + Sync,
    CK: 'static + Clone + Eq + Hash + Send + Sync,
    V: 'static + Clone + Send + Sync,
    E: 'static + Clone + Debug + Send + Sync,
    C: Send + Sync + 'static,
    F: 'static + BatchFunction<K, Vec<V>, Context = Arc<C>, Error = E>,
    Fut: Future<Output = Result<K, E>>,
{
    let key = key.await.map_err(FieldError::Resolve)?;
    let loader = source.get(&info)?;
    Ok(loader.load(key).await?)
}

/// Loads every non-null id in one frame. Either all of them succeed, or the failures are
/// returned together.
async fn load_entries<K, V, E, CK>(
    loader: &Loader<K, V, E, CK>,
    ids: Vec<Option<K>>,
) -> Result<Vec<Option<V>>, FieldError<E>> {
    let outcomes = future::join_all(ids.into_iter().map(|id| async move {
        match id {
            Some(id) => loader.load(id).await.map(Some),
            None => Ok(None),
        }
    }))
    .await;

    let mut values = Vec::with_capacity(outcomes.len());
    let mut errors = Vec::new();
    for (index, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(value) => values.push(value),
            Err(error) => errors.push((index, error)),
        }
    }
    if errors.is_empty() {
        Ok(values)
    } else {
        Err(FieldError::Aggregate(AggregateError { errors }))
    }
}
