//! A minimal field model for hosting loadable resolvers.
//!
//! A [`Field`] is a named, typed resolver from a parent value to a field value. The execution
//! engine calls [`Field::resolve`] with the parent and a [`ResolveInfo`] describing the current
//! request; the returned future settles to the value or to the error the engine attaches to the
//! response at the field's path.

mod loadable;

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};

use crate::error::FieldError;
use crate::instrument::{self, TracingOptions};
use crate::registry::RequestScope;

pub use loadable::{
    FieldValue, Ids, LoadableFieldBuilder, LoadableFieldOptions, LoadableGroupFieldOptions,
    LoadableListFieldOptions,
};

/// The output type of a field: a single value or a list of them, named after the GraphQL type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Single(String),
    List(String),
}

impl FieldType {
    pub fn single(name: impl Into<String>) -> Self {
        FieldType::Single(name.into())
    }

    pub fn list(name: impl Into<String>) -> Self {
        FieldType::List(name.into())
    }

    pub fn is_list(&self) -> bool {
        matches!(self, FieldType::List(_))
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Single(name) => f.write_str(name),
            FieldType::List(name) => write!(f, "[{name}]"),
        }
    }
}

/// What a resolver knows about the request it runs in.
pub struct ResolveInfo<C> {
    scope: RequestScope<C>,
    path: String,
}

impl<C> ResolveInfo<C> {
    pub fn new(scope: RequestScope<C>, path: impl Into<String>) -> Self {
        Self { scope, path: path.into() }
    }

    pub fn scope(&self) -> &RequestScope<C> {
        &self.scope
    }

    pub fn context(&self) -> &C {
        self.scope.context()
    }

    /// Response path of the field being resolved, e.g. `user.posts.0.author`.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn child(&self, segment: impl fmt::Display) -> Self {
        let path = if self.path.is_empty() {
            segment.to_string()
        } else {
            format!("{}.{segment}", self.path)
        };
        Self { scope: self.scope.clone(), path }
    }
}

impl<C> Clone for ResolveInfo<C> {
    fn clone(&self) -> Self {
        Self { scope: self.scope.clone(), path: self.path.clone() }
    }
}

impl<C> fmt::Debug for ResolveInfo<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolveInfo").field("scope", &self.scope).field("path", &self.path).finish()
    }
}

pub type Resolver<P, C, T, E> = Arc<
    dyn Fn(&P, &ResolveInfo<C>) -> BoxFuture<'static, Result<T, FieldError<E>>> + Send + Sync,
>;

/// A resolvable field of parent type `P`.
pub struct Field<P, C, T, E> {
    pub(crate) name: String,
    pub(crate) ty: FieldType,
    pub(crate) resolver: Resolver<P, C, T, E>,
}

impl<P, C, T, E> Field<P, C, T, E> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> &FieldType {
        &self.ty
    }

    pub fn resolve(
        &self,
        parent: &P,
        info: &ResolveInfo<C>,
    ) -> BoxFuture<'static, Result<T, FieldError<E>>> {
        (self.resolver)(parent, info)
    }
}

impl<P, C, T, E> Clone for Field<P, C, T, E> {
    fn clone(&self) -> Self {
        Self { name: self.name.clone(), ty: self.ty.clone(), resolver: Arc::clone(&self.resolver) }
    }
}

impl<P, C, T, E> fmt::Debug for Field<P, C, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field").field("name", &self.name).field("ty", &self.ty).finish()
    }
}

/// Builds fields for parent type `P`, request context `C` and error type `E`.
///
/// Behaviour shared by every field, such as tracing, is registered on the builder when it is
/// constructed and applied to each field it builds.
pub struct FieldBuilder<P, C, E> {
    tracing: Option<TracingOptions>,
    _marker: PhantomData<fn(&P, &C) -> E>,
}

impl<P, C, E> Default for FieldBuilder<P, C, E> {
    fn default() -> Self {
        Self { tracing: None, _marker: PhantomData }
    }
}

impl<P, C, E> FieldBuilder<P, C, E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps every field built from now on in a `graphql.resolve` span.
    pub fn with_tracing(mut self, options: TracingOptions) -> Self {
        self.tracing = Some(options);
        self
    }

    /// Adds the loadable field methods on top of this builder.
    pub fn into_loadable(self) -> LoadableFieldBuilder<P, C, E> {
        LoadableFieldBuilder::new(self)
    }
}

impl<P, C, E> FieldBuilder<P, C, E>
where
    P: 'static,
    C: 'static,
    E: fmt::Display + Send + 'static,
{
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
        let resolver: Resolver<P, C, T, E> =
            Arc::new(move |parent: &P, info: &ResolveInfo<C>| resolve(parent, info).boxed());
        let field = Field { name: name.into(), ty, resolver };
        match &self.tracing {
            Some(options) => instrument::trace_field(field, options.clone()),
            None => field,
        }
    }
}
