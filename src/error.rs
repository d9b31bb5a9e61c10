use std::fmt;

use thiserror::Error;

use crate::registry::{LoaderId, ScopeId};

/// Why a single key could not be loaded.
///
/// `E` is the error type of the `BatchFunction`. It is cloned once per waiting requester, so a
/// batch failure reaches every key that took part in that batch.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LoadError<E> {
    /// The batch function failed as a whole; every key in the batch receives this.
    #[error("batch load failed: {0}")]
    Batch(E),
    /// The batch function returned an error at this key's position.
    #[error("failed to load key: {0}")]
    Key(E),
    /// The batch function broke the positional contract.
    #[error("batch function returned {actual} results for {expected} keys")]
    LengthMismatch { expected: usize, actual: usize },
    /// The loader worker is gone, usually because the request scope ended.
    #[error("loader worker has shut down")]
    Closed,
}

impl<E> LoadError<E> {
    /// The underlying batch function error, if there is one.
    pub fn source_error(&self) -> Option<&E> {
        match self {
            LoadError::Batch(e) | LoadError::Key(e) => Some(e),
            LoadError::LengthMismatch { .. } | LoadError::Closed => None,
        }
    }
}

/// Every failed entry of a list field, keyed by its position in the id list.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateError<E> {
    pub errors: Vec<(usize, LoadError<E>)>,
}

impl<E: fmt::Display> fmt::Display for AggregateError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of the list entries failed to load", self.errors.len())?;
        for (index, error) in &self.errors {
            write!(f, "; [{index}] {error}")?;
        }
        Ok(())
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for AggregateError<E> {}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("request scope {0} has already ended")]
    ScopeClosed(ScopeId),
    #[error("loader {0} is registered with a different key or value type")]
    TypeMismatch(LoaderId),
}

/// The error a field resolver hands back to the execution engine.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FieldError<E> {
    /// The field's id-resolving step failed before anything was loaded.
    #[error("{0}")]
    Resolve(E),
    #[error(transparent)]
    Load(#[from] LoadError<E>),
    #[error(transparent)]
    Aggregate(AggregateError<E>),
    #[error("field `{field}` expected {expected}")]
    ShapeMismatch { field: String, expected: &'static str },
    #[error(transparent)]
    Registry(#[from] RegistryError),
}
