mod batch_function;
mod cache;
pub mod directives;
mod distributor;
mod error;
mod field;
mod grouping;
mod instrument;
mod loader;
mod loader_op;
mod loader_worker;
mod options;
mod registry;
#[cfg(feature = "stats")]
mod worker_stats;

pub use batch_function::{load_fn, BatchFunction, BatchResult, LoadFn};
pub use distributor::{distribute, LoadOutcome};
pub use error::{AggregateError, FieldError, LoadError, RegistryError};
pub use field::{
    Field, FieldBuilder, FieldType, FieldValue, Ids, LoadableFieldBuilder, LoadableFieldOptions,
    LoadableGroupFieldOptions, LoadableListFieldOptions, ResolveInfo, Resolver,
};
pub use grouping::{group_values, sort_values, Grouped, Sorted};
pub use instrument::TracingOptions;
pub use loader::Loader;
pub use options::{CacheKeyFn, LoaderOptions};
pub use registry::{LoaderId, LoaderRegistry, RequestScope, ScopeId};
