use std::fmt::Display;
use std::sync::Arc;

use futures::future::FutureExt;
use tracing_futures::Instrument;

use crate::field::{Field, ResolveInfo, Resolver};

/// How fields built by a tracing-enabled [`FieldBuilder`](crate::FieldBuilder) are traced.
#[derive(Debug, Clone, Default)]
pub struct TracingOptions {
    /// Do not report resolver errors. They are still returned to the caller.
    pub ignore_error: bool,
}

/// Runs every resolution of `field` inside a `graphql.resolve` span and reports failures.
pub(crate) fn trace_field<P, C, T, E>(
    field: Field<P, C, T, E>,
    options: TracingOptions,
) -> Field<P, C, T, E>
where
    P: 'static,
    C: 'static,
    T: Send + 'static,
    E: Display + Send + 'static,
{
    let Field { name, ty, resolver } = field;
    let field_name = name.clone();
    let field_type = ty.to_string();
    let traced: Resolver<P, C, T, E> = Arc::new(move |parent: &P, info: &ResolveInfo<C>| {
        let span = tracing::info_span!(
            "graphql.resolve",
            graphql.field.name = %field_name,
            graphql.field.path = %info.path(),
            graphql.return_type = %field_type
        );
        let resolution = span.in_scope(|| resolver(parent, info));
        let ignore_error = options.ignore_error;
        async move {
            let result = resolution.await;
            if let Err(error) = &result {
                if !ignore_error {
                    tracing::error!(%error, "field resolver failed");
                }
            }
            result
        }
        .instrument(span)
        .boxed()
    });
    Field { name, ty, resolver: traced }
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;
    use crate::{error::FieldError, field::FieldType, FieldBuilder, LoaderRegistry};

    async fn no_session_resolution() -> Result<u32, FieldError<String>> {
        Err(FieldError::Resolve("no session".to_owned()))
    }

    fn no_session(
        _: &(),
        _: &ResolveInfo<()>,
    ) -> impl std::future::Future<Output = Result<u32, FieldError<String>>> {
        no_session_resolution()
    }

    fn failing_builder(ignore_error: bool) -> FieldBuilder<(), (), String> {
        FieldBuilder::new().with_tracing(TracingOptions { ignore_error })
    }

    #[tokio::test]
    #[traced_test]
    async fn failures_are_reported_inside_span() {
        let field = failing_builder(false).field("viewer", FieldType::single("User"), no_session);
        let scope = LoaderRegistry::new().begin_request(());

        let result = field.resolve(&(), &ResolveInfo::new(scope, "viewer")).await;

        assert_eq!(result, Err(FieldError::Resolve("no session".to_owned())));
        assert!(logs_contain("graphql.resolve"));
        assert!(logs_contain("field resolver failed"));
        assert!(logs_contain("no session"));
    }

    #[tokio::test]
    #[traced_test]
    async fn ignored_errors_are_still_returned() {
        let field = failing_builder(true).field("viewer", FieldType::single("User"), no_session);
        let scope = LoaderRegistry::new().begin_request(());

        let result = field.resolve(&(), &ResolveInfo::new(scope, "viewer")).await;

        assert!(result.is_err());
        assert!(!logs_contain("field resolver failed"));
    }
}
