use std::fmt::Debug;

use crate::{batch_function::BatchResult, error::LoadError};

/// The settled outcome handed to one requester of one key.
pub type LoadOutcome<V, E> = Result<V, LoadError<E>>;

/// Maps the result of one batch function call back onto the keys it was called with.
///
/// Outcome `i` belongs to key `i`; nothing is reordered or retried. A failure of the whole call,
/// or a result list of the wrong length, is copied to every one of the `expected` positions.
pub fn distribute<V, E>(result: BatchResult<V, E>, expected: usize) -> Vec<LoadOutcome<V, E>>
where
    E: Clone + Debug,
{
    match result {
        Err(error) => {
            tracing::warn!(?error, batch_size = expected, "batch function failed");
            (0..expected).map(|_| Err(LoadError::Batch(error.clone()))).collect()
        }
        Ok(outcomes) if outcomes.len() != expected => {
            let actual = outcomes.len();
            tracing::warn!(expected, actual, "batch function broke positional contract");
            (0..expected).map(|_| Err(LoadError::LengthMismatch { expected, actual })).collect()
        }
        Ok(outcomes) => {
            outcomes.into_iter().map(|outcome| outcome.map_err(LoadError::Key)).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Boom(&'static str);

    #[test]
    fn outcomes_follow_key_positions() {
        let outcomes = distribute(Ok(vec![Ok("a"), Err(Boom("b")), Ok("c")]), 3);
        assert_eq!(outcomes, vec![Ok("a"), Err(LoadError::Key(Boom("b"))), Ok("c")]);
    }

    #[test]
    fn batch_failure_reaches_every_key() {
        let outcomes = distribute::<&str, _>(Err(Boom("db down")), 2);
        assert_eq!(
            outcomes,
            vec![Err(LoadError::Batch(Boom("db down"))), Err(LoadError::Batch(Boom("db down")))]
        );
    }

    #[test]
    fn short_result_list_fails_whole_batch() {
        let outcomes = distribute::<_, Boom>(Ok(vec![Ok(1)]), 2);
        let mismatch = LoadError::LengthMismatch { expected: 2, actual: 1 };
        assert_eq!(outcomes, vec![Err(mismatch.clone()), Err(mismatch)]);
    }
}
