use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dataload_fields::{load_fn, BatchFunction, BatchResult, LoadError, Loader, LoaderOptions};
use futures::future;

#[derive(Debug, PartialEq, Eq, Clone)]
struct DummyData(String);

#[derive(Debug, PartialEq, Eq, Clone)]
struct DummyError(String);

struct DummyContext {
    map: HashMap<i64, String>,
}

/// Loads from the context map, reporting missing keys as per-key errors and recording every
/// batch it receives.
#[derive(Default)]
struct DummyDataLoader {
    batches: Arc<Mutex<Vec<Vec<i64>>>>,
}

#[async_trait]
impl BatchFunction<i64, DummyData> for DummyDataLoader {
    type Context = DummyContext;
    type Error = DummyError;

    async fn load(
        &self,
        keys: &[i64],
        context: &DummyContext,
    ) -> BatchResult<DummyData, DummyError> {
        self.batches.lock().unwrap().push(keys.to_vec());
        Ok(keys
            .iter()
            .map(|k| {
                context
                    .map
                    .get(k)
                    .cloned()
                    .map(DummyData)
                    .ok_or_else(|| DummyError(format!("no value for {k}")))
            })
            .collect())
    }
}

fn fish_context() -> DummyContext {
    let mut context = DummyContext { map: HashMap::new() };
    context.map.insert(42, "one fish".to_owned());
    context.map.insert(12, "two fish".to_owned());
    context.map.insert(5, "red fish".to_owned());
    context.map.insert(8, "blue fish".to_owned());
    context
}

fn fish(name: &str) -> Result<DummyData, LoadError<DummyError>> {
    Ok(DummyData(name.to_owned()))
}

#[tokio::test]
async fn basic_load() {
    let mut context = DummyContext { map: HashMap::new() };
    context.map.insert(42, "Foo".to_owned());

    let loader = Loader::new(DummyDataLoader::default(), context);
    assert_eq!(loader.load(42).await, Ok(DummyData("Foo".to_owned())));
}

#[tokio::test]
async fn repeated_load_hits_cache() {
    let batch_fn = DummyDataLoader::default();
    let batches = Arc::clone(&batch_fn.batches);
    let loader = Loader::new(batch_fn, fish_context());

    assert_eq!(loader.load(42).await, fish("one fish"));
    assert_eq!(loader.load(42).await, fish("one fish"));
    assert_eq!(*batches.lock().unwrap(), vec![vec![42]]);
}

#[tokio::test]
async fn basic_load_many() {
    let loader = Loader::new(DummyDataLoader::default(), fish_context());
    assert_eq!(
        loader.load_many(vec![5, 12, 8]).await,
        vec![fish("red fish"), fish("two fish"), fish("blue fish")]
    );
}

#[tokio::test]
async fn load_async() {
    let batch_fn = DummyDataLoader::default();
    let batches = Arc::clone(&batch_fn.batches);
    let loader = Loader::new(batch_fn, fish_context());

    let tuple = future::join4(
        loader.load(5),
        loader.load_many(vec![5, 42]),
        loader.load(99),
        loader.load(12),
    );

    assert_eq!(
        tuple.await,
        (
            fish("red fish"),
            vec![fish("red fish"), fish("one fish")],
            Err(LoadError::Key(DummyError("no value for 99".to_owned()))),
            fish("two fish"),
        )
    );
    // One batch, distinct keys in first-request order.
    assert_eq!(*batches.lock().unwrap(), vec![vec![5, 42, 99, 12]]);
}

#[tokio::test]
async fn local_set_tasks_share_a_batch() {
    let batch_fn = DummyDataLoader::default();
    let batches = Arc::clone(&batch_fn.batches);
    let loader = Rc::new(Loader::new(batch_fn, fish_context()));
    let local = tokio::task::LocalSet::new();

    let handles = [5, 42, 12].map(|key| {
        let loader = Rc::clone(&loader);
        local.spawn_local(async move { loader.load(key).await })
    });
    let values = local
        .run_until(async {
            let mut values = Vec::new();
            for handle in handles {
                values.push(handle.await.unwrap());
            }
            values
        })
        .await;

    assert_eq!(values, vec![fish("red fish"), fish("one fish"), fish("two fish")]);
    assert_eq!(*batches.lock().unwrap(), vec![vec![5, 42, 12]]);
}

#[tokio::test]
async fn per_key_errors_do_not_fail_siblings() {
    let loader = Loader::new(
        load_fn(|keys: Vec<char>, _: ()| async move {
            Ok(keys
                .into_iter()
                .map(|k| {
                    if k == 'b' {
                        Err(format!("bad {k}"))
                    } else {
                        Ok(k.to_ascii_uppercase())
                    }
                })
                .collect())
        }),
        (),
    );

    let (a, b, c) = future::join3(loader.load('a'), loader.load('b'), loader.load('c')).await;
    assert_eq!(a, Ok('A'));
    assert_eq!(b, Err(LoadError::Key("bad b".to_owned())));
    assert_eq!(c, Ok('C'));
}

#[tokio::test]
async fn per_key_error_is_cached() {
    let batch_fn = DummyDataLoader::default();
    let batches = Arc::clone(&batch_fn.batches);
    let loader = Loader::new(batch_fn, fish_context());

    let missing = Err(LoadError::Key(DummyError("no value for 99".to_owned())));
    assert_eq!(loader.load(99).await, missing);
    assert_eq!(loader.load(99).await, missing);
    assert_eq!(*batches.lock().unwrap(), vec![vec![99]]);
}

#[tokio::test]
async fn batch_failure_rejects_every_key_and_is_not_cached() {
    let calls = Arc::new(AtomicUsize::new(0));
    let loader = Loader::new(
        load_fn(|keys: Vec<u32>, calls: Arc<AtomicUsize>| async move {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err("connection reset".to_owned())
            } else {
                Ok(keys.into_iter().map(Ok).collect())
            }
        }),
        Arc::clone(&calls),
    );

    let (first, second) = future::join(loader.load(1), loader.load(2)).await;
    let failure = Err(LoadError::Batch("connection reset".to_owned()));
    assert_eq!((first, second), (failure.clone(), failure));

    assert_eq!(loader.load(1).await, Ok(1));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn cache_key_merges_equivalent_keys() {
    let calls = Arc::new(AtomicUsize::new(0));
    let loader = Loader::with_options(
        load_fn(|keys: Vec<String>, calls: Arc<AtomicUsize>| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>(keys.into_iter().map(|k| Ok(k.len())).collect())
        }),
        Arc::clone(&calls),
        LoaderOptions::new().cache_key(|key: &String| key.to_lowercase()),
    );

    let (upper, lower) =
        future::join(loader.load("Alice".to_owned()), loader.load("alice".to_owned())).await;
    assert_eq!((upper, lower), (Ok(5), Ok(5)));
    assert_eq!(loader.load("ALICE".to_owned()).await, Ok(5));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn disabled_cache_still_dedupes_within_a_batch() {
    let batches = Arc::new(Mutex::new(Vec::new()));
    let loader = Loader::with_options(
        load_fn(|keys: Vec<u8>, batches: Arc<Mutex<Vec<Vec<u8>>>>| async move {
            batches.lock().unwrap().push(keys.clone());
            Ok::<_, String>(keys.into_iter().map(Ok).collect())
        }),
        Arc::clone(&batches),
        LoaderOptions::new().cache(false),
    );
    assert!(!loader.is_cache_enabled());

    let (a, b) = future::join(loader.load(7), loader.load(7)).await;
    assert_eq!((a, b), (Ok(7), Ok(7)));
    assert_eq!(loader.load(7).await, Ok(7));
    assert_eq!(*batches.lock().unwrap(), vec![vec![7], vec![7]]);
}

#[tokio::test]
async fn max_batch_size_splits_batches() {
    let batches = Arc::new(Mutex::new(Vec::new()));
    let loader = Loader::with_options(
        load_fn(|keys: Vec<u8>, batches: Arc<Mutex<Vec<Vec<u8>>>>| async move {
            batches.lock().unwrap().push(keys.clone());
            Ok::<_, String>(keys.into_iter().map(|k| Ok(k * 10)).collect())
        }),
        Arc::clone(&batches),
        LoaderOptions::new().max_batch_size(2),
    );

    let values = loader.load_many(vec![1, 2, 3, 4, 5]).await;
    assert_eq!(values, vec![Ok(10), Ok(20), Ok(30), Ok(40), Ok(50)]);

    let mut batches = batches.lock().unwrap().clone();
    batches.sort();
    assert_eq!(batches, vec![vec![1, 2], vec![3, 4], vec![5]]);
}

#[tokio::test]
async fn short_result_list_is_reported_to_every_key() {
    let loader = Loader::new(
        load_fn(|_keys: Vec<u8>, _: ()| async { Ok::<_, String>(vec![Ok(1u8)]) }),
        (),
    );

    let values = loader.load_many(vec![1, 2]).await;
    let mismatch = Err(LoadError::LengthMismatch { expected: 2, actual: 1 });
    assert_eq!(values, vec![mismatch.clone(), mismatch]);
}

#[tokio::test]
async fn prime_and_clear() {
    let batch_fn = DummyDataLoader::default();
    let batches = Arc::clone(&batch_fn.batches);
    let loader = Loader::new(batch_fn, fish_context());

    loader.prime(5, DummyData("primed fish".to_owned()));
    assert_eq!(loader.load(5).await, fish("primed fish"));
    assert!(batches.lock().unwrap().is_empty());

    loader.clear(5);
    assert_eq!(loader.load(5).await, fish("red fish"));

    assert_eq!(loader.load(12).await, fish("two fish"));
    loader.prime_many(vec![
        (12, DummyData("not overwritten".to_owned())),
        (8, DummyData("primed".to_owned())),
    ]);
    loader.clear_many(vec![8]);
    assert_eq!(loader.load_many(vec![12, 8]).await, vec![fish("two fish"), fish("blue fish")]);

    loader.clear_all();
    assert_eq!(loader.load(5).await, fish("red fish"));
    assert_eq!(*batches.lock().unwrap(), vec![vec![5], vec![12], vec![8], vec![5]]);
}
