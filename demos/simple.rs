use std::collections::HashMap;

use async_trait::async_trait;
use dataload_fields::{BatchFunction, BatchResult, LoadError, Loader};

// Empty functor that implements the BatchFunction trait. For this example, it
// trivially loads values from some HashMap.
struct MyBatchFn;

#[async_trait]
impl BatchFunction<i64, String> for MyBatchFn {
    type Context = HashMap<i64, String>;
    type Error = String;

    async fn load(&self, keys: &[i64], context: &Self::Context) -> BatchResult<String, String> {
        Ok(keys
            .iter()
            .map(|k| context.get(k).cloned().ok_or_else(|| format!("no movie numbered {k}")))
            .collect())
    }
}

#[tokio::main]
async fn main() {
    let mut context = HashMap::new();
    context.insert(2001, "a space odyssey".to_owned());
    context.insert(7, "samurai".to_owned());
    context.insert(12, "angry men".to_owned());

    let loader = Loader::new(MyBatchFn, context);

    assert_eq!(loader.load(7).await.as_deref(), Ok("samurai"));
    assert_eq!(loader.load(15).await, Err(LoadError::Key("no movie numbered 15".to_owned())));

    assert_eq!(
        loader
            .load_many(vec![12, 2010, 2001])
            .await
            .into_iter()
            .map(Result::ok)
            .collect::<Vec<_>>(),
        vec![Some("angry men".to_owned()), None, Some("a space odyssey".to_owned())]
    );
}
