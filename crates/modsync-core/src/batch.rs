use std::future::Future;

use futures_util::future::join_all;

/// Process `items` concurrently in chunks of `batch_size`, yielding to the
/// scheduler between chunks.
///
/// Results come back in input order. `on_progress` receives `(done, total)`
/// after each chunk. A batch size of zero is treated as one.
pub async fn process_in_batches<T, R, F, Fut, P>(
    items: &[T],
    batch_size: usize,
    processor: F,
    mut on_progress: P,
) -> Vec<R>
where
    F: Fn(&T, usize) -> Fut,
    Fut: Future<Output = R>,
    P: FnMut(usize, usize),
{
    let batch_size = batch_size.max(1);
    let total = items.len();
    let mut results = Vec::with_capacity(total);

    for (chunk_index, chunk) in items.chunks(batch_size).enumerate() {
        let offset = chunk_index * batch_size;
        let outputs = join_all(
            chunk
                .iter()
                .enumerate()
                .map(|(index, item)| processor(item, offset + index)),
        )
        .await;
        results.extend(outputs);

        on_progress(results.len(), total);

        if results.len() < total {
            tokio::task::yield_now().await;
        }
    }

    results
}
