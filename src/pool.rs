use std::future::Future;

use anyhow::Context as _;

/// Runs `task` over `items` with at most `concurrency` in flight. A finished task
/// immediately makes room for the next queued item. Results keep input order.
/// `on_done(done, total)` fires after every completion.
pub async fn map_bounded<I, T, F, Fut>(
    items: Vec<I>,
    concurrency: usize,
    task: F,
    mut on_done: impl FnMut(usize, usize),
) -> anyhow::Result<Vec<T>>
where
    F: Fn(I) -> Fut,
    Fut: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let total = items.len();
    if total == 0 {
        return Ok(Vec::new());
    }

    let concurrency = concurrency.max(1).min(total);
    let mut queue = items.into_iter().enumerate();
    let mut join_set = tokio::task::JoinSet::new();
    let mut results: Vec<Option<T>> = std::iter::repeat_with(|| None).take(total).collect();
    let mut done = 0usize;

    loop {
        while join_set.len() < concurrency {
            let Some((idx, item)) = queue.next() else {
                break;
            };
            let fut = task(item);
            join_set.spawn(async move { (idx, fut.await) });
        }

        let Some(joined) = join_set.join_next().await else {
            break;
        };
        let (idx, value) = joined.context("join pool task")?;
        results[idx] = Some(value);
        done += 1;
        on_done(done, total);
    }

    results
        .into_iter()
        .enumerate()
        .map(|(idx, value)| value.ok_or_else(|| anyhow::anyhow!("pool task {idx} produced no result")))
        .collect()
}
