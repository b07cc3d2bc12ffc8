use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use crate::fit::Trainable;
use crate::error::{Error, Result};

/// Builds the worker pool of a training run, or None when n_jobs <= 1 and the
/// expectation step runs on the calling thread.
pub fn pool(n_jobs : usize) -> Result<Option<ThreadPool>> {
    if n_jobs <= 1 {
        return Ok(None);
    }
    ThreadPoolBuilder::new()
        .num_threads(n_jobs)
        .build()
        .map(Some)
        .map_err(|e| Error::ModelConfiguration(format!("Failed to create thread pool: {}", e)) )
}

/// Contiguous shard boundaries: n_shards ranges covering 0..n, the first n % n_shards
/// one element longer than the rest. Empty shards are omitted.
pub fn shards(n : usize, n_shards : usize) -> Vec<std::ops::Range<usize>> {
    let n_shards = n_shards.max(1).min(n.max(1));
    let base = n / n_shards;
    let extra = n % n_shards;
    let mut ranges = Vec::with_capacity(n_shards);
    let mut start = 0;
    for s in 0..n_shards {
        let len = base + if s < extra { 1 } else { 0 };
        if len > 0 {
            ranges.push(start..start + len);
        }
        start += len;
    }
    ranges
}

/// Clears the accumulators of model, runs the expectation step over items and
/// returns the total log-likelihood. With a pool, each shard is processed by a
/// private accumulator copy on a worker thread; the copies are absorbed back into
/// model in shard order once every worker has finished, so results do not depend
/// on thread scheduling.
pub fn accumulate<M>(
    model : &mut M,
    items : &[M::Item],
    weights : &[f64],
    pool : Option<&ThreadPool>
) -> Result<f64>
where
    M : Trainable
{
    model.reset();
    let pool = match pool {
        Some(pool) if items.len() > 1 => pool,
        _ => return model.expectation(items, weights)
    };
    let ranges = shards(items.len(), pool.current_num_threads());
    let shared : &M = model;
    let results : Vec<Result<(M, f64)>> = pool.install(|| {
        ranges.par_iter()
            .map(|r| {
                let mut acc = shared.accumulator();
                let ll = acc.expectation(&items[r.clone()], &weights[r.clone()])?;
                Ok((acc, ll))
            })
            .collect()
    });
    let mut total = 0.0;
    for res in results {
        let (acc, ll) = res?;
        model.absorb(acc)?;
        total += ll;
    }
    Ok(total)
}

#[test]
fn shards_cover_range_in_order() {
    let r = shards(10, 3);
    assert_eq!(r, vec![0..4, 4..7, 7..10]);
    assert_eq!(shards(2, 4), vec![0..1, 1..2]);
    assert_eq!(shards(0, 3), Vec::<std::ops::Range<usize>>::new());
}
