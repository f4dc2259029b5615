//! A small fixed-size worker pool for chunk compression/decompression.
//!
//! Jobs are dispatched in order but may complete out of order; a
//! reorder buffer on the receiving side restores chunk-number order
//! before anything touches disk, since shard layout must exactly match
//! chunk-production order.

use std::collections::BTreeMap;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

/// Run `work` over `jobs` using up to `workers` threads, yielding
/// results in the same order as the input (not the order completed).
/// `workers <= 1` runs sequentially on the calling thread.
pub fn map_ordered<T, R, F>(jobs: Vec<T>, workers: usize, work: F) -> Vec<R>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> R + Send + Sync + 'static,
{
    if workers <= 1 || jobs.len() <= 1 {
        return jobs.into_iter().map(work).collect();
    }

    let total = jobs.len();
    let work = Arc::new(work);
    let job_queue = Arc::new(Mutex::new(jobs.into_iter().enumerate()));
    let (result_tx, result_rx) = mpsc::channel::<(usize, R)>();

    let mut handles = Vec::with_capacity(workers);
    for _ in 0..workers.min(total) {
        let job_queue = Arc::clone(&job_queue);
        let work = Arc::clone(&work);
        let result_tx = result_tx.clone();

        handles.push(thread::spawn(move || loop {
            let next = job_queue.lock().expect("job queue poisoned").next();
            match next {
                Some((index, job)) => {
                    let result = work(job);
                    if result_tx.send((index, result)).is_err() {
                        return;
                    }
                }
                None => return,
            }
        }));
    }
    drop(result_tx);

    let mut ordered: BTreeMap<usize, R> = BTreeMap::new();
    for (index, result) in result_rx {
        ordered.insert(index, result);
    }

    for handle in handles {
        let _ = handle.join();
    }

    ordered.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_order_with_multiple_workers() {
        let jobs: Vec<u32> = (0..50).collect();
        let results = map_ordered(jobs.clone(), 4, |n| n * 2);
        let expected: Vec<u32> = jobs.iter().map(|n| n * 2).collect();
        assert_eq!(results, expected);
    }

    #[test]
    fn single_worker_is_sequential() {
        let jobs: Vec<u32> = (0..10).collect();
        let results = map_ordered(jobs.clone(), 1, |n| n + 1);
        assert_eq!(results, vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let results: Vec<u32> = map_ordered(Vec::new(), 4, |n: u32| n);
        assert!(results.is_empty());
    }
}
