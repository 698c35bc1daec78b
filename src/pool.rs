//! Bounded worker pool for per-session fan-out.
//!
//! Phases hand independent sub-tasks to a fixed number of worker threads and
//! get results back in input order, so parallelism is never observable in
//! phase output. Workers pull indices from a shared counter; results carry
//! their index and are re-sorted after the join.
use std::panic;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

/// Apply `task` to every item on up to `workers` threads, returning results
/// in input order.
pub fn map_bounded<T, R, F>(items: &[T], workers: usize, task: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(usize, &T) -> R + Sync,
{
    if items.is_empty() {
        return Vec::new();
    }
    let workers = workers.clamp(1, items.len());
    let next = AtomicUsize::new(0);
    let mut indexed: Vec<(usize, R)> = thread::scope(|scope| {
        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            handles.push(scope.spawn(|| {
                let mut out = Vec::new();
                loop {
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    if index >= items.len() {
                        break;
                    }
                    out.push((index, task(index, &items[index])));
                }
                out
            }));
        }
        let mut collected = Vec::with_capacity(items.len());
        for handle in handles {
            match handle.join() {
                Ok(results) => collected.extend(results),
                Err(payload) => panic::resume_unwind(payload),
            }
        }
        collected
    });
    indexed.sort_by_key(|(index, _)| *index);
    indexed.into_iter().map(|(_, result)| result).collect()
}
