//! Worker-group runtime: one OS thread per rank.

use super::{mesh, Communicator};
use std::panic;
use std::thread::Builder;

/// Spawn a group of `workers` threads, run `f` in each with that worker's
/// [`Communicator`], and return the per-worker results in rank order.
///
/// Workers are named `worker0`, `worker1`, ... for debuggers and panic
/// messages.  All threads are joined even if some panic; the first panic is
/// then resumed on the calling thread.
pub fn run_group<F, R>(workers: usize, f: F) -> Vec<R>
where
    F: FnOnce(Communicator) -> R + Clone + Send + 'static,
    R: Send + 'static,
{
    let mut handles = Vec::with_capacity(workers);
    for comm in mesh(workers) {
        let f = f.clone();
        let rank = comm.rank();
        let handle = Builder::new()
            .name(format!("worker{rank}"))
            .spawn(move || f(comm))
            .unwrap_or_else(|e| panic!("failed to spawn worker thread {rank}: {e}"));
        handles.push(handle);
    }

    // Insist on joining all threads even if some of them fail.
    let results: Vec<_> = handles.into_iter().map(|h| h.join()).collect();
    results
        .into_iter()
        .map(|r| r.unwrap_or_else(|payload| panic::resume_unwind(payload)))
        .collect()
}
