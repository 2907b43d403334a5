//! In-process message-passing fabric.
//!
//! A worker group is a full mesh of FIFO channels, one per ordered worker
//! pair.  Each worker owns a [`Communicator`] exposing
//! MPI-style collectives: barrier, broadcast, all-reduce, inclusive scan and
//! gather, plus point-to-point send/receive.  Reductions fold at rank 0 in
//! rank order and broadcast the result, so every collective is deterministic
//! for a fixed input.
//!
//! All workers must execute the same sequence of collectives in program
//! order; the fabric checks payload types at each receive and reports a
//! diverged peer as [`CommError::OutOfStep`].  A disconnected peer (its
//! thread panicked) surfaces as [`CommError::Disconnected`]; both are fatal.

mod runtime;
pub use runtime::run_group;

use crate::CommError;
use crossbeam::channel::{unbounded, Receiver, Sender};
use std::any::Any;

type Message = Box<dyn Any + Send>;

/// One worker's endpoint of the group fabric.
///
/// Cheap to clone; clones share the underlying channels and must only be used
/// from the owning worker's thread (workers are single-threaded by design).
#[derive(Clone)]
pub struct Communicator {
    rank: usize,
    /// `senders[d]` feeds worker `d`'s inbox from this worker.
    senders: Vec<Sender<Message>>,
    /// `receivers[s]` is this worker's inbox fed by worker `s`.
    receivers: Vec<Receiver<Message>>,
}

/// Build the channel mesh for `workers` ranks.
///
/// Returns one [`Communicator`] per rank, in rank order.
pub fn mesh(workers: usize) -> Vec<Communicator> {
    assert!(workers > 0, "worker group must not be empty");

    // channels[s][d] connects s -> d
    let mut senders: Vec<Vec<Sender<Message>>> = Vec::with_capacity(workers);
    let mut receivers: Vec<Vec<Option<Receiver<Message>>>> =
        (0..workers).map(|_| (0..workers).map(|_| None).collect()).collect();

    for s in 0..workers {
        let mut row = Vec::with_capacity(workers);
        for inbox in receivers.iter_mut() {
            let (tx, rx) = unbounded();
            row.push(tx);
            inbox[s] = Some(rx);
        }
        senders.push(row);
    }

    senders
        .into_iter()
        .zip(receivers)
        .enumerate()
        .map(|(rank, (senders, inbox))| Communicator {
            rank,
            senders,
            receivers: inbox.into_iter().map(|rx| rx.expect("mesh channel")).collect(),
        })
        .collect()
}

impl Communicator {
    /// This worker's rank within the group.
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Number of workers in the group.
    pub fn num_workers(&self) -> usize {
        self.senders.len()
    }

    /// Point-to-point send of a single value to `dst`.
    pub fn send_to<T: Send + 'static>(&self, dst: usize, value: T) -> Result<(), CommError> {
        debug_assert!(dst < self.num_workers());
        self.senders[dst]
            .send(Box::new(value))
            .map_err(|_| CommError::Disconnected(dst))
    }

    /// Point-to-point receive of a single value from `src`.  Blocks.
    pub fn recv_from<T: Send + 'static>(&self, src: usize) -> Result<T, CommError> {
        debug_assert!(src < self.num_workers());
        let msg = self.receivers[src]
            .recv()
            .map_err(|_| CommError::Disconnected(src))?;
        msg.downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| CommError::OutOfStep(src))
    }

    /// Block until every worker in the group has arrived.
    pub fn barrier(&self) -> Result<(), CommError> {
        self.all_reduce((), |(), ()| ())
    }

    /// Distribute `root`'s value to every worker.  The value passed by
    /// non-root workers is ignored.
    pub fn broadcast<T: Clone + Send + 'static>(
        &self,
        root: usize,
        value: T,
    ) -> Result<T, CommError> {
        debug_assert!(root < self.num_workers());
        if self.rank == root {
            for dst in 0..self.num_workers() {
                if dst != root {
                    self.send_to(dst, value.clone())?;
                }
            }
            Ok(value)
        } else {
            self.recv_from(root)
        }
    }

    /// Reduce every worker's value with `op` and hand the result to everyone.
    ///
    /// The fold happens at rank 0 in rank order, so non-commutative operators
    /// still produce identical results on every worker.
    pub fn all_reduce<T, F>(&self, value: T, op: F) -> Result<T, CommError>
    where
        T: Clone + Send + 'static,
        F: Fn(T, T) -> T,
    {
        if self.rank == 0 {
            let mut acc = value;
            for src in 1..self.num_workers() {
                acc = op(acc, self.recv_from(src)?);
            }
            for dst in 1..self.num_workers() {
                self.send_to(dst, acc.clone())?;
            }
            Ok(acc)
        } else {
            self.send_to(0, value)?;
            self.recv_from(0)
        }
    }

    /// Inclusive prefix sum over 64-bit integers, in rank order.
    pub fn scan_sum(&self, value: i64) -> Result<i64, CommError> {
        if self.rank == 0 {
            let mut acc = value;
            let mut prefixes = Vec::with_capacity(self.num_workers());
            prefixes.push(acc);
            for src in 1..self.num_workers() {
                acc += self.recv_from::<i64>(src)?;
                prefixes.push(acc);
            }
            for dst in 1..self.num_workers() {
                self.send_to(dst, prefixes[dst])?;
            }
            Ok(prefixes[0])
        } else {
            self.send_to(0, value)?;
            self.recv_from(0)
        }
    }

    /// Collect every worker's value at `root`, in rank order.  Returns
    /// `Some(values)` at the root and `None` elsewhere.
    pub fn gather<T: Send + 'static>(
        &self,
        root: usize,
        value: T,
    ) -> Result<Option<Vec<T>>, CommError> {
        debug_assert!(root < self.num_workers());
        if self.rank == root {
            let mut values = Vec::with_capacity(self.num_workers());
            for src in 0..self.num_workers() {
                if src == root {
                    values.push(None);
                } else {
                    values.push(Some(self.recv_from(src)?));
                }
            }
            values[root] = Some(value);
            Ok(Some(values.into_iter().map(|v| v.expect("gather slot")).collect()))
        } else {
            self.send_to(root, value)?;
            Ok(None)
        }
    }

    /// Minimum of a double across the group.
    pub fn all_reduce_min(&self, value: f64) -> Result<f64, CommError> {
        self.all_reduce(value, |a, b| if b.total_cmp(&a).is_lt() { b } else { a })
    }

    /// Maximum of a double across the group.
    pub fn all_reduce_max(&self, value: f64) -> Result<f64, CommError> {
        self.all_reduce(value, |a, b| if b.total_cmp(&a).is_gt() { b } else { a })
    }

    /// Sum of a 64-bit integer across the group.
    pub fn all_reduce_sum(&self, value: i64) -> Result<i64, CommError> {
        self.all_reduce(value, |a, b| a + b)
    }

    /// Component-wise minimum of fixed-length double arrays.
    pub fn all_reduce_vec_min(&self, values: Vec<f64>) -> Result<Vec<f64>, CommError> {
        self.all_reduce(values, |a, b| elementwise(a, b, f64::min))
    }

    /// Component-wise maximum of fixed-length double arrays.
    pub fn all_reduce_vec_max(&self, values: Vec<f64>) -> Result<Vec<f64>, CommError> {
        self.all_reduce(values, |a, b| elementwise(a, b, f64::max))
    }

    /// Component-wise sum of fixed-length integer arrays.
    pub fn all_reduce_vec_sum(&self, values: Vec<i64>) -> Result<Vec<i64>, CommError> {
        self.all_reduce(values, |a, b| elementwise(a, b, |x, y| x + y))
    }
}

fn elementwise<T: Copy, F: Fn(T, T) -> T>(mut a: Vec<T>, b: Vec<T>, op: F) -> Vec<T> {
    debug_assert_eq!(a.len(), b.len(), "collective buffer length mismatch");
    for (x, y) in a.iter_mut().zip(b) {
        *x = op(*x, y);
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_reduce_sum_and_barrier() {
        let sums = run_group(4, |comm| {
            comm.barrier().unwrap();
            comm.all_reduce_sum(comm.rank() as i64 + 1).unwrap()
        });
        assert_eq!(sums, vec![10, 10, 10, 10]);
    }

    #[test]
    fn broadcast_from_nonzero_root() {
        let got = run_group(3, |comm| {
            let value = if comm.rank() == 2 { 42u64 } else { 0 };
            comm.broadcast(2, value).unwrap()
        });
        assert_eq!(got, vec![42, 42, 42]);
    }

    #[test]
    fn scan_is_inclusive_and_rank_ordered() {
        let prefixes = run_group(4, |comm| comm.scan_sum(comm.rank() as i64 + 1).unwrap());
        assert_eq!(prefixes, vec![1, 3, 6, 10]);
    }

    #[test]
    fn gather_collects_in_rank_order() {
        let results = run_group(3, |comm| comm.gather(0, comm.rank() * 10).unwrap());
        assert_eq!(results[0], Some(vec![0, 10, 20]));
        assert_eq!(results[1], None);
        assert_eq!(results[2], None);
    }

    #[test]
    fn vector_reductions_are_elementwise() {
        let results = run_group(2, |comm| {
            let mine = if comm.rank() == 0 {
                vec![1.0, 9.0, 5.0]
            } else {
                vec![4.0, 2.0, 5.0]
            };
            let min = comm.all_reduce_vec_min(mine.clone()).unwrap();
            let max = comm.all_reduce_vec_max(mine).unwrap();
            let sum = comm
                .all_reduce_vec_sum(vec![comm.rank() as i64; 3])
                .unwrap();
            (min, max, sum)
        });
        for (min, max, sum) in results {
            assert_eq!(min, vec![1.0, 2.0, 5.0]);
            assert_eq!(max, vec![4.0, 9.0, 5.0]);
            assert_eq!(sum, vec![1, 1, 1]);
        }
    }

    #[test]
    fn single_worker_group_is_trivial() {
        let out = run_group(1, |comm| {
            assert_eq!(comm.num_workers(), 1);
            comm.barrier().unwrap();
            comm.all_reduce_max(3.5).unwrap()
        });
        assert_eq!(out, vec![3.5]);
    }
}
