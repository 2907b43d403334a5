//! Distributed weighted reservoir sampling.
//!
//! This crate maintains a weighted reservoir sample of fixed size `k` across a
//! group of single-threaded workers that consume an unbounded stream of
//! weighted items in synchronous batches.  Every item ever seen is kept with
//! probability proportional to its weight (Efraimidis-Spirakis A-Res in its
//! exponential-clock form).
//!
//! The two layers that make this work at scale:
//!
//! * [`tree::OrderStatTree`] — a B+ tree whose inner nodes cache subtree sizes,
//!   giving logarithmic rank queries, split at rank or key, and join with a
//!   disjoint tree.  Each worker holds its candidate reservoir in one.
//! * [`select`] — a distributed approximate multi-selection protocol that
//!   locates the global rank-`k` splitter without gathering any data, probing
//!   several pivots per round and evaluating them all with a single packed
//!   reduction.
//!
//! [`engine::Reservoir`] ties the two together: per batch it converts weights
//! into exponential keys (skipping items that cannot survive the current
//! admission threshold), inserts the survivors, runs the selection, trims the
//! tree back to `k`, and max-reduces the new threshold.
//!
//! Workers communicate through [`comm::Communicator`], an in-process
//! message-passing fabric with MPI-style collectives; [`comm::run_group`]
//! spawns a worker group on OS threads.

mod error;
pub use error::{CommError, Error};

pub mod comm;
pub mod engine;
pub mod input;
pub mod select;
pub mod stats;
pub mod tree;

pub use comm::{run_group, Communicator};
pub use engine::{GatherReservoir, Reservoir};
pub use select::{AmsSelect, AmsSelectMulti, Selector, Splitter};
pub use tree::OrderStatTree;
