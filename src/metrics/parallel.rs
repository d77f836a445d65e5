//! Row-interleaved parallel sweeps.
//!
//! A sweep over window rows is split across `N` workers: worker `i` takes
//! rows `i, i + N, i + 2N, ...`. Every worker returns a partial result and
//! the partials are merged in worker order, so the outcome only depends on
//! `N` through floating-point summation order.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

use crate::error::{Error, Result};

/// The rows one worker is responsible for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowPartition {
    offset: usize,
    interleave: usize,
}

impl RowPartition {
    /// Worker `offset` of `interleave`.
    pub fn new(offset: usize, interleave: usize) -> Self {
        assert!(offset < interleave, "worker {} of {}", offset, interleave);
        Self { offset, interleave }
    }

    /// Every row.
    pub fn all() -> Self {
        Self::new(0, 1)
    }

    /// Rows of `0..limit` assigned to this worker.
    pub fn rows(self, limit: usize) -> impl Iterator<Item = usize> {
        (self.offset..limit).step_by(self.interleave)
    }
}

/// A partial result that can absorb another one.
pub trait Partial: Default + Send {
    fn merge(&mut self, other: Self);
}

/// A fixed number of workers for the sweeps of one comparison.
///
/// With one worker everything runs on the calling thread. Otherwise a
/// dedicated pool of exactly that many threads lives as long as this value.
pub struct Workers {
    count: usize,
    pool: Option<ThreadPool>,
}

impl Workers {
    pub fn new(count: usize) -> Result<Self> {
        if count == 0 {
            return Err(Error::invalid("worker count must be at least 1"));
        }
        let pool = if count > 1 {
            debug!(count, "starting worker pool");
            Some(
                ThreadPoolBuilder::new()
                    .num_threads(count)
                    .thread_name(|i| format!("wavemetric-{i}"))
                    .build()?,
            )
        } else {
            None
        };
        Ok(Self { count, pool })
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Run `sweep` once per worker and merge the partials in worker order.
    pub fn run<P, F>(&self, sweep: F) -> P
    where
        P: Partial,
        F: Fn(RowPartition) -> P + Sync,
    {
        let partials: Vec<P> = match &self.pool {
            None => vec![sweep(RowPartition::all())],
            Some(pool) => pool.install(|| {
                (0..self.count)
                    .into_par_iter()
                    .map(|i| sweep(RowPartition::new(i, self.count)))
                    .collect()
            }),
        };
        partials.into_iter().fold(P::default(), |mut acc, p| {
            acc.merge(p);
            acc
        })
    }
}

impl std::fmt::Debug for Workers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workers").field("count", &self.count).finish()
    }
}
