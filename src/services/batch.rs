//! Concurrent batch executor: generic fan-out/fan-in over a bounded worker
//! pool.
//!
//! Workers run blocking remote calls and send their outcomes over a channel;
//! the calling thread is the single aggregating consumer and reports progress
//! as completions arrive. Nothing is committed to storage here — callers
//! receive the full outcome list and commit it in one sequential pass, so the
//! store never observes a torn batch. Worker functions are expected to
//! convert their own failures into safe default outcomes; the executor never
//! loses an outcome.

use anyhow::{Context, Result};
use rayon::ThreadPoolBuilder;
use std::sync::mpsc;

pub struct BatchExecutor {
    workers: usize,
}

impl BatchExecutor {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    /// Run `worker` over every item with up to the configured concurrency.
    ///
    /// Returns exactly one outcome per input item, in completion order.
    /// `progress` is invoked on the calling thread with
    /// `(completed, total)` each time a worker finishes.
    pub fn run<T, O, F, P>(&self, items: Vec<T>, worker: F, progress: P) -> Result<Vec<O>>
    where
        T: Send,
        O: Send,
        F: Fn(T) -> O + Sync,
        P: FnMut(usize, usize),
    {
        let total = items.len();
        if total == 0 {
            return Ok(Vec::new());
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .context("failed to build batch worker pool")?;

        let (tx, rx) = mpsc::channel();
        let worker = &worker;
        let mut outcomes = Vec::with_capacity(total);
        let mut progress = progress;

        pool.in_place_scope(|scope| {
            for item in items {
                let tx = tx.clone();
                scope.spawn(move |_| {
                    let outcome = worker(item);
                    // Receiver outlives the scope; send cannot fail.
                    let _ = tx.send(outcome);
                });
            }
            drop(tx);
            for (done, outcome) in rx.iter().enumerate() {
                outcomes.push(outcome);
                progress(done + 1, total);
            }
        });

        Ok(outcomes)
    }
}
