//! Fan-out of key byte jobs over a fixed pool of worker threads.
//!
//! Positions are pre-loaded in a shared [`JobQueue`]. Each worker pops one position at a time,
//! solves it and sends its [`ByteResult`] back to the calling thread, which hands results to a
//! [`Reporter`] in completion order.
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use rayon::ThreadPoolBuilder;
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};
use tracing::{debug, info, warn};

use crate::{
    Error,
    config::Config,
    distinguishers::cpa::{ByteResult, KeyByteSolver},
    report::Reporter,
    trace::BLOCK_SIZE,
};

/// Outcome of a [`JobQueue::pop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pop {
    /// A position to solve
    Job(usize),
    /// No position left, the worker can stop
    Empty,
    /// The wait timed out although positions remain
    Starved,
}

/// Multi-consumer queue of key byte positions. Every position is popped exactly once.
///
/// The queue counts the positions it still owes its consumers, including the ones a producer
/// has announced but not sent yet. That count, not the channel alone, decides emptiness.
pub struct JobQueue {
    receiver: Receiver<usize>,
    remaining: AtomicUsize,
}

impl JobQueue {
    pub fn new<I: IntoIterator<Item = usize>>(positions: I) -> Self {
        let positions: Vec<usize> = positions.into_iter().collect();
        let (sender, queue) = Self::open(positions.len());
        for position in positions {
            // The receiver is alive, sending cannot fail
            let _ = sender.send(position);
        }

        queue
    }

    /// Creates a queue expecting `expected` positions, fed through the returned sender.
    pub(crate) fn open(expected: usize) -> (Sender<usize>, Self) {
        let (sender, receiver) = unbounded();
        let queue = Self {
            receiver,
            remaining: AtomicUsize::new(expected),
        };

        (sender, queue)
    }

    /// Waits at most `timeout` for a position.
    ///
    /// A timeout alone does not mean the queue is drained: emptiness is checked after it.
    pub fn pop(&self, timeout: Duration) -> Pop {
        match self.receiver.recv_timeout(timeout) {
            Ok(position) => {
                // Saturating: a producer may send more than it announced
                let _ = self
                    .remaining
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
                Pop::Job(position)
            }
            Err(RecvTimeoutError::Disconnected) => Pop::Empty,
            Err(RecvTimeoutError::Timeout) if self.is_empty() => Pop::Empty,
            Err(RecvTimeoutError::Timeout) => Pop::Starved,
        }
    }

    /// Returns the number of positions not yet popped.
    pub fn len(&self) -> usize {
        self.remaining.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0 && self.receiver.is_empty()
    }
}

/// Stops workers from drawing new positions. Jobs already running complete normally.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clears the flag, returning whether it was set.
    fn reset(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

/// Results of a [`WorkScheduler::run`].
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Results in completion order
    pub results: Vec<ByteResult>,
    /// Number of times a worker timed out on a non-empty queue
    pub starvations: usize,
    /// Wall-clock duration of the run
    pub elapsed: Duration,
}

pub struct WorkScheduler {
    config: Config,
    cancel: CancelHandle,
}

impl WorkScheduler {
    pub fn new(config: Config) -> Result<Self, Error> {
        config.validate()?;

        Ok(Self {
            config,
            cancel: CancelHandle::default(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns a handle cancelling the positions not yet drawn by the workers.
    ///
    /// A cancellation applies to the run in progress, or to the next run if none is. The flag is
    /// cleared when that run returns, so the scheduler can be used again afterwards.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Solves every position of `positions` with `config.workers` threads.
    ///
    /// Positions are validated before any work is dispatched: each must be lower than
    /// [`BLOCK_SIZE`] and appear once.
    pub fn run<F, R>(
        &self,
        solver: &KeyByteSolver<F>,
        positions: &[usize],
        reporter: &mut R,
    ) -> Result<RunSummary, Error>
    where
        F: Fn(u8, u8) -> u8 + Sync,
        R: Reporter + ?Sized,
    {
        validate_positions(positions)?;

        let workers = self.config.workers;
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("cpa-worker-{i}"))
            .build()?;

        let queue = JobQueue::new(positions.iter().copied());
        let starvations = AtomicUsize::new(0);
        let (result_tx, result_rx) = unbounded();
        let start = Instant::now();
        info!(jobs = positions.len(), workers, "dispatching key byte jobs");

        let mut results = Vec::with_capacity(positions.len());
        pool.in_place_scope(|scope| {
            for worker in 0..workers {
                let result_tx = result_tx.clone();
                let (queue, starvations, cancel) = (&queue, &starvations, &self.cancel);
                let timeout = self.config.queue_timeout;
                scope.spawn(move |_| {
                    while !cancel.is_cancelled() {
                        match queue.pop(timeout) {
                            Pop::Job(position) => {
                                let job_start = Instant::now();
                                let result = solver.solve(position);
                                debug!(worker, position, elapsed = ?job_start.elapsed(), "job done");
                                if result_tx.send(result).is_err() {
                                    break;
                                }
                            }
                            Pop::Empty => break,
                            Pop::Starved => {
                                starvations.fetch_add(1, Ordering::Relaxed);
                                warn!(
                                    worker,
                                    remaining = queue.len(),
                                    ?timeout,
                                    "timed out waiting on a non-empty job queue, retrying"
                                );
                            }
                        }
                    }
                });
            }
            drop(result_tx);

            for result in result_rx.iter() {
                reporter.report(&result, start.elapsed());
                results.push(result);
            }
        });

        let summary = RunSummary {
            results,
            starvations: starvations.into_inner(),
            elapsed: start.elapsed(),
        };
        if self.cancel.reset() {
            warn!(
                completed = summary.results.len(),
                jobs = positions.len(),
                "run cancelled"
            );
        }
        info!(
            completed = summary.results.len(),
            elapsed = ?summary.elapsed,
            "key byte jobs finished"
        );

        Ok(summary)
    }
}

fn validate_positions(positions: &[usize]) -> Result<(), Error> {
    let mut seen = [false; BLOCK_SIZE];
    for &position in positions {
        if position >= BLOCK_SIZE {
            return Err(Error::InvalidPosition(position));
        }
        if seen[position] {
            return Err(Error::DuplicatePosition(position));
        }
        seen[position] = true;
    }

    Ok(())
}
