//! Fixed-size pool of worker threads fanning jobs out from one channel and results into another.
//!
//! Workers pull [`Job`]s from a shared input channel until it is closed and drained, pass each
//! to the processing function, and push a [`JobResult`] for every job into a shared output
//! channel. Results arrive in no particular order and are correlated by job id.
//!
//! The pool never closes either channel. Whoever feeds the input closes it once all jobs are
//! submitted, and whoever owns the output closes it after [`RunningPool::join`] has confirmed
//! every worker exited. [`run_batch`] does both.
//!
//! ```
//! use sluice::pool::{run_batch, PoolConfig};
//!
//! let mut results = run_batch(
//!     PoolConfig::default().with_workers(4),
//!     0..10u64,
//!     |job| Ok(job.payload * job.payload),
//! )
//! .unwrap();
//! results.sort_by_key(|result| result.job_id);
//! assert_eq!(results[9].outcome, Ok(81));
//! ```

use crate::{channel, Receiver, Sender};
use std::{
    any::Any,
    io,
    num::NonZeroUsize,
    panic::{catch_unwind, resume_unwind, AssertUnwindSafe},
    sync::Arc,
    thread::{self, JoinHandle},
};
use thiserror::Error;


/// Unit of work submitted to a pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job<P> {
    /// Identifier to correlate the job with its result
    pub id: u64,
    pub payload: P,
}

/// Result of processing one [`Job`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult<R> {
    /// Id of the job this is the result of
    pub job_id: u64,
    /// Value returned by the processing function, or how it failed
    pub outcome: Result<R, ProcessingError>,
}

/// Failure of the processing function on a single job
///
/// These are data carried in a [`JobResult`], and never stop the pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessingError {
    /// The processing function returned an error
    #[error("job {job_id} failed: {message}")]
    Failed { job_id: u64, message: String },
    /// The processing function panicked
    #[error("job {job_id} panicked: {message}")]
    Panicked { job_id: u64, message: String },
}

impl ProcessingError {
    /// Id of the job which failed
    pub fn job_id(&self) -> u64 {
        match self {
            ProcessingError::Failed { job_id, .. } => *job_id,
            ProcessingError::Panicked { job_id, .. } => *job_id,
        }
    }
}

/// Error constructing or starting a pool
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("worker pool configured with zero workers")]
    NoWorkers,
    #[error("failed to spawn pool thread")]
    Spawn(#[source] io::Error),
}


/// Worker pool configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of worker threads. Must be at least 1.
    pub workers: usize,
    /// Prefix for worker thread names, which are suffixed with the worker index
    pub thread_name: String,
    /// Capacity of the job channel created by [`run_batch`]
    pub input_capacity: usize,
    /// Capacity of the result channel created by [`run_batch`]
    pub output_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            workers: thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
            thread_name: "sluice-worker".into(),
            input_capacity: 100,
            output_capacity: 100,
        }
    }
}

impl PoolConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_thread_name(mut self, thread_name: impl Into<String>) -> Self {
        self.thread_name = thread_name.into();
        self
    }

    pub fn with_input_capacity(mut self, input_capacity: usize) -> Self {
        self.input_capacity = input_capacity;
        self
    }

    pub fn with_output_capacity(mut self, output_capacity: usize) -> Self {
        self.output_capacity = output_capacity;
        self
    }
}


/// Worker pool which has been configured but not yet started
pub struct WorkerPool<P, R, F> {
    config: PoolConfig,
    input: Receiver<Job<P>>,
    output: Sender<JobResult<R>>,
    f: Arc<F>,
}

impl<P, R, F> WorkerPool<P, R, F>
where
    P: Send + 'static,
    R: Send + 'static,
    F: Fn(Job<P>) -> anyhow::Result<R> + Send + Sync + 'static,
{
    /// Configure a pool to process jobs from `input` into `output` with `f`
    ///
    /// Errors if the configuration asks for zero workers.
    pub fn new(
        config: PoolConfig,
        input: Receiver<Job<P>>,
        output: Sender<JobResult<R>>,
        f: F,
    ) -> Result<Self, PoolError> {
        if config.workers == 0 {
            return Err(PoolError::NoWorkers);
        }
        Ok(WorkerPool { config, input, output, f: Arc::new(f) })
    }

    /// Spawn the worker threads
    ///
    /// If a thread fails to spawn, the error is returned and the workers spawned so far are left
    /// running until the input finishes.
    pub fn start(self) -> Result<RunningPool, PoolError> {
        let mut workers = Vec::with_capacity(self.config.workers);
        for index in 0..self.config.workers {
            let input = self.input.clone();
            let output = self.output.clone();
            let f = Arc::clone(&self.f);
            let handle = thread::Builder::new()
                .name(format!("{}-{}", self.config.thread_name, index))
                .spawn(move || work(index, input, output, &*f))
                .map_err(PoolError::Spawn)?;
            workers.push(handle);
        }
        debug!(workers = workers.len(), "worker pool started");
        Ok(RunningPool { workers })
    }
}


/// Counters reported by a single worker on exit
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Jobs taken from the input, whether or not they succeeded
    pub processed: u64,
    /// Jobs whose processing failed or panicked
    pub failed: u64,
}

/// Counters of a whole pool, summed over its workers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub processed: u64,
    pub failed: u64,
    pub workers: Vec<WorkerStats>,
}

/// Handle to a started worker pool
pub struct RunningPool {
    workers: Vec<JoinHandle<WorkerStats>>,
}

impl RunningPool {
    /// Number of worker threads
    pub fn workers(&self) -> usize {
        self.workers.len()
    }

    /// Wait for every worker to exit
    ///
    /// Workers exit once the input is closed and drained. Once this returns, no worker will send
    /// to the output again, so it is safe to close it.
    pub fn join(self) -> PoolStats {
        let mut stats = PoolStats::default();
        for handle in self.workers {
            let worker = match handle.join() {
                Ok(worker) => worker,
                Err(panic) => resume_unwind(panic),
            };
            stats.processed += worker.processed;
            stats.failed += worker.failed;
            stats.workers.push(worker);
        }
        debug!(processed = stats.processed, failed = stats.failed, "worker pool joined");
        stats
    }
}


// body of a worker thread.
fn work<P, R, F>(
    index: usize,
    input: Receiver<Job<P>>,
    output: Sender<JobResult<R>>,
    f: &F,
) -> WorkerStats
where
    F: Fn(Job<P>) -> anyhow::Result<R>,
{
    let mut stats = WorkerStats::default();
    while let Some(job) = input.recv_blocking() {
        let job_id = job.id;
        let outcome = match catch_unwind(AssertUnwindSafe(|| f(job))) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(ProcessingError::Failed { job_id, message: format!("{:#}", e) }),
            Err(panic) => Err(ProcessingError::Panicked { job_id, message: panic_message(&*panic) }),
        };
        stats.processed += 1;
        if let Err(ref e) = outcome {
            stats.failed += 1;
            warn!(worker = index, %e, "job processing failed");
        }

        if let Err(e) = output.send_blocking(JobResult { job_id, outcome }) {
            error!(worker = index, job_id, %e, "output channel closed under running worker");
            break;
        }
        trace!(worker = index, job_id, "job result sent");
    }
    debug!(worker = index, processed = stats.processed, "worker exiting");
    stats
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}


/// Process every payload on a fresh pool, returning all results once the pool is done
///
/// A generator thread submits the payloads as jobs with ids counting up from 0 and then closes
/// the job channel. A closer thread joins the pool and then closes the result channel. The
/// calling thread drains results until the result channel ends, so no result count is assumed.
pub fn run_batch<P, R, F, I>(
    config: PoolConfig,
    payloads: I,
    f: F,
) -> Result<Vec<JobResult<R>>, PoolError>
where
    P: Send + 'static,
    R: Send + 'static,
    F: Fn(Job<P>) -> anyhow::Result<R> + Send + Sync + 'static,
    I: IntoIterator<Item = P>,
    I::IntoIter: Send + 'static,
{
    let (job_send, job_recv) = channel(config.input_capacity);
    let (result_send, result_recv) = channel(config.output_capacity);
    let pool = WorkerPool::new(config, job_recv, result_send.clone(), f)?.start()?;

    let payloads = payloads.into_iter();
    let generator = thread::Builder::new()
        .name("sluice-generator".into())
        .spawn(move || {
            let mut submitted: usize = 0;
            for (id, payload) in (0..).zip(payloads) {
                if let Err(e) = job_send.send_blocking(Job { id, payload }) {
                    warn!(%e, "job channel unusable, stopping submission");
                    break;
                }
                submitted += 1;
            }
            job_send.close();
            debug!(submitted, "all jobs submitted");
            submitted
        })
        .map_err(PoolError::Spawn)?;
    let closer = thread::Builder::new()
        .name("sluice-closer".into())
        .spawn(move || {
            let stats = pool.join();
            result_send.close();
            stats
        })
        .map_err(PoolError::Spawn)?;

    let results = result_recv.iter().collect::<Vec<_>>();

    let submitted = match generator.join() {
        Ok(submitted) => submitted,
        Err(panic) => resume_unwind(panic),
    };
    let stats = match closer.join() {
        Ok(stats) => stats,
        Err(panic) => resume_unwind(panic),
    };
    debug!(submitted, received = results.len(), failed = stats.failed, "batch finished");
    // failures and panics still produce a result, so every submitted job has exactly one
    debug_assert_eq!(submitted, results.len(), "lost or duplicated job results");
    Ok(results)
}


#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use std::collections::BTreeSet;

    fn sorted<R>(mut results: Vec<JobResult<R>>) -> Vec<JobResult<R>> {
        results.sort_by_key(|result| result.job_id);
        results
    }

    #[test]
    fn every_job_processed_exactly_once() {
        for workers in [1, 4, 8] {
            let results = run_batch(
                PoolConfig::default().with_workers(workers),
                0..100u64,
                |job| Ok(job.payload * 2),
            )
            .unwrap();
            assert_eq!(results.len(), 100, "workers = {}", workers);
            for (i, result) in sorted(results).into_iter().enumerate() {
                assert_eq!(result.job_id, i as u64);
                assert_eq!(result.outcome, Ok(i as u64 * 2));
            }
        }
    }

    #[test]
    fn failing_job_is_isolated() {
        let results = run_batch(
            PoolConfig::default().with_workers(4),
            0..100u64,
            |job| {
                if job.id == 37 {
                    bail!("cannot process {}", job.payload);
                }
                Ok(job.payload + 1)
            },
        )
        .unwrap();
        let results = sorted(results);
        assert_eq!(results.len(), 100);
        for result in &results {
            if result.job_id == 37 {
                assert_eq!(
                    result.outcome,
                    Err(ProcessingError::Failed { job_id: 37, message: "cannot process 37".into() }),
                );
            } else {
                assert_eq!(result.outcome, Ok(result.job_id + 1));
            }
        }
    }

    #[test]
    fn panicking_job_is_isolated() {
        let results = run_batch(
            PoolConfig::default().with_workers(2),
            0..100u64,
            |job| {
                if job.id == 37 {
                    panic!("boom");
                }
                Ok(job.payload)
            },
        )
        .unwrap();
        assert_eq!(results.len(), 100);
        let failed = results
            .iter()
            .filter_map(|result| result.outcome.as_ref().err())
            .collect::<Vec<_>>();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].job_id(), 37);
        assert!(matches!(failed[0], ProcessingError::Panicked { message, .. } if message == "boom"));
    }

    #[test]
    fn rendezvous_channels_lose_no_results() {
        // with both channels unbuffered every job and every result goes through a receiver
        // waiting on it, with several workers competing for each
        let config = PoolConfig::default()
            .with_workers(4)
            .with_input_capacity(0)
            .with_output_capacity(0);
        let results = run_batch(config, 0..200u64, |job| {
            if job.id % 50 == 0 {
                bail!("job {} rejected", job.id);
            }
            Ok(job.payload)
        })
        .unwrap();
        assert_eq!(results.len(), 200);
        let results = sorted(results);
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.job_id, i as u64);
        }
        assert_eq!(results.iter().filter(|result| result.outcome.is_err()).count(), 4);
    }

    #[test]
    fn empty_batch() {
        let results = run_batch(PoolConfig::default().with_workers(2), Vec::<u8>::new(), |job| {
            Ok(job.payload)
        })
        .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn zero_workers_rejected() {
        let (_job_send, job_recv) = channel::<Job<()>>(1);
        let (result_send, _result_recv) = channel::<JobResult<()>>(1);
        let pool = WorkerPool::new(
            PoolConfig::default().with_workers(0),
            job_recv,
            result_send,
            |_| Ok(()),
        );
        assert!(matches!(pool, Err(PoolError::NoWorkers)));

        let batch = run_batch(PoolConfig::default().with_workers(0), 0..3, |_| Ok(()));
        assert!(matches!(batch, Err(PoolError::NoWorkers)));
    }

    #[test]
    fn join_is_barrier_before_closing_output() {
        let (job_send, job_recv) = channel(0);
        let (result_send, result_recv) = channel(10);
        let pool = WorkerPool::new(
            PoolConfig::default().with_workers(3),
            job_recv,
            result_send.clone(),
            |job: Job<u64>| {
                if job.payload % 2 == 0 {
                    bail!("even");
                }
                Ok(job.payload)
            },
        )
        .unwrap()
        .start()
        .unwrap();
        assert_eq!(pool.workers(), 3);

        for id in 0..10 {
            job_send.send_blocking(Job { id, payload: id }).unwrap();
        }
        job_send.close();
        let stats = pool.join();
        assert_eq!(stats.processed, 10);
        assert_eq!(stats.failed, 5);
        assert_eq!(stats.workers.len(), 3);
        assert_eq!(stats.workers.iter().map(|w| w.processed).sum::<u64>(), 10);

        result_send.close();
        let ids = result_recv.iter().map(|result| result.job_id).collect::<BTreeSet<_>>();
        assert_eq!(ids, (0..10).collect());
        assert_eq!(result_recv.recv_blocking(), None);
    }

    #[test]
    fn closed_output_stops_worker() {
        let (job_send, job_recv) = channel(1);
        let (result_send, _result_recv) = channel::<JobResult<()>>(1);
        result_send.close();
        let pool = WorkerPool::new(
            PoolConfig::default().with_workers(1),
            job_recv,
            result_send,
            |_: Job<()>| Ok(()),
        )
        .unwrap()
        .start()
        .unwrap();

        job_send.send_blocking(Job { id: 0, payload: () }).unwrap();
        let stats = pool.join();
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.failed, 0);
    }

    #[test]
    fn workers_are_named() {
        let results = run_batch(
            PoolConfig::default().with_workers(2).with_thread_name("fib"),
            0..20,
            |_: Job<i32>| Ok(thread::current().name().map(str::to_owned)),
        )
        .unwrap();
        let names = results
            .into_iter()
            .map(|result| result.outcome.unwrap().unwrap())
            .collect::<BTreeSet<_>>();
        assert!(!names.is_empty());
        for name in names {
            assert!(name == "fib-0" || name == "fib-1", "unexpected name {}", name);
        }
    }

    #[test]
    fn config_builders() {
        let config = PoolConfig::default()
            .with_workers(3)
            .with_thread_name("w")
            .with_input_capacity(0)
            .with_output_capacity(7);
        assert_eq!(config, PoolConfig {
            workers: 3,
            thread_name: "w".into(),
            input_capacity: 0,
            output_capacity: 7,
        });
        assert!(PoolConfig::default().workers >= 1);
    }
}
