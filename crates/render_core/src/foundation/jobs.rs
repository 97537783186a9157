//! Fixed-size worker pool for fork-join style parallel work
//!
//! Jobs are queued in a FIFO guarded by a mutex and condition variable. `submit`
//! returns a [`JobHandle`] that blocks on `join`, which is how callers build the
//! join barrier after fanning work out over contiguous index ranges. There is no
//! cancellation: `shutdown` discards queued jobs that have not started and joins
//! every worker.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, Receiver};
use parking_lot::{Condvar, Mutex};
use thiserror::Error;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Job pool errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum JobError {
    /// The pool was shut down before the job ran
    #[error("Job was discarded before it could run")]
    Discarded,

    /// The job panicked while running
    #[error("Job panicked")]
    Panicked,
}

struct QueueState {
    jobs: VecDeque<Job>,
    running: bool,
}

struct Shared {
    queue: Mutex<QueueState>,
    available: Condvar,
}

/// Handle to the result of a submitted job
pub struct JobHandle<T> {
    receiver: Receiver<thread::Result<T>>,
}

impl<T> JobHandle<T> {
    /// Block until the job has run and return its result
    pub fn join(self) -> Result<T, JobError> {
        match self.receiver.recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(JobError::Panicked),
            Err(_) => Err(JobError::Discarded),
        }
    }
}

/// Bounded worker pool
pub struct JobPool {
    shared: Arc<Shared>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl JobPool {
    /// Create a pool with one worker per available hardware thread
    pub fn new() -> Self {
        let threads = thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        Self::with_threads(threads)
    }

    /// Create a pool with exactly `threads` workers (at least one)
    pub fn with_threads(threads: usize) -> Self {
        let threads = threads.max(1);
        let shared = Arc::new(Shared {
            queue: Mutex::new(QueueState {
                jobs: VecDeque::new(),
                running: true,
            }),
            available: Condvar::new(),
        });

        let workers = (0..threads)
            .map(|_| {
                let shared = Arc::clone(&shared);
                thread::spawn(move || worker_loop(&shared))
            })
            .collect();

        log::debug!("Job pool started with {} worker(s)", threads);
        Self { shared, workers }
    }

    /// Number of worker threads
    pub fn thread_count(&self) -> usize {
        self.workers.len()
    }

    /// Queue a fire-and-forget job
    pub fn execute<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut queue = self.shared.queue.lock();
        if !queue.running {
            log::warn!("Job submitted after shutdown, dropping it");
            return;
        }
        queue.jobs.push_back(Box::new(job));
        drop(queue);
        self.shared.available.notify_one();
    }

    /// Queue a job and get a handle to its result
    pub fn submit<F, T>(&self, job: F) -> JobHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (sender, receiver) = bounded(1);
        self.execute(move || {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(job));
            // Receiver may already be gone if the caller dropped the handle
            let _ = sender.send(result);
        });
        JobHandle { receiver }
    }

    /// Stop accepting work, discard queued jobs and join every worker
    pub fn shutdown(&mut self) {
        {
            let mut queue = self.shared.queue.lock();
            queue.running = false;
            let discarded = queue.jobs.len();
            queue.jobs.clear();
            if discarded > 0 {
                log::debug!("Job pool discarded {} queued job(s)", discarded);
            }
        }
        self.shared.available.notify_all();

        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("Job pool worker terminated with a panic");
            }
        }
    }
}

impl Default for JobPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for JobPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let job = {
            let mut queue = shared.queue.lock();
            loop {
                if !queue.running {
                    return;
                }
                if let Some(job) = queue.jobs.pop_front() {
                    break job;
                }
                shared.available.wait(&mut queue);
            }
        };
        job();
    }
}

/// Split `len` items into contiguous `(start, end)` ranges of `ceil(len / parts)` items
pub fn partition_ranges(len: usize, parts: usize) -> Vec<(usize, usize)> {
    if len == 0 {
        return Vec::new();
    }
    let batch = len.div_ceil(parts.max(1));
    (0..len)
        .step_by(batch)
        .map(|start| (start, (start + batch).min(len)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_submit_returns_result() {
        let pool = JobPool::with_threads(2);
        let handle = pool.submit(|| 21 * 2);
        assert_eq!(handle.join(), Ok(42));
    }

    #[test]
    fn test_join_barrier_waits_for_all_jobs() {
        let pool = JobPool::with_threads(4);
        let counter = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let counter = Arc::clone(&counter);
                pool.submit(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 16);
    }

    #[test]
    fn test_panicking_job_reports_error() {
        let pool = JobPool::with_threads(1);
        let handle = pool.submit(|| -> u32 { panic!("boom") });
        assert_eq!(handle.join(), Err(JobError::Panicked));

        // Worker survives the panic
        assert_eq!(pool.submit(|| 7).join(), Ok(7));
    }

    #[test]
    fn test_dropped_handle_does_not_stall_the_worker() {
        let pool = JobPool::with_threads(1);
        drop(pool.submit(|| 1));
        assert_eq!(pool.submit(|| 2).join(), Ok(2));
    }

    #[test]
    fn test_submit_after_shutdown_is_discarded() {
        let mut pool = JobPool::with_threads(1);
        pool.shutdown();
        assert_eq!(pool.thread_count(), 0);
        assert_eq!(pool.submit(|| 1).join(), Err(JobError::Discarded));
    }

    #[test]
    fn test_partition_ranges_are_contiguous_and_cover_everything() {
        let ranges = partition_ranges(10, 4);
        assert_eq!(ranges, vec![(0, 3), (3, 6), (6, 9), (9, 10)]);
        assert!(partition_ranges(0, 4).is_empty());
        assert_eq!(partition_ranges(3, 8), vec![(0, 1), (1, 2), (2, 3)]);
    }
}
