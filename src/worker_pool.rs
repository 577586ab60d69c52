//! Persistent worker pool for parallel voice rendering
//!
//! Workers are spawned once and reused for every audio block; spawning per
//! block would dominate the block budget at small buffer sizes. Jobs are
//! closures sent over an unbounded crossbeam channel, and completion is
//! tracked with a shared pending counter so the audio thread can wait for a
//! whole batch without collecting per-job results.

use crossbeam::channel::{unbounded, Receiver, RecvError, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// A unit of work: any closure the caller wants run on a worker thread.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

enum WorkItem {
    Run(Job),
    Shutdown,
}

/// Counter of jobs submitted but not yet finished, paired with a condvar so
/// waiters wake as soon as it hits zero.
struct Pending {
    count: Mutex<usize>,
    done: Condvar,
}

struct Worker {
    id: usize,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    fn new(id: usize, work_rx: Receiver<WorkItem>, pending: Arc<Pending>) -> Result<Worker, String> {
        let thread = thread::Builder::new()
            .name(format!("voice-worker-{}", id))
            .spawn(move || {
                // Pin to a core for cache locality when the platform lets us.
                #[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
                {
                    let core_ids = core_affinity::get_core_ids().unwrap_or_default();
                    if id < core_ids.len() && !core_affinity::set_for_current(core_ids[id]) {
                        warn!("could not set CPU affinity for worker {}", id);
                    }
                }

                Worker::run(work_rx, pending);
            })
            .map_err(|e| format!("failed to spawn worker thread {}: {}", id, e))?;

        Ok(Worker {
            id,
            thread: Some(thread),
        })
    }

    fn run(work_rx: Receiver<WorkItem>, pending: Arc<Pending>) {
        loop {
            match work_rx.recv() {
                Ok(WorkItem::Run(job)) => {
                    job();
                    let mut count = match pending.count.lock() {
                        Ok(c) => c,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    *count -= 1;
                    if *count == 0 {
                        pending.done.notify_all();
                    }
                }
                Ok(WorkItem::Shutdown) => break,
                Err(RecvError) => break,
            }
        }
    }
}

/// Fixed pool of worker threads that run submitted jobs.
pub struct WorkerPool {
    workers: Vec<Worker>,
    work_tx: Sender<WorkItem>,
    work_rx: Receiver<WorkItem>,
    pending: Arc<Pending>,
}

impl WorkerPool {
    /// Create a pool of `num_workers` threads. Zero asks for one worker per
    /// available core, minus one reserved for the audio thread.
    pub fn new(num_workers: usize) -> Result<Self, String> {
        let num_workers = if num_workers == 0 {
            num_cpus::get().saturating_sub(1).max(1)
        } else {
            num_workers
        };

        let (work_tx, work_rx) = unbounded();
        let pending = Arc::new(Pending {
            count: Mutex::new(0),
            done: Condvar::new(),
        });

        let mut workers = Vec::with_capacity(num_workers);
        for id in 0..num_workers {
            workers.push(Worker::new(id, work_rx.clone(), Arc::clone(&pending))?);
        }

        debug!("worker pool started with {} workers", num_workers);

        Ok(WorkerPool {
            workers,
            work_tx,
            work_rx,
            pending,
        })
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Queue a job. The pending counter is bumped before the send so a
    /// concurrent `wait` can never observe the batch as finished early.
    pub fn submit<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut count = match self.pending.count.lock() {
                Ok(c) => c,
                Err(poisoned) => poisoned.into_inner(),
            };
            *count += 1;
        }
        if self.work_tx.send(WorkItem::Run(Box::new(job))).is_err() {
            // Workers are gone; undo the bump so wait() cannot hang.
            let mut count = match self.pending.count.lock() {
                Ok(c) => c,
                Err(poisoned) => poisoned.into_inner(),
            };
            *count -= 1;
            warn!("worker pool channel closed, job dropped");
        }
    }

    /// Block until every submitted job has run.
    pub fn wait(&self) {
        let mut count = match self.pending.count.lock() {
            Ok(c) => c,
            Err(poisoned) => poisoned.into_inner(),
        };
        while *count > 0 {
            count = match self.pending.done.wait(count) {
                Ok(c) => c,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    /// Shut down the current workers and respawn with a new count. Pending
    /// jobs are drained before the old workers exit because Shutdown items
    /// queue behind them on the same channel.
    pub fn resize(&mut self, num_workers: usize) -> Result<(), String> {
        let num_workers = if num_workers == 0 {
            num_cpus::get().saturating_sub(1).max(1)
        } else {
            num_workers
        };

        for _ in 0..self.workers.len() {
            let _ = self.work_tx.send(WorkItem::Shutdown);
        }
        for worker in &mut self.workers {
            if let Some(thread) = worker.thread.take() {
                let _ = thread.join();
                debug!("worker {} stopped", worker.id);
            }
        }

        self.workers.clear();
        for id in 0..num_workers {
            self.workers
                .push(Worker::new(id, self.work_rx.clone(), Arc::clone(&self.pending))?);
        }
        debug!("worker pool resized to {} workers", num_workers);
        Ok(())
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        for _ in 0..self.workers.len() {
            let _ = self.work_tx.send(WorkItem::Shutdown);
        }
        for worker in &mut self.workers {
            if let Some(thread) = worker.thread.take() {
                let _ = thread.join();
                debug!("worker {} stopped", worker.id);
            }
        }
    }
}
