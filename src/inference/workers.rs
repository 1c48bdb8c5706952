//! Fixed-size worker pool for blocking prediction jobs.
//!
//! Jobs run on OS threads pulling from a shared channel. A job that sleeps or
//! blocks on the network occupies only its own worker.

use std::sync::{mpsc, Arc, Mutex};
use std::thread;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Default pool width.
pub const DEFAULT_WORKERS: usize = 10;

pub struct Pool {
    tx: Option<mpsc::Sender<Job>>,
    handles: Vec<thread::JoinHandle<()>>,
}

impl Pool {
    /// Spawn `size` workers (at least one).
    pub fn new(size: usize) -> Self {
        let (tx, rx) = mpsc::channel::<Job>();
        let shared_rx = Arc::new(Mutex::new(rx));

        let handles = (0..size.max(1))
            .map(|idx| {
                let rx = Arc::clone(&shared_rx);
                thread::Builder::new()
                    .name(format!("predict-worker-{idx}"))
                    .spawn(move || loop {
                        let job = {
                            let guard = match rx.lock() {
                                Ok(guard) => guard,
                                Err(poisoned) => poisoned.into_inner(),
                            };
                            guard.recv()
                        };

                        match job {
                            Ok(job) => job(),
                            Err(_) => break,
                        }
                    })
            })
            .filter_map(|spawned| match spawned {
                Ok(handle) => Some(handle),
                Err(err) => {
                    tracing::error!(error = %err, "failed to spawn worker thread");
                    None
                }
            })
            .collect();

        Self {
            tx: Some(tx),
            handles,
        }
    }

    /// Number of live workers.
    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Queue a job; it runs as soon as a worker is free.
    pub fn submit<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Some(tx) = &self.tx {
            if tx.send(Box::new(job)).is_err() {
                tracing::error!("worker pool channel closed; job dropped");
            }
        }
    }
}

impl Drop for Pool {
    /// Close the queue and wait for queued jobs to drain.
    fn drop(&mut self) {
        drop(self.tx.take());
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}
