//! Bounded worker pool for out-of-band reclamation work.
//!
//! Emptying a filesystem bucket is a rename followed by a recursive delete
//! of the renamed directory. Only the rename sits on the caller's path; the
//! delete is handed to this pool. The queue is bounded and [`ReclaimPool::submit`]
//! never blocks: a refused job is reported to the caller, which leaves the
//! work for a later sweep.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::error::StoreResult;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-size pool of worker threads fed by a bounded queue.
pub struct ReclaimPool {
    sender: Mutex<Option<SyncSender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ReclaimPool {
    /// Spawn `workers` threads sharing a queue of at most `queue` jobs.
    pub fn new(workers: usize, queue: usize) -> StoreResult<Self> {
        let (tx, rx) = mpsc::sync_channel::<Job>(queue);
        let rx = Arc::new(Mutex::new(rx));

        let mut handles = Vec::with_capacity(workers);
        for i in 0..workers {
            let rx = Arc::clone(&rx);
            let handle = thread::Builder::new()
                .name(format!("twin-reclaim-{i}"))
                .spawn(move || worker_loop(&rx))?;
            handles.push(handle);
        }

        Ok(Self {
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(handles),
        })
    }

    /// Queue `job` without blocking. Returns `false` if the queue is full or
    /// the pool has been shut down.
    pub fn submit<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let Ok(sender) = self.sender.lock() else {
            return false;
        };
        let Some(tx) = sender.as_ref() else {
            return false;
        };
        match tx.try_send(Box::new(job)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("reclaim queue full; deferring job");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Close the queue and wait for queued jobs to finish. Idempotent.
    pub fn shutdown(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
        let handles = match self.workers.lock() {
            Ok(mut workers) => std::mem::take(&mut *workers),
            Err(_) => return,
        };
        for handle in handles {
            if handle.join().is_err() {
                warn!("reclaim worker exited by panic");
            }
        }
    }
}

impl Drop for ReclaimPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(rx: &Mutex<Receiver<Job>>) {
    loop {
        let next = match rx.lock() {
            Ok(guard) => guard.recv(),
            Err(_) => return,
        };
        let Ok(job) = next else {
            debug!("reclaim queue closed; worker exiting");
            return;
        };
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            warn!("reclaim job panicked");
        }
    }
}
