use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::warn;

use crate::constants::WORKER_QUEUE_CAPACITY;

/// Bounded queue of boxed jobs drained by a fixed set of worker tasks.
///
/// Workers share one receiver; whichever is free picks up the next job.
/// Dropping the sending half (via [`JobQueue::shutdown`]) lets workers
/// drain what is queued and exit.
pub struct JobQueue {
    tx: mpsc::Sender<BoxFuture<'static, ()>>,
    workers: Vec<JoinHandle<()>>,
}

impl JobQueue {
    pub fn start(worker_count: usize) -> Self {
        let (tx, rx) = mpsc::channel::<BoxFuture<'static, ()>>(WORKER_QUEUE_CAPACITY);
        let rx = Arc::new(Mutex::new(rx));
        let workers = (0..worker_count.max(1))
            .map(|worker| {
                let rx = rx.clone();
                tokio::spawn(async move {
                    debug!(worker, "extension worker started");
                    loop {
                        // Hold the receiver lock only while waiting, not
                        // while running the job.
                        let job = { rx.lock().await.recv().await };
                        match job {
                            Some(job) => job.await,
                            None => break,
                        }
                    }
                    debug!(worker, "extension worker stopped");
                })
            })
            .collect();
        Self { tx, workers }
    }

    /// Queue a job; applies backpressure when the queue is full.
    pub async fn enqueue<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.tx.send(Box::pin(job)).await.is_err() {
            warn!("extension worker queue is closed; dropping job");
        }
    }

    /// Close the queue and wait for workers to finish outstanding jobs.
    pub async fn shutdown(self) {
        drop(self.tx);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}
