//! Fixed-size pool of tokio workers draining a bounded task queue.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Mutex, Notify, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Returned by [`WorkerPool::enqueue`] after [`WorkerPool::stop`].
#[derive(Debug, thiserror::Error)]
#[error("worker pool is stopped")]
pub struct PoolStopped;

/// Runs up to `capacity` tasks at once.
///
/// The queue buffers `capacity` tasks; past that, [`enqueue`](Self::enqueue)
/// waits for a worker to pick one up. Tasks handle their own errors: the
/// pool only reports that they finished.
pub struct WorkerPool {
    queue: Option<mpsc::Sender<Task>>,
    receiver: Arc<Mutex<mpsc::Receiver<Task>>>,
    pending: Arc<Pending>,
    shutdown: CancellationToken,
    workers: Vec<JoinHandle<()>>,
}

/// Enqueued tasks that have not finished yet.
struct Pending {
    count: AtomicUsize,
    idle: Notify,
}

impl Pending {
    fn add(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn done(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    fn is_idle(&self) -> bool {
        self.count.load(Ordering::SeqCst) == 0
    }
}

impl WorkerPool {
    /// Spawns `capacity` workers (at least one) on the current runtime.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel::<Task>(capacity);
        let receiver = Arc::new(Mutex::new(rx));
        let pending = Arc::new(Pending {
            count: AtomicUsize::new(0),
            idle: Notify::new(),
        });
        let shutdown = CancellationToken::new();

        let workers = (0..capacity)
            .map(|id| {
                tokio::spawn(run_worker(
                    id,
                    Arc::clone(&receiver),
                    Arc::clone(&pending),
                    shutdown.clone(),
                ))
            })
            .collect();

        Self {
            queue: Some(tx),
            receiver,
            pending,
            shutdown,
            workers,
        }
    }

    /// Number of workers.
    pub fn capacity(&self) -> usize {
        self.workers.len()
    }

    /// Queues `task`, waiting while the queue is full.
    pub async fn enqueue<F>(&self, task: F) -> Result<(), PoolStopped>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let queue = self.queue.as_ref().ok_or(PoolStopped)?;
        // Reserve first so a cancelled enqueue leaves no phantom pending task.
        let slot = queue.reserve().await.map_err(|_| PoolStopped)?;
        self.pending.add();
        slot.send(Box::pin(task));
        Ok(())
    }

    /// Waits until every enqueued task has finished.
    pub async fn wait(&self) {
        loop {
            let notified = self.pending.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.pending.is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Shuts the workers down and joins them. Idempotent.
    ///
    /// Running tasks finish first; queued tasks that never started are dropped.
    pub async fn stop(&mut self) {
        if self.queue.take().is_none() {
            return;
        }
        self.shutdown.cancel();

        for handle in self.workers.drain(..) {
            if let Err(e) = handle.await {
                error!(error = %e, "worker exited abnormally");
            }
        }

        let mut rx = self.receiver.lock().await;
        rx.close();
        while rx.try_recv().is_ok() {
            self.pending.done();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run_worker(
    id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<Task>>>,
    pending: Arc<Pending>,
    shutdown: CancellationToken,
) {
    loop {
        let task = {
            let mut rx = receiver.lock().await;
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => None,
                task = rx.recv() => task,
            }
        };
        let Some(task) = task else {
            break;
        };

        // A panicking task must not take the worker down with it.
        if let Err(e) = tokio::spawn(task).await {
            error!(worker = id, error = %e, "task panicked");
        }
        pending.done();
    }
    debug!(worker = id, "worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn runs_every_task() {
        let mut pool = WorkerPool::new(4);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..50 {
            let c = Arc::clone(&counter);
            pool.enqueue(async move {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();
        }

        pool.wait().await;
        assert_eq!(counter.load(Ordering::SeqCst), 50);
        pool.stop().await;
    }

    #[tokio::test]
    async fn bounds_concurrency() {
        let mut pool = WorkerPool::new(3);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..20 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            pool.enqueue(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            })
            .await
            .unwrap();
        }

        pool.wait().await;
        pool.stop().await;
        let peak = peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak concurrency {peak} exceeds capacity");
        assert!(peak >= 2, "tasks never overlapped");
    }

    #[tokio::test]
    async fn enqueue_blocks_when_queue_is_full() {
        let mut pool = WorkerPool::new(1);
        let gate = Arc::new(Notify::new());

        // One task running, one buffered.
        for _ in 0..2 {
            let gate = Arc::clone(&gate);
            pool.enqueue(async move { gate.notified().await }).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        let blocked = tokio::time::timeout(Duration::from_millis(50), pool.enqueue(async {})).await;
        assert!(blocked.is_err(), "third enqueue should wait for a free slot");

        gate.notify_waiters();
        tokio::time::sleep(Duration::from_millis(20)).await;
        gate.notify_waiters();
        pool.wait().await;
        pool.stop().await;
    }

    #[tokio::test]
    async fn wait_on_empty_pool_returns() {
        let mut pool = WorkerPool::new(2);
        pool.wait().await;
        pool.stop().await;
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_rejects_new_work() {
        let mut pool = WorkerPool::new(2);
        pool.stop().await;
        pool.stop().await;

        assert!(pool.enqueue(async {}).await.is_err());
        pool.wait().await;
    }

    #[tokio::test]
    async fn panicking_task_is_contained() {
        let mut pool = WorkerPool::new(1);
        let counter = Arc::new(AtomicUsize::new(0));

        pool.enqueue(async {
            panic!("boom");
        })
        .await
        .unwrap();
        let c = Arc::clone(&counter);
        pool.enqueue(async move {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap();

        pool.wait().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        pool.stop().await;
    }

    #[tokio::test]
    async fn zero_capacity_means_one_worker() {
        let mut pool = WorkerPool::new(0);
        assert_eq!(pool.capacity(), 1);
        pool.enqueue(async {}).await.unwrap();
        pool.wait().await;
        pool.stop().await;
    }
}
