//! Command kernel
//!
//! A FIFO job scheduler living on a single thread. Jobs are pulled strictly
//! in submission order and handed to a caller-supplied `JobHandler`; the
//! handler's synchronous body always runs to completion (or to its first
//! suspension) before the next job starts. Suspended jobs are polled on the
//! same `LocalSet`, so they never run concurrently with a synchronous body.
//!
//! Submitters talk to the kernel through a `KernelHandle`, which is `Send`
//! and cheap to clone.

mod job;

pub use job::{JobContext, JobHandler, JobId, JobOutcome, Suspension};

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::LocalSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Failures of the kernel itself, as opposed to failures of a job
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KernelError {
    #[error("kernel is not running")]
    Closed,

    #[error("job dropped before it settled")]
    Dropped,
}

type Settlement<H> = Result<<H as JobHandler>::Reply, <H as JobHandler>::Error>;

/// A submitted job, owned by the kernel until it settles
struct Job<H: JobHandler> {
    id: JobId,
    connection_id: u64,
    request: H::Request,
    signal: CancellationToken,
    respond: oneshot::Sender<Settlement<H>>,
}

/// The scheduler loop; see the module docs
pub struct Kernel<H: JobHandler> {
    handler: H,
    queue: mpsc::UnboundedReceiver<Job<H>>,
    suspended: Rc<RefCell<HashSet<JobId>>>,
    suspended_gauge: Arc<AtomicUsize>,
}

impl<H: JobHandler> Kernel<H> {
    /// Create a kernel and the handle used to feed it
    pub fn new(handler: H) -> (Self, KernelHandle<H>) {
        let (handle, queue) = KernelHandle::channel();
        let kernel = Kernel::with_queue(handler, queue, handle.suspended.clone());
        (kernel, handle)
    }

    fn with_queue(
        handler: H,
        queue: mpsc::UnboundedReceiver<Job<H>>,
        suspended_gauge: Arc<AtomicUsize>,
    ) -> Self {
        Kernel {
            handler,
            queue,
            suspended: Rc::new(RefCell::new(HashSet::new())),
            suspended_gauge,
        }
    }

    /// Number of jobs currently suspended
    pub fn suspended_count(&self) -> usize {
        self.suspended.borrow().len()
    }

    /// Process jobs until every handle is dropped
    ///
    /// Must run inside a `LocalSet`: suspended jobs are spawned onto it.
    pub async fn run(mut self) {
        debug!("kernel loop starting");
        while let Some(job) = self.queue.recv().await {
            self.run_job(job);
        }
        debug!(suspended = self.suspended_count(), "kernel queue closed");
    }

    /// Run one job's synchronous body and route its settlement
    fn run_job(&self, job: Job<H>) {
        let Job {
            id,
            connection_id,
            request,
            signal,
            respond,
        } = job;

        let ctx = JobContext {
            id,
            connection_id,
            signal,
        };

        match self.handler.handle(ctx, request) {
            Ok(JobOutcome::Done(reply)) => {
                let _ = respond.send(Ok(reply));
            }
            Err(err) => {
                let _ = respond.send(Err(err));
            }
            Ok(JobOutcome::Suspended(future)) => {
                debug!(job = id, connection = connection_id, "job suspended");
                self.suspended.borrow_mut().insert(id);
                self.suspended_gauge.fetch_add(1, Ordering::SeqCst);

                let suspended = self.suspended.clone();
                let gauge = self.suspended_gauge.clone();
                tokio::task::spawn_local(async move {
                    let settlement = future.await;
                    // Leave the suspended set before the submitter can observe the result
                    if suspended.borrow_mut().remove(&id) {
                        gauge.fetch_sub(1, Ordering::SeqCst);
                    }
                    debug!(job = id, "suspended job settled");
                    let _ = respond.send(settlement);
                });
            }
        }
    }
}

/// Submission side of a kernel
pub struct KernelHandle<H: JobHandler> {
    sender: mpsc::UnboundedSender<Job<H>>,
    next_id: Arc<AtomicU64>,
    suspended: Arc<AtomicUsize>,
}

impl<H: JobHandler> Clone for KernelHandle<H> {
    fn clone(&self) -> Self {
        KernelHandle {
            sender: self.sender.clone(),
            next_id: self.next_id.clone(),
            suspended: self.suspended.clone(),
        }
    }
}

impl<H: JobHandler> KernelHandle<H> {
    fn channel() -> (Self, mpsc::UnboundedReceiver<Job<H>>) {
        let (sender, queue) = mpsc::unbounded_channel();
        let handle = KernelHandle {
            sender,
            next_id: Arc::new(AtomicU64::new(1)),
            suspended: Arc::new(AtomicUsize::new(0)),
        };
        (handle, queue)
    }

    /// Enqueue a job; the receiver yields its settlement
    pub fn submit(
        &self,
        connection_id: u64,
        request: H::Request,
        signal: CancellationToken,
    ) -> Result<oneshot::Receiver<Settlement<H>>, KernelError> {
        let (respond, settled) = oneshot::channel();
        let job = Job {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            connection_id,
            request,
            signal,
            respond,
        };

        self.sender.send(job).map_err(|_| KernelError::Closed)?;
        Ok(settled)
    }

    /// Submit a job and wait for it to settle
    pub async fn execute(
        &self,
        connection_id: u64,
        request: H::Request,
        signal: CancellationToken,
    ) -> Result<H::Reply, H::Error>
    where
        H::Error: From<KernelError>,
    {
        let settled = self.submit(connection_id, request, signal)?;
        match settled.await {
            Ok(settlement) => settlement,
            Err(_) => Err(KernelError::Dropped.into()),
        }
    }

    /// Number of jobs currently suspended
    pub fn suspended_count(&self) -> usize {
        self.suspended.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Start a kernel on a dedicated thread
///
/// The handler is built on that thread by `factory`, so it may hold
/// thread-local state such as the keyspace.
pub fn spawn<H, F>(name: &str, factory: F) -> std::io::Result<KernelHandle<H>>
where
    H: JobHandler,
    F: FnOnce() -> H + Send + 'static,
{
    let (handle, queue) = KernelHandle::channel();
    let gauge = handle.suspended.clone();
    let thread_name = name.to_string();

    std::thread::Builder::new()
        .name(thread_name.clone())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    error!("Failed to create {} runtime: {}", thread_name, e);
                    return;
                }
            };

            info!("{} thread started", thread_name);
            let kernel = Kernel::with_queue(factory(), queue, gauge);
            LocalSet::new().block_on(&runtime, kernel.run());
            info!("{} thread stopped", thread_name);
        })?;

    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl JobHandler for Echo {
        type Request = i64;
        type Reply = i64;
        type Error = String;

        fn handle(&self, _ctx: JobContext, request: i64) -> Result<JobOutcome<i64, String>, String> {
            if request < 0 {
                return Err(format!("negative: {}", request));
            }
            Ok(JobOutcome::Done(request * 2))
        }
    }

    #[tokio::test]
    async fn test_done_and_rejected_jobs() {
        let local = LocalSet::new();
        local
            .run_until(async {
                let (kernel, handle) = Kernel::new(Echo);
                tokio::task::spawn_local(kernel.run());

                let ok = handle.submit(1, 21, CancellationToken::new()).unwrap();
                let bad = handle.submit(1, -1, CancellationToken::new()).unwrap();
                let after = handle.submit(1, 5, CancellationToken::new()).unwrap();

                assert_eq!(ok.await.unwrap(), Ok(42));
                assert_eq!(bad.await.unwrap(), Err("negative: -1".to_string()));
                assert_eq!(after.await.unwrap(), Ok(10));
            })
            .await;
    }

    #[tokio::test]
    async fn test_submit_after_shutdown() {
        let (kernel, handle) = Kernel::new(Echo);
        drop(kernel);
        assert!(handle.is_closed());
        assert!(matches!(
            handle.submit(1, 1, CancellationToken::new()),
            Err(KernelError::Closed)
        ));
    }

    #[test]
    fn test_spawned_kernel_serves_other_threads() {
        let handle = spawn("kernel-test", || Echo).unwrap();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let reply = runtime.block_on(async {
            let settled = handle.submit(7, 4, CancellationToken::new()).unwrap();
            settled.await.unwrap()
        });
        assert_eq!(reply, Ok(8));
    }
}
