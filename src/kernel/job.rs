//! Jobs and what their handlers return

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

/// Kernel-assigned job identifier, unique per kernel
pub type JobId = u64;

/// A pending job continuation, polled on the kernel thread
pub type Suspension<T, E> = Pin<Box<dyn Future<Output = Result<T, E>>>>;

/// Result of running a job's synchronous body
pub enum JobOutcome<T, E> {
    /// Settled during the synchronous body
    Done(T),
    /// Settles later; the kernel moves on to the next job meanwhile
    Suspended(Suspension<T, E>),
}

impl<T, E> JobOutcome<T, E> {
    /// Wrap a future as a suspended outcome
    pub fn suspend<F>(future: F) -> Self
    where
        F: Future<Output = Result<T, E>> + 'static,
    {
        JobOutcome::Suspended(Box::pin(future))
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self, JobOutcome::Suspended(_))
    }

    /// Map the settled value, now or when the suspension resolves
    pub fn map<U, F>(self, f: F) -> JobOutcome<U, E>
    where
        T: 'static,
        E: 'static,
        U: 'static,
        F: FnOnce(T) -> U + 'static,
    {
        match self {
            JobOutcome::Done(value) => JobOutcome::Done(f(value)),
            JobOutcome::Suspended(future) => {
                JobOutcome::suspend(async move { future.await.map(f) })
            }
        }
    }
}

impl<T: fmt::Debug, E> fmt::Debug for JobOutcome<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobOutcome::Done(value) => f.debug_tuple("Done").field(value).finish(),
            JobOutcome::Suspended(_) => f.write_str("Suspended(..)"),
        }
    }
}

/// What a handler learns about the job it runs
#[derive(Debug, Clone)]
pub struct JobContext {
    pub id: JobId,
    pub connection_id: u64,
    /// Fired when the submitter gives up; suspended work must observe it
    pub signal: CancellationToken,
}

/// Caller-supplied job logic
///
/// `handle` is the synchronous body: the kernel runs exactly one of them at a
/// time. Anything that needs to wait must be returned as
/// `JobOutcome::Suspended`; an `Err` rejects the job immediately.
pub trait JobHandler: 'static {
    type Request: Send + 'static;
    type Reply: Send + 'static;
    type Error: Send + 'static;

    fn handle(
        &self,
        ctx: JobContext,
        request: Self::Request,
    ) -> Result<JobOutcome<Self::Reply, Self::Error>, Self::Error>;
}
