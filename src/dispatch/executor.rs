//! Kernel-side command execution
//!
//! The `Executor` is the kernel's job handler. It owns the keyspace and the
//! WATCH registry, both of which stay on the kernel thread.

use crate::cluster::OwnershipValidator;
use crate::commands::{Command, CommandContext, CommandResult, ExecutionMode, Reply};
use crate::error::CommandError;
use crate::kernel::{JobContext, JobHandler, JobOutcome};
use crate::protocol::RespValue;
use crate::store::Keyspace;
use crate::transaction::{Batch, WatchRegistry};
use bytes::Bytes;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use tracing::debug;

/// Work a connection asks the kernel to do
pub enum Request {
    /// Run one validated command
    Command {
        command: Arc<dyn Command>,
        args: Vec<Bytes>,
    },
    /// Run a transaction's recorded batch
    Exec(Batch),
    /// Watch keys for the next EXEC
    Watch(Vec<Bytes>),
    /// Forget the connection's watches
    Unwatch,
    /// The connection is gone
    Disconnect,
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Command { command, args } => {
                write!(f, "Command({}, {} args)", command.name(), args.len())
            }
            Request::Exec(batch) => write!(f, "Exec({} entries)", batch.len()),
            Request::Watch(keys) => write!(f, "Watch({} keys)", keys.len()),
            Request::Unwatch => f.write_str("Unwatch"),
            Request::Disconnect => f.write_str("Disconnect"),
        }
    }
}

/// Job handler running commands against the keyspace
pub struct Executor {
    store: Rc<Keyspace>,
    cluster: Arc<OwnershipValidator>,
    watches: RefCell<WatchRegistry>,
}

impl Executor {
    pub fn new(cluster: Arc<OwnershipValidator>) -> Self {
        Self::with_store(Rc::new(Keyspace::new()), cluster)
    }

    pub fn with_store(store: Rc<Keyspace>, cluster: Arc<OwnershipValidator>) -> Self {
        Executor {
            store,
            cluster,
            watches: RefCell::new(WatchRegistry::new()),
        }
    }

    pub fn store(&self) -> &Rc<Keyspace> {
        &self.store
    }

    fn context(&self, job: JobContext, mode: ExecutionMode) -> CommandContext {
        CommandContext {
            store: self.store.clone(),
            connection_id: job.connection_id,
            signal: job.signal,
            mode,
            cluster: self.cluster.clone(),
        }
    }

    /// EXEC: watches are released whatever the outcome
    fn exec(&self, job: JobContext, batch: Batch) -> CommandResult {
        let connection_id = job.connection_id;
        let dirty = self.watches.borrow_mut().release(&self.store, connection_id);

        if batch.is_aborted() {
            return Err(CommandError::ExecAbort);
        }
        if dirty {
            debug!(connection = connection_id, "watched key changed, EXEC aborted");
            return Ok(JobOutcome::Done(Reply::Frame(RespValue::NullArray)));
        }

        let ctx = self.context(job, ExecutionMode::Transaction);
        batch.execute(&ctx).map(JobOutcome::Done)
    }
}

impl JobHandler for Executor {
    type Request = Request;
    type Reply = Reply;
    type Error = CommandError;

    fn handle(&self, job: JobContext, request: Request) -> CommandResult {
        match request {
            Request::Command { command, args } => {
                let ctx = self.context(job, ExecutionMode::Live);
                command.execute(&ctx, &args)
            }
            Request::Exec(batch) => self.exec(job, batch),
            Request::Watch(keys) => {
                self.watches
                    .borrow_mut()
                    .watch(&self.store, job.connection_id, &keys);
                Ok(JobOutcome::Done(Reply::Frame(RespValue::ok())))
            }
            Request::Unwatch => {
                self.watches.borrow_mut().release(&self.store, job.connection_id);
                Ok(JobOutcome::Done(Reply::Frame(RespValue::ok())))
            }
            Request::Disconnect => {
                self.watches.borrow_mut().release(&self.store, job.connection_id);
                debug!(connection = job.connection_id, "connection state released");
                Ok(JobOutcome::Done(Reply::Frame(RespValue::ok())))
            }
        }
    }
}
