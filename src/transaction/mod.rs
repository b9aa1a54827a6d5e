//! MULTI / EXEC / DISCARD
//!
//! A connection's `Transaction` is `Idle` until MULTI, then records every
//! command until EXEC or DISCARD takes the buffer and returns it to `Idle`.
//! Recording happens on the connection side; the resulting `Batch` runs on
//! the kernel as a single job, so no other connection's command can land in
//! the middle of it.

mod watch;

pub use watch::WatchRegistry;

use crate::cluster::Slot;
use crate::commands::{Command, CommandContext, ExecutionMode, Reply};
use crate::error::CommandError;
use crate::kernel::JobOutcome;
use crate::protocol::{CaptureTransport, RespValue, Transport};
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// One recorded line of a transaction
pub enum QueuedEntry {
    /// A command to run at EXEC
    Command {
        command: Arc<dyn Command>,
        args: Vec<Bytes>,
    },
    /// A command rejected while recording; surfaces as an error at EXEC
    Failed(CommandError),
}

impl fmt::Debug for QueuedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueuedEntry::Command { command, args } => f
                .debug_struct("Command")
                .field("name", &command.name())
                .field("args", &args.len())
                .finish(),
            QueuedEntry::Failed(err) => f.debug_tuple("Failed").field(err).finish(),
        }
    }
}

#[derive(Debug, Default)]
enum TransactionState {
    #[default]
    Idle,
    Recording {
        entries: Vec<QueuedEntry>,
        aborted: bool,
        slot: Option<Slot>,
    },
}

/// Per-connection transaction state machine
#[derive(Debug, Default)]
pub struct Transaction {
    state: TransactionState,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_recording(&self) -> bool {
        matches!(self.state, TransactionState::Recording { .. })
    }

    /// MULTI
    pub fn begin(&mut self) -> Result<(), CommandError> {
        if self.is_recording() {
            return Err(CommandError::NestedMulti);
        }
        self.state = TransactionState::Recording {
            entries: Vec::new(),
            aborted: false,
            slot: None,
        };
        Ok(())
    }

    /// Slot every recorded command must share, once one has keys
    pub fn pinned_slot(&self) -> Option<Slot> {
        match &self.state {
            TransactionState::Recording { slot, .. } => *slot,
            TransactionState::Idle => None,
        }
    }

    /// Append a validated command; the first keyed command pins the slot
    ///
    /// Returns false, recording nothing, outside MULTI.
    pub fn record(&mut self, command: Arc<dyn Command>, args: Vec<Bytes>, slot: Option<Slot>) -> bool {
        let TransactionState::Recording { entries, slot: pinned, .. } = &mut self.state else {
            return false;
        };
        if pinned.is_none() {
            *pinned = slot;
        }
        entries.push(QueuedEntry::Command { command, args });
        true
    }

    /// Keep a rejected command's error in its place
    ///
    /// Unknown-command and arity errors also poison the transaction, so EXEC
    /// will refuse to run any of it.
    pub fn record_error(&mut self, err: CommandError) -> bool {
        let TransactionState::Recording { entries, aborted, .. } = &mut self.state else {
            return false;
        };
        if err.aborts_transaction() {
            debug!(error = %err, "transaction marked for abort");
            *aborted = true;
        }
        entries.push(QueuedEntry::Failed(err));
        true
    }

    /// DISCARD
    pub fn discard(&mut self) -> Result<(), CommandError> {
        match std::mem::take(&mut self.state) {
            TransactionState::Recording { entries, .. } => {
                debug!(discarded = entries.len(), "transaction discarded");
                Ok(())
            }
            TransactionState::Idle => Err(CommandError::DiscardWithoutMulti),
        }
    }

    /// EXEC: hand over the recorded batch and go back to idle
    pub fn take(&mut self) -> Result<Batch, CommandError> {
        match std::mem::take(&mut self.state) {
            TransactionState::Recording { entries, aborted, .. } => Ok(Batch { entries, aborted }),
            TransactionState::Idle => Err(CommandError::ExecWithoutMulti),
        }
    }
}

/// The commands of one EXEC, ready to run
#[derive(Debug)]
pub struct Batch {
    entries: Vec<QueuedEntry>,
    aborted: bool,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a recording error poisoned the batch
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Run every entry in order, collecting one reply per entry
    ///
    /// A failing entry contributes its error and the rest still run. A
    /// close request stops the batch and becomes the whole reply.
    pub fn execute(self, ctx: &CommandContext) -> Result<Reply, CommandError> {
        if self.aborted {
            return Err(CommandError::ExecAbort);
        }

        let ctx = ctx.with_mode(ExecutionMode::Transaction);
        let mut capture = CaptureTransport::new();

        for entry in self.entries {
            let (command, args) = match entry {
                QueuedEntry::Command { command, args } => (command, args),
                QueuedEntry::Failed(err) => {
                    capture.write(err.to_resp());
                    continue;
                }
            };

            match command.execute(&ctx, &args) {
                Ok(JobOutcome::Done(Reply::Frame(value))) => capture.write(value),
                Ok(JobOutcome::Done(close @ Reply::Close(_))) => return Ok(close),
                Ok(JobOutcome::Suspended(_)) => {
                    warn!(command = command.name(), "command tried to block inside EXEC");
                    capture.write(
                        CommandError::Internal(format!(
                            "{} cannot block inside a transaction",
                            command.name()
                        ))
                        .to_resp(),
                    );
                }
                Err(err) => capture.write(err.to_resp()),
            }
        }

        Ok(Reply::Frame(RespValue::Array(capture.into_replies())))
    }
}
