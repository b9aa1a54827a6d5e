//! Host side of the script bridge
//!
//! A script calls back into the server through `call` and `pcall`. Both run
//! the command synchronously against the keyspace of the job the script runs
//! in; nothing is queued on the kernel, so the script's whole run stays one
//! atomic job. Commands that could block, depend on randomness, or
//! administer the server are refused.

use crate::cluster::{validate_command_slot, Slot};
use crate::commands::{CommandContext, CommandFlags, CommandRegistry, ExecutionMode, Reply};
use crate::error::CommandError;
use crate::kernel::JobOutcome;
use crate::protocol::RespValue;
use bytes::Bytes;
use std::cell::Cell;
use std::sync::Arc;
use tracing::debug;

/// Bridge handed to a running script
pub struct ScriptHost {
    registry: Arc<CommandRegistry>,
    ctx: CommandContext,
    slot: Cell<Option<Slot>>,
}

impl ScriptHost {
    pub fn new(registry: Arc<CommandRegistry>, ctx: &CommandContext) -> Self {
        ScriptHost {
            registry,
            ctx: ctx.with_mode(ExecutionMode::Script),
            slot: Cell::new(None),
        }
    }

    /// Slot every keyed call so far has used
    pub fn pinned_slot(&self) -> Option<Slot> {
        self.slot.get()
    }

    /// `redis.call`: errors propagate to the script
    pub fn call(&self, name: &str, args: &[Bytes]) -> Result<RespValue, CommandError> {
        let command = self
            .registry
            .get(name)
            .ok_or_else(|| CommandError::UnknownCommand(name.to_ascii_lowercase()))?;

        if command.flags().intersects(CommandFlags::SCRIPT_DENIED) {
            debug!(command = command.name(), "refused from script");
            return Err(CommandError::NotAllowedFromScript);
        }

        if self.ctx.cluster.is_clustered() {
            if let Some(slot) = validate_command_slot(command.as_ref(), args, self.slot.get())? {
                self.ctx.cluster.validate_slot_ownership(slot)?;
                self.slot.set(Some(slot));
            }
        } else {
            command.keys(args)?;
        }

        match command.execute(&self.ctx, args)? {
            JobOutcome::Done(Reply::Frame(value)) => Ok(value),
            JobOutcome::Done(Reply::Close(_)) | JobOutcome::Suspended(_) => {
                Err(CommandError::NotAllowedFromScript)
            }
        }
    }

    /// `redis.pcall`: errors come back as error values
    pub fn pcall(&self, name: &str, args: &[Bytes]) -> RespValue {
        self.call(name, args).unwrap_or_else(|err| err.to_resp())
    }
}
