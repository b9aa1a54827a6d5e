//! Command slot validation
//!
//! Keys come from each command's own key extraction. A command whose keys
//! span several slots is rejected, never routed by its first key.

use super::slot::{calculate_slot, Slot};
use crate::commands::{Command, CommandRegistry};
use crate::error::CommandError;
use bytes::Bytes;
use std::sync::Arc;

/// Slot shared by every key of a command invocation
///
/// `Ok(None)` when the command has no keys. With `required` set (the slot a
/// transaction is pinned to), keys in any other slot are a cross-slot error
/// too.
pub fn validate_command_slot(
    command: &dyn Command,
    args: &[Bytes],
    required: Option<Slot>,
) -> Result<Option<Slot>, CommandError> {
    let keys = command.keys(args)?;
    let mut slots = keys.iter().map(|key| calculate_slot(key));

    let Some(slot) = slots.next() else {
        return Ok(None);
    };
    if slots.any(|other| other != slot) {
        return Err(CommandError::CrossSlot);
    }
    if required.is_some_and(|pinned| pinned != slot) {
        return Err(CommandError::CrossSlot);
    }
    Ok(Some(slot))
}

/// Name-based front end to `validate_command_slot`
#[derive(Clone)]
pub struct SlotRouter {
    registry: Arc<CommandRegistry>,
}

impl SlotRouter {
    pub fn new(registry: Arc<CommandRegistry>) -> Self {
        SlotRouter { registry }
    }

    pub fn calculate_slot(&self, key: &[u8]) -> Slot {
        calculate_slot(key)
    }

    /// Resolve the command by name, then validate its keys
    pub fn validate_slot(
        &self,
        name: &str,
        args: &[Bytes],
        pinned: Option<Slot>,
    ) -> Result<Option<Slot>, CommandError> {
        let command = self
            .registry
            .get(name)
            .ok_or_else(|| CommandError::UnknownCommand(name.to_ascii_lowercase()))?;
        validate_command_slot(command.as_ref(), args, pinned)
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }
}
