//! Key commands (DEL, EXISTS, TYPE)

use super::{done, Command, CommandContext, CommandFlags, CommandResult, KeySpec};
use crate::protocol::RespValue;
use bytes::Bytes;

/// DEL command - Delete one or more keys
///
/// Syntax: DEL key [key ...]
pub struct DelCommand;

impl Command for DelCommand {
    fn execute(&self, ctx: &CommandContext, args: &[Bytes]) -> CommandResult {
        let deleted = args.iter().filter(|key| ctx.store.del(key)).count();
        done(RespValue::integer(deleted as i64))
    }

    fn name(&self) -> &'static str {
        "DEL"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn flags(&self) -> CommandFlags {
        CommandFlags::write()
    }

    fn key_spec(&self) -> KeySpec {
        KeySpec::All
    }
}

/// EXISTS command - Check if one or more keys exist
///
/// Syntax: EXISTS key [key ...]
///
/// A key named twice is counted twice.
pub struct ExistsCommand;

impl Command for ExistsCommand {
    fn execute(&self, ctx: &CommandContext, args: &[Bytes]) -> CommandResult {
        let count = args.iter().filter(|key| ctx.store.exists(key)).count();
        done(RespValue::integer(count as i64))
    }

    fn name(&self) -> &'static str {
        "EXISTS"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn flags(&self) -> CommandFlags {
        CommandFlags::readonly()
    }

    fn key_spec(&self) -> KeySpec {
        KeySpec::All
    }
}

/// TYPE command - Type of the value stored at a key
///
/// Syntax: TYPE key
pub struct TypeCommand;

impl Command for TypeCommand {
    fn execute(&self, ctx: &CommandContext, args: &[Bytes]) -> CommandResult {
        let name = ctx
            .store
            .view(&args[0], |v| v.value_type().as_str())
            .unwrap_or("none");
        done(RespValue::simple_string(name))
    }

    fn name(&self) -> &'static str {
        "TYPE"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }

    fn flags(&self) -> CommandFlags {
        CommandFlags::readonly()
    }

    fn key_spec(&self) -> KeySpec {
        KeySpec::First
    }
}
