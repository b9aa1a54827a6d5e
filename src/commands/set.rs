//! Set commands (SADD, SREM, SMEMBERS, SCARD)

use super::{
    done, modify_as, read_as, remove_if_empty, Command, CommandContext, CommandFlags,
    CommandResult, KeySpec,
};
use crate::protocol::RespValue;
use crate::store::{Value, ValueType};
use bytes::Bytes;
use std::collections::HashSet;

/// SADD command - Add one or more members to a set
///
/// Syntax: SADD key member [member ...]
pub struct SAddCommand;

impl Command for SAddCommand {
    fn execute(&self, ctx: &CommandContext, args: &[Bytes]) -> CommandResult {
        let (key, members) = (&args[0], &args[1..]);

        let added = modify_as(&ctx.store, key, ValueType::Set, Value::as_set_mut, |set| {
            members.iter().filter(|m| set.insert((*m).clone())).count()
        })?;

        let added = match added {
            Some(added) => added,
            None => {
                let set: HashSet<Bytes> = members.iter().cloned().collect();
                let added = set.len();
                ctx.store.set(key.clone(), Value::Set(set), None);
                added
            }
        };
        done(RespValue::integer(added as i64))
    }

    fn name(&self) -> &'static str {
        "SADD"
    }

    fn min_args(&self) -> usize {
        2
    }

    fn flags(&self) -> CommandFlags {
        CommandFlags::write_fast()
    }

    fn key_spec(&self) -> KeySpec {
        KeySpec::First
    }
}

/// SREM command - Remove members from a set
///
/// Syntax: SREM key member [member ...]
pub struct SRemCommand;

impl Command for SRemCommand {
    fn execute(&self, ctx: &CommandContext, args: &[Bytes]) -> CommandResult {
        let (key, members) = (&args[0], &args[1..]);

        let removed = modify_as(&ctx.store, key, ValueType::Set, Value::as_set_mut, |set| {
            members.iter().filter(|m| set.remove(&m[..])).count()
        })?
        .unwrap_or(0);

        remove_if_empty(&ctx.store, key);
        done(RespValue::integer(removed as i64))
    }

    fn name(&self) -> &'static str {
        "SREM"
    }

    fn min_args(&self) -> usize {
        2
    }

    fn flags(&self) -> CommandFlags {
        CommandFlags::write_fast()
    }

    fn key_spec(&self) -> KeySpec {
        KeySpec::First
    }
}

/// SMEMBERS command - Get all members of a set
///
/// Syntax: SMEMBERS key
pub struct SMembersCommand;

impl Command for SMembersCommand {
    fn execute(&self, ctx: &CommandContext, args: &[Bytes]) -> CommandResult {
        let members = read_as(&ctx.store, &args[0], |v| {
            v.as_set().map(|set| set.iter().cloned().collect::<Vec<_>>())
        })?;
        done(RespValue::bulk_array(members.unwrap_or_default()))
    }

    fn name(&self) -> &'static str {
        "SMEMBERS"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }

    fn flags(&self) -> CommandFlags {
        CommandFlags::READONLY
    }

    fn key_spec(&self) -> KeySpec {
        KeySpec::First
    }
}

/// SCARD command - Get the number of members in a set
///
/// Syntax: SCARD key
pub struct SCardCommand;

impl Command for SCardCommand {
    fn execute(&self, ctx: &CommandContext, args: &[Bytes]) -> CommandResult {
        let len = read_as(&ctx.store, &args[0], |v| v.as_set().map(HashSet::len))?.unwrap_or(0);
        done(RespValue::integer(len as i64))
    }

    fn name(&self) -> &'static str {
        "SCARD"
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
