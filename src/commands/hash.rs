//! Hash commands (HSET, HGET, HGETALL, HDEL)

use super::{
    done, modify_as, read_as, remove_if_empty, Command, CommandContext, CommandFlags,
    CommandResult, KeySpec,
};
use crate::error::CommandError;
use crate::protocol::RespValue;
use crate::store::{Value, ValueType};
use bytes::Bytes;
use std::collections::HashMap;

/// HSET command - Set field in the hash stored at key to value
///
/// Syntax: HSET key field value [field value ...]
pub struct HSetCommand;

impl Command for HSetCommand {
    fn execute(&self, ctx: &CommandContext, args: &[Bytes]) -> CommandResult {
        self.check_arity(args)?;
        let (key, pairs) = (&args[0], &args[1..]);

        let added = modify_as(&ctx.store, key, ValueType::Hash, Value::as_hash_mut, |hash| {
            pairs
                .chunks_exact(2)
                .filter(|pair| hash.insert(pair[0].clone(), pair[1].clone()).is_none())
                .count()
        })?;

        let added = match added {
            Some(added) => added,
            None => {
                let hash: HashMap<Bytes, Bytes> = pairs
                    .chunks_exact(2)
                    .map(|pair| (pair[0].clone(), pair[1].clone()))
                    .collect();
                let added = hash.len();
                ctx.store.set(key.clone(), Value::Hash(hash), None);
                added
            }
        };
        done(RespValue::integer(added as i64))
    }

    fn name(&self) -> &'static str {
        "HSET"
    }

    fn min_args(&self) -> usize {
        3
    }

    /// Fields and values must come in pairs
    fn check_arity(&self, args: &[Bytes]) -> Result<(), CommandError> {
        if args.len() < self.min_args() || args.len() % 2 == 0 {
            return Err(CommandError::WrongArity("hset".to_string()));
        }
        Ok(())
    }

    fn flags(&self) -> CommandFlags {
        CommandFlags::write_fast()
    }

    fn key_spec(&self) -> KeySpec {
        KeySpec::First
    }
}

/// HGET command - Get the value of a hash field
///
/// Syntax: HGET key field
pub struct HGetCommand;

impl Command for HGetCommand {
    fn execute(&self, ctx: &CommandContext, args: &[Bytes]) -> CommandResult {
        let field = &args[1];
        let value = read_as(&ctx.store, &args[0], |v| v.as_hash().map(|h| h.get(field).cloned()))?;
        done(value.flatten().into())
    }

    fn name(&self) -> &'static str {
        "HGET"
    }

    fn min_args(&self) -> usize {
        2
    }

    fn max_args(&self) -> Option<usize> {
        Some(2)
    }

    fn flags(&self) -> CommandFlags {
        CommandFlags::readonly()
    }

    fn key_spec(&self) -> KeySpec {
        KeySpec::First
    }
}

/// HGETALL command - Get all fields and values, flattened
///
/// Syntax: HGETALL key
pub struct HGetAllCommand;

impl Command for HGetAllCommand {
    fn execute(&self, ctx: &CommandContext, args: &[Bytes]) -> CommandResult {
        let flat = read_as(&ctx.store, &args[0], |v| {
            v.as_hash().map(|hash| {
                hash.iter()
                    .flat_map(|(field, value)| [field.clone(), value.clone()])
                    .collect::<Vec<_>>()
            })
        })?;
        done(RespValue::bulk_array(flat.unwrap_or_default()))
    }

    fn name(&self) -> &'static str {
        "HGETALL"
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

/// HDEL command - Delete hash fields
///
/// Syntax: HDEL key field [field ...]
pub struct HDelCommand;

impl Command for HDelCommand {
    fn execute(&self, ctx: &CommandContext, args: &[Bytes]) -> CommandResult {
        let (key, fields) = (&args[0], &args[1..]);

        let removed = modify_as(&ctx.store, key, ValueType::Hash, Value::as_hash_mut, |hash| {
            fields.iter().filter(|f| hash.remove(&f[..]).is_some()).count()
        })?
        .unwrap_or(0);

        remove_if_empty(&ctx.store, key);
        done(RespValue::integer(removed as i64))
    }

    fn name(&self) -> &'static str {
        "HDEL"
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
