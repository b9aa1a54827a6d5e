//! Counter commands (INCR, INCRBY, DECR, DECRBY)

use super::{done, modify_as, parse_i64, read_as, Command, CommandContext, CommandFlags, CommandResult, KeySpec};
use crate::error::CommandError;
use crate::protocol::RespValue;
use crate::store::{Value, ValueType};
use bytes::Bytes;

/// Add `delta` to the integer stored at `key`, creating it at 0
///
/// The existing expiration is kept, as with any in-place update.
fn apply_delta(ctx: &CommandContext, key: &Bytes, delta: i64) -> Result<i64, CommandError> {
    let current = match read_as(&ctx.store, key, |v| v.as_string().cloned())? {
        Some(bytes) => Some(parse_i64(&bytes)?),
        None => None,
    };

    let next = current
        .unwrap_or(0)
        .checked_add(delta)
        .ok_or(CommandError::Overflow)?;
    let encoded = Bytes::from(next.to_string());

    match current {
        Some(_) => {
            modify_as(&ctx.store, key, ValueType::String, Value::as_string_mut, |bytes| {
                *bytes = encoded;
            })?;
        }
        None => ctx.store.set(key.clone(), Value::String(encoded), None),
    }
    Ok(next)
}

fn parse_delta(arg: &[u8], negate: bool) -> Result<i64, CommandError> {
    let delta = parse_i64(arg)?;
    if negate {
        delta.checked_neg().ok_or(CommandError::Overflow)
    } else {
        Ok(delta)
    }
}

/// INCR command - Increment the integer value of a key by 1
///
/// Syntax: INCR key
pub struct IncrCommand;

impl Command for IncrCommand {
    fn execute(&self, ctx: &CommandContext, args: &[Bytes]) -> CommandResult {
        done(RespValue::integer(apply_delta(ctx, &args[0], 1)?))
    }

    fn name(&self) -> &'static str {
        "INCR"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }

    fn flags(&self) -> CommandFlags {
        CommandFlags::write_fast()
    }

    fn key_spec(&self) -> KeySpec {
        KeySpec::First
    }
}

/// INCRBY command - Increment the integer value of a key by a given amount
///
/// Syntax: INCRBY key increment
pub struct IncrByCommand;

impl Command for IncrByCommand {
    fn execute(&self, ctx: &CommandContext, args: &[Bytes]) -> CommandResult {
        let delta = parse_delta(&args[1], false)?;
        done(RespValue::integer(apply_delta(ctx, &args[0], delta)?))
    }

    fn name(&self) -> &'static str {
        "INCRBY"
    }

    fn min_args(&self) -> usize {
        2
    }

    fn max_args(&self) -> Option<usize> {
        Some(2)
    }

    fn flags(&self) -> CommandFlags {
        CommandFlags::write_fast()
    }

    fn key_spec(&self) -> KeySpec {
        KeySpec::First
    }
}

/// DECR command - Decrement the integer value of a key by 1
///
/// Syntax: DECR key
pub struct DecrCommand;

impl Command for DecrCommand {
    fn execute(&self, ctx: &CommandContext, args: &[Bytes]) -> CommandResult {
        done(RespValue::integer(apply_delta(ctx, &args[0], -1)?))
    }

    fn name(&self) -> &'static str {
        "DECR"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }

    fn flags(&self) -> CommandFlags {
        CommandFlags::write_fast()
    }

    fn key_spec(&self) -> KeySpec {
        KeySpec::First
    }
}

/// DECRBY command - Decrement the integer value of a key by a given amount
///
/// Syntax: DECRBY key decrement
pub struct DecrByCommand;

impl Command for DecrByCommand {
    fn execute(&self, ctx: &CommandContext, args: &[Bytes]) -> CommandResult {
        let delta = parse_delta(&args[1], true)?;
        done(RespValue::integer(apply_delta(ctx, &args[0], delta)?))
    }

    fn name(&self) -> &'static str {
        "DECRBY"
    }

    fn min_args(&self) -> usize {
        2
    }

    fn max_args(&self) -> Option<usize> {
        Some(2)
    }

    fn flags(&self) -> CommandFlags {
        CommandFlags::write_fast()
    }

    fn key_spec(&self) -> KeySpec {
        KeySpec::First
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::run;
    use super::*;
    use crate::store::now_ms;

    #[test]
    fn test_incr_decr() {
        let ctx = CommandContext::new();

        assert_eq!(run(&IncrCommand, &ctx, &["counter"]), RespValue::integer(1));
        assert_eq!(run(&IncrByCommand, &ctx, &["counter", "10"]), RespValue::integer(11));
        assert_eq!(run(&DecrCommand, &ctx, &["counter"]), RespValue::integer(10));
        assert_eq!(run(&DecrByCommand, &ctx, &["counter", "15"]), RespValue::integer(-5));
        assert_eq!(ctx.store.get(b"counter"), Some(Value::string("-5")));
    }

    #[test]
    fn test_incr_keeps_expiration() {
        let ctx = CommandContext::new();
        let at = now_ms() + 60_000;
        ctx.store.set("n", Value::string("41"), Some(at));

        assert_eq!(run(&IncrCommand, &ctx, &["n"]), RespValue::integer(42));
        assert_eq!(ctx.store.ttl(b"n"), at as i64);
    }

    #[test]
    fn test_not_an_integer() {
        let ctx = CommandContext::new();
        ctx.store.set("s", Value::string("abc"), None);

        assert_eq!(
            run(&IncrCommand, &ctx, &["s"]),
            RespValue::error("ERR value is not an integer or out of range")
        );
        assert!(run(&IncrByCommand, &ctx, &["n", "ten"]).is_error());
    }

    #[test]
    fn test_overflow() {
        let ctx = CommandContext::new();
        ctx.store.set("max", Value::string(i64::MAX.to_string()), None);

        assert!(run(&IncrCommand, &ctx, &["max"]).is_error());
        assert_eq!(ctx.store.get(b"max"), Some(Value::string(i64::MAX.to_string())));
        let min = i64::MIN.to_string();
        assert!(run(&DecrByCommand, &ctx, &["x", min.as_str()]).is_error());
    }
}
