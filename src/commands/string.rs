//! String commands (GET, SET, MGET, MSET, APPEND, STRLEN)

use super::{
    done, keyword, modify_as, parse_i64, read_as, Command, CommandContext, CommandFlags,
    CommandResult, KeySpec,
};
use crate::error::CommandError;
use crate::protocol::RespValue;
use crate::store::{now_ms, Value, ValueType, TTL_PERSISTENT};
use bytes::{Bytes, BytesMut};

/// Replace a key's value the way SET does: any previous TTL is dropped
/// unless `keep_ttl` is set.
pub(crate) fn overwrite(ctx: &CommandContext, key: &Bytes, value: Value, keep_ttl: bool) {
    let had_ttl = !keep_ttl && ctx.store.ttl(key) > TTL_PERSISTENT;
    ctx.store.set(key.clone(), value, None);
    if had_ttl {
        ctx.store.persist(key);
    }
}

/// SET command - Set a key to a value
///
/// Syntax: SET key value [EX seconds | PX milliseconds | KEEPTTL] [NX | XX]
pub struct SetCommand;

#[derive(Debug, Default, PartialEq)]
struct SetOptions {
    expire_at: Option<u64>,
    keep_ttl: bool,
    only_if_absent: bool,
    only_if_present: bool,
}

impl SetOptions {
    fn parse(args: &[Bytes]) -> Result<Self, CommandError> {
        let mut options = SetOptions::default();
        let mut iter = args.iter();

        while let Some(arg) = iter.next() {
            match keyword(arg)?.as_str() {
                "NX" if !options.only_if_present => options.only_if_absent = true,
                "XX" if !options.only_if_absent => options.only_if_present = true,
                "KEEPTTL" if options.expire_at.is_none() => options.keep_ttl = true,
                unit @ ("EX" | "PX") if options.expire_at.is_none() && !options.keep_ttl => {
                    let amount = parse_i64(iter.next().ok_or(CommandError::Syntax)?)?;
                    let millis = if unit == "EX" {
                        amount.checked_mul(1000)
                    } else {
                        Some(amount)
                    };
                    let expire_at = millis
                        .filter(|ms| *ms > 0)
                        .and_then(|ms| (now_ms() as i64).checked_add(ms))
                        .ok_or_else(|| CommandError::InvalidExpire("set".to_string()))?;
                    options.expire_at = Some(expire_at as u64);
                }
                _ => return Err(CommandError::Syntax),
            }
        }
        Ok(options)
    }
}

impl Command for SetCommand {
    fn execute(&self, ctx: &CommandContext, args: &[Bytes]) -> CommandResult {
        let (key, value) = (&args[0], &args[1]);
        let options = SetOptions::parse(&args[2..])?;

        let exists = ctx.store.exists(key);
        if (options.only_if_absent && exists) || (options.only_if_present && !exists) {
            return done(RespValue::Null);
        }

        match options.expire_at {
            Some(at) => ctx.store.set(key.clone(), Value::String(value.clone()), Some(at)),
            None => overwrite(ctx, key, Value::String(value.clone()), options.keep_ttl),
        }
        done(RespValue::ok())
    }

    fn name(&self) -> &'static str {
        "SET"
    }

    fn min_args(&self) -> usize {
        2
    }

    fn flags(&self) -> CommandFlags {
        CommandFlags::write()
    }

    fn key_spec(&self) -> KeySpec {
        KeySpec::First
    }
}

/// GET command - Get the value of a key
///
/// Syntax: GET key
pub struct GetCommand;

impl Command for GetCommand {
    fn execute(&self, ctx: &CommandContext, args: &[Bytes]) -> CommandResult {
        let value = read_as(&ctx.store, &args[0], |v| v.as_string().cloned())?;
        done(value.into())
    }

    fn name(&self) -> &'static str {
        "GET"
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

/// MGET command - Get the values of several keys
///
/// Syntax: MGET key [key ...]
pub struct MGetCommand;

impl Command for MGetCommand {
    fn execute(&self, ctx: &CommandContext, args: &[Bytes]) -> CommandResult {
        // Non-string values read as nil
        let values = args
            .iter()
            .map(|key| ctx.store.view(key, |v| v.as_string().cloned()).flatten().into())
            .collect();
        done(RespValue::Array(values))
    }

    fn name(&self) -> &'static str {
        "MGET"
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

/// MSET command - Set several keys at once
///
/// Syntax: MSET key value [key value ...]
pub struct MSetCommand;

impl Command for MSetCommand {
    fn execute(&self, ctx: &CommandContext, args: &[Bytes]) -> CommandResult {
        if args.len() % 2 != 0 {
            return Err(CommandError::WrongArity("mset".to_string()));
        }

        for pair in args.chunks_exact(2) {
            overwrite(ctx, &pair[0], Value::String(pair[1].clone()), false);
        }
        done(RespValue::ok())
    }

    fn name(&self) -> &'static str {
        "MSET"
    }

    fn min_args(&self) -> usize {
        2
    }

    fn flags(&self) -> CommandFlags {
        CommandFlags::write()
    }

    fn key_spec(&self) -> KeySpec {
        KeySpec::Pairs
    }
}

/// APPEND command - Append to a string, creating it if needed
///
/// Syntax: APPEND key value
pub struct AppendCommand;

impl Command for AppendCommand {
    fn execute(&self, ctx: &CommandContext, args: &[Bytes]) -> CommandResult {
        let (key, suffix) = (&args[0], &args[1]);

        let appended = modify_as(&ctx.store, key, ValueType::String, Value::as_string_mut, |current| {
            let mut joined = BytesMut::with_capacity(current.len() + suffix.len());
            joined.extend_from_slice(current);
            joined.extend_from_slice(suffix);
            *current = joined.freeze();
            current.len()
        })?;

        let len = match appended {
            Some(len) => len,
            None => {
                ctx.store.set(key.clone(), Value::String(suffix.clone()), None);
                suffix.len()
            }
        };
        done(RespValue::integer(len as i64))
    }

    fn name(&self) -> &'static str {
        "APPEND"
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

/// STRLEN command - Length of a string value
///
/// Syntax: STRLEN key
pub struct StrLenCommand;

impl Command for StrLenCommand {
    fn execute(&self, ctx: &CommandContext, args: &[Bytes]) -> CommandResult {
        let len = read_as(&ctx.store, &args[0], |v| v.as_string().map(Bytes::len))?.unwrap_or(0);
        done(RespValue::integer(len as i64))
    }

    fn name(&self) -> &'static str {
        "STRLEN"
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

#[cfg(test)]
mod tests {
    use super::super::test_support::run;
    use super::*;
    use crate::store::TTL_PERSISTENT;

    #[test]
    fn test_set_get() {
        let ctx = CommandContext::new();

        assert_eq!(run(&SetCommand, &ctx, &["mykey", "myvalue"]), RespValue::ok());
        assert_eq!(
            run(&GetCommand, &ctx, &["mykey"]),
            RespValue::bulk_string("myvalue")
        );
        assert_eq!(run(&GetCommand, &ctx, &["nonexistent"]), RespValue::Null);
    }

    #[test]
    fn test_set_nx_xx() {
        let ctx = CommandContext::new();

        assert_eq!(run(&SetCommand, &ctx, &["k", "1", "XX"]), RespValue::Null);
        assert_eq!(run(&SetCommand, &ctx, &["k", "1", "nx"]), RespValue::ok());
        assert_eq!(run(&SetCommand, &ctx, &["k", "2", "NX"]), RespValue::Null);
        assert_eq!(run(&SetCommand, &ctx, &["k", "3", "XX"]), RespValue::ok());
        assert_eq!(run(&GetCommand, &ctx, &["k"]), RespValue::bulk_string("3"));

        assert!(run(&SetCommand, &ctx, &["k", "v", "NX", "XX"]).is_error());
    }

    #[test]
    fn test_set_expiration_options() {
        let ctx = CommandContext::new();

        run(&SetCommand, &ctx, &["k", "v", "EX", "100"]);
        let ttl = ctx.store.ttl(b"k");
        assert!(ttl > now_ms() as i64 + 90_000);

        // KEEPTTL leaves it, a plain SET clears it
        run(&SetCommand, &ctx, &["k", "v2", "KEEPTTL"]);
        assert_eq!(ctx.store.ttl(b"k"), ttl);
        run(&SetCommand, &ctx, &["k", "v3"]);
        assert_eq!(ctx.store.ttl(b"k"), TTL_PERSISTENT);

        assert_eq!(
            run(&SetCommand, &ctx, &["k", "v", "PX", "0"]),
            RespValue::error("ERR invalid expire time in 'set' command")
        );
        assert!(run(&SetCommand, &ctx, &["k", "v", "EX"]).is_error());
        assert!(run(&SetCommand, &ctx, &["k", "v", "EX", "1", "KEEPTTL"]).is_error());
    }

    #[test]
    fn test_get_wrong_type() {
        let ctx = CommandContext::new();
        ctx.store.set("list", Value::list(["a"]), None);

        assert_eq!(
            run(&GetCommand, &ctx, &["list"]),
            RespValue::error("WRONGTYPE Operation against a key holding the wrong kind of value")
        );
    }

    #[test]
    fn test_mset_mget() {
        let ctx = CommandContext::new();
        ctx.store.set("list", Value::list(["a"]), None);

        assert_eq!(run(&MSetCommand, &ctx, &["a", "1", "b", "2"]), RespValue::ok());
        assert_eq!(
            run(&MGetCommand, &ctx, &["a", "missing", "list", "b"]),
            RespValue::array(vec![
                RespValue::bulk_string("1"),
                RespValue::Null,
                RespValue::Null,
                RespValue::bulk_string("2"),
            ])
        );
    }

    #[test]
    fn test_append_and_strlen() {
        let ctx = CommandContext::new();

        assert_eq!(run(&AppendCommand, &ctx, &["k", "Hello"]), RespValue::integer(5));
        assert_eq!(run(&AppendCommand, &ctx, &["k", " World"]), RespValue::integer(11));
        assert_eq!(run(&StrLenCommand, &ctx, &["k"]), RespValue::integer(11));
        assert_eq!(run(&StrLenCommand, &ctx, &["missing"]), RespValue::integer(0));
        assert_eq!(
            run(&GetCommand, &ctx, &["k"]),
            RespValue::bulk_string("Hello World")
        );
    }
}
