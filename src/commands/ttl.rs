//! TTL commands (EXPIRE, PEXPIRE, EXPIREAT, PEXPIREAT, TTL, PTTL, PERSIST)
//!
//! The keyspace stores absolute expirations in Unix milliseconds; these
//! commands convert to and from what clients send and expect.

use super::{done, parse_i64, Command, CommandContext, CommandFlags, CommandResult, KeySpec};
use crate::error::CommandError;
use crate::protocol::RespValue;
use crate::store::now_ms;
use bytes::Bytes;

/// EXPIRE family - Set a timeout on a key
///
/// Syntax: EXPIRE key seconds | PEXPIRE key ms | EXPIREAT key unix-s | PEXPIREAT key unix-ms
///
/// An expiration already in the past deletes the key.
pub struct ExpireCommand {
    name: &'static str,
    unit_ms: i64,
    absolute: bool,
}

impl ExpireCommand {
    pub const EXPIRE: Self = ExpireCommand {
        name: "EXPIRE",
        unit_ms: 1000,
        absolute: false,
    };
    pub const PEXPIRE: Self = ExpireCommand {
        name: "PEXPIRE",
        unit_ms: 1,
        absolute: false,
    };
    pub const EXPIREAT: Self = ExpireCommand {
        name: "EXPIREAT",
        unit_ms: 1000,
        absolute: true,
    };
    pub const PEXPIREAT: Self = ExpireCommand {
        name: "PEXPIREAT",
        unit_ms: 1,
        absolute: true,
    };

    fn expiration(&self, amount: i64, now: u64) -> Result<i64, CommandError> {
        let invalid = || CommandError::InvalidExpire(self.name.to_ascii_lowercase());
        let millis = amount.checked_mul(self.unit_ms).ok_or_else(invalid)?;
        if self.absolute {
            Ok(millis)
        } else {
            (now as i64).checked_add(millis).ok_or_else(invalid)
        }
    }
}

impl Command for ExpireCommand {
    fn execute(&self, ctx: &CommandContext, args: &[Bytes]) -> CommandResult {
        let key = &args[0];
        let now = now_ms();
        let at = self.expiration(parse_i64(&args[1])?, now)?;

        let applied = if at <= now as i64 {
            ctx.store.del(key)
        } else {
            ctx.store.set_expiration(key, at as u64)
        };
        done(RespValue::integer(applied as i64))
    }

    fn name(&self) -> &'static str {
        self.name
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

/// TTL / PTTL - Remaining time to live of a key
///
/// Returns:
/// - The remaining time, in seconds (TTL) or milliseconds (PTTL)
/// - -1 if the key exists but has no expiration
/// - -2 if the key does not exist
pub struct TtlCommand {
    name: &'static str,
    millis: bool,
}

impl TtlCommand {
    pub const TTL: Self = TtlCommand {
        name: "TTL",
        millis: false,
    };
    pub const PTTL: Self = TtlCommand {
        name: "PTTL",
        millis: true,
    };
}

impl Command for TtlCommand {
    fn execute(&self, ctx: &CommandContext, args: &[Bytes]) -> CommandResult {
        let raw = ctx.store.ttl(&args[0]);
        if raw < 0 {
            return done(RespValue::integer(raw));
        }

        let remaining = (raw - now_ms() as i64).max(0);
        let reported = if self.millis {
            remaining
        } else {
            (remaining + 500) / 1000
        };
        done(RespValue::integer(reported))
    }

    fn name(&self) -> &'static str {
        self.name
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

/// PERSIST command - Remove the expiration of a key
///
/// Syntax: PERSIST key
pub struct PersistCommand;

impl Command for PersistCommand {
    fn execute(&self, ctx: &CommandContext, args: &[Bytes]) -> CommandResult {
        done(RespValue::integer(ctx.store.persist(&args[0]) as i64))
    }

    fn name(&self) -> &'static str {
        "PERSIST"
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
