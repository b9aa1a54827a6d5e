//! List commands (LPUSH, RPUSH, LPOP, RPOP, LRANGE, LLEN)

use super::{
    done, modify_as, parse_i64, read_as, remove_if_empty, Command, CommandContext, CommandFlags,
    CommandResult, KeySpec,
};
use crate::error::CommandError;
use crate::protocol::RespValue;
use crate::store::{Keyspace, Value, ValueType};
use bytes::Bytes;
use std::collections::VecDeque;

/// Which end of a list an operation works on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum End {
    Head,
    Tail,
}

/// Pop up to `count` elements from one end, dropping the key once empty
///
/// `Ok(None)` if the key is absent.
pub(crate) fn pop_elements(
    store: &Keyspace,
    key: &[u8],
    end: End,
    count: usize,
) -> Result<Option<Vec<Bytes>>, CommandError> {
    let popped = modify_as(store, key, ValueType::List, Value::as_list_mut, |list| {
        let take = count.min(list.len());
        (0..take)
            .filter_map(|_| match end {
                End::Head => list.pop_front(),
                End::Tail => list.pop_back(),
            })
            .collect::<Vec<_>>()
    })?;

    if popped.is_some() {
        remove_if_empty(store, key);
    }
    Ok(popped)
}

/// LPUSH / RPUSH - Add values to one end of a list, creating it if needed
///
/// Syntax: LPUSH key value [value ...]
pub struct PushCommand {
    name: &'static str,
    end: End,
}

impl PushCommand {
    pub const LPUSH: Self = PushCommand {
        name: "LPUSH",
        end: End::Head,
    };
    pub const RPUSH: Self = PushCommand {
        name: "RPUSH",
        end: End::Tail,
    };
}

impl Command for PushCommand {
    fn execute(&self, ctx: &CommandContext, args: &[Bytes]) -> CommandResult {
        let (key, values) = (&args[0], &args[1..]);
        let end = self.end;

        // Length is taken before blocked poppers are woken by the Set event
        let pushed = modify_as(&ctx.store, key, ValueType::List, Value::as_list_mut, |list| {
            for value in values {
                match end {
                    End::Head => list.push_front(value.clone()),
                    End::Tail => list.push_back(value.clone()),
                }
            }
            list.len()
        })?;

        let len = match pushed {
            Some(len) => len,
            None => {
                let list: VecDeque<Bytes> = match end {
                    End::Head => values.iter().rev().cloned().collect(),
                    End::Tail => values.iter().cloned().collect(),
                };
                ctx.store.set(key.clone(), Value::List(list), None);
                values.len()
            }
        };
        done(RespValue::integer(len as i64))
    }

    fn name(&self) -> &'static str {
        self.name
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

/// LPOP / RPOP - Remove and return elements from one end of a list
///
/// Syntax: LPOP key [count]
pub struct PopCommand {
    name: &'static str,
    end: End,
}

impl PopCommand {
    pub const LPOP: Self = PopCommand {
        name: "LPOP",
        end: End::Head,
    };
    pub const RPOP: Self = PopCommand {
        name: "RPOP",
        end: End::Tail,
    };
}

impl Command for PopCommand {
    fn execute(&self, ctx: &CommandContext, args: &[Bytes]) -> CommandResult {
        let count = match args.get(1) {
            Some(arg) => {
                let count = parse_i64(arg)?;
                Some(usize::try_from(count).map_err(|_| CommandError::NotInteger)?)
            }
            None => None,
        };

        let popped = pop_elements(&ctx.store, &args[0], self.end, count.unwrap_or(1))?;
        let reply = match (popped, count) {
            (None, None) => RespValue::Null,
            (None, Some(_)) => RespValue::NullArray,
            (Some(values), None) => values.into_iter().next().into(),
            (Some(values), Some(_)) => RespValue::bulk_array(values),
        };
        done(reply)
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn min_args(&self) -> usize {
        1
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

/// Inclusive index range of `[start, stop]` over a list of `len`, negative
/// indexes counting from the tail. `None` when the range is empty.
fn normalize_range(start: i64, stop: i64, len: usize) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };

    (start <= stop && start < len).then(|| (start as usize, stop as usize))
}

/// LRANGE command - Get a range of elements from a list
///
/// Syntax: LRANGE key start stop
pub struct LRangeCommand;

impl Command for LRangeCommand {
    fn execute(&self, ctx: &CommandContext, args: &[Bytes]) -> CommandResult {
        let start = parse_i64(&args[1])?;
        let stop = parse_i64(&args[2])?;

        let items = read_as(&ctx.store, &args[0], |v| {
            v.as_list().map(|list| match normalize_range(start, stop, list.len()) {
                Some((from, to)) => list.range(from..=to).cloned().collect(),
                None => Vec::new(),
            })
        })?;
        done(RespValue::bulk_array(items.unwrap_or_default()))
    }

    fn name(&self) -> &'static str {
        "LRANGE"
    }

    fn min_args(&self) -> usize {
        3
    }

    fn max_args(&self) -> Option<usize> {
        Some(3)
    }

    fn flags(&self) -> CommandFlags {
        CommandFlags::READONLY
    }

    fn key_spec(&self) -> KeySpec {
        KeySpec::First
    }
}

/// LLEN command - Get the length of a list
///
/// Syntax: LLEN key
pub struct LLenCommand;

impl Command for LLenCommand {
    fn execute(&self, ctx: &CommandContext, args: &[Bytes]) -> CommandResult {
        let len = read_as(&ctx.store, &args[0], |v| v.as_list().map(VecDeque::len))?.unwrap_or(0);
        done(RespValue::integer(len as i64))
    }

    fn name(&self) -> &'static str {
        "LLEN"
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
