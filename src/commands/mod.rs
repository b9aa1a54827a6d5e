//! Command execution module
//!
//! Provides a unified interface for all commands through the Command trait.
//! Each command family is implemented in a separate file for high cohesion.
//! Commands run on the kernel thread, against the keyspace in their context.

mod context;
mod registry;

// Command implementations
mod admin;
mod blocking;
mod cluster;
mod counter;
mod hash;
mod key;
mod list;
mod set;
mod string;
mod ttl;

pub use context::{CommandContext, ExecutionMode};
pub use registry::CommandRegistry;

use crate::error::CommandError;
use crate::kernel::JobOutcome;
use crate::protocol::RespValue;
use crate::store::{Keyspace, Value, ValueType};
use bytes::Bytes;

bitflags::bitflags! {
    /// Static command metadata
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CommandFlags: u8 {
        /// Modifies data
        const WRITE    = 1 << 0;
        /// Only reads data
        const READONLY = 1 << 1;
        /// Constant time
        const FAST     = 1 << 2;
        /// Output is not a function of the keyspace
        const RANDOM   = 1 << 3;
        /// May suspend waiting for other connections
        const BLOCKING = 1 << 4;
        /// Refused by the script bridge
        const NOSCRIPT = 1 << 5;
        /// Server administration
        const ADMIN    = 1 << 6;
    }
}

impl CommandFlags {
    /// Commands a script may not call
    pub const SCRIPT_DENIED: Self = Self::RANDOM
        .union(Self::BLOCKING)
        .union(Self::NOSCRIPT)
        .union(Self::ADMIN);

    pub const fn readonly() -> Self {
        Self::READONLY.union(Self::FAST)
    }

    pub const fn write() -> Self {
        Self::WRITE
    }

    pub const fn write_fast() -> Self {
        Self::WRITE.union(Self::FAST)
    }
}

/// Where a command's keys sit in its arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySpec {
    /// No keys
    None,
    /// The first argument
    First,
    /// Every argument
    All,
    /// Every other argument starting with the first (`MSET k v k v`)
    Pairs,
    /// Every argument except the last (`BLPOP k1 k2 timeout`)
    AllButLast,
}

impl KeySpec {
    fn extract(self, args: &[Bytes]) -> Option<Vec<Bytes>> {
        let keys = match self {
            KeySpec::None => Vec::new(),
            KeySpec::First => args.first().cloned().into_iter().collect(),
            KeySpec::All => args.to_vec(),
            KeySpec::Pairs => {
                if args.len() % 2 != 0 {
                    return None;
                }
                args.iter().step_by(2).cloned().collect()
            }
            KeySpec::AllButLast => args.split_last().map(|(_, keys)| keys.to_vec())?,
        };
        Some(keys)
    }
}

/// What a command hands back to its connection
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Send and keep going
    Frame(RespValue),
    /// Send, then close the connection
    Close(RespValue),
}

impl Reply {
    pub fn value(&self) -> &RespValue {
        match self {
            Reply::Frame(value) | Reply::Close(value) => value,
        }
    }

    pub fn into_value(self) -> RespValue {
        match self {
            Reply::Frame(value) | Reply::Close(value) => value,
        }
    }

    pub fn is_close(&self) -> bool {
        matches!(self, Reply::Close(_))
    }
}

impl From<RespValue> for Reply {
    fn from(value: RespValue) -> Self {
        Reply::Frame(value)
    }
}

/// Settled reply, or a suspension that settles later
pub type CommandOutcome = JobOutcome<Reply, CommandError>;

pub type CommandResult = Result<CommandOutcome, CommandError>;

/// Command execution trait
///
/// All commands implement this trait. `execute` is the synchronous body run
/// by the kernel; blocking commands return a suspended outcome instead of
/// waiting.
pub trait Command: Send + Sync {
    /// Execute the command against the context's keyspace
    ///
    /// `args` excludes the command name itself.
    fn execute(&self, ctx: &CommandContext, args: &[Bytes]) -> CommandResult;

    /// Get the command name (for debugging/logging)
    fn name(&self) -> &'static str;

    /// Get the minimum number of arguments required
    fn min_args(&self) -> usize {
        0
    }

    /// Get the maximum number of arguments (None = unlimited)
    fn max_args(&self) -> Option<usize> {
        None
    }

    fn flags(&self) -> CommandFlags {
        CommandFlags::empty()
    }

    fn key_spec(&self) -> KeySpec {
        KeySpec::None
    }

    /// Fail with an arity error if `args` has the wrong length
    fn check_arity(&self, args: &[Bytes]) -> Result<(), CommandError> {
        let too_many = self.max_args().is_some_and(|max| args.len() > max);
        if args.len() < self.min_args() || too_many {
            return Err(CommandError::WrongArity(self.name().to_ascii_lowercase()));
        }
        Ok(())
    }

    /// Keys this invocation touches, used for slot routing and WATCH
    fn keys(&self, args: &[Bytes]) -> Result<Vec<Bytes>, CommandError> {
        self.check_arity(args)?;
        self.key_spec()
            .extract(args)
            .ok_or_else(|| CommandError::WrongArity(self.name().to_ascii_lowercase()))
    }
}

/// Settle immediately with a reply
pub(crate) fn done(value: RespValue) -> CommandResult {
    Ok(JobOutcome::Done(Reply::Frame(value)))
}

/// Parse a signed integer argument
pub(crate) fn parse_i64(arg: &[u8]) -> Result<i64, CommandError> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(CommandError::NotInteger)
}

/// Upper-cased option keyword, or a syntax error for non-UTF-8 input
pub(crate) fn keyword(arg: &[u8]) -> Result<String, CommandError> {
    std::str::from_utf8(arg)
        .map(str::to_ascii_uppercase)
        .map_err(|_| CommandError::Syntax)
}

/// Read a key through a typed projection
///
/// Absent keys give `Ok(None)`; a value `project` rejects is a type error.
pub(crate) fn read_as<T>(
    store: &Keyspace,
    key: &[u8],
    project: impl FnOnce(&Value) -> Option<T>,
) -> Result<Option<T>, CommandError> {
    match store.view(key, project) {
        None => Ok(None),
        Some(None) => Err(CommandError::WrongType),
        Some(found) => Ok(found),
    }
}

/// Mutate a key of an expected type in place
///
/// The type is checked before anything changes, so a type error never emits
/// an event. Absent keys give `Ok(None)`.
pub(crate) fn modify_as<C: ?Sized, R>(
    store: &Keyspace,
    key: &[u8],
    expected: ValueType,
    project: impl for<'a> FnOnce(&'a mut Value) -> Option<&'a mut C>,
    f: impl FnOnce(&mut C) -> R,
) -> Result<Option<R>, CommandError> {
    match store.view(key, Value::value_type) {
        None => Ok(None),
        Some(found) if found != expected => Err(CommandError::WrongType),
        Some(_) => Ok(store.modify(key, |value| project(value).map(f)).flatten()),
    }
}

/// Drop a collection key that a removal left empty
pub(crate) fn remove_if_empty(store: &Keyspace, key: &[u8]) {
    if store.view(key, Value::is_empty_collection) == Some(true) {
        store.del(key);
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn args(parts: &[&str]) -> Vec<Bytes> {
        parts.iter().map(|p| Bytes::copy_from_slice(p.as_bytes())).collect()
    }

    /// Run a command that must settle synchronously
    pub fn run(cmd: &dyn Command, ctx: &CommandContext, parts: &[&str]) -> RespValue {
        let args = args(parts);
        match cmd.execute(ctx, &args) {
            Ok(JobOutcome::Done(reply)) => reply.into_value(),
            Ok(JobOutcome::Suspended(_)) => panic!("{} suspended unexpectedly", cmd.name()),
            Err(e) => e.to_resp(),
        }
    }
}
