//! Protocol-facing error types
//!
//! Every error a client can observe carries a short class name that becomes
//! the prefix of the RESP error line (`-CROSSSLOT ...`, `-MOVED ...`).

use crate::protocol::RespValue;
use thiserror::Error;

/// Errors produced while validating, routing or executing a command
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("wrong number of arguments for '{0}' command")]
    WrongArity(String),

    #[error("unknown subcommand '{0}'")]
    UnknownSubcommand(String),

    #[error("syntax error")]
    Syntax,

    #[error("Operation against a key holding the wrong kind of value")]
    WrongType,

    #[error("value is not an integer or out of range")]
    NotInteger,

    #[error("increment or decrement would overflow")]
    Overflow,

    #[error("invalid expire time in '{0}' command")]
    InvalidExpire(String),

    #[error("timeout is not a float or out of range")]
    InvalidTimeout,

    #[error("Keys in request don't hash to the same slot")]
    CrossSlot,

    #[error("{slot} {host}:{port}")]
    Moved { slot: u16, host: String, port: u16 },

    #[error("Hash slot not served")]
    ClusterDown,

    #[error("Transaction discarded because of previous errors.")]
    ExecAbort,

    #[error("MULTI calls can not be nested")]
    NestedMulti,

    #[error("EXEC without MULTI")]
    ExecWithoutMulti,

    #[error("DISCARD without MULTI")]
    DiscardWithoutMulti,

    #[error("WATCH inside MULTI is not allowed")]
    WatchInsideMulti,

    #[error("This command is not allowed from script")]
    NotAllowedFromScript,

    #[error("command cancelled")]
    Cancelled,

    #[error("{0}")]
    Internal(String),
}

impl CommandError {
    /// Wire class used as the error prefix
    pub fn class(&self) -> &'static str {
        match self {
            CommandError::WrongType => "WRONGTYPE",
            CommandError::CrossSlot => "CROSSSLOT",
            CommandError::Moved { .. } => "MOVED",
            CommandError::ClusterDown => "CLUSTERDOWN",
            CommandError::ExecAbort => "EXECABORT",
            _ => "ERR",
        }
    }

    /// Dispatch-time errors that poison an open transaction
    pub fn aborts_transaction(&self) -> bool {
        matches!(
            self,
            CommandError::UnknownCommand(_) | CommandError::WrongArity(_)
        )
    }

    /// Render as a RESP error value
    pub fn to_resp(&self) -> RespValue {
        RespValue::error(format!("{} {}", self.class(), self))
    }
}

impl From<crate::kernel::KernelError> for CommandError {
    fn from(err: crate::kernel::KernelError) -> Self {
        CommandError::Internal(err.to_string())
    }
}
