//! Command execution context

use crate::cluster::OwnershipValidator;
use crate::store::Keyspace;
use std::rc::Rc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// How the current command was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Straight from a client connection
    Live,
    /// Replayed from an EXEC batch
    Transaction,
    /// Called through the script bridge
    Script,
}

/// Context provided to commands during execution
///
/// Gives commands access to the keyspace and the cluster view. Built per job
/// on the kernel thread, so it is deliberately not `Send`.
#[derive(Clone)]
pub struct CommandContext {
    /// The keyspace
    pub store: Rc<Keyspace>,

    /// Connection that issued the command
    pub connection_id: u64,

    /// Cancellation of the issuing job
    pub signal: CancellationToken,

    pub mode: ExecutionMode,

    /// Local node identity and slot ownership
    pub cluster: Arc<OwnershipValidator>,
}

impl CommandContext {
    /// Create a standalone context over a fresh keyspace
    pub fn new() -> Self {
        CommandContext {
            store: Rc::new(Keyspace::new()),
            connection_id: 0,
            signal: CancellationToken::new(),
            mode: ExecutionMode::Live,
            cluster: Arc::new(OwnershipValidator::standalone("local")),
        }
    }

    /// Same keyspace and connection, different mode
    pub fn with_mode(&self, mode: ExecutionMode) -> Self {
        CommandContext {
            mode,
            ..self.clone()
        }
    }

    /// Blocking commands only suspend on live connections
    pub fn can_block(&self) -> bool {
        self.mode == ExecutionMode::Live
    }
}

impl Default for CommandContext {
    fn default() -> Self {
        Self::new()
    }
}
