//! Command dispatcher
//!
//! Routes incoming commands to the kernel. A `Dispatcher` is one client
//! session: it owns the connection's transaction state and turns every
//! request into validation, then either a recorded transaction entry or a
//! kernel job.
//!
//! Validation order is fixed: lookup, arity, key extraction, slot, ownership.
//! Nothing is submitted to the kernel until all of it passed, so a rejected
//! command never touches the keyspace.

mod executor;

pub use executor::{Executor, Request};

use crate::cluster::{validate_command_slot, OwnershipValidator, Slot, SlotRouter};
use crate::commands::{Command, CommandRegistry, Reply};
use crate::error::CommandError;
use crate::kernel::{self, KernelHandle};
use crate::protocol::RespValue;
use crate::transaction::Transaction;
use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Handle to the kernel running the `Executor`
pub type CommandKernel = KernelHandle<Executor>;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Everything a session needs, shared by all sessions
#[derive(Clone)]
pub struct Services {
    pub kernel: CommandKernel,
    pub router: SlotRouter,
    pub cluster: Arc<OwnershipValidator>,
}

impl Services {
    /// Start a kernel thread with a fresh keyspace
    pub fn start(cluster: Arc<OwnershipValidator>) -> std::io::Result<Self> {
        let executor_cluster = cluster.clone();
        let kernel = kernel::spawn("ferrumslot-kernel", move || Executor::new(executor_cluster))?;

        Ok(Services {
            kernel,
            router: SlotRouter::new(Arc::new(CommandRegistry::new())),
            cluster,
        })
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        self.router.registry()
    }
}

/// One client session
pub struct Dispatcher {
    services: Services,
    connection_id: u64,
    signal: CancellationToken,
    transaction: Transaction,
}

impl Dispatcher {
    pub fn new(services: Services) -> Self {
        Dispatcher {
            services,
            connection_id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            signal: CancellationToken::new(),
            transaction: Transaction::new(),
        }
    }

    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.is_recording()
    }

    /// Dispatch a request frame
    ///
    /// Malformed requests get an error reply; the session stays usable.
    pub async fn dispatch(&mut self, frame: RespValue) -> Reply {
        match frame.into_command() {
            Ok((name, args)) => self.execute(&name, args).await,
            Err(e) => {
                warn!(connection = self.connection_id, "invalid request: {}", e);
                Reply::Frame(RespValue::error(format!("ERR Protocol error: {}", e)))
            }
        }
    }

    /// Run one command by name
    pub async fn execute(&mut self, name: &str, args: Vec<Bytes>) -> Reply {
        let name = name.to_ascii_uppercase();
        debug!(connection = self.connection_id, command = %name, args = args.len(), "dispatching");

        match self.run(&name, args).await {
            Ok(reply) => reply,
            Err(err) => {
                if matches!(err, CommandError::UnknownCommand(_)) {
                    warn!(connection = self.connection_id, "unknown command: {}", name);
                }
                Reply::Frame(err.to_resp())
            }
        }
    }

    async fn run(&mut self, name: &str, args: Vec<Bytes>) -> Result<Reply, CommandError> {
        match name {
            "MULTI" => {
                no_args("multi", &args)?;
                self.transaction.begin()?;
                Ok(Reply::Frame(RespValue::ok()))
            }
            "EXEC" => {
                no_args("exec", &args)?;
                let batch = self.transaction.take()?;
                self.submit(Request::Exec(batch)).await
            }
            "DISCARD" => {
                no_args("discard", &args)?;
                self.transaction.discard()?;
                self.submit(Request::Unwatch).await
            }
            "WATCH" => {
                if self.transaction.is_recording() {
                    return Err(CommandError::WatchInsideMulti);
                }
                if args.is_empty() {
                    return Err(CommandError::WrongArity("watch".to_string()));
                }
                self.check_watch_slot(&args)?;
                self.submit(Request::Watch(args)).await
            }
            "UNWATCH" => {
                no_args("unwatch", &args)?;
                self.submit(Request::Unwatch).await
            }
            _ => self.command(name, args).await,
        }
    }

    /// Record inside MULTI, otherwise run on the kernel
    async fn command(&mut self, name: &str, args: Vec<Bytes>) -> Result<Reply, CommandError> {
        let routed = self.route(name, &args);

        if self.transaction.is_recording() {
            return match routed {
                Ok((command, slot)) => {
                    self.transaction.record(command, args, slot);
                    Ok(Reply::Frame(RespValue::simple_string("QUEUED")))
                }
                Err(err) => {
                    self.transaction.record_error(err.clone());
                    Err(err)
                }
            };
        }

        let (command, _) = routed?;
        self.submit(Request::Command { command, args }).await
    }

    /// Lookup, arity, keys, and in cluster mode slot and ownership
    fn route(&self, name: &str, args: &[Bytes]) -> Result<(Arc<dyn Command>, Option<Slot>), CommandError> {
        let command = self
            .services
            .registry()
            .get(name)
            .ok_or_else(|| CommandError::UnknownCommand(name.to_ascii_lowercase()))?;

        if !self.services.cluster.is_clustered() {
            command.keys(args)?;
            return Ok((command, None));
        }

        let slot = validate_command_slot(command.as_ref(), args, self.transaction.pinned_slot())?;
        if let Some(slot) = slot {
            self.services.cluster.validate_slot_ownership(slot)?;
        }
        Ok((command, slot))
    }

    fn check_watch_slot(&self, keys: &[Bytes]) -> Result<(), CommandError> {
        if !self.services.cluster.is_clustered() {
            return Ok(());
        }

        let router = &self.services.router;
        let slot = router.calculate_slot(&keys[0]);
        if keys.iter().any(|key| router.calculate_slot(key) != slot) {
            return Err(CommandError::CrossSlot);
        }
        self.services.cluster.validate_slot_ownership(slot)
    }

    async fn submit(&self, request: Request) -> Result<Reply, CommandError> {
        self.services
            .kernel
            .execute(self.connection_id, request, self.signal.clone())
            .await
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // Settles anything of ours still suspended on the kernel
        self.signal.cancel();
        let _ = self.services.kernel.submit(
            self.connection_id,
            Request::Disconnect,
            CancellationToken::new(),
        );
    }
}

fn no_args(name: &str, args: &[Bytes]) -> Result<(), CommandError> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(CommandError::WrongArity(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{NodeInfo, SlotRange, SlotTopology};
    use crate::commands::test_support::args;
    use std::time::Duration;

    fn standalone() -> Services {
        Services::start(Arc::new(OwnershipValidator::standalone("local"))).expect("kernel thread")
    }

    /// Node "a" owns 0..=8191, node "b" the rest
    fn clustered() -> Services {
        let topology = SlotTopology::new(vec![
            NodeInfo {
                id: "a".to_string(),
                host: "127.0.0.1".to_string(),
                port: 7000,
                slots: vec![SlotRange { start: 0, end: 8191 }],
            },
            NodeInfo {
                id: "b".to_string(),
                host: "10.0.0.2".to_string(),
                port: 7001,
                slots: vec![SlotRange { start: 8192, end: 16383 }],
            },
        ])
        .expect("valid topology");
        Services::start(Arc::new(OwnershipValidator::new("a", Arc::new(topology))))
            .expect("kernel thread")
    }

    async fn call(session: &mut Dispatcher, parts: &[&str]) -> RespValue {
        session.execute(parts[0], args(&parts[1..])).await.into_value()
    }

    #[tokio::test]
    async fn test_dispatch_set_get() {
        let mut session = Dispatcher::new(standalone());

        assert_eq!(call(&mut session, &["SET", "mykey", "myvalue"]).await, RespValue::ok());
        assert_eq!(
            call(&mut session, &["get", "mykey"]).await,
            RespValue::bulk_string("myvalue")
        );
    }

    #[tokio::test]
    async fn test_dispatch_frames() {
        let mut session = Dispatcher::new(standalone());

        let reply = session
            .dispatch(RespValue::array(vec![RespValue::bulk_string("PING")]))
            .await;
        assert_eq!(reply, Reply::Frame(RespValue::simple_string("PONG")));

        let reply = session.dispatch(RespValue::integer(3)).await;
        assert!(reply.value().is_error());
    }

    #[tokio::test]
    async fn test_dispatch_unknown_and_arity() {
        let mut session = Dispatcher::new(standalone());

        assert_eq!(
            call(&mut session, &["NOSUCH"]).await,
            RespValue::error("ERR unknown command 'nosuch'")
        );
        assert_eq!(
            call(&mut session, &["GET"]).await,
            RespValue::error("ERR wrong number of arguments for 'get' command")
        );
    }

    #[tokio::test]
    async fn test_multi_exec() {
        let mut session = Dispatcher::new(standalone());

        assert_eq!(call(&mut session, &["MULTI"]).await, RespValue::ok());
        assert_eq!(
            call(&mut session, &["SET", "a", "1"]).await,
            RespValue::simple_string("QUEUED")
        );
        assert_eq!(
            call(&mut session, &["SET", "b", "2"]).await,
            RespValue::simple_string("QUEUED")
        );
        assert_eq!(
            call(&mut session, &["EXEC"]).await,
            RespValue::array(vec![RespValue::ok(), RespValue::ok()])
        );
        assert_eq!(call(&mut session, &["GET", "b"]).await, RespValue::bulk_string("2"));
    }

    #[tokio::test]
    async fn test_unknown_command_aborts_exec() {
        let mut session = Dispatcher::new(standalone());

        call(&mut session, &["MULTI"]).await;
        call(&mut session, &["SET", "a", "1"]).await;
        assert!(call(&mut session, &["UNKNOWNCMD"]).await.is_error());
        assert_eq!(
            call(&mut session, &["EXEC"]).await,
            RespValue::error("EXECABORT Transaction discarded because of previous errors.")
        );
        assert!(!session.in_transaction());
        assert_eq!(call(&mut session, &["EXISTS", "a"]).await, RespValue::integer(0));
    }

    #[tokio::test]
    async fn test_pair_arity_error_aborts_exec() {
        let mut session = Dispatcher::new(standalone());

        call(&mut session, &["MULTI"]).await;
        call(&mut session, &["SET", "a", "1"]).await;
        assert_eq!(
            call(&mut session, &["HSET", "h", "f1", "v1", "f2"]).await,
            RespValue::error("ERR wrong number of arguments for 'hset' command")
        );
        assert_eq!(
            call(&mut session, &["CLUSTER", "KEYSLOT"]).await,
            RespValue::error("ERR wrong number of arguments for 'cluster|keyslot' command")
        );
        assert_eq!(
            call(&mut session, &["EXEC"]).await,
            RespValue::error("EXECABORT Transaction discarded because of previous errors.")
        );
        assert_eq!(call(&mut session, &["EXISTS", "a", "h"]).await, RespValue::integer(0));
    }

    #[tokio::test]
    async fn test_transaction_control_errors() {
        let mut session = Dispatcher::new(standalone());

        assert_eq!(
            call(&mut session, &["EXEC"]).await,
            RespValue::error("ERR EXEC without MULTI")
        );
        assert_eq!(
            call(&mut session, &["DISCARD"]).await,
            RespValue::error("ERR DISCARD without MULTI")
        );

        call(&mut session, &["MULTI"]).await;
        assert_eq!(
            call(&mut session, &["MULTI"]).await,
            RespValue::error("ERR MULTI calls can not be nested")
        );
        assert!(call(&mut session, &["WATCH", "x"]).await.is_error());
        call(&mut session, &["SET", "a", "1"]).await;
        assert_eq!(call(&mut session, &["DISCARD"]).await, RespValue::ok());
        assert_eq!(call(&mut session, &["EXISTS", "a"]).await, RespValue::integer(0));
    }

    #[tokio::test]
    async fn test_watch_aborts_exec_after_foreign_write() {
        let services = standalone();
        let mut watcher = Dispatcher::new(services.clone());
        let mut other = Dispatcher::new(services);

        call(&mut watcher, &["SET", "x", "1"]).await;
        assert_eq!(call(&mut watcher, &["WATCH", "x"]).await, RespValue::ok());
        call(&mut other, &["SET", "x", "2"]).await;

        call(&mut watcher, &["MULTI"]).await;
        call(&mut watcher, &["SET", "x", "3"]).await;
        assert_eq!(call(&mut watcher, &["EXEC"]).await, RespValue::NullArray);
        assert_eq!(call(&mut watcher, &["GET", "x"]).await, RespValue::bulk_string("2"));

        // Watches are gone after EXEC
        call(&mut watcher, &["MULTI"]).await;
        call(&mut watcher, &["SET", "x", "4"]).await;
        assert_eq!(
            call(&mut watcher, &["EXEC"]).await,
            RespValue::array(vec![RespValue::ok()])
        );
    }

    #[tokio::test]
    async fn test_untouched_watch_lets_exec_run() {
        let mut session = Dispatcher::new(standalone());

        call(&mut session, &["WATCH", "x"]).await;
        call(&mut session, &["MULTI"]).await;
        call(&mut session, &["INCR", "x"]).await;
        assert_eq!(
            call(&mut session, &["EXEC"]).await,
            RespValue::array(vec![RespValue::integer(1)])
        );
    }

    #[tokio::test]
    async fn test_blocked_pop_does_not_stall_other_sessions() {
        let services = standalone();
        let mut blocked = Dispatcher::new(services.clone());
        let mut pusher = Dispatcher::new(services.clone());

        let waiter = tokio::spawn(async move { call(&mut blocked, &["BLPOP", "jobs", "0"]).await });

        // Wait for the pop to be parked on the kernel
        while services.kernel.suspended_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(call(&mut pusher, &["PING"]).await, RespValue::simple_string("PONG"));
        assert_eq!(call(&mut pusher, &["RPUSH", "jobs", "j1"]).await, RespValue::integer(1));
        // Handed off before RPUSH replied
        assert_eq!(call(&mut pusher, &["LLEN", "jobs"]).await, RespValue::integer(0));

        let popped = waiter.await.expect("waiter task");
        assert_eq!(popped, RespValue::bulk_array(["jobs", "j1"]));
        assert_eq!(services.kernel.suspended_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_session_cancels_blocked_pop() {
        let services = standalone();
        let mut blocked = Dispatcher::new(services.clone());
        let waiter = tokio::spawn(async move { call(&mut blocked, &["BRPOP", "q", "0"]).await });

        while services.kernel.suspended_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        waiter.abort();
        let _ = waiter.await;

        while services.kernel.suspended_count() != 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let mut pusher = Dispatcher::new(services);
        assert_eq!(call(&mut pusher, &["RPUSH", "q", "kept"]).await, RespValue::integer(1));
        assert_eq!(call(&mut pusher, &["LLEN", "q"]).await, RespValue::integer(1));
    }

    #[tokio::test]
    async fn test_cluster_cross_slot_and_moved() {
        let mut session = Dispatcher::new(clustered());

        // bar = 5061 is local, foo = 12182 belongs to b
        assert_eq!(call(&mut session, &["SET", "bar", "1"]).await, RespValue::ok());
        assert_eq!(
            call(&mut session, &["GET", "foo"]).await,
            RespValue::error("MOVED 12182 10.0.0.2:7001")
        );
        assert_eq!(
            call(&mut session, &["MSET", "bar", "1", "foo", "2"]).await,
            RespValue::error("CROSSSLOT Keys in request don't hash to the same slot")
        );
        assert_eq!(
            call(&mut session, &["MSET", "{user}:1", "a", "{user}:2", "b"]).await,
            RespValue::ok()
        );
        assert_eq!(call(&mut session, &["PING"]).await, RespValue::simple_string("PONG"));
    }

    #[tokio::test]
    async fn test_cluster_transaction_pins_slot() {
        let mut session = Dispatcher::new(clustered());

        call(&mut session, &["MULTI"]).await;
        call(&mut session, &["SET", "{user}:1", "a"]).await;
        assert_eq!(
            call(&mut session, &["SET", "bar", "b"]).await,
            RespValue::error("CROSSSLOT Keys in request don't hash to the same slot")
        );
        call(&mut session, &["GET", "{user}:1"]).await;

        // The rejected entry surfaces as an error; the rest ran
        assert_eq!(
            call(&mut session, &["EXEC"]).await,
            RespValue::array(vec![
                RespValue::ok(),
                RespValue::error("CROSSSLOT Keys in request don't hash to the same slot"),
                RespValue::bulk_string("a"),
            ])
        );
        assert_eq!(call(&mut session, &["EXISTS", "bar"]).await, RespValue::integer(0));
    }

    #[tokio::test]
    async fn test_quit_closes() {
        let mut session = Dispatcher::new(standalone());
        let reply = session.execute("QUIT", Vec::new()).await;
        assert!(reply.is_close());
    }
}
