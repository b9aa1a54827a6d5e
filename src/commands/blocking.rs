//! Blocking list pops (BLPOP, BRPOP)
//!
//! When every key is empty the command suspends instead of waiting on the
//! kernel thread. It subscribes to each key; the first push that lands on one
//! of them is popped from inside the store's change notification, before the
//! pushing command returns, and handed to the suspended job.

use super::list::{pop_elements, End};
use super::{done, Command, CommandContext, CommandFlags, CommandResult, KeySpec, Reply};
use crate::error::CommandError;
use crate::kernel::JobOutcome;
use crate::protocol::RespValue;
use crate::store::{ChangeEvent, Keyspace, ListenerId, Topic, Value};
use bytes::Bytes;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

type Handoff = Rc<RefCell<Option<oneshot::Sender<(Bytes, Bytes)>>>>;

/// BLPOP / BRPOP - Pop from the first non-empty list, waiting if all are empty
///
/// Syntax: BLPOP key [key ...] timeout
///
/// `timeout` is in seconds, fractions allowed; 0 waits forever.
pub struct BlockingPopCommand {
    name: &'static str,
    end: End,
}

impl BlockingPopCommand {
    pub const BLPOP: Self = BlockingPopCommand {
        name: "BLPOP",
        end: End::Head,
    };
    pub const BRPOP: Self = BlockingPopCommand {
        name: "BRPOP",
        end: End::Tail,
    };
}

fn parse_timeout(arg: &[u8]) -> Result<Option<Duration>, CommandError> {
    let seconds = std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|s| s.is_finite() && *s >= 0.0)
        .ok_or(CommandError::InvalidTimeout)?;

    if seconds == 0.0 {
        return Ok(None);
    }
    Duration::try_from_secs_f64(seconds)
        .map(Some)
        .map_err(|_| CommandError::InvalidTimeout)
}

impl Command for BlockingPopCommand {
    fn execute(&self, ctx: &CommandContext, args: &[Bytes]) -> CommandResult {
        let Some((timeout, keys)) = args.split_last() else {
            return Err(CommandError::WrongArity(self.name.to_ascii_lowercase()));
        };
        let timeout = parse_timeout(timeout)?;

        for key in keys {
            if let Some(value) = pop_elements(&ctx.store, key, self.end, 1)?.and_then(|mut v| v.pop()) {
                return done(RespValue::bulk_array([key.clone(), value]));
            }
        }

        // Inside MULTI or a script nobody else can push meanwhile
        if !ctx.can_block() {
            return done(RespValue::NullArray);
        }

        debug!(
            connection = ctx.connection_id,
            keys = keys.len(),
            "{} suspending",
            self.name
        );
        let waiter = BlockedPop::register(ctx.store.clone(), keys, self.end);
        let signal = ctx.signal.clone();
        Ok(JobOutcome::suspend(waiter.wait(timeout, signal)))
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn min_args(&self) -> usize {
        2
    }

    fn flags(&self) -> CommandFlags {
        CommandFlags::WRITE | CommandFlags::BLOCKING
    }

    fn key_spec(&self) -> KeySpec {
        KeySpec::AllButLast
    }
}

/// A pending pop; its listeners go away when it is dropped
struct BlockedPop {
    store: Rc<Keyspace>,
    registrations: Vec<(Topic, ListenerId)>,
    receiver: oneshot::Receiver<(Bytes, Bytes)>,
}

impl BlockedPop {
    fn register(store: Rc<Keyspace>, keys: &[Bytes], end: End) -> Self {
        let (sender, receiver) = oneshot::channel();
        let handoff: Handoff = Rc::new(RefCell::new(Some(sender)));

        let registrations = keys
            .iter()
            .map(|key| {
                let topic = Topic::key(key.clone());
                let listener = pop_on_push(Rc::downgrade(&store), key.clone(), end, handoff.clone());
                let id = store.on(topic.clone(), listener);
                (topic, id)
            })
            .collect();

        BlockedPop {
            store,
            registrations,
            receiver,
        }
    }

    async fn wait(
        mut self,
        timeout: Option<Duration>,
        signal: CancellationToken,
    ) -> Result<Reply, CommandError> {
        let expiry = async {
            match timeout {
                Some(after) => tokio::time::sleep(after).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            popped = &mut self.receiver => match popped {
                Ok((key, value)) => Ok(Reply::Frame(RespValue::bulk_array([key, value]))),
                Err(_) => Err(CommandError::Internal("blocked pop abandoned".to_string())),
            },
            _ = signal.cancelled() => Err(CommandError::Cancelled),
            _ = expiry => Ok(Reply::Frame(RespValue::NullArray)),
        }
    }
}

impl Drop for BlockedPop {
    fn drop(&mut self) {
        for (topic, id) in self.registrations.drain(..) {
            self.store.remove_listener(&topic, id);
        }
    }
}

/// Listener that claims the hand-off, pops, and gives the claim back if
/// there was nothing to pop after all
fn pop_on_push(
    store: std::rc::Weak<Keyspace>,
    key: Bytes,
    end: End,
    handoff: Handoff,
) -> impl Fn(&ChangeEvent) + 'static {
    move |event| {
        let ChangeEvent::Set {
            value: Value::List(items),
            ..
        } = event
        else {
            return;
        };
        if items.is_empty() {
            return;
        }
        let Some(store) = store.upgrade() else {
            return;
        };
        // Taken before popping: the pop re-enters this listener
        let Some(sender) = handoff.borrow_mut().take() else {
            return;
        };

        match pop_elements(&store, &key, end, 1).ok().flatten().and_then(|mut v| v.pop()) {
            Some(value) => {
                let _ = sender.send((key.clone(), value));
            }
            None => *handoff.borrow_mut() = Some(sender),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::list::PushCommand;
    use super::super::test_support::{args, run};
    use super::*;
    use crate::commands::ExecutionMode;
    use tokio_test::{assert_pending, assert_ready, task};

    fn suspend(ctx: &CommandContext, parts: &[&str]) -> crate::kernel::Suspension<Reply, CommandError> {
        match BlockingPopCommand::BLPOP.execute(ctx, &args(parts)) {
            Ok(JobOutcome::Suspended(future)) => future,
            other => panic!("expected suspension, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_pops_immediately_when_available() {
        let ctx = CommandContext::new();
        run(&PushCommand::RPUSH, &ctx, &["b", "x", "y"]);

        assert_eq!(
            run(&BlockingPopCommand::BLPOP, &ctx, &["a", "b", "0"]),
            RespValue::bulk_array(["b", "x"])
        );
        assert_eq!(
            run(&BlockingPopCommand::BRPOP, &ctx, &["b", "0"]),
            RespValue::bulk_array(["b", "y"])
        );
        assert!(!ctx.store.exists(b"b"));
    }

    #[test]
    fn test_push_wakes_blocked_pop_synchronously() {
        let ctx = CommandContext::new();
        let mut blocked = task::spawn(suspend(&ctx, &["q", "0"]));
        assert_pending!(blocked.poll());
        assert_eq!(ctx.store.events().listener_count(&Topic::key("q")), 1);

        assert_eq!(run(&PushCommand::RPUSH, &ctx, &["q", "job"]), RespValue::integer(1));

        // Consumed before RPUSH returned
        assert!(!ctx.store.exists(b"q"));
        assert!(blocked.is_woken());
        let reply = assert_ready!(blocked.poll());
        assert_eq!(reply, Ok(Reply::Frame(RespValue::bulk_array(["q", "job"]))));
        drop(blocked);
        assert_eq!(ctx.store.events().listener_count(&Topic::key("q")), 0);
    }

    #[test]
    fn test_only_one_waiter_gets_each_value() {
        let ctx = CommandContext::new();
        let mut first = task::spawn(suspend(&ctx, &["q", "0"]));
        let mut second = task::spawn(suspend(&ctx, &["q", "0"]));
        assert_pending!(first.poll());
        assert_pending!(second.poll());

        run(&PushCommand::RPUSH, &ctx, &["q", "one"]);
        assert_eq!(
            assert_ready!(first.poll()),
            Ok(Reply::Frame(RespValue::bulk_array(["q", "one"])))
        );
        assert_pending!(second.poll());

        run(&PushCommand::RPUSH, &ctx, &["q", "two"]);
        assert_eq!(
            assert_ready!(second.poll()),
            Ok(Reply::Frame(RespValue::bulk_array(["q", "two"])))
        );
    }

    #[test]
    fn test_wrong_type_write_keeps_waiting() {
        let ctx = CommandContext::new();
        let mut blocked = task::spawn(suspend(&ctx, &["q", "0"]));
        assert_pending!(blocked.poll());

        ctx.store.set("q", Value::string("not a list"), None);
        assert_pending!(blocked.poll());
        assert_eq!(ctx.store.get(b"q"), Some(Value::string("not a list")));
    }

    #[test]
    fn test_cancellation_settles_and_unsubscribes() {
        let ctx = CommandContext::new();
        let mut blocked = task::spawn(suspend(&ctx, &["q", "r", "0"]));
        assert_pending!(blocked.poll());

        ctx.signal.cancel();
        assert_eq!(assert_ready!(blocked.poll()), Err(CommandError::Cancelled));
        drop(blocked);

        assert_eq!(ctx.store.events().listener_count(&Topic::key("q")), 0);
        assert_eq!(ctx.store.events().listener_count(&Topic::key("r")), 0);
        run(&PushCommand::RPUSH, &ctx, &["q", "kept"]);
        assert_eq!(ctx.store.get(b"q"), Some(Value::list(["kept"])));
    }

    #[tokio::test]
    async fn test_timeout_replies_null_array() {
        let ctx = CommandContext::new();
        let reply = suspend(&ctx, &["q", "0.05"]).await;
        assert_eq!(reply, Ok(Reply::Frame(RespValue::NullArray)));
    }

    #[test]
    fn test_does_not_block_inside_transactions() {
        let ctx = CommandContext::new().with_mode(ExecutionMode::Transaction);
        assert_eq!(
            run(&BlockingPopCommand::BLPOP, &ctx, &["q", "0"]),
            RespValue::NullArray
        );
    }

    #[test]
    fn test_invalid_timeout() {
        let ctx = CommandContext::new();
        assert_eq!(
            run(&BlockingPopCommand::BLPOP, &ctx, &["q", "-1"]),
            RespValue::error("ERR timeout is not a float or out of range")
        );
        assert!(run(&BlockingPopCommand::BLPOP, &ctx, &["q", "soon"]).is_error());
        assert_eq!(
            run(&BlockingPopCommand::BLPOP, &ctx, &["q", "1e300"]),
            RespValue::error("ERR timeout is not a float or out of range")
        );
        assert_eq!(parse_timeout(b"0"), Ok(None));
        assert_eq!(parse_timeout(b"1.5"), Ok(Some(Duration::from_millis(1500))));
    }
}
