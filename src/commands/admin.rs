//! Server commands (PING, ECHO, QUIT, INFO, DBSIZE, FLUSHDB, FLUSHALL, TIME)

use super::{done, Command, CommandContext, CommandFlags, CommandResult, Reply};
use crate::kernel::JobOutcome;
use crate::protocol::RespValue;
use crate::store::now_ms;
use bytes::Bytes;
use std::fmt::Write;

/// PING command - Test the connection
///
/// Syntax: PING [message]
pub struct PingCommand;

impl Command for PingCommand {
    fn execute(&self, _ctx: &CommandContext, args: &[Bytes]) -> CommandResult {
        match args.first() {
            Some(message) => done(RespValue::bulk_string(message.clone())),
            None => done(RespValue::simple_string("PONG")),
        }
    }

    fn name(&self) -> &'static str {
        "PING"
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }

    fn flags(&self) -> CommandFlags {
        CommandFlags::FAST
    }
}

/// ECHO command - Echo the given string
///
/// Syntax: ECHO message
pub struct EchoCommand;

impl Command for EchoCommand {
    fn execute(&self, _ctx: &CommandContext, args: &[Bytes]) -> CommandResult {
        done(RespValue::bulk_string(args[0].clone()))
    }

    fn name(&self) -> &'static str {
        "ECHO"
    }

    fn min_args(&self) -> usize {
        1
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }

    fn flags(&self) -> CommandFlags {
        CommandFlags::FAST
    }
}

/// QUIT command - Ask the server to close the connection
///
/// Syntax: QUIT
pub struct QuitCommand;

impl Command for QuitCommand {
    fn execute(&self, _ctx: &CommandContext, _args: &[Bytes]) -> CommandResult {
        Ok(JobOutcome::Done(Reply::Close(RespValue::ok())))
    }

    fn name(&self) -> &'static str {
        "QUIT"
    }

    fn max_args(&self) -> Option<usize> {
        Some(0)
    }

    fn flags(&self) -> CommandFlags {
        CommandFlags::FAST | CommandFlags::NOSCRIPT
    }
}

/// INFO command - Get information and statistics about the server
///
/// Syntax: INFO [section]
pub struct InfoCommand;

impl InfoCommand {
    fn render(ctx: &CommandContext, section: Option<&str>) -> String {
        let wants = |name: &str| section.map_or(true, |s| s.eq_ignore_ascii_case(name));
        let mut info = String::new();

        if wants("server") {
            let _ = write!(
                info,
                "# Server\r\n\
                ferrumslot_version:{}\r\n\
                os:{}\r\n\
                arch:{}\r\n\
                \r\n",
                env!("CARGO_PKG_VERSION"),
                std::env::consts::OS,
                std::env::consts::ARCH,
            );
        }

        if wants("cluster") {
            let _ = write!(
                info,
                "# Cluster\r\n\
                cluster_enabled:{}\r\n\
                node_id:{}\r\n\
                \r\n",
                u8::from(ctx.cluster.is_clustered()),
                ctx.cluster.node_id(),
            );
        }

        if wants("keyspace") {
            let stats = ctx.store.stats();
            let _ = write!(
                info,
                "# Keyspace\r\n\
                db0:keys={},expires={}\r\n\
                used_memory:{}\r\n",
                stats.keys, stats.expires, stats.used_memory_bytes,
            );
        }
        info
    }
}

impl Command for InfoCommand {
    fn execute(&self, ctx: &CommandContext, args: &[Bytes]) -> CommandResult {
        let section = args.first().and_then(|s| std::str::from_utf8(s).ok());
        done(RespValue::bulk_string(Self::render(ctx, section)))
    }

    fn name(&self) -> &'static str {
        "INFO"
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }

    fn flags(&self) -> CommandFlags {
        CommandFlags::RANDOM
    }
}

/// DBSIZE command - Number of live keys
///
/// Syntax: DBSIZE
pub struct DbSizeCommand;

impl Command for DbSizeCommand {
    fn execute(&self, ctx: &CommandContext, _args: &[Bytes]) -> CommandResult {
        done(RespValue::integer(ctx.store.size() as i64))
    }

    fn name(&self) -> &'static str {
        "DBSIZE"
    }

    fn max_args(&self) -> Option<usize> {
        Some(0)
    }

    fn flags(&self) -> CommandFlags {
        CommandFlags::readonly()
    }
}

/// FLUSHDB / FLUSHALL - Remove every key
///
/// Syntax: FLUSHDB [ASYNC | SYNC]
///
/// There is a single keyspace, so both behave the same; the modifier is
/// accepted and ignored.
pub struct FlushCommand {
    name: &'static str,
}

impl FlushCommand {
    pub const FLUSHDB: Self = FlushCommand { name: "FLUSHDB" };
    pub const FLUSHALL: Self = FlushCommand { name: "FLUSHALL" };
}

impl Command for FlushCommand {
    fn execute(&self, ctx: &CommandContext, args: &[Bytes]) -> CommandResult {
        if let Some(modifier) = args.first() {
            match super::keyword(modifier)?.as_str() {
                "ASYNC" | "SYNC" => {}
                _ => return Err(crate::error::CommandError::Syntax),
            }
        }

        if self.name == "FLUSHALL" {
            ctx.store.flushall();
        } else {
            ctx.store.flushdb();
        }
        done(RespValue::ok())
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn max_args(&self) -> Option<usize> {
        Some(1)
    }

    fn flags(&self) -> CommandFlags {
        CommandFlags::WRITE
    }
}

/// TIME command - Server clock as [seconds, microseconds]
///
/// Syntax: TIME
pub struct TimeCommand;

impl Command for TimeCommand {
    fn execute(&self, _ctx: &CommandContext, _args: &[Bytes]) -> CommandResult {
        let ms = now_ms();
        done(RespValue::bulk_array([
            (ms / 1000).to_string(),
            ((ms % 1000) * 1000).to_string(),
        ]))
    }

    fn name(&self) -> &'static str {
        "TIME"
    }

    fn max_args(&self) -> Option<usize> {
        Some(0)
    }

    fn flags(&self) -> CommandFlags {
        CommandFlags::RANDOM | CommandFlags::FAST
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{args, run};
    use super::*;
    use crate::store::{ChangeEvent, Topic, Value};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_ping_echo() {
        let ctx = CommandContext::new();
        assert_eq!(run(&PingCommand, &ctx, &[]), RespValue::simple_string("PONG"));
        assert_eq!(run(&PingCommand, &ctx, &["hi"]), RespValue::bulk_string("hi"));
        assert_eq!(run(&EchoCommand, &ctx, &["x y"]), RespValue::bulk_string("x y"));
    }

    #[test]
    fn test_quit_requests_close() {
        let ctx = CommandContext::new();
        match QuitCommand.execute(&ctx, &[]) {
            Ok(JobOutcome::Done(reply)) => {
                assert!(reply.is_close());
                assert_eq!(reply.value(), &RespValue::ok());
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_info() {
        let ctx = CommandContext::new();
        ctx.store.set("key1", Value::string("value1"), None);
        ctx.store.set("key2", Value::string("value2"), Some(now_ms() + 60_000));

        let info = run(&InfoCommand, &ctx, &[]);
        let text = String::from_utf8_lossy(info.as_bulk_string().map_or(&[][..], |b| &b[..])).to_string();
        assert!(text.contains("ferrumslot_version"));
        assert!(text.contains("db0:keys=2,expires=1"));
        assert!(text.contains("cluster_enabled:0"));

        let only_cluster = run(&InfoCommand, &ctx, &["CLUSTER"]);
        let text = String::from_utf8_lossy(only_cluster.as_bulk_string().map_or(&[][..], |b| &b[..])).to_string();
        assert!(text.contains("node_id:local"));
        assert!(!text.contains("db0"));
    }

    #[test]
    fn test_flush_emits_single_event() {
        let ctx = CommandContext::new();
        ctx.store.set("key1", Value::string("value1"), None);
        ctx.store.set("key2", Value::string("value2"), None);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        ctx.store.on(Topic::Change, move |e| sink.borrow_mut().push(e.clone()));

        assert_eq!(run(&DbSizeCommand, &ctx, &[]), RespValue::integer(2));
        assert_eq!(run(&FlushCommand::FLUSHALL, &ctx, &[]), RespValue::ok());
        assert_eq!(run(&DbSizeCommand, &ctx, &[]), RespValue::integer(0));
        assert_eq!(*seen.borrow(), vec![ChangeEvent::Flush]);

        assert!(run(&FlushCommand::FLUSHDB, &ctx, &["LATER"]).is_error());
    }

    #[test]
    fn test_time_shape() {
        let ctx = CommandContext::new();
        let reply = run(&TimeCommand, &ctx, &[]);
        let parts = reply.as_array().map(Vec::len);
        assert_eq!(parts, Some(2));
        assert!(TimeCommand.check_arity(&args(&["x"])).is_err());
    }
}
