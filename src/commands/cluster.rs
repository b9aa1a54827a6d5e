//! CLUSTER command (KEYSLOT, MYID, SLOTS)

use super::{done, keyword, Command, CommandContext, CommandFlags, CommandResult};
use crate::cluster::calculate_slot;
use crate::error::CommandError;
use crate::protocol::RespValue;
use bytes::Bytes;

/// CLUSTER command - Inspect the slot map
///
/// Syntax:
/// - CLUSTER KEYSLOT key
/// - CLUSTER MYID
/// - CLUSTER SLOTS
pub struct ClusterCommand;

impl Command for ClusterCommand {
    fn execute(&self, ctx: &CommandContext, args: &[Bytes]) -> CommandResult {
        let subcommand = keyword(&args[0])?;

        match (subcommand.as_str(), &args[1..]) {
            ("KEYSLOT", [key]) => done(RespValue::integer(i64::from(calculate_slot(key)))),
            ("MYID", []) => done(RespValue::bulk_string(ctx.cluster.node_id().to_string())),
            ("SLOTS", []) => {
                let mut rows = Vec::new();
                for node in ctx.cluster.discovery().nodes() {
                    for range in &node.slots {
                        rows.push((
                            range.start,
                            RespValue::array(vec![
                                RespValue::integer(i64::from(range.start)),
                                RespValue::integer(i64::from(range.end)),
                                RespValue::array(vec![
                                    RespValue::bulk_string(node.host.clone()),
                                    RespValue::integer(i64::from(node.port)),
                                    RespValue::bulk_string(node.id.clone()),
                                ]),
                            ]),
                        ));
                    }
                }
                rows.sort_by_key(|(start, _)| *start);
                done(RespValue::array(rows.into_iter().map(|(_, row)| row).collect()))
            }
            ("KEYSLOT" | "MYID" | "SLOTS", _) => Err(CommandError::WrongArity(format!(
                "cluster|{}",
                subcommand.to_ascii_lowercase()
            ))),
            _ => Err(CommandError::UnknownSubcommand(
                String::from_utf8_lossy(&args[0]).into_owned(),
            )),
        }
    }

    fn name(&self) -> &'static str {
        "CLUSTER"
    }

    fn min_args(&self) -> usize {
        1
    }

    /// Arity depends on the subcommand; unknown ones are left to `execute`
    fn check_arity(&self, args: &[Bytes]) -> Result<(), CommandError> {
        let Some(subcommand) = args.first() else {
            return Err(CommandError::WrongArity("cluster".to_string()));
        };

        let expected = match subcommand.to_ascii_uppercase().as_slice() {
            b"KEYSLOT" => 2,
            b"MYID" | b"SLOTS" => 1,
            _ => return Ok(()),
        };
        if args.len() != expected {
            return Err(CommandError::WrongArity(format!(
                "cluster|{}",
                String::from_utf8_lossy(subcommand).to_ascii_lowercase()
            )));
        }
        Ok(())
    }

    fn flags(&self) -> CommandFlags {
        CommandFlags::ADMIN
    }
}
