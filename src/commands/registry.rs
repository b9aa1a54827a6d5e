//! Command registry
//!
//! Centralized registry for all available commands.
//! This allows loose coupling between command implementations and the dispatcher.

use super::{
    admin, blocking, cluster, counter, hash, key, list, set, string, ttl, Command, CommandFlags,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of all available commands
pub struct CommandRegistry {
    commands: HashMap<String, Arc<dyn Command>>,
}

impl CommandRegistry {
    /// Create a new command registry and register all commands
    pub fn new() -> Self {
        let mut registry = CommandRegistry {
            commands: HashMap::new(),
        };

        // Register string commands
        registry.register(Arc::new(string::SetCommand));
        registry.register(Arc::new(string::GetCommand));
        registry.register(Arc::new(string::MGetCommand));
        registry.register(Arc::new(string::MSetCommand));
        registry.register(Arc::new(string::AppendCommand));
        registry.register(Arc::new(string::StrLenCommand));

        // Register counter commands
        registry.register(Arc::new(counter::IncrCommand));
        registry.register(Arc::new(counter::IncrByCommand));
        registry.register(Arc::new(counter::DecrCommand));
        registry.register(Arc::new(counter::DecrByCommand));

        // Register key commands
        registry.register(Arc::new(key::DelCommand));
        registry.register(Arc::new(key::ExistsCommand));
        registry.register(Arc::new(key::TypeCommand));

        // Register TTL commands
        registry.register(Arc::new(ttl::ExpireCommand::EXPIRE));
        registry.register(Arc::new(ttl::ExpireCommand::PEXPIRE));
        registry.register(Arc::new(ttl::ExpireCommand::EXPIREAT));
        registry.register(Arc::new(ttl::ExpireCommand::PEXPIREAT));
        registry.register(Arc::new(ttl::TtlCommand::TTL));
        registry.register(Arc::new(ttl::TtlCommand::PTTL));
        registry.register(Arc::new(ttl::PersistCommand));

        // Register list commands
        registry.register(Arc::new(list::PushCommand::LPUSH));
        registry.register(Arc::new(list::PushCommand::RPUSH));
        registry.register(Arc::new(list::PopCommand::LPOP));
        registry.register(Arc::new(list::PopCommand::RPOP));
        registry.register(Arc::new(list::LRangeCommand));
        registry.register(Arc::new(list::LLenCommand));
        registry.register(Arc::new(blocking::BlockingPopCommand::BLPOP));
        registry.register(Arc::new(blocking::BlockingPopCommand::BRPOP));

        // Register set commands
        registry.register(Arc::new(set::SAddCommand));
        registry.register(Arc::new(set::SRemCommand));
        registry.register(Arc::new(set::SMembersCommand));
        registry.register(Arc::new(set::SCardCommand));

        // Register hash commands
        registry.register(Arc::new(hash::HSetCommand));
        registry.register(Arc::new(hash::HGetCommand));
        registry.register(Arc::new(hash::HGetAllCommand));
        registry.register(Arc::new(hash::HDelCommand));

        // Register admin commands
        registry.register(Arc::new(admin::PingCommand));
        registry.register(Arc::new(admin::EchoCommand));
        registry.register(Arc::new(admin::QuitCommand));
        registry.register(Arc::new(admin::InfoCommand));
        registry.register(Arc::new(admin::DbSizeCommand));
        registry.register(Arc::new(admin::FlushCommand::FLUSHDB));
        registry.register(Arc::new(admin::FlushCommand::FLUSHALL));
        registry.register(Arc::new(admin::TimeCommand));

        // Register cluster commands
        registry.register(Arc::new(cluster::ClusterCommand));

        registry
    }

    /// Register a command
    fn register(&mut self, command: Arc<dyn Command>) {
        let name = command.name().to_uppercase();
        self.commands.insert(name, command);
    }

    /// Get a command by name (case-insensitive)
    pub fn get(&self, name: &str) -> Option<Arc<dyn Command>> {
        self.commands.get(&name.to_uppercase()).cloned()
    }

    /// Check if a command exists
    pub fn has_command(&self, name: &str) -> bool {
        self.commands.contains_key(&name.to_uppercase())
    }

    /// Get all command names
    pub fn command_names(&self) -> Vec<String> {
        self.commands.keys().cloned().collect()
    }

    /// Names of the commands carrying any of `flags`
    pub fn flagged(&self, flags: CommandFlags) -> Vec<&'static str> {
        let mut names: Vec<_> = self
            .commands
            .values()
            .filter(|cmd| cmd.flags().intersects(flags))
            .map(|cmd| cmd.name())
            .collect();
        names.sort_unstable();
        names
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}
