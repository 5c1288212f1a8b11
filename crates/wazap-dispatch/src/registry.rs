//! Command handler registry. The dispatcher knows nothing about what a
//! given command does beyond its signature — it only knows how to look one
//! up by name and invoke it.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::parse::InboundMessage;

/// Everything a leaf command handler needs about the message that invoked
/// it, plus its parsed `command`/`args` split.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub chat_id: String,
    pub sender_id: String,
    pub is_group: bool,
    pub command: String,
    pub args: Vec<String>,
    pub message: InboundMessage,
}

/// Returns `Some(reply text)` to send back, or `None` when the handler
/// already sent its own response (e.g. via the send facility directly) and
/// the dispatcher has nothing further to do.
pub type CommandHandler =
    Arc<dyn Fn(CommandContext) -> BoxFuture<'static, anyhow::Result<Option<String>>> + Send + Sync>;

#[derive(Default)]
pub struct CommandRegistry {
    handlers: HashMap<String, CommandHandler>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, command: impl Into<String>, handler: CommandHandler) {
        self.handlers.insert(command.into(), handler);
    }

    pub fn get(&self, command: &str) -> Option<CommandHandler> {
        self.handlers.get(command).cloned()
    }

    pub fn contains(&self, command: &str) -> bool {
        self.handlers.contains_key(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_get_round_trips() {
        let mut registry = CommandRegistry::new();
        registry.register("ping", Arc::new(|_ctx| Box::pin(async { Ok(Some("pong".to_string())) })));
        assert!(registry.contains("ping"));
        assert!(registry.get("pong").is_none());
    }
}
