use super::{
    ChatState,
    handler::{
        ClearCommand, DeleteHistoryCommand, ListHistoryCommand, LoadHistoryCommand, ModelCommand,
        QuitCommand, SaveHistoryCommand, UsageCommand,
    },
    registry::CommandRegistry,
};
use crate::core::error::PromptgenError;
use console::style;
use std::sync::Arc;

#[derive(Clone)]
pub struct CommandDispatcher {
    registry: Arc<CommandRegistry>,
}

impl CommandDispatcher {
    pub fn new(registry: Arc<CommandRegistry>) -> Self {
        Self { registry }
    }

    /// `/help` lives here because it lists the registry itself.
    pub fn execute(
        &self,
        command: &str,
        args: &[&str],
        state: &mut ChatState,
    ) -> Result<Option<String>, PromptgenError> {
        if command == "help" {
            return Ok(Some(self.help_text()));
        }
        self.registry.execute(command, args, state)
    }

    pub fn get_command_names(&self) -> Vec<String> {
        let mut names = self.registry.get_command_names();
        names.push("help".to_string());
        names.sort();
        names
    }

    fn help_text(&self) -> String {
        let mut lines = vec![style("Available Commands").bold().underlined().to_string()];
        lines.push("/help - Show available commands".to_string());
        lines.extend(self.registry.help_lines().into_iter().map(str::to_string));
        lines.join("\n")
    }
}

pub fn create_command_registry() -> CommandDispatcher {
    let mut registry = CommandRegistry::new();

    registry.register("quit", QuitCommand);
    registry.register("clear", ClearCommand);
    registry.register("model", ModelCommand);
    registry.register("save", SaveHistoryCommand);
    registry.register("load", LoadHistoryCommand);
    registry.register("list", ListHistoryCommand);
    registry.register("delete", DeleteHistoryCommand);
    registry.register("usage", UsageCommand);

    CommandDispatcher::new(Arc::new(registry))
}
