use super::ChatState;
use crate::core::error::PromptgenError;
use crate::display;
use chrono::Utc;

pub trait CommandHandler: Send + Sync {
    fn execute(
        &self,
        state: &mut ChatState,
        args: &[&str],
    ) -> Result<Option<String>, PromptgenError>;
    fn help(&self) -> &'static str;
}

pub struct QuitCommand;
pub struct ClearCommand;
pub struct ModelCommand;
pub struct SaveHistoryCommand;
pub struct LoadHistoryCommand;
pub struct ListHistoryCommand;
pub struct DeleteHistoryCommand;
pub struct UsageCommand;

impl CommandHandler for QuitCommand {
    fn execute(
        &self,
        state: &mut ChatState,
        _args: &[&str],
    ) -> Result<Option<String>, PromptgenError> {
        state.should_continue = false;
        Ok(None)
    }

    fn help(&self) -> &'static str {
        "/quit - Exit the chat session"
    }
}

impl CommandHandler for ClearCommand {
    fn execute(
        &self,
        state: &mut ChatState,
        _args: &[&str],
    ) -> Result<Option<String>, PromptgenError> {
        state.session.clear();
        Ok(Some("Conversation cleared.".to_string()))
    }

    fn help(&self) -> &'static str {
        "/clear - Start a new conversation"
    }
}

impl CommandHandler for ModelCommand {
    fn execute(
        &self,
        state: &mut ChatState,
        args: &[&str],
    ) -> Result<Option<String>, PromptgenError> {
        match args.first() {
            None => Ok(Some(format!("Current model: {}", state.session.model()))),
            Some(model) => {
                state.session.switch_model(model)?;
                Ok(Some(format!("Model changed to: {}", state.session.model())))
            }
        }
    }

    fn help(&self) -> &'static str {
        "/model <id> - Show or change the current model"
    }
}

impl CommandHandler for SaveHistoryCommand {
    fn execute(
        &self,
        state: &mut ChatState,
        args: &[&str],
    ) -> Result<Option<String>, PromptgenError> {
        let path = state
            .store
            .save(state.session.conversation(), args.first().copied())?;
        Ok(Some(format!("Conversation saved to: {}", path.display())))
    }

    fn help(&self) -> &'static str {
        "/save [name] - Save the conversation"
    }
}

impl CommandHandler for LoadHistoryCommand {
    fn execute(
        &self,
        state: &mut ChatState,
        args: &[&str],
    ) -> Result<Option<String>, PromptgenError> {
        let Some(name) = args.first() else {
            return Ok(Some("Please specify a conversation name".to_string()));
        };

        let conversation = state.store.load(name)?;
        let title = conversation.title.clone();
        state.session.replace_conversation(conversation)?;
        display::display_conversation(state.session.conversation());

        Ok(Some(format!("Loaded conversation: {}", title)))
    }

    fn help(&self) -> &'static str {
        "/load <name> - Load a saved conversation"
    }
}

impl CommandHandler for ListHistoryCommand {
    fn execute(
        &self,
        state: &mut ChatState,
        _args: &[&str],
    ) -> Result<Option<String>, PromptgenError> {
        let files = state.store.list()?;
        if files.is_empty() {
            Ok(Some("No saved conversations found.".to_string()))
        } else {
            Ok(Some(files.join("\n")))
        }
    }

    fn help(&self) -> &'static str {
        "/list - List saved conversations"
    }
}

impl CommandHandler for DeleteHistoryCommand {
    fn execute(
        &self,
        state: &mut ChatState,
        args: &[&str],
    ) -> Result<Option<String>, PromptgenError> {
        let Some(name) = args.first() else {
            return Ok(Some("Please specify a conversation to delete".to_string()));
        };

        if state.store.delete(name)? {
            Ok(Some(format!("Deleted conversation: {}", name)))
        } else {
            Ok(Some(format!("Conversation not found: {}", name)))
        }
    }

    fn help(&self) -> &'static str {
        "/delete <name> - Delete a saved conversation"
    }
}

impl CommandHandler for UsageCommand {
    fn execute(
        &self,
        state: &mut ChatState,
        _args: &[&str],
    ) -> Result<Option<String>, PromptgenError> {
        Ok(Some(display::format_usage(state.session.usage(), Utc::now())))
    }

    fn help(&self) -> &'static str {
        "/usage - Show token usage for this session"
    }
}
