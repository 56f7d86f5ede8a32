//! Conversation state for one chat, and the session that drives it.

use crate::core::error::PromptgenError;
use crate::core::types::{
    GenerationRequest, GenerationResponse, Message, Role, SamplingParams, TokenUsage,
};
use crate::dispatcher::{Dispatcher, StreamHandler};
use crate::usage::UsageAccumulator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const TITLE_LEN: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            usage: None,
            metadata: None,
        }
    }

    pub fn assistant(response: &GenerationResponse) -> Self {
        Self {
            role: Role::Assistant,
            content: response.content.clone(),
            timestamp: response.timestamp,
            usage: Some(response.usage),
            metadata: Some(serde_json::json!({
                "model": response.model,
                "latencyMs": response.latency_ms,
                "cost": response.cost,
            })),
        }
    }

    pub fn cost(&self) -> f64 {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("cost"))
            .and_then(|c| c.as_f64())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub title: String,
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub shared: bool,
}

impl Conversation {
    pub fn new(model: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: "New conversation".to_string(),
            messages: Vec::new(),
            model: model.into(),
            created_at: now,
            updated_at: now,
            shared: false,
        }
    }

    /// The first user message names the conversation.
    pub fn push(&mut self, message: ChatMessage) {
        if self.messages.is_empty() && message.role == Role::User {
            self.title = message.content.chars().take(TITLE_LEN).collect();
        }
        self.updated_at = message.timestamp.max(self.updated_at);
        self.messages.push(message);
    }

    pub fn history(&self) -> Vec<Message> {
        self.messages
            .iter()
            .map(|m| Message::new(m.role, m.content.clone()))
            .collect()
    }
}

/// Replaces the UI hook: owns one conversation and its usage counters.
///
/// Sending takes `&mut self`, so a session can never have two requests in
/// flight.
pub struct ChatSession {
    dispatcher: Arc<Dispatcher>,
    conversation: Conversation,
    usage: UsageAccumulator,
    system_prompt: Option<String>,
    params: SamplingParams,
    last_error: Option<String>,
}

struct SessionStream<F> {
    on_chunk: F,
    outcome: Option<Result<GenerationResponse, PromptgenError>>,
}

impl<F: FnMut(&str) + Send> StreamHandler for SessionStream<F> {
    fn on_chunk(&mut self, chunk: &str) {
        (self.on_chunk)(chunk)
    }

    fn on_complete(&mut self, response: GenerationResponse) {
        self.outcome = Some(Ok(response));
    }

    fn on_error(&mut self, error: PromptgenError) {
        self.outcome = Some(Err(error));
    }
}

impl ChatSession {
    pub fn new(dispatcher: Arc<Dispatcher>, model: impl Into<String>) -> Self {
        Self {
            dispatcher,
            conversation: Conversation::new(model),
            usage: UsageAccumulator::default(),
            system_prompt: None,
            params: SamplingParams::default(),
            last_error: None,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: Option<String>) -> Self {
        self.system_prompt = system_prompt;
        self
    }

    pub fn with_params(mut self, params: SamplingParams) -> Self {
        self.params = params;
        self
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn usage(&self) -> &UsageAccumulator {
        &self.usage
    }

    pub fn model(&self) -> &str {
        &self.conversation.model
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn dismiss_error(&mut self) {
        self.last_error = None;
    }

    /// Unknown ids are rejected here rather than at the next send.
    pub fn switch_model(&mut self, model: &str) -> Result<(), PromptgenError> {
        self.dispatcher.registry().get_model_or_err(model)?;
        self.conversation.model = model.to_string();
        Ok(())
    }

    pub fn clear(&mut self) {
        let model = self.conversation.model.clone();
        self.conversation = Conversation::new(model);
        self.last_error = None;
    }

    /// Conversations saved against a model that is no longer registered are
    /// refused so the next send cannot fail on them.
    pub fn replace_conversation(
        &mut self,
        conversation: Conversation,
    ) -> Result<(), PromptgenError> {
        self.dispatcher
            .registry()
            .get_model_or_err(&conversation.model)?;
        self.conversation = conversation;
        self.last_error = None;
        Ok(())
    }

    fn begin(&mut self, text: &str) -> GenerationRequest {
        let request = GenerationRequest {
            prompt: text.to_string(),
            model: self.conversation.model.clone(),
            params: self.params.clone(),
            system_prompt: self.system_prompt.clone(),
            history: self.conversation.history(),
            ..Default::default()
        };
        self.conversation.push(ChatMessage::user(text));
        self.last_error = None;
        request
    }

    fn accept(&mut self, response: GenerationResponse) -> ChatMessage {
        self.usage
            .record(&response.usage, response.cost, response.timestamp);
        let message = ChatMessage::assistant(&response);
        self.conversation.push(message.clone());
        message
    }

    fn reject(&mut self, error: PromptgenError) -> PromptgenError {
        tracing::warn!(error = %error, "chat request failed");
        self.last_error = Some(error.to_string());
        error
    }

    /// Appends the user message, then exactly one assistant message on
    /// success. Failures leave the user message in place and set
    /// [`Self::last_error`].
    pub async fn send_message(&mut self, text: &str) -> Result<ChatMessage, PromptgenError> {
        let request = self.begin(text);
        match self.dispatcher.generate_response(&request).await {
            Ok(response) => Ok(self.accept(response)),
            Err(e) => Err(self.reject(e)),
        }
    }

    /// Streaming counterpart of [`Self::send_message`]. Returns `Ok(None)`
    /// when cancelled; a cancelled stream adds no assistant message and no
    /// usage.
    pub async fn stream_message<F>(
        &mut self,
        text: &str,
        on_chunk: F,
        cancel: &CancellationToken,
    ) -> Result<Option<ChatMessage>, PromptgenError>
    where
        F: FnMut(&str) + Send,
    {
        let request = self.begin(text);
        let mut handler = SessionStream {
            on_chunk,
            outcome: None,
        };
        self.dispatcher
            .stream_response(&request, &mut handler, cancel)
            .await;

        match handler.outcome {
            Some(Ok(response)) => Ok(Some(self.accept(response))),
            Some(Err(e)) => Err(self.reject(e)),
            None => Ok(None),
        }
    }
}

/// Saved conversations, one JSON file each.
pub struct ConversationStore {
    dir: PathBuf,
}

impl ConversationStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, PromptgenError> {
        if name.is_empty() || Path::new(name).components().count() != 1 || name.starts_with('.') {
            return Err(PromptgenError::Input(format!(
                "Invalid conversation name: {}",
                name
            )));
        }
        let file = if name.ends_with(".json") {
            name.to_string()
        } else {
            format!("{}.json", name)
        };
        Ok(self.dir.join(file))
    }

    pub fn save(
        &self,
        conversation: &Conversation,
        name: Option<&str>,
    ) -> Result<PathBuf, PromptgenError> {
        let name = match name {
            Some(name) => name.to_string(),
            None => chrono::Local::now().format("%Y%m%d_%H%M%S").to_string(),
        };
        let path = self.path_for(&name)?;
        fs::create_dir_all(&self.dir)?;
        let file = fs::File::create(&path)?;
        serde_json::to_writer_pretty(file, conversation)?;
        Ok(path)
    }

    pub fn load(&self, name: &str) -> Result<Conversation, PromptgenError> {
        let file = fs::File::open(self.path_for(name)?)?;
        Ok(serde_json::from_reader(file)?)
    }

    pub fn list(&self) -> Result<Vec<String>, PromptgenError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        files.sort();
        Ok(files)
    }

    /// Returns false when there was nothing to delete.
    pub fn delete(&self, name: &str) -> Result<bool, PromptgenError> {
        let path = self.path_for(name)?;
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(path)?;
        Ok(true)
    }
}
