use crate::analytics::{AnalyticsEvent, EventKind, EventLog, SessionTracker};
use crate::cli::{AskArgs, Command, SettingsArgs};
use crate::commands::{ChatState, dispatcher::CommandDispatcher};
use crate::config::{AiSettings, Config, Provider};
use crate::core::error::PromptgenError;
use crate::core::types::{GenerationRequest, GenerationResponse, SamplingParams};
use crate::dispatcher::{Dispatcher, StreamCallbacks};
use crate::display;
use crate::input;
use crate::prompt;
use crate::session::{ChatMessage, ChatSession, ConversationStore};
use crate::storage::LocalStore;
use crate::usage::UsageAccumulator;
use chrono::Utc;
use is_terminal::IsTerminal;
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub struct Application {
    config: Config,
    dispatcher: Arc<Dispatcher>,
    store: LocalStore,
    settings: AiSettings,
    events: EventLog,
    sessions: SessionTracker,
    command_dispatcher: CommandDispatcher,
}

/// Cancels the returned token on Ctrl-C until the handle is aborted.
fn cancel_on_ctrl_c() -> (CancellationToken, JoinHandle<()>) {
    let token = CancellationToken::new();
    let child = token.clone();
    let handle = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            child.cancel();
        }
    });
    (token, handle)
}

fn print_chunk(chunk: &str) {
    print!("{}", chunk);
    let _ = io::stdout().flush();
}

/// Piped input is prepended to the prompt as context.
fn combine_with_context(
    prompt: Option<&str>,
    context: Option<String>,
) -> Result<String, PromptgenError> {
    match (prompt, context) {
        (Some(prompt), Some(context)) => Ok(format!("<pipe>{}</pipe>\n\n{}", context, prompt)),
        (None, Some(context)) => Ok(context),
        (Some(prompt), None) => Ok(prompt.to_string()),
        (None, None) => Err(PromptgenError::Input("No prompt provided".to_string())),
    }
}

fn read_piped_stdin() -> Result<Option<String>, PromptgenError> {
    if io::stdin().is_terminal() {
        return Ok(None);
    }
    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .map_err(|e| PromptgenError::Input(format!("Failed to read from stdin: {}", e)))?;
    Ok(Some(buffer).filter(|b| !b.trim().is_empty()))
}

fn merge_params(
    base: &SamplingParams,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
) -> SamplingParams {
    SamplingParams {
        temperature: temperature.or(base.temperature),
        max_tokens: max_tokens.or(base.max_tokens),
        ..base.clone()
    }
}

impl Application {
    pub fn new(
        config: Config,
        dispatcher: Arc<Dispatcher>,
        store: LocalStore,
        command_dispatcher: CommandDispatcher,
    ) -> Self {
        let settings = AiSettings::load(&store);
        let events = EventLog::open(store.clone(), config.analytics_capacity);
        let sessions = SessionTracker::open(store.clone());
        Self {
            config,
            dispatcher,
            store,
            settings,
            events,
            sessions,
            command_dispatcher,
        }
    }

    pub async fn run(&mut self, command: Option<Command>) -> Result<(), PromptgenError> {
        let command = command.unwrap_or_else(|| {
            if io::stdin().is_terminal() {
                Command::Chat {
                    model: None,
                    system: None,
                    no_stream: false,
                }
            } else {
                Command::Ask(AskArgs::default())
            }
        });

        let session_id = self
            .sessions
            .start()
            .inspect_err(|e| warn!(error = %e, "failed to record session start"))
            .ok();
        let result = match command {
            Command::Models {
                free,
                all,
                provider,
            } => {
                self.handle_models(free, all, provider);
                Ok(())
            }
            Command::Ask(args) => self.handle_ask(args).await,
            Command::Compare {
                prompt,
                models,
                system,
            } => self.handle_compare(prompt, models, system).await,
            Command::Chat {
                model,
                system,
                no_stream,
            } => self.handle_chat(model, system, !no_stream).await,
            Command::Stats => {
                self.handle_stats();
                Ok(())
            }
            Command::Settings(args) => self.handle_settings(args),
        };
        if let Some(Err(e)) = session_id.map(|id| self.sessions.end(id)) {
            warn!(error = %e, "failed to record session end");
        }
        result
    }

    fn resolve_model(&self, explicit: Option<String>) -> String {
        explicit
            .or_else(|| self.settings.default_model.clone())
            .unwrap_or_else(|| self.config.default_model.clone())
    }

    /// Analytics never fail the command that produced them.
    fn track(&mut self, event: AnalyticsEvent) {
        if let Err(e) = self.events.record(event) {
            warn!(error = %e, "failed to record analytics event");
        }
    }

    fn record_usage(&self, usage: &UsageAccumulator) {
        let mut totals = UsageAccumulator::load(&self.store);
        totals.merge(usage);
        if let Err(e) = totals.save(&self.store) {
            warn!(error = %e, "failed to persist usage totals");
        }
    }

    fn record_response(&self, response: &GenerationResponse) {
        let mut usage = UsageAccumulator::default();
        usage.record(&response.usage, response.cost, response.timestamp);
        self.record_usage(&usage);
    }

    fn record_message(&self, message: &ChatMessage) {
        let Some(tokens) = message.usage else {
            return;
        };
        let mut usage = UsageAccumulator::default();
        usage.record(&tokens, message.cost(), message.timestamp);
        self.record_usage(&usage);
    }

    fn handle_models(&self, free: bool, all: bool, provider: Option<Provider>) {
        let registry = self.dispatcher.registry();
        let models: Vec<_> = if free {
            registry.free_models().collect()
        } else {
            registry.list_models().iter().collect()
        };
        let models: Vec<_> = models
            .into_iter()
            .filter(|m| all || m.is_active())
            .filter(|m| provider.is_none_or(|p| m.provider == p))
            .collect();
        let default_model = self.resolve_model(None);
        display::display_models(&models, &default_model);
    }

    async fn handle_ask(&mut self, args: AskArgs) -> Result<(), PromptgenError> {
        let context = read_piped_stdin()?;
        let mut text = combine_with_context(args.prompt.as_deref(), context)?;

        if !args.vars.is_empty() {
            let vars: HashMap<String, String> = args.vars.into_iter().collect();
            let missing: Vec<String> = prompt::template_variables(&text)
                .into_iter()
                .filter(|name| !vars.contains_key(name))
                .collect();
            if !missing.is_empty() {
                warn!(missing = ?missing, "template placeholders left unfilled");
            }
            text = prompt::render_template(&text, &vars);
            self.track(AnalyticsEvent::new(
                EventKind::TemplateUsed,
                args.category.as_deref(),
                Utc::now(),
            ));
        }

        let explicit_model = args.model.is_some();
        let model = self.resolve_model(args.model);
        if explicit_model {
            self.track(
                AnalyticsEvent::new(EventKind::ModelSelected, None, Utc::now())
                    .with_property("model", model.clone()),
            );
        }

        let mut request = GenerationRequest::new(model.clone(), text)
            .with_params(merge_params(&self.settings.params, args.temperature, args.max_tokens))
            .with_examples(args.examples)
            .with_chain_of_thought(args.cot);
        request.system_prompt = args.system.or_else(|| self.settings.system_prompt.clone());

        let response = if args.stream || self.settings.stream {
            self.stream_ask(&request).await?
        } else {
            let response = self.dispatcher.generate_response(&request).await?;
            display::display_response(&response);
            Some(response)
        };

        if let Some(response) = response {
            self.record_response(&response);
            let event = AnalyticsEvent::new(
                EventKind::PromptGenerated,
                args.category.as_deref(),
                Utc::now(),
            );
            self.track(
                event
                    .with_property("model", model)
                    .with_property("tokens", response.tokens()),
            );
        }
        Ok(())
    }

    /// `Ok(None)` when the user cancelled.
    async fn stream_ask(
        &self,
        request: &GenerationRequest,
    ) -> Result<Option<GenerationResponse>, PromptgenError> {
        let (cancel, ctrl_c) = cancel_on_ctrl_c();
        let mut completed = None;
        let mut failed = None;
        {
            let mut handler = StreamCallbacks {
                on_chunk: print_chunk,
                on_complete: |response: GenerationResponse| completed = Some(response),
                on_error: |error: PromptgenError| failed = Some(error),
            };
            self.dispatcher
                .stream_response(request, &mut handler, &cancel)
                .await;
        }
        ctrl_c.abort();

        if let Some(error) = failed {
            println!();
            return Err(error);
        }
        match completed {
            Some(response) => {
                display::display_stream_footer(&response);
                Ok(Some(response))
            }
            None => {
                display::display_cancelled();
                Ok(None)
            }
        }
    }

    async fn handle_compare(
        &mut self,
        prompt: Option<String>,
        models: Vec<String>,
        system: Option<String>,
    ) -> Result<(), PromptgenError> {
        let context = read_piped_stdin()?;
        let text = combine_with_context(prompt.as_deref(), context)?;

        let models = if models.is_empty() {
            self.dispatcher
                .registry()
                .free_models()
                .filter(|m| m.is_active())
                .map(|m| m.id.clone())
                .collect()
        } else {
            models
        };
        if models.is_empty() {
            return Err(PromptgenError::Input("No models to compare".to_string()));
        }
        debug!(models = ?models, "comparing models");

        let mut request = GenerationRequest::new(String::new(), text)
            .with_params(self.settings.params.clone());
        request.system_prompt = system.or_else(|| self.settings.system_prompt.clone());

        let results = self.dispatcher.compare_models(&request, &models).await;
        display::display_comparison(&results);

        let mut usage = UsageAccumulator::default();
        for response in results.iter().filter_map(|r| r.result.as_ref().ok()) {
            usage.record(&response.usage, response.cost, response.timestamp);
        }
        self.record_usage(&usage);

        let succeeded = results.iter().filter(|r| r.result.is_ok()).count();
        self.track(
            AnalyticsEvent::new(EventKind::ComparisonRun, None, Utc::now())
                .with_property("models", models.len())
                .with_property("succeeded", succeeded),
        );
        Ok(())
    }

    async fn handle_chat(
        &mut self,
        model: Option<String>,
        system: Option<String>,
        stream: bool,
    ) -> Result<(), PromptgenError> {
        let model = self.resolve_model(model);
        self.dispatcher.registry().get_model_or_err(&model)?;

        let session = ChatSession::new(self.dispatcher.clone(), model)
            .with_system_prompt(system.or_else(|| self.settings.system_prompt.clone()))
            .with_params(self.settings.params.clone());
        let store = ConversationStore::new(self.config.history_dir());
        let mut state = ChatState::new(session, store);
        self.track(AnalyticsEvent::new(
            EventKind::ConversationStarted,
            None,
            Utc::now(),
        ));

        println!(
            "Chatting with {}. Type '/help' for available commands. Press Ctrl+D or type /quit to exit.",
            state.session.model()
        );

        let data_dir = self.config.data_dir();
        let model_ids = self
            .dispatcher
            .registry()
            .active_models()
            .map(|m| m.id.clone())
            .collect();
        let mut editor =
            input::create_editor(self.command_dispatcher.clone(), model_ids, &data_dir)?;

        loop {
            let Some(line) = input::read_input(&mut editor)? else {
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(command_line) = line.strip_prefix('/') {
                let parts: Vec<&str> = command_line.split_whitespace().collect();
                if let Some((command, args)) = parts.split_first() {
                    match self.command_dispatcher.execute(command, args, &mut state) {
                        Ok(Some(output)) => println!("{}", output),
                        Ok(None) => {}
                        Err(e) => display::display_error(&e),
                    }
                    if !state.should_continue {
                        break;
                    }
                }
                continue;
            }

            self.chat_turn(&mut state, line, stream).await;
        }

        input::save_history(&mut editor, &data_dir)?;
        Ok(())
    }

    async fn chat_turn(&mut self, state: &mut ChatState, line: &str, stream: bool) {
        let outcome = if stream {
            let (cancel, ctrl_c) = cancel_on_ctrl_c();
            let outcome = state.session.stream_message(line, print_chunk, &cancel).await;
            ctrl_c.abort();
            outcome
        } else {
            state.session.send_message(line).await.map(Some)
        };

        match outcome {
            Ok(Some(message)) => {
                // Persisted per turn so an aborted chat keeps what it used.
                self.record_message(&message);
                if stream {
                    println!();
                } else if display::looks_like_markdown(&message.content) {
                    display::display_markdown(&message.content);
                } else {
                    display::display_boxed("🤖 AI RESPONSE", &message.content);
                }
                println!("{}", console::style(display::message_footer(&message)).dim());
                self.track(
                    AnalyticsEvent::new(EventKind::MessageSent, None, Utc::now())
                        .with_property("model", state.session.model().to_string()),
                );
            }
            Ok(None) => display::display_cancelled(),
            Err(e) => {
                display::display_error(&e);
                state.session.dismiss_error();
            }
        }
    }

    fn handle_stats(&self) {
        let usage = UsageAccumulator::load(&self.store);
        println!("{}\n", display::format_usage(&usage, Utc::now()));
        let summary = self
            .events
            .load_analytics(&self.sessions.sessions(), Utc::now());
        display::display_analytics(&summary);
    }

    fn handle_settings(&mut self, args: SettingsArgs) -> Result<(), PromptgenError> {
        if args.reset {
            AiSettings::clear(&self.store)?;
            self.settings = AiSettings::default();
        }
        if let Some(model) = args.model {
            self.dispatcher.registry().get_model_or_err(&model)?;
            self.settings.default_model = Some(model);
        }
        if let Some(system) = args.system {
            self.settings.system_prompt = Some(system).filter(|s| !s.is_empty());
        }
        self.settings.params =
            merge_params(&self.settings.params, args.temperature, args.max_tokens);
        if let Some(stream) = args.stream {
            self.settings.stream = stream;
        }
        self.settings.save(&self.store)?;

        print!("{}", serde_yml::to_string(&self.settings)?);
        Ok(())
    }
}
