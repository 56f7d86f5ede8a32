use crate::commands::dispatcher::CommandDispatcher;
use crate::core::error::PromptgenError;

use console::style;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::{Hinter, HistoryHinter};
use rustyline::history::FileHistory;
use rustyline::validate::Validator;
use rustyline::{CompletionType, Config, Context, EditMode, Editor, Helper};
use std::borrow::Cow;
use std::path::{Path, PathBuf};

const HISTORY_FILE: &str = "input_history.txt";

/// Commands whose first argument is a model id.
const MODEL_COMMANDS: &[&str] = &["model"];

/// Completion candidates for `line` up to `pos`: command names after a
/// leading `/`, model ids after `/model `. Returns the replacement start.
pub fn complete_line(
    line: &str,
    pos: usize,
    commands: &[String],
    models: &[String],
) -> (usize, Vec<String>) {
    let Some(typed) = line.get(..pos).and_then(|l| l.strip_prefix('/')) else {
        return (pos, Vec::new());
    };

    match typed.split_once(' ') {
        None => {
            let matches = commands
                .iter()
                .filter(|c| c.starts_with(typed))
                .cloned()
                .collect();
            (1, matches)
        }
        Some((command, arg)) if MODEL_COMMANDS.contains(&command) && !arg.contains(' ') => {
            let matches = models
                .iter()
                .filter(|m| m.starts_with(arg))
                .cloned()
                .collect();
            (pos - arg.len(), matches)
        }
        Some(_) => (pos, Vec::new()),
    }
}

pub struct ChatHelper {
    commands: CommandDispatcher,
    models: Vec<String>,
    hinter: HistoryHinter,
}

impl ChatHelper {
    pub fn new(commands: CommandDispatcher, models: Vec<String>) -> Self {
        Self {
            commands,
            models,
            hinter: HistoryHinter {},
        }
    }
}

impl Helper for ChatHelper {}

impl Completer for ChatHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let names = self.commands.get_command_names();
        let (start, matches) = complete_line(line, pos, &names, &self.models);
        let pairs = matches
            .into_iter()
            .map(|m| Pair {
                display: m.clone(),
                replacement: m,
            })
            .collect();
        Ok((start, pairs))
    }
}

impl Hinter for ChatHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, ctx: &Context<'_>) -> Option<String> {
        self.hinter.hint(line, pos, ctx)
    }
}

impl Highlighter for ChatHelper {
    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Cow::Owned(style(hint).dim().to_string())
    }
}

// Prompts are free text, so nothing is rejected.
impl Validator for ChatHelper {}

pub fn history_path(data_dir: &Path) -> PathBuf {
    data_dir.join(HISTORY_FILE)
}

pub fn create_editor(
    commands: CommandDispatcher,
    models: Vec<String>,
    data_dir: &Path,
) -> Result<Editor<ChatHelper, FileHistory>, PromptgenError> {
    let config = Config::builder()
        .history_ignore_space(true)
        .completion_type(CompletionType::List)
        .edit_mode(EditMode::Emacs)
        .build();

    let mut editor = Editor::with_config(config)
        .map_err(|e| PromptgenError::Input(format!("Failed to create line editor: {}", e)))?;
    editor.set_helper(Some(ChatHelper::new(commands, models)));

    // First run has no history file yet.
    let _ = editor.load_history(&history_path(data_dir));

    Ok(editor)
}

/// `None` on Ctrl-C or Ctrl-D.
pub fn read_input(
    editor: &mut Editor<ChatHelper, FileHistory>,
) -> Result<Option<String>, PromptgenError> {
    let prompt = if cfg!(windows) && std::env::var("PSModulePath").is_ok() {
        "> ".to_string()
    } else {
        style("> ").bold().cyan().to_string()
    };
    match editor.readline(&prompt) {
        Ok(line) => {
            if !line.trim().is_empty() {
                editor.add_history_entry(line.as_str()).map_err(|e| {
                    PromptgenError::Input(format!("Failed to add history entry: {}", e))
                })?;
            }
            Ok(Some(line))
        }
        Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
            println!("Exiting...");
            Ok(None)
        }
        Err(err) => Err(PromptgenError::Input(format!("Input error: {}", err))),
    }
}

pub fn save_history(
    editor: &mut Editor<ChatHelper, FileHistory>,
    data_dir: &Path,
) -> Result<(), PromptgenError> {
    std::fs::create_dir_all(data_dir)?;
    editor
        .save_history(&history_path(data_dir))
        .map_err(|e| PromptgenError::Input(format!("Failed to save history: {}", e)))
}
