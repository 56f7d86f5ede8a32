use crate::config::Provider;
use crate::core::types::FewShotExample;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Generate and compare prompts across AI providers", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Config file to use instead of ~/.promptgen/config.yaml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the models in the registry
    Models {
        /// Only show free models
        #[arg(long)]
        free: bool,

        /// Include inactive models
        #[arg(long)]
        all: bool,

        /// Only show models of this provider
        #[arg(short, long)]
        provider: Option<Provider>,
    },

    /// Send one prompt to one model
    Ask(AskArgs),

    /// Send the same prompt to several models
    Compare {
        /// Prompt text; read from stdin when omitted
        prompt: Option<String>,

        /// Model ids to compare (defaults to every active free model)
        #[arg(short, long = "model")]
        models: Vec<String>,

        /// System prompt
        #[arg(long)]
        system: Option<String>,
    },

    /// Interactive chat session
    Chat {
        #[arg(short, long)]
        model: Option<String>,

        #[arg(long)]
        system: Option<String>,

        /// Wait for whole replies instead of streaming
        #[arg(long)]
        no_stream: bool,
    },

    /// Show usage totals and activity analytics
    Stats,

    /// Show or change saved generation defaults
    Settings(SettingsArgs),
}

#[derive(ClapArgs, Debug, Default)]
pub struct AskArgs {
    /// Prompt text, may contain {{placeholders}}; read from stdin when omitted
    pub prompt: Option<String>,

    #[arg(short, long)]
    pub model: Option<String>,

    #[arg(long)]
    pub system: Option<String>,

    /// Ask the model to reason step by step
    #[arg(long)]
    pub cot: bool,

    /// Few-shot example as "input=>output" (repeatable)
    #[arg(short, long = "example", value_parser = parse_example)]
    pub examples: Vec<FewShotExample>,

    /// Template variable as key=value (repeatable)
    #[arg(long = "var", value_parser = parse_var)]
    pub vars: Vec<(String, String)>,

    /// Category recorded with the analytics event
    #[arg(long)]
    pub category: Option<String>,

    #[arg(short, long)]
    pub stream: bool,

    #[arg(short, long)]
    pub temperature: Option<f32>,

    #[arg(long)]
    pub max_tokens: Option<u32>,
}

#[derive(ClapArgs, Debug, Default)]
pub struct SettingsArgs {
    #[arg(long)]
    pub model: Option<String>,

    #[arg(long)]
    pub system: Option<String>,

    #[arg(long)]
    pub temperature: Option<f32>,

    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Stream replies by default
    #[arg(long)]
    pub stream: Option<bool>,

    /// Forget all saved settings
    #[arg(long)]
    pub reset: bool,
}

pub fn parse_example(s: &str) -> Result<FewShotExample, String> {
    let (input, output) = s
        .split_once("=>")
        .ok_or_else(|| format!("expected input=>output, got '{}'", s))?;
    let (input, output) = (input.trim(), output.trim());
    if input.is_empty() || output.is_empty() {
        return Err("example input and output must not be empty".to_string());
    }
    Ok(FewShotExample::new(input, output))
}

pub fn parse_var(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err("variable name must not be empty".to_string());
    }
    Ok((key.to_string(), value.to_string()))
}
