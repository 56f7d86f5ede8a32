//! Prompt generation across several AI providers: a model registry, a
//! dispatcher that normalizes provider replies, streaming with cancellation,
//! and local usage and activity tracking.

pub mod analytics;
pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod core;
pub mod dispatcher;
pub mod display;
pub mod input;
pub mod prompt;
pub mod providers;
pub mod registry;
pub mod session;
pub mod storage;
pub mod usage;
pub mod utils;

pub use crate::core::error::PromptgenError;
pub use crate::core::types::{GenerationRequest, GenerationResponse, TokenUsage};
pub use dispatcher::Dispatcher;
pub use registry::ModelRegistry;
