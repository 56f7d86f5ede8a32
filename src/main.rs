use clap::Parser;
use promptgen::PromptgenError;
use promptgen::app::Application;
use promptgen::cli::Args;
use promptgen::commands::create_command_registry;
use promptgen::config::Config;
use promptgen::dispatcher::Dispatcher;
use promptgen::display;
use promptgen::providers::HttpClient;
use promptgen::registry::ModelRegistry;
use promptgen::storage::LocalStore;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "promptgen=debug",
        _ => "promptgen=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(args: Args) -> Result<(), PromptgenError> {
    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let registry = Arc::new(ModelRegistry::from_config(&config));
    let transport = Arc::new(HttpClient::new()?);
    let dispatcher = Arc::new(Dispatcher::new(registry, transport, config.credentials()));
    let store = LocalStore::new(config.data_dir());

    let mut app = Application::new(config, dispatcher, store, create_command_registry());
    app.run(args.command).await
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    if let Err(e) = run(args).await {
        display::display_error(&e);
        std::process::exit(1);
    }
}
