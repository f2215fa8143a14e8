use clap::Parser;
use eframe::{egui, NativeOptions};
use log::{error, info};

// Project Modules
mod api_client;
mod app;
mod cache;
mod cli;
mod config;
mod errors;
mod fetcher;
mod layout;
mod media_pipeline;
mod model;
mod network;
mod screen;
mod slideshow;
mod state_manager;
mod widgets;

use api_client::ApiClient;
use app::DisplayApp;
use cli::{Cli, Command};
use config::load_config;
use errors::AppError;

fn client_from_config(config_path: &str) -> Result<ApiClient, AppError> {
    let config = load_config(config_path)?;
    Ok(ApiClient::new(&config.api_base_url)?)
}

fn run_display(config_path: &str) -> Result<(), AppError> {
    media_pipeline::init()?;
    let config = load_config(config_path);
    if let Err(e) = &config {
        error!("Configuration error, the display will show it on screen: {}", e);
    }
    let fullscreen = config.as_ref().map_or(true, |c| c.fullscreen);
    let runtime = tokio::runtime::Handle::current();

    let options = NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Signage Display")
            .with_inner_size([1920.0, 1080.0])
            .with_fullscreen(fullscreen),
        ..Default::default()
    };
    eframe::run_native(
        "Signage Display",
        options,
        Box::new(move |cc| Box::new(DisplayApp::new(cc, config, runtime))),
    )
    .map_err(|e| AppError::Generic(format!("Display window failed: {}", e)))
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    env_logger::init(); // Initialize logger
    let cli = Cli::parse();
    info!("Starting signage_display v{} (config: {})...", env!("CARGO_PKG_VERSION"), cli.config);

    match cli.command.clone().unwrap_or(Command::Run) {
        Command::Run => run_display(&cli.config),
        Command::Inspect { resource, watch } => {
            let client = client_from_config(&cli.config)?;
            if watch {
                return cli::watch(client, resource).await;
            }
            println!("{}", cli::inspect(&client, resource).await?);
            Ok(())
        }
        Command::Admin { password, action } => {
            let client = client_from_config(&cli.config)?;
            println!("{}", cli::admin(&client, &password, &action).await?);
            Ok(())
        }
    }
}
