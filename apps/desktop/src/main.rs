use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use client_core::{HttpEpsonAuthApi, ScorePage, WebSocketChannel};
use realtime_channel::{LoopbackChannel, RealtimeChannel};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;

use config::{load_settings, validate_server_url};

#[derive(Parser, Debug)]
#[command(about = "Stage sheet-music scans and link an Epson Connect scanner")]
struct Cli {
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    ws_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stage files and print the viewer's list.
    Stage {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Register an Epson Connect email with the backend.
    Auth {
        #[arg(long)]
        email: String,
    },
    /// Watch the real-time channel's connection status.
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let mut settings = load_settings();
    if let Some(server_url) = cli.server_url {
        settings.server_url = server_url;
    }
    if let Some(ws_url) = cli.ws_url {
        settings.ws_url = Some(ws_url);
    }
    let server_url = validate_server_url(&settings.server_url)?;
    let auth_api = Arc::new(HttpEpsonAuthApi::new(
        server_url.as_str(),
        settings.request_timeout(),
    )?);

    match cli.command {
        Command::Stage { paths } => {
            let mut page = ScorePage::mount(Arc::new(LoopbackChannel::new()), auth_api);
            let added = page.add_paths(&paths).await?;
            info!(added, "staged score files");
            println!("{}", serde_json::to_string_pretty(&page.list_files())?);
            page.unmount().await?;
        }
        Command::Auth { email } => {
            let page = ScorePage::mount(Arc::new(LoopbackChannel::new()), auth_api);
            let auth = page.auth();
            auth.open().await;
            let outcome = auth.submit(&email).await;
            page.unmount().await?;
            let payload = outcome.context("epson connect authorization failed")?;
            println!("Authenticated successfully: {payload}");
        }
        Command::Status => {
            let ws_url = settings.resolved_ws_url()?;
            let channel: Arc<dyn RealtimeChannel> = WebSocketChannel::connect(&ws_url).await?;
            let page = ScorePage::mount(channel, auth_api);
            let mut status = page.watch_connection();
            loop {
                let current = status.borrow_and_update().clone();
                println!(
                    "connected={} transport={}",
                    current.connected, current.transport
                );
                if !current.connected {
                    break;
                }
                tokio::select! {
                    changed = status.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
            page.unmount().await?;
        }
    }

    Ok(())
}
