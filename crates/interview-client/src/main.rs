//! Interview Client
//!
//! Terminal front-end for the backend gateway.
//!
//! # Commands
//!
//! - `health` - Query `GET /health` and print the backend status
//! - `prepare` - Create a room and issue a credential, print everything but
//!   the token
//! - `preview` - Print the rendered view of a fresh session
//! - `join` - Run a live interview session over LiveKit (cargo feature
//!   `livekit`), printing the view on every change
//!
//! Configuration comes from `INTERVIEW_*` environment variables, see
//! [`interview_client::config`].

#![warn(clippy::pedantic)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use interview_client::config::Config;
use interview_client::controller::state::SessionSnapshot;
use interview_client::gateway::{BackendGateway, HttpGateway};
use interview_client::view::SessionView;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about = "AI interview session client", long_about = None)]
struct Args {
    /// Backend gateway address (overrides INTERVIEW_GATEWAY_URL)
    #[arg(long)]
    gateway_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the backend gateway is reachable and configured
    Health,
    /// Create a room and request a credential for it
    Prepare,
    /// Print the initial session view
    Preview,
    /// Join an interview and stay until Ctrl-C or disconnect
    #[cfg(feature = "livekit")]
    Join {
        /// Keep the microphone off once connected
        #[arg(long)]
        listen_only: bool,
    },
}

#[cfg(feature = "livekit")]
async fn join(config: &Config, listen_only: bool) -> Result<()> {
    use interview_client::controller::state::SessionStatus;
    use interview_client::room::livekit::LiveKitConnector;
    use interview_client::{SessionController, SessionSettings};
    use std::sync::Arc;

    let gateway = HttpGateway::from_config(config)?;
    let connector = LiveKitConnector::new();
    let playback = connector.playback();
    let controller = SessionController::new(
        Arc::new(gateway),
        Arc::new(connector),
        Arc::new(playback),
        SessionSettings::from(config),
    );
    info!(
        target: "interview.main",
        connect_timeout = ?controller.settings().connect_timeout,
        listen_only,
        "Joining interview"
    );

    let mut views = controller.subscribe();
    let render = tokio::spawn(async move {
        loop {
            println!("{}", SessionView::render(&views.snapshot()));
            if views.changed().await.is_err() {
                break;
            }
        }
    });

    let mut status = controller.subscribe();
    let result = async {
        controller
            .start_session()
            .await
            .context("Failed to start the interview")?;

        let reached = status.wait_for_status(|s| !s.is_connecting()).await?;
        if reached != SessionStatus::Connected {
            return Ok(());
        }
        if !listen_only {
            if let Err(e) = controller.enable_microphone().await {
                tracing::warn!(target: "interview.main", error = %e, "Microphone not enabled");
            }
        }

        eprintln!("Press Ctrl-C to end the interview");
        tokio::select! {
            signal = tokio::signal::ctrl_c() => signal.context("Failed to listen for Ctrl-C")?,
            closed = status.wait_for_status(|s| s == SessionStatus::Disconnected) => {
                closed?;
            }
        }
        anyhow::Ok(())
    }
    .await;

    controller.end_session().await;
    render.abort();
    println!("{}", SessionView::render(&controller.snapshot()));
    result
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_new(&config.observability.log_filter)
        .unwrap_or_else(|_| common::config::DEFAULT_LOG_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    if config.observability.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut vars: std::collections::HashMap<String, String> = std::env::vars().collect();
    if let Some(url) = args.gateway_url {
        vars.insert("INTERVIEW_GATEWAY_URL".to_string(), url);
    }
    let config = Config::from_vars(&vars).context("Failed to load configuration")?;

    init_tracing(&config);
    info!(
        target: "interview.main",
        gateway_url = %config.gateway_url,
        "Interview client starting"
    );

    match args.command {
        Command::Health => {
            let gateway = HttpGateway::from_config(&config)?;
            let health = gateway
                .health()
                .await
                .with_context(|| format!("Backend at {} is not healthy", gateway.base_url()))?;

            println!("Status: {}", health.status);
            if let Some(media_url) = &health.media_url {
                println!("Media server: {media_url}");
            }
            if let Some(configured) = health.api_key_configured {
                println!("API key configured: {configured}");
            }
            if let Some(configured) = health.api_secret_configured {
                println!("API secret configured: {configured}");
            }
        }
        Command::Prepare => {
            let gateway = HttpGateway::from_config(&config)?;
            let room = gateway
                .create_room()
                .await
                .context("Room creation failed")?;
            println!("Room: {room}");

            let credential = gateway
                .issue_credential(&room)
                .await
                .context("Token generation failed")?;
            println!("Media server: {}", credential.room_url);
            match credential.expires_in {
                Some(expires_in) => println!("Token expires in: {}s", expires_in.as_secs()),
                None => println!("Token expires in: unknown"),
            }
        }
        Command::Preview => {
            print!("{}", SessionView::render(&SessionSnapshot::default()));
        }
        #[cfg(feature = "livekit")]
        Command::Join { listen_only } => join(&config, listen_only).await?,
    }

    Ok(())
}
