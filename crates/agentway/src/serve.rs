// SPDX-FileCopyrightText: 2026 Agentway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `agentway serve` command implementation.
//!
//! Wires the durable queue, the agent supervisor, the dispatcher, and the
//! event ingress together, then runs until SIGTERM/SIGINT. On shutdown
//! every live agent is terminated and the system channel (when configured)
//! is notified.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use agentway_claude::Supervisor;
use agentway_config::{find_config_file, load_config};
use agentway_core::{AgentwayError, ChatClient, FileFetcher};
use agentway_queue::FileQueue;
use agentway_scheduler::{install_signal_handler, terminate_agents, Dispatcher};
use agentway_slack::SlackClient;

use crate::ingress;

/// Environment variable fallback for the bot token.
const TOKEN_ENV_VAR: &str = "SLACK_BOT_TOKEN";

/// Capacity of the ingress → dispatcher event channel.
const EVENT_BUFFER: usize = 256;

/// Run the gateway until a shutdown signal arrives.
pub async fn run_serve(config_arg: Option<PathBuf>) -> Result<(), AgentwayError> {
    let config_path = resolve_config_path(config_arg)?;
    let config = load_config(&config_path)?;
    info!(
        config = %config_path.display(),
        channels = config.channels.len(),
        "configuration loaded"
    );

    let token = config
        .slack
        .bot_token
        .clone()
        .or_else(|| std::env::var(TOKEN_ENV_VAR).ok())
        .ok_or_else(|| {
            AgentwayError::Config(format!(
                "bot token required: set slack.botToken or {TOKEN_ENV_VAR}"
            ))
        })?;

    let slack = Arc::new(SlackClient::new(token));
    let client: Arc<dyn ChatClient> = slack.clone();
    let fetcher: Arc<dyn FileFetcher> = slack;

    let data_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".agentway");
    let queue = FileQueue::open(data_dir.join("queue")).await?;

    let image_dir = std::env::temp_dir().join("agentway-images");
    tokio::fs::create_dir_all(&image_dir)
        .await
        .map_err(|e| AgentwayError::Internal(format!("create image dir: {e}")))?;

    let supervisor = Arc::new(Supervisor::new());
    let dispatcher = Dispatcher::new(
        client.clone(),
        fetcher,
        queue,
        supervisor.clone(),
        config.clone(),
        config_path,
        image_dir,
    );

    let cancel = install_signal_handler();

    let (events_tx, mut events_rx) = mpsc::channel(EVENT_BUFFER);
    {
        let host = config.slack.ingress_host.clone();
        let port = config.slack.ingress_port;
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = ingress::run_ingress(&host, port, events_tx, cancel.clone()).await {
                error!(error = %e, "event ingress terminated");
                cancel.cancel();
            }
        });
    }

    if let Some(system_channel) = &config.system_channel {
        if let Err(e) = client
            .post_message(system_channel, None, ":rocket: Agentway started")
            .await
        {
            warn!(error = %e, "startup notification failed");
        }
    }

    info!("agentway serve running");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = events_rx.recv() => match event {
                Some(event) => dispatcher.handle_event(event).await,
                None => break,
            },
        }
    }

    info!("shutting down");
    terminate_agents(&supervisor).await;

    if let Some(system_channel) = &config.system_channel {
        if let Err(e) = client
            .post_message(system_channel, None, ":octagonal_sign: Agentway stopped")
            .await
        {
            warn!(error = %e, "shutdown notification failed");
        }
    }

    info!("agentway serve shutdown complete");
    Ok(())
}

/// Explicit `--config` path, or `config.yaml`/`config.json` discovered in
/// the current directory.
fn resolve_config_path(config_arg: Option<PathBuf>) -> Result<PathBuf, AgentwayError> {
    if let Some(path) = config_arg {
        if !path.exists() {
            return Err(AgentwayError::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        return Ok(path);
    }
    let cwd = std::env::current_dir()
        .map_err(|e| AgentwayError::Internal(format!("current dir: {e}")))?;
    find_config_file(&cwd).ok_or_else(|| {
        AgentwayError::Config(format!(
            "no config.yaml or config.json found in {}",
            cwd.display()
        ))
    })
}

/// Initializes the tracing subscriber with the given log level.
pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("agentway={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
