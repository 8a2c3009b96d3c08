// SPDX-FileCopyrightText: 2026 Agentway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-channel scheduler.
//!
//! Inbound events are filtered, persisted to the durable queue, and drained
//! one channel at a time: a channel's messages reach the agent strictly in
//! enqueue order, while distinct channels drain concurrently up to the
//! global process cap. Magic commands bypass the queue entirely.
//!
//! Invariants guarded here: the `channel_busy` set gives each channel at
//! most one drain task (and thus at most one agent process), and the
//! semaphore caps agent processes globally with FIFO waiters.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex, RwLock, Semaphore};
use tracing::{debug, info, warn};

use agentway_claude::{Supervisor, TurnOutcome};
use agentway_config::GatewayConfig;
use agentway_core::types::{
    ChatEvent, MessageEvent, ProcessMode, QueuedMessage, ResolvedChannelConfig,
    MAX_CONCURRENT_PROCESSES,
};
use agentway_core::{AgentwayError, ChatClient, FileFetcher};
use agentway_queue::FileQueue;
use agentway_slack::reactions;
use agentway_slack::responder::Responder;

use crate::commands::{self, MagicCommand};
use crate::images;

/// Substituted prompt for image-only messages.
const IMAGE_ONLY_PROMPT: &str = "What is in this image?";

/// The gateway's event scheduler and drain engine.
pub struct Dispatcher {
    client: Arc<dyn ChatClient>,
    fetcher: Arc<dyn FileFetcher>,
    queue: FileQueue,
    supervisor: Arc<Supervisor>,
    /// Last successfully loaded configuration; the file is re-read per
    /// message so agent-side config edits take effect without a restart.
    config: RwLock<GatewayConfig>,
    config_path: PathBuf,
    image_dir: PathBuf,
    /// Channels with a live drain task.
    channel_busy: Mutex<HashSet<String>>,
    /// (channel, ts) pairs past the queued stage; edits no longer apply.
    processing: Mutex<HashSet<(String, String)>>,
    /// Global agent-process slots; waiters resume in FIFO order.
    slots: Arc<Semaphore>,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: Arc<dyn ChatClient>,
        fetcher: Arc<dyn FileFetcher>,
        queue: FileQueue,
        supervisor: Arc<Supervisor>,
        config: GatewayConfig,
        config_path: PathBuf,
        image_dir: PathBuf,
    ) -> Arc<Self> {
        Self::with_capacity(
            client,
            fetcher,
            queue,
            supervisor,
            config,
            config_path,
            image_dir,
            MAX_CONCURRENT_PROCESSES,
        )
    }

    /// Constructor with an explicit global cap, for tests.
    #[allow(clippy::too_many_arguments)]
    pub fn with_capacity(
        client: Arc<dyn ChatClient>,
        fetcher: Arc<dyn FileFetcher>,
        queue: FileQueue,
        supervisor: Arc<Supervisor>,
        config: GatewayConfig,
        config_path: PathBuf,
        image_dir: PathBuf,
        capacity: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            client,
            fetcher,
            queue,
            supervisor,
            config: RwLock::new(config),
            config_path,
            image_dir,
            channel_busy: Mutex::new(HashSet::new()),
            processing: Mutex::new(HashSet::new()),
            slots: Arc::new(Semaphore::new(capacity)),
        })
    }

    /// Re-read the config file, updating the cache on success.
    async fn reload_config(&self) -> Result<GatewayConfig, AgentwayError> {
        let config = agentway_config::load_config(&self.config_path)?;
        *self.config.write().await = config.clone();
        Ok(config)
    }

    /// Fresh config when loadable, last good one otherwise.
    async fn config_or_cache(&self) -> GatewayConfig {
        match self.reload_config().await {
            Ok(config) => config,
            Err(e) => {
                debug!(error = %e, "config reload failed, using cached config");
                self.config.read().await.clone()
            }
        }
    }

    /// Entry point for every decoded chat event.
    pub async fn handle_event(self: &Arc<Self>, event: ChatEvent) {
        match event {
            ChatEvent::MessageDeleted {
                channel_id,
                deleted_ts,
            } => {
                // Still pending: it vanishes silently. Already processing:
                // deletion has no effect; `!kill` is the tool for that.
                match self.queue.dequeue(&channel_id, &deleted_ts).await {
                    Ok(true) => info!(channel = %channel_id, ts = %deleted_ts, "queued message deleted by user"),
                    Ok(false) => {}
                    Err(e) => warn!(error = %e, "dequeue on deletion failed"),
                }
            }
            ChatEvent::MessageChanged {
                channel_id,
                ts,
                new_text,
            } => {
                let is_processing = self
                    .processing
                    .lock()
                    .await
                    .contains(&(channel_id.clone(), ts.clone()));
                if !is_processing {
                    match self.queue.update_queued_text(&channel_id, &ts, &new_text).await {
                        Ok(true) => info!(channel = %channel_id, ts = %ts, "queued message edited"),
                        Ok(false) => {}
                        Err(e) => warn!(error = %e, "queued-text update failed"),
                    }
                }
            }
            ChatEvent::Message(msg) => self.handle_message(msg).await,
        }
    }

    async fn handle_message(self: &Arc<Self>, msg: MessageEvent) {
        if msg.from_bot {
            return;
        }

        if let Some(command) = commands::parse_magic(&msg.text) {
            self.run_magic_command(command, &msg).await;
            return;
        }

        let supported_images: Vec<_> = msg
            .files
            .iter()
            .filter(|f| images::is_supported_image(f))
            .cloned()
            .collect();
        if msg.text.trim().is_empty() && supported_images.is_empty() {
            return;
        }

        let resolved = self
            .config_or_cache()
            .await
            .resolve_channel(&msg.channel_id, &self.config_path);
        if resolved.is_none() {
            debug!(channel = %msg.channel_id, "ignoring message for unconfigured channel");
            return;
        }

        let image_paths =
            images::download_images(&self.fetcher, &supported_images, &self.image_dir).await;

        let text = if msg.text.trim().is_empty() && !image_paths.is_empty() {
            IMAGE_ONLY_PROMPT.to_string()
        } else {
            msg.text.clone()
        };

        let queued = QueuedMessage {
            channel_id: msg.channel_id.clone(),
            user_id: msg.user_id.clone(),
            text,
            ts: msg.ts.clone(),
            thread_ts: msg.reply_thread().to_string(),
            queued_at: Utc::now().to_rfc3339(),
            image_paths,
        };

        if let Err(e) = self.queue.enqueue(&queued).await {
            warn!(channel = %msg.channel_id, error = %e, "enqueue failed");
            let _ = self
                .client
                .post_message(
                    &msg.channel_id,
                    Some(msg.reply_thread()),
                    &format!(":warning: Error: {e}"),
                )
                .await;
            reactions::add(&self.client, &msg.channel_id, &msg.ts, reactions::FAILED).await;
            return;
        }

        reactions::add(&self.client, &msg.channel_id, &msg.ts, reactions::INBOX).await;

        self.launch_drain_if_idle(&msg.channel_id).await;
    }

    /// Start a drain task for the channel unless one is already running.
    async fn launch_drain_if_idle(self: &Arc<Self>, channel_id: &str) {
        {
            let mut busy = self.channel_busy.lock().await;
            if !busy.insert(channel_id.to_string()) {
                return;
            }
        }
        let dispatcher = self.clone();
        let channel_id = channel_id.to_string();
        tokio::spawn(async move {
            dispatcher.drain_channel(&channel_id).await;
        });
    }

    /// Drain the channel's queue head-first until empty, then release the
    /// busy flag. Re-checks for messages that raced in after the release.
    async fn drain_channel(self: &Arc<Self>, channel_id: &str) {
        loop {
            let head = match self.queue.pending_for_channel(channel_id).await {
                Ok(pending) => pending.into_iter().next(),
                Err(e) => {
                    warn!(channel = %channel_id, error = %e, "reading pending queue failed");
                    None
                }
            };

            let Some(msg) = head else {
                let mut busy = self.channel_busy.lock().await;
                // A message may have been enqueued between the empty read
                // and this point; keep draining if so.
                let raced = match self.queue.pending_for_channel(channel_id).await {
                    Ok(pending) => !pending.is_empty(),
                    Err(_) => false,
                };
                if raced {
                    continue;
                }
                busy.remove(channel_id);
                return;
            };

            self.process_message(msg).await;
        }
    }

    /// Run one queued message through reaction choreography, the global
    /// slot gate, the agent, and the response pipeline.
    async fn process_message(self: &Arc<Self>, msg: QueuedMessage) {
        self.processing
            .lock()
            .await
            .insert((msg.channel_id.clone(), msg.ts.clone()));

        // Freshly load the config so channel edits made since ingress (by
        // the user or the agent itself) govern this turn. A load failure
        // drops the message after dequeueing it.
        let resolved = match self.reload_config().await {
            Ok(config) => config.resolve_channel(&msg.channel_id, &self.config_path),
            Err(e) => {
                warn!(channel = %msg.channel_id, error = %e, "config load failed, dropping message");
                None
            }
        };

        let result = match resolved {
            Some(resolved) => {
                reactions::transition(
                    &self.client,
                    &msg.channel_id,
                    &msg.ts,
                    reactions::HOURGLASS,
                    reactions::INBOX,
                )
                .await;

                let permit = self.slots.clone().acquire_owned().await.ok();
                let result = self.run_turn(&resolved, &msg).await;
                drop(permit);
                Some(result)
            }
            None => {
                // Configuration disappeared between ingress and drain: log
                // and drop the message silently.
                warn!(channel = %msg.channel_id, "channel no longer configured, dropping message");
                None
            }
        };

        images::cleanup_images(&msg.image_paths).await;

        if let Some(result) = result {
            match result {
                Ok(()) => {
                    reactions::transition(
                        &self.client,
                        &msg.channel_id,
                        &msg.ts,
                        reactions::CHECKMARK,
                        reactions::HOURGLASS,
                    )
                    .await;
                }
                Err(e) => {
                    warn!(channel = %msg.channel_id, ts = %msg.ts, error = %e, "turn failed");
                    let _ = self
                        .client
                        .post_message(
                            &msg.channel_id,
                            Some(&msg.thread_ts),
                            &format!(":warning: Error: {e}"),
                        )
                        .await;
                    reactions::transition(
                        &self.client,
                        &msg.channel_id,
                        &msg.ts,
                        reactions::FAILED,
                        reactions::HOURGLASS,
                    )
                    .await;
                }
            }
        }

        if let Err(e) = self.queue.dequeue(&msg.channel_id, &msg.ts).await {
            warn!(channel = %msg.channel_id, ts = %msg.ts, error = %e, "dequeue after turn failed");
        }
        self.processing
            .lock()
            .await
            .remove(&(msg.channel_id.clone(), msg.ts.clone()));
    }

    /// One agent turn: responder construction, delta plumbing, completion.
    async fn run_turn(
        &self,
        resolved: &ResolvedChannelConfig,
        msg: &QueuedMessage,
    ) -> Result<(), AgentwayError> {
        let mut responder = Responder::start(
            resolved.response_mode,
            self.client.clone(),
            &msg.channel_id,
            &msg.thread_ts,
        )
        .await?;

        let (delta_tx, mut delta_rx) = mpsc::unbounded_channel::<String>();
        let oneshot_deltas = responder.wants_deltas().then(|| delta_tx.clone());

        let run = async move {
            match resolved.process_mode {
                ProcessMode::Oneshot => {
                    self.supervisor
                        .run_oneshot(resolved, &msg.text, &msg.image_paths, oneshot_deltas)
                        .await
                }
                ProcessMode::Persistent => {
                    self.supervisor
                        .run_persistent_turn(resolved, &msg.text, delta_tx)
                        .await
                }
            }
        };
        tokio::pin!(run);

        // Deltas flow to the responder while the turn is in flight.
        let mut rx_open = true;
        let outcome: Result<TurnOutcome, AgentwayError> = loop {
            tokio::select! {
                delta = delta_rx.recv(), if rx_open => {
                    match delta {
                        Some(delta) => responder.on_text_delta(&delta).await,
                        None => rx_open = false,
                    }
                }
                outcome = &mut run => {
                    // Drain any deltas that raced with completion.
                    while let Ok(delta) = delta_rx.try_recv() {
                        responder.on_text_delta(&delta).await;
                    }
                    break outcome;
                }
            }
        };

        let outcome = outcome?;
        responder.finish(&outcome.text).await
    }

    /// Execute a magic command in the channel it was typed in.
    async fn run_magic_command(self: &Arc<Self>, command: MagicCommand, msg: &MessageEvent) {
        let reply = |text: String| {
            let client = self.client.clone();
            let channel = msg.channel_id.clone();
            let thread = msg.reply_thread().to_string();
            async move {
                if let Err(e) = client.post_message(&channel, Some(&thread), &text).await {
                    warn!(channel = %channel, error = %e, "command reply failed");
                }
            }
        };

        match command {
            MagicCommand::Ps => {
                let processes = self.supervisor.get_active_processes().await;
                let pending = self.queue.pending().await.unwrap_or_default();
                let config = self.config.read().await;
                reply(commands::format_ps(
                    &processes,
                    &pending,
                    &config,
                    &self.config_path,
                ))
                .await;
            }
            MagicCommand::Kill(reference) => {
                let text = self.signal_command(reference, false, msg).await;
                reply(text).await;
            }
            MagicCommand::Nudge(reference) => {
                let text = self.signal_command(reference, true, msg).await;
                reply(text).await;
            }
            MagicCommand::KillAll => {
                let killed = self.supervisor.kill_all_processes().await;
                let text = if killed.is_empty() {
                    ":warning: No active processes".to_string()
                } else {
                    let config = self.config.read().await;
                    let names: Vec<String> = killed
                        .iter()
                        .map(|id| {
                            config
                                .resolve_channel(id, &self.config_path)
                                .map(|c| format!("#{}", c.name))
                                .unwrap_or_else(|| id.clone())
                        })
                        .collect();
                    format!(
                        ":stop_sign: Killed {} process(es): {}",
                        killed.len(),
                        names.join(", ")
                    )
                };
                reply(text).await;
            }
        }
    }

    /// Resolve the target of a `!kill`/`!nudge` and act on it, returning
    /// the text to post back.
    async fn signal_command(
        &self,
        reference: Option<String>,
        nudge: bool,
        msg: &MessageEvent,
    ) -> String {
        let target = {
            let config = self.config.read().await;
            match reference {
                Some(reference) => commands::resolve_channel_ref(&reference, &config),
                None => {
                    let name = config
                        .resolve_channel(&msg.channel_id, &self.config_path)
                        .map(|c| c.name)
                        .unwrap_or_else(|| msg.channel_id.clone());
                    Ok((msg.channel_id.clone(), name))
                }
            }
        };
        match target {
            Ok((channel_id, name)) => {
                commands::kill_or_nudge(&self.supervisor, &channel_id, &name, nudge).await
            }
            Err(warning) => format!(":warning: {warning}"),
        }
    }
}
