// SPDX-FileCopyrightText: 2026 Agentway Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Agent process supervisor.
//!
//! Owns the lifecycle of `claude` child processes in both oneshot and
//! persistent modes, enforces the one-process-per-channel invariant through
//! a single registry of tagged entries, and exposes the kill/nudge/ps
//! control surface.
//!
//! Ownership rules: each spawned agent belongs to exactly one supervisor
//! task (the oneshot runner, or the persistent monitor task). That task
//! owns the stdout line buffer and the child handle; process close is the
//! single cleanup point that removes the registry entry, cancels timers,
//! drains the trailing partial line, and settles any pending turn.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdin, Command};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use agentway_core::types::{
    ActiveProcess, ProcessMode, ResolvedChannelConfig, ABSOLUTE_TIMEOUT_SECS,
};
use agentway_core::AgentwayError;

use crate::events::{parse_stream_line, AgentEvent, LineBuffer};
use crate::launch::{self, build_launch, LaunchKind, LaunchSpec, OutputFormat};
use crate::session;

/// Channel used to forward text deltas to the active responder.
pub type DeltaSender = mpsc::UnboundedSender<String>;

/// Payload of a completed agent turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub text: String,
    pub session_id: Option<String>,
    pub cost: Option<f64>,
    pub tokens: Option<u64>,
}

/// An in-flight persistent turn: accumulated text, the delta sink, and the
/// completion slot the caller is awaiting.
struct Turn {
    full_text: String,
    deltas: DeltaSender,
    done: Option<oneshot::Sender<Result<TurnOutcome, AgentwayError>>>,
}

/// Cumulative per-process counters, updated only on `result` events.
#[derive(Debug, Default)]
struct ProcessStats {
    last_prompt: String,
    message_count: u64,
    total_cost: f64,
    total_tokens: u64,
}

/// Registry entry for one live agent process.
struct ProcessHandle {
    mode: ProcessMode,
    session_id: Uuid,
    pid: Option<u32>,
    started_at: DateTime<Utc>,
    stats: Arc<Mutex<ProcessStats>>,
    /// Present for persistent entries only.
    stdin: Option<Arc<Mutex<ChildStdin>>>,
    /// Current-turn slot; `None` between persistent turns.
    turn: Arc<Mutex<Option<Turn>>>,
    /// Cancelled when the process closes or is explicitly killed.
    timers: CancellationToken,
}

/// Why the watchdog terminated a process, if it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimeoutCause {
    Idle,
    Absolute,
}

/// Lock-free slot recording a watchdog-initiated termination.
#[derive(Default)]
struct TimeoutFlag(AtomicU8);

impl TimeoutFlag {
    fn set(&self, cause: TimeoutCause) {
        let v = match cause {
            TimeoutCause::Idle => 1,
            TimeoutCause::Absolute => 2,
        };
        self.0.store(v, Ordering::SeqCst);
    }

    fn get(&self) -> Option<TimeoutCause> {
        match self.0.load(Ordering::SeqCst) {
            1 => Some(TimeoutCause::Idle),
            2 => Some(TimeoutCause::Absolute),
            _ => None,
        }
    }
}

/// Tracks the time of the most recent stdout/stderr activity.
///
/// Stored as milliseconds since the tracker's epoch so readers and the
/// watchdog never contend on a lock.
struct ActivityTracker {
    epoch: tokio::time::Instant,
    last_ms: AtomicU64,
}

impl ActivityTracker {
    fn new() -> Self {
        Self {
            epoch: tokio::time::Instant::now(),
            last_ms: AtomicU64::new(0),
        }
    }

    fn bump(&self) {
        self.last_ms
            .store(self.epoch.elapsed().as_millis() as u64, Ordering::Relaxed);
    }

    /// Deadline at which the idle window expires if no further activity.
    fn idle_deadline(&self, idle: Duration) -> tokio::time::Instant {
        self.epoch + Duration::from_millis(self.last_ms.load(Ordering::Relaxed)) + idle
    }
}

/// Supervises agent child processes for all channels.
pub struct Supervisor {
    registry: Arc<Mutex<HashMap<String, ProcessHandle>>>,
    /// Agent binary; overridable so tests can substitute a stub.
    program: String,
    absolute_timeout: Duration,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    pub fn new() -> Self {
        Self::with_program(launch::AGENT_PROGRAM)
    }

    /// Supervisor invoking a non-default agent binary (custom install
    /// locations, test stubs).
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            registry: Arc::new(Mutex::new(HashMap::new())),
            program: program.into(),
            absolute_timeout: Duration::from_secs(ABSOLUTE_TIMEOUT_SECS),
        }
    }

    /// Run a single oneshot agent turn for a channel.
    ///
    /// With a delta sink the agent streams (`--output-format stream-json`);
    /// without one it produces a single batch JSON document. On an
    /// `already in use` session collision the artifacts are cleared and the
    /// run is retried exactly once with a fresh `--session-id`.
    pub async fn run_oneshot(
        &self,
        config: &ResolvedChannelConfig,
        prompt: &str,
        image_paths: &[PathBuf],
        deltas: Option<DeltaSender>,
    ) -> Result<TurnOutcome, AgentwayError> {
        let session_id = session::derive_session_id(&config.channel_id, &config.folder);
        let resume = session::artifact_paths(&session_id, &config.folder)
            .log_file
            .exists();

        match self
            .oneshot_attempt(config, &session_id, prompt, image_paths, deltas.clone(), resume)
            .await
        {
            Err(AgentwayError::AgentExit { stderr, .. }) if stderr.contains("already in use") => {
                warn!(
                    channel = %config.channel_id,
                    session = %session_id,
                    "session collision, clearing artifacts and retrying once"
                );
                session::clear_artifacts(&session_id, &config.folder).await;
                self.oneshot_attempt(config, &session_id, prompt, image_paths, deltas, false)
                    .await
            }
            other => other,
        }
    }

    async fn oneshot_attempt(
        &self,
        config: &ResolvedChannelConfig,
        session_id: &Uuid,
        prompt: &str,
        image_paths: &[PathBuf],
        deltas: Option<DeltaSender>,
        resume: bool,
    ) -> Result<TurnOutcome, AgentwayError> {
        let output = if deltas.is_some() {
            OutputFormat::StreamJson
        } else {
            OutputFormat::Json
        };
        let kind = LaunchKind::Oneshot {
            prompt: prompt.to_string(),
            image_paths: image_paths.to_vec(),
            output,
        };
        let spec = build_launch(config, session_id, resume, &kind, mcp_config_path().as_deref());

        let timers = CancellationToken::new();
        let activity = Arc::new(ActivityTracker::new());
        let timeout_flag = Arc::new(TimeoutFlag::default());

        // Check + spawn + insert under one registry lock so two tasks can
        // never race a channel into two processes.
        let mut child = {
            let mut registry = self.registry.lock().await;
            if registry.contains_key(&config.channel_id) {
                return Err(AgentwayError::Internal(format!(
                    "channel {} already has an active agent process",
                    config.channel_id
                )));
            }
            let child = self.spawn_child(&spec)?;
            registry.insert(
                config.channel_id.clone(),
                ProcessHandle {
                    mode: ProcessMode::Oneshot,
                    session_id: *session_id,
                    pid: child.id(),
                    started_at: Utc::now(),
                    stats: Arc::new(Mutex::new(ProcessStats {
                        last_prompt: prompt_prefix(prompt),
                        message_count: 1,
                        ..ProcessStats::default()
                    })),
                    stdin: None,
                    turn: Arc::new(Mutex::new(None)),
                    timers: timers.clone(),
                },
            );
            child
        };

        info!(
            channel = %config.channel_id,
            session = %session_id,
            resume,
            streaming = deltas.is_some(),
            "spawned oneshot agent"
        );

        if let Some(pid) = child.id() {
            spawn_watchdog(
                pid,
                Duration::from_millis(config.timeout_ms),
                self.absolute_timeout,
                timers.clone(),
                activity.clone(),
                timeout_flag.clone(),
            );
        }

        let stderr_buf = spawn_stderr_collector(child.stderr.take(), activity.clone());

        // The runner task owns stdout and the line buffer.
        let mut stdout = match child.stdout.take() {
            Some(s) => s,
            None => {
                timers.cancel();
                self.registry.lock().await.remove(&config.channel_id);
                return Err(AgentwayError::Internal("agent stdout not piped".into()));
            }
        };

        let mut line_buf = LineBuffer::new();
        let mut raw = String::new();
        let mut full_text = String::new();
        let mut result: Option<TurnOutcome> = None;
        let mut chunk = [0u8; 8192];

        loop {
            let n = match stdout.read(&mut chunk).await {
                Ok(n) => n,
                Err(_) => 0,
            };
            if n == 0 {
                break;
            }
            activity.bump();
            match output {
                OutputFormat::Json => {
                    raw.push_str(&String::from_utf8_lossy(&chunk[..n]));
                }
                OutputFormat::StreamJson => {
                    for line in line_buf.push(&chunk[..n]) {
                        consume_oneshot_line(&line, &mut full_text, &mut result, deltas.as_ref());
                    }
                }
            }
        }
        if output == OutputFormat::StreamJson {
            if let Some(line) = line_buf.flush() {
                consume_oneshot_line(&line, &mut full_text, &mut result, deltas.as_ref());
            }
        }

        let status = child.wait().await;
        timers.cancel();
        self.registry.lock().await.remove(&config.channel_id);

        let status = status
            .map_err(|e| AgentwayError::Internal(format!("waiting for agent exit: {e}")))?;

        if let Some(cause) = timeout_flag.get() {
            return Err(timeout_error(cause, config.timeout_ms));
        }

        if !status.success() {
            let stderr = stderr_buf.lock().await.trim().to_string();
            return Err(AgentwayError::AgentExit {
                code: status.code().unwrap_or(-1),
                stderr,
            });
        }

        match output {
            OutputFormat::StreamJson => Ok(result.unwrap_or(TurnOutcome {
                text: full_text,
                session_id: None,
                cost: None,
                tokens: None,
            })),
            OutputFormat::Json => Ok(parse_batch_json(&raw)),
        }
    }

    /// Run one turn against a channel's long-lived agent, spawning it
    /// transparently when absent or exited.
    pub async fn run_persistent_turn(
        &self,
        config: &ResolvedChannelConfig,
        prompt: &str,
        deltas: DeltaSender,
    ) -> Result<TurnOutcome, AgentwayError> {
        let (stdin, turn_slot, stats) = {
            let mut registry = self.registry.lock().await;
            match registry.get(&config.channel_id) {
                Some(handle) if handle.mode == ProcessMode::Persistent => {}
                Some(_) => {
                    return Err(AgentwayError::Internal(format!(
                        "channel {} is busy with a oneshot run",
                        config.channel_id
                    )))
                }
                None => {
                    let handle = self.spawn_persistent(config).await?;
                    registry.insert(config.channel_id.clone(), handle);
                }
            }
            let Some(handle) = registry.get(&config.channel_id) else {
                return Err(AgentwayError::Internal("agent registry entry vanished".into()));
            };
            (handle.stdin.clone(), handle.turn.clone(), handle.stats.clone())
        };

        let Some(stdin) = stdin else {
            return Err(AgentwayError::Internal(
                "persistent agent entry lacks a stdin pipe".into(),
            ));
        };

        stats.lock().await.last_prompt = prompt_prefix(prompt);

        let (done_tx, done_rx) = oneshot::channel();
        {
            let mut slot = turn_slot.lock().await;
            if slot.is_some() {
                return Err(AgentwayError::Internal(format!(
                    "channel {} already has a turn in flight",
                    config.channel_id
                )));
            }
            *slot = Some(Turn {
                full_text: String::new(),
                deltas,
                done: Some(done_tx),
            });
        }

        let line = format!(
            "{}\n",
            serde_json::json!({
                "type": "user",
                "message": { "role": "user", "content": prompt },
            })
        );
        let write_result = {
            let mut guard = stdin.lock().await;
            match guard.write_all(line.as_bytes()).await {
                Ok(()) => guard.flush().await,
                Err(e) => Err(e),
            }
        };

        if let Err(e) = write_result {
            // The process is gone; fail this turn explicitly rather than
            // leaving the caller hanging, and tear the entry down.
            turn_slot.lock().await.take();
            self.kill_process(&config.channel_id).await;
            return Err(AgentwayError::Spawn {
                message: format!("agent stdin write failed: {e}"),
            });
        }

        debug!(channel = %config.channel_id, "turn submitted to persistent agent");

        match done_rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(AgentwayError::Internal(
                "turn abandoned before completion".into(),
            )),
        }
    }

    /// Spawn a persistent agent and its monitor task. Caller inserts the
    /// returned handle into the registry under the channel id.
    async fn spawn_persistent(
        &self,
        config: &ResolvedChannelConfig,
    ) -> Result<ProcessHandle, AgentwayError> {
        let session_id = session::derive_session_id(&config.channel_id, &config.folder);
        let resume = session::artifact_paths(&session_id, &config.folder)
            .log_file
            .exists();
        let spec = build_launch(
            config,
            &session_id,
            resume,
            &LaunchKind::Persistent,
            mcp_config_path().as_deref(),
        );

        let mut child = self.spawn_child(&spec)?;
        let Some(pid) = child.id() else {
            return Err(AgentwayError::Spawn {
                message: "spawned agent has no pid".into(),
            });
        };

        info!(
            channel = %config.channel_id,
            session = %session_id,
            pid,
            resume,
            "spawned persistent agent"
        );

        let timers = CancellationToken::new();
        let activity = Arc::new(ActivityTracker::new());
        let timeout_flag = Arc::new(TimeoutFlag::default());
        spawn_watchdog(
            pid,
            Duration::from_millis(config.timeout_ms),
            self.absolute_timeout,
            timers.clone(),
            activity.clone(),
            timeout_flag.clone(),
        );

        let Some(stdin) = child.stdin.take() else {
            timers.cancel();
            return Err(AgentwayError::Spawn {
                message: "agent stdin not piped".into(),
            });
        };
        let stderr_buf = spawn_stderr_collector(child.stderr.take(), activity.clone());

        let turn: Arc<Mutex<Option<Turn>>> = Arc::new(Mutex::new(None));
        let stats = Arc::new(Mutex::new(ProcessStats::default()));

        tokio::spawn(monitor_persistent(MonitorContext {
            child,
            channel_id: config.channel_id.clone(),
            pid,
            registry: self.registry.clone(),
            turn: turn.clone(),
            stats: stats.clone(),
            stderr_buf,
            timers: timers.clone(),
            activity,
            timeout_flag,
            timeout_ms: config.timeout_ms,
        }));

        Ok(ProcessHandle {
            mode: ProcessMode::Persistent,
            session_id,
            pid: Some(pid),
            started_at: Utc::now(),
            stats,
            stdin: Some(Arc::new(Mutex::new(stdin))),
            turn,
            timers,
        })
    }

    fn spawn_child(&self, spec: &LaunchSpec) -> Result<Child, AgentwayError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&spec.args)
            .current_dir(&spec.cwd)
            .stdin(if spec.piped_stdin {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        launch::apply_spawn_env(&mut cmd);
        cmd.spawn().map_err(|e| AgentwayError::Spawn {
            message: e.to_string(),
        })
    }

    /// Snapshot of every live agent, both modes.
    pub async fn get_active_processes(&self) -> Vec<ActiveProcess> {
        let registry = self.registry.lock().await;
        let mut processes = Vec::with_capacity(registry.len());
        for (channel_id, handle) in registry.iter() {
            let stats = handle.stats.lock().await;
            let is_active = match handle.mode {
                ProcessMode::Oneshot => true,
                ProcessMode::Persistent => handle.turn.lock().await.is_some(),
            };
            processes.push(ActiveProcess {
                channel_id: channel_id.clone(),
                session_id: handle.session_id.to_string(),
                mode: handle.mode,
                started_at: handle.started_at,
                last_prompt: stats.last_prompt.clone(),
                message_count: stats.message_count,
                total_cost: stats.total_cost,
                total_tokens: stats.total_tokens,
                is_active,
            });
        }
        processes.sort_by(|a, b| a.channel_id.cmp(&b.channel_id));
        processes
    }

    /// SIGTERM the channel's agent and cancel its timers. Returns whether a
    /// process was found. Registry removal happens in the close handler.
    pub async fn kill_process(&self, channel_id: &str) -> bool {
        let registry = self.registry.lock().await;
        match registry.get(channel_id) {
            Some(handle) => {
                handle.timers.cancel();
                if let Some(pid) = handle.pid {
                    info!(channel = %channel_id, pid, "sending SIGTERM to agent");
                    send_signal(pid, libc::SIGTERM);
                }
                true
            }
            None => false,
        }
    }

    /// SIGINT the channel's agent to prompt it to wrap up. Timers and the
    /// registry are left untouched.
    pub async fn nudge_process(&self, channel_id: &str) -> bool {
        let registry = self.registry.lock().await;
        match registry.get(channel_id) {
            Some(handle) => {
                if let Some(pid) = handle.pid {
                    info!(channel = %channel_id, pid, "sending SIGINT to agent");
                    send_signal(pid, libc::SIGINT);
                }
                true
            }
            None => false,
        }
    }

    /// SIGTERM every live agent. Returns the affected channel ids.
    pub async fn kill_all_processes(&self) -> Vec<String> {
        let registry = self.registry.lock().await;
        let mut killed = Vec::new();
        for (channel_id, handle) in registry.iter() {
            handle.timers.cancel();
            if let Some(pid) = handle.pid {
                send_signal(pid, libc::SIGTERM);
            }
            killed.push(channel_id.clone());
        }
        killed.sort();
        if !killed.is_empty() {
            info!(count = killed.len(), "sent SIGTERM to all agents");
        }
        killed
    }
}

/// Everything the persistent monitor task owns.
struct MonitorContext {
    child: Child,
    channel_id: String,
    pid: u32,
    registry: Arc<Mutex<HashMap<String, ProcessHandle>>>,
    turn: Arc<Mutex<Option<Turn>>>,
    stats: Arc<Mutex<ProcessStats>>,
    stderr_buf: Arc<Mutex<String>>,
    timers: CancellationToken,
    activity: Arc<ActivityTracker>,
    timeout_flag: Arc<TimeoutFlag>,
    timeout_ms: u64,
}

/// Reads a persistent agent's stdout until EOF, dispatches events, and
/// performs close-time cleanup.
async fn monitor_persistent(mut ctx: MonitorContext) {
    let mut line_buf = LineBuffer::new();
    let mut chunk = [0u8; 8192];

    if let Some(mut stdout) = ctx.child.stdout.take() {
        loop {
            let n = match stdout.read(&mut chunk).await {
                Ok(n) => n,
                Err(_) => 0,
            };
            if n == 0 {
                break;
            }
            ctx.activity.bump();
            for line in line_buf.push(&chunk[..n]) {
                consume_persistent_line(&line, &ctx.turn, &ctx.stats).await;
            }
        }
        if let Some(line) = line_buf.flush() {
            consume_persistent_line(&line, &ctx.turn, &ctx.stats).await;
        }
    }

    let status = ctx.child.wait().await;
    ctx.timers.cancel();

    // Remove the registry entry only if it is still ours; a replacement
    // process may already occupy the channel slot.
    {
        let mut registry = ctx.registry.lock().await;
        if registry
            .get(&ctx.channel_id)
            .is_some_and(|h| h.pid == Some(ctx.pid))
        {
            registry.remove(&ctx.channel_id);
        }
    }

    // Settle any pending turn from the close handler, the single place that
    // decides success vs failure for interrupted turns.
    let pending = ctx.turn.lock().await.take();
    if let Some(mut turn) = pending {
        let outcome = match ctx.timeout_flag.get() {
            Some(cause) => Err(timeout_error(cause, ctx.timeout_ms)),
            None => match status {
                Ok(s) if s.success() => Ok(TurnOutcome {
                    text: turn.full_text.clone(),
                    session_id: None,
                    cost: None,
                    tokens: None,
                }),
                Ok(s) => Err(AgentwayError::AgentExit {
                    code: s.code().unwrap_or(-1),
                    stderr: ctx.stderr_buf.lock().await.trim().to_string(),
                }),
                Err(e) => Err(AgentwayError::Internal(format!(
                    "waiting for agent exit: {e}"
                ))),
            },
        };
        if let Some(done) = turn.done.take() {
            let _ = done.send(outcome);
        }
    }

    info!(channel = %ctx.channel_id, pid = ctx.pid, "persistent agent exited");
}

/// Dispatch one parsed line for a oneshot run.
fn consume_oneshot_line(
    line: &str,
    full_text: &mut String,
    result: &mut Option<TurnOutcome>,
    deltas: Option<&DeltaSender>,
) {
    match parse_stream_line(line) {
        Some(AgentEvent::TextDelta { text }) => {
            full_text.push_str(&text);
            if let Some(tx) = deltas {
                let _ = tx.send(text);
            }
        }
        Some(AgentEvent::TurnResult {
            text,
            session_id,
            cost,
            tokens,
        }) => {
            let text = if text.is_empty() {
                full_text.clone()
            } else {
                text
            };
            *result = Some(TurnOutcome {
                text,
                session_id,
                cost,
                tokens,
            });
        }
        Some(AgentEvent::UserReceipt) | None => {}
    }
}

/// Dispatch one parsed line for a persistent agent.
async fn consume_persistent_line(
    line: &str,
    turn: &Arc<Mutex<Option<Turn>>>,
    stats: &Arc<Mutex<ProcessStats>>,
) {
    match parse_stream_line(line) {
        Some(AgentEvent::TextDelta { text }) => {
            let mut slot = turn.lock().await;
            if let Some(active) = slot.as_mut() {
                active.full_text.push_str(&text);
                let _ = active.deltas.send(text);
            }
        }
        Some(AgentEvent::TurnResult {
            text,
            session_id,
            cost,
            tokens,
        }) => {
            {
                let mut s = stats.lock().await;
                s.message_count += 1;
                s.total_cost += cost.unwrap_or(0.0);
                s.total_tokens += tokens.unwrap_or(0);
            }
            let taken = turn.lock().await.take();
            if let Some(mut active) = taken {
                let text = if text.is_empty() {
                    active.full_text.clone()
                } else {
                    text
                };
                if let Some(done) = active.done.take() {
                    let _ = done.send(Ok(TurnOutcome {
                        text,
                        session_id,
                        cost,
                        tokens,
                    }));
                }
            }
        }
        Some(AgentEvent::UserReceipt) => {
            debug!("agent acknowledged stdin message");
        }
        None => {}
    }
}

/// Collect stderr into a shared buffer, bumping the activity tracker on
/// every chunk so stderr chatter also resets the idle timer.
fn spawn_stderr_collector(
    stderr: Option<ChildStderr>,
    activity: Arc<ActivityTracker>,
) -> Arc<Mutex<String>> {
    let buf = Arc::new(Mutex::new(String::new()));
    if let Some(mut stderr) = stderr {
        let buf = buf.clone();
        tokio::spawn(async move {
            let mut chunk = [0u8; 4096];
            loop {
                let n = match stderr.read(&mut chunk).await {
                    Ok(n) => n,
                    Err(_) => 0,
                };
                if n == 0 {
                    break;
                }
                activity.bump();
                buf.lock()
                    .await
                    .push_str(&String::from_utf8_lossy(&chunk[..n]));
            }
        });
    }
    buf
}

/// Arm the per-process timers: idle (reset on activity) and the 12 h
/// absolute cap. Either firing sends SIGTERM and records its cause.
fn spawn_watchdog(
    pid: u32,
    idle: Duration,
    absolute: Duration,
    timers: CancellationToken,
    activity: Arc<ActivityTracker>,
    timeout_flag: Arc<TimeoutFlag>,
) {
    tokio::spawn(async move {
        let absolute_sleep = tokio::time::sleep(absolute);
        tokio::pin!(absolute_sleep);
        loop {
            let deadline = activity.idle_deadline(idle);
            tokio::select! {
                _ = timers.cancelled() => return,
                _ = &mut absolute_sleep => {
                    timeout_flag.set(TimeoutCause::Absolute);
                    warn!(pid, "absolute timeout reached, sending SIGTERM");
                    send_signal(pid, libc::SIGTERM);
                    return;
                }
                _ = tokio::time::sleep_until(deadline) => {
                    // Activity may have been bumped while we slept; only
                    // fire when the recomputed deadline has truly passed.
                    if tokio::time::Instant::now() >= activity.idle_deadline(idle) {
                        timeout_flag.set(TimeoutCause::Idle);
                        warn!(pid, idle_ms = idle.as_millis() as u64, "idle timeout, sending SIGTERM");
                        send_signal(pid, libc::SIGTERM);
                        return;
                    }
                }
            }
        }
    });
}

fn timeout_error(cause: TimeoutCause, timeout_ms: u64) -> AgentwayError {
    match cause {
        TimeoutCause::Idle => AgentwayError::IdleTimeout { timeout_ms },
        TimeoutCause::Absolute => AgentwayError::AbsoluteTimeout,
    }
}

fn send_signal(pid: u32, signal: i32) {
    // Best-effort: the process may already be gone.
    unsafe {
        libc::kill(pid as libc::pid_t, signal);
    }
}

/// First ≤ 80 characters of a prompt, for `!ps` display.
fn prompt_prefix(prompt: &str) -> String {
    prompt.chars().take(80).collect()
}

/// Parse the single JSON document a `--output-format json` run produces.
/// Falls back to the raw text when the document is not valid JSON.
fn parse_batch_json(raw: &str) -> TurnOutcome {
    match serde_json::from_str::<serde_json::Value>(raw.trim()) {
        Ok(value) => {
            let text = value
                .get("result")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| raw.trim().to_string());
            let session_id = value
                .get("session_id")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            let cost = value
                .get("cost_usd")
                .and_then(|v| v.as_f64())
                .or_else(|| value.get("total_cost_usd").and_then(|v| v.as_f64()));
            let tokens = value.get("usage").map(|usage| {
                usage
                    .get("input_tokens")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0)
                    + usage
                        .get("output_tokens")
                        .and_then(|v| v.as_u64())
                        .unwrap_or(0)
            });
            TurnOutcome {
                text,
                session_id,
                cost,
                tokens,
            }
        }
        Err(_) => TurnOutcome {
            text: raw.trim().to_string(),
            session_id: None,
            cost: None,
            tokens: None,
        },
    }
}

/// The gateway's own `mcp.json`, forwarded to the agent when present in the
/// supervisor process's working directory.
fn mcp_config_path() -> Option<PathBuf> {
    let path = std::env::current_dir().ok()?.join("mcp.json");
    path.exists().then_some(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentway_core::types::ResponseMode;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// Write an executable stub standing in for the agent binary.
    fn fake_agent(dir: &TempDir, script: &str) -> String {
        let path = dir.path().join("claude");
        std::fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path.to_string_lossy().into_owned()
    }

    fn supervisor_with(program: String) -> Supervisor {
        Supervisor {
            registry: Arc::new(Mutex::new(HashMap::new())),
            program,
            absolute_timeout: Duration::from_secs(ABSOLUTE_TIMEOUT_SECS),
        }
    }

    fn config(dir: &TempDir, mode: ProcessMode) -> ResolvedChannelConfig {
        ResolvedChannelConfig {
            channel_id: "C001".into(),
            name: "one".into(),
            folder: dir.path().to_string_lossy().into_owned(),
            model: "sonnet".into(),
            system_prompt: String::new(),
            timeout_ms: 5_000,
            response_mode: ResponseMode::Batch,
            process_mode: mode,
        }
    }

    const RESULT_LINE: &str = r#"{"type":"result","result":"hi","cost_usd":0.01,"usage":{"input_tokens":10,"output_tokens":5}}"#;

    #[tokio::test]
    async fn oneshot_stream_happy_path() {
        let dir = TempDir::new().unwrap();
        let program = fake_agent(
            &dir,
            &format!(
                "echo '{}'\necho '{RESULT_LINE}'",
                r#"{"type":"stream_event","event":{"type":"content_block_delta","delta":{"type":"text_delta","text":"hi"}}}"#
            ),
        );
        let supervisor = supervisor_with(program);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let outcome = supervisor
            .run_oneshot(&config(&dir, ProcessMode::Oneshot), "hello", &[], Some(tx))
            .await
            .unwrap();

        assert_eq!(outcome.text, "hi");
        assert_eq!(outcome.cost, Some(0.01));
        assert_eq!(outcome.tokens, Some(15));
        assert_eq!(rx.recv().await.as_deref(), Some("hi"));
        // Close is the single cleanup point: registry must be empty.
        assert!(supervisor.get_active_processes().await.is_empty());
    }

    #[tokio::test]
    async fn oneshot_batch_json_path() {
        let dir = TempDir::new().unwrap();
        let program = fake_agent(
            &dir,
            r#"echo '{"result":"batch answer","session_id":"s1","total_cost_usd":0.2}'"#,
        );
        let supervisor = supervisor_with(program);

        let outcome = supervisor
            .run_oneshot(&config(&dir, ProcessMode::Oneshot), "hello", &[], None)
            .await
            .unwrap();

        assert_eq!(outcome.text, "batch answer");
        assert_eq!(outcome.session_id.as_deref(), Some("s1"));
        assert_eq!(outcome.cost, Some(0.2));
    }

    #[tokio::test]
    async fn oneshot_nonzero_exit_surfaces_stderr() {
        let dir = TempDir::new().unwrap();
        let program = fake_agent(&dir, "echo 'model overloaded' >&2\nexit 3");
        let supervisor = supervisor_with(program);

        let err = supervisor
            .run_oneshot(&config(&dir, ProcessMode::Oneshot), "hello", &[], None)
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "Claude exited with code 3: model overloaded"
        );
        assert!(supervisor.get_active_processes().await.is_empty());
    }

    #[tokio::test]
    async fn oneshot_session_collision_retries_once() {
        let dir = TempDir::new().unwrap();
        // Fails with the collision marker on the first run, succeeds after.
        let marker = dir.path().join("ran-once");
        let program = fake_agent(
            &dir,
            &format!(
                "if [ ! -f {m} ]; then touch {m}; echo 'session already in use' >&2; exit 1; fi\necho '{RESULT_LINE}'",
                m = marker.display()
            ),
        );
        let supervisor = supervisor_with(program);
        let (tx, _rx) = mpsc::unbounded_channel();

        let outcome = supervisor
            .run_oneshot(&config(&dir, ProcessMode::Oneshot), "hello", &[], Some(tx))
            .await
            .unwrap();
        assert_eq!(outcome.text, "hi");
    }

    #[tokio::test]
    async fn oneshot_idle_timeout_fires() {
        let dir = TempDir::new().unwrap();
        let program = fake_agent(&dir, "exec sleep 30");
        let supervisor = supervisor_with(program);
        let mut cfg = config(&dir, ProcessMode::Oneshot);
        cfg.timeout_ms = 150;

        let err = supervisor
            .run_oneshot(&cfg, "hello", &[], None)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentwayError::IdleTimeout { .. }), "{err}");
    }

    #[tokio::test]
    async fn persistent_turns_reuse_the_process() {
        let dir = TempDir::new().unwrap();
        let delta = r#"{"type":"stream_event","event":{"type":"content_block_delta","delta":{"type":"text_delta","text":"pong"}}}"#;
        let result = r#"{"type":"result","result":"pong","usage":{"input_tokens":1,"output_tokens":2}}"#;
        let program = fake_agent(
            &dir,
            &format!(
                "while read line; do\n  echo '{{\"type\":\"user\"}}'\n  echo '{delta}'\n  echo '{result}'\ndone"
            ),
        );
        let supervisor = supervisor_with(program);
        let cfg = config(&dir, ProcessMode::Persistent);

        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let out1 = supervisor
            .run_persistent_turn(&cfg, "first", tx1)
            .await
            .unwrap();
        assert_eq!(out1.text, "pong");
        assert_eq!(rx1.recv().await.as_deref(), Some("pong"));

        // Process stays registered and idle between turns.
        let procs = supervisor.get_active_processes().await;
        assert_eq!(procs.len(), 1);
        assert_eq!(procs[0].mode, ProcessMode::Persistent);
        assert!(!procs[0].is_active);
        assert_eq!(procs[0].message_count, 1);
        assert_eq!(procs[0].total_tokens, 3);
        let first_session = procs[0].session_id.clone();

        let (tx2, _rx2) = mpsc::unbounded_channel();
        let out2 = supervisor
            .run_persistent_turn(&cfg, "second", tx2)
            .await
            .unwrap();
        assert_eq!(out2.text, "pong");

        let procs = supervisor.get_active_processes().await;
        assert_eq!(procs.len(), 1);
        assert_eq!(procs[0].message_count, 2);
        assert_eq!(procs[0].session_id, first_session);
        assert_eq!(procs[0].last_prompt, "second");

        assert!(supervisor.kill_process("C001").await);
    }

    #[tokio::test]
    async fn kill_process_rejects_in_flight_turn() {
        let dir = TempDir::new().unwrap();
        // Echoes the receipt, then stalls without producing a result.
        let program = fake_agent(
            &dir,
            "while read line; do\n  echo '{\"type\":\"user\"}'\n  read stall\ndone",
        );
        let supervisor = supervisor_with(program);
        let cfg = config(&dir, ProcessMode::Persistent);

        let (tx, _rx) = mpsc::unbounded_channel();
        let supervisor = Arc::new(supervisor);
        let sup = supervisor.clone();
        let cfg2 = cfg.clone();
        let turn = tokio::spawn(async move { sup.run_persistent_turn(&cfg2, "go", tx).await });

        // Give the turn time to start, then kill the process.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(supervisor.kill_process("C001").await);

        let err = turn.await.unwrap().unwrap_err();
        assert!(matches!(err, AgentwayError::AgentExit { .. }), "{err}");
        // Close handler removed the entry.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(supervisor.get_active_processes().await.is_empty());
        assert!(!supervisor.kill_process("C001").await);
    }

    #[tokio::test]
    async fn kill_all_reports_channels() {
        let dir = TempDir::new().unwrap();
        let program = fake_agent(&dir, "while read line; do :; done");
        let supervisor = Arc::new(supervisor_with(program));

        // Spawn two idle persistent agents on different channels.
        for id in ["C001", "C002"] {
            let mut cfg = config(&dir, ProcessMode::Persistent);
            cfg.channel_id = id.to_string();
            let mut registry = supervisor.registry.lock().await;
            let handle = supervisor.spawn_persistent(&cfg).await.unwrap();
            registry.insert(id.to_string(), handle);
        }

        let killed = supervisor.kill_all_processes().await;
        assert_eq!(killed, vec!["C001", "C002"]);
    }

    #[test]
    fn prompt_prefix_truncates_at_80_chars() {
        let long = "x".repeat(200);
        assert_eq!(prompt_prefix(&long).chars().count(), 80);
        assert_eq!(prompt_prefix("short"), "short");
    }

    #[test]
    fn batch_json_fallback_on_invalid_json() {
        let outcome = parse_batch_json("plain text response\n");
        assert_eq!(outcome.text, "plain text response");
        assert_eq!(outcome.cost, None);
    }
}
