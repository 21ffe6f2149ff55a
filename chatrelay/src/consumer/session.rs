// Copyright 2026 The Chatrelay Project
// SPDX-License-Identifier: Apache-2.0

// Chat session actor
//
// One task per session owns the transcript and the in-flight byte stream.
// The `ChatSession` handle talks to it over a command channel and observes
// it through a watch channel of snapshots. Because the actor selects over
// commands and the next chunk, a cancel is served while a read is pending.

use std::sync::Arc;

use bytes::Bytes;
use futures_util::stream::{self, StreamExt, TryStreamExt};
use tokio::sync::{mpsc, oneshot, watch};

use super::transport::{ByteStream, ChatTransport, TransportError};
use crate::config::Config;
use crate::message::{ChatRequest, Role, Turn};
use crate::stream::{FrameDecoder, StreamError, StreamEvent, DEFAULT_MAX_LINE_BYTES};
use crate::transcript::{Transcript, TurnView};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Lifecycle state carried in each `SessionView`.
///
/// `Finalized`, `Failed` and `Cancelled` are published for an instant as an
/// exchange closes and are replaced by `Idle` straight away, so a watcher
/// woken by `changed()` will usually see only `Streaming` then `Idle`. Read
/// `SessionView::outcome` to learn how an exchange ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Streaming,
    Finalized,
    Failed,
    Cancelled,
}

/// How the most recent exchange ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Finalized,
    Failed,
    Cancelled,
}

impl From<Outcome> for SessionState {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Finalized => SessionState::Finalized,
            Outcome::Failed => SessionState::Failed,
            Outcome::Cancelled => SessionState::Cancelled,
        }
    }
}

/// Snapshot of a session, published after every change.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    pub state: SessionState,
    /// Outcome of the last completed exchange; cleared when a new one starts.
    pub outcome: Option<Outcome>,
    pub turns: Vec<TurnView>,
    /// Non-frame lines discarded over the whole session.
    pub discarded_lines: u64,
}

impl SessionView {
    pub fn is_streaming(&self) -> bool {
        self.state == SessionState::Streaming
    }

    /// Content of the last assistant turn, in flight or not.
    pub fn last_assistant(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|t| t.role == Role::Assistant)
            .map(|t| t.content.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("a response is already streaming")]
    Busy,
    #[error("message is empty")]
    EmptyMessage,
    #[error("session has shut down")]
    SessionClosed,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub greeting: Option<String>,
    pub failure_message: String,
    /// Most recent finalized turns sent as history.
    pub max_history_turns: usize,
    pub max_line_bytes: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl SessionConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            greeting: config.client.greeting.clone(),
            failure_message: config.client.failure_message.clone(),
            max_history_turns: config.relay.limits.max_history_turns,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

enum Command {
    Send {
        text: String,
        reply: oneshot::Sender<Result<(), SendError>>,
    },
    Cancel {
        reply: oneshot::Sender<bool>,
    },
}

/// Handle to a running session. Dropping it shuts the session down and
/// releases any in-flight response.
pub struct ChatSession {
    commands: mpsc::Sender<Command>,
    view: watch::Receiver<SessionView>,
}

impl ChatSession {
    /// Start a session actor on the current tokio runtime.
    pub fn spawn(transport: Arc<dyn ChatTransport>, config: SessionConfig) -> Self {
        let transcript = match &config.greeting {
            Some(greeting) => Transcript::with_greeting(greeting.clone()),
            None => Transcript::new(),
        };
        let (view_tx, view_rx) = watch::channel(SessionView {
            state: SessionState::Idle,
            outcome: None,
            turns: transcript.views(),
            discarded_lines: 0,
        });
        let (cmd_tx, cmd_rx) = mpsc::channel(8);

        let actor = SessionActor {
            transport,
            config,
            transcript,
            view: view_tx,
            active: None,
            outcome: None,
            discarded_lines: 0,
            exchanges: 0,
        };
        tokio::spawn(actor.run(cmd_rx));

        Self {
            commands: cmd_tx,
            view: view_rx,
        }
    }

    /// Submit a user message. Returns once the exchange has started; the
    /// response arrives through snapshots.
    pub async fn send(&self, text: impl Into<String>) -> Result<(), SendError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Send {
                text: text.into(),
                reply,
            })
            .await
            .map_err(|_| SendError::SessionClosed)?;
        rx.await.map_err(|_| SendError::SessionClosed)?
    }

    /// Abort the in-flight response. Returns false when nothing was streaming.
    pub async fn cancel(&self) -> bool {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Cancel { reply }).await.is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    pub fn snapshot(&self) -> SessionView {
        self.view.borrow().clone()
    }

    /// Wait until the current exchange (if any) is over.
    pub async fn wait_idle(&self) -> Result<SessionView, SendError> {
        let mut rx = self.view.clone();
        let view = rx
            .wait_for(|v| v.state == SessionState::Idle)
            .await
            .map_err(|_| SendError::SessionClosed)?;
        Ok(view.clone())
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

struct ActiveStream {
    exchange: u64,
    bytes: ByteStream,
    decoder: FrameDecoder,
    chunks: u64,
}

struct SessionActor {
    transport: Arc<dyn ChatTransport>,
    config: SessionConfig,
    transcript: Transcript,
    view: watch::Sender<SessionView>,
    active: Option<ActiveStream>,
    outcome: Option<Outcome>,
    /// Discards from completed exchanges; the active decoder adds its own.
    discarded_lines: u64,
    exchanges: u64,
}

async fn next_chunk(active: &mut Option<ActiveStream>) -> Option<Result<Bytes, TransportError>> {
    match active {
        Some(active) => active.bytes.next().await,
        None => std::future::pending().await,
    }
}

impl SessionActor {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            tokio::select! {
                biased;
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.handle(cmd),
                    None => break,
                },
                item = next_chunk(&mut self.active) => self.on_chunk(item),
            }
        }
        if let Some(active) = self.active.take() {
            tracing::debug!(exchange = active.exchange, "session closed with response in flight");
        }
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Send { text, reply } => {
                let _ = reply.send(self.start(text));
            }
            Command::Cancel { reply } => {
                let _ = reply.send(self.cancel());
            }
        }
    }

    fn start(&mut self, text: String) -> Result<(), SendError> {
        if self.active.is_some() {
            return Err(SendError::Busy);
        }
        if text.trim().is_empty() {
            return Err(SendError::EmptyMessage);
        }

        let finalized = self.transcript.finalized();
        let skip = finalized.len().saturating_sub(self.config.max_history_turns);
        let history: Vec<Turn> = finalized[skip..].to_vec();

        self.transcript
            .begin_exchange(text.clone())
            .map_err(|_| SendError::Busy)?;

        self.exchanges += 1;
        let request = ChatRequest::streaming(text, history);
        tracing::debug!(
            exchange = self.exchanges,
            history_turns = request.messages.len(),
            "starting exchange"
        );

        // Opened lazily inside the stream so a cancel can interrupt the
        // connect as well as the body.
        let transport = self.transport.clone();
        let bytes = stream::once(async move { transport.open(&request).await }).try_flatten();

        self.active = Some(ActiveStream {
            exchange: self.exchanges,
            bytes: Box::pin(bytes),
            decoder: FrameDecoder::with_max_line_bytes(self.config.max_line_bytes),
            chunks: 0,
        });
        self.outcome = None;
        self.publish(SessionState::Streaming);
        Ok(())
    }

    fn cancel(&mut self) -> bool {
        let Some(active) = self.active.take() else {
            return false;
        };
        tracing::info!(
            exchange = active.exchange,
            chunks = active.chunks,
            "exchange cancelled"
        );
        self.close(active, Outcome::Cancelled, None);
        true
    }

    fn on_chunk(&mut self, item: Option<Result<Bytes, TransportError>>) {
        let Some(mut active) = self.active.take() else {
            return;
        };

        match item {
            Some(Ok(chunk)) => {
                active.chunks += 1;
                match active.decoder.feed(&chunk) {
                    Ok(events) => {
                        if self.apply(&active, events) {
                            self.close(active, Outcome::Finalized, None);
                        } else {
                            self.active = Some(active);
                        }
                    }
                    Err(e @ StreamError::LineTooLong { .. }) => {
                        self.close(active, Outcome::Failed, Some(e.to_string()));
                    }
                }
            }
            Some(Err(e)) => {
                self.close(active, Outcome::Failed, Some(e.to_string()));
            }
            None => {
                let events = active.decoder.flush();
                self.apply(&active, events);
                if !active.decoder.is_finished() {
                    tracing::debug!(
                        exchange = active.exchange,
                        "stream ended without terminal frame"
                    );
                }
                self.close(active, Outcome::Finalized, None);
            }
        }
    }

    /// Apply decoded events; true once the terminal event was seen.
    fn apply(&mut self, active: &ActiveStream, events: Vec<StreamEvent>) -> bool {
        for event in events {
            match event {
                StreamEvent::Content(text) => {
                    if self.transcript.append(&text).is_ok() {
                        self.publish_with(SessionState::Streaming, active);
                    }
                }
                StreamEvent::Done => return true,
            }
        }
        self.publish_with(SessionState::Streaming, active);
        false
    }

    fn close(&mut self, active: ActiveStream, outcome: Outcome, error: Option<String>) {
        let stats = active.decoder.stats();
        self.discarded_lines += stats.anomalies;
        // Release the connection before anything is published.
        drop(active.bytes);

        let result = match (&outcome, &error) {
            (Outcome::Failed, Some(e)) => {
                tracing::warn!(exchange = active.exchange, error = %e, "exchange failed");
                self.transcript.fail(&self.config.failure_message)
            }
            _ => self.transcript.finalize(),
        };
        if let Ok(turn) = result {
            tracing::info!(
                exchange = active.exchange,
                outcome = ?outcome,
                chunks = active.chunks,
                chars = turn.content.chars().count(),
                discarded_lines = stats.anomalies,
                "exchange ended"
            );
        }

        self.outcome = Some(outcome);
        self.publish(outcome.into());
        self.publish(SessionState::Idle);
    }

    fn publish(&self, state: SessionState) {
        self.send_view(state, 0);
    }

    fn publish_with(&self, state: SessionState, active: &ActiveStream) {
        self.send_view(state, active.decoder.stats().anomalies);
    }

    fn send_view(&self, state: SessionState, pending_discards: u64) {
        self.view.send_replace(SessionView {
            state,
            outcome: self.outcome,
            turns: self.transcript.views(),
            discarded_lines: self.discarded_lines + pending_discards,
        });
    }
}
