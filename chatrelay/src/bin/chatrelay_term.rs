// Copyright 2026 The Chatrelay Project
// SPDX-License-Identifier: Apache-2.0

// chatrelay-term: interactive terminal client for a chatrelay gateway.
//
// Usage:
//   chatrelay-term --url http://127.0.0.1:8080
//
// Type a message and press enter. Ctrl-C while a response is streaming
// cancels it; Ctrl-C at the prompt or `/quit` exits.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use chatrelay::config;
use chatrelay::consumer::{ChatSession, HttpTransport, Outcome, SessionConfig, SessionState, SessionView};
use chatrelay::message::Role;

#[derive(Parser)]
#[command(name = "chatrelay-term", about = "Terminal chat client for a chatrelay gateway.")]
struct Cli {
    /// Base URL of the gateway.
    #[arg(long, default_value = "http://127.0.0.1:8080", env = "CHATRELAY_URL")]
    url: String,

    /// Config file supplying the greeting and failure text.
    #[arg(long, env = "CHATRELAY_CONFIG")]
    config: Option<PathBuf>,
}

/// Tracks how much of the exchange has been written to the terminal.
struct Printer {
    turn: usize,
    bytes: usize,
}

impl Printer {
    fn render(&mut self, view: &SessionView, out: &mut impl Write) {
        while let Some(turn) = view.turns.get(self.turn) {
            if let Some(rest) = turn.content.get(self.bytes..) {
                let _ = write!(out, "{rest}");
            }
            if turn.in_flight {
                self.bytes = turn.content.len();
                break;
            }
            let _ = writeln!(out);
            self.turn += 1;
            self.bytes = 0;
            if view.turns.get(self.turn).is_some() {
                let _ = write!(out, "{}> ", Role::Assistant.as_str());
            }
        }
        let _ = out.flush();
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => config::load_config(&config::FileSource { path: path.clone() }),
        None => config::default_config(),
    };
    let config = match loaded {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("failed to load config: {e}");
            std::process::exit(1);
        }
    };

    let transport = Arc::new(HttpTransport::new(&cli.url));
    let session = ChatSession::spawn(transport, SessionConfig::from_config(&config));

    let mut stdout = std::io::stdout();
    for turn in &session.snapshot().turns {
        let _ = writeln!(stdout, "{}> {}", turn.role.as_str(), turn.content);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let _ = write!(stdout, "{}> ", Role::User.as_str());
        let _ = stdout.flush();

        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = tokio::signal::ctrl_c() => break,
        };
        let text = match line {
            Ok(Some(text)) => text,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("failed to read input: {e}");
                break;
            }
        };
        if text.trim() == "/quit" {
            break;
        }

        let mut rx = session.subscribe();
        rx.borrow_and_update();
        let mut printer = Printer {
            turn: session.snapshot().turns.len() + 1,
            bytes: 0,
        };

        if let Err(e) = session.send(text).await {
            let _ = writeln!(stdout, "! {e}");
            continue;
        }
        let _ = write!(stdout, "{}> ", Role::Assistant.as_str());

        loop {
            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    let view = rx.borrow_and_update().clone();
                    printer.render(&view, &mut stdout);
                    if view.state == SessionState::Idle {
                        if view.outcome == Some(Outcome::Cancelled) {
                            let _ = writeln!(stdout, "[cancelled]");
                        }
                        break;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    session.cancel().await;
                }
            }
        }
    }
    let _ = writeln!(stdout);
}
