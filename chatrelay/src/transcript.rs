// Copyright 2026 The Chatrelay Project
// SPDX-License-Identifier: Apache-2.0

// Conversation transcript
//
// Finalized turns live in an append-only list; the single in-flight
// assistant turn is held separately, so "at most one turn is in flight" is a
// property of the type rather than a convention about the last element.

use crate::message::{Role, Turn};

/// Errors raised by transcript operations that would break its invariant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranscriptError {
    #[error("an assistant turn is already in flight")]
    AlreadyInFlight,
    #[error("no assistant turn is in flight")]
    NotInFlight,
}

/// A turn as seen by an observer, with its in-flight flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnView {
    pub role: Role,
    pub content: String,
    pub in_flight: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Transcript {
    finalized: Vec<Turn>,
    in_flight: Option<String>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an assistant greeting turn.
    pub fn with_greeting(greeting: impl Into<String>) -> Self {
        Self {
            finalized: vec![Turn::assistant(greeting)],
            in_flight: None,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Total turns, the in-flight one included.
    pub fn len(&self) -> usize {
        self.finalized.len() + usize::from(self.in_flight.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Finalized turns only; this is what gets sent as history.
    pub fn finalized(&self) -> &[Turn] {
        &self.finalized
    }

    /// Content of the in-flight assistant turn, if any.
    pub fn in_flight_content(&self) -> Option<&str> {
        self.in_flight.as_deref()
    }

    /// Append the user turn and an empty placeholder assistant turn.
    pub fn begin_exchange(&mut self, user_text: impl Into<String>) -> Result<(), TranscriptError> {
        if self.in_flight.is_some() {
            return Err(TranscriptError::AlreadyInFlight);
        }
        self.finalized.push(Turn::user(user_text));
        self.in_flight = Some(String::new());
        Ok(())
    }

    /// Append a delta to the in-flight assistant turn.
    pub fn append(&mut self, delta: &str) -> Result<(), TranscriptError> {
        let content = self.in_flight.as_mut().ok_or(TranscriptError::NotInFlight)?;
        content.push_str(delta);
        Ok(())
    }

    /// Freeze the in-flight turn with whatever content it has.
    pub fn finalize(&mut self) -> Result<Turn, TranscriptError> {
        let content = self.in_flight.take().ok_or(TranscriptError::NotInFlight)?;
        let turn = Turn::assistant(content);
        self.finalized.push(turn.clone());
        Ok(turn)
    }

    /// Close the in-flight turn with a failure message.
    ///
    /// An empty in-flight turn is replaced by the message. Partial content is
    /// kept as its own turn and the message follows it, so nothing already
    /// shown is lost.
    pub fn fail(&mut self, message: &str) -> Result<Turn, TranscriptError> {
        let content = self.in_flight.take().ok_or(TranscriptError::NotInFlight)?;
        if !content.is_empty() {
            self.finalized.push(Turn::assistant(content));
        }
        let turn = Turn::assistant(message);
        self.finalized.push(turn.clone());
        Ok(turn)
    }

    /// Every turn in order, the in-flight turn last.
    pub fn views(&self) -> Vec<TurnView> {
        let mut views: Vec<TurnView> = self
            .finalized
            .iter()
            .map(|turn| TurnView {
                role: turn.role,
                content: turn.content.clone(),
                in_flight: false,
            })
            .collect();
        if let Some(content) = &self.in_flight {
            views.push(TurnView {
                role: Role::Assistant,
                content: content.clone(),
                in_flight: true,
            });
        }
        views
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_exchange_adds_user_and_placeholder() {
        let mut t = Transcript::with_greeting("welcome");
        t.begin_exchange("hello").unwrap();

        let views = t.views();
        assert_eq!(views.len(), 3);
        assert_eq!(views[1].role, Role::User);
        assert_eq!(views[1].content, "hello");
        assert_eq!(views[2].role, Role::Assistant);
        assert_eq!(views[2].content, "");
        assert!(views[2].in_flight);
    }

    #[test]
    fn second_exchange_rejected_while_in_flight() {
        let mut t = Transcript::new();
        t.begin_exchange("one").unwrap();
        assert_eq!(t.begin_exchange("two"), Err(TranscriptError::AlreadyInFlight));
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn append_and_finalize() {
        let mut t = Transcript::new();
        t.begin_exchange("q").unwrap();
        t.append("Hi").unwrap();
        t.append("there").unwrap();
        assert_eq!(t.in_flight_content(), Some("Hithere"));

        let turn = t.finalize().unwrap();
        assert_eq!(turn, Turn::assistant("Hithere"));
        assert!(!t.is_in_flight());
        assert_eq!(t.append("late"), Err(TranscriptError::NotInFlight));
    }

    #[test]
    fn fail_replaces_empty_placeholder() {
        let mut t = Transcript::new();
        t.begin_exchange("q").unwrap();
        t.fail("broken").unwrap();
        assert_eq!(t.finalized(), &[Turn::user("q"), Turn::assistant("broken")]);
    }

    #[test]
    fn fail_keeps_partial_content() {
        let mut t = Transcript::new();
        t.begin_exchange("q").unwrap();
        t.append("partial").unwrap();
        t.fail("broken").unwrap();
        assert_eq!(
            t.finalized(),
            &[
                Turn::user("q"),
                Turn::assistant("partial"),
                Turn::assistant("broken"),
            ]
        );
    }

    #[test]
    fn finalize_without_in_flight_is_an_error() {
        let mut t = Transcript::new();
        assert_eq!(t.finalize().unwrap_err(), TranscriptError::NotInFlight);
        assert!(t.is_empty());
    }

    #[test]
    fn intermediate_views_are_prefixes_of_final() {
        let mut t = Transcript::new();
        t.begin_exchange("q").unwrap();
        let mut seen = Vec::new();
        for delta in ["a", "bc", "", "def"] {
            t.append(delta).unwrap();
            seen.push(t.views().last().unwrap().content.clone());
        }
        let final_text = t.finalize().unwrap().content;
        for partial in seen {
            assert!(final_text.starts_with(&partial));
        }
        assert_eq!(final_text, "abcdef");
    }
}
