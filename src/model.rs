//! Core data model.
//!
//! A submission is a validated phone number handed in by a submitter and
//! waiting for an operator. Sessions track which inputs each actor may send
//! next; history entries are the durable trace of every submission.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

/// Identity of a submitter or operator as assigned by the chat transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub i64);

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ActorId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .parse::<i64>()
            .map(ActorId)
            .map_err(|_| Error::InvalidInput(format!("not an actor id: {s}")))
    }
}

/// Human-readable label for an actor: `@handle` when known, else `ID: n`.
pub fn actor_label(id: ActorId, handle: Option<&str>) -> String {
    match handle {
        Some(h) if !h.is_empty() => format!("@{h}"),
        _ => format!("ID: {id}"),
    }
}

// ---------------------------------------------------------------------------
// Phone
// ---------------------------------------------------------------------------

/// A validated, normalized Russian phone number: 11 digits starting with `7`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Phone(String);

impl Phone {
    /// Validate and normalize a single line of input.
    ///
    /// Accepts `8XXXXXXXXXX`, `7XXXXXXXXXX`, `+7XXXXXXXXXX` and the 10-digit
    /// national form `9XXXXXXXXX`, with any punctuation in between. Any
    /// letter makes the line invalid.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        if line.is_empty() {
            return Err(Error::InvalidInput("empty phone number".to_string()));
        }
        if line.chars().any(char::is_alphabetic) {
            return Err(Error::InvalidInput(format!("letters in phone number: {line}")));
        }

        let digits: String = line.chars().filter(char::is_ascii_digit).collect();
        let normalized = match (digits.len(), digits.chars().next()) {
            (11, Some('7')) => digits,
            (11, Some('8')) => format!("7{}", &digits[1..]),
            (10, Some('9')) => format!("7{digits}"),
            _ => return Err(Error::InvalidInput(format!("not a phone number: {line}"))),
        };
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Phone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "+{}", self.0)
    }
}

/// Outcome of scanning a possibly multi-line input for phone numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneScan {
    /// The first valid number, the only one that gets queued.
    pub first: Option<Phone>,
    /// Valid numbers after the first, dropped.
    pub dropped: usize,
    /// Non-blank lines that failed validation.
    pub invalid: usize,
}

impl PhoneScan {
    pub fn scan(text: &str) -> Self {
        let mut first = None;
        let mut dropped = 0;
        let mut invalid = 0;
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match Phone::parse(line) {
                Ok(phone) if first.is_none() => first = Some(phone),
                Ok(_) => dropped += 1,
                Err(_) => invalid += 1,
            }
        }
        Self {
            first,
            dropped,
            invalid,
        }
    }
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// A unit of work waiting for, or held by, an operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub submitter: ActorId,
    pub submitter_handle: Option<String>,
    pub payload: Phone,
    pub created_at: DateTime<Utc>,
    /// True while the submission sits in the queue, false once claimed.
    pub queued: bool,
}

impl Submission {
    pub fn new(submitter: ActorId, submitter_handle: Option<String>, payload: Phone) -> Self {
        Self {
            submitter,
            submitter_handle,
            payload,
            created_at: Utc::now(),
            queued: true,
        }
    }

    pub fn label(&self) -> String {
        actor_label(self.submitter, self.submitter_handle.as_deref())
    }
}

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// What kind of text an actor in `AwaitingInput` is expected to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    Submission,
    SupportMessage,
}

/// Conversational state of a single actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    /// Nothing outstanding.
    Idle,
    /// Waiting for a phone number or a support message.
    AwaitingInput { kind: InputKind },
    /// Submission queued or held by an operator.
    Queued,
    /// Operator delivered a result, waiting for the submitter's status.
    AwaitingResult,
    /// Operator-only: next text goes to `target` as a support reply.
    AwaitingReplyTarget { target: ActorId },
}

impl SessionState {
    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, to),
            (Idle, AwaitingInput { .. })
                | (AwaitingInput { .. }, Idle) // cancelled, or support message sent
                | (AwaitingInput { kind: InputKind::Submission }, Queued)
                | (Queued, AwaitingResult)
                | (Queued, Idle)               // resolved by the operator directly
                | (AwaitingResult, Idle)
                | (Idle, AwaitingReplyTarget { .. })
                | (AwaitingReplyTarget { .. }, AwaitingReplyTarget { .. })
                | (AwaitingReplyTarget { .. }, Idle)
        )
    }

    /// States in which the actor has a submission outstanding.
    pub fn is_outstanding(self) -> bool {
        matches!(self, SessionState::Queued | SessionState::AwaitingResult)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::AwaitingInput {
                kind: InputKind::Submission,
            } => "awaiting_input(submission)",
            SessionState::AwaitingInput {
                kind: InputKind::SupportMessage,
            } => "awaiting_input(support)",
            SessionState::Queued => "queued",
            SessionState::AwaitingResult => "awaiting_result",
            SessionState::AwaitingReplyTarget { .. } => "awaiting_reply_target",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Status reported when work on a submission finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Success,
    Failed,
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Resolution::Success => "success",
            Resolution::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// Durable trace of one submission. `pending` flips to false exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub submitter: ActorId,
    #[serde(default)]
    pub submitter_handle: Option<String>,
    pub payload: String,
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub pending: bool,
}

impl HistoryEntry {
    /// A fresh pending entry for a submission.
    pub fn pending_for(submission: &Submission) -> Self {
        Self {
            id: Uuid::new_v4(),
            submitter: submission.submitter,
            submitter_handle: submission.submitter_handle.clone(),
            payload: submission.payload.as_str().to_string(),
            date: submission.created_at.date_naive(),
            created_at: submission.created_at,
            pending: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_normalizes_leading_eight() {
        let phone = Phone::parse("8 (999) 123-45-67").unwrap();
        assert_eq!(phone.as_str(), "79991234567");
        assert_eq!(phone.to_string(), "+79991234567");
    }

    #[test]
    fn phone_accepts_plus_seven_and_national_form() {
        assert_eq!(Phone::parse("+7 999 123 45 67").unwrap().as_str(), "79991234567");
        assert_eq!(Phone::parse("9991234567").unwrap().as_str(), "79991234567");
    }

    #[test]
    fn phone_rejects_letters_and_wrong_lengths() {
        assert!(Phone::parse("8999123456a").is_err());
        assert!(Phone::parse("телефон").is_err());
        assert!(Phone::parse("12345").is_err());
        assert!(Phone::parse("19991234567").is_err());
        assert!(Phone::parse("   ").is_err());
    }

    #[test]
    fn scan_takes_first_valid_and_counts_the_rest() {
        let scan = PhoneScan::scan("garbage\n89991234567\n\n+79990000000\n123");
        assert_eq!(scan.first.unwrap().as_str(), "79991234567");
        assert_eq!(scan.dropped, 1);
        assert_eq!(scan.invalid, 2);
    }

    #[test]
    fn session_transitions_follow_the_table() {
        use SessionState::*;
        let submission = AwaitingInput {
            kind: InputKind::Submission,
        };
        let support = AwaitingInput {
            kind: InputKind::SupportMessage,
        };
        assert!(Idle.can_transition_to(submission));
        assert!(submission.can_transition_to(Queued));
        assert!(!support.can_transition_to(Queued));
        assert!(Queued.can_transition_to(AwaitingResult));
        assert!(AwaitingResult.can_transition_to(Idle));
        assert!(!Queued.can_transition_to(submission));
        assert!(!Idle.can_transition_to(Queued));
        assert!(Idle.can_transition_to(AwaitingReplyTarget { target: ActorId(1) }));
    }

    #[test]
    fn actor_label_prefers_handle() {
        assert_eq!(actor_label(ActorId(5), Some("kelly")), "@kelly");
        assert_eq!(actor_label(ActorId(5), None), "ID: 5");
    }
}
