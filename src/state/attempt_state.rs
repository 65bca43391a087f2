/// Attempt state definitions for tracking a crawl message through the fetch stage
///
/// This module defines every state a fetch attempt can be in, and which moves
/// between them are legal.
use std::fmt;

/// Represents the current state of a crawl message in the fetch stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttemptState {
    // ===== Active States =====
    /// Message has been received but not yet fetched
    Pending,

    /// Message URL is currently being fetched
    Fetching,

    /// Fetch failed transiently; the message is waiting to be re-offered
    Retrying,

    // ===== Terminal States =====
    /// Page was fetched and its content handed to the store
    Succeeded,

    /// Retry budget exhausted; the URL went to the dead-letter topic
    DeadLettered,
}

impl AttemptState {
    /// Returns true if this is a terminal state (no further processing needed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::DeadLettered)
    }

    /// Returns true if this is an active state (the message may still be fetched)
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if moving from this state to `next` is legal
    ///
    /// ```text
    /// Pending -> Fetching -> Succeeded
    ///                     -> Retrying -> Fetching
    ///                     -> DeadLettered
    /// ```
    pub fn can_transition_to(&self, next: AttemptState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Fetching)
                | (Self::Fetching, Self::Succeeded)
                | (Self::Fetching, Self::Retrying)
                | (Self::Fetching, Self::DeadLettered)
                | (Self::Retrying, Self::Fetching)
        )
    }

    /// Converts the state to its string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fetching => "fetching",
            Self::Retrying => "retrying",
            Self::Succeeded => "succeeded",
            Self::DeadLettered => "dead_lettered",
        }
    }

    /// Parses a state from its string representation
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "fetching" => Some(Self::Fetching),
            "retrying" => Some(Self::Retrying),
            "succeeded" => Some(Self::Succeeded),
            "dead_lettered" => Some(Self::DeadLettered),
            _ => None,
        }
    }

    /// Returns all possible attempt states
    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Pending,
            Self::Fetching,
            Self::Retrying,
            Self::Succeeded,
            Self::DeadLettered,
        ]
    }
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
