//! Call state machine implementation.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::call::{CallRole, EndReason, UserId};

/// Current state of the call.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub enum CallState {
    /// No session exists.
    #[default]
    Idle,
    /// Outgoing call: preparing media and offer, then ringing once the offer is out.
    Outgoing { offer_sent: bool },
    /// Incoming call: ringing locally, then answering once the user accepts.
    Incoming { answering: bool },
    /// Offer/answer exchange completed. Media may still be negotiating.
    Connected { connected_at: DateTime<Utc> },
    /// Terminal; the session is dropped right after entering it.
    Ended {
        reason: EndReason,
        ended_at: DateTime<Utc>,
        duration_secs: Option<i64>,
    },
}

impl CallState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_ringing(&self) -> bool {
        matches!(
            self,
            Self::Outgoing { offer_sent: true } | Self::Incoming { answering: false }
        )
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    pub fn is_ended(&self) -> bool {
        matches!(self, Self::Ended { .. })
    }

    pub fn can_answer(&self) -> bool {
        matches!(self, Self::Incoming { answering: false })
    }

    pub fn can_accept_answer(&self) -> bool {
        matches!(self, Self::Outgoing { offer_sent: true })
    }
}

/// State transitions for a call session.
#[derive(Debug, Clone)]
pub enum CallTransition {
    OfferSent,
    AnswerStarted,
    AnswerSent,
    RemoteAccepted,
    Terminated { reason: EndReason },
}

/// One call attempt. Exactly one exists per client while a call is in progress.
#[derive(Debug, Clone, Serialize)]
pub struct CallSession {
    pub local_user_id: UserId,
    pub remote_user_id: UserId,
    pub role: CallRole,
    pub state: CallState,
    pub started_at: DateTime<Utc>,
    pub connected_at: Option<DateTime<Utc>>,
}

impl CallSession {
    pub fn new_outgoing(local_user_id: UserId, remote_user_id: UserId) -> Self {
        Self {
            local_user_id,
            remote_user_id,
            role: CallRole::Caller,
            state: CallState::Outgoing { offer_sent: false },
            started_at: Utc::now(),
            connected_at: None,
        }
    }

    pub fn new_incoming(local_user_id: UserId, from: UserId) -> Self {
        Self {
            local_user_id,
            remote_user_id: from,
            role: CallRole::Callee,
            state: CallState::Incoming { answering: false },
            started_at: Utc::now(),
            connected_at: None,
        }
    }

    pub fn is_caller(&self) -> bool {
        self.role == CallRole::Caller
    }

    /// Apply a state transition. Returns error if transition is invalid.
    pub fn apply_transition(&mut self, transition: CallTransition) -> Result<(), InvalidTransition> {
        let now = Utc::now();
        let new_state = match (&self.state, transition) {
            (CallState::Outgoing { offer_sent: false }, CallTransition::OfferSent) => {
                CallState::Outgoing { offer_sent: true }
            }
            (CallState::Outgoing { offer_sent: true }, CallTransition::RemoteAccepted) => {
                CallState::Connected { connected_at: now }
            }
            (CallState::Incoming { answering: false }, CallTransition::AnswerStarted) => {
                CallState::Incoming { answering: true }
            }
            (CallState::Incoming { answering: true }, CallTransition::AnswerSent) => {
                CallState::Connected { connected_at: now }
            }
            (
                CallState::Outgoing { .. } | CallState::Incoming { .. } | CallState::Connected { .. },
                CallTransition::Terminated { reason },
            ) => CallState::Ended {
                reason,
                ended_at: now,
                duration_secs: self
                    .connected_at
                    .map(|at| now.signed_duration_since(at).num_seconds()),
            },
            (current, transition) => {
                return Err(InvalidTransition {
                    current_state: format!("{:?}", current),
                    attempted: format!("{:?}", transition),
                });
            }
        };
        if let CallState::Connected { connected_at } = new_state {
            self.connected_at = Some(connected_at);
        }
        self.state = new_state;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct InvalidTransition {
    pub current_state: String,
    pub attempted: String,
}

impl std::fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid transition {} in state {}",
            self.attempted, self.current_state
        )
    }
}

impl std::error::Error for InvalidTransition {}
