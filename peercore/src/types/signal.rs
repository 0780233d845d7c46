//! Wire shapes exchanged over the signaling relay.
//!
//! Outbound signals are addressed to a user id; the relay rewrites some of
//! them before delivery (`callUser` arrives as `hey`, `acceptCall` as
//! `callAccepted`, `endCall` as `callEnded`). [`SignalEnvelope`] is the
//! relay-neutral form of one negotiation step and [`SignalEnvelope::deliver`]
//! describes what the recipient observes.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use thiserror::Error;

use super::call::UserId;

/// Type of a session description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

/// An offer or answer, in the browser's `RTCSessionDescriptionInit` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// A network candidate, in the browser's `RTCIceCandidateInit` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    /// e.g. `candidate:1 1 UDP 2130706431 192.168.1.1 8888 typ host`
    pub candidate: String,
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_m_line_index: Option<u16>,
    #[serde(
        rename = "usernameFragment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_m_line_index: None,
            username_fragment: None,
        }
    }

    pub fn with_sdp_mid(mut self, sdp_mid: impl Into<String>) -> Self {
        self.sdp_mid = Some(sdp_mid.into());
        self
    }

    pub fn with_sdp_m_line_index(mut self, index: u16) -> Self {
        self.sdp_m_line_index = Some(index);
        self
    }
}

/// Negotiation step carried by a [`SignalEnvelope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SignalType {
    Offer,
    Answer,
    IceCandidate,
    Renegotiate,
    RenegotiateAnswer,
    EndCall,
    CameraToggled,
    Busy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum EnvelopePayload {
    Description(SessionDescription),
    Candidate(IceCandidate),
    Enabled(bool),
    Empty,
}

/// Relay-neutral shape of one signal: who sent it, who receives it, and what
/// it carries. Transient, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignalEnvelope {
    #[serde(rename = "type")]
    pub signal_type: SignalType,
    pub from: UserId,
    pub to: UserId,
    pub payload: EnvelopePayload,
}

impl fmt::Display for SignalEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {} -> {}", self.signal_type, self.from, self.to)
    }
}

impl SignalEnvelope {
    /// What the relay hands to the recipient for this envelope, or `None`
    /// when the payload does not fit the signal type.
    pub fn deliver(self) -> Option<(UserId, IncomingSignal)> {
        let to = self.to;
        let signal = match (self.signal_type, self.payload) {
            (SignalType::Offer, EnvelopePayload::Description(signal)) => IncomingSignal::Hey {
                from: self.from,
                signal,
            },
            (SignalType::Answer, EnvelopePayload::Description(answer)) => {
                IncomingSignal::CallAccepted(answer)
            }
            (SignalType::IceCandidate, EnvelopePayload::Candidate(c)) => {
                IncomingSignal::IceCandidate(c)
            }
            (SignalType::Renegotiate, EnvelopePayload::Description(offer)) => {
                IncomingSignal::Renegotiate { offer }
            }
            (SignalType::RenegotiateAnswer, EnvelopePayload::Description(answer)) => {
                IncomingSignal::RenegotiateAnswer { answer }
            }
            (SignalType::CameraToggled, EnvelopePayload::Enabled(enabled)) => {
                IncomingSignal::CameraToggled { enabled }
            }
            (SignalType::EndCall, EnvelopePayload::Empty) => IncomingSignal::CallEnded,
            (SignalType::Busy, EnvelopePayload::Empty) => IncomingSignal::Busy {
                from: Some(self.from),
            },
            _ => return None,
        };
        Some((to, signal))
    }
}

/// A signal this client emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutgoingSignal {
    CallUser {
        user_to_call: UserId,
        signal_data: SessionDescription,
        from: UserId,
    },
    AcceptCall {
        signal: SessionDescription,
        to: UserId,
    },
    IceCandidate {
        to: UserId,
        candidate: IceCandidate,
    },
    Renegotiate {
        to: UserId,
        offer: SessionDescription,
    },
    RenegotiateAnswer {
        to: UserId,
        answer: SessionDescription,
    },
    EndCall {
        to: UserId,
    },
    CameraToggled {
        to: UserId,
        enabled: bool,
    },
    /// Reply to an invite received while another call is in progress.
    Busy {
        to: UserId,
    },
}

impl OutgoingSignal {
    pub const fn event(&self) -> &'static str {
        match self {
            Self::CallUser { .. } => "callUser",
            Self::AcceptCall { .. } => "acceptCall",
            Self::IceCandidate { .. } => "iceCandidate",
            Self::Renegotiate { .. } => "renegotiate",
            Self::RenegotiateAnswer { .. } => "renegotiateAnswer",
            Self::EndCall { .. } => "endCall",
            Self::CameraToggled { .. } => "cameraToggled",
            Self::Busy { .. } => "busy",
        }
    }

    pub fn recipient(&self) -> &UserId {
        match self {
            Self::CallUser { user_to_call, .. } => user_to_call,
            Self::AcceptCall { to, .. }
            | Self::IceCandidate { to, .. }
            | Self::Renegotiate { to, .. }
            | Self::RenegotiateAnswer { to, .. }
            | Self::EndCall { to }
            | Self::CameraToggled { to, .. }
            | Self::Busy { to } => to,
        }
    }

    /// JSON payload as sent to the relay.
    pub fn payload(&self) -> Value {
        match self {
            Self::CallUser {
                user_to_call,
                signal_data,
                from,
            } => json!({ "userToCall": user_to_call, "signalData": signal_data, "from": from }),
            Self::AcceptCall { signal, to } => json!({ "signal": signal, "to": to }),
            Self::IceCandidate { to, candidate } => json!({ "to": to, "candidate": candidate }),
            Self::Renegotiate { to, offer } => json!({ "to": to, "offer": offer }),
            Self::RenegotiateAnswer { to, answer } => json!({ "to": to, "answer": answer }),
            Self::EndCall { to } | Self::Busy { to } => json!({ "to": to }),
            Self::CameraToggled { to, enabled } => json!({ "to": to, "enabled": enabled }),
        }
    }

    pub fn into_envelope(self, from: UserId) -> SignalEnvelope {
        let to = self.recipient().clone();
        let (signal_type, payload) = match self {
            Self::CallUser { signal_data, .. } => {
                (SignalType::Offer, EnvelopePayload::Description(signal_data))
            }
            Self::AcceptCall { signal, .. } => {
                (SignalType::Answer, EnvelopePayload::Description(signal))
            }
            Self::IceCandidate { candidate, .. } => {
                (SignalType::IceCandidate, EnvelopePayload::Candidate(candidate))
            }
            Self::Renegotiate { offer, .. } => {
                (SignalType::Renegotiate, EnvelopePayload::Description(offer))
            }
            Self::RenegotiateAnswer { answer, .. } => (
                SignalType::RenegotiateAnswer,
                EnvelopePayload::Description(answer),
            ),
            Self::EndCall { .. } => (SignalType::EndCall, EnvelopePayload::Empty),
            Self::CameraToggled { enabled, .. } => {
                (SignalType::CameraToggled, EnvelopePayload::Enabled(enabled))
            }
            Self::Busy { .. } => (SignalType::Busy, EnvelopePayload::Empty),
        };
        SignalEnvelope {
            signal_type,
            from,
            to,
            payload,
        }
    }
}

/// A signal delivered to this client by the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomingSignal {
    Hey {
        from: UserId,
        signal: SessionDescription,
    },
    CallAccepted(SessionDescription),
    IceCandidate(IceCandidate),
    Renegotiate {
        offer: SessionDescription,
    },
    RenegotiateAnswer {
        answer: SessionDescription,
    },
    CallEnded,
    CameraToggled {
        enabled: bool,
    },
    Busy {
        from: Option<UserId>,
    },
    UpdateOnlineUsers(Vec<UserId>),
}

#[derive(Debug, Error)]
pub enum SignalDecodeError {
    #[error("{event}: missing field `{field}`")]
    MissingField {
        event: &'static str,
        field: &'static str,
    },
    #[error("{event}: invalid payload: {source}")]
    InvalidPayload {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl IncomingSignal {
    pub const fn event(&self) -> &'static str {
        match self {
            Self::Hey { .. } => "hey",
            Self::CallAccepted(_) => "callAccepted",
            Self::IceCandidate(_) => "iceCandidate",
            Self::Renegotiate { .. } => "renegotiate",
            Self::RenegotiateAnswer { .. } => "renegotiateAnswer",
            Self::CallEnded => "callEnded",
            Self::CameraToggled { .. } => "cameraToggled",
            Self::Busy { .. } => "busy",
            Self::UpdateOnlineUsers(_) => "updateOnlineUsers",
        }
    }

    /// Decode a relay event. Events unrelated to calls (chat messages and
    /// the like) yield `Ok(None)`.
    pub fn decode(event: &str, data: Value) -> Result<Option<Self>, SignalDecodeError> {
        let signal = match event {
            "hey" => Self::Hey {
                from: user_id_field(&data, "hey", "from")?,
                signal: description_field(&data, "hey", "signal")?,
            },
            "callAccepted" => Self::CallAccepted(parse("callAccepted", data)?),
            "iceCandidate" => {
                // The relay forwards either the bare candidate or `{to, candidate}`.
                let inner = match data.get("candidate") {
                    Some(nested @ Value::Object(_)) => nested.clone(),
                    _ => data,
                };
                Self::IceCandidate(parse("iceCandidate", inner)?)
            }
            "renegotiate" => Self::Renegotiate {
                offer: description_field(&data, "renegotiate", "offer")?,
            },
            "renegotiateAnswer" => Self::RenegotiateAnswer {
                answer: description_field(&data, "renegotiateAnswer", "answer")?,
            },
            "callEnded" => Self::CallEnded,
            "cameraToggled" => Self::CameraToggled {
                enabled: data.get("enabled").and_then(Value::as_bool).ok_or(
                    SignalDecodeError::MissingField {
                        event: "cameraToggled",
                        field: "enabled",
                    },
                )?,
            },
            "busy" => Self::Busy {
                from: data.get("from").and_then(user_id_value),
            },
            "updateOnlineUsers" => {
                let ids = data
                    .as_array()
                    .map(|ids| ids.iter().filter_map(user_id_value).collect())
                    .unwrap_or_default();
                Self::UpdateOnlineUsers(ids)
            }
            _ => return Ok(None),
        };
        Ok(Some(signal))
    }
}

fn parse<T: serde::de::DeserializeOwned>(
    event: &'static str,
    value: Value,
) -> Result<T, SignalDecodeError> {
    serde_json::from_value(value).map_err(|source| SignalDecodeError::InvalidPayload { event, source })
}

fn description_field(
    data: &Value,
    event: &'static str,
    field: &'static str,
) -> Result<SessionDescription, SignalDecodeError> {
    let value = data
        .get(field)
        .cloned()
        .ok_or(SignalDecodeError::MissingField { event, field })?;
    parse(event, value)
}

fn user_id_field(
    data: &Value,
    event: &'static str,
    field: &'static str,
) -> Result<UserId, SignalDecodeError> {
    data.get(field)
        .and_then(user_id_value)
        .ok_or(SignalDecodeError::MissingField { event, field })
}

/// User ids come from the relay either as strings or as numeric database ids.
fn user_id_value(value: &Value) -> Option<UserId> {
    match value {
        Value::String(s) => Some(UserId::new(s.clone())),
        Value::Number(n) => Some(UserId::new(n.to_string())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> UserId {
        UserId::new("alice")
    }

    fn bob() -> UserId {
        UserId::new("bob")
    }

    #[test]
    fn test_call_user_payload_shape() {
        let signal = OutgoingSignal::CallUser {
            user_to_call: bob(),
            signal_data: SessionDescription::offer("v=0"),
            from: alice(),
        };
        assert_eq!(signal.event(), "callUser");
        assert_eq!(
            signal.payload(),
            json!({
                "userToCall": "bob",
                "signalData": { "type": "offer", "sdp": "v=0" },
                "from": "alice"
            })
        );
    }

    #[test]
    fn test_offer_is_delivered_as_hey() {
        let offer = SessionDescription::offer("v=0 offer");
        let envelope = OutgoingSignal::CallUser {
            user_to_call: bob(),
            signal_data: offer.clone(),
            from: alice(),
        }
        .into_envelope(alice());

        let (to, delivered) = envelope.deliver().unwrap();
        assert_eq!(to, bob());
        assert_eq!(
            delivered,
            IncomingSignal::Hey {
                from: alice(),
                signal: offer
            }
        );
    }

    #[test]
    fn test_end_call_is_delivered_as_call_ended() {
        let (to, delivered) = OutgoingSignal::EndCall { to: alice() }
            .into_envelope(bob())
            .deliver()
            .unwrap();
        assert_eq!(to, alice());
        assert_eq!(delivered, IncomingSignal::CallEnded);
    }

    #[test]
    fn test_mismatched_payload_is_not_delivered() {
        let envelope = SignalEnvelope {
            signal_type: SignalType::Answer,
            from: bob(),
            to: alice(),
            payload: EnvelopePayload::Candidate(IceCandidate::new("candidate:1")),
        };
        assert_eq!(envelope.deliver(), None);

        let envelope = SignalEnvelope {
            signal_type: SignalType::EndCall,
            from: bob(),
            to: alice(),
            payload: EnvelopePayload::Enabled(true),
        };
        assert_eq!(envelope.deliver(), None);
    }

    #[test]
    fn test_decode_hey_with_numeric_sender() {
        let data = json!({ "from": 17, "signal": { "type": "offer", "sdp": "v=0" } });
        let decoded = IncomingSignal::decode("hey", data).unwrap().unwrap();
        assert_eq!(
            decoded,
            IncomingSignal::Hey {
                from: UserId::new("17"),
                signal: SessionDescription::offer("v=0"),
            }
        );
    }

    #[test]
    fn test_decode_bare_and_wrapped_candidates() {
        let bare = json!({ "candidate": "candidate:1 1 udp 1 10.0.0.1 9 typ host", "sdpMid": "0", "sdpMLineIndex": 0 });
        let wrapped = json!({ "to": "bob", "candidate": bare.clone() });

        let expected = IceCandidate::new("candidate:1 1 udp 1 10.0.0.1 9 typ host")
            .with_sdp_mid("0")
            .with_sdp_m_line_index(0);

        assert_eq!(
            IncomingSignal::decode("iceCandidate", bare).unwrap(),
            Some(IncomingSignal::IceCandidate(expected.clone()))
        );
        assert_eq!(
            IncomingSignal::decode("iceCandidate", wrapped).unwrap(),
            Some(IncomingSignal::IceCandidate(expected))
        );
    }

    #[test]
    fn test_decode_unknown_event_is_ignored() {
        let decoded = IncomingSignal::decode("newMessage", json!({ "text": "hi" })).unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn test_decode_missing_field_is_an_error() {
        let err = IncomingSignal::decode("renegotiate", json!({ "to": "bob" })).unwrap_err();
        assert!(matches!(
            err,
            SignalDecodeError::MissingField {
                field: "offer",
                ..
            }
        ));
    }

    #[test]
    fn test_decode_online_users_mixed_ids() {
        let decoded = IncomingSignal::decode("updateOnlineUsers", json!(["a", 2, null]))
            .unwrap()
            .unwrap();
        assert_eq!(
            decoded,
            IncomingSignal::UpdateOnlineUsers(vec![UserId::new("a"), UserId::new("2")])
        );
    }
}
