//! Wire messages exchanged between the frontend and backend runtimes.
//!
//! JSON, internally tagged by `type`:
//!
//! ```json
//! {"type":"buffer_delta","key":"switch","value":true,"writer":"frontend","ts":1700000000000}
//! {"type":"authority_signal","kind":"heartbeat","seq":7}
//! {"type":"authority_grant","seq":7}
//! ```
//!
//! The backend answers every acquire or heartbeat it accepted with an
//! [`AuthorityGrant`] carrying the request's `seq`.

use crate::{authority::SignalKind, buffer::BufferDelta};
use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthoritySignal {
    pub kind: SignalKind,
    /// Request number the backend echoes back in its grant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    /// Informational; the receiving side identifies the sender by the link
    /// the signal arrived on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
}

impl AuthoritySignal {
    pub fn new(kind: SignalKind) -> Self {
        Self {
            kind,
            seq: None,
            connection_id: None,
        }
    }

    pub fn with_seq(kind: SignalKind, seq: u64) -> Self {
        Self {
            seq: Some(seq),
            ..Self::new(kind)
        }
    }
}

/// Backend confirmation that the frontend holds the lease as of request `seq`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityGrant {
    pub seq: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportMessage {
    BufferDelta(BufferDelta),
    AuthoritySignal(AuthoritySignal),
    AuthorityGrant(AuthorityGrant),
}

impl TransportMessage {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| anyhow::anyhow!("Failed to encode transport message: {}", e))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| anyhow::anyhow!("Invalid transport message: {}", e))
    }
}

impl From<BufferDelta> for TransportMessage {
    fn from(delta: BufferDelta) -> Self {
        TransportMessage::BufferDelta(delta)
    }
}

impl From<AuthoritySignal> for TransportMessage {
    fn from(signal: AuthoritySignal) -> Self {
        TransportMessage::AuthoritySignal(signal)
    }
}
