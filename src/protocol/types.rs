//! Relay Protocol Types

use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Deserializer, Serialize};

use crate::protocol::constants::*;
use crate::Result;

/// Serialized envelope, shared by every delivery queue it fans out to
pub type Payload = Arc<str>;

/// The sender/recipient/content message unit exchanged with clients.
///
/// Every field is omitted on the wire when empty. An empty `recipient`
/// means the envelope is broadcast to every live connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, deserialize_with = "nullable_string", skip_serializing_if = "String::is_empty")]
    pub sender: String,
    #[serde(default, deserialize_with = "nullable_string", skip_serializing_if = "String::is_empty")]
    pub recipient: String,
    #[serde(default, deserialize_with = "nullable_string", skip_serializing_if = "String::is_empty")]
    pub content: String,
}

impl Envelope {
    /// Create an envelope from its three fields
    pub fn new(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            recipient: recipient.into(),
            content: content.into(),
        }
    }

    /// Broadcast announcing that `sender` joined from `addr`
    pub fn join_notice(sender: &str, addr: &str) -> Self {
        Self::new(sender, "", format!("{}{}", JOIN_NOTICE_PREFIX, addr))
    }

    /// Broadcast announcing that `sender` (last seen at `addr`) left
    pub fn leave_notice(sender: &str, addr: &str) -> Self {
        Self::new(sender, "", format!("{}{}", LEAVE_NOTICE_PREFIX, addr))
    }

    pub fn is_broadcast(&self) -> bool {
        self.recipient.is_empty()
    }

    /// Decode a client frame, failing on anything that is not an envelope object
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).context("Failed to decode envelope")
    }

    /// Encode for delivery
    pub fn encode(&self) -> Result<Payload> {
        let json = serde_json::to_string(self).context("Failed to encode envelope")?;
        Ok(Arc::from(json))
    }
}

/// Treat an explicit JSON `null` the same as an absent field
fn nullable_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
