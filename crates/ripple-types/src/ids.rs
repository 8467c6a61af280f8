use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A malformed identifier coming from the wire.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("channel id `{0}` is not in `type:id` form")]
    InvalidChannelId(String),

    #[error("message `{0}` does not name its channel")]
    MissingChannelId(String),
}

/// Composite channel identifier, `type:id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChannelId {
    channel_type: String,
    id: String,
}

impl ChannelId {
    pub fn new(channel_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            channel_type: channel_type.into(),
            id: id.into(),
        }
    }

    /// Parses a raw `type:id` string. Exactly one separator, both halves non-empty.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let mut parts = raw.split(':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(channel_type), Some(id), None) if !channel_type.is_empty() && !id.is_empty() => {
                Ok(Self::new(channel_type, id))
            }
            _ => Err(ValidationError::InvalidChannelId(raw.to_string())),
        }
    }

    pub fn channel_type(&self) -> &str {
        &self.channel_type
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn raw(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.channel_type, self.id)
    }
}

impl FromStr for ChannelId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ChannelId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ChannelId> for String {
    fn from(cid: ChannelId) -> Self {
        cid.to_string()
    }
}

/// Identity of a reaction row: one per (user, message, type).
pub fn reaction_id(user_id: &str, message_id: &str, reaction_type: &str) -> String {
    format!("{}/{}/{}", user_id, message_id, reaction_type)
}

/// Attachment identity: position of the attachment inside its message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttachmentId {
    pub cid: ChannelId,
    pub message_id: String,
    pub index: usize,
}

impl AttachmentId {
    pub fn new(cid: ChannelId, message_id: impl Into<String>, index: usize) -> Self {
        Self {
            cid,
            message_id: message_id.into(),
            index,
        }
    }
}

impl fmt::Display for AttachmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.cid, self.message_id, self.index)
    }
}
