use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::ChannelId;
use crate::payloads::{AttachmentPayload, ChannelConfig};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Regular,
    Reply,
    Ephemeral,
    Error,
    System,
    Deleted,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::Reply => "reply",
            Self::Ephemeral => "ephemeral",
            Self::Error => "error",
            Self::System => "system",
            Self::Deleted => "deleted",
        }
    }

    /// Unknown strings decay to `Regular`; the column is written by us only.
    pub fn from_db(raw: &str) -> Self {
        match raw {
            "reply" => Self::Reply,
            "ephemeral" => Self::Ephemeral,
            "error" => Self::Error,
            "system" => Self::System,
            "deleted" => Self::Deleted,
            _ => Self::Regular,
        }
    }
}

/// Where a locally staged message sits on its way to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalMessageState {
    PendingSend,
    Sending,
    SendingFailed,
    PendingSync,
    SyncingFailed,
    Deleting,
    DeletingFailed,
}

impl LocalMessageState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingSend => "pending_send",
            Self::Sending => "sending",
            Self::SendingFailed => "sending_failed",
            Self::PendingSync => "pending_sync",
            Self::SyncingFailed => "syncing_failed",
            Self::Deleting => "deleting",
            Self::DeletingFailed => "deleting_failed",
        }
    }

    pub fn from_db(raw: &str) -> Option<Self> {
        Some(match raw {
            "pending_send" => Self::PendingSend,
            "sending" => Self::Sending,
            "sending_failed" => Self::SendingFailed,
            "pending_sync" => Self::PendingSync,
            "syncing_failed" => Self::SyncingFailed,
            "deleting" => Self::Deleting,
            "deleting_failed" => Self::DeletingFailed,
            _ => return None,
        })
    }

    /// The message has never reached the server.
    pub fn is_local_only(&self) -> bool {
        matches!(self, Self::PendingSend | Self::Sending | Self::SendingFailed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalReactionState {
    PendingSend,
    Sending,
    SendingFailed,
    PendingDelete,
    Deleting,
    DeletingFailed,
}

impl LocalReactionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingSend => "pending_send",
            Self::Sending => "sending",
            Self::SendingFailed => "sending_failed",
            Self::PendingDelete => "pending_delete",
            Self::Deleting => "deleting",
            Self::DeletingFailed => "deleting_failed",
        }
    }

    pub fn from_db(raw: &str) -> Option<Self> {
        Some(match raw {
            "pending_send" => Self::PendingSend,
            "sending" => Self::Sending,
            "sending_failed" => Self::SendingFailed,
            "pending_delete" => Self::PendingDelete,
            "deleting" => Self::Deleting,
            "deleting_failed" => Self::DeletingFailed,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePinning {
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinInfo {
    pub pinned_at: DateTime<Utc>,
    pub pinned_by_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// A message composed locally, before the server has seen it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewMessage {
    pub id: Option<String>,
    pub text: String,
    pub pinning: Option<MessagePinning>,
    pub command: Option<String>,
    pub arguments: Option<String>,
    pub parent_id: Option<String>,
    pub attachments: Vec<AttachmentPayload>,
    pub mentioned_user_ids: Vec<String>,
    pub show_reply_in_channel: bool,
    pub is_silent: bool,
    pub quoted_message_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub skip_push: bool,
    pub skip_enrich_url: bool,
    pub extra_data: Map<String, Value>,
}

/// Read-only message snapshot handed to consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub cid: ChannelId,
    pub author_id: String,
    pub text: String,
    pub message_type: MessageType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub parent_id: Option<String>,
    pub quoted_message_id: Option<String>,
    pub show_reply_in_channel: bool,
    pub show_inside_thread: bool,
    pub is_silent: bool,
    pub is_hard_deleted: bool,
    pub pin: Option<PinInfo>,
    /// Reaction ids authored by the signed-in user, in insertion order.
    pub own_reactions: Vec<String>,
    pub local_state: Option<LocalMessageState>,
    pub reply_count: u32,
    pub command: Option<String>,
    pub arguments: Option<String>,
    pub mentioned_user_ids: Vec<String>,
    pub extra_data: Map<String, Value>,
}

impl ChatMessage {
    pub fn is_pinned(&self) -> bool {
        self.pin.is_some()
    }
}

/// Read-only channel snapshot handed to consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatChannel {
    pub cid: ChannelId,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub truncated_at: Option<DateTime<Utc>>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub member_count: u32,
    pub is_frozen: bool,
    pub config: ChannelConfig,
    pub preview_message_id: Option<String>,
    /// Unread count of the signed-in user, zero when never read or no user.
    pub unread_count: u32,
    pub extra_data: Map<String, Value>,
}
