//! Wire payloads as delivered by the realtime socket and the HTTP API.
//!
//! Identifiers stay raw strings here; validation happens when a payload is
//! written to the store so that a single bad field can be skipped without
//! rejecting the whole envelope.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::MessageType;

// -- Users --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPayload {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "image")]
    pub image_url: Option<String>,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub banned: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_active: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deactivated_at: Option<DateTime<Utc>>,
    /// Custom fields set by the integrator.
    #[serde(flatten)]
    pub extra_data: Map<String, Value>,
}

fn default_role() -> String {
    "user".to_string()
}

impl UserPayload {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            image_url: None,
            role: default_role(),
            online: false,
            banned: false,
            created_at: None,
            updated_at: None,
            last_active: None,
            deactivated_at: None,
            extra_data: Map::new(),
        }
    }
}

/// The signed-in user as returned by `health.check` and friends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnUserPayload {
    #[serde(flatten)]
    pub user: UserPayload,
    #[serde(default)]
    pub devices: Vec<DevicePayload>,
    #[serde(default)]
    pub total_unread_count: u32,
    #[serde(default)]
    pub unread_channels: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DevicePayload {
    pub id: String,
    #[serde(default)]
    pub push_provider: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreadCount {
    pub channels: u32,
    pub messages: u32,
}

// -- Channels --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub typing_events: bool,
    pub read_events: bool,
    pub reactions: bool,
    pub replies: bool,
    pub quotes: bool,
    pub search: bool,
    pub mutes: bool,
    pub uploads: bool,
    pub url_enrichment: bool,
    pub max_message_length: Option<u32>,
    pub commands: Vec<String>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            typing_events: true,
            read_events: true,
            reactions: true,
            replies: true,
            quotes: true,
            search: true,
            mutes: true,
            uploads: true,
            url_enrichment: true,
            max_message_length: None,
            commands: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelPayload {
    pub cid: String,
    #[serde(rename = "type")]
    pub channel_type: String,
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub truncated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_message_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub member_count: u32,
    #[serde(default)]
    pub frozen: bool,
    #[serde(default)]
    pub config: ChannelConfig,
    #[serde(default)]
    pub created_by: Option<UserPayload>,
    #[serde(default)]
    pub members: Vec<MemberPayload>,
    #[serde(flatten)]
    pub extra_data: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberPayload {
    pub user: UserPayload,
    #[serde(default, rename = "channel_role")]
    pub role: Option<String>,
    #[serde(default)]
    pub banned: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadPayload {
    pub user: UserPayload,
    pub last_read: DateTime<Utc>,
    #[serde(default)]
    pub last_read_message_id: Option<String>,
    #[serde(default)]
    pub unread_messages: u32,
}

/// Full channel fetch: the channel plus the first page of everything it owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelStatePayload {
    pub channel: ChannelPayload,
    #[serde(default)]
    pub messages: Vec<MessagePayload>,
    #[serde(default)]
    pub pinned_messages: Vec<MessagePayload>,
    #[serde(default)]
    pub members: Vec<MemberPayload>,
    #[serde(default)]
    pub read: Vec<ReadPayload>,
}

// -- Messages --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub id: String,
    #[serde(default)]
    pub cid: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default, rename = "type")]
    pub message_type: MessageType,
    pub user: UserPayload,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub show_in_channel: bool,
    #[serde(default)]
    pub quoted_message_id: Option<String>,
    #[serde(default)]
    pub quoted_message: Option<Box<MessagePayload>>,
    #[serde(default)]
    pub mentioned_users: Vec<UserPayload>,
    #[serde(default)]
    pub latest_reactions: Vec<ReactionPayload>,
    #[serde(default)]
    pub own_reactions: Vec<ReactionPayload>,
    #[serde(default)]
    pub reaction_scores: BTreeMap<String, i64>,
    #[serde(default)]
    pub attachments: Vec<AttachmentPayload>,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub pinned_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pinned_by: Option<UserPayload>,
    #[serde(default)]
    pub pin_expires: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reply_count: u32,
    #[serde(default)]
    pub silent: bool,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Option<String>,
    #[serde(flatten)]
    pub extra_data: Map<String, Value>,
}

impl MessagePayload {
    /// Minimal payload, mostly useful for building fixtures.
    pub fn new(
        id: impl Into<String>,
        user: UserPayload,
        text: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            cid: None,
            text: text.into(),
            message_type: MessageType::Regular,
            user,
            created_at,
            updated_at: created_at,
            deleted_at: None,
            parent_id: None,
            show_in_channel: false,
            quoted_message_id: None,
            quoted_message: None,
            mentioned_users: Vec::new(),
            latest_reactions: Vec::new(),
            own_reactions: Vec::new(),
            reaction_scores: BTreeMap::new(),
            attachments: Vec::new(),
            pinned: false,
            pinned_at: None,
            pinned_by: None,
            pin_expires: None,
            reply_count: 0,
            silent: false,
            command: None,
            args: None,
            extra_data: Map::new(),
        }
    }
}

// -- Reactions --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionPayload {
    pub message_id: String,
    pub user: UserPayload,
    #[serde(rename = "type")]
    pub reaction_type: String,
    #[serde(default = "default_score")]
    pub score: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra_data: Map<String, Value>,
}

fn default_score() -> i64 {
    1
}

// -- Attachments --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentPayload {
    #[serde(default = "default_attachment_type", rename = "type")]
    pub attachment_type: String,
    /// Everything else (urls, titles, sizes) is kept verbatim.
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

fn default_attachment_type() -> String {
    "file".to_string()
}

// -- Pagination --

/// One page of a paginated HTTP response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(default)]
    pub next: Option<String>,
}
