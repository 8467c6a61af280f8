//! Database row types for entities that have no consumer-facing snapshot in
//! `ripple-types`. Messages and channels are read straight into
//! [`ripple_types::ChatMessage`] and [`ripple_types::ChatChannel`].

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use ripple_types::{ChannelId, LocalReactionState, UnreadCount};
use ripple_types::query::ListQueryKind;

#[derive(Debug, Clone, PartialEq)]
pub struct UserRow {
    pub id: String,
    pub name: Option<String>,
    pub image_url: Option<String>,
    pub role: String,
    pub is_online: bool,
    pub is_banned: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub last_active_at: Option<DateTime<Utc>>,
    pub deactivated_at: Option<DateTime<Utc>>,
    pub extra_data: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRow {
    pub id: String,
    pub push_provider: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CurrentUserRow {
    pub user: UserRow,
    pub devices: Vec<DeviceRow>,
    pub current_device_id: Option<String>,
    pub unread_count: UnreadCount,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReactionRow {
    /// `user_id/message_id/type`
    pub id: String,
    pub message_id: String,
    pub user_id: String,
    pub reaction_type: String,
    pub score: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub local_state: Option<LocalReactionState>,
    /// Changes on every local add; a pending removal must name the version it saw.
    pub version: Option<String>,
    pub extra_data: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentRow {
    pub id: String,
    pub message_id: String,
    pub cid: ChannelId,
    pub position: usize,
    pub attachment_type: String,
    pub payload: Map<String, Value>,
    pub upload_state: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelReadRow {
    pub cid: ChannelId,
    pub user_id: String,
    pub last_read_at: DateTime<Utc>,
    pub last_read_message_id: Option<String>,
    pub unread_messages_count: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberRow {
    pub cid: ChannelId,
    pub user_id: String,
    pub role: Option<String>,
    pub is_banned: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListQueryRow {
    pub kind: ListQueryKind,
    pub filter_hash: String,
    pub filter: Value,
    pub sort: Value,
    pub next_cursor: Option<String>,
    pub updated_at: DateTime<Utc>,
    /// Entity ids in result order.
    pub result_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueuedRequestRow {
    pub id: String,
    pub endpoint: Value,
    pub created_at: DateTime<Utc>,
}
