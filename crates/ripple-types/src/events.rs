use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::payloads::{
    ChannelPayload, MemberPayload, MessagePayload, OwnUserPayload, ReactionPayload, UnreadCount,
    UserPayload,
};

/// Realtime events received over the socket.
///
/// The set is closed: anything the store does not understand decodes to
/// [`Event::Unknown`] and is ignored by the projector.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// Channel fields changed; may carry the message that caused the change
    #[serde(rename = "channel.updated")]
    ChannelUpdated(ChannelEvent),

    /// History before `channel.truncated_at` was removed
    #[serde(rename = "channel.truncated")]
    ChannelTruncated(ChannelEvent),

    #[serde(rename = "channel.deleted")]
    ChannelDeleted(ChannelEvent),

    /// A message was posted in a watched channel
    #[serde(rename = "message.new")]
    MessageNew(MessageNewEvent),

    #[serde(rename = "message.updated")]
    MessageUpdated(MessageUpdatedEvent),

    #[serde(rename = "message.deleted")]
    MessageDeleted(MessageDeletedEvent),

    #[serde(rename = "message.read")]
    MessageRead(ReadEvent),

    /// A message was posted in a channel the user is a member of but not watching
    #[serde(rename = "notification.message_new")]
    NotificationMessageNew(NotificationMessageNewEvent),

    #[serde(rename = "notification.mark_read")]
    NotificationMarkRead(ReadEvent),

    #[serde(rename = "notification.mutes_updated")]
    NotificationMutesUpdated(CurrentUserEvent),

    /// Sent on connect and periodically after; carries the signed-in user
    #[serde(rename = "health.check")]
    HealthCheck(CurrentUserEvent),

    #[serde(rename = "reaction.new")]
    ReactionNew(ReactionEvent),

    #[serde(rename = "reaction.updated")]
    ReactionUpdated(ReactionEvent),

    #[serde(rename = "reaction.deleted")]
    ReactionDeleted(ReactionEvent),

    #[serde(rename = "typing.start")]
    TypingStart(TypingEvent),

    #[serde(rename = "typing.stop")]
    TypingStop(TypingEvent),

    #[serde(rename = "member.added")]
    MemberAdded(MemberEvent),

    #[serde(rename = "member.updated")]
    MemberUpdated(MemberEvent),

    #[serde(rename = "member.removed")]
    MemberRemoved(MemberEvent),

    #[serde(rename = "user.updated")]
    UserUpdated(UserEvent),

    #[serde(rename = "user.deactivated")]
    UserDeactivated(UserEvent),

    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelEvent {
    pub cid: String,
    #[serde(default)]
    pub channel: Option<ChannelPayload>,
    #[serde(default)]
    pub user: Option<UserPayload>,
    #[serde(default)]
    pub message: Option<MessagePayload>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageNewEvent {
    pub cid: String,
    pub message: MessagePayload,
    #[serde(default)]
    pub user: Option<UserPayload>,
    #[serde(default)]
    pub total_unread_count: Option<u32>,
    #[serde(default)]
    pub unread_channels: Option<u32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationMessageNewEvent {
    pub cid: String,
    #[serde(default)]
    pub channel: Option<ChannelPayload>,
    pub message: MessagePayload,
    #[serde(default)]
    pub total_unread_count: Option<u32>,
    #[serde(default)]
    pub unread_channels: Option<u32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageUpdatedEvent {
    pub cid: String,
    pub message: MessagePayload,
    #[serde(default)]
    pub user: Option<UserPayload>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDeletedEvent {
    pub cid: String,
    pub message: MessagePayload,
    #[serde(default)]
    pub user: Option<UserPayload>,
    #[serde(default)]
    pub hard_delete: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadEvent {
    pub cid: String,
    #[serde(default)]
    pub user: Option<UserPayload>,
    #[serde(default)]
    pub last_read_message_id: Option<String>,
    #[serde(default)]
    pub total_unread_count: Option<u32>,
    #[serde(default)]
    pub unread_channels: Option<u32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUserEvent {
    #[serde(default)]
    pub me: Option<OwnUserPayload>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionEvent {
    pub cid: String,
    #[serde(default)]
    pub message: Option<MessagePayload>,
    pub reaction: ReactionPayload,
    #[serde(default)]
    pub user: Option<UserPayload>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypingEvent {
    pub cid: String,
    #[serde(default)]
    pub user: Option<UserPayload>,
    #[serde(default)]
    pub parent_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberEvent {
    pub cid: String,
    #[serde(default)]
    pub member: Option<MemberPayload>,
    #[serde(default)]
    pub user: Option<UserPayload>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEvent {
    #[serde(default)]
    pub user: Option<UserPayload>,
    pub created_at: DateTime<Utc>,
}

/// Discriminant of [`Event`], usable without borrowing the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    ChannelUpdated,
    ChannelTruncated,
    ChannelDeleted,
    MessageNew,
    MessageUpdated,
    MessageDeleted,
    MessageRead,
    NotificationMessageNew,
    NotificationMarkRead,
    NotificationMutesUpdated,
    HealthCheck,
    ReactionNew,
    ReactionUpdated,
    ReactionDeleted,
    TypingStart,
    TypingStop,
    MemberAdded,
    MemberUpdated,
    MemberRemoved,
    UserUpdated,
    UserDeactivated,
    Unknown,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChannelUpdated => "channel.updated",
            Self::ChannelTruncated => "channel.truncated",
            Self::ChannelDeleted => "channel.deleted",
            Self::MessageNew => "message.new",
            Self::MessageUpdated => "message.updated",
            Self::MessageDeleted => "message.deleted",
            Self::MessageRead => "message.read",
            Self::NotificationMessageNew => "notification.message_new",
            Self::NotificationMarkRead => "notification.mark_read",
            Self::NotificationMutesUpdated => "notification.mutes_updated",
            Self::HealthCheck => "health.check",
            Self::ReactionNew => "reaction.new",
            Self::ReactionUpdated => "reaction.updated",
            Self::ReactionDeleted => "reaction.deleted",
            Self::TypingStart => "typing.start",
            Self::TypingStop => "typing.stop",
            Self::MemberAdded => "member.added",
            Self::MemberUpdated => "member.updated",
            Self::MemberRemoved => "member.removed",
            Self::UserUpdated => "user.updated",
            Self::UserDeactivated => "user.deactivated",
            Self::Unknown => "unknown",
        }
    }

    /// Event kinds whose message must be stored even when it is not known locally.
    pub fn creates_unknown_messages(&self) -> bool {
        matches!(
            self,
            Self::ChannelUpdated
                | Self::MessageNew
                | Self::NotificationMessageNew
                | Self::ChannelTruncated
        )
    }

    pub fn is_new_message(&self) -> bool {
        matches!(self, Self::MessageNew | Self::NotificationMessageNew)
    }
}

impl Event {
    pub fn event_type(&self) -> EventType {
        match self {
            Self::ChannelUpdated(_) => EventType::ChannelUpdated,
            Self::ChannelTruncated(_) => EventType::ChannelTruncated,
            Self::ChannelDeleted(_) => EventType::ChannelDeleted,
            Self::MessageNew(_) => EventType::MessageNew,
            Self::MessageUpdated(_) => EventType::MessageUpdated,
            Self::MessageDeleted(_) => EventType::MessageDeleted,
            Self::MessageRead(_) => EventType::MessageRead,
            Self::NotificationMessageNew(_) => EventType::NotificationMessageNew,
            Self::NotificationMarkRead(_) => EventType::NotificationMarkRead,
            Self::NotificationMutesUpdated(_) => EventType::NotificationMutesUpdated,
            Self::HealthCheck(_) => EventType::HealthCheck,
            Self::ReactionNew(_) => EventType::ReactionNew,
            Self::ReactionUpdated(_) => EventType::ReactionUpdated,
            Self::ReactionDeleted(_) => EventType::ReactionDeleted,
            Self::TypingStart(_) => EventType::TypingStart,
            Self::TypingStop(_) => EventType::TypingStop,
            Self::MemberAdded(_) => EventType::MemberAdded,
            Self::MemberUpdated(_) => EventType::MemberUpdated,
            Self::MemberRemoved(_) => EventType::MemberRemoved,
            Self::UserUpdated(_) => EventType::UserUpdated,
            Self::UserDeactivated(_) => EventType::UserDeactivated,
            Self::Unknown => EventType::Unknown,
        }
    }

    /// Channel the event is scoped to, as sent on the wire (unvalidated).
    pub fn cid(&self) -> Option<&str> {
        match self {
            Self::ChannelUpdated(e) | Self::ChannelTruncated(e) | Self::ChannelDeleted(e) => {
                Some(&e.cid)
            }
            Self::MessageNew(e) => Some(&e.cid),
            Self::MessageUpdated(e) => Some(&e.cid),
            Self::MessageDeleted(e) => Some(&e.cid),
            Self::MessageRead(e) | Self::NotificationMarkRead(e) => Some(&e.cid),
            Self::NotificationMessageNew(e) => Some(&e.cid),
            Self::ReactionNew(e) | Self::ReactionUpdated(e) | Self::ReactionDeleted(e) => {
                Some(&e.cid)
            }
            Self::TypingStart(e) | Self::TypingStop(e) => Some(&e.cid),
            Self::MemberAdded(e) | Self::MemberUpdated(e) | Self::MemberRemoved(e) => {
                Some(&e.cid)
            }
            Self::NotificationMutesUpdated(_)
            | Self::HealthCheck(_)
            | Self::UserUpdated(_)
            | Self::UserDeactivated(_)
            | Self::Unknown => None,
        }
    }

    pub fn user(&self) -> Option<&UserPayload> {
        match self {
            Self::ChannelUpdated(e) | Self::ChannelTruncated(e) | Self::ChannelDeleted(e) => {
                e.user.as_ref()
            }
            Self::MessageNew(e) => e.user.as_ref(),
            Self::MessageUpdated(e) => e.user.as_ref(),
            Self::MessageDeleted(e) => e.user.as_ref(),
            Self::MessageRead(e) | Self::NotificationMarkRead(e) => e.user.as_ref(),
            Self::ReactionNew(e) | Self::ReactionUpdated(e) | Self::ReactionDeleted(e) => {
                e.user.as_ref()
            }
            Self::TypingStart(e) | Self::TypingStop(e) => e.user.as_ref(),
            Self::MemberAdded(e) | Self::MemberUpdated(e) | Self::MemberRemoved(e) => {
                e.user.as_ref()
            }
            Self::UserUpdated(e) | Self::UserDeactivated(e) => e.user.as_ref(),
            Self::NotificationMessageNew(_)
            | Self::NotificationMutesUpdated(_)
            | Self::HealthCheck(_)
            | Self::Unknown => None,
        }
    }

    pub fn channel(&self) -> Option<&ChannelPayload> {
        match self {
            Self::ChannelUpdated(e) | Self::ChannelTruncated(e) | Self::ChannelDeleted(e) => {
                e.channel.as_ref()
            }
            Self::NotificationMessageNew(e) => e.channel.as_ref(),
            _ => None,
        }
    }

    pub fn message(&self) -> Option<&MessagePayload> {
        match self {
            Self::ChannelUpdated(e) | Self::ChannelTruncated(e) | Self::ChannelDeleted(e) => {
                e.message.as_ref()
            }
            Self::MessageNew(e) => Some(&e.message),
            Self::MessageUpdated(e) => Some(&e.message),
            Self::MessageDeleted(e) => Some(&e.message),
            Self::NotificationMessageNew(e) => Some(&e.message),
            Self::ReactionNew(e) | Self::ReactionUpdated(e) | Self::ReactionDeleted(e) => {
                e.message.as_ref()
            }
            _ => None,
        }
    }

    /// The signed-in user snapshot, if the event carries one.
    pub fn me(&self) -> Option<&OwnUserPayload> {
        match self {
            Self::HealthCheck(e) | Self::NotificationMutesUpdated(e) => e.me.as_ref(),
            _ => None,
        }
    }

    /// Both counters must be present; a half-filled pair is treated as absent.
    pub fn unread_counts(&self) -> Option<UnreadCount> {
        let (messages, channels) = match self {
            Self::MessageNew(e) => (e.total_unread_count, e.unread_channels),
            Self::NotificationMessageNew(e) => (e.total_unread_count, e.unread_channels),
            Self::MessageRead(e) | Self::NotificationMarkRead(e) => {
                (e.total_unread_count, e.unread_channels)
            }
            _ => return None,
        };
        Some(UnreadCount {
            channels: channels?,
            messages: messages?,
        })
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::ChannelUpdated(e) | Self::ChannelTruncated(e) | Self::ChannelDeleted(e) => {
                Some(e.created_at)
            }
            Self::MessageNew(e) => Some(e.created_at),
            Self::MessageUpdated(e) => Some(e.created_at),
            Self::MessageDeleted(e) => Some(e.created_at),
            Self::MessageRead(e) | Self::NotificationMarkRead(e) => Some(e.created_at),
            Self::NotificationMessageNew(e) => Some(e.created_at),
            Self::NotificationMutesUpdated(e) | Self::HealthCheck(e) => Some(e.created_at),
            Self::ReactionNew(e) | Self::ReactionUpdated(e) | Self::ReactionDeleted(e) => {
                Some(e.created_at)
            }
            Self::TypingStart(e) | Self::TypingStop(e) => Some(e.created_at),
            Self::MemberAdded(e) | Self::MemberUpdated(e) | Self::MemberRemoved(e) => {
                Some(e.created_at)
            }
            Self::UserUpdated(e) | Self::UserDeactivated(e) => Some(e.created_at),
            Self::Unknown => None,
        }
    }
}
