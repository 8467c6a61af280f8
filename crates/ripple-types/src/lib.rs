//! Shared types for the ripple local chat store: identifiers, wire payloads,
//! realtime events, list-query descriptors and the read-only snapshot models
//! handed to consumers.

pub mod events;
pub mod ids;
pub mod models;
pub mod payloads;
pub mod query;

pub use events::{Event, EventType};
pub use ids::{AttachmentId, ChannelId, ValidationError, reaction_id};
pub use models::{
    ChatChannel, ChatMessage, LocalMessageState, LocalReactionState, MessagePinning, MessageType,
    NewMessage,
};
pub use payloads::UnreadCount;
