//! Query descriptors for cached list results.
//!
//! Every descriptor hashes its filter (and sort, where the sort changes the
//! result order) into a stable `filter_hash` used as the cache key.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListQueryKind {
    User,
    Channel,
    MessageSearch,
    MemberList,
}

impl ListQueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Channel => "channel",
            Self::MessageSearch => "message_search",
            Self::MemberList => "member_list",
        }
    }

    pub fn from_db(raw: &str) -> Option<Self> {
        Some(match raw {
            "user" => Self::User,
            "channel" => Self::Channel,
            "message_search" => Self::MessageSearch,
            "member_list" => Self::MemberList,
            _ => return None,
        })
    }
}

/// One sort key plus direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sorting<K> {
    pub key: K,
    pub ascending: bool,
}

impl<K> Sorting<K> {
    pub fn ascending(key: K) -> Self {
        Self {
            key,
            ascending: true,
        }
    }

    pub fn descending(key: K) -> Self {
        Self {
            key,
            ascending: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelSortKey {
    /// `last_message_at`, falling back to `created_at` for empty channels
    LastMessageAt,
    CreatedAt,
    UpdatedAt,
    MemberCount,
    UnreadCount,
    Cid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserSortKey {
    Id,
    Name,
    LastActive,
    CreatedAt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberSortKey {
    CreatedAt,
    UserId,
}

/// Shared surface of the cached query descriptors.
pub trait ListQuery {
    const KIND: ListQueryKind;

    fn filter_json(&self) -> Value;

    fn sort_json(&self) -> Value;

    fn filter_hash(&self) -> String {
        filter_hash(&json!({
            "kind": Self::KIND.as_str(),
            "filter": self.filter_json(),
            "sort": self.sort_json(),
        }))
    }
}

/// Hex SHA-256 of the canonical JSON encoding.
///
/// `serde_json::Map` keeps keys sorted, so logically equal filters hash equal
/// regardless of the order their keys were written in.
pub fn filter_hash(value: &Value) -> String {
    let canonical = value.to_string();
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserListQuery {
    pub filter: Value,
    #[serde(default)]
    pub sort: Vec<Sorting<UserSortKey>>,
    pub page_size: u32,
}

impl ListQuery for UserListQuery {
    const KIND: ListQueryKind = ListQueryKind::User;

    fn filter_json(&self) -> Value {
        self.filter.clone()
    }

    fn sort_json(&self) -> Value {
        json!(self.sort)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelListQuery {
    pub filter: Value,
    #[serde(default)]
    pub sort: Vec<Sorting<ChannelSortKey>>,
    pub page_size: u32,
    #[serde(default)]
    pub message_limit: u32,
}

impl ChannelListQuery {
    pub fn new(filter: Value) -> Self {
        Self {
            filter,
            sort: vec![Sorting::descending(ChannelSortKey::LastMessageAt)],
            page_size: 20,
            message_limit: 25,
        }
    }
}

impl ListQuery for ChannelListQuery {
    const KIND: ListQueryKind = ListQueryKind::Channel;

    fn filter_json(&self) -> Value {
        self.filter.clone()
    }

    fn sort_json(&self) -> Value {
        json!(self.sort)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageSearchQuery {
    pub channel_filter: Value,
    pub message_filter: Value,
    pub page_size: u32,
}

impl ListQuery for MessageSearchQuery {
    const KIND: ListQueryKind = ListQueryKind::MessageSearch;

    fn filter_json(&self) -> Value {
        json!({
            "channels": self.channel_filter,
            "messages": self.message_filter,
        })
    }

    fn sort_json(&self) -> Value {
        Value::Null
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMemberListQuery {
    pub cid: String,
    pub filter: Value,
    #[serde(default)]
    pub sort: Vec<Sorting<MemberSortKey>>,
    pub page_size: u32,
}

impl ListQuery for ChannelMemberListQuery {
    const KIND: ListQueryKind = ListQueryKind::MemberList;

    fn filter_json(&self) -> Value {
        json!({
            "cid": self.cid,
            "filter": self.filter,
        })
    }

    fn sort_json(&self) -> Value {
        json!(self.sort)
    }
}
