use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// Document identifiers are opaque strings (identity-provider uids or UUIDs).
pub type Id = String;

pub fn new_id() -> Id {
    uuid::Uuid::new_v4().to_string()
}

// ---------------- users ----------------

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Id,
    pub display_name: String,
    #[serde(default)]
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

// ---------------- accounts ----------------

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: Id,
    pub owner_id: Id,
    pub name: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewAccount {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAccount {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    /// `Some(None)` clears the notes.
    #[serde(default, with = "double_option")]
    #[schema(value_type = Option<String>)]
    #[validate(length(max = 2000))]
    pub notes: Option<Option<String>>,
}

// ---------------- characters ----------------

/// Standing of a character with one NPC, lowest to highest.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ToSchema, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum FavorLevel {
    Despised,
    Hated,
    Disliked,
    Tolerated,
    #[default]
    Neutral,
    Comfortable,
    Friends,
    CloseFriends,
    BestFriends,
    LikeFamily,
    SoulMates,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    pub id: Id,
    pub owner_id: Id,
    pub name: String,
    pub account_id: Option<Id>,
    #[serde(default)]
    pub favors: BTreeMap<String, FavorLevel>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewCharacter {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub account_id: Option<Id>,
    #[serde(default)]
    pub favors: BTreeMap<String, FavorLevel>,
    #[validate(length(min = 1, max = 2048))]
    pub image_url: Option<String>,
}

/// Partial update. `account_id: Some(None)` unlinks the character.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCharacter {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[serde(default, with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub account_id: Option<Option<Id>>,
    #[validate(length(min = 1, max = 2048))]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SetFavor {
    pub level: FavorLevel,
}

// distinguishes an absent field from an explicit `null`
mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<T: Serialize, S: Serializer>(v: &Option<Option<T>>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(inner) => inner.serialize(s),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, T: Deserialize<'de>, D: Deserializer<'de>>(d: D) -> Result<Option<Option<T>>, D::Error> {
        Option::<T>::deserialize(d).map(Some)
    }
}

// ---------------- suggestions ----------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionStatus {
    Open,
    Closed,
}

impl SuggestionStatus {
    pub fn toggled(self) -> Self {
        match self {
            SuggestionStatus::Open => SuggestionStatus::Closed,
            SuggestionStatus::Closed => SuggestionStatus::Open,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SuggestionStatus::Open => "open",
            SuggestionStatus::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationEntry {
    pub sender_id: Id,
    pub sender_name: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub id: Id,
    pub text: String,
    pub creator_id: Id,
    pub creator_name: String,
    pub status: SuggestionStatus,
    #[serde(default)]
    pub conversation: Vec<ConversationEntry>,
    pub created_at: DateTime<Utc>,
}

/// Store-level insert; identity already checked by the caller.
#[derive(Debug, Clone)]
pub struct NewSuggestion {
    pub text: String,
    pub creator_id: Id,
    pub creator_name: String,
}

// ---------------- messages ----------------

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Id,
    pub sender_id: Id,
    pub sender_name: String,
    pub receiver_id: Id,
    pub receiver_name: String,
    pub text: String,
    #[serde(default)]
    pub read: bool,
    pub suggestion_id: Option<Id>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub sender_id: Id,
    pub sender_name: String,
    pub receiver_id: Id,
    pub receiver_name: String,
    pub text: String,
    pub suggestion_id: Option<Id>,
}
