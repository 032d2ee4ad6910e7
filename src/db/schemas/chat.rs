//! Chat document schema
//!
//! A conversation session owning an ordered list of interactions.

use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

/// Collection name for chats
pub const CHAT_COLLECTION: &str = "chats";

/// Chat document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ChatDoc {
    /// MongoDB document ID
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    /// Public chat identifier
    pub chat_id: String,

    /// Language of the page the chat was opened from (en, fr)
    #[serde(default)]
    pub page_language: String,

    /// Search provider used to build context (google, canadaca, ...)
    #[serde(default)]
    pub search_provider: String,

    /// Creator reference; absent for public (anonymous) chats
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<ObjectId>,

    /// Ordered interaction references (owned by this chat)
    #[serde(default)]
    pub interactions: Vec<ObjectId>,

    /// Creation timestamp
    pub created_at: DateTime,
}

impl ChatDoc {
    /// Create a new public chat with no interactions
    pub fn new(chat_id: impl Into<String>, page_language: impl Into<String>, created_at: DateTime) -> Self {
        Self {
            id: Some(ObjectId::new()),
            chat_id: chat_id.into(),
            page_language: page_language.into(),
            search_provider: String::new(),
            user: None,
            interactions: Vec::new(),
            created_at,
        }
    }

    /// Attach a creator
    pub fn with_user(mut self, user: ObjectId) -> Self {
        self.user = Some(user);
        self
    }

    /// Append an interaction reference
    pub fn with_interaction(mut self, interaction: ObjectId) -> Self {
        self.interactions.push(interaction);
        self
    }
}
