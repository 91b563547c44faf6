use super::dates;
use crate::storage::{Record, keys};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Recipient id for notifications addressed to everyone.
pub const BROADCAST: &str = "all";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub related_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
    #[serde(with = "dates::iso")]
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
}

impl Notification {
    pub fn new(
        user_id: impl Into<String>,
        title: impl Into<String>,
        message: impl Into<String>,
        kind: impl Into<String>,
        related_id: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            title: title.into(),
            message: message.into(),
            kind: kind.into(),
            related_id: related_id.into(),
            action_url: None,
            date: Utc::now(),
            read: false,
        }
    }

    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        self.user_id == BROADCAST
    }
}

impl Record for Notification {
    const STORAGE_KEY: &'static str = keys::NOTIFICATIONS;
    const ENTITY: &'static str = "Notification";

    fn id(&self) -> &str {
        &self.id
    }
}
