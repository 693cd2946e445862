//! Chat message value objects and the HTTP publish/history surface.

pub mod history;
pub mod ingress;
pub mod messages;

use serde::{Deserialize, Serialize};

/// Publisher identity embedded in every message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub user_id: String,
    pub user_name: String,
    pub avatar: String,
}

/// One chat message as published, stored and delivered.
///
/// Immutable once accepted; `time` is caller-supplied and not validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub message: String,
    pub time: String,
    pub user_info: UserInfo,
}
