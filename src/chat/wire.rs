//! JSON frames exchanged over the chat socket.
//!
//! Every frame is `{"event": <name>, "data": <payload>}`.

use serde::{Deserialize, Serialize};

use super::store::ChatMessage;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    pub purchase_id: String,
    pub sender_id: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseChat {
    pub purchase_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    RegisterLanguage(String),
    JoinChat(String),
    LeaveChat(String),
    SendMessage(SendMessage),
    CloseChat(CloseChat),
}

/// A persisted message as delivered to one connection.
///
/// `translated_content` is only present on copies for connections whose
/// language differs from the sender's and whose translation succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BroadcastMessage {
    #[serde(flatten)]
    pub message: ChatMessage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translated_content: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    ChatClosed,
    PersistenceError,
    UnknownPurchase,
    SenderMismatch,
    EmptyMessage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    ReceiveMessage(BroadcastMessage),
    ChatClosed { reason: String },
    Error { code: ErrorCode, message: String },
}
