use std::sync::Arc;

use dashmap::DashMap;
use futures_util::future::join_all;
use thiserror::Error;
use tokio::sync::mpsc;

use super::{
    ConnectionId,
    languages::LanguageRegistry,
    rooms::RoomRegistry,
    store::{ChatMessage, ChatStatus, ChatStore, StoreError},
    translate::TranslationGateway,
    wire::{BroadcastMessage, CloseChat, ErrorCode, SendMessage, ServerEvent},
};

/// Failures reported back to the connection that triggered them.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("chat for purchase {0} is closed")]
    ChatClosed(String),

    #[error("purchase {0} not found")]
    UnknownPurchase(String),

    #[error("could not store message: {0}")]
    Persistence(#[source] StoreError),

    #[error("sender {0} is not the user of this connection")]
    SenderMismatch(String),

    #[error("message content is empty")]
    EmptyMessage,
}

impl From<StoreError> for RelayError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::PurchaseNotFound(id) => RelayError::UnknownPurchase(id),
            err => RelayError::Persistence(err),
        }
    }
}

impl RelayError {
    pub fn code(&self) -> ErrorCode {
        match self {
            RelayError::ChatClosed(_) => ErrorCode::ChatClosed,
            RelayError::UnknownPurchase(_) => ErrorCode::UnknownPurchase,
            RelayError::Persistence(_) => ErrorCode::PersistenceError,
            RelayError::SenderMismatch(_) => ErrorCode::SenderMismatch,
            RelayError::EmptyMessage => ErrorCode::EmptyMessage,
        }
    }

    pub fn to_event(&self) -> ServerEvent {
        ServerEvent::Error {
            code: self.code(),
            message: self.to_string(),
        }
    }
}

struct Connection {
    user_id: String,
    outbox: mpsc::UnboundedSender<ServerEvent>,
}

/// Routes chat events between live connections of purchase chats.
///
/// All state is in-process. Rooms are keyed by purchase id; a message is
/// stored once and then fanned out to every member of its room, translated
/// per receiver when the receiver's language differs from the sender's.
pub struct ChatRelay {
    languages: LanguageRegistry,
    rooms: RoomRegistry,
    connections: DashMap<ConnectionId, Connection>,
    translator: TranslationGateway,
    store: Arc<dyn ChatStore>,
}

impl ChatRelay {
    pub fn new(store: Arc<dyn ChatStore>, translator: TranslationGateway) -> Self {
        Self {
            languages: LanguageRegistry::new(),
            rooms: RoomRegistry::new(),
            connections: DashMap::new(),
            translator,
            store,
        }
    }

    /// Registers a connection for an authenticated user. Events for it are
    /// delivered on the returned receiver until [`ChatRelay::disconnect`].
    pub fn connect(&self, user_id: impl Into<String>) -> (ConnectionId, mpsc::UnboundedReceiver<ServerEvent>) {
        let id = ConnectionId::new();
        let (outbox, inbox) = mpsc::unbounded_channel();
        let user_id = user_id.into();
        tracing::debug!(connection = %id, user_id, "connected");
        self.connections.insert(id, Connection { user_id, outbox });
        (id, inbox)
    }

    pub fn register_language(&self, connection: ConnectionId, tag: &str) {
        self.languages.set_language(connection, tag);
        tracing::debug!(%connection, language = %self.languages.get_language(connection), "registered language");
    }

    /// Adds a live connection to the purchase room. Unknown or already
    /// disconnected ids are ignored.
    pub fn join_chat(&self, connection: ConnectionId, purchase_id: &str) {
        // held across the join so a concurrent disconnect prunes after us
        let Some(_live) = self.connections.get(&connection) else {
            tracing::debug!(%connection, purchase_id, "ignoring join from gone connection");
            return;
        };
        if self.rooms.join(purchase_id, connection) {
            tracing::debug!(%connection, purchase_id, "joined chat");
        }
    }

    pub fn leave_chat(&self, connection: ConnectionId, purchase_id: &str) {
        if self.rooms.leave(purchase_id, connection) {
            tracing::debug!(%connection, purchase_id, "left chat");
        }
    }

    pub fn members_of(&self, purchase_id: &str) -> Vec<ConnectionId> {
        self.rooms.members_of(purchase_id)
    }

    pub fn language_of(&self, connection: ConnectionId) -> String {
        self.languages.get_language(connection)
    }

    /// Forgets the connection everywhere. Unknown ids are ignored.
    pub fn disconnect(&self, connection: ConnectionId) {
        self.connections.remove(&connection);
        self.languages.remove(connection);
        let rooms = self.rooms.remove_connection_from_all_rooms(connection);
        tracing::debug!(%connection, ?rooms, "disconnected");
    }

    /// Queues an event for one connection. Gone connections are skipped.
    pub fn deliver(&self, connection: ConnectionId, event: ServerEvent) {
        let Some(conn) = self.connections.get(&connection) else {
            tracing::trace!(%connection, "dropping event for gone connection");
            return;
        };
        if conn.outbox.send(event).is_err() {
            tracing::trace!(%connection, "outbox closed");
        }
    }

    /// Stores the message, then broadcasts it to the room.
    ///
    /// Nothing is broadcast unless the message was stored. Translation
    /// failures only drop the annotation for the affected receiver.
    pub async fn send_message(
        &self,
        from: ConnectionId,
        SendMessage { purchase_id, sender_id, content }: SendMessage,
    ) -> Result<ChatMessage, RelayError> {
        let owner = self.connections.get(&from).map(|conn| conn.user_id.clone());
        if owner.as_deref() != Some(sender_id.as_str()) {
            return Err(RelayError::SenderMismatch(sender_id));
        }

        let content = content.trim();
        if content.is_empty() {
            return Err(RelayError::EmptyMessage);
        }

        if self.store.chat_status(&purchase_id).await?.chat_status == ChatStatus::Closed {
            return Err(RelayError::ChatClosed(purchase_id));
        }

        let message = self
            .store
            .create_message(&purchase_id, &sender_id, content)
            .await
            .inspect_err(|err| tracing::error!(purchase_id, sender_id, "failed to store message: {err}"))?;

        let sender_lang = self.languages.get_language(from);
        let members = self.rooms.members_of(&purchase_id);
        tracing::info!(
            purchase_id,
            message_id = message.id,
            receivers = members.iter().filter(|member| **member != from).count(),
            "relaying message"
        );

        join_all(members.into_iter().map(|member| {
            let message = &message;
            let sender_lang = sender_lang.as_str();
            async move {
                let translated_content = if member == from {
                    None
                } else {
                    self.translate_for(member, &message.content, sender_lang).await
                };
                self.deliver(
                    member,
                    ServerEvent::ReceiveMessage(BroadcastMessage {
                        message: message.clone(),
                        translated_content,
                    }),
                );
            }
        }))
        .await;

        Ok(message)
    }

    async fn translate_for(&self, receiver: ConnectionId, content: &str, sender_lang: &str) -> Option<String> {
        let receiver_lang = self.languages.get_language(receiver);
        if receiver_lang == sender_lang {
            return None;
        }

        match self.translator.translate(content, sender_lang, &receiver_lang).await {
            Ok(translated) => Some(translated),
            Err(err) => {
                tracing::warn!(%receiver, from = sender_lang, to = receiver_lang, "delivering untranslated: {err}");
                None
            }
        }
    }

    /// Closes the purchase chat and notifies every member of the room.
    ///
    /// Closing an already closed chat keeps the stored reason but still
    /// notifies the room. Returns whether this call changed the status.
    pub async fn close_chat(&self, CloseChat { purchase_id, reason }: CloseChat) -> Result<bool, RelayError> {
        let closed = self.store.close_chat(&purchase_id, &reason).await?;
        tracing::info!(purchase_id, reason, transitioned = closed, "chat closed");

        for member in self.rooms.members_of(&purchase_id) {
            self.deliver(member, ServerEvent::ChatClosed { reason: reason.clone() });
        }
        Ok(closed)
    }
}
