//! Room membership and messaging over the signaling channel.

use std::sync::Arc;

use parking_lot::Mutex;
use playhub_common::new_id;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ChatError;
use crate::identity::IdentityProvider;
use crate::protocol::{events, payload_room_id, JoinRoom, LeaveRoom, SendMessage};
use crate::signaling::{SignalingChannel, SignalingEvent};

use super::history::{ChatHistory, ChatHistoryConfig, ChatMessage};

const EVENT_BUFFER: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    Joined { room_id: String },
    Left { room_id: String },
    /// The server sent a room's full history.
    HistoryReplaced { room_id: String, count: usize },
    MessageReceived(ChatMessage),
}

#[derive(Clone)]
struct ChatState {
    history: Arc<Mutex<ChatHistory>>,
    room: Arc<Mutex<Option<String>>>,
    events: broadcast::Sender<ChatEvent>,
}

impl ChatState {
    /// Room a push belongs to: its `roomId`, else the joined room.
    fn target_room(&self, payload: &Value) -> Option<String> {
        payload_room_id(payload)
            .map(str::to_string)
            .or_else(|| self.room.lock().clone())
    }

    fn on_history(&self, payload: &Value) {
        let Some(room_id) = self.target_room(payload) else {
            debug!("chat history without a room");
            return;
        };
        let list = match payload {
            Value::Array(list) => list.as_slice(),
            other => match other.get("messages").and_then(Value::as_array) {
                Some(list) => list.as_slice(),
                None => {
                    warn!(room_id = %room_id, "unrecognized chat history payload");
                    return;
                }
            },
        };
        let messages: Vec<ChatMessage> = list
            .iter()
            .filter_map(|m| ChatMessage::from_payload(&room_id, m))
            .collect();
        let count = messages.len();
        self.history.lock().replace(&room_id, messages);
        debug!(room_id = %room_id, count, "chat history received");
        let _ = self.events.send(ChatEvent::HistoryReplaced { room_id, count });
    }

    fn on_message(&self, payload: &Value) {
        let Some(room_id) = self.target_room(payload) else {
            debug!("chat message without a room");
            return;
        };
        let Some(message) = ChatMessage::from_payload(&room_id, payload) else {
            warn!(room_id = %room_id, "chat message without text");
            return;
        };
        self.history.lock().push(message.clone());
        let _ = self.events.send(ChatEvent::MessageReceived(message));
    }
}

/// Text chat for one room at a time.
///
/// Incoming `chat-history` and `message` pushes are applied by a
/// background task for as long as the controller lives. Must be created
/// inside a tokio runtime.
pub struct ChatController {
    channel: SignalingChannel,
    identity: Arc<dyn IdentityProvider>,
    state: ChatState,
    shutdown: CancellationToken,
}

impl ChatController {
    pub fn new(
        channel: SignalingChannel,
        identity: Arc<dyn IdentityProvider>,
        config: ChatHistoryConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let state = ChatState {
            history: Arc::new(Mutex::new(ChatHistory::new(config))),
            room: Arc::new(Mutex::new(None)),
            events,
        };
        let shutdown = CancellationToken::new();
        tokio::spawn(listen(channel.subscribe(), state.clone(), shutdown.clone()));
        Self {
            channel,
            identity,
            state,
            shutdown,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.state.events.subscribe()
    }

    pub fn current_room(&self) -> Option<String> {
        self.state.room.lock().clone()
    }

    pub fn is_joined(&self) -> bool {
        self.state.room.lock().is_some()
    }

    /// Messages of the joined room, oldest first.
    pub fn messages(&self) -> Vec<ChatMessage> {
        match self.current_room() {
            Some(room_id) => self.messages_in(&room_id),
            None => Vec::new(),
        }
    }

    pub fn messages_in(&self, room_id: &str) -> Vec<ChatMessage> {
        self.state
            .history
            .lock()
            .all(room_id)
            .into_iter()
            .cloned()
            .collect()
    }

    fn require_login(&self, action: &str) -> Result<(), ChatError> {
        if self.identity.current().is_some() {
            return Ok(());
        }
        self.identity.request_login(action);
        Err(ChatError::AuthRequired)
    }

    /// Join `room_id`. The server answers `{ok: true}` on success.
    pub async fn join(&self, room_id: &str) -> Result<(), ChatError> {
        if !self.channel.is_connected() {
            return Err(ChatError::NotConnected);
        }
        self.require_login("join chat")?;

        let ack = self
            .channel
            .request(&JoinRoom { room_id: room_id.to_string() }, None)
            .await?;
        if !ack.ok {
            return Err(ChatError::JoinRefused(room_id.to_string()));
        }

        *self.state.room.lock() = Some(room_id.to_string());
        info!(room_id, "joined chat room");
        let _ = self.state.events.send(ChatEvent::Joined {
            room_id: room_id.to_string(),
        });
        Ok(())
    }

    /// Leave the joined room, if any. Local state is cleared even when the
    /// server cannot be told.
    pub async fn leave(&self) -> Result<(), ChatError> {
        let Some(room_id) = self.state.room.lock().take() else {
            return Ok(());
        };
        let _ = self.state.events.send(ChatEvent::Left {
            room_id: room_id.clone(),
        });
        info!(room_id = %room_id, "left chat room");
        self.channel
            .request(&LeaveRoom { room_id }, None)
            .await
            .map(|_| ())
            .map_err(|e| {
                warn!(error = %e, "leave-room not acknowledged");
                e.into()
            })
    }

    /// Send `text` to the joined room. Surrounding whitespace is trimmed
    /// and blank text is ignored. Returns the client id of the sent message
    /// without waiting for the server; the acknowledgement is only logged.
    pub async fn send(&self, text: &str) -> Result<Option<String>, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        if !self.channel.is_connected() {
            return Err(ChatError::NotConnected);
        }
        self.require_login("send message")?;
        let room_id = self.current_room().ok_or(ChatError::NotJoined)?;

        let message = SendMessage {
            room_id,
            text: text.to_string(),
            client_id: new_id(),
        };
        let client_id = message.client_id.clone();
        let channel = self.channel.clone();
        tokio::spawn(async move {
            match channel.request(&message, None).await {
                Ok(_) => debug!(client_id = %message.client_id, "chat message acknowledged"),
                Err(e) => warn!(client_id = %message.client_id, error = %e, "chat message not acknowledged"),
            }
        });
        Ok(Some(client_id))
    }
}

impl Drop for ChatController {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn listen(
    mut incoming: broadcast::Receiver<SignalingEvent>,
    state: ChatState,
    shutdown: CancellationToken,
) {
    loop {
        let received = tokio::select! {
            _ = shutdown.cancelled() => break,
            received = incoming.recv() => received,
        };
        match received {
            Ok(SignalingEvent::Push { event, payload }) => match event.as_str() {
                events::CHAT_HISTORY => state.on_history(&payload),
                events::MESSAGE => state.on_message(&payload),
                _ => {}
            },
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "chat event stream lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}
