//! Chat history management.
//!
//! Stores messages per room with a bounded ring buffer so memory
//! usage stays predictable.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const ANONYMOUS_SENDER: &str = "Anon";

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Option<String>,
    pub room_id: String,
    /// Sender display name.
    pub from: String,
    pub text: String,
    /// Milliseconds since the Unix epoch.
    pub ts: i64,
}

impl ChatMessage {
    /// Normalize a server payload. Returns `None` when it carries no text.
    ///
    /// The sender is `from.name`, else `username`, else `"Anon"`; the
    /// timestamp is `ts`, else `created_at`, else now.
    pub fn from_payload(room_id: &str, payload: &Value) -> Option<Self> {
        let text = payload.get("text")?.as_str()?.to_string();
        let id = match payload.get("id") {
            Some(Value::String(id)) => Some(id.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        let from = payload
            .get("from")
            .and_then(|f| f.get("name"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .or_else(|| {
                payload
                    .get("username")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
            })
            .unwrap_or(ANONYMOUS_SENDER)
            .to_string();
        let ts = payload
            .get("ts")
            .and_then(timestamp_millis)
            .or_else(|| payload.get("created_at").and_then(timestamp_millis))
            .unwrap_or_else(|| Utc::now().timestamp_millis());

        Some(Self {
            id,
            room_id: room_id.to_string(),
            from,
            text,
            ts,
        })
    }

    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.ts)
    }
}

/// Epoch milliseconds or an RFC 3339 string.
fn timestamp_millis(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .filter(|ms| *ms > 0),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.timestamp_millis()),
        _ => None,
    }
}

/// Configuration for chat history storage.
#[derive(Debug, Clone)]
pub struct ChatHistoryConfig {
    /// Maximum messages to retain per room.
    pub max_messages_per_room: usize,
}

impl Default for ChatHistoryConfig {
    fn default() -> Self {
        Self {
            max_messages_per_room: 500,
        }
    }
}

/// In-memory chat history, keyed by room id.
#[derive(Debug)]
pub struct ChatHistory {
    config: ChatHistoryConfig,
    rooms: HashMap<String, VecDeque<ChatMessage>>,
}

impl ChatHistory {
    pub fn new(config: ChatHistoryConfig) -> Self {
        Self {
            config,
            rooms: HashMap::new(),
        }
    }

    /// Push a message into its room. Oldest messages are evicted when the
    /// buffer is full.
    pub fn push(&mut self, msg: ChatMessage) {
        let limit = self.config.max_messages_per_room.max(1);
        let buf = self.rooms.entry(msg.room_id.clone()).or_default();
        while buf.len() >= limit {
            buf.pop_front();
        }
        buf.push_back(msg);
    }

    /// Replace a room's history, keeping only the newest messages that fit.
    pub fn replace(&mut self, room_id: &str, messages: Vec<ChatMessage>) {
        self.rooms.remove(room_id);
        for msg in messages {
            self.push(msg);
        }
    }

    /// Get the most recent `limit` messages from a room (oldest first).
    pub fn recent(&self, room_id: &str, limit: usize) -> Vec<&ChatMessage> {
        match self.rooms.get(room_id) {
            Some(buf) => {
                let skip = buf.len().saturating_sub(limit);
                buf.iter().skip(skip).collect()
            }
            None => Vec::new(),
        }
    }

    pub fn all(&self, room_id: &str) -> Vec<&ChatMessage> {
        match self.rooms.get(room_id) {
            Some(buf) => buf.iter().collect(),
            None => Vec::new(),
        }
    }

    pub fn clear_room(&mut self, room_id: &str) {
        self.rooms.remove(room_id);
    }

    pub fn clear_all(&mut self) {
        self.rooms.clear();
    }

    /// Rooms that have messages.
    pub fn active_rooms(&self) -> Vec<&str> {
        self.rooms.keys().map(|s| s.as_str()).collect()
    }

    /// Total number of stored messages across all rooms.
    pub fn total_messages(&self) -> usize {
        self.rooms.values().map(|b| b.len()).sum()
    }
}

impl Default for ChatHistory {
    fn default() -> Self {
        Self::new(ChatHistoryConfig::default())
    }
}
