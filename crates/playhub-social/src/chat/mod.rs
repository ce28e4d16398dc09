//! Text chat: room membership, message history and sending.

mod controller;
mod history;

pub use controller::{ChatController, ChatEvent};
pub use history::{ChatHistory, ChatHistoryConfig, ChatMessage};
