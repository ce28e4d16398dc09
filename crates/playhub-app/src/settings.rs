//! Effective runtime settings: config file values with CLI overrides.

use std::time::Duration;

use playhub_config::PlayhubConfig;
use playhub_social::{ChatHistoryConfig, Identity, SignalingConfig, StaticIdentity};

use crate::cli::Args;

pub fn signaling_config(config: &PlayhubConfig, args: &Args) -> SignalingConfig {
    let settings = &config.signaling;
    let identity = local_identity(config, args);
    SignalingConfig {
        url: args.url.clone().unwrap_or_else(|| settings.url.clone()),
        access_token: settings.access_token.clone(),
        user_id: identity.as_ref().map(|id| id.user_id.clone()),
        display_name: identity.map(|id| id.display_name),
        connect_timeout: Duration::from_secs(settings.connect_timeout_secs),
        heartbeat_interval: Duration::from_secs(settings.heartbeat_interval_secs),
        reconnect_delay: Duration::from_secs(settings.reconnect_delay_secs),
        max_reconnect_delay: Duration::from_secs(settings.max_reconnect_delay_secs),
    }
}

pub fn call_timeout(config: &PlayhubConfig) -> Duration {
    Duration::from_millis(config.signaling.call_timeout_ms)
}

pub fn chat_history(config: &PlayhubConfig) -> ChatHistoryConfig {
    ChatHistoryConfig {
        max_messages_per_room: config.chat.max_messages_per_room as usize,
    }
}

/// The signed-in user, if a user id is known. Without a display name the
/// user id is shown.
pub fn local_identity(config: &PlayhubConfig, args: &Args) -> Option<Identity> {
    let user_id = args
        .user_id
        .clone()
        .or_else(|| config.identity.user_id.clone())?;
    let display_name = args
        .display_name
        .clone()
        .or_else(|| config.identity.display_name.clone())
        .unwrap_or_else(|| user_id.clone());
    let identity = Identity::new(user_id, display_name);
    Some(match &config.signaling.access_token {
        Some(token) => identity.with_access_token(token.clone()),
        None => identity,
    })
}

pub fn identity_provider(config: &PlayhubConfig, args: &Args) -> StaticIdentity {
    match local_identity(config, args) {
        Some(identity) => StaticIdentity::signed_in(identity),
        None => StaticIdentity::anonymous(),
    }
}
