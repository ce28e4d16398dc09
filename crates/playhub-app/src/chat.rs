//! `playhub chat`: join one room, print traffic, send stdin lines.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use playhub_common::{PlayhubError, Result};
use playhub_config::PlayhubConfig;
use playhub_social::{
    ChatController, ChatEvent, ChatMessage, SignalingChannel, SignalingEvent, WsSignaling,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::cli::Args;
use crate::settings;

const QUIT_COMMAND: &str = "/quit";

pub async fn run(config: &PlayhubConfig, args: &Args, room: &str) -> Result<()> {
    let signaling = settings::signaling_config(config, args);
    let connect_timeout = signaling.connect_timeout;
    info!(url = %signaling.url, "Connecting to signaling server");

    let transport = Arc::new(WsSignaling::connect(signaling));
    let channel = SignalingChannel::new(transport.clone())
        .with_call_timeout(settings::call_timeout(config));

    let outcome = async {
        wait_connected(&channel, connect_timeout).await?;
        let identity = Arc::new(settings::identity_provider(config, args));
        let chat = ChatController::new(channel.clone(), identity, settings::chat_history(config));
        let printer = tokio::spawn(print_events(chat.subscribe()));

        chat.join(room).await?;
        let result = relay_stdin(&chat).await;
        if let Err(e) = chat.leave().await {
            warn!("Leaving chat failed: {e}");
        }
        printer.abort();
        result
    }
    .await;

    transport.disconnect();
    outcome
}

async fn wait_connected(channel: &SignalingChannel, limit: Duration) -> Result<()> {
    let mut events = channel.subscribe();
    if channel.is_connected() {
        return Ok(());
    }
    let wait = async {
        loop {
            match events.recv().await {
                Ok(SignalingEvent::Connected) => return Ok(()),
                Ok(SignalingEvent::Error(e)) => warn!("Signaling error: {e}"),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(PlayhubError::Signaling("connection task stopped".into()))
                }
            }
        }
    };
    tokio::time::timeout(limit, wait)
        .await
        .map_err(|_| PlayhubError::Signaling(format!("not connected after {limit:?}")))?
}

async fn relay_stdin(chat: &ChatController) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                return Ok(());
            }
        };
        let Some(line) = line else { return Ok(()) };
        if line.trim() == QUIT_COMMAND {
            return Ok(());
        }
        // A failed send is reported but does not end the session.
        if let Err(e) = chat.send(&line).await {
            eprintln!("! {e}");
        }
    }
}

async fn print_events(mut events: broadcast::Receiver<ChatEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => println!("{}", render_event(&event)),
            Err(broadcast::error::RecvError::Lagged(n)) => warn!("Dropped {n} chat events"),
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

fn render_event(event: &ChatEvent) -> String {
    match event {
        ChatEvent::Joined { room_id } => format!("* joined #{room_id}"),
        ChatEvent::Left { room_id } => format!("* left #{room_id}"),
        ChatEvent::HistoryReplaced { room_id, count } => {
            format!("* #{room_id}: {count} earlier messages")
        }
        ChatEvent::MessageReceived(msg) => render_message(msg),
    }
}

fn render_message(msg: &ChatMessage) -> String {
    let time = msg
        .sent_at()
        .map(|at| at.with_timezone(&Local).format("%H:%M").to_string())
        .unwrap_or_else(|| "--:--".into());
    format!("[{time}] {}: {}", msg.from, msg.text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(ts: i64) -> ChatMessage {
        ChatMessage {
            id: Some("m1".into()),
            room_id: "lobby".into(),
            from: "Ada".into(),
            text: "hello".into(),
            ts,
        }
    }

    #[test]
    fn message_line_has_sender_and_text() {
        let line = render_message(&message(1_700_000_000_000));
        assert!(line.ends_with("] Ada: hello"), "{line}");
        assert!(line.starts_with('['));
    }

    #[test]
    fn out_of_range_timestamp_renders_placeholder() {
        assert_eq!(render_message(&message(i64::MAX)), "[--:--] Ada: hello");
    }

    #[test]
    fn room_events_render() {
        assert_eq!(
            render_event(&ChatEvent::Joined {
                room_id: "lobby".into()
            }),
            "* joined #lobby"
        );
        assert_eq!(
            render_event(&ChatEvent::HistoryReplaced {
                room_id: "lobby".into(),
                count: 3
            }),
            "* #lobby: 3 earlier messages"
        );
    }
}
