use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use crate::error::ChatError;
use crate::voting::session::SessionHandle;

/// One inbound chat message, already stripped of transport framing. The
/// transport itself (IRC, websocket, whatever) lives outside this process.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub sender: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Parse one bridge line. `user<TAB>text` preferred; `user: text` accepted
/// for hand-typed testing.
pub fn parse_bridge_line(line: &str) -> Option<ChatMessage> {
    let line = line.trim_end_matches(['\r', '\n']);
    let (sender, text) = line.split_once('\t').or_else(|| line.split_once(": "))?;
    let sender = sender.trim();
    let text = text.trim();
    if sender.is_empty() || text.is_empty() {
        return None;
    }
    Some(ChatMessage::new(sender, text))
}

/// Accept chat-transport connections and feed their lines into the session
/// engine, in arrival order, one at a time per connection.
pub async fn run_chat_bridge(bind_addr: &str, session: SessionHandle) -> Result<(), ChatError> {
    let listener = TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %bind_addr, "Chat bridge listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        tracing::info!(peer = %peer, "Chat bridge client connected");
        let session = session.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_chat_client(stream, session).await {
                tracing::warn!(peer = %peer, error = %e, "Chat bridge client failed");
            }
            tracing::info!(peer = %peer, "Chat bridge client disconnected");
        });
    }
}

async fn handle_chat_client(stream: TcpStream, session: SessionHandle) -> Result<(), ChatError> {
    let mut lines = BufReader::new(stream).lines();
    while let Some(line) = lines.next_line().await? {
        if let Some(message) = parse_bridge_line(&line) {
            tracing::trace!(sender = %message.sender, at = %message.timestamp, "Chat line received");
            session.chat_message(message).await;
        }
    }
    Ok(())
}
