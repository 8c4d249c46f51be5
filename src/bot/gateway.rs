//! Discord gateway session over a websocket.
//!
//! Only the pieces the bot needs: HELLO, heartbeats, IDENTIFY, READY and
//! MESSAGE_CREATE. Any close, RECONNECT or INVALID_SESSION ends the session
//! and a fresh one is opened after `reconnect_delay`.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::bot::discord::{DiscordMessage, DiscordUser};
use crate::error::{BoxdeskError, Result};

pub const INTENT_GUILDS: u64 = 1 << 0;
pub const INTENT_GUILD_MESSAGES: u64 = 1 << 9;
pub const INTENT_DIRECT_MESSAGES: u64 = 1 << 12;
pub const INTENT_MESSAGE_CONTENT: u64 = 1 << 15;
pub const DEFAULT_INTENTS: u64 =
    INTENT_GUILDS | INTENT_GUILD_MESSAGES | INTENT_DIRECT_MESSAGES | INTENT_MESSAGE_CONTENT;

const OP_DISPATCH: u8 = 0;
const OP_HEARTBEAT: u8 = 1;
const OP_IDENTIFY: u8 = 2;
const OP_RECONNECT: u8 = 7;
const OP_INVALID_SESSION: u8 = 9;
const OP_HELLO: u8 = 10;
const OP_HEARTBEAT_ACK: u8 = 11;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayPayload {
    pub op: u8,
    #[serde(default)]
    pub d: Value,
    #[serde(default)]
    pub s: Option<u64>,
    #[serde(default)]
    pub t: Option<String>,
}

#[derive(Debug, Clone)]
pub enum GatewayEvent {
    Ready(DiscordUser),
    MessageCreate(Box<DiscordMessage>),
}

pub fn identify_payload(token: &str, intents: u64) -> Value {
    json!({
        "op": OP_IDENTIFY,
        "d": {
            "token": token,
            "intents": intents,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "boxdesk",
                "device": "boxdesk"
            }
        }
    })
}

pub fn heartbeat_payload(sequence: Option<u64>) -> Value {
    json!({ "op": OP_HEARTBEAT, "d": sequence })
}

/// Maps a dispatch payload to the events the bot cares about.
pub fn dispatch_event(payload: &GatewayPayload) -> Option<GatewayEvent> {
    if payload.op != OP_DISPATCH {
        return None;
    }
    match payload.t.as_deref()? {
        "READY" => serde_json::from_value(payload.d.get("user")?.clone())
            .ok()
            .map(GatewayEvent::Ready),
        "MESSAGE_CREATE" => serde_json::from_value(payload.d.clone())
            .ok()
            .map(|m| GatewayEvent::MessageCreate(Box::new(m))),
        _ => None,
    }
}

pub struct Gateway {
    url: String,
    token: String,
    intents: u64,
    reconnect_delay: Duration,
}

impl Gateway {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            intents: DEFAULT_INTENTS,
            reconnect_delay: Duration::from_secs(5),
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Keeps a session open until the receiver is dropped.
    pub async fn run(self, events: mpsc::Sender<GatewayEvent>) {
        loop {
            match self.session(&events).await {
                Ok(()) => tracing::info!("gateway session ended"),
                Err(err) => tracing::warn!(error = %err, "gateway session failed"),
            }
            if events.is_closed() {
                return;
            }
            tokio::time::sleep(self.reconnect_delay).await;
        }
    }

    async fn session(&self, events: &mpsc::Sender<GatewayEvent>) -> Result<()> {
        let (stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| BoxdeskError::Http(e.to_string()))?;
        let (mut write, mut read) = stream.split();

        let hello = next_payload(&mut read)
            .await?
            .ok_or_else(|| BoxdeskError::Upstream("gateway closed before HELLO".to_string()))?;
        if hello.op != OP_HELLO {
            return Err(BoxdeskError::Upstream(format!(
                "expected HELLO, got op {}",
                hello.op
            )));
        }
        let interval_ms = hello
            .d
            .get("heartbeat_interval")
            .and_then(Value::as_u64)
            .unwrap_or(41_250);

        send(&mut write, &identify_payload(&self.token, self.intents)).await?;

        let mut heartbeat = tokio::time::interval(Duration::from_millis(interval_ms));
        heartbeat.tick().await;
        let mut sequence: Option<u64> = None;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    send(&mut write, &heartbeat_payload(sequence)).await?;
                }
                payload = next_payload(&mut read) => {
                    let Some(payload) = payload? else {
                        return Ok(());
                    };
                    if payload.s.is_some() {
                        sequence = payload.s;
                    }
                    match payload.op {
                        OP_DISPATCH => {
                            if let Some(event) = dispatch_event(&payload) {
                                if let GatewayEvent::Ready(user) = &event {
                                    tracing::info!(user = %user.username, "gateway ready");
                                }
                                if events.send(event).await.is_err() {
                                    return Ok(());
                                }
                            }
                        }
                        OP_HEARTBEAT => send(&mut write, &heartbeat_payload(sequence)).await?,
                        OP_HEARTBEAT_ACK => {}
                        OP_RECONNECT | OP_INVALID_SESSION => {
                            tracing::info!(op = payload.op, "gateway asked to reconnect");
                            return Ok(());
                        }
                        other => tracing::debug!(op = other, "ignoring gateway opcode"),
                    }
                }
            }
        }
    }
}

async fn send<S>(write: &mut S, payload: &Value) -> Result<()>
where
    S: futures::Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    write
        .send(Message::Text(payload.to_string()))
        .await
        .map_err(|e| BoxdeskError::Http(e.to_string()))
}

/// Next JSON payload, skipping pings and binary frames. `None` on close.
async fn next_payload<S, E>(read: &mut S) -> Result<Option<GatewayPayload>>
where
    S: futures::Stream<Item = std::result::Result<Message, E>> + Unpin,
    E: std::fmt::Display,
{
    while let Some(message) = read.next().await {
        match message.map_err(|e| BoxdeskError::Http(e.to_string()))? {
            Message::Text(text) => return Ok(Some(serde_json::from_str(&text)?)),
            Message::Close(frame) => {
                tracing::info!(?frame, "gateway closed the connection");
                return Ok(None);
            }
            _ => continue,
        }
    }
    Ok(None)
}
