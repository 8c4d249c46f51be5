use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{BoxdeskError, Result};

/// Discord rejects message bodies longer than this many characters.
pub const MAX_MESSAGE_CHARS: usize = 2000;
const DEFAULT_MAX_RETRIES: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscordUser {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
    #[serde(default)]
    pub bot: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub filename: String,
    pub url: String,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordMessage {
    pub id: String,
    pub channel_id: String,
    #[serde(default)]
    pub guild_id: Option<String>,
    pub author: DiscordUser,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub mentions: Vec<DiscordUser>,
}

impl DiscordMessage {
    pub fn is_direct(&self) -> bool {
        self.guild_id.is_none()
    }
}

/// Pagination window for channel history; Discord caps `limit` at 100.
#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    pub limit: u8,
    pub before: Option<String>,
    pub after: Option<String>,
}

#[derive(Deserialize)]
struct RateLimited {
    #[serde(default)]
    retry_after: Option<f64>,
}

#[derive(Deserialize)]
struct ChannelId {
    id: String,
}

/// Outbound side of the chat platform, as seen by the handler, the alerting
/// and the feed watcher.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn send(&self, channel_id: &str, content: &str) -> Result<()>;
    async fn reply(&self, channel_id: &str, message_id: &str, content: &str) -> Result<()>;
    async fn typing(&self, channel_id: &str) -> Result<()>;
    /// Newest first, as the platform returns them.
    async fn recent_messages(&self, channel_id: &str, limit: u8) -> Result<Vec<DiscordMessage>>;
    async fn open_dm(&self, user_id: &str) -> Result<String>;
    async fn download(&self, url: &str) -> Result<Vec<u8>>;
}

/// REST v10 client authenticated as a bot user.
#[derive(Clone)]
pub struct DiscordClient {
    api_base: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl DiscordClient {
    pub fn new(token: &str, api_base: impl Into<String>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let value = HeaderValue::from_str(&format!("Bot {token}"))
            .map_err(|e| BoxdeskError::Config(e.to_string()))?;
        headers.insert(AUTHORIZATION, value);
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent("DiscordBot (boxdesk, 0.1)")
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| BoxdeskError::Runtime(e.to_string()))?;
        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            client,
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub async fn current_user(&self) -> Result<DiscordUser> {
        self.request(Method::GET, "/users/@me", &[], None).await
    }

    pub async fn channel_messages(
        &self,
        channel_id: &str,
        query: &HistoryQuery,
    ) -> Result<Vec<DiscordMessage>> {
        let mut params = vec![("limit", query.limit.clamp(1, 100).to_string())];
        if let Some(before) = &query.before {
            params.push(("before", before.clone()));
        }
        if let Some(after) = &query.after {
            params.push(("after", after.clone()));
        }
        self.request(
            Method::GET,
            &format!("/channels/{channel_id}/messages"),
            &params,
            None,
        )
        .await
    }

    pub async fn send_message(
        &self,
        channel_id: &str,
        content: &str,
        reply_to: Option<&str>,
    ) -> Result<DiscordMessage> {
        let mut body = json!({ "content": content });
        if let Some(message_id) = reply_to {
            body["message_reference"] = json!({ "message_id": message_id, "fail_if_not_exists": false });
        }
        self.request(
            Method::POST,
            &format!("/channels/{channel_id}/messages"),
            &[],
            Some(body),
        )
        .await
    }

    async fn send_chunks(&self, channel_id: &str, content: &str, reply_to: Option<&str>) -> Result<()> {
        for (index, chunk) in split_message(content, MAX_MESSAGE_CHARS).iter().enumerate() {
            let reference = if index == 0 { reply_to } else { None };
            self.send_message(channel_id, chunk, reference).await?;
        }
        Ok(())
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<Value>,
    ) -> Result<T> {
        let text = self.request_text(method, path, query, body).await?;
        serde_json::from_str(&text).map_err(|e| BoxdeskError::Serialization(e.to_string()))
    }

    /// Sends the request, sleeping through 429 responses up to `max_retries` times.
    async fn request_text(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<Value>,
    ) -> Result<String> {
        let url = format!("{}{}", self.api_base, path);
        let mut attempt = 0;
        loop {
            let mut request = self.client.request(method.clone(), &url).query(query);
            if let Some(body) = &body {
                request = request.json(body);
            }
            let response = request
                .send()
                .await
                .map_err(|e| BoxdeskError::Http(e.to_string()))?;
            let status = response.status();
            let header_wait = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<f64>().ok());
            let text = response
                .text()
                .await
                .map_err(|e| BoxdeskError::Http(e.to_string()))?;

            if status == StatusCode::TOO_MANY_REQUESTS && attempt < self.max_retries {
                attempt += 1;
                let wait = serde_json::from_str::<RateLimited>(&text)
                    .ok()
                    .and_then(|r| r.retry_after)
                    .or(header_wait)
                    .unwrap_or(1.0);
                tracing::warn!(path, wait, attempt, "rate limited by discord");
                tokio::time::sleep(Duration::from_secs_f64(wait.max(0.0))).await;
                continue;
            }
            if !status.is_success() {
                return Err(BoxdeskError::Upstream(format!(
                    "discord returned {status} for {path}: {text}"
                )));
            }
            return Ok(text);
        }
    }
}

#[async_trait]
impl ChatPlatform for DiscordClient {
    async fn send(&self, channel_id: &str, content: &str) -> Result<()> {
        self.send_chunks(channel_id, content, None).await
    }

    async fn reply(&self, channel_id: &str, message_id: &str, content: &str) -> Result<()> {
        self.send_chunks(channel_id, content, Some(message_id)).await
    }

    async fn typing(&self, channel_id: &str) -> Result<()> {
        self.request_text(
            Method::POST,
            &format!("/channels/{channel_id}/typing"),
            &[],
            None,
        )
        .await?;
        Ok(())
    }

    async fn recent_messages(&self, channel_id: &str, limit: u8) -> Result<Vec<DiscordMessage>> {
        self.channel_messages(
            channel_id,
            &HistoryQuery {
                limit,
                ..HistoryQuery::default()
            },
        )
        .await
    }

    async fn open_dm(&self, user_id: &str) -> Result<String> {
        let channel: ChannelId = self
            .request(
                Method::POST,
                "/users/@me/channels",
                &[],
                Some(json!({ "recipient_id": user_id })),
            )
            .await?;
        Ok(channel.id)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        // Attachment URLs live on the CDN and must not carry the bot token.
        let response = reqwest::get(url)
            .await
            .map_err(|e| BoxdeskError::Http(e.to_string()))?;
        if !response.status().is_success() {
            return Err(BoxdeskError::Upstream(format!(
                "attachment download returned {}",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| BoxdeskError::Http(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Splits on line boundaries where possible so no chunk exceeds `max_chars`.
pub fn split_message(content: &str, max_chars: usize) -> Vec<String> {
    if content.chars().count() <= max_chars {
        return vec![content.to_string()];
    }
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    for line in content.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len > max_chars {
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(max_chars) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }
        current.push_str(line);
        current_len += line_len;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
