use std::collections::HashSet;
use std::sync::Arc;

use crate::assistant::{AskRequest, HistoryMessage};
use crate::bot::discord::{ChatPlatform, DiscordMessage, DiscordUser};
use crate::client::{ApiClient, AskOutcome};
use crate::error::{BoxdeskError, Result};
use crate::interfaces::assistant::AssistantBackend;

pub const HISTORY_LIMIT: u8 = 15;
pub const EMPTY_QUESTION: &str = "You need to ask a question.";
pub const FILE_RECEIVED: &str = "File received. Processing...";
pub const SERVICE_UNAVAILABLE: &str = "Service unavailable: database offline";
pub const API_ERROR: &str = "API error.";

/// Where uploaded attachments end up.
pub struct DocumentSink {
    pub backend: Arc<dyn AssistantBackend>,
    pub vector_store_id: String,
}

/// Decides whether and how the bot answers an incoming message.
pub struct MessageHandler {
    bot: DiscordUser,
    platform: Arc<dyn ChatPlatform>,
    api: ApiClient,
    documents: Option<DocumentSink>,
    always_respond: HashSet<String>,
}

impl MessageHandler {
    pub fn new(
        bot: DiscordUser,
        platform: Arc<dyn ChatPlatform>,
        api: ApiClient,
        documents: Option<DocumentSink>,
        always_respond: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            bot,
            platform,
            api,
            documents,
            always_respond: always_respond.into_iter().collect(),
        }
    }

    fn mentions_bot(&self, message: &DiscordMessage) -> bool {
        message.mentions.iter().any(|user| user.id == self.bot.id)
            || message.content.contains(&format!("<@{}>", self.bot.id))
            || message.content.contains(&format!("<@!{}>", self.bot.id))
    }

    pub fn should_respond(&self, message: &DiscordMessage) -> bool {
        if message.author.id == self.bot.id {
            return false;
        }
        message.is_direct()
            || self.mentions_bot(message)
            || self.always_respond.contains(&message.author.id)
    }

    /// Message text without the bot mention, trimmed.
    pub fn question(&self, message: &DiscordMessage) -> String {
        if message.is_direct() {
            return message.content.trim().to_string();
        }
        message
            .content
            .replace(&format!("<@!{}>", self.bot.id), "")
            .replace(&format!("<@{}>", self.bot.id), "")
            .trim()
            .to_string()
    }

    /// Oldest first, skipping messages without text.
    pub fn history(&self, recent: Vec<DiscordMessage>) -> Vec<HistoryMessage> {
        recent
            .into_iter()
            .rev()
            .filter(|m| !m.content.trim().is_empty())
            .map(|m| HistoryMessage {
                role: Some(if m.author.id == self.bot.id {
                    "assistant".to_string()
                } else {
                    "user".to_string()
                }),
                content: m.content,
                author: Some(m.author.username),
            })
            .collect()
    }

    pub async fn handle(&self, message: &DiscordMessage) -> Result<()> {
        if !self.should_respond(message) {
            return Ok(());
        }
        let channel = message.channel_id.as_str();

        if !message.attachments.is_empty() {
            self.platform.send(channel, FILE_RECEIVED).await?;
            for attachment in &message.attachments {
                let text = match self.ingest(&attachment.url, &attachment.filename).await {
                    Ok(()) => format!("File added to the vector store: {}", attachment.filename),
                    Err(err) => {
                        tracing::warn!(file = %attachment.filename, error = %err, "attachment upload failed");
                        format!("Could not add the file: {err}")
                    }
                };
                self.platform.send(channel, &text).await?;
            }
            return Ok(());
        }

        let question = self.question(message);
        if question.is_empty() {
            return self.platform.send(channel, EMPTY_QUESTION).await;
        }

        if let Err(err) = self.platform.typing(channel).await {
            tracing::debug!(error = %err, "typing indicator failed");
        }
        let history = match self.platform.recent_messages(channel, HISTORY_LIMIT).await {
            Ok(recent) => self.history(recent),
            Err(err) => {
                tracing::warn!(channel, error = %err, "could not read channel history");
                Vec::new()
            }
        };
        let request = AskRequest {
            message: question,
            user_id: message.author.id.clone(),
            history,
        };

        match self.api.ask(&request).await {
            Ok(AskOutcome::Answer(answer)) if message.is_direct() => {
                self.platform.send(channel, &answer).await
            }
            Ok(AskOutcome::Answer(answer)) => {
                self.platform.reply(channel, &message.id, &answer).await
            }
            Ok(AskOutcome::Unavailable) => self.platform.send(channel, SERVICE_UNAVAILABLE).await,
            Ok(AskOutcome::Failed(_)) => self.platform.send(channel, API_ERROR).await,
            Err(err) => self.platform.send(channel, &format!("Error: {err}")).await,
        }
    }

    async fn ingest(&self, url: &str, filename: &str) -> Result<()> {
        let sink = self
            .documents
            .as_ref()
            .ok_or_else(|| BoxdeskError::Config("no vector store configured".to_string()))?;
        let bytes = self.platform.download(url).await?;
        sink.backend
            .upload_to_vector_store(&sink.vector_store_id, filename, bytes)
            .await?;
        Ok(())
    }
}
