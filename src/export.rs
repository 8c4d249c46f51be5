use std::path::Path;

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::bot::discord::{DiscordClient, HistoryQuery};
use crate::error::{BoxdeskError, Result};

const PAGE_SIZE: u8 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedMessage {
    pub user_id: String,
    pub username: String,
    pub display_name: String,
    pub timestamp: String,
    pub content: String,
}

/// Re-renders a platform timestamp as RFC 3339; unparseable values pass through.
pub fn normalize_timestamp(raw: &str) -> String {
    match OffsetDateTime::parse(raw, &Rfc3339) {
        Ok(ts) => ts.format(&Rfc3339).unwrap_or_else(|_| raw.to_string()),
        Err(_) => raw.to_string(),
    }
}

/// Whole channel history, newest first, paging backwards until an empty page.
pub async fn export_channel(client: &DiscordClient, channel_id: &str) -> Result<Vec<ExportedMessage>> {
    let mut exported = Vec::new();
    let mut query = HistoryQuery {
        limit: PAGE_SIZE,
        ..HistoryQuery::default()
    };
    loop {
        let page = client.channel_messages(channel_id, &query).await?;
        let Some(last) = page.last() else {
            break;
        };
        query.before = Some(last.id.clone());
        tracing::debug!(channel_id, fetched = page.len(), "history page");
        exported.extend(page.into_iter().map(|message| ExportedMessage {
            user_id: message.author.id,
            username: message.author.username,
            display_name: message.author.global_name.unwrap_or_default(),
            timestamp: normalize_timestamp(&message.timestamp),
            content: message.content,
        }));
    }
    tracing::info!(channel_id, count = exported.len(), "channel exported");
    Ok(exported)
}

pub async fn write_json(path: impl AsRef<Path>, messages: &[ExportedMessage]) -> Result<()> {
    let body = serde_json::to_string_pretty(messages)?;
    tokio::fs::write(path, body)
        .await
        .map_err(|e| BoxdeskError::Runtime(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_are_rendered_in_rfc3339() {
        assert_eq!(
            normalize_timestamp("2025-03-01T10:15:00.000000+00:00"),
            "2025-03-01T10:15:00Z"
        );
        assert_eq!(normalize_timestamp("yesterday"), "yesterday");
    }
}
