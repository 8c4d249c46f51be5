pub mod discord;
pub mod feed;
pub mod gateway;
pub mod handler;
pub mod monitor;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::client::ApiClient;
use crate::config::Config;
use crate::error::Result;
use crate::interfaces::assistant::AssistantBackend;
use crate::providers::openai::OpenAiAssistantClient;

use discord::{ChatPlatform, DiscordClient};
use feed::{FeedWatcher, SeenStore};
use gateway::{Gateway, GatewayEvent};
use handler::{DocumentSink, MessageHandler};
use monitor::{AlertNotifier, MetricsMonitor};

/// Uploads need both an OpenAI key and a vector store id.
fn document_sink(config: &Config) -> Result<Option<DocumentSink>> {
    let (Some(key), Some(store)) = (
        config.openai.api_key.as_deref(),
        config.openai.vector_store_id.clone(),
    ) else {
        return Ok(None);
    };
    let backend: Arc<dyn AssistantBackend> = Arc::new(OpenAiAssistantClient::new(
        key,
        Some(config.openai.base_url.clone()),
        Some(config.openai.image_model.clone()),
    )?);
    Ok(Some(DocumentSink {
        backend,
        vector_store_id: store,
    }))
}

fn start_background_tasks(config: &Config, platform: Arc<dyn ChatPlatform>) -> Result<()> {
    let monitoring = &config.monitoring;
    if monitoring.enabled {
        match monitoring.metrics_url.clone() {
            Some(url) => {
                let notifier = AlertNotifier::new(
                    platform.clone(),
                    monitoring.channel_id.clone(),
                    monitoring.user_id.clone(),
                );
                let monitor = MetricsMonitor::new(monitoring.failure_threshold);
                let interval = monitoring.interval();
                tokio::spawn(async move {
                    if let Err(err) = monitor::run_monitor(monitor, notifier, url, interval).await {
                        tracing::error!(error = %err, "metrics monitor stopped");
                    }
                });
            }
            None => tracing::warn!("monitoring enabled but no metrics url is configured"),
        }
    }

    let feed = &config.feed;
    if let (Some(subreddit), Some(user_id)) = (feed.subreddit.clone(), feed.notify_user_id.clone()) {
        let watcher = FeedWatcher::new(&feed.reddit_base, &subreddit, feed.limit)?;
        let seen_file = feed.seen_file.clone();
        let interval = Duration::from_secs(feed.interval_seconds.max(1));
        tokio::spawn(async move {
            let result = async {
                let seen = SeenStore::load(&seen_file).await?;
                feed::run_feed(watcher, seen, platform, user_id, interval).await
            };
            if let Err(err) = result.await {
                tracing::error!(error = %err, "feed watcher stopped");
            }
        });
    }
    Ok(())
}

/// Connects to the gateway and answers messages until the process is stopped.
pub async fn run(config: Config) -> Result<()> {
    let token = config.require_discord_token()?.to_string();
    let api = ApiClient::new(config.require_api_url()?)?;
    let client = DiscordClient::new(&token, config.discord.api_base.clone())?;
    let platform: Arc<dyn ChatPlatform> = Arc::new(client);
    let mut documents = document_sink(&config)?;

    let (tx, mut rx) = mpsc::channel(64);
    let gateway = Gateway::new(config.discord.gateway_url.clone(), token);
    tokio::spawn(gateway.run(tx));

    let mut handler: Option<Arc<MessageHandler>> = None;
    while let Some(event) = rx.recv().await {
        match event {
            GatewayEvent::Ready(user) => {
                if handler.is_some() {
                    continue;
                }
                tracing::info!(user = %user.username, api = api.base_url(), "bot connected");
                handler = Some(Arc::new(MessageHandler::new(
                    user,
                    platform.clone(),
                    api.clone(),
                    documents.take(),
                    config.discord.always_respond_user_ids.clone(),
                )));
                start_background_tasks(&config, platform.clone())?;
            }
            GatewayEvent::MessageCreate(message) => {
                let Some(handler) = handler.clone() else {
                    continue;
                };
                tokio::spawn(async move {
                    if let Err(err) = handler.handle(&message).await {
                        tracing::warn!(channel = %message.channel_id, error = %err, "message handling failed");
                    }
                });
            }
        }
    }
    Ok(())
}
