use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tokio::io::AsyncWriteExt;

use crate::bot::discord::ChatPlatform;
use crate::error::{BoxdeskError, Result};

/// Post ids already announced, persisted one per line.
pub struct SeenStore {
    path: PathBuf,
    ids: HashSet<String>,
}

impl SeenStore {
    /// Reads the file if it exists; a missing file is an empty store.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let ids = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashSet::new(),
            Err(err) => return Err(BoxdeskError::Runtime(err.to_string())),
        };
        Ok(Self { path, ids })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Appends `id` to the file. Returns false if it was already recorded.
    pub async fn insert(&mut self, id: &str) -> Result<bool> {
        if self.ids.contains(id) {
            return Ok(false);
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| BoxdeskError::Runtime(e.to_string()))?;
        file.write_all(format!("{id}\n").as_bytes())
            .await
            .map_err(|e| BoxdeskError::Runtime(e.to_string()))?;
        self.ids.insert(id.to_string());
        Ok(true)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FeedPost {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<ListingChild>,
}

#[derive(Deserialize)]
struct ListingChild {
    data: FeedPost,
}

/// Watches the newest posts of one subreddit through the public JSON listing.
pub struct FeedWatcher {
    client: reqwest::Client,
    base_url: String,
    subreddit: String,
    limit: usize,
}

impl FeedWatcher {
    pub fn new(base_url: &str, subreddit: &str, limit: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("boxdesk-feed/0.1")
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| BoxdeskError::Runtime(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            subreddit: subreddit.to_string(),
            limit: limit.max(1),
        })
    }

    pub fn subreddit(&self) -> &str {
        &self.subreddit
    }

    pub async fn newest(&self) -> Result<Vec<FeedPost>> {
        let url = format!("{}/r/{}/new.json", self.base_url, self.subreddit);
        let response = self
            .client
            .get(url)
            .query(&[("limit", self.limit.to_string())])
            .send()
            .await
            .map_err(|e| BoxdeskError::Http(e.to_string()))?;
        if !response.status().is_success() {
            return Err(BoxdeskError::Upstream(format!(
                "feed returned {}",
                response.status()
            )));
        }
        let listing: Listing = response
            .json()
            .await
            .map_err(|e| BoxdeskError::Serialization(e.to_string()))?;
        Ok(listing
            .data
            .children
            .into_iter()
            .map(|child| child.data)
            .take(self.limit)
            .collect())
    }

    pub fn announcement(&self, post: &FeedPost) -> String {
        format!(
            "New post on r/{}: **{}**\n{}",
            self.subreddit, post.title, post.url
        )
    }

    /// Sends every unseen post to `channel_id` and records it. Returns how many were sent.
    pub async fn poll_once(
        &self,
        seen: &mut SeenStore,
        platform: &dyn ChatPlatform,
        channel_id: &str,
    ) -> Result<usize> {
        let mut sent = 0;
        for post in self.newest().await? {
            if seen.contains(&post.id) {
                continue;
            }
            platform.send(channel_id, &self.announcement(&post)).await?;
            seen.insert(&post.id).await?;
            sent += 1;
        }
        Ok(sent)
    }
}

pub async fn run_feed(
    watcher: FeedWatcher,
    mut seen: SeenStore,
    platform: std::sync::Arc<dyn ChatPlatform>,
    user_id: String,
    interval: Duration,
) -> Result<()> {
    let channel_id = platform.open_dm(&user_id).await?;
    tracing::info!(subreddit = watcher.subreddit(), seen = seen.len(), "feed watcher started");
    loop {
        match watcher.poll_once(&mut seen, platform.as_ref(), &channel_id).await {
            Ok(0) => {}
            Ok(sent) => tracing::info!(sent, "feed posts announced"),
            Err(err) => tracing::warn!(error = %err, "feed poll failed"),
        }
        tokio::time::sleep(interval).await;
    }
}
