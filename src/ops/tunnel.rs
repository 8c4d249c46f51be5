use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{BoxdeskError, Result};

pub const DEFAULT_INSPECT_URL: &str = "http://localhost:4040";

#[derive(Debug, Deserialize)]
struct TunnelList {
    #[serde(default)]
    tunnels: Vec<Tunnel>,
}

#[derive(Debug, Deserialize)]
struct Tunnel {
    #[serde(default)]
    proto: String,
    #[serde(default)]
    public_url: String,
}

/// Public URL of the first `https` tunnel reported by the local ngrok agent.
pub async fn public_url(inspect_url: &str) -> Result<String> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .map_err(|e| BoxdeskError::Runtime(e.to_string()))?;
    let url = format!("{}/api/tunnels", inspect_url.trim_end_matches('/'));
    let list: TunnelList = client
        .get(&url)
        .send()
        .await
        .map_err(|e| BoxdeskError::Unavailable(format!("tunnel agent unreachable: {e}")))?
        .json()
        .await
        .map_err(|e| BoxdeskError::Serialization(e.to_string()))?;
    list.tunnels
        .into_iter()
        .find(|tunnel| tunnel.proto == "https")
        .map(|tunnel| tunnel.public_url)
        .ok_or_else(|| BoxdeskError::NotFound("no https tunnel".to_string()))
}

/// Replaces every `API_URL=` line, or appends one when none exists.
pub fn rewrite_api_url(contents: &str, public_url: &str) -> String {
    let line = format!(
        "API_URL={}/ask_agent",
        public_url.trim_end_matches('/')
    );
    let mut replaced = false;
    let mut out = String::with_capacity(contents.len() + line.len() + 1);
    for existing in contents.lines() {
        if existing.starts_with("API_URL=") {
            out.push_str(&line);
            replaced = true;
        } else {
            out.push_str(existing);
        }
        out.push('\n');
    }
    if !replaced {
        out.push_str(&line);
        out.push('\n');
    }
    out
}

pub async fn sync_env_file(inspect_url: &str, env_path: impl AsRef<Path>) -> Result<String> {
    let url = public_url(inspect_url).await?;
    let path = env_path.as_ref();
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(err) => return Err(BoxdeskError::Runtime(err.to_string())),
    };
    tokio::fs::write(path, rewrite_api_url(&contents, &url))
        .await
        .map_err(|e| BoxdeskError::Runtime(e.to_string()))?;
    tracing::info!(path = %path.display(), %url, "API_URL updated");
    Ok(url)
}
