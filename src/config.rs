use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BoxdeskError, Result};

pub const DEFAULT_DB_PATH: &str = "./data/boxdesk.db";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_DISCORD_API_BASE: &str = "https://discord.com/api/v10";
pub const DEFAULT_DISCORD_GATEWAY: &str = "wss://gateway.discord.gg/?v=10&encoding=json";
pub const DEFAULT_REDDIT_BASE: &str = "https://www.reddit.com";

/// Deployment flavour selected by the `ENV` variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentEnv {
    Local,
    Azure,
}

impl DeploymentEnv {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentEnv::Local => "local",
            DeploymentEnv::Azure => "azure",
        }
    }
}

impl std::str::FromStr for DeploymentEnv {
    type Err = BoxdeskError;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "local" => Ok(DeploymentEnv::Local),
            "azure" => Ok(DeploymentEnv::Azure),
            other => Err(BoxdeskError::Config(format!("unknown ENV value: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub assistant_id: Option<String>,
    pub vector_store_id: Option<String>,
    pub base_url: String,
    pub image_model: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscordConfig {
    pub token: Option<String>,
    pub api_base: String,
    pub gateway_url: String,
    pub api_url: Option<String>,
    pub always_respond_user_ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
    pub failure_threshold: u32,
    pub metrics_url: Option<String>,
    pub channel_id: Option<String>,
    pub user_id: Option<String>,
}

impl MonitoringConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds.max(1))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeedConfig {
    pub subreddit: Option<String>,
    pub notify_user_id: Option<String>,
    pub interval_seconds: u64,
    pub limit: usize,
    pub seen_file: String,
    pub reddit_base: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub env: DeploymentEnv,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub openai: OpenAiConfig,
    pub discord: DiscordConfig,
    pub monitoring: MonitoringConfig,
    pub feed: FeedConfig,
}

impl Config {
    /// Loads the env file for the current `ENV` and reads the process environment.
    pub fn from_env() -> Result<Self> {
        let deployment: DeploymentEnv = env::var("ENV").unwrap_or_default().parse()?;
        load_dotenv(deployment);
        let vars: HashMap<String, String> = env::vars().collect();
        Self::from_map(&vars)
    }

    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| {
            vars.get(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let env: DeploymentEnv = get("ENV").unwrap_or_default().parse()?;
        let db_path = match env {
            DeploymentEnv::Azure => get("AZURE_DB_PATH").or_else(|| get("BOXDESK_DB_PATH")),
            DeploymentEnv::Local => get("BOXDESK_DB_PATH"),
        }
        .unwrap_or_else(|| DEFAULT_DB_PATH.to_string());

        let api_url = get("API_URL");
        let metrics_url = get("MONITORING_METRICS_URL")
            .or_else(|| api_url.as_deref().and_then(derive_metrics_url));

        Ok(Self {
            env,
            server: ServerConfig {
                host: get("BOXDESK_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_or(get("BOXDESK_PORT"), 8000, "BOXDESK_PORT")?,
            },
            database: DatabaseConfig { path: db_path },
            openai: OpenAiConfig {
                api_key: get("OPENAI_API_KEY"),
                assistant_id: get("OPENAI_ASSISTANT_ID"),
                vector_store_id: get("OPENAI_VECTORSTORE_ID"),
                base_url: get("OPENAI_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
                image_model: get("OPENAI_IMAGE_MODEL").unwrap_or_else(|| "dall-e-3".to_string()),
            },
            discord: DiscordConfig {
                token: get("DISCORD_BOT_TOKEN"),
                api_base: get("DISCORD_API_BASE")
                    .unwrap_or_else(|| DEFAULT_DISCORD_API_BASE.to_string()),
                gateway_url: get("DISCORD_GATEWAY_URL")
                    .unwrap_or_else(|| DEFAULT_DISCORD_GATEWAY.to_string()),
                api_url,
                always_respond_user_ids: split_list(get("ALWAYS_RESPOND_USER_IDS")),
            },
            monitoring: MonitoringConfig {
                enabled: parse_flag(get("MONITORING_ENABLED")),
                interval_seconds: parse_or(get("MONITORING_INTERVAL"), 60, "MONITORING_INTERVAL")?,
                failure_threshold: parse_or(
                    get("MONITORING_FAILURE_THRESHOLD"),
                    3,
                    "MONITORING_FAILURE_THRESHOLD",
                )?,
                metrics_url,
                channel_id: get("MONITORING_CHANNEL_ID").filter(|id| is_snowflake(id)),
                user_id: get("MONITORING_USER_ID").filter(|id| is_snowflake(id)),
            },
            feed: FeedConfig {
                subreddit: get("REDDIT_SUBREDDIT"),
                notify_user_id: get("REDDIT_NOTIFY_USER_ID"),
                interval_seconds: parse_or(get("REDDIT_INTERVAL"), 60, "REDDIT_INTERVAL")?,
                limit: parse_or(get("REDDIT_LIMIT"), 3, "REDDIT_LIMIT")?,
                seen_file: get("SEEN_FILE").unwrap_or_else(|| "seen_posts.txt".to_string()),
                reddit_base: get("REDDIT_BASE_URL").unwrap_or_else(|| DEFAULT_REDDIT_BASE.to_string()),
            },
        })
    }

    pub fn require_discord_token(&self) -> Result<&str> {
        self.discord
            .token
            .as_deref()
            .ok_or_else(|| BoxdeskError::Config("DISCORD_BOT_TOKEN is not set".to_string()))
    }

    pub fn require_api_url(&self) -> Result<&str> {
        self.discord
            .api_url
            .as_deref()
            .ok_or_else(|| BoxdeskError::Config("API_URL is not set".to_string()))
    }

    pub fn require_openai_key(&self) -> Result<&str> {
        self.openai
            .api_key
            .as_deref()
            .ok_or_else(|| BoxdeskError::Config("OPENAI_API_KEY is not set".to_string()))
    }

    pub fn require_assistant_id(&self) -> Result<&str> {
        self.openai
            .assistant_id
            .as_deref()
            .ok_or_else(|| BoxdeskError::Config("OPENAI_ASSISTANT_ID is not set".to_string()))
    }
}

/// `.env.{env}` wins over `.env`; values already in the environment are kept.
pub fn load_dotenv(deployment: DeploymentEnv) {
    let scoped = format!(".env.{}", deployment.as_str());
    if Path::new(&scoped).exists() {
        let _ = dotenv::from_filename(&scoped);
    } else {
        let _ = dotenv::dotenv();
    }
}

/// Strips a trailing `/ask_agent` from the API URL and appends `/metrics`.
pub fn derive_metrics_url(api_url: &str) -> Option<String> {
    let base = api_url.trim().trim_end_matches('/');
    if base.is_empty() {
        return None;
    }
    let base = base.strip_suffix("/ask_agent").unwrap_or(base);
    Some(format!("{base}/metrics"))
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T, key: &str) -> Result<T> {
    match value {
        Some(raw) => raw
            .parse()
            .map_err(|_| BoxdeskError::Config(format!("invalid value for {key}: {raw}"))),
        None => Ok(default),
    }
}

fn parse_flag(value: Option<String>) -> bool {
    matches!(
        value.map(|v| v.to_ascii_lowercase()).as_deref(),
        Some("1") | Some("true") | Some("yes")
    )
}

fn split_list(value: Option<String>) -> Vec<String> {
    value
        .map(|raw| {
            raw.split(',')
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn is_snowflake(value: &str) -> bool {
    let valid = value.chars().all(|c| c.is_ascii_digit());
    if !valid {
        tracing::warn!(value, "ignoring non-numeric monitoring id");
    }
    valid
}
