//! HTTP client for the boxdesk API, shared by the bot and the dashboard.

use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::absences::Absence;
use crate::assistant::AskRequest;
use crate::error::{BoxdeskError, Result};
use crate::reservations::Reservation;

/// Outcome of `/ask_agent` as the bot needs to tell it apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AskOutcome {
    Answer(String),
    Unavailable,
    Failed(u16),
}

pub const NO_ANSWER: &str = "No response.";

#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl ApiClient {
    /// Accepts either the API root or the full `/ask_agent` URL.
    pub fn new(url: &str) -> Result<Self> {
        Self::with_timeout(url, Duration::from_secs(100))
    }

    pub fn with_timeout(url: &str, timeout: Duration) -> Result<Self> {
        let base = url.trim().trim_end_matches('/');
        let base = base.strip_suffix("/ask_agent").unwrap_or(base);
        if base.is_empty() {
            return Err(BoxdeskError::Config("API url is empty".to_string()));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .timeout(timeout)
            .build()
            .map_err(|e| BoxdeskError::Runtime(e.to_string()))?;
        Ok(Self {
            base_url: base.to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn ask(&self, request: &AskRequest) -> Result<AskOutcome> {
        let response = self
            .client
            .post(self.url("/ask_agent"))
            .json(request)
            .send()
            .await
            .map_err(|e| BoxdeskError::Http(e.to_string()))?;
        match response.status() {
            StatusCode::OK => {
                let body: Value = response
                    .json()
                    .await
                    .map_err(|e| BoxdeskError::Serialization(e.to_string()))?;
                let answer = body
                    .get("response")
                    .and_then(Value::as_str)
                    .filter(|text| !text.is_empty())
                    .unwrap_or(NO_ANSWER);
                Ok(AskOutcome::Answer(answer.to_string()))
            }
            StatusCode::SERVICE_UNAVAILABLE => Ok(AskOutcome::Unavailable),
            other => {
                tracing::warn!(status = %other, "ask_agent failed");
                Ok(AskOutcome::Failed(other.as_u16()))
            }
        }
    }

    pub async fn health(&self) -> Result<Value> {
        self.get_json("/health").await
    }

    pub async fn reservations(&self) -> Result<Vec<Reservation>> {
        rows(self.get_json("/reservations").await?)
    }

    pub async fn book_box(&self, date: &str, hour: &str, reserved_by: &str) -> Result<()> {
        self.post_json(
            "/book_box",
            &json!({ "date": date, "hour": hour, "reserved_by": reserved_by }),
        )
        .await
    }

    pub async fn absences(&self) -> Result<Vec<Absence>> {
        rows(self.get_json("/absences").await?)
    }

    pub async fn report_absence(&self, name: &str, date: &str) -> Result<()> {
        self.post_json("/report_absence", &json!({ "name": name, "date": date }))
            .await
    }

    async fn get_json(&self, path: &str) -> Result<Value> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| BoxdeskError::Http(e.to_string()))?;
        read_json(response).await
    }

    async fn post_json<T: Serialize>(&self, path: &str, body: &T) -> Result<()> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| BoxdeskError::Http(e.to_string()))?;
        read_json(response).await.map(|_| ())
    }
}

async fn read_json(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);
    if status.is_success() {
        return Ok(body);
    }
    let detail = body
        .get("detail")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| status.to_string());
    Err(match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => BoxdeskError::InvalidInput(detail),
        StatusCode::NOT_FOUND => BoxdeskError::NotFound(detail),
        StatusCode::SERVICE_UNAVAILABLE => BoxdeskError::Unavailable(detail),
        _ => BoxdeskError::Upstream(detail),
    })
}

/// Drops the `{"message": ...}` placeholder the list endpoints return when empty.
fn rows<T: DeserializeOwned>(body: Value) -> Result<Vec<T>> {
    let items = match body {
        Value::Array(items) => items,
        other => {
            return Err(BoxdeskError::Serialization(format!(
                "expected a list, got {other}"
            )))
        }
    };
    items
        .into_iter()
        .filter(|item| item.get("id").is_some())
        .map(|item| serde_json::from_value(item).map_err(BoxdeskError::from))
        .collect()
}
