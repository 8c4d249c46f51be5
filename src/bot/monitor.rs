use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::bot::discord::ChatPlatform;
use crate::error::{BoxdeskError, Result};

static SERVER_ERRORS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^http_requests_total\{[^}]*status="5xx"[^}]*\}\s+([0-9eE+\-.]+)"#)
        .unwrap()
});

#[derive(Debug, Clone, PartialEq)]
pub enum Alert {
    Unreachable { attempts: u32, error: String },
    Recovered,
    ServerErrors { delta: u64 },
}

impl Alert {
    pub fn message(&self) -> String {
        match self {
            Alert::Unreachable { attempts, error } => format!(
                "API metrics unreachable ({attempts} attempt(s)): {error}"
            ),
            Alert::Recovered => "API metrics are reachable again.".to_string(),
            Alert::ServerErrors { delta } => {
                format!("{delta} new 5xx response(s) detected on the API.")
            }
        }
    }
}

/// Sum of every `http_requests_total` sample labelled `status="5xx"`.
pub fn server_error_count(metrics_text: &str) -> Option<f64> {
    let mut found = false;
    let mut total = 0.0;
    for captures in SERVER_ERRORS.captures_iter(metrics_text) {
        if let Some(value) = captures.get(1).and_then(|m| m.as_str().parse::<f64>().ok()) {
            total += value;
            found = true;
        }
    }
    found.then_some(total)
}

/// Failure streak and 5xx tracking across scrapes of the API metrics.
#[derive(Debug, Clone)]
pub struct MetricsMonitor {
    threshold: u32,
    failure_streak: u32,
    alert_active: bool,
    last_server_errors: Option<f64>,
}

impl MetricsMonitor {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            failure_streak: 0,
            alert_active: false,
            last_server_errors: None,
        }
    }

    pub fn failure_streak(&self) -> u32 {
        self.failure_streak
    }

    pub fn alert_active(&self) -> bool {
        self.alert_active
    }

    /// Feeds one scrape result and returns the alerts it raises, in order.
    pub fn observe(&mut self, scrape: std::result::Result<&str, String>) -> Vec<Alert> {
        let mut alerts = Vec::new();
        match scrape {
            Ok(text) => {
                if self.alert_active {
                    alerts.push(Alert::Recovered);
                    self.alert_active = false;
                }
                self.failure_streak = 0;
                if let Some(current) = server_error_count(text) {
                    if let Some(previous) = self.last_server_errors {
                        if current > previous {
                            alerts.push(Alert::ServerErrors {
                                delta: (current - previous) as u64,
                            });
                        }
                    }
                    self.last_server_errors = Some(current);
                }
            }
            Err(error) => {
                self.failure_streak += 1;
                if self.failure_streak >= self.threshold && !self.alert_active {
                    alerts.push(Alert::Unreachable {
                        attempts: self.failure_streak,
                        error,
                    });
                    self.alert_active = true;
                }
            }
        }
        alerts
    }
}

/// Sends alerts to the monitoring channel, else by DM, else to the log.
pub struct AlertNotifier {
    platform: Arc<dyn ChatPlatform>,
    channel_id: Option<String>,
    user_id: Option<String>,
}

impl AlertNotifier {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        channel_id: Option<String>,
        user_id: Option<String>,
    ) -> Self {
        Self {
            platform,
            channel_id,
            user_id,
        }
    }

    /// Returns where the alert went: `"channel"`, `"dm"` or `"log"`.
    pub async fn deliver(&self, message: &str) -> &'static str {
        if let Some(channel_id) = &self.channel_id {
            match self.platform.send(channel_id, message).await {
                Ok(()) => return "channel",
                Err(err) => tracing::warn!(channel_id, error = %err, "alert to channel failed"),
            }
        }
        if let Some(user_id) = &self.user_id {
            let sent = async {
                let dm = self.platform.open_dm(user_id).await?;
                self.platform.send(&dm, message).await
            };
            match sent.await {
                Ok(()) => return "dm",
                Err(err) => tracing::warn!(user_id, error = %err, "alert by DM failed"),
            }
        }
        tracing::warn!(target: "boxdesk::monitoring", "{message}");
        "log"
    }
}

pub async fn scrape(client: &reqwest::Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| BoxdeskError::Http(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(BoxdeskError::Upstream(format!("metrics returned {status}")));
    }
    response
        .text()
        .await
        .map_err(|e| BoxdeskError::Http(e.to_string()))
}

/// Scrapes `url` every `interval` forever, delivering alerts as they are raised.
pub async fn run_monitor(
    mut monitor: MetricsMonitor,
    notifier: AlertNotifier,
    url: String,
    interval: Duration,
) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| BoxdeskError::Runtime(e.to_string()))?;
    tracing::info!(%url, interval_secs = interval.as_secs(), "metrics monitor started");
    loop {
        let result = scrape(&client, &url).await;
        let alerts = match &result {
            Ok(text) => monitor.observe(Ok(text.as_str())),
            Err(err) => monitor.observe(Err(err.to_string())),
        };
        for alert in alerts {
            notifier.deliver(&alert.message()).await;
        }
        tokio::time::sleep(interval).await;
    }
}
