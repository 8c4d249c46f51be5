use async_trait::async_trait;
use serde_json::Value;
use time::OffsetDateTime;

use crate::error::Result;

/// Who is asking, and when; tools fall back to `author` for name arguments.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub user_id: String,
    pub author: String,
    pub now: OffsetDateTime,
}

impl ToolContext {
    pub fn new(user_id: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            author: author.into(),
            now: crate::dates::now(),
        }
    }

    pub fn at(mut self, now: OffsetDateTime) -> Self {
        self.now = now;
        self
    }
}

/// A function the hosted assistant may call while a run is in progress.
///
/// The returned text is submitted verbatim as the tool output.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters(&self) -> Value;
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String>;
}
