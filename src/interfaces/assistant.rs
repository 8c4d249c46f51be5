use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
    Other(String),
}

impl RunStatus {
    /// Runs in these states block new runs on the same thread.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            RunStatus::Queued | RunStatus::InProgress | RunStatus::RequiresAction
        )
    }

    pub fn is_terminal_failure(&self) -> bool {
        matches!(
            self,
            RunStatus::Cancelled | RunStatus::Failed | RunStatus::Incomplete | RunStatus::Expired
        )
    }
}

impl From<&str> for RunStatus {
    fn from(value: &str) -> Self {
        match value {
            "queued" => RunStatus::Queued,
            "in_progress" => RunStatus::InProgress,
            "requires_action" => RunStatus::RequiresAction,
            "cancelling" => RunStatus::Cancelling,
            "cancelled" => RunStatus::Cancelled,
            "failed" => RunStatus::Failed,
            "completed" => RunStatus::Completed,
            "incomplete" => RunStatus::Incomplete,
            "expired" => RunStatus::Expired,
            other => RunStatus::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone)]
pub struct RunState {
    pub id: String,
    pub status: RunStatus,
    pub tool_calls: Vec<RunToolCall>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub tool_call_id: String,
    pub output: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewThreadMessage {
    pub role: String,
    pub content: String,
    pub metadata: Value,
}

#[derive(Debug, Clone)]
pub struct ThreadMessage {
    pub id: String,
    pub role: String,
    pub text: Option<String>,
}

/// Hosted assistant service: conversation threads, runs with function calls,
/// image generation and vector-store uploads.
#[async_trait]
pub trait AssistantBackend: Send + Sync {
    async fn create_thread(&self, metadata: Value) -> Result<String>;
    async fn add_message(&self, thread_id: &str, message: NewThreadMessage) -> Result<()>;
    async fn list_runs(&self, thread_id: &str) -> Result<Vec<RunState>>;
    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<()>;
    async fn create_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
        metadata: Value,
    ) -> Result<RunState>;
    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<RunState>;
    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: Vec<ToolOutput>,
    ) -> Result<RunState>;
    /// Newest message of the thread.
    async fn latest_message(&self, thread_id: &str) -> Result<ThreadMessage>;
    async fn generate_image(&self, prompt: &str) -> Result<String>;
    async fn upload_to_vector_store(
        &self,
        vector_store_id: &str,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<String>;
}
