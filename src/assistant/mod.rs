use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{BoxdeskError, Result};
use crate::interfaces::assistant::{AssistantBackend, NewThreadMessage, RunState, RunStatus, ToolOutput};
use crate::interfaces::tools::ToolContext;
use crate::threads::ThreadStore;
use crate::tools::ToolRegistry;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_POLLS: u32 = 120;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub author: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskRequest {
    pub message: String,
    pub user_id: String,
    #[serde(default)]
    pub history: Vec<HistoryMessage>,
}

impl AskRequest {
    /// Display name used for tool defaults: last history author, else the user id.
    pub fn author(&self) -> String {
        self.history
            .last()
            .and_then(|entry| entry.author.clone())
            .filter(|author| !author.trim().is_empty())
            .unwrap_or_else(|| self.user_id.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AskResponse {
    pub response: String,
    pub thread_id: String,
    pub turn_id: String,
}

/// Drives one question through the user's assistant thread until the run settles.
pub struct AgentRunner {
    backend: Arc<dyn AssistantBackend>,
    threads: ThreadStore,
    registry: Arc<ToolRegistry>,
    assistant_id: String,
    poll_interval: Duration,
    max_polls: u32,
}

impl AgentRunner {
    pub fn new(
        backend: Arc<dyn AssistantBackend>,
        threads: ThreadStore,
        registry: Arc<ToolRegistry>,
        assistant_id: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            threads,
            registry,
            assistant_id: assistant_id.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls: DEFAULT_MAX_POLLS,
        }
    }

    pub fn with_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls.max(1);
        self
    }

    pub async fn ask(&self, request: AskRequest) -> Result<AskResponse> {
        if request.user_id.trim().is_empty() {
            return Err(BoxdeskError::InvalidInput("user_id is required".to_string()));
        }
        let (thread_id, is_new) = self.thread_for(&request.user_id).await?;
        self.cancel_active_runs(&thread_id).await;

        let author = request.author();
        if is_new {
            for entry in &request.history {
                if entry.content.trim().is_empty() {
                    continue;
                }
                let message = NewThreadMessage {
                    role: entry.role.clone().unwrap_or_else(|| "user".to_string()),
                    content: entry.content.clone(),
                    metadata: json!({ "author": entry.author.clone().unwrap_or_default() }),
                };
                self.backend.add_message(&thread_id, message).await?;
            }
        }

        self.backend
            .add_message(
                &thread_id,
                NewThreadMessage {
                    role: "user".to_string(),
                    content: request.message.clone(),
                    metadata: json!({ "author": request.user_id, "author_name": author }),
                },
            )
            .await?;

        let run = self
            .backend
            .create_run(
                &thread_id,
                &self.assistant_id,
                json!({ "user_id": request.user_id }),
            )
            .await?;
        let ctx = ToolContext::new(request.user_id.clone(), author);
        self.drive(&thread_id, run, &ctx).await?;

        let message = self.backend.latest_message(&thread_id).await?;
        Ok(AskResponse {
            response: message.text.unwrap_or_default(),
            thread_id,
            turn_id: message.id,
        })
    }

    async fn thread_for(&self, user_id: &str) -> Result<(String, bool)> {
        if let Some(thread_id) = self.threads.get(user_id).await? {
            return Ok((thread_id, false));
        }
        let thread_id = self
            .backend
            .create_thread(json!({ "user_id": user_id }))
            .await?;
        self.threads.upsert(user_id, &thread_id).await?;
        tracing::info!(user_id, thread_id = %thread_id, "created assistant thread");
        Ok((thread_id, true))
    }

    async fn cancel_active_runs(&self, thread_id: &str) {
        let runs = match self.backend.list_runs(thread_id).await {
            Ok(runs) => runs,
            Err(err) => {
                tracing::warn!(thread_id, error = %err, "could not list runs");
                return;
            }
        };
        for run in runs.iter().filter(|run| run.status.is_active()) {
            tracing::info!(thread_id, run_id = %run.id, "cancelling active run");
            if let Err(err) = self.backend.cancel_run(thread_id, &run.id).await {
                tracing::warn!(thread_id, run_id = %run.id, error = %err, "cancel failed");
            }
        }
    }

    async fn drive(&self, thread_id: &str, mut run: RunState, ctx: &ToolContext) -> Result<()> {
        for _ in 0..self.max_polls {
            match &run.status {
                RunStatus::Completed => return Ok(()),
                RunStatus::RequiresAction => {
                    let mut outputs = Vec::with_capacity(run.tool_calls.len());
                    for call in &run.tool_calls {
                        tracing::info!(tool = %call.name, run_id = %run.id, "dispatching tool call");
                        let output = self.registry.dispatch(&call.name, &call.arguments, ctx).await;
                        outputs.push(ToolOutput {
                            tool_call_id: call.id.clone(),
                            output,
                        });
                    }
                    run = self
                        .backend
                        .submit_tool_outputs(thread_id, &run.id, outputs)
                        .await?;
                }
                status if status.is_terminal_failure() => {
                    return Err(BoxdeskError::Upstream(format!(
                        "run {} ended with status {:?}: {}",
                        run.id,
                        status,
                        run.last_error.clone().unwrap_or_default()
                    )));
                }
                _ => {
                    tokio::time::sleep(self.poll_interval).await;
                    run = self.backend.retrieve_run(thread_id, &run.id).await?;
                }
            }
        }
        Err(BoxdeskError::Upstream("run timed out".to_string()))
    }
}
