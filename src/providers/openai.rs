use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{BoxdeskError, Result};
use crate::interfaces::assistant::{
    AssistantBackend, NewThreadMessage, RunState, RunStatus, RunToolCall, ThreadMessage,
    ToolOutput,
};

#[derive(Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Deserialize)]
struct RunResponse {
    id: String,
    status: String,
    #[serde(default)]
    required_action: Option<RequiredAction>,
    #[serde(default)]
    last_error: Option<RunError>,
}

#[derive(Deserialize)]
struct RequiredAction {
    submit_tool_outputs: SubmitToolOutputs,
}

#[derive(Deserialize)]
struct SubmitToolOutputs {
    tool_calls: Vec<ToolCallPayload>,
}

#[derive(Deserialize)]
struct ToolCallPayload {
    id: String,
    function: FunctionPayload,
}

#[derive(Deserialize)]
struct FunctionPayload {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Deserialize)]
struct RunError {
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct ListResponse<T> {
    data: Vec<T>,
}

#[derive(Deserialize)]
struct MessagePayload {
    id: String,
    role: String,
    #[serde(default)]
    content: Vec<Value>,
}

#[derive(Deserialize)]
struct VectorStoreFile {
    #[serde(default)]
    status: String,
    #[serde(default)]
    last_error: Option<RunError>,
}

#[derive(Deserialize)]
struct ImagePayload {
    #[serde(default)]
    url: Option<String>,
}

impl From<RunResponse> for RunState {
    fn from(run: RunResponse) -> Self {
        let tool_calls = run
            .required_action
            .map(|action| {
                action
                    .submit_tool_outputs
                    .tool_calls
                    .into_iter()
                    .map(|call| RunToolCall {
                        id: call.id,
                        name: call.function.name,
                        arguments: call.function.arguments,
                    })
                    .collect()
            })
            .unwrap_or_default();
        RunState {
            id: run.id,
            status: RunStatus::from(run.status.as_str()),
            tool_calls,
            last_error: run.last_error.map(|e| e.message),
        }
    }
}

/// Assistants v2 REST client.
#[derive(Clone)]
pub struct OpenAiAssistantClient {
    base_url: String,
    image_model: String,
    client: reqwest::Client,
    index_interval: Duration,
    index_attempts: u32,
}

impl OpenAiAssistantClient {
    pub fn new(
        api_key: &str,
        base_url: Option<String>,
        image_model: Option<String>,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|e| BoxdeskError::Config(e.to_string()))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert("OpenAI-Beta", HeaderValue::from_static("assistants=v2"));
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| BoxdeskError::Runtime(e.to_string()))?;
        Ok(Self {
            base_url: base_url
                .unwrap_or_else(|| crate::config::DEFAULT_OPENAI_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            image_model: image_model.unwrap_or_else(|| "dall-e-3".to_string()),
            client,
            index_interval: Duration::from_secs(1),
            index_attempts: 60,
        })
    }

    /// Bounds the wait for an uploaded file to finish indexing.
    pub fn with_index_polling(mut self, interval: Duration, attempts: u32) -> Self {
        self.index_interval = interval;
        self.index_attempts = attempts.max(1);
        self
    }

    async fn wait_indexed(&self, vector_store_id: &str, file_id: &str) -> Result<()> {
        let path = format!("/vector_stores/{vector_store_id}/files/{file_id}");
        for attempt in 0..self.index_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.index_interval).await;
            }
            let file: VectorStoreFile = self.get_json(&path).await?;
            match file.status.as_str() {
                "completed" => return Ok(()),
                "failed" | "cancelled" => {
                    let reason = file
                        .last_error
                        .map(|e| e.message)
                        .unwrap_or_else(|| file.status.clone());
                    return Err(BoxdeskError::Upstream(format!(
                        "indexing {file_id} failed: {reason}"
                    )));
                }
                _ => {}
            }
        }
        Err(BoxdeskError::Upstream(format!("indexing {file_id} timed out")))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_json<T: for<'de> Deserialize<'de>>(&self, path: &str, body: &Value) -> Result<T> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| BoxdeskError::Http(e.to_string()))?;
        decode(response).await
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| BoxdeskError::Http(e.to_string()))?;
        decode(response).await
    }
}

async fn decode<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| BoxdeskError::Http(e.to_string()))?;
    if !status.is_success() {
        return Err(BoxdeskError::Upstream(format!(
            "assistant service returned {status}: {body}"
        )));
    }
    serde_json::from_str(&body).map_err(|e| BoxdeskError::Serialization(e.to_string()))
}

#[async_trait]
impl AssistantBackend for OpenAiAssistantClient {
    async fn create_thread(&self, metadata: Value) -> Result<String> {
        let thread: IdResponse = self
            .post_json("/threads", &json!({ "metadata": metadata }))
            .await?;
        Ok(thread.id)
    }

    async fn add_message(&self, thread_id: &str, message: NewThreadMessage) -> Result<()> {
        let body = serde_json::to_value(&message)
            .map_err(|e| BoxdeskError::Serialization(e.to_string()))?;
        let _: IdResponse = self
            .post_json(&format!("/threads/{thread_id}/messages"), &body)
            .await?;
        Ok(())
    }

    async fn list_runs(&self, thread_id: &str) -> Result<Vec<RunState>> {
        let runs: ListResponse<RunResponse> =
            self.get_json(&format!("/threads/{thread_id}/runs")).await?;
        Ok(runs.data.into_iter().map(RunState::from).collect())
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<()> {
        let _: RunResponse = self
            .post_json(
                &format!("/threads/{thread_id}/runs/{run_id}/cancel"),
                &json!({}),
            )
            .await?;
        Ok(())
    }

    async fn create_run(
        &self,
        thread_id: &str,
        assistant_id: &str,
        metadata: Value,
    ) -> Result<RunState> {
        let run: RunResponse = self
            .post_json(
                &format!("/threads/{thread_id}/runs"),
                &json!({ "assistant_id": assistant_id, "metadata": metadata }),
            )
            .await?;
        Ok(run.into())
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<RunState> {
        let run: RunResponse = self
            .get_json(&format!("/threads/{thread_id}/runs/{run_id}"))
            .await?;
        Ok(run.into())
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: Vec<ToolOutput>,
    ) -> Result<RunState> {
        let run: RunResponse = self
            .post_json(
                &format!("/threads/{thread_id}/runs/{run_id}/submit_tool_outputs"),
                &json!({ "tool_outputs": outputs }),
            )
            .await?;
        Ok(run.into())
    }

    async fn latest_message(&self, thread_id: &str) -> Result<ThreadMessage> {
        let messages: ListResponse<MessagePayload> = self
            .get_json(&format!("/threads/{thread_id}/messages?order=desc&limit=1"))
            .await?;
        let message = messages
            .data
            .into_iter()
            .next()
            .ok_or_else(|| BoxdeskError::Upstream("thread has no messages".to_string()))?;
        let text = message.content.iter().find_map(|part| {
            part.get("text")
                .and_then(|t| t.get("value"))
                .and_then(|v| v.as_str())
                .map(str::to_string)
        });
        Ok(ThreadMessage {
            id: message.id,
            role: message.role,
            text,
        })
    }

    async fn generate_image(&self, prompt: &str) -> Result<String> {
        let images: ListResponse<ImagePayload> = self
            .post_json(
                "/images/generations",
                &json!({
                    "model": self.image_model,
                    "prompt": prompt,
                    "size": "1024x1024",
                    "n": 1
                }),
            )
            .await?;
        images
            .data
            .into_iter()
            .find_map(|image| image.url)
            .ok_or_else(|| BoxdeskError::Upstream("image response had no url".to_string()))
    }

    async fn upload_to_vector_store(
        &self,
        vector_store_id: &str,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<String> {
        let form = Form::new()
            .text("purpose", "assistants")
            .part("file", Part::bytes(bytes).file_name(filename.to_string()));
        let response = self
            .client
            .post(self.url("/files"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| BoxdeskError::Http(e.to_string()))?;
        let file: IdResponse = decode(response).await?;

        let _: IdResponse = self
            .post_json(
                &format!("/vector_stores/{vector_store_id}/files"),
                &json!({ "file_id": file.id }),
            )
            .await?;
        self.wait_indexed(vector_store_id, &file.id).await?;
        tracing::info!(file_id = %file.id, vector_store_id, filename, "file indexed in vector store");
        Ok(file.id)
    }
}
