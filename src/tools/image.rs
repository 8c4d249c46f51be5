use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::Result;
use crate::interfaces::assistant::AssistantBackend;
use crate::interfaces::tools::{Tool, ToolContext};
use crate::tools::booking::required_str;

pub struct GenerateImageTool {
    backend: Arc<dyn AssistantBackend>,
}

impl GenerateImageTool {
    pub fn new(backend: Arc<dyn AssistantBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for GenerateImageTool {
    fn name(&self) -> &str {
        "generate_image"
    }

    fn description(&self) -> &str {
        "Generate an image from a text prompt and return its URL."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "prompt": { "type": "string" }
            },
            "required": ["prompt"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<String> {
        let prompt = required_str(&args, "prompt")?;
        match self.backend.generate_image(prompt).await {
            Ok(url) => Ok(url),
            Err(err) => Ok(format!("Image generation error: {err}")),
        }
    }
}
