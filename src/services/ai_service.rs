use anyhow::Result;

/// Trait for vision-capable completion APIs (OpenAI, OpenRouter, etc.)
#[async_trait::async_trait]
pub trait VisionService: Send + Sync {
    /// Sends `prompt` together with an image data URI as one user message and
    /// returns the model's text reply.
    async fn complete(&self, prompt: &str, image_data_uri: &str) -> Result<String>;
}
