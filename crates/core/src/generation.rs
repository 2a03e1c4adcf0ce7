use crate::error::ProviderError;
use crate::prompt::GroundedPrompt;
use async_trait::async_trait;

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model(&self) -> &str;

    async fn complete(
        &self,
        prompt: &GroundedPrompt,
        temperature: f32,
    ) -> Result<String, ProviderError>;
}
