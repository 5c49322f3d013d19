use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

/// Boundary to the answer-generating model: one prompt in, one answer
/// out, no streaming.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// Client for an OpenAI-compatible `/v1/chat/completions` endpoint.
pub struct HttpChatModel {
    endpoint: Url,
    model: String,
    api_key: Option<String>,
    client: Client,
}

impl HttpChatModel {
    pub fn new(base_url: &str, model: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let endpoint = Url::parse(base_url)?.join("v1/chat/completions")?;
        Ok(Self {
            endpoint,
            model: model.into(),
            api_key,
            client: Client::new(),
        })
    }
}

#[async_trait]
impl ChatModel for HttpChatModel {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let mut request = self.client.post(self.endpoint.clone()).json(&ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        });

        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            return Err(PipelineError::collaborator(
                "llm",
                format!("endpoint returned {}", response.status()),
            ));
        }

        let payload: ChatResponse = response.json().await?;
        let answer = payload
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| PipelineError::collaborator("llm", "response had no choices"))?;

        Ok(answer)
    }
}
