//! OpenAI 호환 채팅 프로바이더

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::EndpointConfig;

use super::{ChatMessage, GenerationOptions, GenerationOutput, GenerationProvider, Role};

/// HTTP 요청 타임아웃 (생성 타임아웃은 오케스트레이터가 따로 관리)
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// OpenAI 호환 채팅 구현체
#[derive(Debug)]
pub struct OpenAiChat {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiChat {
    pub fn new(base_url: &str, model: &str, api_key: Option<String>) -> Result<Self> {
        if base_url.trim().is_empty() {
            bail!("Chat endpoint base URL is empty");
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
        })
    }

    /// 설정에서 생성
    pub fn from_config(endpoint: &EndpointConfig) -> Result<Self> {
        Self::new(&endpoint.base_url, &endpoint.chat_model, endpoint.api_key.clone())
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn request<'a>(
        &'a self,
        messages: &'a [ChatMessage],
        options: &GenerationOptions,
    ) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages,
            max_tokens: options.max_new_tokens,
            temperature: options.greedy.then_some(0.0),
            stream: false,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// 첫 번째 choice를 assistant 메시지로 변환
fn response_to_output(response: ChatResponse) -> Result<GenerationOutput> {
    let Some(choice) = response.choices.into_iter().next() else {
        bail!("Chat response has no choices");
    };
    Ok(GenerationOutput::Messages(vec![ChatMessage {
        role: Role::Assistant,
        content: choice.message.content.unwrap_or_default(),
    }]))
}

#[async_trait]
impl GenerationProvider for OpenAiChat {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<GenerationOutput> {
        let request = self.request(messages, options);

        let mut builder = self.client.post(self.url()).json(&request);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .context("Failed to send chat request")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<ApiError>(&body) {
                bail!("Chat API error ({}): {}", status, error.error.message);
            }
            bail!("Chat API error ({}): {}", status, body);
        }

        let parsed: ChatResponse =
            serde_json::from_str(&body).context("Failed to parse chat response")?;
        response_to_output(parsed)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Tests
// ============================================================================
