//! OpenAI 호환 임베딩 프로바이더
//!
//! llama.cpp server, Ollama, vLLM 등 `/v1/embeddings`를 제공하는 로컬 추론 서버를 호출합니다.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::EndpointConfig;

use super::{l2_normalize, EmbedOptions, EmbeddingProvider, EmbeddingTensor, Pooling};

/// HTTP 요청 타임아웃
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// OpenAI 호환 임베딩 구현체
#[derive(Debug)]
pub struct OpenAiEmbedding {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiEmbedding {
    /// 새 인스턴스 생성
    ///
    /// # Arguments
    /// * `base_url` - 서버 주소 (예: `http://localhost:8080/v1`)
    /// * `model` - 임베딩 모델 이름
    /// * `api_key` - 선택적 Bearer 토큰
    pub fn new(base_url: &str, model: &str, api_key: Option<String>) -> Result<Self> {
        if base_url.trim().is_empty() {
            bail!("Embedding endpoint base URL is empty");
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
        Self::new(
            &endpoint.base_url,
            &endpoint.embedding_model,
            endpoint.api_key.clone(),
        )
    }

    fn url(&self) -> String {
        format!("{}/embeddings", self.base_url)
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
    encoding_format: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// 응답을 입력 순서대로 정렬해 텐서로 변환
fn response_to_tensor(
    mut response: EmbedResponse,
    expected_rows: usize,
    options: &EmbedOptions,
) -> Result<EmbeddingTensor> {
    if response.data.len() != expected_rows {
        bail!(
            "Embedding response has {} rows for {} inputs",
            response.data.len(),
            expected_rows
        );
    }

    response.data.sort_by_key(|d| d.index);
    let rows = response
        .data
        .into_iter()
        .map(|d| {
            let mut v = d.embedding;
            if options.normalize {
                l2_normalize(&mut v);
            }
            v
        })
        .collect();

    Ok(EmbeddingTensor::from_rows(rows)?)
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedding {
    async fn embed_batch(&self, texts: &[String], options: &EmbedOptions) -> Result<EmbeddingTensor> {
        if options.pooling != Pooling::Mean {
            tracing::debug!("Pooling {:?} is decided by the server model", options.pooling);
        }

        let request = EmbedRequest {
            model: &self.model,
            input: texts,
            encoding_format: "float",
        };

        let mut builder = self.client.post(self.url()).json(&request);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .context("Failed to send embedding request")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<ApiError>(&body) {
                bail!("Embedding API error ({}): {}", status, error.error.message);
            }
            bail!("Embedding API error ({}): {}", status, body);
        }

        let parsed: EmbedResponse =
            serde_json::from_str(&body).context("Failed to parse embedding response")?;

        tracing::debug!("Embedded {} texts with {}", texts.len(), self.model);
        response_to_tensor(parsed, texts.len(), options)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Tests
// ============================================================================
