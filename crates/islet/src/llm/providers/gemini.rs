// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use async_trait::async_trait;
use llm_contracts::{
    LLMAdapter, LLMError, LLMRequest, LLMResponse, LLMResult, Provider, Usage,
};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    endpoint: String,
    model: String,
    timeout: Duration,
}

impl GeminiClient {
    pub fn new(
        api_key: String,
        model: Option<String>,
        timeout_seconds: Option<u64>,
    ) -> LLMResult<Self> {
        let timeout = Duration::from_secs(timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECS));
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LLMError::Configuration(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            timeout,
        })
    }

    pub fn from_env() -> LLMResult<Self> {
        dotenvy::dotenv().ok();
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| LLMError::Configuration("GEMINI_API_KEY is not set".to_string()))?;
        let model = std::env::var("GEMINI_MODEL").ok();
        let timeout_seconds = std::env::var("GEMINI_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok());
        Self::new(api_key, model, timeout_seconds)
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_payload(&self, request: &LLMRequest) -> Value {
        let mut payload = json!({
            "contents": [{ "parts": [{ "text": request.prompt }] }]
        });
        if let Some(system) = &request.system_prompt {
            payload["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }
        let config = &request.generation_config;
        let mut generation = serde_json::Map::new();
        if let Some(temperature) = config.temperature {
            generation.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(max_tokens) = config.max_tokens {
            generation.insert("maxOutputTokens".to_string(), json!(max_tokens));
        }
        if let Some(top_p) = config.top_p {
            generation.insert("topP".to_string(), json!(top_p));
        }
        if let Some(stop) = &config.stop_sequences {
            generation.insert("stopSequences".to_string(), json!(stop));
        }
        if !generation.is_empty() {
            payload["generationConfig"] = Value::Object(generation);
        }
        payload
    }

    async fn execute(&self, payload: Value) -> LLMResult<Value> {
        let url = format!(
            "{}/{}:generateContent?key={}",
            self.endpoint, self.model, self.api_key
        );
        match tokio::time::timeout(
            self.timeout,
            self.client
                .post(&url)
                .header("Content-Type", "application/json")
                .json(&payload)
                .send(),
        )
        .await
        {
            Ok(Ok(response)) => {
                let status = response.status();
                if status.is_success() {
                    response.json().await.map_err(|e| {
                        LLMError::Serialisation(format!("Failed to parse response body: {e}"))
                    })
                } else if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                    Err(LLMError::RateLimit)
                } else {
                    Err(LLMError::Provider(format!(
                        "Gemini API error {}: {}",
                        status,
                        response
                            .text()
                            .await
                            .unwrap_or_else(|_| "Unknown error".to_string())
                    )))
                }
            }
            Ok(Err(e)) => Err(LLMError::Network(format!("Request failed: {e}"))),
            Err(_) => Err(LLMError::Timeout {
                seconds: self.timeout.as_secs(),
            }),
        }
    }

    fn parse_response(&self, data: Value, request_id: Uuid) -> LLMResult<LLMResponse> {
        let content = data["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or_else(|| {
                LLMError::Provider("Gemini response carried no text candidate".to_string())
            })?;
        let usage = data
            .get("usageMetadata")
            .map(|meta| Usage {
                prompt_tokens: meta["promptTokenCount"].as_u64().unwrap_or(0) as u32,
                completion_tokens: meta["candidatesTokenCount"].as_u64().unwrap_or(0) as u32,
                total_tokens: meta["totalTokenCount"].as_u64().unwrap_or(0) as u32,
            })
            .unwrap_or_default();
        let mut response =
            LLMResponse::new(request_id, content, self.model.clone(), Provider::Gemini)
                .with_usage(usage);
        if let Some(reason) = data["candidates"][0]["finishReason"].as_str() {
            response = response.with_finish_reason(reason);
        }
        Ok(response)
    }
}

#[async_trait]
impl LLMAdapter for GeminiClient {
    async fn generate_response(&self, request: LLMRequest) -> LLMResult<LLMResponse> {
        let payload = self.build_payload(&request);
        debug!(model = %self.model, request = %request.id, "sending generation request");
        let data = self.execute(payload).await?;
        self.parse_response(data, request.id)
    }

    fn provider_name(&self) -> &'static str {
        "gemini"
    }
}
