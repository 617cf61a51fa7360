use anyhow::{Context, Result, anyhow};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::{Duration, sleep};
use tracing::warn;

const MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatCompletion {
    pub content: String,
    pub usage: Usage,
}

/// Minimal chat-completions client with retry on rate limits and server errors.
pub struct ChatClient {
    http: Client,
    api_key: String,
    base: String,
}

impl ChatClient {
    pub fn new(api_key: String, base: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(600))
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            http,
            api_key,
            base: base
                .map(|b| b.trim_end_matches('/').to_string())
                .unwrap_or_else(|| "https://api.openai.com".into()),
        })
    }

    async fn post_json<T: Serialize>(&self, path: &str, body: &T) -> reqwest::Result<reqwest::Response> {
        self.http
            .post(format!("{}/v1{}", self.base, path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
    }

    pub async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion> {
        let mut delay = Duration::from_millis(300);
        for attempt in 0..MAX_ATTEMPTS {
            let resp = self
                .post_json("/chat/completions", request)
                .await
                .context("Network error calling chat completions")?;

            if resp.status().is_success() {
                let v: Value = resp
                    .json()
                    .await
                    .context("Error decoding chat completion response")?;
                return parse_completion(&v);
            }

            let retryable = resp.status() == StatusCode::TOO_MANY_REQUESTS || resp.status().is_server_error();
            if retryable && attempt + 1 < MAX_ATTEMPTS {
                warn!(status = %resp.status(), attempt = attempt + 1, "chat completion failed, retrying");
                sleep(delay).await;
                delay = Duration::from_millis((delay.as_millis() as f64 * 1.8) as u64)
                    + Duration::from_millis(fastrand::u64(0..250));
                continue;
            }

            let status = resp.status();
            let err_txt = resp.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI error {}: {}", status, err_txt);
        }
        anyhow::bail!("Retries exhausted")
    }
}

pub fn parse_completion(root: &Value) -> Result<ChatCompletion> {
    let content = root
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("chat completion has no message content"))?;

    let usage = root
        .get("usage")
        .cloned()
        .map(serde_json::from_value::<Usage>)
        .transpose()
        .context("malformed usage block")?
        .unwrap_or_default();

    Ok(ChatCompletion {
        content: content.to_string(),
        usage,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_content_and_usage() {
        let v = json!({
            "choices": [{ "message": { "role": "assistant", "content": "42" } }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 2, "total_tokens": 12 }
        });
        let completion = parse_completion(&v).unwrap();
        assert_eq!(completion.content, "42");
        assert_eq!(completion.usage.total_tokens, 12);
    }

    #[test]
    fn missing_choices_is_an_error() {
        assert!(parse_completion(&json!({ "choices": [] })).is_err());
    }

    #[test]
    fn missing_usage_defaults_to_zero() {
        let v = json!({ "choices": [{ "message": { "content": "ok" } }] });
        assert_eq!(parse_completion(&v).unwrap().usage, Usage::default());
    }
}
