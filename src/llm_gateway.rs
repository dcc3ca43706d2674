use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Plan/answer generation collaborator: system instruction + user prompt in, free text out.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

#[derive(Clone)]
pub struct LLMClient {
    client: Client,
    api_key: String,
    model: String,
}

impl LLMClient {
    pub fn new(api_key: &str, model: &str) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(anyhow!("OPENAI_API_KEY not set in .env"));
        }
        let client = Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.trim().to_string(),
            model: model.to_string(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// POST with retries on network errors, 5xx and 429. Backoff 1s, 2s, 4s.
    async fn post_with_retry(&self, url: &str, body: &Value) -> Result<reqwest::Response> {
        let max_retries = 3;
        let mut attempt = 0;
        let mut backoff = Duration::from_secs(1);

        loop {
            attempt += 1;
            match self
                .client
                .post(url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(body)
                .send()
                .await
            {
                Ok(resp) => {
                    let retryable = resp.status().is_server_error()
                        || resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS;
                    if !retryable || attempt > max_retries {
                        return Ok(resp);
                    }
                    warn!(
                        "[LLM] HTTP {} (attempt {}/{}), retrying in {:?}",
                        resp.status(),
                        attempt,
                        max_retries,
                        backoff
                    );
                }
                Err(e) => {
                    if attempt > max_retries {
                        return Err(anyhow!("Max retries exceeded: {}", e));
                    }
                    warn!(
                        "⚠️ [LLM] Network error (attempt {}/{}): {}. Retrying in {:?}...",
                        attempt, max_retries, e, backoff
                    );
                }
            }

            sleep(backoff).await;
            backoff *= 2;
        }
    }

    pub async fn chat_completion(&self, messages: Vec<Value>) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": 0.1
        });

        let res = self.post_with_retry(CHAT_COMPLETIONS_URL, &body).await?;

        if !res.status().is_success() {
            let error_text = res.text().await?;
            return Err(anyhow!("Chat Completion API Error: {}", error_text));
        }

        let res_json: Value = res.json().await?;
        res_json["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow!("No content in LLM response"))
    }
}

#[async_trait]
impl LanguageModel for LLMClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        self.chat_completion(vec![
            json!({ "role": "system", "content": system }),
            json!({ "role": "user", "content": user }),
        ])
        .await
    }
}

/// Pulls the first `{...}` object out of model output, tolerating markdown fences and prose.
pub fn extract_json_object(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    let unfenced = trimmed
        .trim_start_matches("```json")
        .trim_start_matches("```JSON")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(unfenced) {
        return Some(value);
    }

    let start = unfenced.find('{')?;
    let end = unfenced.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&unfenced[start..=end]) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}
