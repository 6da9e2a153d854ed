//! HTTP plumbing shared by the vision and text tagging paths: the
//! availability probe, protocol-shaped request bodies, and the
//! retry-with-linear-backoff send loop.

use crate::parser::ParseError;
use crate::types::{Protocol, VisionConfig};
use reqwest::Client;
use serde_json::json;

/// Errors from the tagging endpoint client.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Tagging endpoint unavailable at {0}: {1}")]
    ServiceUnavailable(String, String),

    #[error("Cannot connect to tagging endpoint at {0}: {1}")]
    Connection(String, String),

    #[error("Tagging endpoint returned HTTP {0}: {1}")]
    Http(u16, String),

    #[error("Invalid response from tagging endpoint: {0}")]
    InvalidResponse(String),

    #[error("{0}")]
    Encode(#[from] crate::encode::EncodeError),

    #[error("{0}")]
    Parse(#[from] ParseError),
}

/// Check the endpoint answers its model-listing call before paying for
/// the tagging request. One retry, then fail fast.
pub async fn probe(client: &Client, config: &VisionConfig) -> Result<(), ServiceError> {
    let url = match config.protocol {
        Protocol::Ollama => format!("{}/api/tags", config.endpoint.trim_end_matches('/')),
        Protocol::OpenAiChat => format!("{}/models", config.endpoint.trim_end_matches('/')),
    };

    let mut last_err = String::new();
    for _ in 0..2 {
        let mut req = client.get(&url).timeout(std::time::Duration::from_secs(5));
        if let Some(ref key) = config.api_key {
            req = req.bearer_auth(key);
        }
        match req.send().await {
            Ok(resp) if resp.status().is_success() => return Ok(()),
            Ok(resp) => last_err = format!("HTTP {}", resp.status().as_u16()),
            Err(e) => last_err = e.to_string(),
        }
    }

    Err(ServiceError::ServiceUnavailable(
        config.endpoint.clone(),
        last_err,
    ))
}

/// Send a prompt (with optional inline image) and return the model's raw
/// text. Network errors and timeouts are retried up to
/// `config.max_retries` with linearly increasing delay
/// (`retry_backoff * attempt`).
pub async fn send_request(
    client: &Client,
    config: &VisionConfig,
    prompt: &str,
    image_b64: Option<&str>,
) -> Result<String, ServiceError> {
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match send_once(client, config, prompt, image_b64).await {
            Ok(text) => return Ok(text),
            // Only transport-level failures are worth retrying; an HTTP
            // error status or a malformed body will repeat identically.
            Err(ServiceError::Connection(endpoint, msg)) => {
                if attempt >= config.max_retries.max(1) {
                    return Err(ServiceError::Connection(endpoint, msg));
                }
                let delay = config.retry_backoff * attempt;
                tracing::warn!(
                    attempt,
                    error = %msg,
                    delay_ms = delay.as_millis() as u64,
                    "tagging request failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn send_once(
    client: &Client,
    config: &VisionConfig,
    prompt: &str,
    image_b64: Option<&str>,
) -> Result<String, ServiceError> {
    let endpoint = config.endpoint.trim_end_matches('/');
    let (url, body) = match config.protocol {
        Protocol::Ollama => {
            let mut body = json!({
                "model": config.model,
                "prompt": prompt,
                "stream": false,
            });
            if let Some(b64) = image_b64 {
                body["images"] = json!([b64]);
            }
            (format!("{}/api/generate", endpoint), body)
        }
        Protocol::OpenAiChat => {
            let content = match image_b64 {
                Some(b64) => json!([
                    { "type": "text", "text": prompt },
                    {
                        "type": "image_url",
                        "image_url": { "url": format!("data:image/jpeg;base64,{}", b64) }
                    }
                ]),
                None => json!(prompt),
            };
            let body = json!({
                "model": config.model,
                "messages": [{ "role": "user", "content": content }],
                "max_tokens": 500,
                "temperature": 0.3,
            });
            (format!("{}/chat/completions", endpoint), body)
        }
    };

    let mut req = client.post(&url).timeout(config.timeout).json(&body);
    if let Some(ref key) = config.api_key {
        req = req.bearer_auth(key);
    }

    let resp = req
        .send()
        .await
        .map_err(|e| ServiceError::Connection(config.endpoint.clone(), e.to_string()))?;

    if !resp.status().is_success() {
        let status = resp.status().as_u16();
        let text = resp.text().await.unwrap_or_default();
        return Err(ServiceError::Http(status, text));
    }

    let json: serde_json::Value = resp
        .json()
        .await
        .map_err(|e| ServiceError::InvalidResponse(e.to_string()))?;

    let content = match config.protocol {
        Protocol::Ollama => json.get("response").and_then(|v| v.as_str()),
        Protocol::OpenAiChat => json
            .get("choices")
            .and_then(|v| v.as_array())
            .and_then(|a| a.first())
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|v| v.as_str()),
    };

    content
        .map(|s| s.to_string())
        .ok_or_else(|| ServiceError::InvalidResponse("no content in response".to_string()))
}
