//! Model invocation over HTTP.
//!
//! [`AskModel`] is the seam between the orchestrator and a model backend: it
//! sends one prompt plus the required output schema and hands back the
//! structured object, `None` when the model produced nothing usable, or a
//! [`ProviderError`]. [`HttpAsk`] speaks the two wire protocols the providers
//! use:
//!
//! - OpenAI-compatible `/chat/completions` with a strict `json_schema`
//!   response format (groq, cerebras)
//! - Google `models/{id}:generateContent` with `responseJsonSchema`
//!
//! There is no retry here. A failed call is reported once and the
//! orchestrator decides whether to rotate credentials or providers.

use crate::error::ProviderError;
use crate::provider::{Api, ModelHandle, Provider};
use crate::schema::is_empty_payload;
use crate::utils::{looks_truncated, truncate_for_log};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

/// Name given to the schema in OpenAI-style `response_format`.
pub const SCHEMA_NAME: &str = "article_extraction";

/// Async model invocation.
pub trait AskModel: Send + Sync {
    /// Send `prompt` to the model behind `handle`, requiring output that matches `schema`.
    ///
    /// `Ok(None)` means the call succeeded but returned no usable object.
    fn ask(
        &self,
        handle: &ModelHandle,
        prompt: &str,
        schema: &Value,
    ) -> impl Future<Output = Result<Option<Value>, ProviderError>> + Send;
}

/// [`AskModel`] over `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpAsk {
    client: Client,
}

impl Default for HttpAsk {
    fn default() -> Self {
        Self::new(Duration::from_secs(120))
    }
}

impl HttpAsk {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client }
    }

    async fn chat_completions(
        &self,
        base_url: &str,
        handle: &ModelHandle,
        prompt: &str,
        schema: &Value,
    ) -> Result<Option<Value>, ProviderError> {
        let body = json!({
            "model": handle.model_id,
            "temperature": 0,
            "messages": [{ "role": "user", "content": prompt }],
            "response_format": {
                "type": "json_schema",
                "json_schema": { "name": SCHEMA_NAME, "strict": true, "schema": schema },
            },
        });
        let response = self
            .client
            .post(format!("{base_url}/chat/completions"))
            .bearer_auth(&handle.api_key)
            .json(&body)
            .send()
            .await?;
        let response = check_status(handle.provider, response).await?;

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content);
        parse_content(content.as_deref())
    }

    async fn generate_content(
        &self,
        base_url: &str,
        handle: &ModelHandle,
        prompt: &str,
        schema: &Value,
    ) -> Result<Option<Value>, ProviderError> {
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": 0,
                "responseMimeType": "application/json",
                "responseJsonSchema": schema,
            },
        });
        let response = self
            .client
            .post(format!("{base_url}/models/{}:generateContent", handle.model_id))
            .header("x-goog-api-key", &handle.api_key)
            .json(&body)
            .send()
            .await?;
        let response = check_status(handle.provider, response).await?;

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        let text: Option<String> = parsed.candidates.into_iter().next().map(|c| {
            c.content
                .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
                .unwrap_or_default()
        });
        parse_content(text.as_deref())
    }
}

impl AskModel for HttpAsk {
    #[instrument(level = "debug", skip_all, fields(provider = %handle.provider, model = %handle.model_id))]
    async fn ask(&self, handle: &ModelHandle, prompt: &str, schema: &Value) -> Result<Option<Value>, ProviderError> {
        let t0 = Instant::now();
        let res = match &handle.api {
            Api::ChatCompletions { base_url } => self.chat_completions(base_url, handle, prompt, schema).await,
            Api::GenerateContent { base_url } => self.generate_content(base_url, handle, prompt, schema).await,
        };
        let elapsed_ms = t0.elapsed().as_millis();
        match &res {
            Ok(Some(_)) => debug!(elapsed_ms, "Model call returned output"),
            Ok(None) => debug!(elapsed_ms, "Model call returned no output"),
            Err(e) => warn!(elapsed_ms, error = %e, "Model call failed"),
        }
        res
    }
}

async fn check_status(provider: Provider, response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(provider, status, &body))
}

/// Map a non-2xx response to the matching [`ProviderError`].
pub fn status_error(provider: Provider, status: StatusCode, body: &str) -> ProviderError {
    let message = error_message(body);
    match status {
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited { provider, message },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Unauthorized {
            provider,
            status: status.as_u16(),
            message,
        },
        _ => ProviderError::Status {
            provider,
            status: status.as_u16(),
            message,
        },
    }
}

/// Pull `error.message` out of a provider error body, else a shortened raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            // google wraps errors as `[{ "error": ... }]` on some endpoints
            let v = if let Value::Array(items) = v {
                items.into_iter().next()?
            } else {
                v
            };
            v.pointer("/error/message")?.as_str().map(str::to_string)
        })
        .unwrap_or_else(|| truncate_for_log(body.trim(), 200))
}

/// Interpret the text content of a model reply.
fn parse_content(content: Option<&str>) -> Result<Option<Value>, ProviderError> {
    let Some(text) = content.map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(None);
    };
    let text = strip_code_fence(text);
    match serde_json::from_str::<Value>(text) {
        Ok(value) if is_empty_payload(&value) => Ok(None),
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            if looks_truncated(&e) {
                warn!(len = text.len(), "Model output looks truncated");
            }
            Err(ProviderError::Parse(format!("{e}: {}", truncate_for_log(text, 200))))
        }
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn schema() -> Value {
        json!({ "type": "object", "properties": { "a": { "type": "integer" } } })
    }

    #[tokio::test]
    async fn chat_completions_returns_structured_object() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/openai/v1/chat/completions")
            .match_header("authorization", "Bearer gsk_test")
            .match_body(Matcher::PartialJson(json!({
                "model": "openai/gpt-oss-120b",
                "response_format": { "type": "json_schema", "json_schema": { "name": SCHEMA_NAME, "strict": true } }
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"{\"a\": 1}"}}]}"#)
            .create_async()
            .await;

        let handle = Provider::Groq.build_model(
            "openai/gpt-oss-120b".into(),
            "gsk_test".into(),
            Some(format!("{}/openai/v1", server.url())),
        );
        let out = HttpAsk::default().ask(&handle, "prompt", &schema()).await.unwrap();
        assert_eq!(out, Some(json!({ "a": 1 })));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn generate_content_uses_api_key_header() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1beta/models/gemini-2.0-flash:generateContent")
            .match_header("x-goog-api-key", "AIza_test")
            .match_body(Matcher::PartialJson(json!({
                "generationConfig": { "responseMimeType": "application/json" }
            })))
            .with_status(200)
            .with_body(r#"{"candidates":[{"content":{"parts":[{"text":"{\"a\":"},{"text":" 2}"}]}}]}"#)
            .create_async()
            .await;

        let handle = Provider::Google.build_model(
            "gemini-2.0-flash".into(),
            "AIza_test".into(),
            Some(format!("{}/v1beta", server.url())),
        );
        let out = HttpAsk::default().ask(&handle, "prompt", &schema()).await.unwrap();
        assert_eq!(out, Some(json!({ "a": 2 })));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rate_limit_maps_to_rate_limited() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(429)
            .with_body(r#"{"error":{"message":"Rate limit reached for model"}}"#)
            .create_async()
            .await;

        let handle = Provider::Cerebras.build_model("gpt-oss-120b".into(), "k".into(), Some(format!("{}/v1", server.url())));
        let err = HttpAsk::default().ask(&handle, "p", &schema()).await.unwrap_err();
        match err {
            ProviderError::RateLimited { provider, message } => {
                assert_eq!(provider, Provider::Cerebras);
                assert_eq!(message, "Rate limit reached for model");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn null_content_is_no_output() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":null}}]}"#)
            .create_async()
            .await;

        let handle = Provider::Groq.build_model("m".into(), "k".into(), Some(format!("{}/v1", server.url())));
        assert_eq!(HttpAsk::default().ask(&handle, "p", &schema()).await.unwrap(), None);
    }

    #[test]
    fn status_codes_map_to_error_kinds() {
        let unauthorized = status_error(Provider::Groq, StatusCode::UNAUTHORIZED, "bad key");
        assert!(matches!(unauthorized, ProviderError::Unauthorized { status: 401, .. }));
        let forbidden = status_error(Provider::Google, StatusCode::FORBIDDEN, "");
        assert!(matches!(forbidden, ProviderError::Unauthorized { status: 403, .. }));
        let server = status_error(Provider::Groq, StatusCode::BAD_GATEWAY, "<html>");
        assert!(matches!(server, ProviderError::Status { status: 502, .. }));
    }

    #[test]
    fn google_array_error_bodies_are_unwrapped() {
        let msg = error_message(r#"[{"error":{"code":400,"message":"API key not valid"}}]"#);
        assert_eq!(msg, "API key not valid");
    }

    #[test]
    fn content_parsing_handles_empty_fenced_and_broken_output() {
        assert_eq!(parse_content(None).unwrap(), None);
        assert_eq!(parse_content(Some("  ")).unwrap(), None);
        assert_eq!(parse_content(Some("null")).unwrap(), None);
        assert_eq!(parse_content(Some("{}")).unwrap(), None);
        assert_eq!(parse_content(Some("```json\n{\"a\":1}\n```")).unwrap(), Some(json!({ "a": 1 })));
        assert!(matches!(parse_content(Some("{\"a\":")), Err(ProviderError::Parse(_))));
    }
}
