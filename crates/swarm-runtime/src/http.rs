//! Shared HTTP plumbing for the vendor adapters

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use swarm_core::error::{AgentError, Result};

/// Default request timeout for completions
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

pub(crate) fn client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AgentError::Provider(format!("failed to build HTTP client: {e}")))
}

/// Map a vendor status code and body onto the error taxonomy
pub fn error_for_status(provider: &str, status: u16, body: &str) -> AgentError {
    let detail = vendor_message(body).unwrap_or_else(|| body.trim().to_string());
    let detail = format!("{provider} returned {status}: {detail}");

    match status {
        401 | 403 => AgentError::Auth(detail),
        429 => AgentError::RateLimited(detail),
        500..=599 => AgentError::ProviderUnavailable(detail),
        _ => AgentError::Provider(detail),
    }
}

/// `{"error": {"message": ...}}` is shared by all three vendors
fn vendor_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    error
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| error.as_str().map(str::to_string))
}

pub(crate) fn transport_error(provider: &str, err: &reqwest::Error) -> AgentError {
    if err.is_connect() || err.is_timeout() {
        AgentError::ProviderUnavailable(format!("{provider} is unreachable: {err}"))
    } else {
        AgentError::Provider(format!("{provider} request failed: {err}"))
    }
}

/// Send a request; non-2xx statuses become typed errors
pub(crate) async fn send(provider: &str, request: RequestBuilder) -> Result<Response> {
    let response = request
        .send()
        .await
        .map_err(|e| transport_error(provider, &e))?;

    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::warn!(provider, status = status.as_u16(), "Provider request failed");
    Err(error_for_status(provider, status.as_u16(), &body))
}

/// Send and decode a JSON body
pub(crate) async fn send_json<T: DeserializeOwned>(
    provider: &str,
    request: RequestBuilder,
) -> Result<T> {
    let response = send(provider, request).await?;
    let body = response
        .text()
        .await
        .map_err(|e| transport_error(provider, &e))?;
    serde_json::from_str(&body)
        .map_err(|e| AgentError::Parse(format!("unexpected {provider} response: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let body = r#"{"error": {"message": "slow down", "type": "rate_limit_error"}}"#;
        let err = error_for_status("anthropic", 429, body);
        assert!(matches!(err, AgentError::RateLimited(_)));
        assert!(err.to_string().contains("slow down"));

        assert!(matches!(error_for_status("openai", 401, ""), AgentError::Auth(_)));
        assert!(matches!(error_for_status("openai", 403, ""), AgentError::Auth(_)));
        assert!(matches!(
            error_for_status("gemini", 503, "overloaded"),
            AgentError::ProviderUnavailable(_)
        ));
        assert!(matches!(error_for_status("gemini", 400, "bad"), AgentError::Provider(_)));
    }
}
