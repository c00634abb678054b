use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SceneBotConfig;
use crate::error::{Result, SceneBotError};
use crate::rate_limit::CallGate;
use crate::reply::{extract_demo_reply, extract_reply};
use crate::token::{resolve_token, TokenStore};

/// Authenticated chat endpoint, relative to the backend base URL.
const CHAT_PATH: &str = "/api/scene-bot";
/// Unauthenticated fallback endpoint with canned demo replies.
const DEMO_PATH: &str = "/api/scene-bot/demo";

/// Slack added to the outer deadline so the per-request timeout, which
/// carries the better error, fires first.
const TIMEOUT_GRACE: Duration = Duration::from_millis(50);

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
    lang: &'a str,
}

/// Per-call overrides. The default is a stored token, the configured
/// timeout and no external cancellation.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Bearer token to use instead of whatever the token store resolves.
    /// An empty string is ignored and the store is consulted as usual.
    pub token: Option<String>,
    /// Overrides the configured request timeout.
    pub timeout: Option<Duration>,
    /// Cancels the call from outside; surfaces as a timeout error.
    pub cancel: Option<CancellationToken>,
}

/// Client for the Scene backend's conversational endpoint.
///
/// One call sends one chat message and yields either the bot's reply as a
/// plain string or a typed [`SceneBotError`]. Calls are throttled through a
/// shared [`CallGate`], so one client should be reused rather than rebuilt
/// per message.
pub struct SceneBotClient {
    http: reqwest::Client,
    config: SceneBotConfig,
    tokens: Arc<dyn TokenStore>,
    gate: CallGate,
}

impl SceneBotClient {
    pub fn new(config: SceneBotConfig, tokens: Arc<dyn TokenStore>) -> Self {
        let gate = CallGate::new(config.min_interval());
        Self::with_gate(config, tokens, gate)
    }

    /// Build a client around a caller-supplied gate instead of one derived
    /// from the config's minimum interval.
    pub fn with_gate(config: SceneBotConfig, tokens: Arc<dyn TokenStore>, gate: CallGate) -> Self {
        info!(
            "Initialized SceneBot client: backend={}, timeout={}ms",
            config.backend_url,
            config.timeout_ms
        );
        Self {
            http: reqwest::Client::builder()
                .user_agent(concat!("scene-bot-client/", env!("CARGO_PKG_VERSION")))
                .build()
                .unwrap_or_default(),
            config,
            tokens,
            gate,
        }
    }

    pub fn config(&self) -> &SceneBotConfig {
        &self.config
    }

    /// Send a message with the configured language and default options.
    pub async fn send(&self, message: &str) -> Result<String> {
        self.send_message(message, None, &CallOptions::default()).await
    }

    /// Send one chat message and return the bot's reply.
    ///
    /// Validation, throttling and token resolution all happen before any
    /// network traffic: an empty message, a missing or non-https backend
    /// URL and a call inside the minimum interval each fail locally. A
    /// missing token is not an error; the request is simply sent without
    /// an `Authorization` header and the backend decides what to do with it.
    ///
    /// When the primary endpoint fails for a reason the demo endpoint might
    /// still serve (unreachable host, bad payload, 5xx), one unauthenticated
    /// attempt is made against [`DEMO_PATH`]. Auth failures, timeouts and
    /// rate limiting never fall back.
    pub async fn send_message(
        &self,
        message: &str,
        lang: Option<&str>,
        opts: &CallOptions,
    ) -> Result<String> {
        if message.trim().is_empty() {
            return Err(SceneBotError::InvalidInput(
                "message must be a non-empty string".to_string(),
            ));
        }

        let base = self.backend_base()?;

        if let Err(wait) = self.gate.try_claim() {
            return Err(SceneBotError::ClientRateLimit {
                retry_in_ms: wait.as_millis() as u64,
            });
        }

        let token = match &opts.token {
            Some(token) if !token.is_empty() => Some(token.clone()),
            _ => resolve_token(self.tokens.as_ref()).await,
        };
        if token.is_none() {
            debug!("no auth token available, sending request for bypass/review handling");
        }

        let lang = lang.unwrap_or(&self.config.default_lang);
        let call_timeout = opts.timeout.unwrap_or_else(|| self.config.timeout());
        let request = ChatRequest { message, lang };

        match self
            .primary_call(&base, &request, token.as_deref(), call_timeout, opts)
            .await
        {
            Ok(reply) => Ok(reply),
            Err(err) if err.fallback_eligible() => {
                self.demo_call(&base, &request, call_timeout, opts, err).await
            }
            Err(err) => Err(err),
        }
    }

    /// Validate the configured backend URL and normalize it for joining.
    fn backend_base(&self) -> Result<String> {
        let base = self.config.backend_url.trim();
        if base.is_empty() {
            return Err(SceneBotError::NoBackend(
                "backend URL is not configured".to_string(),
            ));
        }
        let usable = base.starts_with("https://")
            || (self.config.allow_http && base.starts_with("http://"));
        if !usable {
            return Err(SceneBotError::NoBackend(format!(
                "backend URL must use https: {base}"
            )));
        }
        Ok(base.trim_end_matches('/').to_string())
    }

    async fn primary_call(
        &self,
        base: &str,
        request: &ChatRequest<'_>,
        token: Option<&str>,
        call_timeout: Duration,
        opts: &CallOptions,
    ) -> Result<String> {
        let url = format!("{base}{CHAT_PATH}");
        debug!(
            "POST {} (lang={}, authorized={})",
            url,
            request.lang,
            token.is_some()
        );

        let mut builder = self.http.post(&url).json(request).timeout(call_timeout);
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }

        let response = bounded_send(builder.send(), call_timeout, opts.cancel.as_ref()).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status));
        }

        if !content_type_is_json(response.headers()) {
            // Plain-text replies pass through untouched.
            return match response.text().await {
                Ok(text) => Ok(text),
                Err(e) => Err(classify_transport_error(&e)),
            };
        }

        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(e) if e.is_decode() => {
                return Err(SceneBotError::BadResponse(format!(
                    "body declared JSON but did not parse: {e}"
                )))
            }
            Err(e) => return Err(classify_transport_error(&e)),
        };

        extract_reply(&body).ok_or_else(|| {
            SceneBotError::BadResponse(
                "response has no usable reply, message or text field".to_string(),
            )
        })
    }

    /// Fallback leg of a failed call: one unauthenticated POST to the demo
    /// endpoint with the same body. On success the demo reply becomes the
    /// call's result; otherwise the original error surfaces, wrapped as
    /// service-unavailable.
    async fn demo_call(
        &self,
        base: &str,
        request: &ChatRequest<'_>,
        call_timeout: Duration,
        opts: &CallOptions,
        original: SceneBotError,
    ) -> Result<String> {
        warn!(
            "scene-bot call failed ({}), trying demo endpoint: {}",
            original.code(),
            original
        );

        let url = format!("{base}{DEMO_PATH}");
        match self.try_demo(&url, request, call_timeout, opts).await {
            Ok(reply) => {
                info!("demo endpoint answered after primary failure");
                Ok(reply)
            }
            Err(demo_err) => {
                warn!("demo fallback failed: {demo_err}");
                Err(SceneBotError::fallback_failed(original))
            }
        }
    }

    async fn try_demo(
        &self,
        url: &str,
        request: &ChatRequest<'_>,
        call_timeout: Duration,
        opts: &CallOptions,
    ) -> Result<String> {
        let builder = self.http.post(url).json(request).timeout(call_timeout);
        let response = bounded_send(builder.send(), call_timeout, opts.cancel.as_ref()).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SceneBotError::BadResponse(format!(
                "demo endpoint returned {status}"
            )));
        }

        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(e) if e.is_decode() => {
                return Err(SceneBotError::BadResponse(format!(
                    "demo body is not JSON: {e}"
                )))
            }
            Err(e) => return Err(classify_transport_error(&e)),
        };

        extract_demo_reply(&body).ok_or_else(|| {
            SceneBotError::BadResponse("demo body has no reply or message field".to_string())
        })
    }
}

/// Drive a request future under the call's deadline and optional external
/// cancellation, classifying transport failures into the error taxonomy.
async fn bounded_send<T>(
    fut: impl std::future::Future<Output = reqwest::Result<T>>,
    call_timeout: Duration,
    cancel: Option<&CancellationToken>,
) -> Result<T> {
    let bounded = tokio::time::timeout(call_timeout + TIMEOUT_GRACE, fut);

    let outcome = match cancel {
        Some(cancel) => tokio::select! {
            _ = cancel.cancelled() => {
                return Err(SceneBotError::Timeout("cancelled by caller".to_string()));
            }
            outcome = bounded => outcome,
        },
        None => bounded.await,
    };

    match outcome {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(classify_transport_error(&e)),
        Err(_) => Err(SceneBotError::Timeout(format!(
            "no response within {}ms",
            call_timeout.as_millis()
        ))),
    }
}

fn classify_status(status: StatusCode) -> SceneBotError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SceneBotError::Unauthorized {
            status: status.as_u16(),
        },
        s if s.is_server_error() => {
            SceneBotError::unavailable(format!("backend returned {s}"))
        }
        s => SceneBotError::BadResponse(format!("unexpected status {s}")),
    }
}

fn classify_transport_error(e: &reqwest::Error) -> SceneBotError {
    if e.is_timeout() {
        return SceneBotError::Timeout(e.to_string());
    }
    if is_dns_failure(e) {
        return SceneBotError::DnsFail(e.to_string());
    }
    SceneBotError::unavailable(format!("request failed: {e}"))
}

/// reqwest has no first-class DNS error kind; the resolver failure sits
/// somewhere down the source chain.
fn is_dns_failure(e: &reqwest::Error) -> bool {
    let mut text = e.to_string();
    let mut source = std::error::Error::source(e);
    loop {
        if text.contains("dns error") || text.contains("failed to lookup address") {
            return true;
        }
        match source {
            Some(err) => {
                text = err.to_string();
                source = err.source();
            }
            None => return false,
        }
    }
}

fn content_type_is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_ascii_lowercase().contains("application/json"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::token::MemoryTokenStore;
    use reqwest::header::HeaderValue;

    fn client_with(backend_url: &str, allow_http: bool) -> SceneBotClient {
        let config = SceneBotConfig {
            backend_url: backend_url.to_string(),
            allow_http,
            ..SceneBotConfig::default()
        };
        SceneBotClient::new(config, Arc::new(MemoryTokenStore::default()))
    }

    #[test]
    fn backend_base_requires_a_url() {
        let err = client_with("", false).backend_base().unwrap_err();
        assert_eq!(err.code(), ErrorCode::NoBackend);

        let err = client_with("   ", false).backend_base().unwrap_err();
        assert_eq!(err.code(), ErrorCode::NoBackend);
    }

    #[test]
    fn backend_base_rejects_plain_http_by_default() {
        let err = client_with("http://scene.example.com", false)
            .backend_base()
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NoBackend);
    }

    #[test]
    fn backend_base_allows_http_when_configured() {
        let base = client_with("http://127.0.0.1:8080/", true)
            .backend_base()
            .unwrap();
        assert_eq!(base, "http://127.0.0.1:8080");
    }

    #[test]
    fn backend_base_trims_trailing_slashes() {
        let base = client_with("https://scene.example.com/", false)
            .backend_base()
            .unwrap();
        assert_eq!(base, "https://scene.example.com");
    }

    #[tokio::test]
    async fn preclaimed_gate_rejects_without_touching_the_network() {
        let config = SceneBotConfig {
            backend_url: "https://scene.example.com".to_string(),
            ..SceneBotConfig::default()
        };
        let gate = CallGate::new(std::time::Duration::from_millis(800));
        gate.try_claim().unwrap();

        let client =
            SceneBotClient::with_gate(config, Arc::new(MemoryTokenStore::default()), gate);
        let err = client.send("hello").await.unwrap_err();

        assert_eq!(err.code(), ErrorCode::ClientRateLimit);
    }

    #[test]
    fn status_mapping_matches_the_taxonomy() {
        assert_eq!(
            classify_status(StatusCode::UNAUTHORIZED).code(),
            ErrorCode::Unauthorized
        );
        assert_eq!(
            classify_status(StatusCode::FORBIDDEN).code(),
            ErrorCode::Unauthorized
        );
        assert_eq!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR).code(),
            ErrorCode::ServiceUnavailable
        );
        assert_eq!(
            classify_status(StatusCode::BAD_GATEWAY).code(),
            ErrorCode::ServiceUnavailable
        );
        assert_eq!(
            classify_status(StatusCode::NOT_FOUND).code(),
            ErrorCode::BadResponse
        );
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS).code(),
            ErrorCode::BadResponse
        );
    }

    #[test]
    fn json_content_type_detection() {
        let mut headers = HeaderMap::new();
        assert!(!content_type_is_json(&headers));

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        assert!(!content_type_is_json(&headers));

        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        assert!(content_type_is_json(&headers));
    }
}
