//! Text-generation backend interaction with bounded retry.
//!
//! # Architecture
//!
//! - [`AskAsync`]: core trait for "send a prompt, get text back"
//! - [`GeminiClient`]: Gemini `generateContent` REST implementation
//! - [`RetryAsk`]: decorator that retries any `AskAsync` a fixed number of
//!   times with a fixed delay between attempts
//!
//! The client is constructed explicitly and handed to the composer, so tests
//! swap in a substitute backend without touching process-wide state.

use crate::utils::truncate_for_log;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

/// Trait for async text generation.
///
/// Implementors send a prompt to a model and return its response. The
/// abstraction lets the composer run against decorators (like retry) and
/// test doubles.
pub trait AskAsync {
    /// The type of response returned by the backend.
    type Response;

    /// Send `text` to the backend and receive a response.
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>>;
}

/// Retry wrapper around any [`AskAsync`] implementation.
///
/// Makes at most `max_attempts` calls, sleeping `delay` between consecutive
/// attempts. The last error is returned when every attempt fails.
pub struct RetryAsk<T> {
    inner: T,
    max_attempts: usize,
    delay: Duration,
}

impl<T> RetryAsk<T>
where
    T: AskAsync,
{
    /// `max_attempts` is clamped to at least one call.
    pub fn new(inner: T, max_attempts: usize, delay: Duration) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }
}

impl<T> fmt::Debug for RetryAsk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAsk")
            .field("max_attempts", &self.max_attempts)
            .field("delay", &self.delay)
            .finish()
    }
}

impl<T> AskAsync for RetryAsk<T>
where
    T: AskAsync,
{
    type Response = T::Response;

    #[instrument(level = "info", skip_all)]
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            attempt += 1;
            let attempt_t0 = Instant::now();
            match self.inner.ask(text).await {
                Ok(resp) => {
                    info!(
                        attempt,
                        elapsed_ms_total = total_t0.elapsed().as_millis(),
                        "ask() succeeded"
                    );
                    return Ok(resp);
                }
                Err(e) => {
                    if attempt >= self.max_attempts {
                        error!(
                            attempt,
                            max = self.max_attempts,
                            elapsed_ms_total = total_t0.elapsed().as_millis(),
                            error = %e,
                            "ask() exhausted attempts"
                        );
                        return Err(e);
                    }

                    warn!(
                        attempt,
                        max = self.max_attempts,
                        elapsed_ms_attempt = attempt_t0.elapsed().as_millis(),
                        delay = ?self.delay,
                        error = %e,
                        "ask() attempt failed; waiting before retry"
                    );
                    sleep(self.delay).await;
                }
            }
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

/// The key travels in a header so request URLs, and the reqwest errors that
/// quote them, never carry it.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini `generateContent` client.
pub struct GeminiClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl GeminiClient {
    /// `endpoint` is the API base, e.g. `https://generativelanguage.googleapis.com/v1beta`.
    pub fn new(
        endpoint: &str,
        model: &str,
        api_key: &str,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

impl AskAsync for GeminiClient {
    type Response = String;

    #[instrument(level = "info", skip_all, fields(model = %self.model))]
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>> {
        let t0 = Instant::now();
        let body = GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text }],
            }],
        };
        let response = self
            .client
            .post(self.url())
            .header(API_KEY_HEADER, self.api_key.as_str())
            .json(&body)
            .send()
            .await
            .map_err(reqwest::Error::without_url)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(
                elapsed_ms = t0.elapsed().as_millis(),
                %status,
                "Generation call rejected"
            );
            return Err(format!(
                "generation backend returned {status}: {}",
                truncate_for_log(&detail, 200)
            )
            .into());
        }

        let parsed: GenerateResponse = response.json().await.map_err(reqwest::Error::without_url)?;
        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err("generation backend returned no text".into());
        }
        info!(
            elapsed_ms = t0.elapsed().as_millis(),
            chars = text.chars().count(),
            "Generation call succeeded"
        );
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    /// Fails `failures` times, then answers.
    struct FlakyBackend {
        failures: usize,
        calls: Cell<usize>,
    }

    impl AskAsync for FlakyBackend {
        type Response = String;

        async fn ask(&self, text: &str) -> Result<String, Box<dyn Error>> {
            self.calls.set(self.calls.get() + 1);
            if self.calls.get() <= self.failures {
                Err(format!("transient failure #{}", self.calls.get()).into())
            } else {
                Ok(format!("answer to {text}"))
            }
        }
    }

    fn flaky(failures: usize) -> FlakyBackend {
        FlakyBackend { failures, calls: Cell::new(0) }
    }

    #[tokio::test]
    async fn test_retry_recovers_after_two_failures() {
        let retry = RetryAsk::new(flaky(2), 3, Duration::ZERO);
        let answer = retry.ask("prompt").await.unwrap();
        assert_eq!(answer, "answer to prompt");
        assert_eq!(retry.inner.calls.get(), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_bound() {
        let retry = RetryAsk::new(flaky(usize::MAX), 3, Duration::ZERO);
        let err = retry.ask("prompt").await.unwrap_err();
        assert_eq!(err.to_string(), "transient failure #3");
        assert_eq!(retry.inner.calls.get(), 3);
    }

    #[tokio::test]
    async fn test_retry_zero_attempts_still_calls_once() {
        let retry = RetryAsk::new(flaky(0), 0, Duration::ZERO);
        assert_eq!(retry.max_attempts(), 1);
        assert!(retry.ask("x").await.is_ok());
        assert_eq!(retry.inner.calls.get(), 1);
    }

    #[tokio::test]
    async fn test_gemini_client_parses_candidates() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1beta/models/gemini-2.0-flash:generateContent")
            .match_header(API_KEY_HEADER, "test-key")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"contents":[{"parts":[{"text":"hello"}]}]}"#.into(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r###"{"candidates":[{"content":{"parts":[{"text":"## Digest"},{"text":" body"}],"role":"model"}}]}"###)
            .create_async()
            .await;

        let client = GeminiClient::new(
            &format!("{}/v1beta", server.url()),
            "gemini-2.0-flash",
            "test-key",
            Duration::from_secs(5),
        )
        .unwrap();
        let text = client.ask("hello").await.unwrap();
        mock.assert_async().await;
        assert_eq!(text, "## Digest body");
    }

    #[tokio::test]
    async fn test_gemini_client_surfaces_http_failure() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", mockito::Matcher::Any)
            .with_status(429)
            .with_body(r#"{"message":"quota"}"#)
            .create_async()
            .await;

        let client =
            GeminiClient::new(&server.url(), "gemini-2.0-flash", "k", Duration::from_secs(5)).unwrap();
        let err = client.ask("hello").await.unwrap_err();
        assert!(err.to_string().contains("429"));
    }

    #[tokio::test]
    async fn test_gemini_client_rejects_empty_candidates() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", mockito::Matcher::Any)
            .with_status(200)
            .with_body(r#"{"candidates":[]}"#)
            .create_async()
            .await;

        let client =
            GeminiClient::new(&server.url(), "gemini-2.0-flash", "k", Duration::from_secs(5)).unwrap();
        assert!(client.ask("hello").await.is_err());
    }

    #[tokio::test]
    async fn test_gemini_client_errors_never_quote_the_key() {
        // Nothing listens on the discard port.
        let client = GeminiClient::new(
            "http://127.0.0.1:9/v1beta",
            "gemini-2.0-flash",
            "SECRET-GEMINI-KEY",
            Duration::from_secs(5),
        )
        .unwrap();
        let err = client.ask("hello").await.unwrap_err();
        assert!(!err.to_string().contains("SECRET-GEMINI-KEY"), "{err}");
    }
}
