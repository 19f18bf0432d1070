use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{FetchError, FetchErrorKind};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_ATTEMPTS: u32 = 3;

/// Deterministic backoff ladder between attempts; no jitter so that reruns
/// behave identically.
const BACKOFF_MS: &[u64] = &[500, 1000, 2000];

/// Statuses worth a retry. Everything else in 4xx is a hard answer.
const RETRYABLE_STATUSES: &[u16] = &[408, 425, 429, 500, 502, 503, 504];

#[derive(Clone, Debug)]
pub struct Http {
    client: Client,
}

impl Http {
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(format!("aifd/{}", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| {
                FetchError::new(
                    FetchErrorKind::Unknown,
                    format!("failed to build HTTP client: {err}"),
                )
            })?;
        Ok(Self { client })
    }

    /// GET with up to three attempts and exponential backoff. Returns the
    /// body on 2xx; any other outcome is classified into the error taxonomy.
    pub fn get(&self, url: &str, headers: &[(&'static str, String)]) -> Result<Vec<u8>, FetchError> {
        let mut last_error = FetchError::new(FetchErrorKind::Unknown, "no attempt made");

        for attempt in 1..=MAX_ATTEMPTS {
            if attempt > 1 {
                let delay = BACKOFF_MS[(attempt as usize - 2).min(BACKOFF_MS.len() - 1)];
                std::thread::sleep(Duration::from_millis(delay));
            }

            let mut request = self.client.get(url);
            for (key, value) in headers {
                request = request.header(*key, value.as_str());
            }

            let response = match request.send() {
                Ok(response) => response,
                Err(err) => {
                    last_error = classify_transport_error(url, &err);
                    debug!(url, attempt, error = %last_error, "request transport failure");
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                return response.bytes().map(|bytes| bytes.to_vec()).map_err(|err| {
                    FetchError::new(
                        FetchErrorKind::Network,
                        format!("failed to read response body from {url}: {err}"),
                    )
                });
            }

            last_error = classify_status(url, status);
            if !RETRYABLE_STATUSES.contains(&status.as_u16()) {
                return Err(last_error);
            }
            debug!(url, attempt, status = status.as_u16(), "retryable HTTP status");
        }

        Err(last_error)
    }

    pub fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: &[(&'static str, String)],
    ) -> Result<T, FetchError> {
        let body = self.get(url, headers)?;
        serde_json::from_slice(&body).map_err(|err| {
            FetchError::new(
                FetchErrorKind::Parse,
                format!("failed to parse JSON from {url}: {err}"),
            )
        })
    }

    pub fn get_text(
        &self,
        url: &str,
        headers: &[(&'static str, String)],
    ) -> Result<String, FetchError> {
        let body = self.get(url, headers)?;
        String::from_utf8(body).map_err(|err| {
            FetchError::new(
                FetchErrorKind::Parse,
                format!("response from {url} is not valid UTF-8: {err}"),
            )
        })
    }
}

/// Builds `base` + percent-encoded path segments; registries and the git
/// host both form URLs this way so user-supplied names cannot smuggle
/// separators.
pub fn url_with_segments(base: &str, segments: &[&str]) -> Result<reqwest::Url, FetchError> {
    let mut url = reqwest::Url::parse(base).map_err(|err| {
        FetchError::new(
            FetchErrorKind::Unknown,
            format!("invalid base URL {base}: {err}"),
        )
    })?;
    url.path_segments_mut()
        .map_err(|_| {
            FetchError::new(
                FetchErrorKind::Unknown,
                format!("base URL cannot carry a path: {base}"),
            )
        })?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn classify_transport_error(url: &str, err: &reqwest::Error) -> FetchError {
    let detail = if err.is_timeout() {
        "request timed out"
    } else if err.is_connect() {
        "connection failed"
    } else {
        "transport error"
    };
    FetchError::new(
        FetchErrorKind::Network,
        format!("{detail} for {url}: {err}"),
    )
}

pub fn classify_status(url: &str, status: StatusCode) -> FetchError {
    let kind = match status.as_u16() {
        401 | 403 => FetchErrorKind::Auth,
        429 => FetchErrorKind::RateLimit,
        404 => FetchErrorKind::NotFound,
        408 | 425 => FetchErrorKind::Network,
        code if code >= 500 => FetchErrorKind::Server,
        _ => FetchErrorKind::Unknown,
    };
    FetchError::new(kind, format!("HTTP {} from {url}", status.as_u16()))
}
