//! JSON API client bound to one base URL.
//!
//! Paths passed to [`ApiClient::get_json`] and [`ApiClient::post_json`] are
//! joined onto the base URL, which is normalized to end with a single `/`
//! so that `https://api.example.com/v1` and `https://api.example.com/v1/`
//! resolve `quote` to the same endpoint.
//!
//! Only `200 OK` bodies are decoded. Any other status is returned as
//! [`HttpError::HttpStatus`] with the raw body attached.

use std::time::Duration;

use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
#[cfg(feature = "telemetry")]
use tracing::instrument;
use url::Url;

use crate::retry::{RetryMiddleware, RetryPolicy};

/// Errors raised by [`ApiClient`].
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// The base URL or an endpoint path did not form a valid URL.
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        /// What was being parsed.
        context: String,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },
    /// The request body could not be serialized.
    #[error("Failed to serialize JSON: {context}: {source}")]
    JsonSerialization {
        /// Method and URL of the request.
        context: String,
        /// The underlying serde error.
        #[source]
        source: serde_json::Error,
    },
    /// Transport failure after all retries.
    #[error("HTTP error: {context}: {source}")]
    Http {
        /// Method and URL of the request.
        context: String,
        /// The underlying middleware or reqwest error.
        #[source]
        source: reqwest_middleware::Error,
    },
    /// The `200 OK` body was not the expected JSON.
    #[error("Failed to deserialize JSON: {context}: {source}")]
    JsonDeserialization {
        /// Method and URL of the request.
        context: String,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// The server answered with a status other than `200 OK`.
    #[error("Unexpected HTTP status {status}: {context}: {body}")]
    HttpStatus {
        /// Method and URL of the request.
        context: String,
        /// Status returned by the server.
        status: StatusCode,
        /// Raw response body.
        body: String,
    },
    /// The body of an error response could not be read.
    #[error("Failed to read response body: {context}: {source}")]
    ResponseBodyRead {
        /// Method and URL of the request.
        context: String,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
}

impl HttpError {
    /// Returns the status code for [`HttpError::HttpStatus`].
    #[must_use]
    pub const fn status(&self) -> Option<StatusCode> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Parses `base` into a URL ending with exactly one `/`.
///
/// # Errors
///
/// Returns [`HttpError::UrlParse`] if `base` is not an absolute URL.
pub fn normalize_base_url(base: &str) -> Result<Url, HttpError> {
    let mut normalized = base.trim().trim_end_matches('/').to_owned();
    normalized.push('/');
    Url::parse(&normalized).map_err(|source| HttpError::UrlParse {
        context: format!("base url {base}"),
        source,
    })
}

/// A JSON client for one API base URL.
///
/// Cloning is cheap and clones share the connection pool.
#[derive(Clone, Debug)]
pub struct ApiClient {
    base_url: Url,
    client: ClientWithMiddleware,
    headers: HeaderMap,
    timeout: Option<Duration>,
}

impl ApiClient {
    /// Creates a client with the default [`RetryPolicy`].
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self::with_retry_policy(base_url, RetryPolicy::default())
    }

    /// Creates a client whose requests go through a [`RetryMiddleware`]
    /// configured with `policy`.
    #[must_use]
    pub fn with_retry_policy(base_url: Url, policy: RetryPolicy) -> Self {
        let client = ClientBuilder::new(reqwest::Client::new())
            .with(RetryMiddleware::new(policy))
            .build();
        Self {
            base_url,
            client,
            headers: HeaderMap::new(),
            timeout: None,
        }
    }

    /// Attaches custom headers to all future requests.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets a per-attempt timeout for all future requests.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns the base URL.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolves `path` against the base URL.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::UrlParse`] if the joined URL is invalid.
    pub fn endpoint(&self, path: &str) -> Result<Url, HttpError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|source| HttpError::UrlParse {
                context: format!("endpoint {path}"),
                source,
            })
    }

    /// Sends `GET {base}/{path}` and decodes the JSON response.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError`] if the URL is invalid, the request fails after
    /// retries, the status is not `200 OK`, or the body is not valid JSON
    /// for `R`.
    pub async fn get_json<R>(&self, path: &str) -> Result<R, HttpError>
    where
        R: serde::de::DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        let context = format!("GET {url}");
        let req = self.client.get(url);
        self.send_json(req, context).await
    }

    /// Sends `POST {base}/{path}` with a JSON body and decodes the JSON
    /// response.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError`] if the URL is invalid, the payload cannot be
    /// serialized, the request fails after retries, the status is not
    /// `200 OK`, or the body is not valid JSON for `R`.
    pub async fn post_json<T, R>(&self, path: &str, payload: &T) -> Result<R, HttpError>
    where
        T: serde::Serialize + ?Sized,
        R: serde::de::DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        let context = format!("POST {url}");
        let body = serde_json::to_vec(payload).map_err(|source| HttpError::JsonSerialization {
            context: context.clone(),
            source,
        })?;
        let req = self
            .client
            .post(url)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .body(body);
        self.send_json(req, context).await
    }

    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "permitkit.http.request", skip_all, err, fields(request = %context))
    )]
    async fn send_json<R>(&self, mut req: RequestBuilder, context: String) -> Result<R, HttpError>
    where
        R: serde::de::DeserializeOwned,
    {
        for (key, value) in &self.headers {
            req = req.header(key, value);
        }
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let response = match req.send().await {
            Ok(response) => response,
            Err(source) => return Err(HttpError::Http { context, source }),
        };

        if response.status() == StatusCode::OK {
            response
                .json::<R>()
                .await
                .map_err(|source| HttpError::JsonDeserialization { context, source })
        } else {
            let status = response.status();
            match response.text().await {
                Ok(body) => Err(HttpError::HttpStatus {
                    context,
                    status,
                    body,
                }),
                Err(source) => Err(HttpError::ResponseBodyRead { context, source }),
            }
        }
    }
}

impl TryFrom<&str> for ApiClient {
    type Error = HttpError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        normalize_base_url(value).map(Self::new)
    }
}

impl TryFrom<String> for ApiClient {
    type Error = HttpError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}
