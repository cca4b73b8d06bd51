//! Fixed-delay retry for transient HTTP failures.
//!
//! A request is retried when the connection could not be established, when
//! it timed out, or when the server answered `429` or any `5xx`. Everything
//! else, including every other `4xx`, is returned to the caller as is.

use std::time::Duration;

use http::{Extensions, StatusCode};
use reqwest::{Request, Response};
use reqwest_middleware as rqm;
#[cfg(feature = "telemetry")]
use tracing::{instrument, warn};

/// How many times a request is attempted and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Values below 1 behave as 1.
    pub max_attempts: u32,
    /// Pause between two attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Default attempt ceiling.
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
    /// Default inter-attempt delay.
    pub const DEFAULT_DELAY: Duration = Duration::from_millis(500);

    /// Creates a policy.
    #[must_use]
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// A policy that sends every request exactly once.
    #[must_use]
    pub const fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ATTEMPTS, Self::DEFAULT_DELAY)
    }
}

/// Returns `true` if a response with this status is worth another attempt.
#[must_use]
pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_retryable(result: &rqm::Result<Response>) -> bool {
    match result {
        Ok(response) => is_retryable_status(response.status()),
        Err(rqm::Error::Reqwest(e)) => e.is_connect() || e.is_timeout(),
        Err(_) => false,
    }
}

/// Middleware retrying transient failures according to a [`RetryPolicy`].
///
/// Requests whose body cannot be cloned (streams) are sent once.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryMiddleware {
    policy: RetryPolicy,
}

impl RetryMiddleware {
    /// Creates the middleware.
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Returns the policy in use.
    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        self.policy
    }
}

#[async_trait::async_trait]
impl rqm::Middleware for RetryMiddleware {
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "permitkit.http.retry", skip_all, fields(url = %req.url()))
    )]
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: rqm::Next<'_>,
    ) -> rqm::Result<Response> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut pending = req;
        let mut attempt = 1;
        loop {
            let retry_req = if attempt < max_attempts {
                pending.try_clone()
            } else {
                None
            };
            let result = next.clone().run(pending, extensions).await;
            let Some(again) = retry_req else {
                return result;
            };
            if !is_retryable(&result) {
                return result;
            }

            #[cfg(feature = "telemetry")]
            {
                match &result {
                    Ok(response) => warn!(attempt, status = %response.status(), "retrying request"),
                    Err(e) => warn!(attempt, error = %e, "retrying request"),
                }
            }

            tokio::time::sleep(self.policy.delay).await;
            pending = again;
            attempt += 1;
        }
    }
}
