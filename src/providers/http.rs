use log::warn;
use reqwest::{RequestBuilder, Response, StatusCode};
use std::time::Duration;

use crate::error::{OpsweepError, Result};

const RATE_LIMIT_RETRIES: u32 = 1;
const RETRY_DELAY_SECONDS: u64 = 10;

/// Retry behavior for rate-limited requests.
///
/// The services involved document a single meaningful throttle response
/// (429), so the policy is one retry after a fixed delay.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: RATE_LIMIT_RETRIES,
            delay: Duration::from_secs(RETRY_DELAY_SECONDS),
        }
    }
}

impl RetryPolicy {
    /// Policy with no delay between attempts, for tests.
    #[cfg(test)]
    pub fn immediate() -> Self {
        Self {
            retries: RATE_LIMIT_RETRIES,
            delay: Duration::ZERO,
        }
    }
}

/// Send a request and map the documented error responses onto the crate
/// taxonomy.
///
/// The `build` closure is invoked once per attempt since a `RequestBuilder`
/// is consumed by `send`. 401/403 become `Auth` (fatal upstream), 404
/// becomes `NotFound`, 429 is retried per the policy and then surfaced as
/// `RateLimited`. Any other non-success status is carried as `Api`.
pub async fn send_checked(
    service: &'static str,
    policy: RetryPolicy,
    build: impl Fn() -> RequestBuilder,
) -> Result<Response> {
    let mut attempts = 0;
    loop {
        let response = build().send().await?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            if attempts >= policy.retries {
                return Err(OpsweepError::RateLimited {
                    service,
                    retries: attempts,
                });
            }
            warn!(
                "{service} rate limited (status 429), retrying in {}s ({}/{})...",
                policy.delay.as_secs(),
                attempts + 1,
                policy.retries
            );
            tokio::time::sleep(policy.delay).await;
            attempts += 1;
            continue;
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(OpsweepError::Auth(format!(
                "{service} rejected the credentials (status {})",
                status.as_u16()
            )));
        }

        if status == StatusCode::NOT_FOUND {
            return Err(OpsweepError::NotFound(format!(
                "{service} returned 404 for the requested resource"
            )));
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(OpsweepError::Api {
                status: status.as_u16(),
                message,
            });
        }

        return Ok(response);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> reqwest::Client {
        reqwest::Client::new()
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/ok")
            .with_status(200)
            .with_body("fine")
            .create_async()
            .await;

        let url = format!("{}/ok", server.url());
        let response = send_checked("test", RetryPolicy::immediate(), || client().get(&url))
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rate_limit_gives_up_after_one_retry() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/limited")
            .with_status(429)
            .expect(2)
            .create_async()
            .await;

        let url = format!("{}/limited", server.url());
        let err = send_checked("test", RetryPolicy::immediate(), || client().get(&url))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            OpsweepError::RateLimited {
                service: "test",
                retries: 1
            }
        ));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_auth() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/secret")
            .with_status(401)
            .create_async()
            .await;

        let url = format!("{}/secret", server.url());
        let err = send_checked("test", RetryPolicy::immediate(), || client().get(&url))
            .await
            .unwrap_err();

        assert!(matches!(err, OpsweepError::Auth(_)));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_missing_maps_to_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/absent")
            .with_status(404)
            .create_async()
            .await;

        let url = format!("{}/absent", server.url());
        let err = send_checked("test", RetryPolicy::immediate(), || client().get(&url))
            .await
            .unwrap_err();

        assert!(matches!(err, OpsweepError::NotFound(_)));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_server_error_carries_status_and_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/broken")
            .with_status(503)
            .with_body("maintenance window")
            .create_async()
            .await;

        let url = format!("{}/broken", server.url());
        let err = send_checked("test", RetryPolicy::immediate(), || client().get(&url))
            .await
            .unwrap_err();

        match err {
            OpsweepError::Api { status, message } => {
                assert_eq!(status, 503);
                assert_eq!(message, "maintenance window");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
