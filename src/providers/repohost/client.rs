use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use crate::auth::Token;
use crate::error::{OpsweepError, Result};
use crate::providers::http::{send_checked, RetryPolicy};

use super::types::{MergeRequest, Pipeline};

const SERVICE: &str = "repository host API";

/// Client for the repository host's REST API.
///
/// The base URL addresses a single repository (workspace and slug
/// included); the operations are listing its merge requests and its CI
/// runs.
#[derive(Clone)]
pub struct RepoHostClient {
    client: reqwest::Client,
    base_url: Url,
    retry: RetryPolicy,
}

impl RepoHostClient {
    pub fn new(base_url: &str, token: Option<Token>) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| OpsweepError::Config(format!("Invalid repository host URL: {e}")))?;

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("opsweep/0.3"));

        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token.as_str()))
                .map_err(|e| OpsweepError::Config(format!("Invalid repository host token: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| OpsweepError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            retry: RetryPolicy::default(),
        })
    }

    #[cfg(test)]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// List the repository's open and merged requests, newest first.
    ///
    /// Declined and superseded requests are not fetched; nothing
    /// downstream classifies them.
    pub async fn list_merge_requests(&self, limit: usize) -> Result<Vec<MergeRequest>> {
        self.list_paged(
            "pullrequests",
            &[
                ("state", "OPEN"),
                ("state", "MERGED"),
                ("sort", "-created_on"),
            ],
            limit,
        )
        .await
    }

    /// List the repository's CI runs, newest first.
    pub async fn list_pipelines(&self, limit: usize) -> Result<Vec<Pipeline>> {
        self.list_paged("pipelines", &[("sort", "-created_on")], limit).await
    }

    /// Follows the host's `next` pagination links until `limit` items are
    /// collected or the pages run out. Filters apply to the first request
    /// only; `next` links carry them forward.
    async fn list_paged<T: DeserializeOwned>(
        &self,
        path: &str,
        filters: &[(&str, &str)],
        limit: usize,
    ) -> Result<Vec<T>> {
        let first_page = self
            .base_url
            .join(path)
            .map_err(|e| OpsweepError::Config(format!("Invalid repository host endpoint: {e}")))?;

        let mut all = Vec::new();
        let mut page_url = Some(first_page);
        let mut first = true;

        while let Some(url) = page_url.take() {
            let response = send_checked(SERVICE, self.retry, || {
                let request = self.client.get(url.clone());
                if first {
                    request.query(filters)
                } else {
                    request
                }
            })
            .await?;

            let page: Page<T> = response.json().await?;
            all.extend(page.values);
            first = false;

            if all.len() >= limit {
                break;
            }
            page_url = match page.next.as_deref().map(Url::parse) {
                Some(Ok(next)) => Some(next),
                Some(Err(e)) => {
                    return Err(OpsweepError::Api {
                        status: 200,
                        message: format!("Unparseable pagination link: {e}"),
                    })
                }
                None => None,
            };
        }

        all.truncate(limit);
        Ok(all)
    }
}

#[derive(Deserialize)]
struct Page<T> {
    values: Vec<T>,
    #[serde(default)]
    next: Option<String>,
}
