use reqwest::RequestBuilder;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::auth::BasicCredentials;
use crate::error::{OpsweepError, Result};
use crate::providers::http::{send_checked, RetryPolicy};

use super::types::Issue;

const SERVICE: &str = "tracker API";

/// Fields requested on every search; keeps payloads small and matches
/// what the reports actually render.
const SEARCH_FIELDS: [&str; 7] = [
    "summary",
    "status",
    "labels",
    "assignee",
    "reporter",
    "updated",
    "issuetype",
];

/// Client for the issue tracker's REST API.
#[derive(Clone)]
pub struct TrackerClient {
    client: reqwest::Client,
    base_url: Url,
    credentials: BasicCredentials,
    retry: RetryPolicy,
}

impl TrackerClient {
    pub fn new(base_url: &str, credentials: BasicCredentials) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| OpsweepError::Config(format!("Invalid tracker URL: {e}")))?;

        let client = reqwest::Client::builder()
            .user_agent("opsweep/0.3")
            .build()
            .map_err(|e| OpsweepError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            credentials,
            retry: RetryPolicy::default(),
        })
    }

    #[cfg(test)]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| OpsweepError::Config(format!("Invalid tracker endpoint: {e}")))
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth(
            &self.credentials.username,
            Some(self.credentials.token.as_str()),
        )
    }

    /// Search issues with a JQL filter, newest first.
    pub async fn search_issues(&self, jql: &str, max_results: usize) -> Result<Vec<Issue>> {
        let url = self.endpoint("rest/api/2/search")?;
        let body = json!({
            "jql": jql,
            "maxResults": max_results,
            "fields": SEARCH_FIELDS,
        });

        let response = send_checked(SERVICE, self.retry, || {
            self.authed(self.client.post(url.clone()).json(&body))
        })
        .await?;

        let body: SearchResponse = response.json().await?;
        Ok(body.issues)
    }

    /// Add a label to an issue, keeping existing labels.
    pub async fn add_label(&self, key: &str, label: &str) -> Result<()> {
        let url = self.endpoint(&format!("rest/api/2/issue/{key}"))?;
        let body = json!({
            "update": { "labels": [ { "add": label } ] }
        });

        send_checked(SERVICE, self.retry, || {
            self.authed(self.client.put(url.clone()).json(&body))
        })
        .await?;
        Ok(())
    }

    /// Post a comment on an issue.
    pub async fn add_comment(&self, key: &str, text: &str) -> Result<()> {
        let url = self.endpoint(&format!("rest/api/2/issue/{key}/comment"))?;
        let body = json!({ "body": text });

        send_checked(SERVICE, self.retry, || {
            self.authed(self.client.post(url.clone()).json(&body))
        })
        .await?;
        Ok(())
    }

    /// Web URL of an issue, for reports.
    pub fn browse_url(&self, key: &str) -> String {
        format!("{}browse/{key}", self.base_url)
    }
}

/// Builds the JQL filter shared by every search this tool issues.
///
/// `keys` narrows the search to specific issues when given; otherwise the
/// status set selects the candidates.
pub fn search_filter(project: &str, statuses: &[String], keys: &[String]) -> String {
    let mut clauses = vec![format!("project = \"{project}\"")];

    if !keys.is_empty() {
        clauses.push(format!("issuekey in ({})", keys.join(", ")));
    } else if !statuses.is_empty() {
        let quoted: Vec<String> = statuses.iter().map(|s| format!("\"{s}\"")).collect();
        clauses.push(format!("status in ({})", quoted.join(", ")));
    }

    format!("{} ORDER BY created DESC", clauses.join(" AND "))
}

#[derive(Deserialize)]
struct SearchResponse {
    issues: Vec<Issue>,
}
