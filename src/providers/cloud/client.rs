use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use serde::Deserialize;
use url::Url;

use crate::auth::Token;
use crate::error::{OpsweepError, Result};
use crate::providers::http::{send_checked, RetryPolicy};

use super::types::{Environment, EnvironmentQuery, EnvironmentSettings, Instance, ReservedAddress};

const SERVICE: &str = "cloud API";

/// Client for the platform's environment-management API.
#[derive(Clone)]
pub struct CloudClient {
    /// HTTP client
    client: reqwest::Client,
    /// API base URL
    base_url: Url,
    /// Application whose environments are addressed
    application: String,
    retry: RetryPolicy,
}

impl CloudClient {
    /// Create a new environment API client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - API base URL (e.g., <https://paas.example.com>)
    /// * `application` - Application name owning the environments
    /// * `token` - API token; required by every deployment we know of,
    ///   but optional here so listing against local fixtures works
    pub fn new(base_url: &str, application: String, token: Option<Token>) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| OpsweepError::Config(format!("Invalid cloud API URL: {e}")))?;

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("opsweep/0.3"));

        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token.as_str()))
                .map_err(|e| OpsweepError::Config(format!("Invalid cloud API token: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| OpsweepError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            application,
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
            .map_err(|e| OpsweepError::Config(format!("Invalid cloud API endpoint: {e}")))
    }

    /// List the application's environments, optionally filtered by name
    /// and optionally including recently terminated ones.
    pub async fn list_environments(&self, query: &EnvironmentQuery) -> Result<Vec<Environment>> {
        let url = self.endpoint(&format!("v1/applications/{}/environments", self.application))?;

        let mut params: Vec<(&str, String)> = query
            .names
            .iter()
            .map(|name| ("name", name.clone()))
            .collect();
        if query.include_deleted {
            params.push(("include_deleted", "true".to_string()));
            if let Some(back_to) = query.deleted_back_to {
                params.push(("deleted_back_to", back_to.to_rfc3339()));
            }
        }

        let response = send_checked(SERVICE, self.retry, || {
            self.client.get(url.clone()).query(&params)
        })
        .await?;

        let body: EnvironmentsResponse = response.json().await?;
        Ok(body.environments)
    }

    /// Terminate a running environment.
    pub async fn terminate_environment(&self, id: &str) -> Result<()> {
        let url = self.endpoint(&format!("v1/environments/{id}/terminate"))?;
        send_checked(SERVICE, self.retry, || self.client.post(url.clone())).await?;
        Ok(())
    }

    /// Rebuild a terminated environment from its last configuration.
    pub async fn rebuild_environment(&self, id: &str) -> Result<()> {
        let url = self.endpoint(&format!("v1/environments/{id}/rebuild"))?;
        send_checked(SERVICE, self.retry, || self.client.post(url.clone())).await?;
        Ok(())
    }

    /// Fetch the configuration variables of an environment.
    pub async fn environment_settings(&self, id: &str) -> Result<EnvironmentSettings> {
        let url = self.endpoint(&format!("v1/environments/{id}/settings"))?;
        let response = send_checked(SERVICE, self.retry, || self.client.get(url.clone())).await?;

        let body: SettingsResponse = response.json().await?;
        Ok(body.settings)
    }

    /// Fetch the instance currently serving an environment.
    pub async fn environment_instance(&self, id: &str) -> Result<Instance> {
        let url = self.endpoint(&format!("v1/environments/{id}/instance"))?;
        let response = send_checked(SERVICE, self.retry, || self.client.get(url.clone())).await?;

        let body: InstanceResponse = response.json().await?;
        Ok(body.instance)
    }

    /// Fetch the reserved address tagged with an environment name.
    pub async fn reserved_address(&self, name: &str) -> Result<ReservedAddress> {
        let url = self.endpoint(&format!("v1/applications/{}/addresses", self.application))?;
        let response = send_checked(SERVICE, self.retry, || {
            self.client.get(url.clone()).query(&[("name", name)])
        })
        .await?;

        let body: AddressesResponse = response.json().await?;
        body.addresses.into_iter().next().ok_or_else(|| {
            OpsweepError::NotFound(format!("No reserved address tagged {name}"))
        })
    }

    /// Point a reserved address at a network interface, taking it over
    /// from whatever held it before.
    pub async fn associate_address(
        &self,
        allocation_id: &str,
        network_interface_id: &str,
    ) -> Result<()> {
        let url = self.endpoint(&format!("v1/addresses/{allocation_id}/associate"))?;
        let body = serde_json::json!({
            "network_interface_id": network_interface_id,
            "allow_reassociation": true,
        });

        send_checked(SERVICE, self.retry, || {
            self.client.post(url.clone()).json(&body)
        })
        .await?;
        Ok(())
    }
}

#[derive(Deserialize)]
struct EnvironmentsResponse {
    environments: Vec<Environment>,
}

#[derive(Deserialize)]
struct SettingsResponse {
    settings: EnvironmentSettings,
}

#[derive(Deserialize)]
struct InstanceResponse {
    instance: Instance,
}

#[derive(Deserialize)]
struct AddressesResponse {
    addresses: Vec<ReservedAddress>,
}
