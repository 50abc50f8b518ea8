use log::{info, warn};

use crate::error::Result;
use crate::providers::cloud::{CloudClient, Environment, EnvironmentQuery, LifecycleState};
use crate::report::BatchReport;

/// Re-points each environment's reserved address at its current instance.
///
/// A rebuilt environment comes up on a fresh instance with a new public
/// address, while DNS keeps pointing at the reserved one. One pass over
/// the names; per-environment failures are recorded without stopping the
/// rest.
pub struct AddressBinder {
    client: CloudClient,
    dry_run: bool,
}

impl AddressBinder {
    pub fn new(client: CloudClient, dry_run: bool) -> Self {
        Self { client, dry_run }
    }

    /// Bind the reserved address of every named environment.
    ///
    /// # Errors
    ///
    /// Only total failures (authentication, the initial listing call)
    /// abort with an error; per-environment problems are recorded in the
    /// returned report.
    pub async fn run(&self, names: &[String]) -> Result<BatchReport> {
        let query = EnvironmentQuery {
            names: names.to_vec(),
            ..Default::default()
        };
        let environments = self.client.list_environments(&query).await?;

        let mut report = BatchReport::new("attach-ip");

        for name in names {
            let Some(env) = environments.iter().find(|e| e.name == *name) else {
                warn!("Environment {name} not found, skipping");
                report.failed(name, format!("Not found: {name}"));
                continue;
            };
            if env.status != LifecycleState::Ready {
                info!("attach-ip: skipping {name} (not running)");
                report.skipped(name, format!("not running ({})", env.status.as_str()));
                continue;
            }

            match self.bind(env).await {
                Ok(public_ip) if self.dry_run => {
                    info!("attach-ip: would bind {public_ip} to {name} (dry run)");
                    report.skipped(name, "dry run");
                }
                Ok(public_ip) => {
                    info!("attach-ip: {name} now serves {public_ip}");
                    report.applied(name);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("attach-ip: {name} failed: {e}");
                    report.failed(name, e);
                }
            }
        }

        info!(
            "attach-ip: {} applied, {} skipped, {} failed",
            report.applied_count(),
            report.skipped_count(),
            report.failed_count()
        );

        Ok(report)
    }

    /// Looks up the instance and the reserved address, then associates
    /// them unless this is a dry run (the reads double as the plan).
    async fn bind(&self, env: &Environment) -> Result<String> {
        let instance = self.client.environment_instance(&env.id).await?;
        let address = self.client.reserved_address(&env.name).await?;

        if !self.dry_run {
            self.client
                .associate_address(&address.allocation_id, &instance.network_interface_id)
                .await?;
        }

        Ok(address.public_ip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::http::RetryPolicy;

    fn binder_for(server: &mockito::Server, dry_run: bool) -> AddressBinder {
        let client = CloudClient::new(&server.url(), "storefront".to_string(), Some("t".into()))
            .unwrap()
            .with_retry_policy(RetryPolicy::immediate());
        AddressBinder::new(client, dry_run)
    }

    async fn mock_listing(server: &mut mockito::Server, envs: &[(&str, &str)]) {
        let items: Vec<String> = envs
            .iter()
            .map(|(name, status)| {
                format!(
                    r#"{{"id": "e-{name}", "name": "{name}", "status": "{status}",
                        "created_at": "2024-03-01T12:00:00Z"}}"#
                )
            })
            .collect();
        server
            .mock("GET", "/v1/applications/storefront/environments")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(format!(r#"{{"environments": [{}]}}"#, items.join(",")))
            .create_async()
            .await;
    }

    async fn mock_instance(server: &mut mockito::Server, env_id: &str) {
        server
            .mock("GET", format!("/v1/environments/{env_id}/instance").as_str())
            .with_status(200)
            .with_body(
                r#"{"instance": {"id": "i-0abc", "network_interface_id": "eni-0def"}}"#,
            )
            .create_async()
            .await;
    }

    async fn mock_address(server: &mut mockito::Server, name: &str, found: bool) {
        let body = if found {
            r#"{"addresses": [{"allocation_id": "alloc-1", "public_ip": "203.0.113.7"}]}"#
        } else {
            r#"{"addresses": []}"#
        };
        server
            .mock("GET", "/v1/applications/storefront/addresses")
            .match_query(mockito::Matcher::UrlEncoded("name".into(), name.into()))
            .with_status(200)
            .with_body(body)
            .create_async()
            .await;
    }

    #[tokio::test]
    async fn test_binds_running_environment() {
        let mut server = mockito::Server::new_async().await;
        mock_listing(&mut server, &[("AJ123", "Ready")]).await;
        mock_instance(&mut server, "e-AJ123").await;
        mock_address(&mut server, "AJ123", true).await;
        let associate = server
            .mock("POST", "/v1/addresses/alloc-1/associate")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let report = binder_for(&server, false)
            .run(&["AJ123".to_string()])
            .await
            .unwrap();

        assert_eq!(report.applied_count(), 1);
        associate.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_address_fails_item_but_batch_continues() {
        let mut server = mockito::Server::new_async().await;
        mock_listing(&mut server, &[("AJ123", "Ready"), ("AJ200", "Ready")]).await;
        mock_instance(&mut server, "e-AJ123").await;
        mock_instance(&mut server, "e-AJ200").await;
        mock_address(&mut server, "AJ123", false).await;
        mock_address(&mut server, "AJ200", true).await;
        server
            .mock("POST", "/v1/addresses/alloc-1/associate")
            .with_status(200)
            .create_async()
            .await;

        let report = binder_for(&server, false)
            .run(&["AJ123".to_string(), "AJ200".to_string()])
            .await
            .unwrap();

        assert_eq!(report.failed_count(), 1);
        assert_eq!(report.applied_count(), 1);
    }

    #[tokio::test]
    async fn test_terminated_environment_is_skipped() {
        let mut server = mockito::Server::new_async().await;
        mock_listing(&mut server, &[("AJ123", "Terminated")]).await;

        let report = binder_for(&server, false)
            .run(&["AJ123".to_string()])
            .await
            .unwrap();

        assert_eq!(report.applied_count(), 0);
        assert_eq!(report.skipped_count(), 1);
    }

    #[tokio::test]
    async fn test_dry_run_reads_but_never_associates() {
        let mut server = mockito::Server::new_async().await;
        mock_listing(&mut server, &[("AJ123", "Ready")]).await;
        mock_instance(&mut server, "e-AJ123").await;
        mock_address(&mut server, "AJ123", true).await;
        let associate = server
            .mock("POST", "/v1/addresses/alloc-1/associate")
            .expect(0)
            .create_async()
            .await;

        let report = binder_for(&server, true)
            .run(&["AJ123".to_string()])
            .await
            .unwrap();

        assert_eq!(report.applied_count(), 0);
        assert_eq!(report.skipped_count(), 1);
        associate.assert_async().await;
    }
}
