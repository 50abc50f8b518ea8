use std::fmt;

use chrono::{Duration, Utc};
use indexmap::IndexMap;
use log::{info, warn};

use crate::error::Result;
use crate::providers::cloud::{CloudClient, Environment, EnvironmentQuery, LifecycleState};
use crate::providers::tracker::{search_filter, TrackerClient};
use crate::report::BatchReport;

/// What to do with the targeted environments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    /// Terminate running environments
    Pause,
    /// Rebuild terminated environments
    Resume,
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pause => f.write_str("pause"),
            Self::Resume => f.write_str("resume"),
        }
    }
}

/// How the target environments are selected.
#[derive(Debug, Clone)]
pub enum TargetSelector {
    /// Explicit environment names
    Names(Vec<String>),
    /// Every environment whose name starts with the prefix
    Prefix(String),
}

/// Single-pass pause/resume over a set of environments.
///
/// Fetches current state once, then walks the targets: anything already in
/// the requested state is a no-op, anything actionable gets one API call,
/// and per-environment failures are recorded without stopping the pass.
pub struct LifecycleController {
    client: CloudClient,
    /// Environments never paused regardless of selector
    protected: Vec<String>,
    /// Resume looks this many days back for terminated environments
    lookback_days: i64,
    dry_run: bool,
}

/// Decision for one environment, separated from I/O so the state rules
/// are testable on their own.
#[derive(Debug, PartialEq, Eq)]
enum Plan {
    Execute,
    Skip(String),
}

impl LifecycleController {
    pub fn new(
        client: CloudClient,
        protected: Vec<String>,
        lookback_days: i64,
        dry_run: bool,
    ) -> Self {
        Self {
            client,
            protected,
            lookback_days,
            dry_run,
        }
    }

    /// Run one pass of the action over the selected targets.
    ///
    /// # Errors
    ///
    /// Only total failures (authentication, the initial listing call,
    /// invalid input) abort with an error; per-environment problems are
    /// recorded in the returned report.
    pub async fn run(
        &self,
        action: LifecycleAction,
        targets: &TargetSelector,
    ) -> Result<BatchReport> {
        let query = self.listing_query(action, targets);
        let environments = self.client.list_environments(&query).await?;
        let current = newest_per_name(environments);

        let mut report = BatchReport::new(action.to_string());

        match targets {
            TargetSelector::Names(names) => {
                for name in names {
                    match current.get(name) {
                        Some(env) => self.apply(action, env, &mut report).await?,
                        None => {
                            warn!("Environment {name} not found, skipping");
                            report.failed(name, format!("Not found: {name}"));
                        }
                    }
                }
            }
            TargetSelector::Prefix(prefix) => {
                for env in current.values().filter(|e| e.name.starts_with(prefix)) {
                    self.apply(action, env, &mut report).await?;
                }
            }
        }

        info!(
            "{action}: {} applied, {} skipped, {} failed",
            report.applied_count(),
            report.skipped_count(),
            report.failed_count()
        );

        Ok(report)
    }

    fn listing_query(&self, action: LifecycleAction, targets: &TargetSelector) -> EnvironmentQuery {
        let names = match targets {
            TargetSelector::Names(names) => names.clone(),
            TargetSelector::Prefix(_) => Vec::new(),
        };

        match action {
            LifecycleAction::Pause => EnvironmentQuery {
                names,
                ..Default::default()
            },
            // Resume has to see what was recently torn down
            LifecycleAction::Resume => EnvironmentQuery {
                names,
                include_deleted: true,
                deleted_back_to: Some(Utc::now() - Duration::days(self.lookback_days)),
            },
        }
    }

    async fn apply(
        &self,
        action: LifecycleAction,
        env: &Environment,
        report: &mut BatchReport,
    ) -> Result<()> {
        match plan(action, env, &self.protected) {
            Plan::Skip(reason) => {
                info!("{}: skipping {} ({reason})", action, env.name);
                report.skipped(&env.name, reason);
            }
            Plan::Execute if self.dry_run => {
                info!("{action}: would act on {} (dry run)", env.name);
                report.skipped(&env.name, "dry run");
            }
            Plan::Execute => {
                let result = match action {
                    LifecycleAction::Pause => self.client.terminate_environment(&env.id).await,
                    LifecycleAction::Resume => self.client.rebuild_environment(&env.id).await,
                };
                match result {
                    Ok(()) => {
                        info!("{action}: {} done", env.name);
                        report.applied(&env.name);
                    }
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        warn!("{action}: {} failed: {e}", env.name);
                        report.failed(&env.name, e);
                    }
                }
            }
        }
        Ok(())
    }
}

fn plan(action: LifecycleAction, env: &Environment, protected: &[String]) -> Plan {
    if action == LifecycleAction::Pause && protected.iter().any(|p| p == &env.name) {
        return Plan::Skip("protected".to_string());
    }

    match (action, env.status) {
        (LifecycleAction::Pause, LifecycleState::Ready) => Plan::Execute,
        (LifecycleAction::Pause, LifecycleState::Terminated | LifecycleState::Terminating) => {
            Plan::Skip("already paused".to_string())
        }
        (LifecycleAction::Resume, LifecycleState::Terminated) => Plan::Execute,
        (LifecycleAction::Resume, LifecycleState::Ready) => {
            Plan::Skip("already running".to_string())
        }
        (LifecycleAction::Resume, LifecycleState::Launching | LifecycleState::Updating) => {
            Plan::Skip("already coming up".to_string())
        }
        (_, state) => Plan::Skip(format!("not actionable while {}", state.as_str())),
    }
}

/// Collapses the listing to one environment per name, keeping the most
/// recently created. Terminated environments can share a name with their
/// replacements, and only the newest incarnation is worth acting on.
fn newest_per_name(mut environments: Vec<Environment>) -> IndexMap<String, Environment> {
    environments.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let mut by_name = IndexMap::new();
    for env in environments {
        by_name.entry(env.name.clone()).or_insert(env);
    }
    by_name
}

/// Environment names derived from tracker issues still in the configured
/// statuses; used by `resume --from-tracker`.
///
/// The naming convention strips the dash from the issue key, so ticket
/// `AJ-123` owns environment `AJ123`.
pub async fn tracker_targets(
    tracker: &TrackerClient,
    project: &str,
    statuses: &[String],
    max_results: usize,
) -> Result<Vec<String>> {
    let jql = search_filter(project, statuses, &[]);
    let issues = tracker.search_issues(&jql, max_results).await?;

    Ok(issues.iter().map(|i| env_name_for_issue(&i.key)).collect())
}

pub fn env_name_for_issue(key: &str) -> String {
    key.replace('-', "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OpsweepError;
    use crate::providers::http::RetryPolicy;
    use chrono::TimeZone;

    fn env(name: &str, status: LifecycleState, created_day: u32) -> Environment {
        Environment {
            id: format!("e-{name}-{created_day}"),
            name: name.to_string(),
            status,
            created_at: Utc.with_ymd_and_hms(2024, 3, created_day, 12, 0, 0).unwrap(),
            resume_after: None,
        }
    }

    #[test]
    fn test_pause_plan_by_state() {
        let none: Vec<String> = Vec::new();
        assert_eq!(
            plan(
                LifecycleAction::Pause,
                &env("AJ1", LifecycleState::Ready, 1),
                &none
            ),
            Plan::Execute
        );
        assert_eq!(
            plan(
                LifecycleAction::Pause,
                &env("AJ1", LifecycleState::Terminated, 1),
                &none
            ),
            Plan::Skip("already paused".to_string())
        );
        assert_eq!(
            plan(
                LifecycleAction::Pause,
                &env("AJ1", LifecycleState::Updating, 1),
                &none
            ),
            Plan::Skip("not actionable while Updating".to_string())
        );
    }

    #[test]
    fn test_resume_plan_by_state() {
        let none: Vec<String> = Vec::new();
        assert_eq!(
            plan(
                LifecycleAction::Resume,
                &env("AJ1", LifecycleState::Terminated, 1),
                &none
            ),
            Plan::Execute
        );
        assert_eq!(
            plan(
                LifecycleAction::Resume,
                &env("AJ1", LifecycleState::Ready, 1),
                &none
            ),
            Plan::Skip("already running".to_string())
        );
    }

    #[test]
    fn test_protected_environments_never_pause() {
        let protected = vec!["AJProd".to_string()];
        assert_eq!(
            plan(
                LifecycleAction::Pause,
                &env("AJProd", LifecycleState::Ready, 1),
                &protected
            ),
            Plan::Skip("protected".to_string())
        );
        // Protection is about pausing; resume is allowed
        assert_eq!(
            plan(
                LifecycleAction::Resume,
                &env("AJProd", LifecycleState::Terminated, 1),
                &protected
            ),
            Plan::Execute
        );
    }

    #[test]
    fn test_newest_per_name_keeps_latest_incarnation() {
        let by_name = newest_per_name(vec![
            env("AJ123", LifecycleState::Terminated, 1),
            env("AJ123", LifecycleState::Terminated, 5),
            env("AJ200", LifecycleState::Ready, 2),
        ]);

        assert_eq!(by_name.len(), 2);
        assert_eq!(by_name["AJ123"].id, "e-AJ123-5");
    }

    #[test]
    fn test_env_name_for_issue() {
        assert_eq!(env_name_for_issue("AJ-123"), "AJ123");
        assert_eq!(env_name_for_issue("AJ123"), "AJ123");
    }

    fn envs_body(envs: &[(&str, &str, &str)]) -> String {
        let items: Vec<String> = envs
            .iter()
            .map(|(name, status, day)| {
                format!(
                    r#"{{"id": "e-{name}-{day}", "name": "{name}", "status": "{status}",
                        "created_at": "2024-03-{day}T12:00:00Z"}}"#
                )
            })
            .collect();
        format!(r#"{{"environments": [{}]}}"#, items.join(","))
    }

    fn controller_for(server: &mockito::Server, dry_run: bool) -> LifecycleController {
        let client = CloudClient::new(&server.url(), "storefront".to_string(), Some("t".into()))
            .unwrap()
            .with_retry_policy(RetryPolicy::immediate());
        LifecycleController::new(client, vec![], 4, dry_run)
    }

    #[tokio::test]
    async fn test_pause_batch_processes_past_missing_environment() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/applications/storefront/environments")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(envs_body(&[
                ("AJ101", "Ready", "01"),
                ("AJ102", "Ready", "01"),
                ("AJ103", "Terminated", "01"),
                ("AJ104", "Ready", "01"),
            ]))
            .create_async()
            .await;
        let terminations = server
            .mock("POST", mockito::Matcher::Regex(r"^/v1/environments/e-AJ10\d-01/terminate$".into()))
            .with_status(200)
            .expect(3)
            .create_async()
            .await;

        let names = ["AJ101", "AJ102", "AJ103", "AJ104", "AJ105"]
            .map(String::from)
            .to_vec();
        let report = controller_for(&server, false)
            .run(LifecycleAction::Pause, &TargetSelector::Names(names))
            .await
            .unwrap();

        assert_eq!(report.items.len(), 5);
        assert_eq!(report.applied_count(), 3);
        assert_eq!(report.skipped_count(), 1); // AJ103 already paused
        assert_eq!(report.failed_count(), 1); // AJ105 not found
        terminations.assert_async().await;
    }

    #[tokio::test]
    async fn test_pause_is_idempotent_on_terminated_environment() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/applications/storefront/environments")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(envs_body(&[("AJ101", "Terminated", "01")]))
            .create_async()
            .await;
        let terminations = server
            .mock("POST", "/v1/environments/e-AJ101-01/terminate")
            .expect(0)
            .create_async()
            .await;

        let report = controller_for(&server, false)
            .run(
                LifecycleAction::Pause,
                &TargetSelector::Names(vec!["AJ101".to_string()]),
            )
            .await
            .unwrap();

        assert_eq!(report.applied_count(), 0);
        assert_eq!(report.skipped_count(), 1);
        terminations.assert_async().await;
    }

    #[tokio::test]
    async fn test_prefix_pause_only_touches_matching_names() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/applications/storefront/environments")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(envs_body(&[
                ("AJ101", "Ready", "01"),
                ("Production", "Ready", "01"),
            ]))
            .create_async()
            .await;
        let terminations = server
            .mock("POST", "/v1/environments/e-AJ101-01/terminate")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let report = controller_for(&server, false)
            .run(
                LifecycleAction::Pause,
                &TargetSelector::Prefix("AJ".to_string()),
            )
            .await
            .unwrap();

        assert_eq!(report.applied_count(), 1);
        assert_eq!(report.items.len(), 1);
        terminations.assert_async().await;
    }

    #[tokio::test]
    async fn test_resume_rebuilds_newest_terminated_only() {
        let mut server = mockito::Server::new_async().await;
        // Two terminated incarnations of AJ123; only the newer one (day 05)
        // may be rebuilt
        server
            .mock("GET", "/v1/applications/storefront/environments")
            .match_query(mockito::Matcher::UrlEncoded(
                "include_deleted".into(),
                "true".into(),
            ))
            .with_status(200)
            .with_body(envs_body(&[
                ("AJ123", "Terminated", "01"),
                ("AJ123", "Terminated", "05"),
            ]))
            .create_async()
            .await;
        let rebuilds = server
            .mock("POST", "/v1/environments/e-AJ123-05/rebuild")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let report = controller_for(&server, false)
            .run(
                LifecycleAction::Resume,
                &TargetSelector::Names(vec!["AJ123".to_string()]),
            )
            .await
            .unwrap();

        assert_eq!(report.applied_count(), 1);
        rebuilds.assert_async().await;
    }

    #[tokio::test]
    async fn test_dry_run_issues_no_write_calls() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/applications/storefront/environments")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(envs_body(&[("AJ101", "Ready", "01")]))
            .create_async()
            .await;
        let terminations = server
            .mock("POST", "/v1/environments/e-AJ101-01/terminate")
            .expect(0)
            .create_async()
            .await;

        let report = controller_for(&server, true)
            .run(
                LifecycleAction::Pause,
                &TargetSelector::Names(vec!["AJ101".to_string()]),
            )
            .await
            .unwrap();

        assert_eq!(report.applied_count(), 0);
        assert_eq!(report.skipped_count(), 1);
        terminations.assert_async().await;
    }

    #[tokio::test]
    async fn test_auth_failure_aborts_before_any_item() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/applications/storefront/environments")
            .match_query(mockito::Matcher::Any)
            .with_status(401)
            .create_async()
            .await;
        let terminations = server
            .mock("POST", mockito::Matcher::Regex(r"/terminate$".into()))
            .expect(0)
            .create_async()
            .await;

        let err = controller_for(&server, false)
            .run(
                LifecycleAction::Pause,
                &TargetSelector::Names(vec!["AJ101".to_string()]),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, OpsweepError::Auth(_)));
        terminations.assert_async().await;
    }
}
