use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use futures::future::join_all;
use indexmap::IndexMap;
use log::{info, warn};
use serde::Serialize;
use std::path::PathBuf;

use crate::address::AddressBinder;
use crate::auth::{BasicCredentials, Token};
use crate::config::{CloudConfig, Config, RepoHostConfig, TrackerConfig};
use crate::error::OpsweepError;
use crate::lifecycle::{tracker_targets, LifecycleAction, LifecycleController, TargetSelector};
use crate::notify::Notifier;
use crate::output;
use crate::providers::cloud::{
    CloudClient, EnvironmentQuery, EnvironmentSettings, SettingsCache,
};
use crate::providers::repohost::RepoHostClient;
use crate::providers::tracker::TrackerClient;
use crate::reconcile::{ReconcileOptions, Reconciler};

#[derive(Parser)]
#[command(name = "opsweep")]
#[command(author, version, about = "Environment & issue-tracker housekeeping", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./opsweep.{toml,json,yaml})
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Write the JSON report to this file
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Print the report as JSON instead of tables
    #[arg(short, long, global = true, default_value_t = false)]
    json: bool,

    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,

    /// Plan everything, change nothing
    #[arg(long, global = true, default_value_t = false)]
    dry_run: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage cloud environments
    Env {
        #[command(subcommand)]
        command: EnvCommands,
    },
    /// Cross-reference tracker issues with merge-request activity
    Reconcile {
        /// Specific issue keys; defaults to the configured status filter
        keys: Vec<String>,

        /// Label merged-but-open issues in the tracker
        #[arg(long)]
        flag: bool,

        /// Also post an explanatory comment when flagging
        #[arg(long, requires = "flag")]
        comment: bool,

        #[command(flatten)]
        tracker: TrackerArgs,

        #[command(flatten)]
        repohost: RepoHostArgs,
    },
}

#[derive(Subcommand)]
enum EnvCommands {
    /// Terminate running environments
    Pause {
        /// Environment names; defaults to the configured prefix filter
        names: Vec<String>,

        /// Pause every ready environment whose name starts with this
        #[arg(long)]
        prefix: Option<String>,

        #[command(flatten)]
        cloud: CloudArgs,
    },
    /// Rebuild recently terminated environments
    Resume {
        /// Environment names
        names: Vec<String>,

        /// Derive targets from tracker issues still in testing statuses
        #[arg(long, conflicts_with = "names")]
        from_tracker: bool,

        #[command(flatten)]
        cloud: CloudArgs,

        #[command(flatten)]
        tracker: TrackerArgs,
    },
    /// Point each environment's reserved address at its current instance
    AttachIp {
        /// Environment names
        names: Vec<String>,

        #[command(flatten)]
        cloud: CloudArgs,
    },
    /// Show environment configuration variables
    Vars {
        /// Environment names
        names: Vec<String>,

        /// Only print these variables
        #[arg(short = 'V', long = "variables")]
        variables: Vec<String>,

        /// Skip the local cache and refetch
        #[arg(long)]
        refresh: bool,

        #[command(flatten)]
        cloud: CloudArgs,
    },
}

#[derive(Args)]
struct CloudArgs {
    /// Cloud API token
    #[arg(long, env = "OPSWEEP_CLOUD_TOKEN")]
    cloud_token: Option<String>,

    /// Cloud API base URL
    #[arg(long, env = "OPSWEEP_CLOUD_URL")]
    cloud_url: Option<String>,

    /// Application owning the environments
    #[arg(short, long, env = "OPSWEEP_APPLICATION")]
    application: Option<String>,
}

impl CloudArgs {
    fn merged(&self, mut config: CloudConfig) -> CloudConfig {
        if self.cloud_token.is_some() {
            config.token = self.cloud_token.clone();
        }
        if self.cloud_url.is_some() {
            config.base_url = self.cloud_url.clone();
        }
        if self.application.is_some() {
            config.application = self.application.clone();
        }
        config
    }
}

#[derive(Args)]
struct TrackerArgs {
    /// Tracker username for basic auth
    #[arg(long, env = "OPSWEEP_TRACKER_USER")]
    tracker_user: Option<String>,

    /// Tracker API token
    #[arg(long, env = "OPSWEEP_TRACKER_TOKEN")]
    tracker_token: Option<String>,

    /// Tracker base URL
    #[arg(long, env = "OPSWEEP_TRACKER_URL")]
    tracker_url: Option<String>,

    /// Tracker project key
    #[arg(short = 'P', long, env = "OPSWEEP_TRACKER_PROJECT")]
    project: Option<String>,
}

impl TrackerArgs {
    fn merged(&self, mut config: TrackerConfig) -> TrackerConfig {
        if self.tracker_user.is_some() {
            config.username = self.tracker_user.clone();
        }
        if self.tracker_token.is_some() {
            config.token = self.tracker_token.clone();
        }
        if self.tracker_url.is_some() {
            config.base_url = self.tracker_url.clone();
        }
        if self.project.is_some() {
            config.project = self.project.clone();
        }
        config
    }
}

#[derive(Args)]
struct RepoHostArgs {
    /// Repository host API token
    #[arg(long, env = "OPSWEEP_REPO_TOKEN")]
    repo_token: Option<String>,

    /// Repository host API base URL (workspace/repo included)
    #[arg(long, env = "OPSWEEP_REPO_URL")]
    repo_url: Option<String>,

    /// Repository web base URL, for links in reports
    #[arg(long, env = "OPSWEEP_REPO_WEB_URL")]
    repo_web_url: Option<String>,
}

impl RepoHostArgs {
    fn merged(&self, mut config: RepoHostConfig) -> RepoHostConfig {
        if self.repo_token.is_some() {
            config.token = self.repo_token.clone();
        }
        if self.repo_url.is_some() {
            config.base_url = self.repo_url.clone();
        }
        if self.repo_web_url.is_some() {
            config.web_url = self.repo_web_url.clone();
        }
        config
    }
}

fn cloud_client(config: &CloudConfig) -> Result<CloudClient> {
    let base_url = config.base_url.as_deref().context(
        "Cloud API URL missing (use --cloud-url, OPSWEEP_CLOUD_URL, or [cloud] base-url)",
    )?;
    let application = config.application.as_deref().context(
        "Application missing (use --application, OPSWEEP_APPLICATION, or [cloud] application)",
    )?;
    let token = config.token.as_deref().map(Token::from);

    Ok(CloudClient::new(base_url, application.to_owned(), token)?)
}

fn tracker_client(config: &TrackerConfig) -> Result<(TrackerClient, String)> {
    let base_url = config.base_url.as_deref().context(
        "Tracker URL missing (use --tracker-url, OPSWEEP_TRACKER_URL, or [tracker] base-url)",
    )?;
    let username = config
        .username
        .as_deref()
        .context("Tracker username missing (use --tracker-user or [tracker] username)")?;
    let token = config
        .token
        .as_deref()
        .context("Tracker token missing (use --tracker-token or [tracker] token)")?;
    let project = config
        .project
        .as_deref()
        .context("Tracker project missing (use --project or [tracker] project)")?;

    let client = TrackerClient::new(base_url, BasicCredentials::new(username, token))?;
    Ok((client, project.to_owned()))
}

fn repohost_client(config: &RepoHostConfig) -> Result<RepoHostClient> {
    let base_url = config.base_url.as_deref().context(
        "Repository host URL missing (use --repo-url, OPSWEEP_REPO_URL, or [repohost] base-url)",
    )?;
    let token = config.token.as_deref().map(Token::from);

    Ok(RepoHostClient::new(base_url, token)?)
}

impl Cli {
    pub async fn execute(&self) -> Result<()> {
        let config = Config::load(self.config.as_deref())?;

        match &self.command {
            Commands::Env { command } => match command {
                EnvCommands::Pause {
                    names,
                    prefix,
                    cloud,
                } => {
                    self.execute_lifecycle(
                        LifecycleAction::Pause,
                        self.pause_targets(names, prefix.as_deref(), &config)?,
                        cloud.merged(config.cloud.clone()),
                        &config,
                    )
                    .await
                }
                EnvCommands::Resume {
                    names,
                    from_tracker,
                    cloud,
                    tracker,
                } => {
                    let targets = if *from_tracker {
                        let tracker_config = tracker.merged(config.tracker.clone());
                        let (client, project) = tracker_client(&tracker_config)?;
                        let names = tracker_targets(
                            &client,
                            &project,
                            &tracker_config.resume_statuses,
                            tracker_config.max_results,
                        )
                        .await?;
                        info!("Tracker selected {} environment(s) to resume", names.len());
                        TargetSelector::Names(names)
                    } else if names.is_empty() {
                        return Err(OpsweepError::Validation(
                            "Nothing to resume: pass environment names or --from-tracker".into(),
                        )
                        .into());
                    } else {
                        TargetSelector::Names(names.clone())
                    };

                    self.execute_lifecycle(
                        LifecycleAction::Resume,
                        targets,
                        cloud.merged(config.cloud.clone()),
                        &config,
                    )
                    .await
                }
                EnvCommands::AttachIp { names, cloud } => {
                    self.execute_attach_ip(names, cloud.merged(config.cloud))
                        .await
                }
                EnvCommands::Vars {
                    names,
                    variables,
                    refresh,
                    cloud,
                } => {
                    self.execute_vars(names, variables, *refresh, cloud.merged(config.cloud))
                        .await
                }
            },
            Commands::Reconcile {
                keys,
                flag,
                comment,
                tracker,
                repohost,
            } => {
                self.execute_reconcile(
                    keys,
                    *flag,
                    *comment,
                    tracker.merged(config.tracker),
                    repohost.merged(config.repohost),
                )
                .await
            }
        }
    }

    fn pause_targets(
        &self,
        names: &[String],
        prefix: Option<&str>,
        config: &Config,
    ) -> Result<TargetSelector> {
        if !names.is_empty() {
            return Ok(TargetSelector::Names(names.to_vec()));
        }
        let prefix = prefix.or(config.cloud.prefix.as_deref());
        match prefix {
            Some(prefix) if !prefix.is_empty() => Ok(TargetSelector::Prefix(prefix.to_owned())),
            _ => Err(OpsweepError::Validation(
                "Nothing to pause: pass environment names, --prefix, or [cloud] prefix".into(),
            )
            .into()),
        }
    }

    async fn execute_lifecycle(
        &self,
        action: LifecycleAction,
        targets: TargetSelector,
        cloud: CloudConfig,
        config: &Config,
    ) -> Result<()> {
        let controller = LifecycleController::new(
            cloud_client(&cloud)?,
            cloud.protected.clone(),
            cloud.lookback_days,
            self.dry_run,
        );

        let progress = output::PhaseProgress::start("Checking environment state");
        let result = controller.run(action, &targets).await;
        let report = match result {
            Ok(report) => {
                progress.finish("Environments processed");
                report
            }
            Err(e) => return Err(e.into()),
        };

        Notifier::new(config.notify.webhook_url.as_deref())?
            .announce(&report)
            .await;

        if self.json || self.output.is_some() {
            self.emit_json(&report)?;
        } else {
            output::print_batch_summary(&report);
        }

        Ok(())
    }

    async fn execute_attach_ip(&self, names: &[String], cloud: CloudConfig) -> Result<()> {
        if names.is_empty() {
            return Err(
                OpsweepError::Validation("Pass at least one environment name".into()).into(),
            );
        }

        let binder = AddressBinder::new(cloud_client(&cloud)?, self.dry_run);

        let progress = output::PhaseProgress::start("Binding reserved addresses");
        let report = match binder.run(names).await {
            Ok(report) => {
                progress.finish("Addresses bound");
                report
            }
            Err(e) => return Err(e.into()),
        };

        if self.json || self.output.is_some() {
            self.emit_json(&report)?;
        } else {
            output::print_batch_summary(&report);
        }

        Ok(())
    }

    async fn execute_vars(
        &self,
        names: &[String],
        variables: &[String],
        refresh: bool,
        cloud: CloudConfig,
    ) -> Result<()> {
        if names.is_empty() {
            return Err(
                OpsweepError::Validation("Pass at least one environment name".into()).into(),
            );
        }

        let client = cloud_client(&cloud)?;
        let application = cloud.application.clone().context(
            "Application missing (use --application, OPSWEEP_APPLICATION, or [cloud] application)",
        )?;

        let mut cache = match SettingsCache::open(&application, true) {
            Ok(cache) => cache,
            Err(e) => {
                warn!("Settings cache unavailable: {e}");
                SettingsCache::open(&application, false)?
            }
        };

        let mut resolved: IndexMap<String, EnvironmentSettings> = IndexMap::new();
        let mut missing: Vec<&String> = Vec::new();

        for name in names {
            match (!refresh).then(|| cache.get(name)).flatten() {
                Some(settings) => {
                    resolved.insert(name.clone(), settings);
                }
                None => missing.push(name),
            }
        }

        if !missing.is_empty() {
            // One listing resolves names to ids for everything uncached
            let query = EnvironmentQuery {
                names: missing.iter().map(|n| (*n).clone()).collect(),
                ..Default::default()
            };
            let environments = client.list_environments(&query).await?;

            let found: Vec<_> = missing
                .iter()
                .filter_map(|name| {
                    let env = environments.iter().find(|e| e.name == **name);
                    if env.is_none() {
                        warn!("Environment {name} not found, skipping");
                    }
                    env
                })
                .collect();

            // Uncached environments are independent; fetch them together
            let client = &client;
            let fetched = join_all(found.iter().map(|env| async move {
                (env.name.clone(), client.environment_settings(&env.id).await)
            }))
            .await;

            for (name, result) in fetched {
                match result {
                    Ok(settings) => {
                        cache.put(&name, settings.clone());
                        resolved.insert(name, settings);
                    }
                    Err(e) if e.is_fatal() => return Err(e.into()),
                    Err(e) => warn!("Could not fetch settings for {name}: {e}"),
                }
            }

            if let Err(e) = cache.persist() {
                warn!("Could not write settings cache: {e}");
            }
        }

        // Report in the order the environments were asked for
        let ordered: IndexMap<String, EnvironmentSettings> = names
            .iter()
            .filter_map(|name| resolved.shift_remove(name).map(|s| (name.clone(), s)))
            .collect();

        if self.json || self.output.is_some() {
            self.emit_json(&ordered)?;
        } else {
            for (name, settings) in &ordered {
                output::print_settings(name, settings, variables);
            }
        }

        Ok(())
    }

    async fn execute_reconcile(
        &self,
        keys: &[String],
        flag: bool,
        comment: bool,
        tracker: TrackerConfig,
        repohost: RepoHostConfig,
    ) -> Result<()> {
        let (tracker_client, project) = tracker_client(&tracker)?;
        let repohost_client = repohost_client(&repohost)?;

        let reconciler = Reconciler::new(
            tracker_client,
            repohost_client,
            project,
            tracker.reconcile_statuses.clone(),
            tracker.closed_statuses.clone(),
            tracker.flag_label.clone(),
            tracker.max_results,
            repohost.limit,
            repohost.web_url.clone(),
        );

        let options = ReconcileOptions {
            keys: keys.to_vec(),
            flag,
            comment,
            dry_run: self.dry_run,
        };

        let progress = output::PhaseProgress::start("Fetching issues and merge requests");
        let result = reconciler.run(&options).await;
        let report = match result {
            Ok(report) => {
                progress.finish("Issues reconciled");
                report
            }
            Err(e) => return Err(e.into()),
        };

        if self.json || self.output.is_some() {
            self.emit_json(&report)?;
        } else {
            output::print_reconcile_summary(&report);
        }

        Ok(())
    }

    fn emit_json<T: Serialize>(&self, report: &T) -> Result<()> {
        let json_output = if self.pretty {
            serde_json::to_string_pretty(report)?
        } else {
            serde_json::to_string(report)?
        };

        if let Some(output_path) = &self.output {
            std::fs::write(output_path, json_output)?;
            info!("Report written to: {}", output_path.display());
        } else {
            println!("{}", json_output);
        }

        Ok(())
    }
}
