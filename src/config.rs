use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration file structure for opsweep.
///
/// Allows teams to keep service endpoints, credentials, and status filters
/// out of the command line. Configuration files are loaded from the current
/// directory or a specified path; every field has a default so a partial
/// file is fine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Cloud environment API settings
    #[serde(default)]
    pub cloud: CloudConfig,

    /// Issue tracker settings
    #[serde(default)]
    pub tracker: TrackerConfig,

    /// Repository host settings
    #[serde(default)]
    pub repohost: RepoHostConfig,

    /// Notification settings
    #[serde(default)]
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CloudConfig {
    /// API token for the environment-management API
    pub token: Option<String>,

    /// Base URL of the environment-management API
    pub base_url: Option<String>,

    /// Application whose environments are managed
    pub application: Option<String>,

    /// Default name prefix selecting pausable environments
    pub prefix: Option<String>,

    /// Environment names that must never be paused
    #[serde(default)]
    pub protected: Vec<String>,

    /// How many days back to look for terminated environments on resume
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TrackerConfig {
    /// Username for basic auth against the tracker API
    pub username: Option<String>,

    /// API token paired with the username
    pub token: Option<String>,

    /// Base URL of the tracker instance
    pub base_url: Option<String>,

    /// Tracker project key (e.g., "AJ")
    pub project: Option<String>,

    /// Issue statuses meaning "environment still wanted" for resume
    #[serde(default = "default_resume_statuses")]
    pub resume_statuses: Vec<String>,

    /// Issue statuses searched by the reconciler
    #[serde(default = "default_reconcile_statuses")]
    pub reconcile_statuses: Vec<String>,

    /// Statuses counting as closed when classifying merged work
    #[serde(default = "default_closed_statuses")]
    pub closed_statuses: Vec<String>,

    /// Label marking an issue as already flagged by the reconciler
    #[serde(default = "default_flag_label")]
    pub flag_label: String,

    /// Maximum issues fetched per search
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RepoHostConfig {
    /// API token for the repository host
    pub token: Option<String>,

    /// Base URL of the repository host API (workspace/repo included)
    pub base_url: Option<String>,

    /// Web base URL of the repository, for links in reports
    pub web_url: Option<String>,

    /// Maximum merge requests and pipelines fetched per listing, newest
    /// first
    #[serde(default = "default_mr_limit")]
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct NotifyConfig {
    /// Webhook that receives a text summary after lifecycle batches
    pub webhook_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cloud: CloudConfig::default(),
            tracker: TrackerConfig::default(),
            repohost: RepoHostConfig::default(),
            notify: NotifyConfig::default(),
        }
    }
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            token: None,
            base_url: None,
            application: None,
            prefix: None,
            protected: Vec::new(),
            lookback_days: default_lookback_days(),
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            username: None,
            token: None,
            base_url: None,
            project: None,
            resume_statuses: default_resume_statuses(),
            reconcile_statuses: default_reconcile_statuses(),
            closed_statuses: default_closed_statuses(),
            flag_label: default_flag_label(),
            max_results: default_max_results(),
        }
    }
}

impl Default for RepoHostConfig {
    fn default() -> Self {
        Self {
            token: None,
            base_url: None,
            web_url: None,
            limit: default_mr_limit(),
        }
    }
}

fn default_lookback_days() -> i64 {
    4
}

fn default_resume_statuses() -> Vec<String> {
    vec!["In Testing".to_string()]
}

fn default_reconcile_statuses() -> Vec<String> {
    vec!["In Review".to_string(), "Ready for Release".to_string()]
}

fn default_closed_statuses() -> Vec<String> {
    vec![
        "Done".to_string(),
        "Closed".to_string(),
        "Released".to_string(),
    ]
}

fn default_flag_label() -> String {
    "stale-after-merge".to_string()
}

fn default_max_results() -> usize {
    20
}

fn default_mr_limit() -> usize {
    100
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./opsweep.toml
    /// 3. ./opsweep.json
    /// 4. ./opsweep.yaml
    /// 5. ./opsweep.yml
    ///
    /// Returns default configuration if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        let candidates = ["opsweep.toml", "opsweep.json", "opsweep.yaml", "opsweep.yml"];

        for candidate in &candidates {
            let path = Path::new(candidate);
            if path.exists() {
                return Self::load_from_path(path);
            }
        }

        // No config file found, return defaults
        Ok(Self::default())
    }

    /// Load configuration from a specific file path.
    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => {
                // Try TOML first, then JSON, then YAML
                toml::from_str(&contents)
                    .or_else(|_| serde_json::from_str(&contents))
                    .or_else(|_| serde_yaml::from_str(&contents))
                    .with_context(|| format!("Failed to parse config file: {}", path.display()))
            }
        }
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::to_string_pretty(self)?,
            Some("yaml") | Some("yml") => serde_yaml::to_string(self)?,
            _ => toml::to_string_pretty(self)?,
        };

        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }
}
