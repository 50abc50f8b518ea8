use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::types::EnvironmentSettings;

/// Settings older than this are refetched (matches the 4 h expiry the ops
/// team has always used for environment variables).
const SETTINGS_TTL_SECONDS: i64 = 14_400;

/// Cached settings for one environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedSettings {
    fetched_at: DateTime<Utc>,
    settings: EnvironmentSettings,
}

/// On-disk cache for environment configuration variables.
///
/// Environment variables change rarely and the settings endpoint is the
/// slowest call in the API, so lookups are cached per application in the
/// platform cache directory:
/// - Linux: `~/.cache/opsweep/cloud/{application}.json`
/// - macOS: `~/Library/Caches/opsweep/cloud/{application}.json`
///
/// Entries expire after four hours; `--refresh` bypasses the cache and
/// rewrites it with fresh data.
pub struct SettingsCache {
    cache_file: PathBuf,
    entries: HashMap<String, CachedSettings>,
    enabled: bool,
}

impl SettingsCache {
    /// Opens the cache for an application, loading existing entries.
    ///
    /// # Errors
    ///
    /// Returns error if the cache directory cannot be determined or created.
    pub fn open(application: &str, enabled: bool) -> Result<Self> {
        if !enabled {
            debug!("Settings cache disabled");
            return Ok(Self {
                cache_file: PathBuf::new(),
                entries: HashMap::new(),
                enabled: false,
            });
        }

        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| crate::error::OpsweepError::Cache("No cache directory found".into()))?
            .join("opsweep")
            .join("cloud");

        fs::create_dir_all(&cache_dir)?;

        let cache_file = cache_dir.join(format!("{application}.json"));

        let entries = if cache_file.exists() {
            fs::read_to_string(&cache_file)
                .ok()
                .and_then(|content| serde_json::from_str(&content).ok())
                .inspect(|_| debug!("Loaded settings cache from: {}", cache_file.display()))
                .unwrap_or_else(|| {
                    warn!("Failed to load settings cache, starting empty");
                    HashMap::new()
                })
        } else {
            HashMap::new()
        };

        info!("Settings cache at: {}", cache_file.display());

        Ok(Self {
            cache_file,
            entries,
            enabled: true,
        })
    }

    /// Returns cached settings for an environment if present and fresh.
    pub fn get(&self, env_name: &str) -> Option<EnvironmentSettings> {
        if !self.enabled {
            return None;
        }

        self.entries.get(env_name).and_then(|cached| {
            let age = Utc::now() - cached.fetched_at;
            if age > Duration::seconds(SETTINGS_TTL_SECONDS) {
                debug!("Settings cache expired for {env_name}");
                return None;
            }
            debug!("Settings cache hit for {env_name}");
            Some(cached.settings.clone())
        })
    }

    /// Records freshly fetched settings for an environment.
    pub fn put(&mut self, env_name: &str, settings: EnvironmentSettings) {
        if !self.enabled {
            return;
        }
        self.entries.insert(
            env_name.to_string(),
            CachedSettings {
                fetched_at: Utc::now(),
                settings,
            },
        );
    }

    /// Writes the cache back to disk.
    pub fn persist(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let content = serde_json::to_string(&self.entries)?;
        fs::write(&self.cache_file, content)?;

        debug!(
            "Saved {} environments to settings cache: {}",
            self.entries.len(),
            self.cache_file.display()
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_settings() -> EnvironmentSettings {
        let mut settings = EnvironmentSettings::new();
        settings.insert("DATABASE_URL".to_string(), "postgres://x".to_string());
        settings.insert("DEBUG".to_string(), "0".to_string());
        settings
    }

    // Helper building a cache rooted in a temp dir instead of the real
    // platform cache directory
    fn open_in(dir: &std::path::Path, application: &str) -> SettingsCache {
        let cache_dir = dir.join("opsweep").join("cloud");
        fs::create_dir_all(&cache_dir).unwrap();
        let cache_file = cache_dir.join(format!("{application}.json"));

        let entries = if cache_file.exists() {
            fs::read_to_string(&cache_file)
                .ok()
                .and_then(|content| serde_json::from_str(&content).ok())
                .unwrap_or_default()
        } else {
            HashMap::new()
        };

        SettingsCache {
            cache_file,
            entries,
            enabled: true,
        }
    }

    #[test]
    fn test_disabled_cache_is_inert() {
        let cache = SettingsCache::open("storefront", false).unwrap();
        assert!(cache.get("AJ123").is_none());
        assert!(cache.persist().is_ok());
    }

    #[test]
    fn test_put_persist_reload() {
        let temp_dir = TempDir::new().unwrap();
        let mut cache = open_in(temp_dir.path(), "storefront");

        cache.put("AJ123", sample_settings());
        cache.persist().unwrap();

        let reloaded = open_in(temp_dir.path(), "storefront");
        let settings = reloaded.get("AJ123").unwrap();
        assert_eq!(settings.get("DEBUG").map(String::as_str), Some("0"));
        assert!(reloaded.get("AJ999").is_none());
    }

    #[test]
    fn test_expired_entry_misses() {
        let temp_dir = TempDir::new().unwrap();
        let mut cache = open_in(temp_dir.path(), "storefront");

        cache.entries.insert(
            "AJ123".to_string(),
            CachedSettings {
                fetched_at: Utc::now() - Duration::seconds(SETTINGS_TTL_SECONDS + 60),
                settings: sample_settings(),
            },
        );

        assert!(cache.get("AJ123").is_none());
    }

    #[test]
    fn test_per_application_cache_files() {
        let temp_dir = TempDir::new().unwrap();

        let mut first = open_in(temp_dir.path(), "storefront");
        first.put("AJ123", sample_settings());
        first.persist().unwrap();

        let mut second = open_in(temp_dir.path(), "billing");
        second.put("BJ500", sample_settings());
        second.persist().unwrap();

        let cache_dir = temp_dir.path().join("opsweep").join("cloud");
        assert!(cache_dir.join("storefront.json").exists());
        assert!(cache_dir.join("billing.json").exists());

        let reloaded = open_in(temp_dir.path(), "storefront");
        assert!(reloaded.get("AJ123").is_some());
        assert!(reloaded.get("BJ500").is_none());
    }
}
