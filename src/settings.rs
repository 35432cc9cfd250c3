use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::backend::HttpBackendConfig;
use crate::controller::{ControllerConfig, DEFAULT_COOLDOWN_MINUTES};
use crate::watcher::{DEFAULT_SOLVE_PATTERN, SolvePattern};

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
const MIN_REQUEST_TIMEOUT_MS: u64 = 1_000;
const MAX_REQUEST_TIMEOUT_MS: u64 = 60_000;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
const MIN_TICK_INTERVAL_MS: u64 = 100;
const MAX_TICK_INTERVAL_MS: u64 = 5_000;
const DEFAULT_TICK_INTERVAL_MS: u64 = 1_000;
// The backend needs about 3s to tear an expired instance down.
const MIN_GRACE_DELAY_MS: u64 = 3_500;
const MAX_GRACE_DELAY_MS: u64 = 60_000;
const DEFAULT_GRACE_DELAY_MS: u64 = 7_000;
const MIN_FLAG_POLL_INTERVAL_MS: u64 = 250;
const MAX_FLAG_POLL_INTERVAL_MS: u64 = 30_000;
const DEFAULT_FLAG_POLL_INTERVAL_MS: u64 = 1_500;
const MIN_COOLDOWN_MINUTES: u64 = 1;
const MAX_COOLDOWN_MINUTES: u64 = 120;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub base_url: String,
    pub request_timeout_ms: u64,
    pub tick_interval_ms: u64,
    pub grace_delay_ms: u64,
    pub flag_poll_interval_ms: u64,
    pub cooldown_minutes: u64,
    pub solve_pattern: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            grace_delay_ms: DEFAULT_GRACE_DELAY_MS,
            flag_poll_interval_ms: DEFAULT_FLAG_POLL_INTERVAL_MS,
            cooldown_minutes: DEFAULT_COOLDOWN_MINUTES,
            solve_pattern: DEFAULT_SOLVE_PATTERN.to_string(),
        }
    }
}

impl Settings {
    pub fn config_path() -> Option<PathBuf> {
        let mut path = dirs::config_dir()?;
        path.push("ctfd-instance");
        path.push("settings.toml");
        Some(path)
    }

    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        Self::load_from_path(&path)
    }

    pub fn load_from_path(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<Self>(&contents) {
                Ok(mut settings) => {
                    settings.validate();
                    settings
                }
                Err(error) => {
                    warn!(
                        "failed to parse settings config '{}': {}",
                        path.display(),
                        error
                    );
                    Self::default()
                }
            },
            Err(error) => {
                warn!(
                    "failed to read settings config '{}': {}",
                    path.display(),
                    error
                );
                Self::default()
            }
        }
    }

    pub fn save_to_path(&self, path: &Path) -> anyhow::Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow!("invalid settings config path"))?;
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory '{}'", parent.display()))?;

        let mut validated = self.clone();
        validated.validate();
        let contents =
            toml::to_string_pretty(&validated).context("failed to serialize settings to TOML")?;

        let file_name = path
            .file_name()
            .ok_or_else(|| anyhow!("invalid settings config file name"))?
            .to_string_lossy()
            .to_string();
        let tmp_path = path.with_file_name(format!(".{file_name}.tmp"));

        fs::write(&tmp_path, contents).with_context(|| {
            format!(
                "failed to write temporary settings file '{}'",
                tmp_path.display()
            )
        })?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "failed to atomically rename settings file '{}' to '{}'",
                tmp_path.display(),
                path.display()
            )
        })?;

        Ok(())
    }

    pub fn validate(&mut self) {
        self.request_timeout_ms = self
            .request_timeout_ms
            .clamp(MIN_REQUEST_TIMEOUT_MS, MAX_REQUEST_TIMEOUT_MS);
        self.tick_interval_ms = self
            .tick_interval_ms
            .clamp(MIN_TICK_INTERVAL_MS, MAX_TICK_INTERVAL_MS);
        self.grace_delay_ms = self
            .grace_delay_ms
            .clamp(MIN_GRACE_DELAY_MS, MAX_GRACE_DELAY_MS);
        self.flag_poll_interval_ms = self
            .flag_poll_interval_ms
            .clamp(MIN_FLAG_POLL_INTERVAL_MS, MAX_FLAG_POLL_INTERVAL_MS);
        self.cooldown_minutes = self
            .cooldown_minutes
            .clamp(MIN_COOLDOWN_MINUTES, MAX_COOLDOWN_MINUTES);

        let trimmed = self.base_url.trim().trim_end_matches('/');
        self.base_url = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            trimmed.to_string()
        } else {
            warn!(
                "invalid base_url '{}' in settings config; falling back to {}",
                self.base_url, DEFAULT_BASE_URL
            );
            DEFAULT_BASE_URL.to_string()
        };

        if SolvePattern::new(&self.solve_pattern).is_err() {
            warn!(
                "invalid solve_pattern '{}' in settings config; falling back to {}",
                self.solve_pattern, DEFAULT_SOLVE_PATTERN
            );
            self.solve_pattern = DEFAULT_SOLVE_PATTERN.to_string();
        }
    }

    pub fn backend_config(&self) -> HttpBackendConfig {
        HttpBackendConfig {
            base_url: self.base_url.clone(),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
        }
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            grace_delay: Duration::from_millis(self.grace_delay_ms),
            flag_poll_interval: Duration::from_millis(self.flag_poll_interval_ms),
            cooldown_minutes: self.cooldown_minutes,
            solve_pattern: SolvePattern::or_default(&self.solve_pattern),
        }
    }
}
