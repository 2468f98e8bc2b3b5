//! Client configuration.
//!
//! Provides the `ClientConfig` struct shared by the sync engine, the reminder
//! scheduler and the CLI. Only public endpoints and timings live here; the
//! session token is never stored in the config.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080";

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_SYNC_INTERVAL_SECS: u64 = 60;
const DEFAULT_REMINDER_PERIOD_SECS: u64 = 30;
const DEFAULT_REMINDER_WINDOW_SECS: u64 = 90;
const DEFAULT_CONNECTIVITY_DEBOUNCE_MS: u64 = 1_500;
const DEFAULT_PROBE_INTERVAL_SECS: u64 = 15;

/// Runtime configuration for a client instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Server origin; the note API lives under `{api_base_url}/api`
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Periodic reconciliation interval while online
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,
    #[serde(default = "default_reminder_period_secs")]
    pub reminder_period_secs: u64,
    /// How long after its due time a reminder may still fire
    #[serde(default = "default_reminder_window_secs")]
    pub reminder_window_secs: u64,
    #[serde(default = "default_connectivity_debounce_ms")]
    pub connectivity_debounce_ms: u64,
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            reminder_period_secs: DEFAULT_REMINDER_PERIOD_SECS,
            reminder_window_secs: DEFAULT_REMINDER_WINDOW_SECS,
            connectivity_debounce_ms: DEFAULT_CONNECTIVITY_DEBOUNCE_MS,
            probe_interval_secs: DEFAULT_PROBE_INTERVAL_SECS,
        }
    }
}

impl ClientConfig {
    /// Parse and validate a JSON config document.
    pub fn from_json(payload: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(payload)
            .map_err(|error| Error::Config(format!("invalid config JSON: {error}")))?;
        config.validated()
    }

    /// Normalize the base URL and check every timing.
    pub fn validated(mut self) -> Result<Self> {
        self.api_base_url = normalize_api_base_url(&self.api_base_url)?;

        for (field, value) in [
            ("request_timeout_secs", self.request_timeout_secs),
            ("sync_interval_secs", self.sync_interval_secs),
            ("reminder_period_secs", self.reminder_period_secs),
            ("reminder_window_secs", self.reminder_window_secs),
            ("connectivity_debounce_ms", self.connectivity_debounce_ms),
            ("probe_interval_secs", self.probe_interval_secs),
        ] {
            if value == 0 {
                return Err(Error::Config(format!("'{field}' must be greater than zero")));
            }
        }
        if self.reminder_window_secs < self.reminder_period_secs {
            return Err(Error::Config(format!(
                "'reminder_window_secs' ({}) must be at least 'reminder_period_secs' ({})",
                self.reminder_window_secs, self.reminder_period_secs
            )));
        }
        Ok(self)
    }

    /// Base URL of the REST API (`{origin}/api`).
    pub fn api_url(&self) -> String {
        format!("{}/api", self.api_base_url.trim_end_matches('/'))
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub const fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub const fn reminder_period(&self) -> Duration {
        Duration::from_secs(self.reminder_period_secs)
    }

    pub const fn reminder_window(&self) -> Duration {
        Duration::from_secs(self.reminder_window_secs)
    }

    pub const fn connectivity_debounce(&self) -> Duration {
        Duration::from_millis(self.connectivity_debounce_ms)
    }

    pub const fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }
}

/// Trim an API origin, require http(s) and strip any trailing `/api`.
pub fn normalize_api_base_url(raw: &str) -> Result<String> {
    let value = normalize_text_option(Some(raw.to_string()))
        .ok_or_else(|| Error::Config("'api_base_url' is required".to_string()))?;
    if !is_http_url(&value) {
        return Err(Error::Config(
            "'api_base_url' must include http:// or https://".to_string(),
        ));
    }
    let value = value.trim_end_matches('/');
    Ok(value.strip_suffix("/api").unwrap_or(value).to_string())
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

const fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

const fn default_sync_interval_secs() -> u64 {
    DEFAULT_SYNC_INTERVAL_SECS
}

const fn default_reminder_period_secs() -> u64 {
    DEFAULT_REMINDER_PERIOD_SECS
}

const fn default_reminder_window_secs() -> u64 {
    DEFAULT_REMINDER_WINDOW_SECS
}

const fn default_connectivity_debounce_ms() -> u64 {
    DEFAULT_CONNECTIVITY_DEBOUNCE_MS
}

const fn default_probe_interval_secs() -> u64 {
    DEFAULT_PROBE_INTERVAL_SECS
}
