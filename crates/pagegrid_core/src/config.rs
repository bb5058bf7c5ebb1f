//! Configuration loading from environment variables.

use crate::constants::{
    DEFAULT_INNER_PAGE_DELAY_MS, DEFAULT_PAGE_OVERLAP, DEFAULT_PAGE_SIZE, DEFAULT_WORKER_THREADS,
};
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// How dirty beans are grouped into service calls when saving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SavePolicy {
    /// One create/update request per bean; failures stay isolated to that bean.
    PerBean,
    /// One request for all creates and one for all updates.
    #[default]
    Batch,
}

impl FromStr for SavePolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "per-bean" | "per_bean" | "perbean" | "single" => Ok(Self::PerBean),
            "batch" | "batched" => Ok(Self::Batch),
            other => Err(format!("unknown save policy '{}'", other)),
        }
    }
}

/// Runtime configuration for a bean table.
#[derive(Debug, Clone, Deserialize)]
pub struct TableConfig {
    pub page_size: usize,
    pub page_overlap: usize,
    pub inner_page_delay: Duration,
    pub auto_dispose_pages: bool,
    pub last_row_dummy: bool,
    pub save_policy: SavePolicy,
    pub worker_threads: usize,
    pub trace_loaders: bool,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            page_overlap: DEFAULT_PAGE_OVERLAP,
            inner_page_delay: Duration::from_millis(DEFAULT_INNER_PAGE_DELAY_MS),
            auto_dispose_pages: true,
            last_row_dummy: false,
            save_policy: SavePolicy::default(),
            worker_threads: DEFAULT_WORKER_THREADS,
            trace_loaders: false,
        }
    }
}

/// Parse a boolean-like environment flag value.
///
/// # Supported Values
/// - Truthy: `1`, `true`, `yes`, `on`
/// - Falsy: `0`, `false`, `no`, `off`, empty string
///
/// Matching is case-insensitive and ignores surrounding whitespace.
///
/// # Returns
/// `Some(bool)` when the value is recognized, otherwise `None`.
pub fn parse_env_flag(value: &str) -> Option<bool> {
    let normalized = value.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "" | "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Read a boolean flag from the environment.
///
/// Missing or unrecognized values are treated as `false`.
pub fn env_flag_enabled(name: &str) -> bool {
    env_flag_or(name, false)
}

fn env_flag_or(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .and_then(|value| parse_env_flag(&value))
        .unwrap_or(default)
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|raw| raw.trim().parse().ok())
}

impl TableConfig {
    /// Load configuration from environment variables.
    ///
    /// # Returns
    /// A populated [`TableConfig`] with defaults applied when env vars are
    /// missing or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            page_size: env_parse("PAGEGRID_PAGE_SIZE")
                .filter(|size| *size > 0)
                .unwrap_or(defaults.page_size),
            page_overlap: env_parse("PAGEGRID_PAGE_OVERLAP").unwrap_or(defaults.page_overlap),
            inner_page_delay: env_parse("PAGEGRID_INNER_PAGE_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.inner_page_delay),
            auto_dispose_pages: env_flag_or("PAGEGRID_AUTO_DISPOSE", defaults.auto_dispose_pages),
            last_row_dummy: env_flag_or("PAGEGRID_LAST_ROW_DUMMY", defaults.last_row_dummy),
            save_policy: env_parse("PAGEGRID_SAVE_POLICY").unwrap_or(defaults.save_policy),
            worker_threads: env_parse("PAGEGRID_WORKERS")
                .filter(|workers| *workers > 0)
                .unwrap_or(defaults.worker_threads),
            trace_loaders: env_flag_enabled("PAGEGRID_LOADER_TRACE"),
        }
    }

    /// Returns a copy with `page_size` replaced, clamped to at least one row.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Returns a copy with `page_overlap` replaced.
    pub fn with_page_overlap(mut self, page_overlap: usize) -> Self {
        self.page_overlap = page_overlap;
        self
    }

    /// Returns a copy with `inner_page_delay` replaced.
    pub fn with_inner_page_delay(mut self, delay: Duration) -> Self {
        self.inner_page_delay = delay;
        self
    }

    /// Returns a copy with `save_policy` replaced.
    pub fn with_save_policy(mut self, policy: SavePolicy) -> Self {
        self.save_policy = policy;
        self
    }

    /// Returns a copy with the trailing new-row editor enabled or disabled.
    pub fn with_last_row_dummy(mut self, enabled: bool) -> Self {
        self.last_row_dummy = enabled;
        self
    }

    /// Returns a copy with invisible-page eviction enabled or disabled.
    pub fn with_auto_dispose(mut self, enabled: bool) -> Self {
        self.auto_dispose_pages = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_env_flag, SavePolicy, TableConfig};
    use crate::env::{env_lock, EnvGuard};
    use std::time::Duration;

    #[test]
    fn parse_env_flag_accepts_truthy_values() {
        for value in ["1", "true", "TRUE", " yes ", "on"] {
            assert_eq!(parse_env_flag(value), Some(true), "value: {}", value);
        }
    }

    #[test]
    fn parse_env_flag_accepts_falsy_values() {
        for value in ["", "0", "false", "FALSE", " no ", "off"] {
            assert_eq!(parse_env_flag(value), Some(false), "value: {}", value);
        }
    }

    #[test]
    fn parse_env_flag_rejects_unknown_values() {
        assert_eq!(parse_env_flag("maybe"), None);
        assert_eq!(parse_env_flag("enabled"), None);
    }

    #[test]
    fn from_env_reads_overrides() {
        let _lock = env_lock().lock().expect("env lock");
        let _size = EnvGuard::set("PAGEGRID_PAGE_SIZE", "25");
        let _delay = EnvGuard::set("PAGEGRID_INNER_PAGE_DELAY_MS", "5");
        let _policy = EnvGuard::set("PAGEGRID_SAVE_POLICY", "per-bean");
        let _dummy = EnvGuard::set("PAGEGRID_LAST_ROW_DUMMY", "yes");
        let config = TableConfig::from_env();
        assert_eq!(config.page_size, 25);
        assert_eq!(config.inner_page_delay, Duration::from_millis(5));
        assert_eq!(config.save_policy, SavePolicy::PerBean);
        assert!(config.last_row_dummy);
    }

    #[test]
    fn from_env_falls_back_on_invalid_values() {
        let _lock = env_lock().lock().expect("env lock");
        let _size = EnvGuard::set("PAGEGRID_PAGE_SIZE", "0");
        let _workers = EnvGuard::set("PAGEGRID_WORKERS", "many");
        let _policy = EnvGuard::remove("PAGEGRID_SAVE_POLICY");
        let defaults = TableConfig::default();
        let config = TableConfig::from_env();
        assert_eq!(config.page_size, defaults.page_size);
        assert_eq!(config.worker_threads, defaults.worker_threads);
        assert_eq!(config.save_policy, SavePolicy::Batch);
    }

    #[test]
    fn with_page_size_never_produces_empty_pages() {
        assert_eq!(TableConfig::default().with_page_size(0).page_size, 1);
    }
}
