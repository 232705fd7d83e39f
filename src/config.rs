//! Runtime configuration, read from the environment (and `.env`), with
//! defaults that match the ContentGen dev server.
//!
//! Persisted panel state (`state_path`) defaults to a `state.json` in the
//! platform config directory:
//!   macOS:   ~/Library/Application Support/contentgen-snap/state.json
//!   Linux:   ~/.config/contentgen-snap/state.json
//!   Windows: %APPDATA%/contentgen-snap/state.json

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "http://localhost:8000";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;
pub const DEFAULT_MIN_SELECTION_PX: f64 = 50.0;
pub const DEFAULT_JPEG_QUALITY: u8 = 90;
pub const DEFAULT_CLICK_JPEG_QUALITY: u8 = 80;

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Companion web app origin, without a trailing slash.
    pub api_base: String,
    pub poll_interval: Duration,
    /// Smallest accepted drag selection, per side, in CSS pixels.
    pub min_selection_px: f64,
    /// JPEG quality for cropped screen regions.
    pub jpeg_quality: u8,
    /// JPEG quality for images picked with click-select.
    pub click_jpeg_quality: u8,
    /// `None` means requests never time out.
    pub request_timeout: Option<Duration>,
    pub state_path: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            min_selection_px: DEFAULT_MIN_SELECTION_PX,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            click_jpeg_quality: DEFAULT_CLICK_JPEG_QUALITY,
            request_timeout: None,
            state_path: default_state_path(),
        }
    }
}

impl AppConfig {
    /// Load from process environment, after merging a `.env` file if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            log::info!("[CONFIG] Loaded {}", path.display());
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Unset keys keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(base) = lookup("CONTENTGEN_API_BASE") {
            config.api_base = parse_api_base(&base)?;
        }
        if let Some(raw) = lookup("CONTENTGEN_POLL_INTERVAL_MS") {
            let ms: u64 = parse_number("CONTENTGEN_POLL_INTERVAL_MS", &raw)?;
            if ms == 0 {
                return Err(ConfigError::invalid("CONTENTGEN_POLL_INTERVAL_MS", &raw, "must be positive"));
            }
            config.poll_interval = Duration::from_millis(ms);
        }
        if let Some(raw) = lookup("CONTENTGEN_MIN_SELECTION_PX") {
            let px: f64 = parse_number("CONTENTGEN_MIN_SELECTION_PX", &raw)?;
            if !px.is_finite() || px <= 0.0 {
                return Err(ConfigError::invalid("CONTENTGEN_MIN_SELECTION_PX", &raw, "must be positive"));
            }
            config.min_selection_px = px;
        }
        if let Some(raw) = lookup("CONTENTGEN_JPEG_QUALITY") {
            config.jpeg_quality = parse_quality("CONTENTGEN_JPEG_QUALITY", &raw)?;
        }
        if let Some(raw) = lookup("CONTENTGEN_CLICK_JPEG_QUALITY") {
            config.click_jpeg_quality = parse_quality("CONTENTGEN_CLICK_JPEG_QUALITY", &raw)?;
        }
        if let Some(raw) = lookup("CONTENTGEN_REQUEST_TIMEOUT_MS") {
            let ms: u64 = parse_number("CONTENTGEN_REQUEST_TIMEOUT_MS", &raw)?;
            config.request_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(path) = lookup("CONTENTGEN_STATE_PATH") {
            if path.trim().is_empty() {
                return Err(ConfigError::invalid("CONTENTGEN_STATE_PATH", &path, "must not be empty"));
            }
            config.state_path = PathBuf::from(path);
        }

        Ok(config)
    }
}

/// Default location of the persisted panel state.
pub fn default_state_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("contentgen-snap")
        .join("state.json")
}

fn parse_api_base(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(ConfigError::invalid("CONTENTGEN_API_BASE", raw, "must be an http(s) URL"));
    }
    Ok(trimmed.to_string())
}

fn parse_number<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::invalid(key, raw, "not a number"))
}

fn parse_quality(key: &'static str, raw: &str) -> Result<u8, ConfigError> {
    let quality: u8 = parse_number(key, raw)?;
    if !(1..=100).contains(&quality) {
        return Err(ConfigError::invalid(key, raw, "must be between 1 and 100"));
    }
    Ok(quality)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key} ({value:?}): {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, value: &str, reason: &'static str) -> Self {
        Self::Invalid {
            key,
            value: value.to_string(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_dev_server() {
        let config = AppConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.api_base, "http://localhost:8000");
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.min_selection_px, 50.0);
        assert_eq!(config.jpeg_quality, 90);
        assert_eq!(config.click_jpeg_quality, 80);
        assert!(config.request_timeout.is_none());
    }

    #[test]
    fn state_path_is_under_contentgen_snap() {
        let path = default_state_path();
        let s = path.to_string_lossy();
        assert!(s.contains("contentgen-snap"));
        assert!(s.ends_with("state.json"));
        assert_eq!(AppConfig::default().state_path, path);
    }

    #[test]
    fn overrides_are_applied() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("CONTENTGEN_API_BASE", "https://contentgen.example.com/"),
            ("CONTENTGEN_POLL_INTERVAL_MS", "500"),
            ("CONTENTGEN_MIN_SELECTION_PX", "32"),
            ("CONTENTGEN_JPEG_QUALITY", "75"),
            ("CONTENTGEN_REQUEST_TIMEOUT_MS", "10000"),
            ("CONTENTGEN_STATE_PATH", "/tmp/snap.json"),
        ]))
        .unwrap();

        assert_eq!(config.api_base, "https://contentgen.example.com");
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.min_selection_px, 32.0);
        assert_eq!(config.jpeg_quality, 75);
        assert_eq!(config.request_timeout, Some(Duration::from_secs(10)));
        assert_eq!(config.state_path, PathBuf::from("/tmp/snap.json"));
    }

    #[test]
    fn zero_timeout_means_no_timeout() {
        let config =
            AppConfig::from_lookup(lookup_from(&[("CONTENTGEN_REQUEST_TIMEOUT_MS", "0")])).unwrap();
        assert!(config.request_timeout.is_none());
    }

    #[test]
    fn rejects_bad_values() {
        let bad = [
            ("CONTENTGEN_API_BASE", "localhost:8000"),
            ("CONTENTGEN_POLL_INTERVAL_MS", "0"),
            ("CONTENTGEN_POLL_INTERVAL_MS", "soon"),
            ("CONTENTGEN_MIN_SELECTION_PX", "-5"),
            ("CONTENTGEN_JPEG_QUALITY", "0"),
            ("CONTENTGEN_CLICK_JPEG_QUALITY", "101"),
            ("CONTENTGEN_STATE_PATH", "  "),
        ];

        for (key, value) in bad {
            let result = AppConfig::from_lookup(lookup_from(&[(key, value)]));
            assert!(result.is_err(), "{}={} should be rejected", key, value);
        }
    }
}
