//! Handles application configuration loading and management.
//!
//! This module defines the `AppConfig` struct which holds configuration
//! parameters like the backend API URL, cache location and slideshow/polling
//! timings. It provides the `load_config` function to read these settings from
//! an INI file.

use std::path::PathBuf;
use std::time::Duration;

use configparser::ini::Ini;
use log::{debug, error, info};

use super::errors::ConfigError;
use super::fetcher::RefreshPolicy;
use super::slideshow::{SlideshowTiming, TimingMode};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/signage_display.conf";
const DEFAULT_CONNECTIVITY_PROBE: &str = "8.8.8.8:53";

/// Holds the application's configuration parameters.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Base URL of the display API, e.g. `http://localhost:5000/api/v1`.
    pub api_base_url: String,
    /// Where the last-known-good display data is persisted. `None` disables the disk cache.
    pub cache_path: Option<PathBuf>,
    /// `host:port` probed to decide whether the device is online.
    pub connectivity_probe: String,
    pub fullscreen: bool,
    pub slideshow: SlideshowTiming,
    pub display_refresh: RefreshPolicy,
}

/// Loads application configuration from the specified INI file path.
///
/// Reads the required `api_base_url` from `[settings]`; everything else in
/// `[settings]`, `[slideshow]` and `[polling]` is optional.
///
/// # Errors
/// Returns `ConfigError` if the file cannot be read, is malformed,
/// or if essential keys are missing.
#[must_use = "loading configuration can fail, the Result must be handled"]
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    info!("Attempting to load config from: {}", path);
    let contents = std::fs::read_to_string(path).map_err(|e| {
        error!("Error reading config file '{}': {}", path, e);
        ConfigError::Io(e)
    })?;
    let app_config = parse_config(&contents)?;
    info!("Configuration loaded successfully from {}: {:?}", path, app_config);
    Ok(app_config)
}

/// Parses configuration from INI text.
#[must_use = "parsing configuration can fail, the Result must be handled"]
pub fn parse_config(contents: &str) -> Result<AppConfig, ConfigError> {
    let mut config_parser = Ini::new();
    config_parser.read(contents.to_string()).map_err(ConfigError::Parse)?;

    let api_base_url = config_parser
        .get("settings", "api_base_url")
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| {
            error!("Missing configuration key 'api_base_url' in section '[settings]'");
            ConfigError::MissingKey("api_base_url".to_string())
        })?;
    let api_base_url = api_base_url.trim_end_matches('/').to_string();
    url::Url::parse(&api_base_url).map_err(|_| ConfigError::InvalidValue {
        key: "api_base_url".to_string(),
        value: api_base_url.clone(),
    })?;
    debug!("Loaded config value for key 'api_base_url': {}", api_base_url);

    let cache_path = config_parser
        .get("settings", "cache_path")
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from);
    let connectivity_probe = config_parser
        .get("settings", "connectivity_probe")
        .unwrap_or_else(|| DEFAULT_CONNECTIVITY_PROBE.to_string());
    let fullscreen = config_parser
        .getboolcoerce("settings", "fullscreen")
        .map_err(ConfigError::Parse)?
        .unwrap_or(true);

    let mut slideshow = SlideshowTiming::default();
    if let Some(mode) = config_parser.get("slideshow", "mode") {
        slideshow.mode = match mode.to_lowercase().as_str() {
            "video_events" => TimingMode::VideoEvents,
            "simple_timer" => TimingMode::SimpleTimer,
            _ => return Err(ConfigError::InvalidValue { key: "mode".to_string(), value: mode }),
        };
    }
    let millis = |section: &str, key: &str| -> Result<Option<Duration>, ConfigError> {
        Ok(config_parser
            .getuint(section, key)
            .map_err(ConfigError::Parse)?
            .map(Duration::from_millis))
    };
    if let Some(d) = millis("slideshow", "transition_ms")? { slideshow.transition = d; }
    if let Some(d) = millis("slideshow", "image_transition_allowance_ms")? { slideshow.image_transition_allowance = d; }
    if let Some(d) = millis("slideshow", "min_image_ms")? { slideshow.min_image_duration = d; }
    if let Some(d) = millis("slideshow", "video_error_grace_ms")? { slideshow.error_grace = d; }
    if let Some(d) = millis("slideshow", "video_safety_buffer_ms")? { slideshow.video_safety_buffer = d; }
    if let Some(d) = millis("slideshow", "video_load_timeout_ms")? { slideshow.video_load_timeout = d; }
    debug!("Slideshow timing: {:?}", slideshow);

    let mut display_refresh = RefreshPolicy::display();
    if let Some(d) = millis("polling", "interval_ms")? { display_refresh.interval = d; }
    if let Some(d) = millis("polling", "error_interval_ms")? { display_refresh.error_interval = d; }
    debug!("Display refresh policy: {:?}", display_refresh);

    Ok(AppConfig {
        api_base_url,
        cache_path,
        connectivity_probe,
        fullscreen,
        slideshow,
        display_refresh,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let cfg = parse_config("[settings]\napi_base_url = http://localhost:5000/api/v1/\n").unwrap();
        assert_eq!(cfg.api_base_url, "http://localhost:5000/api/v1");
        assert!(cfg.cache_path.is_none());
        assert_eq!(cfg.connectivity_probe, "8.8.8.8:53");
        assert!(cfg.fullscreen);
        assert_eq!(cfg.slideshow.mode, TimingMode::VideoEvents);
        assert_eq!(cfg.slideshow.transition, Duration::from_millis(1000));
        assert_eq!(cfg.slideshow.video_load_timeout, Duration::from_secs(120));
        assert_eq!(cfg.display_refresh.interval, Duration::from_secs(30));
        assert_eq!(cfg.display_refresh.error_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_overrides_are_applied() {
        let ini = "\
[settings]
api_base_url = http://display.local/api/v1
cache_path = /tmp/display.json
fullscreen = false

[slideshow]
mode = simple_timer
transition_ms = 800
video_error_grace_ms = 3000
video_load_timeout_ms = 45000

[polling]
interval_ms = 15000
";
        let cfg = parse_config(ini).unwrap();
        assert_eq!(cfg.cache_path, Some(PathBuf::from("/tmp/display.json")));
        assert!(!cfg.fullscreen);
        assert_eq!(cfg.slideshow.mode, TimingMode::SimpleTimer);
        assert_eq!(cfg.slideshow.transition, Duration::from_millis(800));
        assert_eq!(cfg.slideshow.error_grace, Duration::from_millis(3000));
        assert_eq!(cfg.slideshow.video_load_timeout, Duration::from_secs(45));
        assert_eq!(cfg.display_refresh.interval, Duration::from_millis(15000));
        assert_eq!(cfg.display_refresh.error_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_missing_base_url_is_reported() {
        let err = parse_config("[settings]\nfullscreen = true\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey(ref k) if k == "api_base_url"));
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        let err = parse_config("[settings]\napi_base_url = http://x/api\n[slideshow]\nmode = random\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "mode"));
    }

    #[test]
    fn test_load_config_reads_file_and_reports_missing_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[settings]\napi_base_url = http://127.0.0.1:5000/api/v1").unwrap();
        let cfg = load_config(file.path().to_str().unwrap()).unwrap();
        assert_eq!(cfg.api_base_url, "http://127.0.0.1:5000/api/v1");

        let err = load_config("/nonexistent/signage_display.conf").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
