//! Config loader — reads `~/.valet/config.json` and merges env vars.
//!
//! # Loading precedence
//! 1. Defaults (from `Config::default()`)
//! 2. JSON file at `~/.valet/config.json`
//! 3. Environment variables `VALET_<SECTION>__<FIELD>` (override JSON)

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::schema::Config;

/// Default config file path.
pub fn get_config_path() -> PathBuf {
    crate::utils::get_data_path().join("config.json")
}

/// Load configuration from the default path + env vars.
///
/// Falls back to `Config::default()` if the file doesn't exist or can't be parsed.
pub fn load_config(path: Option<&Path>) -> Config {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);
    load_config_from_path(&config_path)
}

/// Load config from a specific file path.
fn load_config_from_path(path: &Path) -> Config {
    if !path.exists() {
        info!("No config file found at {}, using defaults", path.display());
        return apply_env_overrides(Config::default());
    }

    debug!("Loading config from {}", path.display());

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return apply_env_overrides(Config::default());
        }
    };

    let config: Config = match serde_json::from_str(&content) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to parse config JSON: {}", e);
            return apply_env_overrides(Config::default());
        }
    };

    apply_env_overrides(config)
}

/// Save configuration to disk (pretty-printed JSON with camelCase keys).
pub fn save_config(config: &Config, path: Option<&Path>) -> std::io::Result<()> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(config)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

    std::fs::write(&config_path, json)?;
    debug!("Config saved to {}", config_path.display());
    Ok(())
}

/// Apply environment variable overrides on top of a loaded config.
///
/// Env var format: `VALET_<SECTION>__<FIELD>` (double underscore as delimiter).
///
/// Supported overrides:
/// - `VALET_SESSION__MAX_EXCHANGES` → `session.max_exchanges`
/// - `VALET_SESSION__MAX_SESSION_DURATION_S` → `session.max_session_duration_s`
/// - `VALET_SPEECH__ACK_CONFIDENCE_THRESHOLD` → `speech.ack_confidence_threshold`
/// - `VALET_SPEECH__PROCESSING_ACK_DELAY_MS` → `speech.processing_ack_delay_ms`
/// - `VALET_DISPLAY__MAX_ITEMS` → `display.max_items`
/// - `VALET_GENERATION__MAX_TOKENS` → `generation.max_tokens`
/// - `VALET_GENERATION__TEMPERATURE` → `generation.temperature`
fn apply_env_overrides(mut config: Config) -> Config {
    if let Ok(val) = std::env::var("VALET_SESSION__MAX_EXCHANGES") {
        if let Ok(n) = val.parse::<usize>() {
            config.session.max_exchanges = n;
        }
    }
    if let Ok(val) = std::env::var("VALET_SESSION__MAX_SESSION_DURATION_S") {
        if let Ok(n) = val.parse::<u64>() {
            config.session.max_session_duration_s = n;
        }
    }
    if let Ok(val) = std::env::var("VALET_SPEECH__ACK_CONFIDENCE_THRESHOLD") {
        if let Ok(t) = val.parse::<f32>() {
            config.speech.ack_confidence_threshold = t;
        }
    }
    if let Ok(val) = std::env::var("VALET_SPEECH__PROCESSING_ACK_DELAY_MS") {
        if let Ok(n) = val.parse::<u64>() {
            config.speech.processing_ack_delay_ms = n;
        }
    }
    if let Ok(val) = std::env::var("VALET_DISPLAY__MAX_ITEMS") {
        if let Ok(n) = val.parse::<usize>() {
            config.display.max_items = n;
        }
    }
    if let Ok(val) = std::env::var("VALET_GENERATION__MAX_TOKENS") {
        if let Ok(n) = val.parse::<u32>() {
            config.generation.max_tokens = n;
        }
    }
    if let Ok(val) = std::env::var("VALET_GENERATION__TEMPERATURE") {
        if let Ok(t) = val.parse::<f64>() {
            config.generation.temperature = t;
        }
    }

    config
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
