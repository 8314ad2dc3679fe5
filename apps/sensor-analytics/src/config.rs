use crate::alerts::ThresholdConfig;
use crate::series::DEFAULT_CAPACITY;
use crate::stats::DEFAULT_TREND_WINDOW;
use crate::window::RangeToken;
use anyhow::{anyhow, Context, Result};
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

const ENV_MOISTURE_LOW: &str = "SENSOR_ANALYTICS_MOISTURE_LOW";
const ENV_TEMP_LOW: &str = "SENSOR_ANALYTICS_TEMP_LOW";
const ENV_TEMP_HIGH: &str = "SENSOR_ANALYTICS_TEMP_HIGH";
const ENV_LIGHT_LOW: &str = "SENSOR_ANALYTICS_LIGHT_LOW";

#[derive(Debug, Clone)]
pub struct Config {
    pub http_bind: String,
    pub default_range: RangeToken,
    pub buffer_capacity: usize,
    pub trend_window: usize,
    pub command_queue: usize,
    pub thresholds: ThresholdConfig,
    pub settings_path: Option<PathBuf>,
}

/// Threshold values from the settings file. Each one only applies when its env var is unset.
#[derive(Debug, Clone, Default, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    thresholds: ThresholdOverrides,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ThresholdOverrides {
    #[serde(default)]
    moisture_low: Option<f64>,
    #[serde(default)]
    temp_low: Option<f64>,
    #[serde(default)]
    temp_high: Option<f64>,
    #[serde(default)]
    light_low: Option<f64>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let http_bind = env_string(
            "SENSOR_ANALYTICS_HTTP_BIND",
            Some("127.0.0.1:9180".to_string()),
        )?;
        let default_range = env_string("SENSOR_ANALYTICS_DEFAULT_RANGE", Some("24h".to_string()))?
            .parse::<RangeToken>()
            .context("invalid SENSOR_ANALYTICS_DEFAULT_RANGE")?;
        let buffer_capacity =
            env_u64("SENSOR_ANALYTICS_BUFFER_CAPACITY", Some(DEFAULT_CAPACITY as u64))? as usize;
        let trend_window =
            env_u64("SENSOR_ANALYTICS_TREND_WINDOW", Some(DEFAULT_TREND_WINDOW as u64))? as usize;
        let command_queue = env_u64("SENSOR_ANALYTICS_COMMAND_QUEUE", Some(256))? as usize;

        if buffer_capacity == 0 {
            return Err(anyhow!("SENSOR_ANALYTICS_BUFFER_CAPACITY must be at least 1"));
        }
        if trend_window == 0 {
            return Err(anyhow!("SENSOR_ANALYTICS_TREND_WINDOW must be at least 1"));
        }

        let defaults = ThresholdConfig::default();
        let mut thresholds = ThresholdConfig {
            moisture_low: env_f64(ENV_MOISTURE_LOW, Some(defaults.moisture_low))?,
            temp_low: env_f64(ENV_TEMP_LOW, Some(defaults.temp_low))?,
            temp_high: env_f64(ENV_TEMP_HIGH, Some(defaults.temp_high))?,
            light_low: env_f64(ENV_LIGHT_LOW, Some(defaults.light_low))?,
        };

        let settings_path = env_optional("SENSOR_ANALYTICS_SETTINGS_PATH").map(PathBuf::from);
        if let Some(path) = settings_path.as_deref() {
            if let Some(settings) = load_settings_file(path) {
                apply_threshold_overrides(&mut thresholds, &settings.thresholds, |key| {
                    env_optional(key).is_none()
                });
            }
        }

        thresholds
            .validate()
            .map_err(|err| anyhow!("invalid alert thresholds: {err}"))?;

        Ok(Self {
            http_bind,
            default_range,
            buffer_capacity,
            trend_window,
            command_queue,
            thresholds,
            settings_path,
        })
    }
}

fn load_settings_file(path: &Path) -> Option<SettingsFile> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "settings file not found; using env thresholds");
        return None;
    }
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "failed to read settings file; using env thresholds"
            );
            return None;
        }
    };
    match serde_json::from_str(&contents) {
        Ok(settings) => Some(settings),
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "failed to parse settings file; using env thresholds"
            );
            None
        }
    }
}

fn apply_threshold_overrides<F>(
    thresholds: &mut ThresholdConfig,
    overrides: &ThresholdOverrides,
    env_allows: F,
) where
    F: Fn(&str) -> bool,
{
    let pairs = [
        (ENV_MOISTURE_LOW, overrides.moisture_low, &mut thresholds.moisture_low),
        (ENV_TEMP_LOW, overrides.temp_low, &mut thresholds.temp_low),
        (ENV_TEMP_HIGH, overrides.temp_high, &mut thresholds.temp_high),
        (ENV_LIGHT_LOW, overrides.light_low, &mut thresholds.light_low),
    ];
    for (key, value, slot) in pairs {
        if let Some(value) = value.filter(|v| v.is_finite()) {
            if env_allows(key) {
                *slot = value;
            }
        }
    }
}

fn env_string(key: &str, default: Option<String>) -> Result<String> {
    match env::var(key) {
        Ok(value) => Ok(value.trim().to_string()),
        Err(_) => default.ok_or_else(|| anyhow!("missing env var {key}")),
    }
}

fn env_u64(key: &str, default: Option<u64>) -> Result<u64> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .with_context(|| format!("invalid {key}")),
        Err(_) => default.ok_or_else(|| anyhow!("missing env var {key}")),
    }
}

fn env_f64(key: &str, default: Option<f64>) -> Result<f64> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<f64>()
            .with_context(|| format!("invalid {key}")),
        Err(_) => default.ok_or_else(|| anyhow!("missing env var {key}")),
    }
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
