use std::{fs, path::Path, time::Duration};

use anyhow::{anyhow, Context};
use serde::Deserialize;

pub const DEFAULT_SETTINGS_FILE: &str = "style_agent.toml";
const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub backend_url: String,
    pub profile_timeout_secs: u64,
    pub stream_idle_timeout_secs: u64,
    pub products_timeout_secs: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.into(),
            profile_timeout_secs: 120,
            stream_idle_timeout_secs: 180,
            products_timeout_secs: 120,
        }
    }
}

impl PipelineSettings {
    pub fn timeouts(&self) -> StageTimeouts {
        StageTimeouts {
            profile: Duration::from_secs(self.profile_timeout_secs),
            stream_idle: Duration::from_secs(self.stream_idle_timeout_secs),
            products: Duration::from_secs(self.products_timeout_secs),
        }
    }
}

/// Upper bounds on each network stage of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTimeouts {
    pub profile: Duration,
    pub stream_idle: Duration,
    pub products: Duration,
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    backend_url: Option<String>,
    profile_timeout_secs: Option<u64>,
    stream_idle_timeout_secs: Option<u64>,
    products_timeout_secs: Option<u64>,
}

/// Defaults, then the TOML file (explicit path, or `style_agent.toml` in the
/// working directory when present), then environment overrides.
pub fn load_settings_from(path: Option<&Path>) -> anyhow::Result<PipelineSettings> {
    load_settings_with(path, |key| std::env::var(key).ok())
}

fn load_settings_with(
    path: Option<&Path>,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<PipelineSettings> {
    let mut settings = PipelineSettings::default();

    let raw = match path {
        Some(path) => Some(
            fs::read_to_string(path)
                .with_context(|| format!("failed to read settings file {}", path.display()))?,
        ),
        None => fs::read_to_string(DEFAULT_SETTINGS_FILE).ok(),
    };
    if let Some(raw) = raw {
        let file_cfg: FileSettings = toml::from_str(&raw).context("invalid settings file")?;
        apply_file_settings(&mut settings, file_cfg);
    }

    apply_env_overrides(&mut settings, lookup);
    settings.backend_url = normalize_backend_url(&settings.backend_url)?;
    validate_timeouts(&settings)?;
    Ok(settings)
}

fn validate_timeouts(settings: &PipelineSettings) -> anyhow::Result<()> {
    for (name, secs) in [
        ("profile_timeout_secs", settings.profile_timeout_secs),
        ("stream_idle_timeout_secs", settings.stream_idle_timeout_secs),
        ("products_timeout_secs", settings.products_timeout_secs),
    ] {
        if secs == 0 {
            return Err(anyhow!("{name} must be greater than zero"));
        }
    }
    Ok(())
}

fn apply_file_settings(settings: &mut PipelineSettings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.backend_url {
        settings.backend_url = v;
    }
    if let Some(v) = file_cfg.profile_timeout_secs {
        settings.profile_timeout_secs = v;
    }
    if let Some(v) = file_cfg.stream_idle_timeout_secs {
        settings.stream_idle_timeout_secs = v;
    }
    if let Some(v) = file_cfg.products_timeout_secs {
        settings.products_timeout_secs = v;
    }
}

fn apply_env_overrides(settings: &mut PipelineSettings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("BACKEND_URL") {
        settings.backend_url = v;
    }
    if let Some(v) = lookup("APP__BACKEND_URL") {
        settings.backend_url = v;
    }

    let parse_secs = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
    if let Some(v) = parse_secs("APP__PROFILE_TIMEOUT_SECS") {
        settings.profile_timeout_secs = v;
    }
    if let Some(v) = parse_secs("APP__STREAM_IDLE_TIMEOUT_SECS") {
        settings.stream_idle_timeout_secs = v;
    }
    if let Some(v) = parse_secs("APP__PRODUCTS_TIMEOUT_SECS") {
        settings.products_timeout_secs = v;
    }
}

pub fn normalize_backend_url(raw_backend_url: &str) -> anyhow::Result<String> {
    let trimmed = raw_backend_url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Ok(DEFAULT_BACKEND_URL.to_string());
    }

    let parsed = url::Url::parse(trimmed)
        .with_context(|| format!("invalid backend url '{raw_backend_url}'"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(anyhow!("backend url must start with http:// or https://"));
    }
    Ok(trimmed.to_string())
}
