//! Settings loading and validation.
//!
//! The env var `LLM_AGGREGATOR_CONFIG` names a YAML file; a validated
//! [`Settings`] is the only thing the rest of the process sees. Invalid
//! configuration is the one startup-fatal error kind (`spec.md` §7).

use crate::error::ConfigError;
use crate::model::{FilesSizeGathererConfig, ProviderConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::Path;

pub const CONFIG_ENV_VAR: &str = "LLM_AGGREGATOR_CONFIG";

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawProviders {
    List(Vec<RawProvider>),
    Map(HashMap<String, RawProvider>),
}

#[derive(Debug, Clone, Deserialize)]
struct RawProvider {
    base_url: String,
    internal_base_url: Option<String>,
    api_key: Option<String>,
    files_size_gatherer: Option<RawFilesSizeGatherer>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawFilesSizeGatherer {
    path: String,
    base_path: String,
    #[serde(default)]
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawModelInfoSource {
    name: String,
    url_template: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RawBrain {
    base_url: String,
    id: String,
    api_key: Option<String>,
    #[serde(default = "default_max_batch_size")]
    max_batch_size: usize,
}

fn default_max_batch_size() -> usize {
    1
}

#[derive(Debug, Clone, Deserialize)]
struct RawBrainPrompts {
    system: String,
    user: String,
    #[serde(default)]
    model_info_prefix_template: String,
}

#[derive(Debug, Clone, Deserialize)]
struct RawTime {
    #[serde(default = "default_fetch_interval")]
    fetch_models_interval: u64,
    #[serde(default = "default_fetch_timeout")]
    fetch_models_timeout: u64,
    #[serde(default = "default_enrich_timeout")]
    enrich_models_timeout: u64,
    #[serde(default = "default_idle_sleep")]
    enrich_idle_sleep: u64,
    #[serde(default = "default_doc_ttl")]
    website_markdown_cache_ttl: u64,
}

fn default_fetch_interval() -> u64 {
    60
}
fn default_fetch_timeout() -> u64 {
    10
}
fn default_enrich_timeout() -> u64 {
    60
}
fn default_idle_sleep() -> u64 {
    5
}
fn default_doc_ttl() -> u64 {
    7 * 24 * 60 * 60
}

impl Default for RawTime {
    fn default() -> Self {
        Self {
            fetch_models_interval: default_fetch_interval(),
            fetch_models_timeout: default_fetch_timeout(),
            enrich_models_timeout: default_enrich_timeout(),
            enrich_idle_sleep: default_idle_sleep(),
            website_markdown_cache_ttl: default_doc_ttl(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
struct RawUi {
    #[serde(default = "default_true")]
    static_enabled: bool,
    custom_static_path: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
struct RawLogging {
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default = "default_log_format")]
    log_format: String,
    #[serde(default)]
    logger_overrides: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for RawLogging {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            logger_overrides: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawSettings {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default)]
    logging: RawLogging,
    brain: RawBrain,
    brain_prompts: RawBrainPrompts,
    #[serde(default)]
    time: RawTime,
    providers: RawProviders,
    files_size_gatherer: Option<RawFilesSizeGatherer>,
    #[serde(default)]
    model_info_sources: Vec<RawModelInfoSource>,
    #[serde(default)]
    ui: RawUi,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8080
}

/// Validated, process-lifetime configuration. Reload is via full restart.
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: String,
    pub logger_overrides: HashMap<String, String>,
    pub brain: BrainConfig,
    pub brain_prompts: BrainPromptsConfig,
    pub time: TimeConfig,
    pub providers: Vec<ProviderConfig>,
    pub model_info_sources: Vec<ModelInfoSource>,
    pub ui: UiConfig,
}

#[derive(Debug, Clone)]
pub struct BrainConfig {
    pub base_url: String,
    pub id: String,
    pub api_key: Option<String>,
    pub max_batch_size: usize,
}

#[derive(Debug, Clone)]
pub struct BrainPromptsConfig {
    pub system: String,
    pub user: String,
    pub model_info_prefix_template: String,
}

#[derive(Debug, Clone, Copy)]
pub struct TimeConfig {
    pub fetch_models_interval: std::time::Duration,
    pub fetch_models_timeout: std::time::Duration,
    pub enrich_models_timeout: std::time::Duration,
    pub enrich_idle_sleep: std::time::Duration,
    pub website_markdown_cache_ttl: std::time::Duration,
}

/// A unique-keyed external model catalog page; `url_template` contains the
/// literal placeholder `{model_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfoSource {
    pub key: String,
    pub name: String,
    pub url_template: String,
}

#[derive(Debug, Clone)]
pub struct UiConfig {
    pub static_enabled: bool,
    pub custom_static_path: Option<String>,
}

impl Settings {
    /// Load the config file named by `LLM_AGGREGATOR_CONFIG`, or `override_path`
    /// if given (used by tests/CLI `--config`).
    pub fn load(override_path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match override_path {
            Some(p) => p.to_path_buf(),
            None => {
                let raw = env::var(CONFIG_ENV_VAR).map_err(|_| ConfigError::MissingEnvVar)?;
                std::path::PathBuf::from(raw)
            }
        };

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        Self::from_yaml_str(&content, &path.display().to_string())
    }

    pub fn from_yaml_str(content: &str, path_label: &str) -> Result<Self, ConfigError> {
        let raw: RawSettings =
            serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
                path: path_label.to_string(),
                source,
            })?;
        Self::validate(raw)
    }

    fn validate(raw: RawSettings) -> Result<Self, ConfigError> {
        if raw.brain_prompts.system.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "brain_prompts.system must not be empty".into(),
            ));
        }
        if raw.brain_prompts.user.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "brain_prompts.user must not be empty".into(),
            ));
        }

        let providers = match raw.providers {
            RawProviders::List(list) => list,
            RawProviders::Map(map) => map.into_values().collect(),
        };
        if providers.is_empty() {
            return Err(ConfigError::Invalid(
                "providers must contain at least one entry".into(),
            ));
        }

        let mut seen_urls = std::collections::HashSet::new();
        let mut provider_configs = Vec::with_capacity(providers.len());
        for p in providers {
            if p.base_url.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "providers[].base_url must not be empty".into(),
                ));
            }
            if !seen_urls.insert(p.base_url.clone()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate provider base_url: {}",
                    p.base_url
                )));
            }
            let files_size_gatherer = match p.files_size_gatherer {
                Some(g) => Some(validate_gatherer(g)?),
                None => None,
            };
            let internal_base_url = p.internal_base_url.unwrap_or_else(|| p.base_url.clone());
            provider_configs.push(ProviderConfig {
                label: p.base_url.clone(),
                base_url: p.base_url,
                internal_base_url,
                api_key: p.api_key,
                files_size_gatherer,
            });
        }

        if let Some(g) = raw.files_size_gatherer {
            validate_gatherer(g)?;
        }

        let mut seen_source_keys = std::collections::HashSet::new();
        let mut model_info_sources = Vec::with_capacity(raw.model_info_sources.len());
        for s in raw.model_info_sources {
            if !s.url_template.contains("{model_id}") {
                return Err(ConfigError::Invalid(format!(
                    "model_info_sources[{}].url_template must contain {{model_id}}",
                    s.name
                )));
            }
            let key = slugify(&s.name);
            if !seen_source_keys.insert(key.clone()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate model_info_sources name after slugification: {key}"
                )));
            }
            model_info_sources.push(ModelInfoSource {
                key,
                name: s.name,
                url_template: s.url_template,
            });
        }

        Ok(Settings {
            host: raw.host,
            port: raw.port,
            log_level: raw.logging.log_level,
            log_format: raw.logging.log_format,
            logger_overrides: raw.logging.logger_overrides,
            brain: BrainConfig {
                base_url: raw.brain.base_url,
                id: raw.brain.id,
                api_key: raw.brain.api_key,
                max_batch_size: raw.brain.max_batch_size,
            },
            brain_prompts: BrainPromptsConfig {
                system: raw.brain_prompts.system,
                user: raw.brain_prompts.user,
                model_info_prefix_template: raw.brain_prompts.model_info_prefix_template,
            },
            time: TimeConfig {
                fetch_models_interval: std::time::Duration::from_secs(
                    raw.time.fetch_models_interval,
                ),
                fetch_models_timeout: std::time::Duration::from_secs(
                    raw.time.fetch_models_timeout,
                ),
                enrich_models_timeout: std::time::Duration::from_secs(
                    raw.time.enrich_models_timeout,
                ),
                enrich_idle_sleep: std::time::Duration::from_secs(raw.time.enrich_idle_sleep),
                website_markdown_cache_ttl: std::time::Duration::from_secs(
                    raw.time.website_markdown_cache_ttl,
                ),
            },
            providers: provider_configs,
            model_info_sources,
            ui: UiConfig {
                static_enabled: raw.ui.static_enabled,
                custom_static_path: raw.ui.custom_static_path,
            },
        })
    }
}

fn validate_gatherer(g: RawFilesSizeGatherer) -> Result<FilesSizeGathererConfig, ConfigError> {
    if g.path.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "files_size_gatherer.path must not be empty".into(),
        ));
    }
    if g.base_path.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "files_size_gatherer.base_path must not be empty".into(),
        ));
    }
    // A bare command name (no path separator) must resolve on PATH; a path
    // with separators is checked for existence directly below by the caller
    // at fetch time instead, since relative paths may only become valid once
    // base_path is joined in.
    if !g.path.contains(std::path::MAIN_SEPARATOR) && which::which(&g.path).is_err() {
        return Err(ConfigError::Invalid(format!(
            "files_size_gatherer.path {:?} is not an executable on PATH",
            g.path
        )));
    }
    Ok(FilesSizeGathererConfig {
        path: g.path,
        base_path: g.base_path,
        timeout_seconds: g.timeout_seconds.unwrap_or(15),
    })
}

/// Lowercase, ascii-only slug used as the doc-source cache key.
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_dash = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    out.trim_matches('-').to_string()
}
