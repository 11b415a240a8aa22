//! Component N — Logging.
//!
//! `tracing_subscriber` initialized from config: `log_level`/`log_format`
//! pick the base filter and the renderer; `logger_overrides` layers
//! per-target directives on top (`spec.md` §6).

use crate::config::Settings;
use std::collections::HashMap;
use tracing_subscriber::{fmt, EnvFilter};

pub fn init(settings: &Settings) -> anyhow::Result<()> {
    let filter = build_filter(&settings.log_level, &settings.logger_overrides);

    let subscriber = fmt().with_env_filter(filter);

    match settings.log_format.as_str() {
        "json" => subscriber.json().try_init(),
        _ => subscriber.try_init(),
    }
    .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))
}

fn build_filter(log_level: &str, overrides: &HashMap<String, String>) -> EnvFilter {
    let mut directive = log_level.to_string();
    for (target, level) in overrides {
        directive.push(',');
        directive.push_str(&format!("{target}={level}"));
    }
    EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"))
}
