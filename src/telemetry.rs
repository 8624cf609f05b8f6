//! Logging bootstrap for hosts embedding the crowdsale engine.
//!
//! - Text or JSON output
//! - EnvFilter: explicit directive, else `RUST_LOG`, else [`DEFAULT_FILTER`]
//! - Engine events are emitted under target `crowdsale`

use std::env;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

/// Engine commands at info (reverts at warn), everything else at warn.
pub const DEFAULT_FILTER: &str = "warn,crowdsale=info";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. "info,crowdsale=debug". `None` reads `RUST_LOG`.
    pub env_filter: Option<String>,
    pub json: bool,
    /// Print target, file and line.
    pub with_targets_and_lines: bool,
    pub with_threads: bool,
    /// Colors, text format only.
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            env_filter: None,
            json: true,
            with_targets_and_lines: true,
            with_threads: false,
            ansi: false,
        }
    }
}

/// An explicit directive must parse; a missing or malformed `RUST_LOG`
/// falls back to [`DEFAULT_FILTER`].
fn build_filter(cfg: &LoggingConfig) -> anyhow::Result<EnvFilter> {
    match &cfg.env_filter {
        Some(s) => {
            EnvFilter::try_new(s.as_str()).with_context(|| format!("invalid log filter `{s}`"))
        }
        None => Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))),
    }
}

/// Install the global subscriber. Fails on a malformed filter directive or
/// if a subscriber is already installed.
pub fn init(cfg: LoggingConfig) -> anyhow::Result<()> {
    let filter = build_filter(&cfg)?;

    let fmt_layer = {
        let base = fmt::layer()
            .with_target(cfg.with_targets_and_lines)
            .with_file(cfg.with_targets_and_lines)
            .with_line_number(cfg.with_targets_and_lines)
            .with_thread_ids(cfg.with_threads)
            .with_thread_names(cfg.with_threads);

        if cfg.json {
            base.json()
                .with_ansi(false)
                .with_current_span(true)
                .with_span_list(true)
                .flatten_event(true)
                .boxed()
        } else {
            base.with_ansi(cfg.ansi).boxed()
        }
    };

    Registry::default().with(filter).with(fmt_layer).try_init()?;
    Ok(())
}

/// Quick init from the environment:
/// - LOG_JSON=true|false
/// - LOG_ANSI=true|false
/// - LOG_THREADS=true|false
/// - RUST_LOG=<filter>
pub fn init_from_env() -> anyhow::Result<()> {
    let flag = |name: &str, default: bool| env::var(name).map(|v| v == "true").unwrap_or(default);
    init(LoggingConfig {
        env_filter: None,
        json: flag("LOG_JSON", true),
        with_targets_and_lines: true,
        with_threads: flag("LOG_THREADS", false),
        ansi: flag("LOG_ANSI", false),
    })
}
