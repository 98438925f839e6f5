//! Log output setup.
//!
//! The library only emits `tracing` events; binaries and tests decide where
//! they go. [`init_tracing`] installs a `fmt` subscriber filtered by
//! `RUST_LOG` (default `info`).

use crate::errors::AskflowError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing_subscriber::{fmt, EnvFilter};

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl FromStr for LogFormat {
    type Err = AskflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(AskflowError::config(format!("unknown log format '{other}'"))),
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Returns `Config` if a global subscriber is already set.
pub fn init_tracing(format: LogFormat) -> Result<(), AskflowError> {
    let result = match format {
        LogFormat::Text => fmt().with_env_filter(env_filter()).with_target(false).try_init(),
        LogFormat::Json => fmt().with_env_filter(env_filter()).json().with_current_span(false).try_init(),
    };
    result.map_err(|err| AskflowError::config(format!("failed to install tracing subscriber: {err}")))
}
