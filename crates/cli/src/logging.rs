// Copyright 2025 Overhead Bench Contributors
// SPDX-License-Identifier: Apache-2.0

//! Subscriber setup.

use anyhow::Result;
use clap::ValueEnum;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human readable
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Install the global subscriber. `RUST_LOG` overrides the default `info`
/// filter. Logs go to stderr so stdout stays free for command output.
pub fn init(format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let init_result = match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .json()
                    .with_current_span(true)
                    .with_span_list(false),
            )
            .with(filter)
            .try_init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .with(filter)
            .try_init(),
    };

    if let Err(err) = init_result {
        if err.to_string().contains("global default trace dispatcher has already been set") {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}
