//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Shared primitives and utilities for the core runtime."
//! ems_version: "v0.1.0"
//! ems_owner: "tbd"
//! ---
//! Tracing setup for the daemon and the control CLI.
//!
//! Both resolve their filter the same way: `RELAY_EMS_LOG`, then `RUST_LOG`,
//! then a per-binary default.

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "RELAY_EMS_LOG";
const RUST_LOG_ENV: &str = "RUST_LOG";

/// Connection pool chatter from the HTTP stack drowns out per-device events.
const DAEMON_DEFAULT: &str = "info,hyper=warn,hyper_util=warn,reqwest=warn";
const CLI_DEFAULT: &str = "warn";
const CLI_VERBOSE: &str = "debug,hyper=info,hyper_util=info";

static WRITER_GUARDS: OnceCell<Vec<WorkerGuard>> = OnceCell::new();

/// Stdout format of the daemon. The rolling file is always JSON.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    StructuredJson,
    Pretty,
}

/// First non-blank directive among the custom variable, `RUST_LOG` and `default`.
fn resolve_directive(custom: Option<&str>, rust_log: Option<&str>, default: &str) -> String {
    [custom, rust_log]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|directive| !directive.is_empty())
        .unwrap_or(default)
        .to_owned()
}

fn env_filter(default: &str) -> EnvFilter {
    let custom = std::env::var(LOG_ENV).ok();
    let rust_log = std::env::var(RUST_LOG_ENV).ok();
    let directive = resolve_directive(custom.as_deref(), rust_log.as_deref(), default);
    EnvFilter::try_new(&directive).unwrap_or_else(|err| {
        eprintln!(
            "ignoring invalid log directive '{}' ({}); using '{}'",
            directive, err, default
        );
        EnvFilter::new(default)
    })
}

/// Rolling file name for `service_name`, honouring a configured prefix.
fn log_file_name(service_name: &str, config: &LoggingConfig) -> String {
    format!(
        "{}.log",
        config.file_prefix.as_deref().unwrap_or(service_name)
    )
}

/// Install the daemon subscriber: stdout in the configured format plus a
/// daily JSON file under `config.directory`.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    std::fs::create_dir_all(&config.directory).with_context(|| {
        format!(
            "unable to create log directory {}",
            config.directory.display()
        )
    })?;

    let (file_writer, file_guard) = tracing_appender::non_blocking(daily(
        &config.directory,
        log_file_name(service_name, config),
    ));
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let _ = WRITER_GUARDS.set(vec![file_guard, stdout_guard]);

    let stdout_layer = match config.format {
        LogFormat::StructuredJson => fmt::layer()
            .with_target(false)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .json()
            .with_writer(stdout_writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(stdout_writer)
            .boxed(),
    };
    let file_layer = fmt::layer()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .json()
        .with_writer(file_writer)
        .boxed();

    tracing_subscriber::registry()
        .with(env_filter(DAEMON_DEFAULT))
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .ok();

    info!(
        service = %service_name,
        log_dir = %config.directory.display(),
        format = ?config.format,
        "tracing initialised"
    );
    Ok(())
}

/// Stderr subscriber for the control CLI, keeping stdout for command output.
pub fn init_cli(verbose: bool) {
    let default = if verbose { CLI_VERBOSE } else { CLI_DEFAULT };
    let _ = tracing_subscriber::registry()
        .with(env_filter(default))
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init();
}
