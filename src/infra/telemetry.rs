use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::cache::{
    METRIC_CACHE_CREATED, METRIC_CACHE_START, METRIC_CACHE_STOP, METRIC_RUNNING_CACHES,
};
use crate::config::{LogFormat, LoggingSettings};
use crate::management::METRIC_GATEWAY_REJECTED;

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

/// Register descriptions for every metric the crate emits.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_CACHE_CREATED,
            Unit::Count,
            "Total number of distinct cache names started for the first time."
        );
        describe_counter!(
            METRIC_CACHE_START,
            Unit::Count,
            "Total number of cache starts, restarts included."
        );
        describe_counter!(
            METRIC_CACHE_STOP,
            Unit::Count,
            "Total number of cache stops."
        );
        describe_gauge!(
            METRIC_RUNNING_CACHES,
            Unit::Count,
            "Current number of running caches across managers."
        );
        describe_counter!(
            METRIC_GATEWAY_REJECTED,
            Unit::Count,
            "Total number of management calls refused by the exposure policy."
        );
    });
}
