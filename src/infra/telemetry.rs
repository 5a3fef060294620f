use std::sync::Once;

use metrics::{Unit, describe_counter};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

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
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
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

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "specchio_resolve_hit_total",
            Unit::Count,
            "URLs resolved from a cached mapping."
        );
        describe_counter!(
            "specchio_resolve_miss_total",
            Unit::Count,
            "URLs that required scheduling or exclusion."
        );
        describe_counter!(
            "specchio_sync_enqueued_total",
            Unit::Count,
            "Items queued for remote sync."
        );
        describe_counter!(
            "specchio_sync_dropped_total",
            Unit::Count,
            "Sync candidates dropped by the per-request cap."
        );
        describe_counter!(
            "specchio_meta_flush_total",
            Unit::Count,
            "End-of-request metadata flushes."
        );
    });
}
