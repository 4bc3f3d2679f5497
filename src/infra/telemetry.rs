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
        .with_default_directive(logging.level.as_filter().into())
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
            "vetrina_classify_total",
            Unit::Count,
            "Total classification passes."
        );
        describe_counter!(
            "vetrina_classify_error_total",
            Unit::Count,
            "Classification passes that failed and were swallowed at the hook boundary."
        );
        describe_counter!(
            "vetrina_layout_cache_hit_total",
            Unit::Count,
            "Layout-registry cache hits."
        );
        describe_counter!(
            "vetrina_layout_cache_miss_total",
            Unit::Count,
            "Layout-registry cache misses."
        );
        describe_counter!(
            "vetrina_item_cache_hit_total",
            Unit::Count,
            "Classified-item cache hits."
        );
        describe_counter!(
            "vetrina_item_cache_miss_total",
            Unit::Count,
            "Classified-item cache misses."
        );
        describe_counter!(
            "vetrina_render_error_total",
            Unit::Count,
            "Layouts that failed to render within an otherwise successful pass."
        );
        describe_counter!(
            "vetrina_artifact_write_error_total",
            Unit::Count,
            "Asynchronous artifact writes that failed and were dropped."
        );
    });
}
