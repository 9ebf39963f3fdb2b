use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing::Subscriber;
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};
use crate::error::TelemetryError;
use crate::instrument::{METRIC_RENDER_EVENTS, METRIC_RENDER_STAGE_MS};

/// Environment variable holding per-target filter directives.
pub const LOG_FILTER_ENV: &str = "ISORENDER_LOG";

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install the global tracing subscriber for render logs.
///
/// Directives in `ISORENDER_LOG` refine the configured level. Only the first
/// call in a process succeeds.
pub fn init(logging: &LoggingSettings) -> Result<(), TelemetryError> {
    describe_metrics();

    let filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .with_env_var(LOG_FILTER_ENV)
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(ErrorLayer::default())
        .with(render_log_layer(logging.format))
        .try_init()
        .map_err(|err| TelemetryError::Subscriber(err.to_string()))
}

fn render_log_layer<S>(format: LogFormat) -> Box<dyn Layer<S> + Send + Sync + 'static>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    match format {
        // Span fields carry `component` and `mode` for every event.
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(false).boxed(),
    }
}

/// Register descriptions for the series emitted by `MetricsInstrumentation`.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_RENDER_EVENTS,
            Unit::Count,
            "Render lifecycle events by `event` label (count, cacheHit, abort, cacheAbort, err, error, cacheUpdate, cacheUpdateError)."
        );
        describe_histogram!(
            METRIC_RENDER_STAGE_MS,
            Unit::Milliseconds,
            "Time spent reaching each render pipeline mark, by `mark` label."
        );
    });
}

#[cfg(test)]
mod tests {
    use tracing::level_filters::LevelFilter;

    use super::*;

    #[test]
    fn subscriber_installs_once_per_process() {
        let logging = LoggingSettings {
            level: LevelFilter::DEBUG,
            format: LogFormat::Json,
        };

        init(&logging).expect("first install succeeds");
        tracing::debug!(component = "plain", "subscriber installed");

        let second = init(&LoggingSettings {
            level: LevelFilter::INFO,
            format: LogFormat::Compact,
        });
        assert!(matches!(second, Err(TelemetryError::Subscriber(_))));
    }
}
