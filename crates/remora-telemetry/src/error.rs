//! Error types for telemetry operations.

use prometheus::Error as PrometheusError;
use thiserror::Error;

/// Result alias for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Step of collector setup that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricStage {
    /// Constructing the collector from its options.
    Build,
    /// Adding the collector to the registry.
    Register,
}

/// Errors raised by telemetry helpers.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global tracing subscriber is already installed.
    #[error("tracing subscriber already installed")]
    SubscriberInstall {
        /// Underlying tracing subscriber error.
        #[source]
        source: tracing_subscriber::util::TryInitError,
    },
    /// A Prometheus collector could not be set up.
    #[error("metrics collector setup failed")]
    MetricSetup {
        /// Metric name tied to the failure.
        name: &'static str,
        /// Setup step that failed.
        stage: MetricStage,
        /// Underlying Prometheus error.
        #[source]
        source: PrometheusError,
    },
    /// The registry could not be rendered as text exposition.
    #[error("metrics render failed")]
    MetricsRender {
        /// Underlying Prometheus error.
        #[source]
        source: PrometheusError,
    },
    /// Rendered exposition was not valid UTF-8.
    #[error("metrics exposition was not utf-8")]
    MetricsUtf8 {
        /// Underlying UTF-8 conversion error.
        #[source]
        source: std::string::FromUtf8Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn setup_errors_keep_name_and_stage() {
        let err = TelemetryError::MetricSetup {
            name: "remora_polls_total",
            stage: MetricStage::Register,
            source: PrometheusError::AlreadyReg,
        };
        assert_eq!(err.to_string(), "metrics collector setup failed");
        assert!(err.source().is_some());
        assert!(matches!(
            err,
            TelemetryError::MetricSetup {
                stage: MetricStage::Register,
                ..
            }
        ));
    }

    #[test]
    fn utf8_failures_are_reported() -> anyhow::Result<()> {
        let source = String::from_utf8(vec![0, 159])
            .err()
            .ok_or_else(|| anyhow::anyhow!("expected utf8 error"))?;
        let err = TelemetryError::MetricsUtf8 { source };
        assert_eq!(err.to_string(), "metrics exposition was not utf-8");
        assert!(err.source().is_some());
        Ok(())
    }
}
