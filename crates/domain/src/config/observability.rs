use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Logging & tracing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Line format of `repeatq serve` logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Json,
    Compact,
}

/// `[observability]`: how the scheduler reports what it does.
///
/// Logs always go through `tracing`. Spans (one per job loop) are also
/// exported over OTLP/gRPC when `otlp_endpoint` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub log_format: LogFormat,

    /// `EnvFilter` directives used when `RUST_LOG` is not set.
    #[serde(default = "d_log_filter")]
    pub log_filter: String,

    /// OTLP collector, e.g. `http://localhost:4317`. Unset disables export.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,

    /// `service.name` reported to the collector.
    #[serde(default = "d_service_name")]
    pub service_name: String,

    /// Fraction of job-loop traces exported (`TraceIdRatioBased`).
    #[serde(default = "d_sample_rate")]
    pub sample_rate: f64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::default(),
            log_filter: d_log_filter(),
            otlp_endpoint: None,
            service_name: d_service_name(),
            sample_rate: d_sample_rate(),
        }
    }
}

impl ObservabilityConfig {
    /// The collector endpoint, if export is enabled. Blank counts as unset.
    pub fn otlp_target(&self) -> Option<&str> {
        self.otlp_endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }

    /// `sample_rate` clamped into `0.0..=1.0`; NaN disables sampling.
    pub fn sampling_ratio(&self) -> f64 {
        if self.sample_rate.is_nan() {
            0.0
        } else {
            self.sample_rate.clamp(0.0, 1.0)
        }
    }
}

fn d_log_filter() -> String {
    "info,rq_scheduler=debug,rq_trigger=debug".into()
}

fn d_service_name() -> String {
    "repeatq".into()
}

fn d_sample_rate() -> f64 {
    1.0
}
