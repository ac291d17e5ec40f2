pub mod metrics;
pub mod monitor;

pub use metrics::PipelineMetrics;
pub use monitor::{
    is_drifting, observed_rate, DiagnosticsMonitor, DiagnosticsSink, DiagnosticsSnapshot,
    MonitorConfig, TracingSink,
};
