//! Client metrics, their registry and exposition.

mod collector;
pub mod lint;
mod registry;
mod server;

pub use collector::{
    BucketLayout, ClientMetrics, InFlightGuard, Phase, PhaseEvent, PhaseLabels, RequestLabels,
    RequestTimer, DEFAULT_BUCKETS, FAILURE_CODE,
};
pub use lint::{lint, LintError, MetricDef, MetricKind, CLIENT_METRICS};
pub use registry::{DuplicateRegistrationError, MetricRegistry};
pub use server::MetricsServer;
