//! Metric definitions and a structural lint over them.
//!
//! Every metric the client exports is described by a [`MetricDef`] constant.
//! The same definitions drive registration, so a definition that passes
//! [`lint`] is exactly what ends up in the registry.

use std::collections::HashSet;
use thiserror::Error;

/// Kind of aggregate a metric records.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

/// Static description of one metric.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MetricDef {
    /// Registered name. Counters omit `_total`, the encoder appends it.
    pub name: &'static str,
    /// Help text, without trailing period (the encoder adds one).
    pub help: &'static str,
    pub kind: MetricKind,
    /// Label names, in encoding order.
    pub labels: &'static [&'static str],
}

pub const REQUESTS: MetricDef = MetricDef {
    name: "client_requests",
    help: "A counter for requests from the wrapped client",
    kind: MetricKind::Counter,
    labels: &["code", "method"],
};

pub const IN_FLIGHT_REQUESTS: MetricDef = MetricDef {
    name: "client_in_flight_requests",
    help: "A gauge of in-flight requests for the wrapped client",
    kind: MetricKind::Gauge,
    labels: &[],
};

pub const REQUEST_DURATION: MetricDef = MetricDef {
    name: "client_request_duration_seconds",
    help: "A histogram of request latencies",
    kind: MetricKind::Histogram,
    labels: &[],
};

pub const DNS_DURATION: MetricDef = MetricDef {
    name: "dns_duration_seconds",
    help: "Trace dns latency histogram",
    kind: MetricKind::Histogram,
    labels: &["event"],
};

pub const TLS_DURATION: MetricDef = MetricDef {
    name: "tls_duration_seconds",
    help: "Trace tls latency histogram",
    kind: MetricKind::Histogram,
    labels: &["event"],
};

/// All metrics registered by [`ClientMetrics`](crate::metrics::ClientMetrics).
pub const CLIENT_METRICS: &[MetricDef] = &[
    REQUESTS,
    IN_FLIGHT_REQUESTS,
    REQUEST_DURATION,
    DNS_DURATION,
    TLS_DURATION,
];

/// A structural problem with a metric definition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LintError {
    #[error("metric name '{0}' is not a valid Prometheus metric name")]
    InvalidName(String),

    #[error("metric name '{0}' is defined more than once")]
    DuplicateName(String),

    #[error("metric '{0}' has no help text")]
    MissingHelp(String),

    #[error("help text of metric '{0}' ends with a period")]
    HelpTrailingPeriod(String),

    #[error("counter '{0}' must not end with '_total'")]
    CounterTotalSuffix(String),

    #[error("histogram '{0}' must end with a base unit suffix")]
    MissingUnit(String),

    #[error("metric '{metric}' has invalid label name '{label}'")]
    InvalidLabel { metric: String, label: String },

    #[error("metric '{metric}' declares label '{label}' more than once")]
    DuplicateLabel { metric: String, label: String },

    #[error("histogram '{0}' declares the reserved 'le' label")]
    ReservedLabel(String),
}

const UNIT_SUFFIXES: &[&str] = &["_seconds", "_bytes"];

/// Check a set of metric definitions, collecting every problem found.
pub fn lint(defs: &[MetricDef]) -> Result<(), Vec<LintError>> {
    let mut errors = Vec::new();
    let mut names = HashSet::new();

    for def in defs {
        let name = def.name.to_string();

        if !is_valid_metric_name(def.name) {
            errors.push(LintError::InvalidName(name.clone()));
        }
        if !names.insert(def.name) {
            errors.push(LintError::DuplicateName(name.clone()));
        }

        let help = def.help.trim();
        if help.is_empty() {
            errors.push(LintError::MissingHelp(name.clone()));
        } else if help.ends_with('.') {
            errors.push(LintError::HelpTrailingPeriod(name.clone()));
        }

        match def.kind {
            MetricKind::Counter if def.name.ends_with("_total") => {
                errors.push(LintError::CounterTotalSuffix(name.clone()));
            }
            MetricKind::Histogram => {
                if !UNIT_SUFFIXES.iter().any(|unit| def.name.ends_with(unit)) {
                    errors.push(LintError::MissingUnit(name.clone()));
                }
                if def.labels.contains(&"le") {
                    errors.push(LintError::ReservedLabel(name.clone()));
                }
            }
            _ => {}
        }

        let mut labels = HashSet::new();
        for label in def.labels {
            if !is_valid_label_name(label) {
                errors.push(LintError::InvalidLabel {
                    metric: name.clone(),
                    label: label.to_string(),
                });
            }
            if !labels.insert(*label) {
                errors.push(LintError::DuplicateLabel {
                    metric: name.clone(),
                    label: label.to_string(),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// `[a-zA-Z_:][a-zA-Z0-9_:]*`
fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

/// `[a-zA-Z_][a-zA-Z0-9_]*`, excluding the reserved `__` prefix.
fn is_valid_label_name(label: &str) -> bool {
    if label.starts_with("__") {
        return false;
    }
    let mut chars = label.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
