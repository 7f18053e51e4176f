//! Registry wrapper that rejects duplicate metric names.
//!
//! `prometheus_client::registry::Registry` accepts the same name any number of
//! times and encodes every copy. [`MetricRegistry`] tracks the registered
//! names and refuses a second registration instead.

use crate::metrics::lint::MetricDef;
use prometheus_client::encoding::text::encode;
use prometheus_client::registry::{Metric, Registry};
use std::collections::BTreeSet;
use thiserror::Error;

/// A metric with this name is already present in the registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("duplicate metrics collector registration attempted: '{name}' is already registered")]
pub struct DuplicateRegistrationError {
    pub name: String,
}

/// Metric registry with unique names.
#[derive(Debug, Default)]
pub struct MetricRegistry {
    registry: Registry,
    names: BTreeSet<String>,
}

impl MetricRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a single metric under `def.name`.
    ///
    /// On a name collision the registry is left unchanged.
    pub fn register<M: Metric>(
        &mut self,
        def: &MetricDef,
        metric: M,
    ) -> Result<(), DuplicateRegistrationError> {
        self.ensure_available(std::slice::from_ref(def))?;
        self.names.insert(def.name.to_string());
        self.registry.register(def.name, def.help, metric);
        Ok(())
    }

    /// Check that none of `defs` is registered yet.
    ///
    /// Lets callers register a batch all-or-nothing.
    pub fn ensure_available(&self, defs: &[MetricDef]) -> Result<(), DuplicateRegistrationError> {
        match defs.iter().find(|def| self.contains(def.name)) {
            Some(def) => Err(DuplicateRegistrationError {
                name: def.name.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Whether a metric with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Registered metric names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Encode every registered metric in the OpenMetrics text format.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }

    /// The underlying prometheus-client registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
