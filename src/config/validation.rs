//! Configuration validation.

use crate::config::Config;
use hyper::{Method, Uri};
use std::collections::HashSet;
use std::time::Duration;

/// Validate the configuration.
///
/// Checks for:
/// - At least one target, with unique non-empty names
/// - Absolute http/https target URLs and valid methods
/// - Non-zero intervals and timeouts
/// - Finite, strictly increasing histogram buckets
/// - A known log level
///
/// # Returns
///
/// `Ok(())` if valid, or every problem found, joined into one message.
pub fn validate_config(config: &Config) -> Result<(), String> {
    let mut errors = Vec::new();

    if config.targets.is_empty() {
        errors.push("at least one target must be defined".to_string());
    }

    let mut names = HashSet::new();
    for target in &config.targets {
        if target.name.is_empty() {
            errors.push("target name cannot be empty".to_string());
        }

        if !names.insert(&target.name) {
            errors.push(format!("duplicate target name: {}", target.name));
        }

        if let Err(reason) = check_url(&target.url) {
            errors.push(format!(
                "target '{}' has invalid url '{}': {}",
                target.name, target.url, reason
            ));
        }

        if Method::from_bytes(target.method.as_bytes()).is_err() {
            errors.push(format!(
                "target '{}' has invalid method '{}'",
                target.name, target.method
            ));
        }

        if target.interval.is_zero() {
            errors.push(format!("target '{}' has a zero interval", target.name));
        }
    }

    let client = &config.client;
    for (name, timeout) in [
        ("connect_timeout", client.connect_timeout),
        ("dns_timeout", client.dns_timeout),
        ("tls_handshake_timeout", client.tls_handshake_timeout),
    ] {
        if timeout == Duration::ZERO {
            errors.push(format!("client {name} must be greater than zero"));
        }
    }

    if let Some(ref buckets) = client.buckets {
        if let Err(reason) = check_buckets(buckets) {
            errors.push(format!("invalid client buckets: {reason}"));
        }
    }

    if !config.global.metrics.path.starts_with('/') {
        errors.push(format!(
            "metrics path '{}' must start with '/'",
            config.global.metrics.path
        ));
    }

    // Validate log level
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.global.log_level.to_lowercase().as_str()) {
        errors.push(format!(
            "invalid log level '{}', must be one of: {}",
            config.global.log_level,
            valid_levels.join(", ")
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}

fn check_url(url: &str) -> Result<(), &'static str> {
    let uri: Uri = url.parse().map_err(|_| "malformed")?;
    match uri.scheme_str() {
        Some("http") | Some("https") => {}
        Some(_) => return Err("scheme must be http or https"),
        None => return Err("url must be absolute"),
    }
    match uri.host() {
        Some(host) if !host.is_empty() => Ok(()),
        _ => Err("missing host"),
    }
}

fn check_buckets(buckets: &[f64]) -> Result<(), &'static str> {
    if buckets.is_empty() {
        return Err("at least one bucket is required");
    }
    if buckets.iter().any(|b| !b.is_finite()) {
        return Err("buckets must be finite");
    }
    if buckets.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err("buckets must be strictly increasing");
    }
    Ok(())
}
