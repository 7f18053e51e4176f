//! Periodic probing of configured targets.
//!
//! Each target gets its own task firing at the target's interval. Requests go
//! through the client handed in, so an instrumented client reports every
//! probe in its metrics.

use crate::client::Client;
use crate::config::TargetConfig;
use crate::transport::{Body, TransportError};
use crate::util::ShutdownSignal;
use futures::future::join_all;
use http_body_util::BodyExt;
use hyper::{Request, StatusCode};
use std::time::{Duration, Instant};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Result of one successful probe.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub status: StatusCode,
    pub body_bytes: usize,
    pub elapsed: Duration,
}

/// Probe one target: send the request and drain the response body.
pub async fn probe(client: &Client, target: &TargetConfig) -> Result<ProbeOutcome, TransportError> {
    let req = Request::builder()
        .method(target.method.as_str())
        .uri(target.url.as_str())
        .body(Body::default())?;

    let start = Instant::now();
    let response = client.request(req).await?;
    let status = response.status();
    let body = response.into_body().collect().await?.to_bytes();

    Ok(ProbeOutcome {
        status,
        body_bytes: body.len(),
        elapsed: start.elapsed(),
    })
}

/// Probes every target on its own interval.
pub struct Prober {
    client: Client,
    targets: Vec<TargetConfig>,
}

impl Prober {
    pub fn new(client: Client, targets: Vec<TargetConfig>) -> Self {
        Self { client, targets }
    }

    /// Probe every target once, concurrently.
    pub async fn probe_once(&self) -> Vec<Result<ProbeOutcome, TransportError>> {
        let probes = self.targets.iter().map(|target| async move {
            let result = probe(&self.client, target).await;
            log_outcome(target, &result);
            result
        });
        join_all(probes).await
    }

    /// Probe until shutdown is signalled.
    pub async fn run(self, shutdown: &ShutdownSignal) {
        info!(targets = self.targets.len(), "prober starting");

        let Prober { client, targets } = self;
        let tasks = targets.into_iter().map(|target| {
            let client = client.clone();
            let mut shutdown = shutdown.subscribe();

            tokio::spawn(async move {
                let mut ticker = interval(target.interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

                loop {
                    tokio::select! {
                        _ = ticker.tick() => {}

                        _ = shutdown.recv() => {
                            debug!(target = %target.name, "probe task stopping");
                            break;
                        }
                    }

                    tokio::select! {
                        result = probe(&client, &target) => log_outcome(&target, &result),

                        _ = shutdown.recv() => {
                            debug!(target = %target.name, "probe abandoned on shutdown");
                            break;
                        }
                    }
                }
            })
        });

        for result in join_all(tasks).await {
            if let Err(e) = result {
                warn!(error = %e, "probe task failed");
            }
        }
        info!("prober stopped");
    }
}

fn log_outcome(target: &TargetConfig, result: &Result<ProbeOutcome, TransportError>) {
    match result {
        Ok(outcome) => info!(
            target = %target.name,
            url = %target.url,
            status = outcome.status.as_u16(),
            bytes = outcome.body_bytes,
            duration_ms = outcome.elapsed.as_millis() as u64,
            "probe completed"
        ),
        Err(e) => warn!(
            target = %target.name,
            url = %target.url,
            error = %e,
            "probe failed"
        ),
    }
}
