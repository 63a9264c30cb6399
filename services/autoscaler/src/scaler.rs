//! The scaling loop.
//!
//! Each cycle fetches the target's status, validates it, applies the one-step
//! rule and submits the new replica count when it changed. Nothing carries
//! over between cycles except the count of consecutive invalid payloads.

use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::client::TaskClient;
use crate::config::Config;
use crate::scaling::{ScaleDecision, ScalingPolicy, SnapshotError, StatusSnapshot};
use crate::task::ScalingTasks;

/// What a single cycle did.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The status call failed; no decision was made.
    StatusUnavailable,

    /// The status payload lacked a usable utilization or replica count.
    InvalidStatus(SnapshotError),

    /// Utilization was exactly at the threshold.
    Unchanged(StatusSnapshot),

    /// An update was submitted. `applied` is false if the update call failed.
    Scaled {
        decision: ScaleDecision,
        applied: bool,
    },
}

/// Counts consecutive invalid status payloads.
#[derive(Debug, Clone)]
pub struct InvalidStatusTracker {
    limit: u32,
    streak: u32,
}

impl InvalidStatusTracker {
    /// A `limit` of zero never alerts.
    pub fn new(limit: u32) -> Self {
        Self { limit, streak: 0 }
    }

    /// Record a cycle outcome. Returns true exactly once per streak, when the
    /// streak reaches the limit.
    pub fn observe(&mut self, outcome: &CycleOutcome) -> bool {
        match outcome {
            CycleOutcome::InvalidStatus(_) => {
                self.streak = self.streak.saturating_add(1);
                self.limit > 0 && self.streak == self.limit
            }
            // A failed call says nothing about the payload contract.
            CycleOutcome::StatusUnavailable => false,
            CycleOutcome::Unchanged(_) | CycleOutcome::Scaled { .. } => {
                self.streak = 0;
                false
            }
        }
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }
}

/// Polls the target and adjusts its replica count.
pub struct Autoscaler {
    client: TaskClient,
    tasks: ScalingTasks,
    policy: ScalingPolicy,
    poll_interval: Duration,
    alert_after_invalid_cycles: u32,
}

impl Autoscaler {
    /// Build the loop from a validated config.
    pub fn new(config: &Config) -> Result<Self> {
        let tasks = ScalingTasks::resolve(config)?;
        let client = TaskClient::new(&config.base_url).context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            tasks,
            policy: ScalingPolicy::from_config(config),
            poll_interval: config.poll_interval(),
            alert_after_invalid_cycles: config.alert_after_invalid_cycles,
        })
    }

    /// Run cycles until shutdown is signaled. Shutdown is observed while
    /// sleeping between cycles.
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            poll_interval_secs = self.poll_interval.as_secs_f64(),
            cpu_threshold = self.policy.cpu_threshold,
            scale_up_step = self.policy.scale_up_step,
            scale_down_step = self.policy.scale_down_step,
            "Starting autoscaler loop"
        );

        let mut tracker = InvalidStatusTracker::new(self.alert_after_invalid_cycles);

        loop {
            if *shutdown.borrow() {
                break;
            }

            let outcome = self.run_cycle().await;
            if tracker.observe(&outcome) {
                error!(
                    consecutive_invalid_cycles = tracker.streak(),
                    "Status payload has been invalid for consecutive cycles; the service contract may have changed"
                );
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Autoscaler loop shutting down");
    }

    /// Run one poll cycle: fetch, validate, decide, update.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let Some(body) = self.client.execute(&self.tasks.status, None).await.into_body() else {
            warn!("Status unavailable, skipping scaling decision");
            return CycleOutcome::StatusUnavailable;
        };

        let snapshot = match StatusSnapshot::from_json(&body) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Skipping scaling decision");
                return CycleOutcome::InvalidStatus(e);
            }
        };
        debug!(
            utilization = snapshot.utilization,
            replicas = snapshot.replicas,
            "Status snapshot"
        );

        let decision = self.policy.decide(&snapshot);
        let target = match decision {
            ScaleDecision::NoChange => {
                info!(
                    utilization = snapshot.utilization,
                    replicas = snapshot.replicas,
                    "CPU is at target threshold, no scaling action taken"
                );
                return CycleOutcome::Unchanged(snapshot);
            }
            ScaleDecision::ScaleUp { from, to } => {
                info!(
                    utilization = snapshot.utilization,
                    cpu_threshold = self.policy.cpu_threshold,
                    from,
                    to,
                    "Scaling up"
                );
                to
            }
            ScaleDecision::ScaleDown { from, to } => {
                info!(
                    utilization = snapshot.utilization,
                    cpu_threshold = self.policy.cpu_threshold,
                    from,
                    to,
                    "Scaling down"
                );
                to
            }
        };

        let payload = json!({ "replicas": target });
        let applied = !self
            .client
            .execute(&self.tasks.update, Some(&payload))
            .await
            .is_failure();
        if !applied {
            warn!(replicas = target, "Replica update not applied; next cycle will re-evaluate");
        }

        CycleOutcome::Scaled { decision, applied }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invalid() -> CycleOutcome {
        CycleOutcome::InvalidStatus(SnapshotError::Replicas("missing".to_string()))
    }

    fn valid() -> CycleOutcome {
        CycleOutcome::Unchanged(StatusSnapshot {
            utilization: 0.5,
            replicas: 2,
        })
    }

    #[test]
    fn test_tracker_alerts_once_at_limit() {
        let mut tracker = InvalidStatusTracker::new(3);
        assert!(!tracker.observe(&invalid()));
        assert!(!tracker.observe(&invalid()));
        assert!(tracker.observe(&invalid()));
        assert!(!tracker.observe(&invalid()));
        assert_eq!(tracker.streak(), 4);
    }

    #[test]
    fn test_tracker_resets_on_valid_snapshot() {
        let mut tracker = InvalidStatusTracker::new(2);
        assert!(!tracker.observe(&invalid()));
        assert!(!tracker.observe(&valid()));
        assert_eq!(tracker.streak(), 0);
        assert!(!tracker.observe(&invalid()));
        assert!(tracker.observe(&invalid()));
    }

    #[test]
    fn test_tracker_ignores_unavailable_status() {
        let mut tracker = InvalidStatusTracker::new(2);
        assert!(!tracker.observe(&invalid()));
        assert!(!tracker.observe(&CycleOutcome::StatusUnavailable));
        assert_eq!(tracker.streak(), 1);
        assert!(tracker.observe(&invalid()));
    }

    #[test]
    fn test_tracker_disabled_with_zero_limit() {
        let mut tracker = InvalidStatusTracker::new(0);
        for _ in 0..10 {
            assert!(!tracker.observe(&invalid()));
        }
    }
}
