//! Status snapshot parsing and the one-step scaling rule.

use std::cmp::Ordering;

use serde_json::Value;
use thiserror::Error;

use crate::config::Config;

/// A status payload that cannot drive a decision.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    /// `cpu.highPriority` is missing, not a number, or outside [0, 1].
    #[error("invalid CPU utilization from API: {0}")]
    Utilization(String),

    /// `replicas` is missing, not an integer, or below 1.
    #[error("invalid replicas from API: {0}")]
    Replicas(String),
}

/// Utilization and replica count reported by one status call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusSnapshot {
    pub utilization: f64,
    pub replicas: u32,
}

impl StatusSnapshot {
    /// Extract `cpu.highPriority` and `replicas` from a status body.
    pub fn from_json(body: &Value) -> Result<Self, SnapshotError> {
        let utilization = body.pointer("/cpu/highPriority");
        let utilization = match utilization.and_then(Value::as_f64) {
            Some(u) if (0.0..=1.0).contains(&u) => u,
            _ => return Err(SnapshotError::Utilization(describe(utilization))),
        };

        let replicas = body.get("replicas");
        let replicas = match replicas
            .and_then(Value::as_u64)
            .and_then(|r| u32::try_from(r).ok())
        {
            Some(r) if r >= 1 => r,
            _ => return Err(SnapshotError::Replicas(describe(replicas))),
        };

        Ok(Self {
            utilization,
            replicas,
        })
    }
}

fn describe(value: Option<&Value>) -> String {
    value.map_or_else(|| "missing".to_string(), Value::to_string)
}

/// Outcome of applying the scaling rule to a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleDecision {
    /// Utilization is exactly at the threshold.
    NoChange,
    ScaleUp { from: u32, to: u32 },
    ScaleDown { from: u32, to: u32 },
}

impl ScaleDecision {
    /// Replica count to submit, if any.
    pub fn target(&self) -> Option<u32> {
        match *self {
            Self::NoChange => None,
            Self::ScaleUp { to, .. } | Self::ScaleDown { to, .. } => Some(to),
        }
    }
}

/// Threshold and step sizes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalingPolicy {
    pub cpu_threshold: f64,
    pub scale_up_step: u32,
    pub scale_down_step: u32,
}

impl ScalingPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            cpu_threshold: config.cpu_threshold,
            scale_up_step: config.scale_up_step,
            scale_down_step: config.scale_down_step,
        }
    }

    /// Apply the one-step rule. The result never drops below one replica.
    pub fn decide(&self, snapshot: &StatusSnapshot) -> ScaleDecision {
        let from = snapshot.replicas;
        match snapshot.utilization.partial_cmp(&self.cpu_threshold) {
            Some(Ordering::Greater) => ScaleDecision::ScaleUp {
                from,
                to: from.saturating_add(self.scale_up_step),
            },
            Some(Ordering::Less) => ScaleDecision::ScaleDown {
                from,
                to: from.saturating_sub(self.scale_down_step).max(1),
            },
            Some(Ordering::Equal) | None => ScaleDecision::NoChange,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    fn policy(threshold: f64, up: u32, down: u32) -> ScalingPolicy {
        ScalingPolicy {
            cpu_threshold: threshold,
            scale_up_step: up,
            scale_down_step: down,
        }
    }

    fn snapshot(utilization: f64, replicas: u32) -> StatusSnapshot {
        StatusSnapshot {
            utilization,
            replicas,
        }
    }

    #[rstest]
    #[case(0.8, 3, ScaleDecision::ScaleUp { from: 3, to: 4 })]
    #[case(0.2, 1, ScaleDecision::ScaleDown { from: 1, to: 1 })]
    #[case(0.2, 5, ScaleDecision::ScaleDown { from: 5, to: 4 })]
    #[case(0.5, 5, ScaleDecision::NoChange)]
    #[case(1.0, 1, ScaleDecision::ScaleUp { from: 1, to: 2 })]
    #[case(0.0, 2, ScaleDecision::ScaleDown { from: 2, to: 1 })]
    fn test_decide_unit_steps(
        #[case] utilization: f64,
        #[case] replicas: u32,
        #[case] expected: ScaleDecision,
    ) {
        assert_eq!(policy(0.5, 1, 1).decide(&snapshot(utilization, replicas)), expected);
    }

    #[test]
    fn test_decide_uses_configured_steps() {
        let policy = policy(0.6, 3, 2);
        assert_eq!(
            policy.decide(&snapshot(0.9, 4)),
            ScaleDecision::ScaleUp { from: 4, to: 7 }
        );
        assert_eq!(
            policy.decide(&snapshot(0.1, 4)),
            ScaleDecision::ScaleDown { from: 4, to: 2 }
        );
    }

    #[test]
    fn test_scale_down_floors_at_one_for_large_steps() {
        for replicas in 1..=20 {
            for step in 1..=25 {
                let decision = policy(0.7, 1, step).decide(&snapshot(0.1, replicas));
                let target = decision.target().unwrap();
                assert!(target >= 1, "replicas={replicas} step={step}");
                assert_eq!(target, replicas.saturating_sub(step).max(1));
            }
        }
    }

    #[test]
    fn test_scale_up_saturates() {
        let decision = policy(0.5, 10, 1).decide(&snapshot(0.9, u32::MAX - 1));
        assert_eq!(decision.target(), Some(u32::MAX));
    }

    #[test]
    fn test_threshold_of_one_never_scales_up() {
        let policy = policy(1.0, 1, 1);
        assert_eq!(policy.decide(&snapshot(1.0, 3)), ScaleDecision::NoChange);
        assert_eq!(policy.decide(&snapshot(0.99, 3)).target(), Some(2));
    }

    #[test]
    fn test_snapshot_from_valid_body() {
        let body = json!({"cpu": {"highPriority": 0.8}, "replicas": 3});
        assert_eq!(StatusSnapshot::from_json(&body).unwrap(), snapshot(0.8, 3));
    }

    #[test]
    fn test_snapshot_accepts_integer_utilization() {
        let body = json!({"cpu": {"highPriority": 1}, "replicas": 2});
        assert_eq!(StatusSnapshot::from_json(&body).unwrap(), snapshot(1.0, 2));
    }

    #[rstest]
    #[case(json!({}), "missing")]
    #[case(json!({"cpu": {}, "replicas": 2}), "missing")]
    #[case(json!({"cpu": {"highPriority": "0.5"}, "replicas": 2}), "\"0.5\"")]
    #[case(json!({"cpu": {"highPriority": 1.2}, "replicas": 2}), "1.2")]
    #[case(json!({"cpu": {"highPriority": -0.1}, "replicas": 2}), "-0.1")]
    #[case(json!([1, 2]), "missing")]
    fn test_snapshot_rejects_bad_utilization(#[case] body: Value, #[case] shown: &str) {
        assert_eq!(
            StatusSnapshot::from_json(&body).unwrap_err(),
            SnapshotError::Utilization(shown.to_string())
        );
    }

    #[rstest]
    #[case(json!({"cpu": {"highPriority": 0.5}}), "missing")]
    #[case(json!({"cpu": {"highPriority": 0.5}, "replicas": 0}), "0")]
    #[case(json!({"cpu": {"highPriority": 0.5}, "replicas": -2}), "-2")]
    #[case(json!({"cpu": {"highPriority": 0.5}, "replicas": 2.5}), "2.5")]
    #[case(json!({"cpu": {"highPriority": 0.5}, "replicas": true}), "true")]
    #[case(json!({"cpu": {"highPriority": 0.5}, "replicas": null}), "null")]
    fn test_snapshot_rejects_bad_replicas(#[case] body: Value, #[case] shown: &str) {
        assert_eq!(
            StatusSnapshot::from_json(&body).unwrap_err(),
            SnapshotError::Replicas(shown.to_string())
        );
    }
}
