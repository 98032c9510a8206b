use serde::{Deserialize, Serialize};

/// Status category shared by the graph, summary, and detail views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Critical,
    Unknown,
}

/// Cutoffs used by [`classify`]. One canonical table is shared by every
/// consuming view; the values live in config so they can be tuned without
/// touching code.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HealthThresholds {
    #[serde(default = "default_healthy_loss_pct")]
    pub healthy_loss_pct: f64,

    #[serde(default = "default_healthy_latency_ms")]
    pub healthy_latency_ms: f64,

    #[serde(default = "default_critical_loss_pct")]
    pub critical_loss_pct: f64,

    #[serde(default = "default_critical_latency_ms")]
    pub critical_latency_ms: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            healthy_loss_pct: default_healthy_loss_pct(),
            healthy_latency_ms: default_healthy_latency_ms(),
            critical_loss_pct: default_critical_loss_pct(),
            critical_latency_ms: default_critical_latency_ms(),
        }
    }
}

fn default_healthy_loss_pct() -> f64 {
    5.0
}

fn default_healthy_latency_ms() -> f64 {
    100.0
}

fn default_critical_loss_pct() -> f64 {
    25.0
}

fn default_critical_latency_ms() -> f64 {
    200.0
}

/// Map an aggregate latency/loss pair onto a status category.
///
/// Pure function: `Unknown` when no data exists at all, `Critical` when
/// either dimension crosses its critical cutoff, `Healthy` when both stay
/// under the healthy cutoffs, `Degraded` otherwise. A missing dimension is
/// treated as passing for that dimension.
pub fn classify(
    avg_latency_ms: Option<f64>,
    loss_pct: Option<f64>,
    thresholds: &HealthThresholds,
) -> HealthStatus {
    if avg_latency_ms.is_none() && loss_pct.is_none() {
        return HealthStatus::Unknown;
    }

    let latency = avg_latency_ms.unwrap_or(0.0);
    let loss = loss_pct.unwrap_or(0.0);

    if loss >= thresholds.critical_loss_pct || latency >= thresholds.critical_latency_ms {
        HealthStatus::Critical
    } else if loss < thresholds.healthy_loss_pct && latency < thresholds.healthy_latency_ms {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_unknown_without_data() {
        let thresholds = HealthThresholds::default();
        assert_eq!(classify(None, None, &thresholds), HealthStatus::Unknown);
    }

    #[test]
    fn test_classify_healthy() {
        let thresholds = HealthThresholds::default();
        assert_eq!(
            classify(Some(12.0), Some(0.0), &thresholds),
            HealthStatus::Healthy
        );
        assert_eq!(classify(Some(99.9), None, &thresholds), HealthStatus::Healthy);
    }

    #[test]
    fn test_classify_degraded_between_cutoffs() {
        let thresholds = HealthThresholds::default();
        assert_eq!(
            classify(Some(150.0), Some(1.0), &thresholds),
            HealthStatus::Degraded
        );
        assert_eq!(
            classify(Some(20.0), Some(10.0), &thresholds),
            HealthStatus::Degraded
        );
    }

    #[test]
    fn test_classify_critical_on_either_dimension() {
        let thresholds = HealthThresholds::default();
        assert_eq!(
            classify(Some(250.0), Some(0.0), &thresholds),
            HealthStatus::Critical
        );
        assert_eq!(
            classify(Some(10.0), Some(30.0), &thresholds),
            HealthStatus::Critical
        );
    }

    #[test]
    fn test_classify_boundary_values() {
        let thresholds = HealthThresholds::default();
        // Exactly at the critical cutoff counts as critical.
        assert_eq!(
            classify(Some(200.0), Some(0.0), &thresholds),
            HealthStatus::Critical
        );
        // Exactly at the healthy cutoff is no longer healthy.
        assert_eq!(
            classify(Some(100.0), Some(0.0), &thresholds),
            HealthStatus::Degraded
        );
        assert_eq!(
            classify(Some(10.0), Some(5.0), &thresholds),
            HealthStatus::Degraded
        );
    }
}
