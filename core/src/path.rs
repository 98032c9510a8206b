use crate::record::PathRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Placeholder identifier for a hop that never answered.
pub const WILDCARD: &str = "*";

/// One hop after identity resolution: either the first responding host's
/// IP or the wildcard placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedHop {
    pub identifier: String,
    pub hostname: Option<String>,
    pub latency_ms: Option<f64>,
    pub loss_pct: f64,
}

impl ResolvedHop {
    pub fn responded(&self) -> bool {
        self.identifier != WILDCARD
    }
}

/// A PathRecord reduced to its ordered hop identifiers plus the metadata
/// the graph builder and signature index need.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedPath {
    pub record_id: Uuid,
    pub agent: String,
    pub target: String,
    pub timestamp: DateTime<Utc>,
    pub flagged: bool,
    pub hops: Vec<ResolvedHop>,
    /// First responding IP, for display as the effective source endpoint.
    pub source_ip: Option<String>,
    /// Last responding IP, for display as the effective destination endpoint.
    pub destination_ip: Option<String>,
}

impl ResolvedPath {
    /// Ordered hop identifiers, wildcards included.
    pub fn identifiers(&self) -> Vec<String> {
        self.hops.iter().map(|hop| hop.identifier.clone()).collect()
    }

    /// Latency reported by the final responding hop, which stands in for
    /// the end-to-end latency of the probe.
    pub fn final_latency_ms(&self) -> Option<f64> {
        self.hops
            .iter()
            .rev()
            .find(|hop| hop.responded())
            .and_then(|hop| hop.latency_ms)
    }

    /// Worst packet loss reported by any hop of the probe.
    pub fn max_loss_pct(&self) -> f64 {
        self.hops.iter().map(|hop| hop.loss_pct).fold(0.0, f64::max)
    }
}

/// Resolve one raw record into an ordered identifier sequence.
///
/// Returns `None` when the record carries no hop list at all; such records
/// are dropped silently upstream rather than treated as errors.
pub fn resolve(record: &PathRecord) -> Option<ResolvedPath> {
    if record.hops.is_empty() {
        return None;
    }

    let hops: Vec<ResolvedHop> = record
        .hops
        .iter()
        .map(|hop| match hop.first_host() {
            Some(host) => ResolvedHop {
                identifier: host.ip.clone(),
                hostname: host.hostname.clone(),
                latency_ms: hop.latency_ms,
                loss_pct: hop.loss_pct,
            },
            None => ResolvedHop {
                identifier: WILDCARD.to_string(),
                hostname: None,
                latency_ms: None,
                loss_pct: hop.loss_pct,
            },
        })
        .collect();

    let source_ip = hops
        .iter()
        .find(|hop| hop.responded())
        .map(|hop| hop.identifier.clone());
    let destination_ip = hops
        .iter()
        .rev()
        .find(|hop| hop.responded())
        .map(|hop| hop.identifier.clone());

    Some(ResolvedPath {
        record_id: record.id,
        agent: record.agent.clone(),
        target: record.target.clone(),
        timestamp: record.timestamp,
        flagged: record.flagged,
        hops,
        source_ip,
        destination_ip,
    })
}
