use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single host that answered at one traceroute hop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HopHost {
    pub ip: String,
    #[serde(default)]
    pub hostname: Option<String>,
}

/// One traceroute step. An empty `hosts` list means the hop timed out,
/// which is a valid and common result, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hop {
    #[serde(default)]
    pub hosts: Vec<HopHost>,
    #[serde(default)]
    pub loss_pct: f64,
    #[serde(default)]
    pub latency_ms: Option<f64>,
    #[serde(default)]
    pub jitter_ms: Option<f64>,
}

impl Hop {
    pub fn responded(&self) -> bool {
        !self.hosts.is_empty()
    }

    /// First responding host, if any. ECMP fan-out is not modeled; when
    /// several hosts answered at the same depth only the first one counts.
    pub fn first_host(&self) -> Option<&HopHost> {
        self.hosts.first()
    }
}

/// One full probe result: a traceroute from a source agent to a target
/// at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathRecord {
    pub id: Uuid,
    pub agent: String,
    pub target: String,
    pub timestamp: DateTime<Utc>,
    /// Set when an alert rule (or other external consumer) marked this
    /// trace as notable.
    #[serde(default)]
    pub flagged: bool,
    #[serde(default)]
    pub hops: Vec<Hop>,
}

impl PathRecord {
    pub fn new(agent: impl Into<String>, target: impl Into<String>, hops: Vec<Hop>) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent: agent.into(),
            target: target.into(),
            timestamp: Utc::now(),
            flagged: false,
            hops,
        }
    }
}
