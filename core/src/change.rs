use crate::path::ResolvedPath;
use crate::signature::signature_of;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Classification of one hop position in a route diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HopChange {
    Unchanged,
    Added,
    Removed,
    Changed,
}

/// One classified hop position. `index` refers to the position in the
/// previous list for `Removed` and in the current list for `Added`;
/// `Unchanged` and `Changed` positions exist in both.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HopDelta {
    pub index: usize,
    pub identifier: String,
    pub change: HopChange,
}

/// A detected transition between two route signatures.
#[derive(Debug, Clone, Serialize)]
pub struct RouteChange {
    pub record_id: Uuid,
    /// Timestamp of the first occurrence of the new signature.
    pub changed_at: DateTime<Utc>,
    pub previous_signature: String,
    pub current_signature: String,
    pub previous_hops: Vec<String>,
    pub current_hops: Vec<String>,
    pub deltas: Vec<HopDelta>,
}

/// Change annotations for one time-ascending stream of paths.
#[derive(Debug, Clone, Serialize)]
pub struct StreamChanges {
    pub agent: String,
    pub record_count: usize,
    pub change_count: usize,
    pub changes: Vec<RouteChange>,
}

/// Positional diff between two hop identifier lists.
///
/// Index equality wins first; otherwise membership anywhere in the other
/// list decides between removed/added and changed. This is deliberately
/// not a sequence alignment: a single inserted hop shifts everything after
/// it and every shifted position reports as changed.
pub fn diff_hops(previous: &[String], current: &[String]) -> Vec<HopDelta> {
    let mut deltas = Vec::new();
    let len = previous.len().max(current.len());

    for i in 0..len {
        let prev = previous.get(i);
        let cur = current.get(i);

        if let (Some(prev), Some(cur)) = (prev, cur) {
            if prev == cur {
                deltas.push(HopDelta {
                    index: i,
                    identifier: cur.clone(),
                    change: HopChange::Unchanged,
                });
                continue;
            }
        }

        if let Some(prev) = prev {
            deltas.push(HopDelta {
                index: i,
                identifier: prev.clone(),
                change: if current.contains(prev) {
                    HopChange::Changed
                } else {
                    HopChange::Removed
                },
            });
        }

        if let Some(cur) = cur {
            deltas.push(HopDelta {
                index: i,
                identifier: cur.clone(),
                change: if previous.contains(cur) {
                    HopChange::Changed
                } else {
                    HopChange::Added
                },
            });
        }
    }

    deltas
}

/// Walks a time-ordered path stream and flags signature transitions.
///
/// One "last signature seen" register per stream; the very first record is
/// never a change because there is nothing to compare it against.
#[derive(Debug, Default)]
pub struct ChangeDetector {
    last: Option<(String, Vec<String>)>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process one record; returns the change when its signature differs
    /// from the previous record's. The register is updated afterwards
    /// either way.
    pub fn observe(&mut self, path: &ResolvedPath) -> Option<RouteChange> {
        let signature = signature_of(path);
        let hops = path.identifiers();

        let change = match &self.last {
            Some((last_signature, last_hops)) if *last_signature != signature => {
                Some(RouteChange {
                    record_id: path.record_id,
                    changed_at: path.timestamp,
                    previous_signature: last_signature.clone(),
                    current_signature: signature.clone(),
                    previous_hops: last_hops.clone(),
                    current_hops: hops.clone(),
                    deltas: diff_hops(last_hops, &hops),
                })
            }
            _ => None,
        };

        self.last = Some((signature, hops));
        change
    }

    /// Annotate a whole stream at once. The caller provides the records in
    /// ascending time order, scoped to one agent (optionally filtered to
    /// one destination).
    pub fn annotate(agent: &str, paths: &[ResolvedPath]) -> StreamChanges {
        let mut detector = Self::new();
        let mut changes = Vec::new();

        for path in paths {
            if let Some(change) = detector.observe(path) {
                changes.push(change);
            }
        }

        StreamChanges {
            agent: agent.to_string(),
            record_count: paths.len(),
            change_count: changes.len(),
            changes,
        }
    }
}
