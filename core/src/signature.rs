use crate::path::ResolvedPath;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

/// Separator between hop identifiers in a route signature.
pub const SIGNATURE_SEPARATOR: &str = "->";

/// Canonical string form of a path's hop sequence. Wildcard positions are
/// kept literally: two paths with the same responding IPs but timeouts at
/// different depths are different routes.
pub fn signature_of(path: &ResolvedPath) -> String {
    path.identifiers().join(SIGNATURE_SEPARATOR)
}

/// All traces sharing one route signature, with running statistics.
#[derive(Debug, Clone, Serialize)]
pub struct RouteGroup {
    pub signature: String,
    pub hops: Vec<String>,
    pub trace_count: u64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Running average of the final responding hop's latency.
    pub avg_latency_ms: Option<f64>,
    latency_samples: u64,
    pub max_loss_pct: f64,
    /// Any member trace was externally flagged as notable.
    pub flagged: bool,
    /// This group began with a route change relative to the group
    /// immediately preceding it in time.
    pub route_changed: bool,
    pub record_ids: Vec<Uuid>,
}

impl RouteGroup {
    fn from_path(path: &ResolvedPath, route_changed: bool) -> Self {
        let mut group = Self {
            signature: signature_of(path),
            hops: path.identifiers(),
            trace_count: 0,
            first_seen: path.timestamp,
            last_seen: path.timestamp,
            avg_latency_ms: None,
            latency_samples: 0,
            max_loss_pct: 0.0,
            flagged: false,
            route_changed,
            record_ids: Vec::new(),
        };
        group.fold(path);
        group
    }

    fn fold(&mut self, path: &ResolvedPath) {
        self.trace_count += 1;
        self.first_seen = self.first_seen.min(path.timestamp);
        self.last_seen = self.last_seen.max(path.timestamp);
        self.max_loss_pct = self.max_loss_pct.max(path.max_loss_pct());
        self.flagged |= path.flagged;
        self.record_ids.push(path.record_id);

        if let Some(latency) = path.final_latency_ms() {
            let n = self.latency_samples as f64;
            let old = self.avg_latency_ms.unwrap_or(0.0);
            self.latency_samples += 1;
            self.avg_latency_ms = Some((old * n + latency) / self.latency_samples as f64);
        }
    }

    /// A group has an issue when a member trace was flagged or its worst
    /// loss crossed the given threshold.
    pub fn has_issue(&self, issue_loss_pct: f64) -> bool {
        self.flagged || self.max_loss_pct > issue_loss_pct
    }
}

/// Secondary tie-break flavor. The summary list prefers recency, the
/// detail panel prefers trace volume; both keep the same primary tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankOrder {
    Summary,
    Detail,
}

/// Group a time-ordered stream of paths by exact signature equality.
///
/// The caller scopes the stream (one source/destination pair, or more
/// loosely one agent); no fuzzy matching is applied across signatures.
pub fn group_routes(paths: &[ResolvedPath]) -> Vec<RouteGroup> {
    let mut groups: Vec<RouteGroup> = Vec::new();
    let mut index_of: HashMap<String, usize> = HashMap::new();
    let mut last_signature: Option<String> = None;

    for path in paths {
        let signature = signature_of(path);

        match index_of.get(&signature) {
            Some(&i) => groups[i].fold(path),
            None => {
                let changed = last_signature
                    .as_ref()
                    .is_some_and(|last| *last != signature);
                index_of.insert(signature.clone(), groups.len());
                groups.push(RouteGroup::from_path(path, changed));
            }
        }

        last_signature = Some(signature);
    }

    groups
}

/// Rank groups for display.
///
/// Fixed four-tier priority: change-with-issue, issue, change, then the
/// rest by descending trace count. Within a tier, [`RankOrder::Summary`]
/// breaks ties by recency and [`RankOrder::Detail`] by trace count.
pub fn rank_groups(groups: &mut [RouteGroup], order: RankOrder, issue_loss_pct: f64) {
    let tier = |group: &RouteGroup| -> u8 {
        match (group.route_changed, group.has_issue(issue_loss_pct)) {
            (true, true) => 0,
            (false, true) => 1,
            (true, false) => 2,
            (false, false) => 3,
        }
    };

    groups.sort_by(|a, b| {
        tier(a).cmp(&tier(b)).then_with(|| match order {
            RankOrder::Summary => b
                .trace_count
                .cmp(&a.trace_count)
                .then_with(|| b.last_seen.cmp(&a.last_seen)),
            RankOrder::Detail => b
                .last_seen
                .cmp(&a.last_seen)
                .then_with(|| b.trace_count.cmp(&a.trace_count)),
        })
    });
}
