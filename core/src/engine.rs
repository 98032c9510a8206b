use crate::change::{ChangeDetector, StreamChanges};
use crate::config::Config;
use crate::graph::{Highlight, Node, TopologyBuilder, TopologyGraph};
use crate::layout::{hierarchical_layout, ForceSimulation, LayoutMode, LayoutPosition};
use crate::path::{resolve, ResolvedPath};
use crate::record::PathRecord;
use crate::signature::{group_routes, rank_groups, RankOrder, RouteGroup};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// One completed rebuild: the merged graph plus the analyses derived from
/// the same record window. Replaced wholesale on every refresh; consumers
/// hold it through the `Arc` and never see partial mutation.
pub struct GraphSnapshot {
    pub built_at: DateTime<Utc>,
    pub graph: TopologyGraph,
    pub groups: Vec<RouteGroup>,
    pub changes: HashMap<String, StreamChanges>,
    pub record_count: usize,
    pub skipped_records: usize,
}

/// Counters exposed on the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub built_at: DateTime<Utc>,
    pub record_count: usize,
    pub skipped_records: usize,
    pub node_count: usize,
    pub edge_count: usize,
    pub group_count: usize,
    pub change_count: usize,
}

/// Full attribute bundle for a selected node, handed to the detail panel.
#[derive(Debug, Clone, Serialize)]
pub struct SelectionDetail {
    pub node: Node,
    pub position: Option<LayoutPosition>,
    pub highlight: Highlight,
}

/// Drives the rebuild pipeline for one logical view (an agent or a whole
/// workspace).
///
/// The engine is synchronous and single-owner: every refresh discards the
/// previous graph and simulation outright. When refreshes race at a higher
/// layer, the latest one wins; in-flight results are dropped, not merged.
pub struct TopologyEngine {
    config: Config,
    snapshot: Arc<GraphSnapshot>,
    layout: HashMap<String, LayoutPosition>,
    layout_mode: LayoutMode,
    /// Positions carried across refreshes for nodes whose identity is
    /// stable. Stale entries are pruned after every rebuild.
    retained: DashMap<String, LayoutPosition>,
    simulation: Option<ForceSimulation>,
}

impl TopologyEngine {
    pub fn new(config: Config) -> Self {
        let mut engine = Self {
            config,
            snapshot: Arc::new(GraphSnapshot {
                built_at: Utc::now(),
                graph: TopologyBuilder::new(Default::default()).build(&[]),
                groups: Vec::new(),
                changes: HashMap::new(),
                record_count: 0,
                skipped_records: 0,
            }),
            layout: HashMap::new(),
            layout_mode: LayoutMode::Hierarchical,
            retained: DashMap::new(),
            simulation: None,
        };
        engine.refresh(Vec::new(), LayoutMode::Hierarchical);
        engine
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Rebuild everything from the given record window.
    ///
    /// The previous force simulation is torn down strictly before any new
    /// state is constructed; overlapping simulations must never coexist.
    pub fn refresh(
        &mut self,
        mut records: Vec<PathRecord>,
        mode: LayoutMode,
    ) -> Arc<GraphSnapshot> {
        self.simulation = None;

        self.prune_window(&mut records);
        records.sort_by_key(|record| record.timestamp);

        let resolved: Vec<ResolvedPath> = records.iter().filter_map(resolve).collect();
        let skipped = records.len() - resolved.len();
        if skipped > 0 {
            tracing::debug!(skipped, "records without hop data were dropped");
        }

        let builder = TopologyBuilder::new(self.config.health.clone());
        let graph = builder.build(&resolved);

        // Route groups are scoped per source/destination pair; the ranked
        // view flattens them back together.
        let mut by_pair: HashMap<(String, String), Vec<ResolvedPath>> = HashMap::new();
        for path in &resolved {
            by_pair
                .entry((path.agent.clone(), path.target.clone()))
                .or_default()
                .push(path.clone());
        }
        let mut groups = Vec::new();
        for stream in by_pair.into_values() {
            groups.extend(group_routes(&stream));
        }

        // Change detection runs per agent over the same time-ordered
        // stream.
        let mut by_agent: HashMap<String, Vec<ResolvedPath>> = HashMap::new();
        for path in &resolved {
            by_agent
                .entry(path.agent.clone())
                .or_default()
                .push(path.clone());
        }
        let changes: HashMap<String, StreamChanges> = by_agent
            .into_iter()
            .map(|(agent, stream)| {
                let annotated = ChangeDetector::annotate(&agent, &stream);
                (agent, annotated)
            })
            .collect();

        let snapshot = Arc::new(GraphSnapshot {
            built_at: Utc::now(),
            graph,
            groups,
            changes,
            record_count: resolved.len(),
            skipped_records: skipped,
        });

        self.snapshot = Arc::clone(&snapshot);
        self.relayout(mode);

        tracing::info!(
            records = snapshot.record_count,
            nodes = snapshot.graph.node_count(),
            edges = snapshot.graph.edge_count(),
            groups = snapshot.groups.len(),
            "topology refreshed"
        );

        snapshot
    }

    /// Recompute node positions for the current graph without rebuilding
    /// it. Also used by refresh for its initial placement.
    pub fn relayout(&mut self, mode: LayoutMode) -> &HashMap<String, LayoutPosition> {
        // Old simulation first: it owns its node set exclusively.
        self.simulation = None;
        self.layout_mode = mode;

        let graph = &self.snapshot.graph;
        let positions = match mode {
            LayoutMode::Hierarchical => hierarchical_layout(graph, self.config.layout.viewport),
            LayoutMode::Force => {
                let retained: HashMap<String, LayoutPosition> = self
                    .retained
                    .iter()
                    .map(|entry| (entry.key().clone(), *entry.value()))
                    .collect();
                let mut sim = ForceSimulation::new(
                    graph,
                    self.config.layout.viewport,
                    self.config.layout.force.clone(),
                    &retained,
                );
                sim.run();
                let positions = sim.positions();
                self.simulation = Some(sim);
                positions
            }
        };

        self.retained.retain(|id, _| positions.contains_key(id));
        for (id, position) in &positions {
            self.retained.insert(id.clone(), *position);
        }

        self.layout = positions;
        &self.layout
    }

    pub fn snapshot(&self) -> Arc<GraphSnapshot> {
        Arc::clone(&self.snapshot)
    }

    pub fn layout(&self) -> &HashMap<String, LayoutPosition> {
        &self.layout
    }

    pub fn layout_mode(&self) -> LayoutMode {
        self.layout_mode
    }

    /// Ranked copy of the current route groups.
    pub fn ranked_groups(&self, order: RankOrder) -> Vec<RouteGroup> {
        let mut groups = self.snapshot.groups.clone();
        rank_groups(&mut groups, order, self.config.routes.issue_loss_pct);
        groups
    }

    pub fn changes_for_agent(&self, agent: &str) -> Option<&StreamChanges> {
        self.snapshot.changes.get(agent)
    }

    /// Detail bundle for a selected node. A node that vanished from the
    /// latest window yields `None`, not an error.
    pub fn select(&self, node_id: &str) -> Option<SelectionDetail> {
        let node = self.snapshot.graph.node(node_id)?.clone();
        let highlight = self.snapshot.graph.highlight(node_id)?;
        Some(SelectionDetail {
            position: self.layout.get(node_id).copied(),
            node,
            highlight,
        })
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            built_at: self.snapshot.built_at,
            record_count: self.snapshot.record_count,
            skipped_records: self.snapshot.skipped_records,
            node_count: self.snapshot.graph.node_count(),
            edge_count: self.snapshot.graph.edge_count(),
            group_count: self.snapshot.groups.len(),
            change_count: self
                .snapshot
                .changes
                .values()
                .map(|stream| stream.change_count)
                .sum(),
        }
    }

    /// Drop records that fall outside the lookback window, then cap the
    /// window size keeping the most recent records.
    ///
    /// Refresh applies this to its own input; callers that keep a record
    /// buffer across refreshes apply it to the buffer too, so the buffer
    /// stays bounded by the same window.
    pub fn prune_window(&self, records: &mut Vec<PathRecord>) {
        let Some(newest) = records.iter().map(|record| record.timestamp).max() else {
            return;
        };

        let cutoff = newest - Duration::minutes(self.config.ingest.lookback_minutes as i64);
        records.retain(|record| record.timestamp >= cutoff);

        let max = self.config.ingest.max_records;
        if records.len() > max {
            records.sort_by_key(|record| record.timestamp);
            let excess = records.len() - max;
            records.drain(..excess);
        }
    }
}
