use crate::health::{classify, HealthStatus, HealthThresholds};
use crate::path::{ResolvedPath, WILDCARD};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Kind of a topology vertex. Behavior differences (depth pinning,
/// highlighting rules, coloring) are matched exhaustively on this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Agent,
    Hop,
    Destination,
}

/// A topology vertex with its running aggregate statistics.
#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub id: String,
    pub label: String,
    pub kind: NodeKind,
    pub avg_latency_ms: Option<f64>,
    pub latency_samples: u64,
    pub avg_loss_pct: f64,
    pub max_loss_pct: f64,
    pub sample_count: u64,
    pub path_ids: HashSet<Uuid>,
    pub health: HealthStatus,
}

impl Node {
    fn new(id: String, label: String, kind: NodeKind) -> Self {
        Self {
            id,
            label,
            kind,
            avg_latency_ms: None,
            latency_samples: 0,
            avg_loss_pct: 0.0,
            max_loss_pct: 0.0,
            sample_count: 0,
            path_ids: HashSet::new(),
            health: HealthStatus::Unknown,
        }
    }

    /// Fold one sample into the running statistics. The count is
    /// incremented before the division, so the mean update never divides
    /// by zero. The loss maximum carries through unconditionally: a single
    /// high-loss sample must not be diluted away by later clean samples.
    fn observe(&mut self, latency_ms: Option<f64>, loss_pct: f64) {
        if let Some(latency) = latency_ms {
            let n = self.latency_samples as f64;
            let old = self.avg_latency_ms.unwrap_or(0.0);
            self.latency_samples += 1;
            self.avg_latency_ms = Some((old * n + latency) / self.latency_samples as f64);
        }

        let n = self.sample_count as f64;
        self.sample_count += 1;
        self.avg_loss_pct = (self.avg_loss_pct * n + loss_pct) / self.sample_count as f64;
        self.max_loss_pct = self.max_loss_pct.max(loss_pct);
    }

    /// Number of distinct paths that touched this vertex.
    pub fn path_count(&self) -> usize {
        self.path_ids.len()
    }
}

/// Directed adjacency between two consecutive resolved hops, with the
/// aggregate statistics for that link.
#[derive(Debug, Clone, Serialize)]
pub struct EdgeStats {
    pub avg_latency_ms: Option<f64>,
    pub latency_samples: u64,
    pub sample_count: u64,
    pub path_ids: HashSet<Uuid>,
}

impl EdgeStats {
    fn new() -> Self {
        Self {
            avg_latency_ms: None,
            latency_samples: 0,
            sample_count: 0,
            path_ids: HashSet::new(),
        }
    }

    fn observe(&mut self, latency_ms: Option<f64>) {
        if let Some(latency) = latency_ms {
            let n = self.latency_samples as f64;
            let old = self.avg_latency_ms.unwrap_or(0.0);
            self.latency_samples += 1;
            self.avg_latency_ms = Some((old * n + latency) / self.latency_samples as f64);
        }
        self.sample_count += 1;
    }
}

/// Source/target metadata kept per path id so highlighting can apply the
/// per-kind selection rules without re-reading the raw records.
#[derive(Debug, Clone, Serialize)]
pub struct PathMeta {
    pub agent: String,
    pub target: String,
}

/// Emphasis set handed to the renderer for a selected node. Everything
/// outside it is dimmed.
#[derive(Debug, Clone, Serialize)]
pub struct Highlight {
    pub selected: String,
    pub path_ids: HashSet<Uuid>,
    pub node_ids: HashSet<String>,
    /// Emphasized edges as (source id, target id) pairs.
    pub edges: Vec<(String, String)>,
}

/// An immutable merged view of many resolved paths. Cross-references are
/// petgraph indices rather than live object references, so a completed
/// graph is safe to hand to a renderer wholesale.
pub struct TopologyGraph {
    graph: DiGraph<Node, EdgeStats>,
    index_of: HashMap<String, NodeIndex>,
    path_meta: HashMap<Uuid, PathMeta>,
    agent_names: HashSet<String>,
}

impl TopologyGraph {
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn graph(&self) -> &DiGraph<Node, EdgeStats> {
        &self.graph
    }

    pub fn node_index(&self, id: &str) -> Option<NodeIndex> {
        self.index_of.get(id).copied()
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.node_index(id).map(|idx| &self.graph[idx])
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.graph.node_weights()
    }

    pub fn path_meta(&self, record_id: &Uuid) -> Option<&PathMeta> {
        self.path_meta.get(record_id)
    }

    pub fn agent_names(&self) -> &HashSet<String> {
        &self.agent_names
    }

    /// Indices of every Agent vertex; the hierarchical layout seeds its
    /// BFS from all of these simultaneously.
    pub fn agent_indices(&self) -> Vec<NodeIndex> {
        self.graph
            .node_indices()
            .filter(|idx| self.graph[*idx].kind == NodeKind::Agent)
            .collect()
    }

    /// Compute the emphasis set for a selected node.
    ///
    /// Agent: only paths that originate at that agent and terminate at
    /// another agent. Destination: every path terminating there. Hop: every
    /// path touching it. When the node carries no membership metadata the
    /// result falls back to the node plus its direct neighbors.
    pub fn highlight(&self, node_id: &str) -> Option<Highlight> {
        let idx = self.node_index(node_id)?;
        let node = &self.graph[idx];

        if node.path_ids.is_empty() {
            return Some(self.neighbor_highlight(idx));
        }

        let path_ids: HashSet<Uuid> = match node.kind {
            NodeKind::Agent => node
                .path_ids
                .iter()
                .filter(|record_id| {
                    self.path_meta.get(record_id).is_some_and(|meta| {
                        meta.agent == node.label
                            && meta.target != node.label
                            && self.agent_names.contains(&meta.target)
                    })
                })
                .copied()
                .collect(),
            NodeKind::Destination | NodeKind::Hop => node.path_ids.clone(),
        };

        let mut node_ids = HashSet::new();
        node_ids.insert(node.id.clone());
        for other in self.graph.node_weights() {
            if !other.path_ids.is_disjoint(&path_ids) {
                node_ids.insert(other.id.clone());
            }
        }

        let mut edges = Vec::new();
        for edge in self.graph.edge_references() {
            if !edge.weight().path_ids.is_disjoint(&path_ids) {
                edges.push((
                    self.graph[edge.source()].id.clone(),
                    self.graph[edge.target()].id.clone(),
                ));
            }
        }
        edges.sort();

        Some(Highlight {
            selected: node.id.clone(),
            path_ids,
            node_ids,
            edges,
        })
    }

    fn neighbor_highlight(&self, idx: NodeIndex) -> Highlight {
        let node = &self.graph[idx];
        let mut node_ids = HashSet::new();
        node_ids.insert(node.id.clone());

        let mut edges = Vec::new();
        for direction in [Direction::Outgoing, Direction::Incoming] {
            for edge in self.graph.edges_directed(idx, direction) {
                node_ids.insert(self.graph[edge.source()].id.clone());
                node_ids.insert(self.graph[edge.target()].id.clone());
                edges.push((
                    self.graph[edge.source()].id.clone(),
                    self.graph[edge.target()].id.clone(),
                ));
            }
        }
        edges.sort();
        edges.dedup();

        Highlight {
            selected: node.id.clone(),
            path_ids: HashSet::new(),
            node_ids,
            edges,
        }
    }
}

/// Merges resolved paths into a deduplicated node/edge graph.
pub struct TopologyBuilder {
    thresholds: HealthThresholds,
}

impl TopologyBuilder {
    pub fn new(thresholds: HealthThresholds) -> Self {
        Self { thresholds }
    }

    /// Build a graph from one logical view's worth of paths.
    ///
    /// Paths with zero hops never reach this point; the extractor drops
    /// them. Nothing here returns an error: a rebuild must not abort on
    /// odd input.
    pub fn build(&self, paths: &[ResolvedPath]) -> TopologyGraph {
        let mut graph = DiGraph::new();
        let mut index_of: HashMap<String, NodeIndex> = HashMap::new();
        let mut edge_of: HashMap<(NodeIndex, NodeIndex), petgraph::graph::EdgeIndex> =
            HashMap::new();
        let mut path_meta = HashMap::new();
        let mut agent_names = HashSet::new();

        for path in paths {
            if path.hops.is_empty() {
                continue;
            }

            path_meta.insert(
                path.record_id,
                PathMeta {
                    agent: path.agent.clone(),
                    target: path.target.clone(),
                },
            );
            agent_names.insert(path.agent.clone());

            let agent_idx = Self::ensure_node(
                &mut graph,
                &mut index_of,
                format!("agent:{}", path.agent),
                path.agent.clone(),
                NodeKind::Agent,
            );
            graph[agent_idx].path_ids.insert(path.record_id);

            let mut prev = agent_idx;
            let mut reached_target = false;

            for (depth, hop) in path.hops.iter().enumerate() {
                let (id, label, kind) = if hop.responded() {
                    let kind = if hop.identifier == path.target {
                        reached_target = true;
                        NodeKind::Destination
                    } else {
                        NodeKind::Hop
                    };
                    (hop.identifier.clone(), hop.identifier.clone(), kind)
                } else {
                    // Anonymous hops are scoped to (agent, depth): two
                    // silent routers in different traces must not merge
                    // into one vertex just because neither answered.
                    (
                        format!("{}:{}:{}", path.agent, depth, WILDCARD),
                        WILDCARD.to_string(),
                        NodeKind::Hop,
                    )
                };

                let idx = Self::ensure_node(&mut graph, &mut index_of, id, label, kind);

                let latency = if hop.responded() { hop.latency_ms } else { None };
                graph[idx].observe(latency, hop.loss_pct);
                graph[idx].path_ids.insert(path.record_id);

                let edge_idx = *edge_of
                    .entry((prev, idx))
                    .or_insert_with(|| graph.add_edge(prev, idx, EdgeStats::new()));
                if let Some(edge) = graph.edge_weight_mut(edge_idx) {
                    edge.observe(latency);
                    edge.path_ids.insert(path.record_id);
                }

                prev = idx;
            }

            // A trace that never reached its target still contributes a
            // Destination vertex, but no edge: adjacency is never
            // synthesized across the gap.
            if !reached_target {
                let dest_idx = Self::ensure_node(
                    &mut graph,
                    &mut index_of,
                    path.target.clone(),
                    path.target.clone(),
                    NodeKind::Destination,
                );
                graph[dest_idx].path_ids.insert(path.record_id);
            }
        }

        for node in graph.node_weights_mut() {
            let loss = (node.sample_count > 0).then_some(node.avg_loss_pct);
            node.health = classify(node.avg_latency_ms, loss, &self.thresholds);
        }

        tracing::debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            paths = paths.len(),
            "topology graph built"
        );

        TopologyGraph {
            graph,
            index_of,
            path_meta,
            agent_names,
        }
    }

    fn ensure_node(
        graph: &mut DiGraph<Node, EdgeStats>,
        index_of: &mut HashMap<String, NodeIndex>,
        id: String,
        label: String,
        kind: NodeKind,
    ) -> NodeIndex {
        if let Some(idx) = index_of.get(&id) {
            // A hop later observed as some path's target is promoted: the
            // Destination kind wins so it renders in the rightmost layer.
            if kind == NodeKind::Destination && graph[*idx].kind == NodeKind::Hop {
                graph[*idx].kind = NodeKind::Destination;
            }
            return *idx;
        }

        let idx = graph.add_node(Node::new(id.clone(), label, kind));
        index_of.insert(id, idx);
        idx
    }
}
