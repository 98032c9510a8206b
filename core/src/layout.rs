use crate::error::EngineError;
use crate::graph::{NodeKind, TopologyGraph};
use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Which placement strategy to run for a rebuilt graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutMode {
    Hierarchical,
    Force,
}

/// Per-node 2-D position. Pinned positions are excluded from the force
/// simulation (hierarchical placement, or an active user drag).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayoutPosition {
    pub x: f64,
    pub y: f64,
    pub pinned: bool,
}

/// Drawing area the layout targets.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct Viewport {
    #[serde(default = "default_viewport_width")]
    pub width: f64,

    #[serde(default = "default_viewport_height")]
    pub height: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: default_viewport_width(),
            height: default_viewport_height(),
        }
    }
}

fn default_viewport_width() -> f64 {
    1200.0
}

fn default_viewport_height() -> f64 {
    800.0
}

/// Deterministic layered placement.
///
/// A breadth-first traversal seeded simultaneously from every Agent node
/// assigns each node its shortest undirected distance from any agent.
/// Destinations are then force-assigned to the maximum depth found so they
/// always render as the rightmost layer. Nodes sharing a depth are spaced
/// evenly along the vertical axis, and every position comes back pinned.
pub fn hierarchical_layout(
    graph: &TopologyGraph,
    viewport: Viewport,
) -> HashMap<String, LayoutPosition> {
    let inner = graph.graph();
    let mut depth_of: HashMap<NodeIndex, usize> = HashMap::new();
    let mut queue: VecDeque<NodeIndex> = VecDeque::new();

    for agent_idx in graph.agent_indices() {
        depth_of.insert(agent_idx, 0);
        queue.push_back(agent_idx);
    }

    while let Some(idx) = queue.pop_front() {
        let depth = depth_of[&idx];
        for neighbor in inner.neighbors_undirected(idx) {
            if !depth_of.contains_key(&neighbor) {
                depth_of.insert(neighbor, depth + 1);
                queue.push_back(neighbor);
            }
        }
    }

    let max_depth = depth_of.values().copied().max().unwrap_or(0);

    // Destinations override their BFS depth; isolated nodes the BFS never
    // reached land on the rightmost layer as well.
    let mut layers: HashMap<usize, Vec<NodeIndex>> = HashMap::new();
    for idx in inner.node_indices() {
        let depth = match inner[idx].kind {
            NodeKind::Destination => max_depth,
            _ => depth_of.get(&idx).copied().unwrap_or(max_depth),
        };
        layers.entry(depth).or_default().push(idx);
    }

    let mut positions = HashMap::new();
    let span = max_depth.max(1) as f64;

    for (depth, mut members) in layers {
        // Stable vertical order within a layer regardless of petgraph
        // insertion order.
        members.sort_by(|a, b| inner[*a].id.cmp(&inner[*b].id));
        let x = viewport.width * depth as f64 / span;
        let count = members.len() as f64;

        for (i, idx) in members.into_iter().enumerate() {
            let y = viewport.height * (i as f64 + 1.0) / (count + 1.0);
            positions.insert(inner[idx].id.clone(), LayoutPosition { x, y, pinned: true });
        }
    }

    positions
}

/// Force simulation tuning. Defaults mirror the usual charge/spring/
/// collision trio; all of it is exposed in config.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ForceConfig {
    #[serde(default = "default_repulsion")]
    pub repulsion: f64,

    #[serde(default = "default_spring_strength")]
    pub spring_strength: f64,

    #[serde(default = "default_spring_length")]
    pub spring_length: f64,

    #[serde(default = "default_collision_radius")]
    pub collision_radius: f64,

    #[serde(default = "default_center_pull")]
    pub center_pull: f64,

    #[serde(default = "default_damping")]
    pub damping: f64,

    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    #[serde(default = "default_settle_epsilon")]
    pub settle_epsilon: f64,

    /// Keep Agent and Destination nodes pinned even in force mode.
    #[serde(default = "default_true")]
    pub pin_endpoints: bool,
}

impl Default for ForceConfig {
    fn default() -> Self {
        Self {
            repulsion: default_repulsion(),
            spring_strength: default_spring_strength(),
            spring_length: default_spring_length(),
            collision_radius: default_collision_radius(),
            center_pull: default_center_pull(),
            damping: default_damping(),
            max_iterations: default_max_iterations(),
            settle_epsilon: default_settle_epsilon(),
            pin_endpoints: default_true(),
        }
    }
}

fn default_repulsion() -> f64 {
    60_000.0
}

fn default_spring_strength() -> f64 {
    0.02
}

fn default_spring_length() -> f64 {
    120.0
}

fn default_collision_radius() -> f64 {
    24.0
}

fn default_center_pull() -> f64 {
    0.002
}

fn default_damping() -> f64 {
    0.85
}

fn default_max_iterations() -> usize {
    300
}

fn default_settle_epsilon() -> f64 {
    0.5
}

fn default_true() -> bool {
    true
}

struct Body {
    id: String,
    x: f64,
    y: f64,
    vx: f64,
    vy: f64,
    pinned: bool,
}

/// Physics-style iterative placement.
///
/// One simulation owns its node/position set exclusively. The engine
/// destroys the previous instance before constructing a replacement;
/// overlapping simulations never coexist, and cancellation is teardown.
pub struct ForceSimulation {
    bodies: Vec<Body>,
    edges: Vec<(usize, usize)>,
    index_of: HashMap<String, usize>,
    config: ForceConfig,
    viewport: Viewport,
    last_displacement: f64,
}

impl ForceSimulation {
    /// Seed a simulation from a graph. Nodes keep a retained position when
    /// one is supplied (stable identity across refreshes); new nodes start
    /// on a deterministic circle around the viewport center.
    pub fn new(
        graph: &TopologyGraph,
        viewport: Viewport,
        config: ForceConfig,
        retained: &HashMap<String, LayoutPosition>,
    ) -> Self {
        let inner = graph.graph();
        let center_x = viewport.width / 2.0;
        let center_y = viewport.height / 2.0;
        let seed_radius = viewport.width.min(viewport.height) / 3.0;

        let mut bodies = Vec::with_capacity(inner.node_count());
        let mut index_of = HashMap::new();

        for (i, idx) in inner.node_indices().enumerate() {
            let node = &inner[idx];
            let endpoint = matches!(node.kind, NodeKind::Agent | NodeKind::Destination);

            // Retained positions only seed coordinates; whether a node is
            // pinned is decided per mode. Hop nodes always start free and
            // are re-pinned only by an active drag.
            let pinned = config.pin_endpoints && endpoint;
            let (x, y) = match retained.get(&node.id) {
                Some(pos) => (pos.x, pos.y),
                None => {
                    // Golden-angle spacing keeps fresh nodes from stacking.
                    let angle = i as f64 * 2.399_963;
                    (
                        center_x + seed_radius * angle.cos(),
                        center_y + seed_radius * angle.sin(),
                    )
                }
            };

            index_of.insert(node.id.clone(), bodies.len());
            bodies.push(Body {
                id: node.id.clone(),
                x,
                y,
                vx: 0.0,
                vy: 0.0,
                pinned,
            });
        }

        let edges = inner
            .edge_indices()
            .filter_map(|edge| inner.edge_endpoints(edge))
            .map(|(a, b)| (a.index(), b.index()))
            .collect();

        Self {
            bodies,
            edges,
            index_of,
            config,
            viewport,
            last_displacement: f64::MAX,
        }
    }

    /// Advance the simulation one tick; returns the largest displacement
    /// any free node made.
    pub fn step(&mut self) -> f64 {
        let n = self.bodies.len();
        if n < 2 {
            self.last_displacement = 0.0;
            return 0.0;
        }

        let softening = 100.0;
        let mut fx = vec![0.0f64; n];
        let mut fy = vec![0.0f64; n];

        // Pairwise inverse-square repulsion plus collision push-apart.
        for i in 0..n {
            for j in (i + 1)..n {
                let dx = self.bodies[i].x - self.bodies[j].x;
                let dy = self.bodies[i].y - self.bodies[j].y;
                let dist_sq = dx * dx + dy * dy;
                let dist = dist_sq.sqrt();

                let (ux, uy) = if dist > 1e-4 {
                    (dx / dist, dy / dist)
                } else {
                    // Coincident nodes get a deterministic separation axis.
                    let angle = (i as f64 * 0.618_034 + j as f64 * 0.414_214)
                        * std::f64::consts::TAU;
                    (angle.cos(), angle.sin())
                };

                let repulsion = self.config.repulsion / (dist_sq + softening);
                fx[i] += ux * repulsion;
                fy[i] += uy * repulsion;
                fx[j] -= ux * repulsion;
                fy[j] -= uy * repulsion;

                let min_dist = self.config.collision_radius * 2.0;
                if dist < min_dist {
                    let push = (min_dist - dist) * 0.5;
                    fx[i] += ux * push;
                    fy[i] += uy * push;
                    fx[j] -= ux * push;
                    fy[j] -= uy * push;
                }
            }
        }

        // Spring attraction along observed adjacencies.
        for &(a, b) in &self.edges {
            let dx = self.bodies[a].x - self.bodies[b].x;
            let dy = self.bodies[a].y - self.bodies[b].y;
            let dist = (dx * dx + dy * dy).sqrt();
            if dist <= 1e-4 {
                continue;
            }

            let stretch = (dist - self.config.spring_length) * self.config.spring_strength;
            let ux = dx / dist;
            let uy = dy / dist;
            fx[a] -= ux * stretch;
            fy[a] -= uy * stretch;
            fx[b] += ux * stretch;
            fy[b] += uy * stretch;
        }

        // Centering keeps the free nodes inside the viewport.
        let center_x = self.viewport.width / 2.0;
        let center_y = self.viewport.height / 2.0;
        for i in 0..n {
            fx[i] -= (self.bodies[i].x - center_x) * self.config.center_pull;
            fy[i] -= (self.bodies[i].y - center_y) * self.config.center_pull;
        }

        let mut max_displacement = 0.0f64;
        for i in 0..n {
            let body = &mut self.bodies[i];
            if body.pinned {
                body.vx = 0.0;
                body.vy = 0.0;
                continue;
            }

            body.vx = (body.vx + fx[i]) * self.config.damping;
            body.vy = (body.vy + fy[i]) * self.config.damping;
            body.x += body.vx;
            body.y += body.vy;

            let displacement = (body.vx * body.vx + body.vy * body.vy).sqrt();
            max_displacement = max_displacement.max(displacement);
        }

        self.last_displacement = max_displacement;
        max_displacement
    }

    /// Run until settled or the iteration cap is reached.
    pub fn run(&mut self) -> usize {
        for iteration in 0..self.config.max_iterations {
            if self.step() < self.config.settle_epsilon {
                tracing::debug!(iterations = iteration + 1, "force layout settled");
                return iteration + 1;
            }
        }
        tracing::debug!(
            iterations = self.config.max_iterations,
            "force layout hit iteration cap"
        );
        self.config.max_iterations
    }

    pub fn is_settled(&self) -> bool {
        self.last_displacement < self.config.settle_epsilon
    }

    /// Pin a node at a dragged position. It stays fixed until released.
    pub fn pin(&mut self, node_id: &str, x: f64, y: f64) -> Result<(), EngineError> {
        let i = self.body_index(node_id)?;
        let body = &mut self.bodies[i];
        body.x = x;
        body.y = y;
        body.vx = 0.0;
        body.vy = 0.0;
        body.pinned = true;
        Ok(())
    }

    /// Release a dragged node back to the simulation.
    pub fn release(&mut self, node_id: &str) -> Result<(), EngineError> {
        let i = self.body_index(node_id)?;
        self.bodies[i].pinned = false;
        Ok(())
    }

    fn body_index(&self, node_id: &str) -> Result<usize, EngineError> {
        self.index_of
            .get(node_id)
            .copied()
            .ok_or_else(|| EngineError::NodeNotFound(node_id.to_string()))
    }

    pub fn positions(&self) -> HashMap<String, LayoutPosition> {
        self.bodies
            .iter()
            .map(|body| {
                (
                    body.id.clone(),
                    LayoutPosition {
                        x: body.x,
                        y: body.y,
                        pinned: body.pinned,
                    },
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::TopologyBuilder;
    use crate::health::HealthThresholds;
    use crate::path::{resolve, ResolvedPath};
    use crate::record::{Hop, HopHost, PathRecord};

    fn hop(ip: &str) -> Hop {
        Hop {
            hosts: vec![HopHost {
                ip: ip.to_string(),
                hostname: None,
            }],
            loss_pct: 0.0,
            latency_ms: Some(5.0),
            jitter_ms: None,
        }
    }

    fn trace(agent: &str, target: &str, ips: &[&str]) -> ResolvedPath {
        resolve(&PathRecord::new(
            agent,
            target,
            ips.iter().map(|ip| hop(ip)).collect(),
        ))
        .unwrap()
    }

    fn build(paths: &[ResolvedPath]) -> TopologyGraph {
        TopologyBuilder::new(HealthThresholds::default()).build(paths)
    }

    fn depth_of(
        positions: &HashMap<String, LayoutPosition>,
        viewport: Viewport,
        max_depth: usize,
        id: &str,
    ) -> usize {
        let x = positions[id].x;
        (x / viewport.width * max_depth.max(1) as f64).round() as usize
    }

    #[test]
    fn test_hierarchical_depths_follow_bfs() {
        let graph = build(&[trace(
            "x",
            "8.8.8.8",
            &["10.0.0.1", "192.168.1.1", "8.8.8.8"],
        )]);
        let viewport = Viewport::default();
        let positions = hierarchical_layout(&graph, viewport);

        // agent(0) -> hop(1) -> hop(2) -> destination(3 = max)
        assert_eq!(depth_of(&positions, viewport, 3, "agent:x"), 0);
        assert_eq!(depth_of(&positions, viewport, 3, "10.0.0.1"), 1);
        assert_eq!(depth_of(&positions, viewport, 3, "192.168.1.1"), 2);
        assert_eq!(depth_of(&positions, viewport, 3, "8.8.8.8"), 3);
        assert!(positions.values().all(|p| p.pinned));
    }

    #[test]
    fn test_destination_pinned_to_max_depth() {
        // The short trace's destination would sit at BFS depth 2, but the
        // long trace pushes the graph's max depth to 5.
        let short = trace("x", "1.1.1.1", &["10.0.0.1", "1.1.1.1"]);
        let long = trace(
            "y",
            "9.9.9.9",
            &["172.16.0.1", "172.16.0.2", "172.16.0.3", "172.16.0.4", "9.9.9.9"],
        );

        let graph = build(&[short, long]);
        let viewport = Viewport::default();
        let positions = hierarchical_layout(&graph, viewport);

        assert_eq!(depth_of(&positions, viewport, 5, "1.1.1.1"), 5);
        assert_eq!(depth_of(&positions, viewport, 5, "9.9.9.9"), 5);
    }

    #[test]
    fn test_layer_members_evenly_spaced() {
        let a = trace("a", "8.8.8.8", &["10.0.0.1", "8.8.8.8"]);
        let b = trace("b", "8.8.8.8", &["10.0.0.2", "8.8.8.8"]);

        let graph = build(&[a, b]);
        let viewport = Viewport::default();
        let positions = hierarchical_layout(&graph, viewport);

        let ya = positions["agent:a"].y;
        let yb = positions["agent:b"].y;
        assert!((ya - viewport.height / 3.0).abs() < 1e-6);
        assert!((yb - 2.0 * viewport.height / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_force_simulation_settles_and_pins_endpoints() {
        let graph = build(&[trace("x", "8.8.8.8", &["10.0.0.1", "8.8.8.8"])]);
        let seeds = hierarchical_layout(&graph, Viewport::default());

        let mut sim = ForceSimulation::new(
            &graph,
            Viewport::default(),
            ForceConfig::default(),
            &seeds,
        );
        sim.run();

        let positions = sim.positions();
        // Agent and destination keep their seeded spots.
        assert_eq!(positions["agent:x"].x, seeds["agent:x"].x);
        assert_eq!(positions["8.8.8.8"].y, seeds["8.8.8.8"].y);
        assert!(positions["agent:x"].pinned);
        // The intermediate hop was free to move.
        assert!(!positions["10.0.0.1"].pinned);
    }

    #[test]
    fn test_force_repulsion_separates_coincident_nodes() {
        let graph = build(&[
            trace("x", "8.8.8.8", &["10.0.0.1", "8.8.8.8"]),
            trace("x", "8.8.8.8", &["10.0.0.2", "8.8.8.8"]),
        ]);

        // Seed every node at the same point; free nodes must spread out.
        let stacked: HashMap<String, LayoutPosition> = graph
            .nodes()
            .map(|node| {
                (
                    node.id.clone(),
                    LayoutPosition {
                        x: 600.0,
                        y: 400.0,
                        pinned: false,
                    },
                )
            })
            .collect();

        let config = ForceConfig {
            pin_endpoints: false,
            ..ForceConfig::default()
        };
        let mut sim = ForceSimulation::new(&graph, Viewport::default(), config, &stacked);
        sim.run();

        let positions = sim.positions();
        let a = positions["10.0.0.1"];
        let b = positions["10.0.0.2"];
        let dist = ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt();
        assert!(dist > 1.0, "nodes still stacked after simulation");
    }

    #[test]
    fn test_drag_pin_and_release() {
        let graph = build(&[trace("x", "8.8.8.8", &["10.0.0.1", "8.8.8.8"])]);
        let mut sim = ForceSimulation::new(
            &graph,
            Viewport::default(),
            ForceConfig::default(),
            &HashMap::new(),
        );

        sim.pin("10.0.0.1", 50.0, 60.0).unwrap();
        sim.step();
        let held = sim.positions()["10.0.0.1"];
        assert_eq!((held.x, held.y), (50.0, 60.0));
        assert!(held.pinned);

        sim.release("10.0.0.1").unwrap();
        sim.step();
        assert!(!sim.positions()["10.0.0.1"].pinned);

        assert!(sim.pin("nope", 0.0, 0.0).is_err());
    }
}
