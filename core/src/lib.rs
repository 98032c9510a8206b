//! Topology graph construction and route-change detection for traceroute
//! style path records.
//!
//! The pipeline runs in stages: raw [`record::PathRecord`]s are resolved
//! into [`path::ResolvedPath`]s, merged into a [`graph::TopologyGraph`],
//! grouped by [`signature`], annotated by [`change`], classified by
//! [`health`], and placed by [`layout`]. [`engine::TopologyEngine`] wires
//! the stages together behind a snapshot-swap refresh.

pub mod change;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod health;
pub mod layout;
pub mod path;
pub mod record;
pub mod signature;

pub use change::{ChangeDetector, HopChange, HopDelta, RouteChange, StreamChanges};
pub use config::Config;
pub use engine::{EngineStatus, GraphSnapshot, SelectionDetail, TopologyEngine};
pub use error::EngineError;
pub use graph::{EdgeStats, Highlight, Node, NodeKind, TopologyBuilder, TopologyGraph};
pub use health::{classify, HealthStatus, HealthThresholds};
pub use layout::{
    hierarchical_layout, ForceConfig, ForceSimulation, LayoutMode, LayoutPosition, Viewport,
};
pub use path::{resolve, ResolvedHop, ResolvedPath, WILDCARD};
pub use record::{Hop, HopHost, PathRecord};
pub use signature::{group_routes, rank_groups, signature_of, RankOrder, RouteGroup};
