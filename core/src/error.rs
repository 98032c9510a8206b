use thiserror::Error;

/// Typed failures surfaced by the engine. Malformed input records are not
/// errors; they are skipped during extraction.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("workspace not found: {0}")]
    WorkspaceNotFound(String),
}
