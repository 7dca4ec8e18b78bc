use thiserror::Error;

/// Canonical result type used throughout tileplan.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Invalid plan-constraint key, out-of-range dimension index, or an
    /// incompatible combination of user constraints. Not recoverable locally.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// No plan satisfies the constraints, even after the memory-bound
    /// relaxation retries in the public entry points. Practically
    /// unreachable because the final retry minimises memory unbounded.
    #[error("no valid plan found: {0}")]
    Infeasible(String),

    /// An internal invariant was violated; this indicates a planner bug
    /// rather than bad input.
    #[error("internal invariant failed: {0}")]
    Invariant(String),

    /// An unrecognised enum token or method name was found while
    /// interpreting a plan-constraints tree.
    #[error("unknown token: {0}")]
    UnknownToken(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
