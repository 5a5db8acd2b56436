//! Error types for the frame engine

use thiserror::Error;

use crate::graphlib::NodeId;

/// Main error type for all registration and query operations.
///
/// Registration errors are raised before any graph mutation takes place, so a
/// failed call leaves the frame system exactly as it was. Evaluation errors
/// surface to the caller verbatim and never poison a cache.
#[derive(Error, Debug)]
pub enum FrameError {
    /// A node with this ID is already registered in the graph
    #[error("node ID {0} is already registered")]
    DuplicateId(NodeId),

    /// A node with this name is already registered in the graph
    #[error("node name `{0}` is already registered")]
    DuplicateName(String),

    /// Reference to an axes ID that was never registered
    #[error("axes {0} is not registered")]
    UnknownAxes(NodeId),

    /// Reference to a point ID that was never registered
    #[error("point {0} is not registered")]
    UnknownPoint(NodeId),

    /// Name lookup failed in both alias maps
    #[error("no axes or point named `{0}`")]
    UnknownName(String),

    /// A graph operation referenced a vertex missing from the tree
    #[error("vertex {0} is not part of the graph")]
    UnknownVertex(NodeId),

    /// The two vertices are not connected (cannot happen in a well-formed tree)
    #[error("no path between {from} and {to}")]
    NoPath { from: NodeId, to: NodeId },

    /// Class-specific parentage violation
    #[error("invalid parent for node {id}: {details}")]
    InvalidParent { id: NodeId, details: String },

    /// A non-root inertial or fixed-offset axes was registered without a DCM
    #[error("node {0} requires a DCM relative to its parent")]
    MissingDcm(NodeId),

    /// Text did not name a known rotation sequence
    #[error("invalid rotation sequence `{0}`")]
    InvalidSequence(String),

    /// Input had the wrong number of components
    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    /// The ephemeris provider lists several centers or axes for one target
    #[error("ephemeris data for target {0} is ambiguous (multiple centers or axes)")]
    AmbiguousEphemeris(NodeId),

    /// No ephemeris provider, or the provider has no records for the target
    #[error("no ephemeris data available for target {0}")]
    NoEphemeris(NodeId),

    /// The provider cannot satisfy the requested epoch
    #[error("ephemeris data gap for node {id} at epoch {epoch}")]
    DataGap { id: NodeId, epoch: f64 },

    /// An updatable point was queried without a current stamp
    #[error("updatable point {0} has no state for the requested epoch/order")]
    NotUpdated(NodeId),

    /// `update_point` was called on a point that is not of the Updatable class
    #[error("point {0} is not updatable")]
    NotUpdatable(NodeId),

    /// The light-time fixed-point iteration did not converge
    #[error("light-time iteration did not converge after {iterations} iterations")]
    LightTimeNoConverge { iterations: usize },

    /// A query requested a derivative order the system cannot produce
    #[error("query requires derivative order {requested} but only {max} is available")]
    OrderExceeded { requested: usize, max: usize },
}

/// Result type for frame engine operations
pub type Result<T> = std::result::Result<T, FrameError>;
