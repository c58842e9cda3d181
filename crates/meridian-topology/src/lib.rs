//! # meridian-topology
//!
//! Geographic clustering of the node population.
//!
//! The model places every node on a plane, clusters the nodes with a fully
//! deterministic k-means, and scores a clustering by the variance of each
//! node's squared distance to its cluster centroid. Two peers given the same
//! identities compute bit-identical clusterings, scores and canonical bytes.
//!
//! ## Modules
//!
//! - [`geo`] — planar projection and distance
//! - [`kmeans`] — cluster count and deterministic k-means
//! - [`score`] — convergence score
//! - [`model`] — [`GeoTopologyModel`]: propose, compare, validate, improve

pub mod geo;
pub mod kmeans;
pub mod model;
pub mod score;

pub use kmeans::cluster_count;
pub use model::{GeoTopologyModel, Preference, ScoredTopology};

/// Error types for topology validation.
#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    /// Bad partition, wrong cluster count, altered identity or non-normalized order.
    #[error("malformed topology: {0}")]
    MalformedTopology(String),
}

pub type Result<T> = std::result::Result<T, TopologyError>;
