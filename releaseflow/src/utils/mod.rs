//! Hashing and dependency-graph helpers.

mod graph;
mod hashing;

pub use graph::{dependency_order, validate_component_graph};
pub use hashing::{dependency_digest, sha256_hex};
