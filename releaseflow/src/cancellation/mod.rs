//! Cooperative cancellation of release runs.
//!
//! The orchestrator checks the token between stages and the Build stage
//! races it against the remote wait.

mod token;

pub use token::CancellationToken;
