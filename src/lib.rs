//! Matrix-multiplication blob relayer
//!
//! Watches the rollup contract for multiplication requests, computes the
//! result, commits it with a Merkle root in call data and carries the full
//! result in an EIP-4844 blob.

pub mod blob;
pub mod chain;
pub mod config;
pub mod contract;
pub mod error;
pub mod events;
pub mod matrix;
pub mod merkle;
pub mod metrics;
pub mod pipeline;
pub mod tx;

pub use error::{SubmitterError, SubmitterResult};
