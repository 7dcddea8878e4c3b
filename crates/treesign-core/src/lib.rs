//! # Treesign Core
//!
//! Building blocks shared by collective-signing rounds:
//!
//! - **errors**: unified [`TreeSignError`] and [`Result`]
//! - **hash**: 32-byte [`Hash32`] values and the Merkle hash algorithm
//! - **proof**: sorted-pair Merkle proof trees ([`build_proof_tree`], [`Proof`])
//! - **suite**: the [`CipherSuite`] a round is generic over, plus
//!   [`Ristretto255Suite`]
//! - **config**: [`RoundConfig`] loading and validation
//! - **logging**: tracing subscriber setup

pub mod config;
pub mod errors;
pub mod hash;
pub mod logging;
pub mod proof;
pub mod suite;

pub use config::RoundConfig;
pub use errors::{Result, TreeSignError};
pub use hash::{Hash32, HashAlgorithm, Sha256Algorithm};
pub use logging::{init_tracing, init_tracing_from_config, Verbosity};
pub use proof::{build_proof_tree, hash_pair, Proof};
pub use suite::{CipherSuite, KeyPair, Ristretto255Suite};
