//! Round configuration
//!
//! Loaded from TOML or JSON, overridable through `TREESIGN_*` environment
//! variables and validated before a round is started.

use crate::errors::{Result, TreeSignError};
use crate::logging::Verbosity;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Per-node round settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoundConfig {
    /// How long a node waits for all children's commitments
    pub commitment_timeout_ms: u64,
    /// How long a node waits for all children's responses
    pub response_timeout_ms: u64,
    /// How long a non-root node waits for its parent's challenge
    pub challenge_timeout_ms: u64,
    /// Replay the local Merkle proof after it is stored
    pub verify_proofs: bool,
    /// Treat byte-identical participant roots as a protocol error
    pub reject_duplicate_leaves: bool,
    /// Log verbosity (0 = off .. 5 = trace)
    pub verbosity: u8,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            commitment_timeout_ms: 5_000,
            response_timeout_ms: 5_000,
            challenge_timeout_ms: 30_000,
            verify_proofs: false,
            reject_duplicate_leaves: false,
            verbosity: 1,
        }
    }
}

impl RoundConfig {
    /// Commitment deadline as a duration
    pub fn commitment_timeout(&self) -> Duration {
        Duration::from_millis(self.commitment_timeout_ms)
    }

    /// Response deadline as a duration
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    /// Challenge deadline as a duration
    pub fn challenge_timeout(&self) -> Duration {
        Duration::from_millis(self.challenge_timeout_ms)
    }

    /// How long a node `height` levels above its deepest descendant waits
    /// for commitments. Each level gets its own commitment timeout, so a
    /// parent's window always closes after its children's.
    pub fn commitment_window(&self, height: u32) -> Duration {
        scaled(self.commitment_timeout(), height)
    }

    /// Response counterpart of [`RoundConfig::commitment_window`]
    pub fn response_window(&self, height: u32) -> Duration {
        scaled(self.response_timeout(), height)
    }

    /// Log verbosity, clamped into the supported range
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::new(self.verbosity)
    }

    /// Load configuration from a `.toml` or `.json` file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TreeSignError::internal(format!("Failed to read config file: {e}")))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => toml::from_str(&content)
                .map_err(|e| TreeSignError::invalid(format!("Invalid TOML: {e}"))),
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| TreeSignError::invalid(format!("Invalid JSON: {e}"))),
            _ => Err(TreeSignError::invalid("Unsupported file format")),
        }
    }

    /// Override fields from `TREESIGN_*` environment variables
    pub fn merge_with_env(&mut self) -> Result<()> {
        self.merge_with_vars(|key| std::env::var(key).ok())
    }

    fn merge_with_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("TREESIGN_COMMITMENT_TIMEOUT_MS") {
            self.commitment_timeout_ms = parse_var("TREESIGN_COMMITMENT_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("TREESIGN_RESPONSE_TIMEOUT_MS") {
            self.response_timeout_ms = parse_var("TREESIGN_RESPONSE_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("TREESIGN_CHALLENGE_TIMEOUT_MS") {
            self.challenge_timeout_ms = parse_var("TREESIGN_CHALLENGE_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("TREESIGN_VERIFY_PROOFS") {
            self.verify_proofs = parse_var("TREESIGN_VERIFY_PROOFS", &v)?;
        }
        if let Some(v) = lookup("TREESIGN_REJECT_DUPLICATE_LEAVES") {
            self.reject_duplicate_leaves = parse_var("TREESIGN_REJECT_DUPLICATE_LEAVES", &v)?;
        }
        if let Some(v) = lookup("TREESIGN_VERBOSITY") {
            self.verbosity = parse_var("TREESIGN_VERBOSITY", &v)?;
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.commitment_timeout_ms == 0 {
            return Err(TreeSignError::invalid(
                "commitment_timeout_ms must be greater than zero",
            ));
        }
        if self.response_timeout_ms == 0 {
            return Err(TreeSignError::invalid(
                "response_timeout_ms must be greater than zero",
            ));
        }
        if self.challenge_timeout_ms == 0 {
            return Err(TreeSignError::invalid(
                "challenge_timeout_ms must be greater than zero",
            ));
        }
        if self.verbosity > 5 {
            return Err(TreeSignError::invalid(format!(
                "verbosity must be at most 5 (got {})",
                self.verbosity
            )));
        }
        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| TreeSignError::invalid(format!("Invalid value in {key}: {value}")))
}

fn scaled(timeout: Duration, height: u32) -> Duration {
    timeout.saturating_mul(height.max(1))
}
