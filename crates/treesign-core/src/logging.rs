//! Tracing setup
//!
//! Round code only emits `tracing` events. Binaries and tests pick how much of
//! that they want to see by installing a subscriber here.

use crate::config::RoundConfig;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Numeric verbosity, 0 (silent) through 5 (everything)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Verbosity(u8);

impl Verbosity {
    /// Clamp `level` into 0..=5
    pub fn new(level: u8) -> Self {
        Self(level.min(5))
    }

    /// Raw level
    pub fn level(self) -> u8 {
        self.0
    }

    /// Matching tracing filter
    pub fn as_filter(self) -> LevelFilter {
        match self.0 {
            0 => LevelFilter::OFF,
            1 => LevelFilter::ERROR,
            2 => LevelFilter::WARN,
            3 => LevelFilter::INFO,
            4 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }
}

impl Default for Verbosity {
    fn default() -> Self {
        Self(1)
    }
}

impl From<u8> for Verbosity {
    fn from(level: u8) -> Self {
        Self::new(level)
    }
}

/// Install a global fmt subscriber.
///
/// `RUST_LOG` wins when set. Returns false if a subscriber was already
/// installed, which is harmless in tests that race to initialise logging.
pub fn init_tracing(verbosity: impl Into<Verbosity>) -> bool {
    let verbosity = verbosity.into();
    let filter = EnvFilter::builder()
        .with_default_directive(verbosity.as_filter().into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}

/// [`init_tracing`] at the verbosity a round is configured with.
///
/// Round drivers call this on creation; the first configuration to get
/// here decides the level for the whole process.
pub fn init_tracing_from_config(config: &RoundConfig) -> bool {
    init_tracing(config.verbosity())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_map_to_filters() {
        assert_eq!(Verbosity::new(0).as_filter(), LevelFilter::OFF);
        assert_eq!(Verbosity::new(2).as_filter(), LevelFilter::WARN);
        assert_eq!(Verbosity::new(4).as_filter(), LevelFilter::DEBUG);
        assert_eq!(Verbosity::new(9).level(), 5);
    }

    #[test]
    fn test_init_is_idempotent() {
        init_tracing(3u8);
        assert!(!init_tracing(Verbosity::new(3)));
    }

    #[test]
    fn test_config_verbosity_selects_filter() {
        let config = RoundConfig {
            verbosity: 4,
            ..RoundConfig::default()
        };
        assert_eq!(config.verbosity().as_filter(), LevelFilter::DEBUG);
        assert_eq!(RoundConfig::default().verbosity(), Verbosity::default());

        init_tracing(0u8);
        assert!(!init_tracing_from_config(&config));
    }
}
