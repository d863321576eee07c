// Error types

use std::path::PathBuf;
use thiserror::Error;

/// Configuration rejected at load time. Fatal for the run.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("bunch-crossing duration must be positive and finite, got {0} ps")]
    InvalidBcDuration(f64),
    #[error("orbit length must be at least one bunch crossing")]
    EmptyOrbit,
    #[error("gap threshold must be non-negative and finite, got {0} ps")]
    InvalidGapThreshold(f64),
    #[error("match window must span at least one bunch crossing")]
    EmptyMatchWindow,
    #[error("{name} must be finite, got {value}")]
    NonFinite { name: &'static str, value: f64 },
    #[error("synthetic timeframe {timeframe} starts beyond the last orbit number")]
    OrbitOverflow { timeframe: u64 },
}

/// Precondition violations detected while matching against the reference stream.
#[derive(Debug, Error, PartialEq)]
pub enum MatchError {
    #[error("reference event {index} at {time_ps} ps precedes event {prev} at {prev_time_ps} ps")]
    UnsortedReference {
        index: usize,
        time_ps: f64,
        prev: usize,
        prev_time_ps: f64,
    },
    #[error("reference event {index} has bc {bc}, orbit holds {max_bunches}")]
    BcOutOfRange {
        index: usize,
        bc: u32,
        max_bunches: u32,
    },
    #[error("cluster window starting at {start_ps} ps submitted after window starting at {previous_ps} ps")]
    ClusterOutOfOrder { start_ps: f64, previous_ps: f64 },
}

/// Failure loading a timeframe document.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Anything that can abort a timeframe.
#[derive(Debug, Error)]
pub enum TimeframeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error(transparent)]
    Input(#[from] InputError),
}
