// Command-line configuration

use std::path::PathBuf;

use clap::Parser;

use crate::cluster::WindowClusterer;
use crate::constants::{
    BC_DURATION_PS, ETA_CUT, GAP_THRESHOLD_PS, HALF_BC_OFFSET_PS, MATCH_WINDOW_BC,
    MAX_BUNCHES_PER_ORBIT, MAX_ESTIMATOR_MOMENTUM, MAX_EVTIME_ERROR_PS, MIN_PT,
    MIN_TRACKING_CLUSTERS,
};
use crate::error::ConfigError;
use crate::pipeline::PipelineConfig;
use crate::selection::TrackCuts;
use crate::time_axis::TimeAxis;

/// Cluster time-of-flight records into events and match them to a reference detector
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Timeframe JSON files to process.
    #[arg(value_name = "FILE")]
    pub inputs: Vec<PathBuf>,

    /// Generate N synthetic timeframes instead of (or in addition to) reading files.
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub simulate: usize,

    /// Interactions per synthetic timeframe.
    #[arg(long, default_value_t = 200)]
    pub interactions: usize,

    /// Seed for synthetic timeframes.
    #[arg(long, default_value_t = 1)]
    pub seed: u64,

    /// Maximum distance of a record from its cluster's first record (ps).
    #[arg(long, default_value_t = GAP_THRESHOLD_PS)]
    pub gap_threshold_ps: f64,

    /// Half-width of the reference match window in bunch crossings.
    #[arg(long, default_value_t = MATCH_WINDOW_BC)]
    pub match_window_bc: u32,

    /// Bunch-crossing duration (ps).
    #[arg(long, default_value_t = BC_DURATION_PS)]
    pub bc_duration_ps: f64,

    /// Bunch crossings per orbit.
    #[arg(long, default_value_t = MAX_BUNCHES_PER_ORBIT)]
    pub max_bunches: u32,

    /// Offset added to a time before flooring it to a BC number (ps).
    #[arg(long, default_value_t = HALF_BC_OFFSET_PS)]
    pub half_bc_offset_ps: f64,

    /// Consensus uncertainty below which a cluster is well measured (ps).
    #[arg(long, default_value_t = MAX_EVTIME_ERROR_PS)]
    pub max_evtime_error_ps: f64,

    /// Records with momentum at or above this (GeV/c) do not enter the consensus.
    #[arg(long, default_value_t = MAX_ESTIMATOR_MOMENTUM)]
    pub max_estimator_momentum: f64,

    /// Minimum transverse momentum (GeV/c).
    #[arg(long, default_value_t = MIN_PT)]
    pub min_pt: f64,

    /// Maximum |eta|.
    #[arg(long, default_value_t = ETA_CUT)]
    pub eta_cut: f64,

    /// Minimum number of tracking clusters.
    #[arg(long, default_value_t = MIN_TRACKING_CLUSTERS)]
    pub min_clusters: u32,

    /// Skip matching against the reference detector.
    #[arg(long, default_value_t = false)]
    pub no_reference: bool,

    /// Timeframes processed at the same time.
    #[arg(long, default_value_t = 4)]
    pub max_parallel: usize,

    /// Write results in CSV format to a local file.
    #[arg(long, value_name = "FILE")]
    pub write_csv: Vec<PathBuf>,

    /// Write results as JSON lines to a local file.
    #[arg(long, value_name = "FILE")]
    pub write_json: Vec<PathBuf>,

    /// Directory for summary.json
    #[arg(long, value_name = "DIR")]
    pub work_dir: Option<PathBuf>,

    /// Verbose logging (DEBUG level)
    #[arg(long, short, default_value_t = false)]
    pub verbose: bool,
}

impl Config {
    /// Validated pipeline settings.
    pub fn pipeline_config(&self) -> Result<PipelineConfig, ConfigError> {
        PipelineConfig {
            axis: TimeAxis::new(self.bc_duration_ps, self.max_bunches)?,
            clusterer: WindowClusterer::new(self.gap_threshold_ps)?,
            cuts: TrackCuts::new(self.min_pt, self.eta_cut, self.min_clusters)?,
            match_window_bc: self.match_window_bc,
            half_bc_offset_ps: self.half_bc_offset_ps,
            max_evtime_error_ps: self.max_evtime_error_ps,
            use_reference: !self.no_reference,
        }
        .validate()
    }

    pub fn momentum_limit(&self) -> Result<f64, ConfigError> {
        if !self.max_estimator_momentum.is_finite() {
            return Err(ConfigError::NonFinite {
                name: "max_estimator_momentum",
                value: self.max_estimator_momentum,
            });
        }
        Ok(self.max_estimator_momentum)
    }
}
