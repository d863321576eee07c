// Per-timeframe pipeline: selection -> clustering -> consensus -> reference matching
//
// One timeframe runs to completion on one thread. Nothing here is shared
// between timeframes; the matcher and its cursor live only inside `process`.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cluster::{Cluster, WindowClusterer};
use crate::constants::{HALF_BC_OFFSET_PS, MATCH_WINDOW_BC, MAX_EVTIME_ERROR_PS, REFERENCE_CHANNELS};
use crate::error::{ConfigError, TimeframeError};
use crate::evtime::{
    eligibility, ConsensusEstimator, EventTime, LocalTime, MomentumFilter, RecordFilter,
    RobustMeanEstimator,
};
use crate::input::Timeframe;
use crate::matcher::{BcComparison, ReferenceMatcher};
use crate::record::Hypothesis;
use crate::reference::{self, Channel};
use crate::selection::TrackCuts;
use crate::time_axis::TimeAxis;

/// Validated settings, constant for a timeframe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
    pub axis: TimeAxis,
    pub clusterer: WindowClusterer,
    pub cuts: TrackCuts,
    /// Half-width of the reference window (BC)
    pub match_window_bc: u32,
    pub half_bc_offset_ps: f64,
    /// Consensus uncertainty limit for a well-measured cluster (ps)
    pub max_evtime_error_ps: f64,
    /// Correlate against the reference detector at all
    pub use_reference: bool,
}

impl PipelineConfig {
    pub fn validate(self) -> Result<Self, ConfigError> {
        if self.match_window_bc == 0 {
            return Err(ConfigError::EmptyMatchWindow);
        }
        if !self.half_bc_offset_ps.is_finite() {
            return Err(ConfigError::NonFinite {
                name: "half_bc_offset_ps",
                value: self.half_bc_offset_ps,
            });
        }
        if !self.max_evtime_error_ps.is_finite() {
            return Err(ConfigError::NonFinite {
                name: "max_evtime_error_ps",
                value: self.max_evtime_error_ps,
            });
        }
        Ok(self)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            axis: TimeAxis::lhc(),
            clusterer: WindowClusterer::default(),
            cuts: TrackCuts::default(),
            match_window_bc: MATCH_WINDOW_BC,
            half_bc_offset_ps: HALF_BC_OFFSET_PS,
            max_evtime_error_ps: MAX_EVTIME_ERROR_PS,
            use_reference: true,
        }
    }
}

/// Per-hypothesis values, keyed like `Hypothesis`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PerHypothesis {
    pub pion: f64,
    pub kaon: f64,
    pub proton: f64,
}

impl PerHypothesis {
    fn from_fn(f: impl Fn(Hypothesis) -> f64) -> Self {
        PerHypothesis {
            pion: f(Hypothesis::Pion),
            kaon: f(Hypothesis::Kaon),
            proton: f(Hypothesis::Proton),
        }
    }

    pub fn get(&self, h: Hypothesis) -> f64 {
        match h {
            Hypothesis::Pion => self.pion,
            Hypothesis::Kaon => self.kaon,
            Hypothesis::Proton => self.proton,
        }
    }
}

/// One record checked against the consensus of the other records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordResidual {
    pub id: u64,
    pub time_ps: f64,
    pub p: f64,
    pub pt: f64,
    /// Record entered the consensus
    pub contributed: bool,
    /// Consensus without this record
    pub local: LocalTime,
    /// Measured minus expected flight time
    pub delta_t_ps: PerHypothesis,
    pub beta: f64,
    pub mass: f64,
}

/// A reference event inside a cluster's window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceMatch {
    /// Position in the timeframe's time-sorted reference sequence
    pub index: usize,
    pub orbit: u32,
    pub bc: u32,
    pub same_bc: bool,
    pub delta_bc: i64,
    /// Consensus time within its BC minus each valid sub-timestamp
    pub delta_t_ps: [Option<f64>; REFERENCE_CHANNELS],
}

impl ReferenceMatch {
    pub fn delta(&self, channel: Channel) -> Option<f64> {
        self.delta_t_ps[channel.index()]
    }
}

/// Everything emitted for one cluster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterResult {
    pub timeframe: u64,
    pub cluster: usize,
    pub first_ps: f64,
    pub last_ps: f64,
    pub size: usize,
    /// `None` when no record was eligible for the consensus
    pub consensus: Option<EventTime>,
    pub n_bc: Option<i64>,
    /// Consensus time relative to its BC (ps)
    pub time_in_bc_ps: Option<f64>,
    /// Consensus uncertainty below the configured limit
    pub well_measured: bool,
    pub records: Vec<RecordResidual>,
    pub matches: Vec<ReferenceMatch>,
}

/// Bookkeeping of one processed timeframe.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimeframeSummary {
    pub timeframe: u64,
    pub first_orbit: u32,
    pub records_in: usize,
    /// Records dropped for a NaN or infinite time
    pub non_finite_times: usize,
    pub records_selected: usize,
    pub clusters: usize,
    pub skipped_clusters: usize,
    pub well_measured: usize,
    pub reference_events: usize,
    pub matches: usize,
    pub same_bc_matches: usize,
    pub cursor_advances: usize,
    /// Processing stopped between clusters on request
    pub aborted: bool,
}

/// Runs timeframes through selection, clustering, consensus and matching.
pub struct Pipeline {
    config: PipelineConfig,
    estimator: Box<dyn ConsensusEstimator>,
    filter: Box<dyn RecordFilter>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Pipeline {
            config,
            estimator: Box::new(RobustMeanEstimator::default()),
            filter: Box::new(MomentumFilter::default()),
        }
    }

    pub fn with_estimator(mut self, estimator: impl ConsensusEstimator + 'static) -> Self {
        self.estimator = Box::new(estimator);
        self
    }

    pub fn with_filter(mut self, filter: impl RecordFilter + 'static) -> Self {
        self.filter = Box::new(filter);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process one timeframe, handing each cluster result to `emit` in time order.
    ///
    /// `abort` is polled between clusters; when set, the clusters emitted so
    /// far stand and the summary is marked aborted.
    pub fn process(
        &self,
        tf: Timeframe,
        abort: &AtomicBool,
        mut emit: impl FnMut(ClusterResult),
    ) -> Result<TimeframeSummary, TimeframeError> {
        let cfg = &self.config;
        let Timeframe {
            timeframe,
            first_orbit,
            records,
            reference: mut ref_events,
        } = tf;

        let mut summary = TimeframeSummary {
            timeframe,
            first_orbit,
            records_in: records.len(),
            ..Default::default()
        };

        let (records, non_finite): (Vec<_>, Vec<_>) =
            records.into_iter().partition(|r| r.time_ps.is_finite());
        summary.non_finite_times = non_finite.len();
        if !non_finite.is_empty() {
            warn!(
                timeframe,
                dropped = non_finite.len(),
                first_id = non_finite[0].id,
                "dropping records with non-finite time"
            );
        }

        let selected = cfg.cuts.apply(records);
        summary.records_selected = selected.len();

        if !cfg.use_reference {
            ref_events.clear();
        }
        reference::sort_by_time(&mut ref_events, &cfg.axis, first_orbit);
        summary.reference_events = ref_events.len();
        let mut matcher =
            ReferenceMatcher::new(&ref_events, &cfg.axis, first_orbit, cfg.match_window_bc)?;

        let clusters = cfg.clusterer.cluster(selected);
        summary.clusters = clusters.len();

        for (index, cluster) in clusters.iter().enumerate() {
            if abort.load(Ordering::Relaxed) {
                summary.aborted = true;
                break;
            }
            let result = self.process_cluster(timeframe, index, cluster, &mut matcher)?;
            match &result.consensus {
                None => summary.skipped_clusters += 1,
                Some(_) if result.well_measured => summary.well_measured += 1,
                Some(_) => {}
            }
            summary.matches += result.matches.len();
            summary.same_bc_matches += result.matches.iter().filter(|m| m.same_bc).count();
            emit(result);
        }
        summary.cursor_advances = matcher.advances();

        info!(
            timeframe,
            records = summary.records_in,
            selected = summary.records_selected,
            clusters = summary.clusters,
            skipped = summary.skipped_clusters,
            matches = summary.matches,
            same_bc = summary.same_bc_matches,
            "processed timeframe"
        );
        Ok(summary)
    }

    fn process_cluster(
        &self,
        timeframe: u64,
        index: usize,
        cluster: &Cluster,
        matcher: &mut ReferenceMatcher<'_>,
    ) -> Result<ClusterResult, TimeframeError> {
        let cfg = &self.config;
        let records = cluster.records();
        let mut result = ClusterResult {
            timeframe,
            cluster: index,
            first_ps: cluster.first_time(),
            last_ps: cluster.last_time(),
            size: cluster.len(),
            consensus: None,
            n_bc: None,
            time_in_bc_ps: None,
            well_measured: false,
            records: Vec::new(),
            matches: Vec::new(),
        };

        let eligible = eligibility(records, self.filter.as_ref());
        if !eligible.iter().any(|&e| e) {
            debug!(timeframe, cluster = index, size = records.len(), "no eligible records, skipping");
            return Ok(result);
        }

        let consensus = self.estimator.estimate(records, &eligible);
        let n_bc = cfg.axis.bc_number(consensus.time_ps, cfg.half_bc_offset_ps);
        let time_in_bc = cfg.axis.time_in_bc(consensus.time_ps, n_bc);

        result.records = records
            .iter()
            .enumerate()
            .map(|(i, record)| {
                let local = self.estimator.unbiased(records, &eligible, &consensus, i);
                RecordResidual {
                    id: record.id,
                    time_ps: record.time_ps,
                    p: record.p,
                    pt: record.pt,
                    contributed: consensus.contributed(i),
                    local,
                    delta_t_ps: PerHypothesis::from_fn(|h| record.delta_t(local.time_ps, h)),
                    beta: record.beta(local.time_ps),
                    mass: record.mass(local.time_ps),
                }
            })
            .collect();

        for event_index in matcher.match_cluster(cluster)? {
            let event = matcher.event(event_index);
            let cmp = BcComparison::new(&cfg.axis, n_bc, event);
            let mut delta_t_ps = [None; REFERENCE_CHANNELS];
            for channel in Channel::ALL {
                delta_t_ps[channel.index()] = event.time(channel).map(|t| time_in_bc - t);
            }
            result.matches.push(ReferenceMatch {
                index: event_index,
                orbit: event.orbit,
                bc: event.bc,
                same_bc: cmp.same_bc,
                delta_bc: cmp.delta_bc,
                delta_t_ps,
            });
        }

        debug!(
            timeframe,
            cluster = index,
            size = records.len(),
            t0_ps = consensus.time_ps,
            sigma_ps = consensus.uncertainty_ps,
            n_bc,
            matches = result.matches.len(),
            "cluster resolved"
        );

        result.well_measured = consensus.uncertainty_ps < cfg.max_evtime_error_ps;
        result.n_bc = Some(n_bc);
        result.time_in_bc_ps = Some(time_in_bc);
        result.consensus = Some(consensus);
        Ok(result)
    }
}
