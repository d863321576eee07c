// Consensus interaction time of a cluster

pub mod robust;

pub use robust::RobustMeanEstimator;

use serde::Serialize;

use crate::constants::MAX_ESTIMATOR_MOMENTUM;
use crate::record::Record;

/// Consensus time of a cluster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventTime {
    pub time_ps: f64,
    pub uncertainty_ps: f64,
    /// Records that contributed
    pub multiplicity: usize,
    /// Per-record contribution flags, parallel to the cluster's records
    #[serde(skip)]
    pub used: Vec<bool>,
}

impl EventTime {
    pub fn contributed(&self, index: usize) -> bool {
        self.used.get(index).copied().unwrap_or(false)
    }
}

/// Estimate for one record with its own contribution removed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LocalTime {
    pub time_ps: f64,
    pub uncertainty_ps: f64,
    pub multiplicity: usize,
}

impl From<&EventTime> for LocalTime {
    fn from(ev: &EventTime) -> Self {
        LocalTime {
            time_ps: ev.time_ps,
            uncertainty_ps: ev.uncertainty_ps,
            multiplicity: ev.multiplicity,
        }
    }
}

/// Reduces a cluster of records to one interaction time.
///
/// Implementations must be deterministic for a given record order and
/// eligibility mask, and must not keep state between calls: `unbiased` is
/// called once per record of the same cluster.
pub trait ConsensusEstimator: Send + Sync {
    /// Consensus over the records flagged in `eligible`. At least one record is eligible.
    fn estimate(&self, records: &[Record], eligible: &[bool]) -> EventTime;

    /// Estimate excluding `records[index]`.
    fn unbiased(
        &self,
        records: &[Record],
        eligible: &[bool],
        consensus: &EventTime,
        index: usize,
    ) -> LocalTime;
}

/// Decides whether a record may enter the consensus.
pub trait RecordFilter: Send + Sync {
    fn accept(&self, record: &Record) -> bool;
}

impl<F> RecordFilter for F
where
    F: Fn(&Record) -> bool + Send + Sync,
{
    fn accept(&self, record: &Record) -> bool {
        self(record)
    }
}

/// Keeps records below a momentum limit, where the hypotheses separate well.
#[derive(Debug, Clone, Copy)]
pub struct MomentumFilter {
    pub max_p: f64,
}

impl Default for MomentumFilter {
    fn default() -> Self {
        MomentumFilter {
            max_p: MAX_ESTIMATOR_MOMENTUM,
        }
    }
}

impl RecordFilter for MomentumFilter {
    fn accept(&self, record: &Record) -> bool {
        record.p < self.max_p
    }
}

/// Eligibility mask of `records` under `filter`.
pub fn eligibility(records: &[Record], filter: &dyn RecordFilter) -> Vec<bool> {
    records.iter().map(|r| filter.accept(r)).collect()
}
