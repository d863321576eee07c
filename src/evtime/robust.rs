// Weighted mean with iterative outlier rejection over mass hypotheses

use crate::constants::{DETECTOR_SIGMA_PS, MAX_RESOLUTION_PS};
use crate::evtime::{ConsensusEstimator, EventTime, LocalTime};
use crate::record::{Hypothesis, Record};

/// Robust consensus estimator.
///
/// Every eligible record proposes one interaction time per mass hypothesis.
/// Starting from the weighted median of the pion proposals, each pass lets
/// every record pick its proposal closest to the current estimate, drops
/// records further than `n_sigma` of their own resolution, and takes the
/// weighted mean of the rest. Passes stop when the surviving set no longer
/// changes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RobustMeanEstimator {
    /// Intrinsic detector resolution added in quadrature (ps)
    pub detector_sigma_ps: f64,
    pub n_sigma: f64,
    pub max_iterations: usize,
    /// Upper bound on the reported uncertainty (ps)
    pub max_resolution_ps: f64,
}

impl Default for RobustMeanEstimator {
    fn default() -> Self {
        RobustMeanEstimator {
            detector_sigma_ps: DETECTOR_SIGMA_PS,
            n_sigma: 3.0,
            max_iterations: 10,
            max_resolution_ps: MAX_RESOLUTION_PS,
        }
    }
}

struct Solution {
    time_ps: f64,
    sum_w: f64,
    used: Vec<bool>,
}

impl RobustMeanEstimator {
    fn sigma(&self, record: &Record) -> f64 {
        (record.exp_sigma_ps.powi(2) + self.detector_sigma_ps.powi(2)).sqrt()
    }

    fn uncertainty(&self, sum_w: f64) -> f64 {
        if sum_w > 0.0 {
            (1.0 / sum_w.sqrt()).min(self.max_resolution_ps)
        } else {
            self.max_resolution_ps
        }
    }

    fn nearest_candidate(record: &Record, estimate: f64) -> f64 {
        let mut best = record.t0_candidate(Hypothesis::Pion);
        for h in &Hypothesis::ALL[1..] {
            let c = record.t0_candidate(*h);
            if (c - estimate).abs() < (best - estimate).abs() {
                best = c;
            }
        }
        best
    }

    fn solve(&self, records: &[Record], eligible: &[bool], skip: Option<usize>) -> Option<Solution> {
        let candidates: Vec<usize> = (0..records.len())
            .filter(|&i| eligible.get(i).copied().unwrap_or(false) && Some(i) != skip)
            .collect();
        if candidates.is_empty() {
            return None;
        }
        let weights: Vec<f64> = candidates
            .iter()
            .map(|&i| 1.0 / self.sigma(&records[i]).powi(2))
            .collect();

        let mut pion: Vec<(f64, f64)> = candidates
            .iter()
            .zip(&weights)
            .map(|(&i, &w)| (records[i].t0_candidate(Hypothesis::Pion), w))
            .collect();
        let mut estimate = weighted_median(&mut pion);

        let mut accepted: Vec<bool> = vec![false; candidates.len()];
        let mut sum_w = 0.0;
        for _ in 0..self.max_iterations {
            let mut next = vec![false; candidates.len()];
            let mut sum_wt = 0.0;
            let mut next_sum_w = 0.0;
            for (k, &i) in candidates.iter().enumerate() {
                let record = &records[i];
                let c = Self::nearest_candidate(record, estimate);
                if (c - estimate).abs() <= self.n_sigma * self.sigma(record) {
                    next[k] = true;
                    sum_wt += weights[k] * c;
                    next_sum_w += weights[k];
                }
            }
            if next_sum_w == 0.0 {
                accepted = next;
                sum_w = 0.0;
                break;
            }
            estimate = sum_wt / next_sum_w;
            sum_w = next_sum_w;
            let converged = next == accepted;
            accepted = next;
            if converged {
                break;
            }
        }

        if sum_w == 0.0 {
            // nothing compatible: plain weighted mean of pion proposals
            let total: f64 = pion.iter().map(|(_, w)| w).sum();
            let mean = pion.iter().map(|(c, w)| c * w).sum::<f64>() / total;
            accepted = vec![true; candidates.len()];
            estimate = mean;
            sum_w = total;
        }

        let mut used = vec![false; records.len()];
        for (k, &i) in candidates.iter().enumerate() {
            used[i] = accepted[k];
        }
        Some(Solution {
            time_ps: estimate,
            sum_w,
            used,
        })
    }
}

/// Weighted median of `(value, weight)` pairs; sorts in place.
fn weighted_median(values: &mut [(f64, f64)]) -> f64 {
    values.sort_by(|a, b| a.0.total_cmp(&b.0));
    let total: f64 = values.iter().map(|(_, w)| w).sum();
    let mut acc = 0.0;
    for &(v, w) in values.iter() {
        acc += w;
        if acc >= total / 2.0 {
            return v;
        }
    }
    values[values.len() - 1].0
}

impl ConsensusEstimator for RobustMeanEstimator {
    fn estimate(&self, records: &[Record], eligible: &[bool]) -> EventTime {
        match self.solve(records, eligible, None) {
            Some(sol) => EventTime {
                time_ps: sol.time_ps,
                uncertainty_ps: self.uncertainty(sol.sum_w),
                multiplicity: sol.used.iter().filter(|&&u| u).count(),
                used: sol.used,
            },
            None => EventTime {
                time_ps: 0.0,
                uncertainty_ps: self.max_resolution_ps,
                multiplicity: 0,
                used: vec![false; records.len()],
            },
        }
    }

    fn unbiased(
        &self,
        records: &[Record],
        eligible: &[bool],
        consensus: &EventTime,
        index: usize,
    ) -> LocalTime {
        if !consensus.contributed(index) {
            return LocalTime::from(consensus);
        }
        match self.solve(records, eligible, Some(index)) {
            Some(sol) => LocalTime {
                time_ps: sol.time_ps,
                uncertainty_ps: self.uncertainty(sol.sum_w),
                multiplicity: sol.used.iter().filter(|&&u| u).count(),
            },
            None => LocalTime {
                time_ps: 0.0,
                uncertainty_ps: self.max_resolution_ps,
                multiplicity: 0,
            },
        }
    }
}
