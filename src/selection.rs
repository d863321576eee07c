// Threshold selection of candidate records

use crate::constants::{ETA_CUT, MIN_PT, MIN_TRACKING_CLUSTERS};
use crate::error::ConfigError;
use crate::record::Record;

/// Quality cuts applied before clustering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackCuts {
    pub min_pt: f64,
    pub max_abs_eta: f64,
    pub min_clusters: u32,
}

impl TrackCuts {
    pub fn new(min_pt: f64, max_abs_eta: f64, min_clusters: u32) -> Result<Self, ConfigError> {
        if !min_pt.is_finite() {
            return Err(ConfigError::NonFinite {
                name: "min_pt",
                value: min_pt,
            });
        }
        if !max_abs_eta.is_finite() {
            return Err(ConfigError::NonFinite {
                name: "eta_cut",
                value: max_abs_eta,
            });
        }
        Ok(TrackCuts {
            min_pt,
            max_abs_eta,
            min_clusters,
        })
    }

    /// Cuts that accept every record.
    pub fn none() -> Self {
        TrackCuts {
            min_pt: f64::NEG_INFINITY,
            max_abs_eta: f64::INFINITY,
            min_clusters: 0,
        }
    }

    pub fn accept(&self, record: &Record) -> bool {
        record.pt >= self.min_pt
            && record.eta.abs() <= self.max_abs_eta
            && record.n_clusters >= self.min_clusters
    }

    /// Keep the records passing all cuts.
    pub fn apply(&self, records: Vec<Record>) -> Vec<Record> {
        records.into_iter().filter(|r| self.accept(r)).collect()
    }
}

impl Default for TrackCuts {
    fn default() -> Self {
        TrackCuts {
            min_pt: MIN_PT,
            max_abs_eta: ETA_CUT,
            min_clusters: MIN_TRACKING_CLUSTERS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::test_record;

    #[test]
    fn test_default_cuts() {
        let cuts = TrackCuts::default();
        let good = test_record(0, 0.0);
        assert!(cuts.accept(&good));

        let mut low_pt = good.clone();
        low_pt.pt = 0.05;
        assert!(!cuts.accept(&low_pt));

        let mut forward = good.clone();
        forward.eta = -0.9;
        assert!(!cuts.accept(&forward));

        let mut short = good.clone();
        short.n_clusters = 39;
        assert!(!cuts.accept(&short));
    }

    #[test]
    fn test_apply_keeps_order() {
        let mut records: Vec<Record> = (0..4).map(|i| test_record(i, i as f64)).collect();
        records[1].pt = 0.0;
        let kept: Vec<u64> = TrackCuts::default().apply(records).iter().map(|r| r.id).collect();
        assert_eq!(kept, vec![0, 2, 3]);
    }

    #[test]
    fn test_none_accepts_all() {
        let mut r = test_record(0, 0.0);
        r.pt = 0.0;
        r.eta = 5.0;
        r.n_clusters = 0;
        assert!(TrackCuts::none().accept(&r));
    }

    #[test]
    fn test_rejects_non_finite() {
        assert!(TrackCuts::new(f64::NAN, 0.8, 40).is_err());
        assert!(TrackCuts::new(0.1, f64::INFINITY, 40).is_err());
    }
}
