// Window clustering of time-sorted records

use tracing::debug;

use crate::constants::GAP_THRESHOLD_PS;
use crate::error::ConfigError;
use crate::record::Record;

/// Records that plausibly come from one interaction, sorted by time.
///
/// Never empty: every cluster is opened by its anchor record.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    records: Vec<Record>,
}

impl Cluster {
    fn open(anchor: Record) -> Self {
        Cluster {
            records: vec![anchor],
        }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// First record; all others lie within the gap threshold of it.
    pub fn anchor(&self) -> &Record {
        &self.records[0]
    }

    pub fn first_time(&self) -> f64 {
        self.records[0].time_ps
    }

    pub fn last_time(&self) -> f64 {
        self.records[self.records.len() - 1].time_ps
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }
}

/// Partitions records into clusters anchored at their earliest member.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowClusterer {
    gap_threshold_ps: f64,
}

impl WindowClusterer {
    pub fn new(gap_threshold_ps: f64) -> Result<Self, ConfigError> {
        if !gap_threshold_ps.is_finite() || gap_threshold_ps < 0.0 {
            return Err(ConfigError::InvalidGapThreshold(gap_threshold_ps));
        }
        Ok(WindowClusterer { gap_threshold_ps })
    }

    pub fn gap_threshold_ps(&self) -> f64 {
        self.gap_threshold_ps
    }

    /// Sort `records` by time (stable) and split them into clusters.
    ///
    /// A record joins the open cluster when it lies within the gap threshold of
    /// that cluster's anchor, not of the previous record, so a long train of
    /// closely spaced records is still split once it spans more than the gap.
    /// Records with a NaN or infinite time are left out.
    pub fn cluster(&self, mut records: Vec<Record>) -> Vec<Cluster> {
        let before = records.len();
        records.retain(|r| r.time_ps.is_finite());
        if records.len() < before {
            debug!(dropped = before - records.len(), "non-finite record times");
        }
        records.sort_by(|a, b| a.time_ps.total_cmp(&b.time_ps));

        let mut clusters: Vec<Cluster> = Vec::new();
        let mut iter = records.into_iter();
        let Some(first) = iter.next() else {
            return clusters;
        };

        let mut current = Cluster::open(first);
        for record in iter {
            if record.time_ps - current.first_time() > self.gap_threshold_ps {
                clusters.push(current);
                current = Cluster::open(record);
            } else {
                current.records.push(record);
            }
        }
        clusters.push(current);

        debug!(
            clusters = clusters.len(),
            gap_ps = self.gap_threshold_ps,
            "clustered records"
        );
        clusters
    }
}

impl Default for WindowClusterer {
    fn default() -> Self {
        WindowClusterer {
            gap_threshold_ps: GAP_THRESHOLD_PS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::test_record;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn records_at(times: &[f64]) -> Vec<Record> {
        times
            .iter()
            .enumerate()
            .map(|(i, &t)| test_record(i as u64, t))
            .collect()
    }

    fn times_of(clusters: &[Cluster]) -> Vec<Vec<f64>> {
        clusters
            .iter()
            .map(|c| c.records().iter().map(|r| r.time_ps).collect())
            .collect()
    }

    #[test]
    fn test_rejects_bad_gap() {
        assert!(WindowClusterer::new(-1.0).is_err());
        assert!(WindowClusterer::new(f64::INFINITY).is_err());
        assert!(WindowClusterer::new(0.0).is_ok());
    }

    #[test]
    fn test_empty_input() {
        let clusterer = WindowClusterer::default();
        assert!(clusterer.cluster(Vec::new()).is_empty());
    }

    #[test]
    fn test_singleton() {
        let clusters = WindowClusterer::default().cluster(records_at(&[42.0]));
        assert_eq!(times_of(&clusters), vec![vec![42.0]]);
    }

    #[test]
    fn test_basic_split() {
        let clusters =
            WindowClusterer::default().cluster(records_at(&[0.0, 50_000.0, 90_000.0, 300_000.0]));
        assert_eq!(
            times_of(&clusters),
            vec![vec![0.0, 50_000.0, 90_000.0], vec![300_000.0]]
        );
    }

    #[test]
    fn test_anchor_not_previous_record() {
        // 110000 is within 100000 of 60000 but not of the anchor at 0
        let clusters = WindowClusterer::default().cluster(records_at(&[0.0, 60_000.0, 110_000.0]));
        assert_eq!(times_of(&clusters), vec![vec![0.0, 60_000.0], vec![110_000.0]]);
    }

    #[test]
    fn test_boundary_is_inclusive() {
        let clusters = WindowClusterer::default().cluster(records_at(&[0.0, 100_000.0]));
        assert_eq!(clusters.len(), 1);
    }

    #[test]
    fn test_unsorted_input_and_stable_ties() {
        let mut records = records_at(&[200_000.0, 10.0, 10.0, 5.0]);
        records[1].id = 100;
        records[2].id = 200;
        let clusters = WindowClusterer::default().cluster(records);
        assert_eq!(times_of(&clusters), vec![vec![5.0, 10.0, 10.0], vec![200_000.0]]);
        let ids: Vec<u64> = clusters[0].records().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 100, 200]);
    }

    #[test]
    fn test_partition_and_gap_properties() {
        let mut rng = StdRng::seed_from_u64(0x2545F491);
        let times: Vec<f64> = (0..500)
            .map(|_| f64::from(rng.gen_range(0..20_000_000u32)))
            .collect();
        let clusterer = WindowClusterer::default();
        let clusters = clusterer.cluster(records_at(&times));

        let total: usize = clusters.iter().map(|c| c.len()).sum();
        assert_eq!(total, times.len());
        let mut ids: Vec<u64> = clusters
            .iter()
            .flat_map(|c| c.records().iter().map(|r| r.id))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), times.len());

        for c in &clusters {
            assert!(!c.is_empty());
            for pair in c.records().windows(2) {
                assert!(pair[0].time_ps <= pair[1].time_ps);
                assert!(pair[1].time_ps - pair[0].time_ps <= clusterer.gap_threshold_ps());
            }
            assert!(c.last_time() - c.first_time() <= clusterer.gap_threshold_ps());
        }
        for pair in clusters.windows(2) {
            assert!(pair[0].last_time() <= pair[1].first_time());
            assert!(pair[1].first_time() - pair[0].anchor().time_ps > clusterer.gap_threshold_ps());
        }
    }

    #[test]
    fn test_non_finite_times_left_out() {
        let clusters =
            WindowClusterer::default().cluster(records_at(&[0.0, 50_000.0, f64::NAN]));
        assert_eq!(times_of(&clusters), vec![vec![0.0, 50_000.0]]);

        let clusters = WindowClusterer::default().cluster(records_at(&[
            0.0,
            1e7,
            -f64::NAN,
            f64::NEG_INFINITY,
        ]));
        assert_eq!(times_of(&clusters), vec![vec![0.0], vec![1e7]]);
    }

    #[test]
    fn test_reclustering_is_idempotent() {
        let times: Vec<f64> = (0..200).map(|i| (i * 37_000 % 1_900_000) as f64).collect();
        let clusterer = WindowClusterer::default();
        let first = clusterer.cluster(records_at(&times));
        let flat: Vec<Record> = first.iter().cloned().flat_map(Cluster::into_records).collect();
        let second = clusterer.cluster(flat);
        assert_eq!(first, second);
    }
}
