// Time-of-flight candidate records

use serde::{Deserialize, Serialize};

use crate::constants::{C_INV_PS_PER_CM, DEFAULT_EXP_SIGMA_PS};

/// Mass hypothesis for the expected time of flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hypothesis {
    Pion,
    Kaon,
    Proton,
}

impl Hypothesis {
    pub const ALL: [Hypothesis; 3] = [Hypothesis::Pion, Hypothesis::Kaon, Hypothesis::Proton];

    pub fn index(self) -> usize {
        match self {
            Hypothesis::Pion => 0,
            Hypothesis::Kaon => 1,
            Hypothesis::Proton => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Hypothesis::Pion => "pion",
            Hypothesis::Kaon => "kaon",
            Hypothesis::Proton => "proton",
        }
    }
}

/// Expected flight time per hypothesis (ps), indexed by `Hypothesis::index`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExpectedTimes {
    pub pion: f64,
    pub kaon: f64,
    pub proton: f64,
}

impl ExpectedTimes {
    pub fn get(&self, h: Hypothesis) -> f64 {
        match h {
            Hypothesis::Pion => self.pion,
            Hypothesis::Kaon => self.kaon,
            Hypothesis::Proton => self.proton,
        }
    }
}

fn default_exp_sigma() -> f64 {
    DEFAULT_EXP_SIGMA_PS
}

/// A single time measurement matched to a track.
///
/// `time_ps` is on the timeframe's continuous axis (0 = start of first orbit).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Identity within the timeframe
    pub id: u64,
    /// Measured arrival time (ps)
    pub time_ps: f64,
    /// Expected flight times from the interaction point (ps)
    pub expected: ExpectedTimes,
    /// Resolution of the expected times (ps)
    #[serde(default = "default_exp_sigma")]
    pub exp_sigma_ps: f64,
    /// Total momentum (GeV/c)
    pub p: f64,
    /// Transverse momentum (GeV/c)
    pub pt: f64,
    pub eta: f64,
    /// Integrated track length (cm)
    pub length_cm: f64,
    /// Clusters attached in the tracking detector
    #[serde(default)]
    pub n_clusters: u32,
}

impl Record {
    /// Arrival time minus expected time: this record's estimate of the interaction time.
    pub fn t0_candidate(&self, h: Hypothesis) -> f64 {
        self.time_ps - self.expected.get(h)
    }

    /// Measured-minus-expected flight time given an interaction time.
    pub fn delta_t(&self, t0_ps: f64, h: Hypothesis) -> f64 {
        self.time_ps - t0_ps - self.expected.get(h)
    }

    /// Velocity in units of c given an interaction time.
    pub fn beta(&self, t0_ps: f64) -> f64 {
        self.length_cm / (self.time_ps - t0_ps) * C_INV_PS_PER_CM
    }

    /// Mass (GeV/c^2) from momentum and velocity.
    pub fn mass(&self, t0_ps: f64) -> f64 {
        let beta = self.beta(t0_ps);
        self.p / beta * (1.0 - beta * beta).abs().sqrt()
    }
}

#[cfg(test)]
pub(crate) fn test_record(id: u64, time_ps: f64) -> Record {
    Record {
        id,
        time_ps,
        expected: ExpectedTimes {
            pion: 0.0,
            kaon: 0.0,
            proton: 0.0,
        },
        exp_sigma_ps: DEFAULT_EXP_SIGMA_PS,
        p: 1.0,
        pt: 0.8,
        eta: 0.1,
        length_cm: 380.0,
        n_clusters: 120,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_t0_candidate_and_delta() {
        let mut r = test_record(1, 20_000.0);
        r.expected = ExpectedTimes {
            pion: 13_000.0,
            kaon: 14_500.0,
            proton: 17_000.0,
        };
        assert_eq!(r.t0_candidate(Hypothesis::Pion), 7_000.0);
        assert_eq!(r.t0_candidate(Hypothesis::Proton), 3_000.0);
        assert_eq!(r.delta_t(7_000.0, Hypothesis::Pion), 0.0);
        assert_eq!(r.delta_t(7_000.0, Hypothesis::Kaon), -1_500.0);
    }

    #[test]
    fn test_beta_and_mass() {
        let mut r = test_record(1, 0.0);
        // light at 300 cm takes ~10007 ps
        r.length_cm = 300.0;
        r.time_ps = 300.0 * C_INV_PS_PER_CM;
        assert!((r.beta(0.0) - 1.0).abs() < 1e-9);
        assert!(r.mass(0.0).abs() < 1e-6);

        // beta = 0.5 with p = 1 -> m = sqrt(3)
        r.time_ps = 2.0 * 300.0 * C_INV_PS_PER_CM;
        r.p = 1.0;
        assert!((r.beta(0.0) - 0.5).abs() < 1e-9);
        assert!((r.mass(0.0) - 3.0f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_hypothesis_index_order() {
        for (i, h) in Hypothesis::ALL.iter().enumerate() {
            assert_eq!(h.index(), i);
        }
    }

    #[test]
    fn test_record_json_defaults() {
        let json = r#"{"id":3,"time_ps":1.5,"expected":{"pion":1,"kaon":2,"proton":3},
                      "p":0.9,"pt":0.7,"eta":-0.2,"length_cm":400}"#;
        let r: Record = serde_json::from_str(json).unwrap();
        assert_eq!(r.exp_sigma_ps, DEFAULT_EXP_SIGMA_PS);
        assert_eq!(r.n_clusters, 0);
        assert_eq!(r.expected.get(Hypothesis::Proton), 3.0);
    }
}
