// Synthetic timeframes for demos and end-to-end tests

use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use tracing::debug;

use crate::constants::{C_INV_PS_PER_CM, DEFAULT_EXP_SIGMA_PS, DETECTOR_SIGMA_PS};
use crate::error::ConfigError;
use crate::input::Timeframe;
use crate::record::{ExpectedTimes, Hypothesis, Record};
use crate::reference::{Channel, ReferenceEvent};
use crate::time_axis::TimeAxis;

pub const PION_MASS: f64 = 0.13957;
pub const KAON_MASS: f64 = 0.493677;
pub const PROTON_MASS: f64 = 0.938272;

fn mass_of(h: Hypothesis) -> f64 {
    match h {
        Hypothesis::Pion => PION_MASS,
        Hypothesis::Kaon => KAON_MASS,
        Hypothesis::Proton => PROTON_MASS,
    }
}

/// Flight time (ps) over `length_cm` for momentum `p` and mass `m`.
pub fn flight_time(length_cm: f64, p: f64, m: f64) -> f64 {
    let beta = p / (p * p + m * m).sqrt();
    length_cm * C_INV_PS_PER_CM / beta
}

/// Generator settings.
#[derive(Debug, Clone)]
pub struct SimulationParams {
    pub axis: TimeAxis,
    pub interactions: usize,
    /// Interactions sit on a grid of this many BCs, jittered within the first half
    pub spacing_bc: u32,
    pub min_tracks: usize,
    pub max_tracks: usize,
    /// Relative abundance of pions, kaons, protons
    pub fractions: [f64; 3],
    pub p_range: (f64, f64),
    pub time_resolution_ps: f64,
    /// Spread of the interaction time around its BC start (ps)
    pub interaction_spread_ps: f64,
    /// Probability that the reference detector saw an interaction
    pub reference_efficiency: f64,
    pub reference_resolution_ps: f64,
}

impl Default for SimulationParams {
    fn default() -> Self {
        SimulationParams {
            axis: TimeAxis::lhc(),
            interactions: 200,
            spacing_bc: 40,
            min_tracks: 2,
            max_tracks: 12,
            fractions: [0.8, 0.12, 0.08],
            p_range: (0.3, 3.0),
            time_resolution_ps: DETECTOR_SIGMA_PS,
            interaction_spread_ps: 50.0,
            reference_efficiency: 0.9,
            reference_resolution_ps: 20.0,
        }
    }
}

impl SimulationParams {
    /// Orbits spanned by one generated timeframe, rounded up.
    pub fn orbits_per_timeframe(&self) -> u64 {
        (self.interactions as u64 * u64::from(self.spacing_bc)) / u64::from(self.axis.max_bunches())
            + 1
    }

    /// First orbit of the `index`-th of back-to-back generated timeframes.
    pub fn first_orbit(&self, index: u64) -> Result<u32, ConfigError> {
        index
            .checked_mul(self.orbits_per_timeframe())
            .and_then(|orbit| u32::try_from(orbit).ok())
            .ok_or(ConfigError::OrbitOverflow { timeframe: index })
    }
}

fn gaussian<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    StandardNormal.sample(rng)
}

fn pick_species<R: Rng + ?Sized>(rng: &mut R, fractions: &[f64; 3]) -> Hypothesis {
    let total: f64 = fractions.iter().sum();
    let mut x = rng.gen_range(0.0..total.max(f64::MIN_POSITIVE));
    for h in Hypothesis::ALL {
        let f = fractions[h.index()];
        if x < f {
            return h;
        }
        x -= f;
    }
    Hypothesis::Pion
}

/// Generate one timeframe. Records and reference events come out unordered.
pub fn generate<R: Rng + ?Sized>(
    timeframe: u64,
    first_orbit: u32,
    params: &SimulationParams,
    rng: &mut R,
) -> Timeframe {
    let axis = &params.axis;
    let bc_ps = axis.bc_duration_ps();
    let orbit_len = u64::from(axis.max_bunches());
    let jitter = (params.spacing_bc / 2).max(1);

    let mut tf = Timeframe::empty(timeframe, first_orbit);
    let mut next_id = 0u64;

    for k in 0..params.interactions {
        let global_bc = k as u64 * u64::from(params.spacing_bc) + u64::from(rng.gen_range(0..jitter));
        let offset = gaussian(rng) * params.interaction_spread_ps;
        let t0 = global_bc as f64 * bc_ps + offset;

        let n_tracks = rng.gen_range(params.min_tracks..=params.max_tracks.max(params.min_tracks));
        for _ in 0..n_tracks {
            let species = pick_species(rng, &params.fractions);
            let p = rng.gen_range(params.p_range.0..=params.p_range.1);
            let eta: f64 = rng.gen_range(-0.8..=0.8);
            let length_cm = rng.gen_range(370.0..=420.0);
            let expected = ExpectedTimes {
                pion: flight_time(length_cm, p, PION_MASS),
                kaon: flight_time(length_cm, p, KAON_MASS),
                proton: flight_time(length_cm, p, PROTON_MASS),
            };
            let tof = flight_time(length_cm, p, mass_of(species));
            tf.records.push(Record {
                id: next_id,
                time_ps: t0 + tof + gaussian(rng) * params.time_resolution_ps,
                expected,
                exp_sigma_ps: DEFAULT_EXP_SIGMA_PS,
                p,
                pt: p / eta.cosh(),
                eta,
                length_cm,
                n_clusters: rng.gen_range(60..=150),
            });
            next_id += 1;
        }

        if rng.gen_bool(params.reference_efficiency.clamp(0.0, 1.0)) {
            let orbit = u64::from(first_orbit) + global_bc / orbit_len;
            let bc = (global_bc % orbit_len) as u32;
            let sigma = params.reference_resolution_ps;
            let event = ReferenceEvent::new(orbit as u32, bc)
                .with_time(Channel::Combined, offset + gaussian(rng) * sigma)
                .with_time(Channel::SideA, offset + gaussian(rng) * sigma * 1.4)
                .with_time(Channel::SideC, offset + gaussian(rng) * sigma * 1.4);
            tf.reference.push(event);
        }
    }

    tf.records.shuffle(rng);
    tf.reference.shuffle(rng);
    debug!(
        timeframe,
        records = tf.records.len(),
        reference = tf.reference.len(),
        "generated timeframe"
    );
    tf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Pipeline, PipelineConfig};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::atomic::AtomicBool;

    fn pions_only() -> SimulationParams {
        SimulationParams {
            interactions: 50,
            fractions: [1.0, 0.0, 0.0],
            reference_efficiency: 1.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_flight_time() {
        // ultra-relativistic limit
        let t = flight_time(300.0, 1000.0, PION_MASS);
        assert!((t - 300.0 * C_INV_PS_PER_CM).abs() < 0.01);
        assert!(flight_time(380.0, 1.0, PROTON_MASS) > flight_time(380.0, 1.0, KAON_MASS));
    }

    #[test]
    fn test_first_orbit() {
        let params = SimulationParams::default();
        // 200 interactions x 40 BC = 8000 BC
        assert_eq!(params.orbits_per_timeframe(), 3);
        assert_eq!(params.first_orbit(0), Ok(0));
        assert_eq!(params.first_orbit(5), Ok(15));
        assert_eq!(
            params.first_orbit(u64::from(u32::MAX)),
            Err(ConfigError::OrbitOverflow {
                timeframe: u64::from(u32::MAX)
            })
        );
    }

    #[test]
    fn test_gaussian_moments() {
        let mut rng = StdRng::seed_from_u64(3);
        let xs: Vec<f64> = (0..20_000).map(|_| gaussian(&mut rng)).collect();
        let mean = xs.iter().sum::<f64>() / xs.len() as f64;
        let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / xs.len() as f64;
        assert!(mean.abs() < 0.05, "mean {mean}");
        assert!((var.sqrt() - 1.0).abs() < 0.05, "sigma {}", var.sqrt());
    }

    #[test]
    fn test_seeded_generation_is_reproducible() {
        let params = pions_only();
        let a = generate(1, 100, &params, &mut StdRng::seed_from_u64(42));
        let b = generate(1, 100, &params, &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
        assert_eq!(a.reference.len(), 50);
        assert!(a.records.len() >= 100);
        assert!(a.reference.iter().all(|e| e.bc < 3564 && e.orbit >= 100));
    }

    #[test]
    fn test_generated_timeframe_matches_same_bc() {
        let params = pions_only();
        let tf = generate(3, 2000, &params, &mut StdRng::seed_from_u64(7));
        let pipeline = Pipeline::new(PipelineConfig::default());
        let mut results = Vec::new();
        let summary = pipeline
            .process(tf, &AtomicBool::new(false), |r| results.push(r))
            .unwrap();

        assert_eq!(summary.clusters, 50);
        let with_consensus: Vec<_> = results.iter().filter(|r| r.consensus.is_some()).collect();
        assert!(!with_consensus.is_empty());
        for r in with_consensus {
            assert!(r.matches.iter().any(|m| m.same_bc), "cluster {} has no same-BC match", r.cluster);
            let same = r.matches.iter().find(|m| m.same_bc).unwrap();
            let dt = same.delta(Channel::Combined).unwrap();
            assert!(dt.abs() < 1000.0, "delta {dt}");
        }
    }

    #[test]
    fn test_no_reference_when_inefficient() {
        let params = SimulationParams {
            interactions: 10,
            reference_efficiency: 0.0,
            ..Default::default()
        };
        let tf = generate(0, 0, &params, &mut StdRng::seed_from_u64(1));
        assert!(tf.reference.is_empty());
        assert!(!tf.records.is_empty());
    }
}
