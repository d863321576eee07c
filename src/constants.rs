// Shared constants for event-time clustering and reference matching

/// LHC RF frequency (Hz).
pub const LHC_RF_FREQ_HZ: f64 = 400.789e6;

/// Bunch-crossing duration (ps): ten RF buckets.
pub const BC_DURATION_PS: f64 = 10.0 * 1e12 / LHC_RF_FREQ_HZ;

/// Number of bunch crossings per orbit.
pub const MAX_BUNCHES_PER_ORBIT: u32 = 3564;

/// Offset added before flooring a time to a BC number (ps).
pub const HALF_BC_OFFSET_PS: f64 = 5000.0;

/// Maximum distance of a record from its cluster anchor (ps).
pub const GAP_THRESHOLD_PS: f64 = 100e3;

/// Half-width of the reference match window (BC).
pub const MATCH_WINDOW_BC: u32 = 8;

/// Consensus uncertainty below which a cluster counts as well measured (ps).
pub const MAX_EVTIME_ERROR_PS: f64 = 150.0;

/// Records above this momentum (GeV/c) do not enter the consensus.
pub const MAX_ESTIMATOR_MOMENTUM: f64 = 2.0;

/// Inverse speed of light (ps/cm).
pub const C_INV_PS_PER_CM: f64 = 33.35641;

/// Default expected-time resolution per hypothesis when none is supplied (ps).
pub const DEFAULT_EXP_SIGMA_PS: f64 = 120.0;

/// Intrinsic detector time resolution (ps).
pub const DETECTOR_SIGMA_PS: f64 = 80.0;

/// Resolution reported when no record informs an estimate (ps).
pub const MAX_RESOLUTION_PS: f64 = 200.0;

// --- Record selection defaults ---

/// Minimum transverse momentum (GeV/c).
pub const MIN_PT: f64 = 0.1;

/// Maximum |eta|.
pub const ETA_CUT: f64 = 0.8;

/// Minimum number of tracking clusters.
pub const MIN_TRACKING_CLUSTERS: u32 = 40;

/// Number of reference sub-timestamps per event.
pub const REFERENCE_CHANNELS: usize = 4;
