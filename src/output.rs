// Result sinks: CSV rows, JSON lines and the run summary

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::pipeline::{ClusterResult, TimeframeSummary};
use crate::record::Hypothesis;
use crate::reference::Channel;

/// Append-only consumer of pipeline results.
///
/// Results of different timeframes may arrive interleaved.
pub trait ResultSink: Send {
    fn handle_cluster(&mut self, result: &ClusterResult);

    fn handle_summary(&mut self, _summary: &TimeframeSummary) {}

    /// Flush buffered output. Called once after the last result.
    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// CSV output: one row per matched reference event.
pub struct CsvOutput<W: Write + Send> {
    writer: W,
    header_written: bool,
}

impl CsvOutput<BufWriter<File>> {
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(CsvOutput::new(BufWriter::new(file)))
    }
}

impl<W: Write + Send> CsvOutput<W> {
    pub fn new(writer: W) -> Self {
        CsvOutput {
            writer,
            header_written: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_rows(&mut self, result: &ClusterResult) -> io::Result<()> {
        if !self.header_written {
            writeln!(
                self.writer,
                "timeframe,cluster,t0_ps,t0_sigma_ps,multiplicity,n_bc,t0_in_bc_ps,orbit,bc,same_bc,delta_bc,dt_ac_ps,dt_a_ps,dt_c_ps,dt_aux_ps"
            )?;
            self.header_written = true;
        }
        let (Some(consensus), Some(n_bc), Some(t_in_bc)) =
            (&result.consensus, result.n_bc, result.time_in_bc_ps)
        else {
            return Ok(());
        };
        for m in &result.matches {
            let dt: Vec<String> = Channel::ALL
                .iter()
                .map(|&c| m.delta(c).map(|v| format!("{:.1}", v)).unwrap_or_default())
                .collect();
            writeln!(
                self.writer,
                "{},{},{:.1},{:.1},{},{},{:.1},{},{},{},{},{}",
                result.timeframe,
                result.cluster,
                consensus.time_ps,
                consensus.uncertainty_ps,
                consensus.multiplicity,
                n_bc,
                t_in_bc,
                m.orbit,
                m.bc,
                u8::from(m.same_bc),
                m.delta_bc,
                dt.join(",")
            )?;
        }
        Ok(())
    }
}

impl<W: Write + Send> ResultSink for CsvOutput<W> {
    fn handle_cluster(&mut self, result: &ClusterResult) {
        if let Err(e) = self.write_rows(result) {
            tracing::error!("Failed to write CSV: {}", e);
        }
    }

    fn finish(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// JSON-lines output: one serialized cluster result per line.
pub struct JsonOutput<W: Write + Send> {
    writer: W,
}

impl JsonOutput<BufWriter<File>> {
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(JsonOutput::new(BufWriter::new(file)))
    }
}

impl<W: Write + Send> JsonOutput<W> {
    pub fn new(writer: W) -> Self {
        JsonOutput { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> ResultSink for JsonOutput<W> {
    fn handle_cluster(&mut self, result: &ClusterResult) {
        let line = serde_json::to_string(result)
            .map_err(io::Error::from)
            .and_then(|s| writeln!(self.writer, "{}", s));
        if let Err(e) = line {
            tracing::error!("Failed to write JSON: {}", e);
        }
    }

    fn finish(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Running mean and spread (Welford).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningStats {
    n: u64,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    pub fn push(&mut self, x: f64) {
        self.n += 1;
        let d = x - self.mean;
        self.mean += d / self.n as f64;
        self.m2 += d * (x - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.n
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn rms(&self) -> f64 {
        if self.n < 2 {
            0.0
        } else {
            (self.m2 / self.n as f64).sqrt()
        }
    }
}

impl Serialize for RunningStats {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("RunningStats", 3)?;
        s.serialize_field("n", &self.n)?;
        s.serialize_field("mean", &self.mean)?;
        s.serialize_field("rms", &self.rms())?;
        s.end()
    }
}

/// Range of the delta-BC distribution, `[-DELTA_BC_RANGE, DELTA_BC_RANGE)`.
const DELTA_BC_RANGE: i64 = 8;

/// Momentum window (GeV/c) where pions are cleanly separated from kaons.
const PION_WINDOW_P: (f64, f64) = (0.7, 1.1);

/// Timing-agreement summary of a whole run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub timeframes: u64,
    pub aborted_timeframes: u64,
    pub records: u64,
    pub selected: u64,
    pub clusters: u64,
    pub skipped_clusters: u64,
    pub well_measured: u64,
    pub matches: u64,
    pub same_bc_matches: u64,
    /// Consensus BC minus reference BC, well-measured clusters only
    pub delta_bc: BTreeMap<i64, u64>,
    pub delta_bc_outside: u64,
    /// Consensus-minus-reference time per channel
    pub delta_t: BTreeMap<&'static str, RunningStats>,
    pub delta_t_same_bc: BTreeMap<&'static str, RunningStats>,
    /// Consensus time within its BC
    pub t0_in_bc: RunningStats,
    /// Per-record residuals against the leave-one-out time
    pub residuals: BTreeMap<&'static str, RunningStats>,
    /// Consensus uncertainty by multiplicity
    pub resolution_by_multiplicity: BTreeMap<usize, RunningStats>,
    /// Reconstructed mass and velocity against the leave-one-out time
    pub mass: RunningStats,
    pub beta: RunningStats,
    /// Pion residual of records inside the momentum window
    pub pion_window: RunningStats,
    pub pion_window_by_multiplicity: BTreeMap<usize, RunningStats>,
}

impl RunSummary {
    pub fn add_cluster(&mut self, result: &ClusterResult) {
        let (Some(consensus), Some(t_in_bc)) = (&result.consensus, result.time_in_bc_ps) else {
            return;
        };
        self.resolution_by_multiplicity
            .entry(consensus.multiplicity)
            .or_default()
            .push(consensus.uncertainty_ps);
        for r in &result.records {
            for h in Hypothesis::ALL {
                self.residuals
                    .entry(h.as_str())
                    .or_default()
                    .push(r.delta_t_ps.get(h));
            }
            if r.mass.is_finite() {
                self.mass.push(r.mass);
            }
            if r.beta.is_finite() {
                self.beta.push(r.beta);
            }
            if r.p > PION_WINDOW_P.0 && r.p < PION_WINDOW_P.1 {
                self.pion_window.push(r.delta_t_ps.pion);
                self.pion_window_by_multiplicity
                    .entry(consensus.multiplicity)
                    .or_default()
                    .push(r.delta_t_ps.pion);
            }
        }
        if !result.well_measured {
            return;
        }
        self.t0_in_bc.push(t_in_bc);
        for m in &result.matches {
            if (-DELTA_BC_RANGE..DELTA_BC_RANGE).contains(&m.delta_bc) {
                *self.delta_bc.entry(m.delta_bc).or_default() += 1;
            } else {
                self.delta_bc_outside += 1;
            }
            for channel in Channel::ALL {
                let Some(dt) = m.delta(channel) else {
                    continue;
                };
                self.delta_t.entry(channel.as_str()).or_default().push(dt);
                if m.same_bc {
                    self.delta_t_same_bc
                        .entry(channel.as_str())
                        .or_default()
                        .push(dt);
                }
            }
        }
    }

    pub fn add_timeframe(&mut self, summary: &TimeframeSummary) {
        self.timeframes += 1;
        self.aborted_timeframes += u64::from(summary.aborted);
        self.records += summary.records_in as u64;
        self.selected += summary.records_selected as u64;
        self.clusters += summary.clusters as u64;
        self.skipped_clusters += summary.skipped_clusters as u64;
        self.well_measured += summary.well_measured as u64;
        self.matches += summary.matches as u64;
        self.same_bc_matches += summary.same_bc_matches as u64;
    }
}

/// Aggregates a `RunSummary` and writes it as `summary.json` in the work directory.
pub struct SummaryOutput {
    work_dir: Option<PathBuf>,
    summary: RunSummary,
}

impl SummaryOutput {
    pub fn new(work_dir: Option<PathBuf>) -> Self {
        SummaryOutput {
            work_dir,
            summary: RunSummary::default(),
        }
    }
}

impl ResultSink for SummaryOutput {
    fn handle_cluster(&mut self, result: &ClusterResult) {
        self.summary.add_cluster(result);
    }

    fn handle_summary(&mut self, summary: &TimeframeSummary) {
        self.summary.add_timeframe(summary);
    }

    fn finish(&mut self) -> io::Result<()> {
        let s = &self.summary;
        info!(
            "Summary: {} timeframes, {} clusters ({} skipped), {} matches, {} same BC",
            s.timeframes, s.clusters, s.skipped_clusters, s.matches, s.same_bc_matches
        );
        let Some(dir) = &self.work_dir else {
            return Ok(());
        };
        std::fs::create_dir_all(dir)?;
        let path = dir.join("summary.json");
        let file = BufWriter::new(File::create(&path)?);
        serde_json::to_writer_pretty(file, s)?;
        info!("write_summary: {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evtime::{EventTime, LocalTime};
    use crate::pipeline::{PerHypothesis, RecordResidual, ReferenceMatch};

    fn result(well_measured: bool) -> ClusterResult {
        ClusterResult {
            timeframe: 4,
            cluster: 2,
            first_ps: 100.0,
            last_ps: 200.0,
            size: 2,
            consensus: Some(EventTime {
                time_ps: 50_040.0,
                uncertainty_ps: 60.0,
                multiplicity: 2,
                used: vec![true, true],
            }),
            n_bc: Some(2),
            time_in_bc_ps: Some(40.0),
            well_measured,
            records: vec![RecordResidual {
                id: 1,
                time_ps: 63_000.0,
                p: 1.0,
                pt: 0.9,
                contributed: true,
                local: LocalTime {
                    time_ps: 50_000.0,
                    uncertainty_ps: 80.0,
                    multiplicity: 1,
                },
                delta_t_ps: PerHypothesis {
                    pion: 10.0,
                    kaon: -900.0,
                    proton: -2900.0,
                },
                beta: 0.95,
                mass: 0.14,
            }],
            matches: vec![
                ReferenceMatch {
                    index: 0,
                    orbit: 10,
                    bc: 2,
                    same_bc: true,
                    delta_bc: 0,
                    delta_t_ps: [Some(15.0), None, Some(-5.0), None],
                },
                ReferenceMatch {
                    index: 1,
                    orbit: 10,
                    bc: 30,
                    same_bc: false,
                    delta_bc: -28,
                    delta_t_ps: [Some(100.0), None, None, None],
                },
            ],
        }
    }

    #[test]
    fn test_running_stats() {
        let mut s = RunningStats::default();
        for x in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            s.push(x);
        }
        assert_eq!(s.count(), 8);
        assert!((s.mean() - 5.0).abs() < 1e-12);
        assert!((s.rms() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_csv_rows() {
        let mut out = CsvOutput::new(Vec::new());
        out.handle_cluster(&result(true));
        let text = String::from_utf8(out.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("timeframe,cluster"));
        assert_eq!(lines[1], "4,2,50040.0,60.0,2,2,40.0,10,2,1,0,15.0,,-5.0,");
        assert_eq!(lines[2], "4,2,50040.0,60.0,2,2,40.0,10,30,0,-28,100.0,,,");
    }

    #[test]
    fn test_csv_skips_no_consensus() {
        let mut r = result(true);
        r.consensus = None;
        r.n_bc = None;
        r.time_in_bc_ps = None;
        let mut out = CsvOutput::new(Vec::new());
        out.handle_cluster(&r);
        let text = String::from_utf8(out.into_inner()).unwrap();
        assert_eq!(text.lines().count(), 1);
    }

    #[test]
    fn test_json_lines() {
        let mut out = JsonOutput::new(Vec::new());
        out.handle_cluster(&result(true));
        out.handle_cluster(&result(false));
        let text = String::from_utf8(out.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let v: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(v["timeframe"], 4);
        assert_eq!(v["consensus"]["multiplicity"], 2);
        assert!(v["consensus"].get("used").is_none());
        assert_eq!(v["matches"][0]["delta_t_ps"][1], serde_json::Value::Null);
    }

    #[test]
    fn test_summary_aggregation() {
        let mut s = RunSummary::default();
        s.add_cluster(&result(true));
        s.add_cluster(&result(false));
        assert_eq!(s.delta_bc.get(&0), Some(&1));
        assert_eq!(s.delta_bc_outside, 1);
        assert_eq!(s.delta_t["ac"].count(), 2);
        assert_eq!(s.delta_t_same_bc["ac"].count(), 1);
        assert_eq!(s.delta_t_same_bc["c"].mean(), -5.0);
        assert_eq!(s.t0_in_bc.count(), 1);
        // residuals and resolution are filled for every cluster with a consensus
        assert_eq!(s.residuals["pion"].count(), 2);
        assert_eq!(s.resolution_by_multiplicity[&2].count(), 2);
        assert_eq!(s.mass.count(), 2);
        assert!((s.mass.mean() - 0.14).abs() < 1e-12);
        assert!((s.beta.mean() - 0.95).abs() < 1e-12);
        assert_eq!(s.pion_window.count(), 2);
        assert_eq!(s.pion_window_by_multiplicity[&2].mean(), 10.0);
    }

    #[test]
    fn test_pion_window_bounds() {
        let mut s = RunSummary::default();
        let mut r = result(true);
        r.records[0].p = 1.1;
        s.add_cluster(&r);
        r.records[0].p = 0.7;
        s.add_cluster(&r);
        assert_eq!(s.pion_window.count(), 0);
        assert_eq!(s.mass.count(), 2);
    }

    #[test]
    fn test_summary_written_to_work_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut out = SummaryOutput::new(Some(dir.path().to_path_buf()));
        out.handle_cluster(&result(true));
        out.handle_summary(&TimeframeSummary {
            timeframe: 4,
            clusters: 1,
            matches: 2,
            same_bc_matches: 1,
            ..Default::default()
        });
        out.finish().unwrap();

        let text = std::fs::read_to_string(dir.path().join("summary.json")).unwrap();
        let v: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["timeframes"], 1);
        assert_eq!(v["same_bc_matches"], 1);
        assert_eq!(v["delta_bc"]["0"], 1);
        assert_eq!(v["delta_t"]["ac"]["n"], 2);
        assert_eq!(v["pion_window"]["n"], 1);
        assert_eq!(v["mass"]["n"], 1);
    }
}
