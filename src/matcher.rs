// Cursor-based matching of clusters against the reference event stream

use serde::Serialize;
use tracing::trace;

use crate::cluster::Cluster;
use crate::error::MatchError;
use crate::reference::ReferenceEvent;
use crate::time_axis::TimeAxis;

/// Slack on both window edges (ps). BC-aligned edges and event times are
/// computed along different rounding paths and may differ by a few ulp.
const EDGE_TOLERANCE_PS: f64 = 1e-3;

/// Closed interval on the timeframe axis (ps).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchWindow {
    pub start_ps: f64,
    pub end_ps: f64,
}

impl MatchWindow {
    /// Strictly before the start edge.
    pub fn is_before(&self, time_ps: f64) -> bool {
        time_ps < self.start_ps - EDGE_TOLERANCE_PS
    }

    /// Strictly after the end edge.
    pub fn is_after(&self, time_ps: f64) -> bool {
        time_ps > self.end_ps + EDGE_TOLERANCE_PS
    }

    pub fn contains(&self, time_ps: f64) -> bool {
        !self.is_before(time_ps) && !self.is_after(time_ps)
    }
}

/// Matches clusters, in time order, against one timeframe's reference events.
///
/// The cursor only moves forward: an event below one window start is below
/// every later one, so the total scan over a timeframe is linear in the
/// number of clusters plus events. Create one matcher per timeframe.
#[derive(Debug)]
pub struct ReferenceMatcher<'a> {
    events: &'a [ReferenceEvent],
    times: Vec<f64>,
    half_width_ps: f64,
    cursor: usize,
    advances: usize,
    last_start_ps: Option<f64>,
}

impl<'a> ReferenceMatcher<'a> {
    /// Fails if any event is out of orbit range or the events are not sorted by time.
    pub fn new(
        events: &'a [ReferenceEvent],
        axis: &TimeAxis,
        first_orbit: u32,
        window_bc: u32,
    ) -> Result<Self, MatchError> {
        let mut times = Vec::with_capacity(events.len());
        for (index, ev) in events.iter().enumerate() {
            if ev.bc >= axis.max_bunches() {
                return Err(MatchError::BcOutOfRange {
                    index,
                    bc: ev.bc,
                    max_bunches: axis.max_bunches(),
                });
            }
            let t = ev.bc_time(axis, first_orbit);
            if let Some(&prev_time_ps) = times.last() {
                if t < prev_time_ps {
                    return Err(MatchError::UnsortedReference {
                        index,
                        time_ps: t,
                        prev: index - 1,
                        prev_time_ps,
                    });
                }
            }
            times.push(t);
        }

        Ok(ReferenceMatcher {
            events,
            times,
            half_width_ps: f64::from(window_bc) * axis.bc_duration_ps(),
            cursor: 0,
            advances: 0,
            last_start_ps: None,
        })
    }

    pub fn window(&self, first_ps: f64, last_ps: f64) -> MatchWindow {
        MatchWindow {
            start_ps: first_ps - self.half_width_ps,
            end_ps: last_ps + self.half_width_ps,
        }
    }

    /// Indices of the events inside the window around `[first_ps, last_ps]`.
    ///
    /// Successive calls must have non-decreasing `first_ps`.
    pub fn match_span(&mut self, first_ps: f64, last_ps: f64) -> Result<Vec<usize>, MatchError> {
        let window = self.window(first_ps, last_ps);
        if let Some(previous_ps) = self.last_start_ps {
            if window.start_ps < previous_ps {
                return Err(MatchError::ClusterOutOfOrder {
                    start_ps: window.start_ps,
                    previous_ps,
                });
            }
        }
        self.last_start_ps = Some(window.start_ps);

        let mut matched = Vec::new();
        for j in self.cursor..self.times.len() {
            let t = self.times[j];
            if window.is_before(t) {
                self.cursor = j + 1;
                self.advances += 1;
                continue;
            }
            if window.is_after(t) {
                break;
            }
            debug_assert!(window.contains(t));
            matched.push(j);
        }
        trace!(
            start_ps = window.start_ps,
            end_ps = window.end_ps,
            cursor = self.cursor,
            matched = matched.len(),
            "matched window"
        );
        Ok(matched)
    }

    pub fn match_cluster(&mut self, cluster: &Cluster) -> Result<Vec<usize>, MatchError> {
        self.match_span(cluster.first_time(), cluster.last_time())
    }

    pub fn event(&self, index: usize) -> &'a ReferenceEvent {
        &self.events[index]
    }

    /// BC start time of event `index` on the timeframe axis.
    pub fn event_time(&self, index: usize) -> f64 {
        self.times[index]
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Total number of times the cursor moved past an event.
    pub fn advances(&self) -> usize {
        self.advances
    }
}

/// Where a consensus BC sits relative to a reference event's BC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BcComparison {
    pub same_bc: bool,
    /// Consensus BC minus event BC, wrapped to the nearest orbit image
    pub delta_bc: i64,
}

impl BcComparison {
    pub fn new(axis: &TimeAxis, consensus_bc: i64, event: &ReferenceEvent) -> Self {
        let max = i64::from(axis.max_bunches());
        let own = i64::from(axis.bc_in_orbit(consensus_bc));
        let mut delta = (own - i64::from(event.bc)).rem_euclid(max);
        if delta > max / 2 {
            delta -= max;
        }
        BcComparison {
            same_bc: own == i64::from(event.bc),
            delta_bc: delta,
        }
    }
}
