// Reference (T0) detector events

use serde::{Deserialize, Serialize};

use crate::constants::REFERENCE_CHANNELS;
use crate::time_axis::TimeAxis;

/// Which sub-timestamp of a reference event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Average of both sides
    Combined,
    SideA,
    SideC,
    /// Auxiliary time (vertex-corrected)
    Aux,
}

impl Channel {
    pub const ALL: [Channel; REFERENCE_CHANNELS] =
        [Channel::Combined, Channel::SideA, Channel::SideC, Channel::Aux];

    pub fn index(self) -> usize {
        match self {
            Channel::Combined => 0,
            Channel::SideA => 1,
            Channel::SideC => 2,
            Channel::Aux => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Combined => "ac",
            Channel::SideA => "a",
            Channel::SideC => "c",
            Channel::Aux => "aux",
        }
    }
}

/// One sub-timestamp, relative to the event's BC (ps).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SubTime {
    pub value_ps: f64,
    pub valid: bool,
}

/// Interaction record from the reference detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceEvent {
    pub bc: u32,
    /// Absolute orbit number
    pub orbit: u32,
    pub times: [SubTime; REFERENCE_CHANNELS],
}

impl ReferenceEvent {
    pub fn new(orbit: u32, bc: u32) -> Self {
        ReferenceEvent {
            bc,
            orbit,
            times: [SubTime::default(); REFERENCE_CHANNELS],
        }
    }

    pub fn with_time(mut self, channel: Channel, value_ps: f64) -> Self {
        self.times[channel.index()] = SubTime {
            value_ps,
            valid: true,
        };
        self
    }

    /// Sub-timestamp if its validity flag is set.
    pub fn time(&self, channel: Channel) -> Option<f64> {
        let t = self.times[channel.index()];
        t.valid.then_some(t.value_ps)
    }

    /// Start of this event's BC on the timeframe axis.
    pub fn bc_time(&self, axis: &TimeAxis, first_orbit: u32) -> f64 {
        let orbit = i64::from(self.orbit) - i64::from(first_orbit);
        axis.bc_time(orbit, self.bc)
    }
}

/// Stable sort by BC time, which is the order the matcher requires.
pub fn sort_by_time(events: &mut [ReferenceEvent], axis: &TimeAxis, first_orbit: u32) {
    events.sort_by(|a, b| {
        a.bc_time(axis, first_orbit)
            .total_cmp(&b.bc_time(axis, first_orbit))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validity_flags() {
        let ev = ReferenceEvent::new(100, 5)
            .with_time(Channel::Combined, 12.0)
            .with_time(Channel::SideC, -30.0);
        assert_eq!(ev.time(Channel::Combined), Some(12.0));
        assert_eq!(ev.time(Channel::SideA), None);
        assert_eq!(ev.time(Channel::SideC), Some(-30.0));
        assert_eq!(ev.time(Channel::Aux), None);
    }

    #[test]
    fn test_bc_time_relative_to_first_orbit() {
        let axis = TimeAxis::new(25000.0, 3564).unwrap();
        let ev = ReferenceEvent::new(101, 4);
        assert_eq!(ev.bc_time(&axis, 100), (3564.0 + 4.0) * 25000.0);
        // orbit before the timeframe start lands at negative time
        let early = ReferenceEvent::new(99, 3563);
        assert_eq!(early.bc_time(&axis, 100), -25000.0);
    }

    #[test]
    fn test_sort_by_time() {
        let axis = TimeAxis::new(25000.0, 3564).unwrap();
        let mut events = vec![
            ReferenceEvent::new(11, 0),
            ReferenceEvent::new(10, 3000),
            ReferenceEvent::new(10, 7),
        ];
        sort_by_time(&mut events, &axis, 10);
        let order: Vec<(u32, u32)> = events.iter().map(|e| (e.orbit, e.bc)).collect();
        assert_eq!(order, vec![(10, 7), (10, 3000), (11, 0)]);
    }
}
