// Timeframe documents

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::InputError;
use crate::record::Record;
use crate::reference::ReferenceEvent;

/// All data of one timeframe. Neither collection needs to be ordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timeframe {
    pub timeframe: u64,
    /// Orbit at which the timeframe starts; record times are relative to it
    pub first_orbit: u32,
    #[serde(default)]
    pub records: Vec<Record>,
    #[serde(default)]
    pub reference: Vec<ReferenceEvent>,
}

impl Timeframe {
    pub fn empty(timeframe: u64, first_orbit: u32) -> Self {
        Timeframe {
            timeframe,
            first_orbit,
            records: Vec::new(),
            reference: Vec::new(),
        }
    }

    /// Read a timeframe from a JSON file.
    pub fn load(path: &Path) -> Result<Self, InputError> {
        let text = std::fs::read_to_string(path).map_err(|source| InputError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| InputError::Decode {
            path: path.to_path_buf(),
            source,
        })
    }
}
