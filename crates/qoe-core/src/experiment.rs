//! Experiment metadata: maps an experiment id to its display scheme name.
//!
//! The metadata dump has one line per experiment: `<id> <json>`, where the
//! json document carries the adaptive-bitrate algorithm name (`abr_name`,
//! falling back to `abr`) and the congestion-control algorithm (`cc`).

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::record::decode_u64;

#[derive(Debug, Error)]
pub enum ExperimentError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("missing separator in experiment line: {0}")]
    MissingSeparator(String),
    #[error("invalid experiment id: {0}")]
    InvalidId(String),
    #[error("experiment id {0} not found")]
    Unknown(u32),
}

#[derive(Debug, Deserialize)]
struct ExperimentDoc {
    #[serde(default)]
    abr_name: Option<String>,
    #[serde(default)]
    abr: Option<String>,
    #[serde(default)]
    cc: Option<String>,
}

/// Registered experiments, indexed by id.
#[derive(Debug, Default)]
pub struct ExperimentTable {
    schemes: Vec<Option<String>>,
}

impl ExperimentTable {
    pub fn load(path: &Path) -> Result<Self, ExperimentError> {
        let file = File::open(path)?;
        Self::read(BufReader::new(file))
    }

    pub fn read<R: BufRead>(reader: R) -> Result<Self, ExperimentError> {
        let mut schemes: Vec<Option<String>> = Vec::new();

        for line in reader.lines() {
            let line = line?;
            let (id_token, json) = line
                .split_once(' ')
                .ok_or_else(|| ExperimentError::MissingSeparator(line.clone()))?;
            let id = decode_u64(id_token).map_err(|_| ExperimentError::InvalidId(line.clone()))?;
            if id > u64::from(u16::MAX) {
                return Err(ExperimentError::InvalidId(line.clone()));
            }
            let doc: ExperimentDoc = serde_json::from_str(json)?;

            let abr = doc
                .abr_name
                .filter(|name| !name.is_empty())
                .or(doc.abr)
                .unwrap_or_default();
            let cc = doc.cc.unwrap_or_default();

            let index = usize::try_from(id).map_err(|_| ExperimentError::InvalidId(line.clone()))?;
            if index >= schemes.len() {
                schemes.resize(index + 1, None);
            }
            schemes[index] = Some(format!("{abr}/{cc}"));
        }

        Ok(Self { schemes })
    }

    /// Display scheme for a registered experiment id; an id never registered
    /// is fatal.
    pub fn scheme(&self, id: u32) -> Result<&str, ExperimentError> {
        usize::try_from(id)
            .ok()
            .and_then(|index| self.schemes.get(index))
            .and_then(|slot| slot.as_deref())
            .ok_or(ExperimentError::Unknown(id))
    }
}
