use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::mutants::{ExecutionStatus, MutantId};
use crate::reduce::ReducedKill;

/// Snapshot of a run, rewritten after every program. Never read back by the search itself.
#[derive(Debug, Serialize, Deserialize)]
pub struct KillReport {
    pub total: usize,
    pub killed: usize,
    pub unkilled: usize,
    pub round: u32,
    pub programs: u64,
    pub kills: Vec<KilledMutant>,
    pub reduced: Vec<ReducedKill>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KilledMutant {
    pub id: MutantId,
    pub status: ExecutionStatus,
}

impl KillReport {
    pub fn count(&self, status: ExecutionStatus) -> usize {
        self.kills.iter().filter(|k| k.status == status).count()
    }
}

pub fn report_path(output_dir: &Path) -> PathBuf {
    output_dir.join(".mutant-killer-state.json")
}

pub fn save_report(report: &KillReport, output_dir: &Path) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(report).map_err(std::io::Error::other)?;
    std::fs::write(report_path(output_dir), json)
}

pub fn load_report(output_dir: &Path) -> Option<KillReport> {
    let data = std::fs::read_to_string(report_path(output_dir)).ok()?;
    serde_json::from_str(&data).ok()
}
