use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use perf_lab_core::{ClientState, ExportDocument, sweep_csv};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Where exports are written. A missing path means that format is skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportTargets {
    pub json: Option<PathBuf>,
    pub csv: Option<PathBuf>,
}

impl ExportTargets {
    pub fn is_empty(&self) -> bool {
        self.json.is_none() && self.csv.is_none()
    }

    /// Configured paths, or timestamped files in the working directory when none are set.
    pub fn or_timestamped(&self, now: DateTime<Local>) -> ExportTargets {
        if !self.is_empty() {
            return self.clone();
        }
        let stamp = now.format("%Y%m%d-%H%M%S");
        ExportTargets {
            json: Some(PathBuf::from(format!("perf-lab-{stamp}.json"))),
            csv: Some(PathBuf::from(format!("perf-lab-sweep-{stamp}.csv"))),
        }
    }
}

/// Write every requested export and return the paths actually written.
/// The CSV is skipped when there are no sweep results to put in it.
pub fn write_exports(state: &ClientState, targets: &ExportTargets) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    if let Some(path) = &targets.json {
        write_json(path, state)?;
        written.push(path.clone());
    }
    if let Some(path) = &targets.csv {
        let points = state.sweep.results();
        if points.is_empty() {
            warn!("No sweep results, skipping {}", path.display());
        } else {
            fs::write(path, sweep_csv(points))
                .with_context(|| format!("Failed to write CSV export {}", path.display()))?;
            written.push(path.clone());
        }
    }
    Ok(written)
}

fn write_json(path: &Path, state: &ClientState) -> Result<()> {
    let data = ExportDocument::capture(state)
        .to_json_pretty()
        .context("Failed to serialize export")?;
    fs::write(path, data)
        .with_context(|| format!("Failed to write JSON export {}", path.display()))?;
    Ok(())
}
