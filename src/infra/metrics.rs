// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Records training metrics to a CSV file every logging_steps
// optimizer steps.
//
// Example CSV output:
//   step,epoch,learning_rate,loss
//   50,1,0.000029,5.123400
//   100,1,0.000027,3.890100
//
// The loss column is the mean loss since the previous row, so
// it reads as a smoothed learning curve rather than one noisy
// batch.
//
// Reference: Rust Book §12 (I/O and File Handling)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

pub const METRICS_FILE: &str = "metrics.csv";
const HEADER: &str = "step,epoch,learning_rate,loss";

/// One row of the metrics CSV
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepMetrics {
    /// Optimizer step (starts at 1)
    pub step: usize,

    /// Epoch the step belongs to (starts at 1)
    pub epoch: usize,

    /// Learning rate used for this step
    pub learning_rate: f64,

    /// Mean training loss over the steps since the last row
    pub loss: f64,
}

/// Logs step metrics to a CSV file for later analysis.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Writes the CSV header if the file doesn't exist yet.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let csv_path = dir.join(METRICS_FILE);

        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)
                .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
            writeln!(f, "{HEADER}")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    /// Append one row to the CSV.
    pub fn log(&self, m: &StepMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)?;

        writeln!(f, "{},{},{:.9},{:.6}", m.step, m.epoch, m.learning_rate, m.loss)?;

        tracing::debug!(
            "Logged step {} metrics: lr={:.3e}, loss={:.4}",
            m.step, m.learning_rate, m.loss,
        );

        Ok(())
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_are_appended_after_header() {
        let dir = tempfile::tempdir().unwrap();
        let logger = MetricsLogger::new(dir.path()).unwrap();
        logger.log(&StepMetrics { step: 1, epoch: 1, learning_rate: 3e-5, loss: 2.5 }).unwrap();

        // A second logger on the same directory keeps the existing rows
        let again = MetricsLogger::new(dir.path()).unwrap();
        again.log(&StepMetrics { step: 2, epoch: 1, learning_rate: 1.5e-5, loss: 2.0 }).unwrap();

        let csv = fs::read_to_string(dir.path().join(METRICS_FILE)).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], HEADER);
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("1,1,"));
        assert!(lines[2].ends_with(",2.000000"));
    }
}
