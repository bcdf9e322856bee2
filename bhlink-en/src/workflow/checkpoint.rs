//! Row checkpointing
//!
//! Durable progress for long batch runs: every processed row lands in a
//! tab-separated flat file with fixed named columns, flushed every N
//! rows. On restart, file names already present are skipped
//! (exact-match dedup), giving at-least-once semantics made safe by the
//! merge engine's idempotent reconciliation.

use crate::types::MetadataRow;
use anyhow::Context;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub struct Checkpoint {
    path: PathBuf,
    rows: Vec<MetadataRow>,
    processed: HashSet<String>,
    flush_every: usize,
    pending: usize,
}

impl Checkpoint {
    /// Open a checkpoint, loading any rows a previous run left behind.
    /// A missing file starts an empty checkpoint; an unreadable file is
    /// a startup error.
    pub fn open(path: &Path, flush_every: usize) -> anyhow::Result<Self> {
        let mut rows = Vec::new();
        if path.exists() {
            let mut reader = csv::ReaderBuilder::new()
                .delimiter(b'\t')
                .from_path(path)
                .with_context(|| format!("Failed to open checkpoint {}", path.display()))?;
            for record in reader.deserialize() {
                let row: MetadataRow = record
                    .with_context(|| format!("Malformed checkpoint row in {}", path.display()))?;
                rows.push(row);
            }
            info!(
                path = %path.display(),
                rows = rows.len(),
                "Resuming from checkpoint"
            );
        }
        let processed = rows.iter().map(|row| row.file.clone()).collect();
        Ok(Self {
            path: path.to_path_buf(),
            rows,
            processed,
            flush_every: flush_every.max(1),
            pending: 0,
        })
    }

    /// True when the file name was already processed by this or an
    /// earlier run.
    pub fn is_processed(&self, file_name: &str) -> bool {
        self.processed.contains(file_name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Record a processed row, flushing when the pending count reaches
    /// the flush interval. A failed flush is logged and retried at the
    /// next interval rather than aborting the batch.
    pub fn record(&mut self, row: MetadataRow) {
        self.processed.insert(row.file.clone());
        self.rows.push(row);
        self.pending += 1;
        if self.pending >= self.flush_every {
            if let Err(e) = self.flush() {
                warn!(error = %e, "Checkpoint flush failed, will retry");
            }
        }
    }

    /// Write the full row set out, through a temp file and rename so a
    /// crash mid-write never truncates the previous checkpoint.
    pub fn flush(&mut self) -> anyhow::Result<()> {
        let tmp_path = self.path.with_extension("tmp");
        {
            let mut writer = csv::WriterBuilder::new()
                .delimiter(b'\t')
                .from_path(&tmp_path)
                .with_context(|| format!("Failed to create {}", tmp_path.display()))?;
            for row in &self.rows {
                writer.serialize(row).context("Failed to serialize row")?;
            }
            writer.flush().context("Failed to flush checkpoint")?;
        }
        std::fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        self.pending = 0;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn row(file: &str, page_id: &str) -> MetadataRow {
        MetadataRow {
            file: file.to_string(),
            page_id: page_id.to_string(),
            taxon_names: Some("Galbula albirostris".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_round_trip_preserves_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.tsv");

        let mut checkpoint = Checkpoint::open(&path, 1).unwrap();
        checkpoint.record(row("a.jpg", "100"));
        checkpoint.record(row("b.jpg", "200"));

        let reloaded = Checkpoint::open(&path, 1).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.is_processed("a.jpg"));
        assert!(reloaded.is_processed("b.jpg"));
        assert!(!reloaded.is_processed("c.jpg"));
    }

    #[test]
    fn test_flush_interval_defers_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.tsv");

        let mut checkpoint = Checkpoint::open(&path, 10).unwrap();
        checkpoint.record(row("a.jpg", "100"));
        assert!(!path.exists());

        checkpoint.flush().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint = Checkpoint::open(&dir.path().join("absent.tsv"), 5).unwrap();
        assert!(checkpoint.is_empty());
    }

    #[test]
    fn test_resume_skips_exact_names_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.tsv");

        let mut checkpoint = Checkpoint::open(&path, 1).unwrap();
        checkpoint.record(row("Plate 1.jpg", "100"));

        let reloaded = Checkpoint::open(&path, 1).unwrap();
        assert!(reloaded.is_processed("Plate 1.jpg"));
        assert!(!reloaded.is_processed("plate 1.jpg"));
    }
}
