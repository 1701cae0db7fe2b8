//! Write-only audit trail: one record per module extraction.
//!
//! The assembler never reads audit records back. Sinks are shared across
//! concurrent requests, so every implementation is `Send + Sync` and guards
//! its own state.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ModuleId, ReportType};
use crate::pipeline::extraction::ModuleExtractionResult;

/// Initial capacity of the in-memory buffer.
const MEMORY_BUFFER_CAPACITY: usize = 64;

/// One module extraction, as seen by the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub report_type: ReportType,
    pub context_id: Uuid,
    pub module_id: ModuleId,
    pub result: ModuleExtractionResult,
    pub recorded_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(report_type: ReportType, context_id: Uuid, result: ModuleExtractionResult) -> Self {
        Self {
            report_type,
            context_id,
            module_id: result.module_id(),
            result,
            recorded_at: Utc::now(),
        }
    }
}

/// Destination for audit records. Recording never fails the request.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: AuditRecord);
}

// ---------------------------------------------------------------------------
// In-memory buffer
// ---------------------------------------------------------------------------

/// Buffers records in memory. Used by tests and by callers that flush
/// records elsewhere themselves.
pub struct MemoryAuditSink {
    buffer: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self {
            buffer: Mutex::new(Vec::with_capacity(MEMORY_BUFFER_CAPACITY)),
        }
    }

    /// Snapshot of all buffered records.
    pub fn entries(&self) -> Vec<AuditRecord> {
        self.buffer
            .lock()
            .map(|buf| buf.clone())
            .unwrap_or_default()
    }

    /// Remove and return all buffered records.
    pub fn drain(&self) -> Vec<AuditRecord> {
        self.buffer
            .lock()
            .map(|mut buf| buf.drain(..).collect())
            .unwrap_or_default()
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.lock().map(|buf| buf.len()).unwrap_or(0)
    }
}

impl Default for MemoryAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: AuditRecord) {
        if let Ok(mut buf) = self.buffer.lock() {
            buf.push(record);
        } else {
            tracing::warn!(
                module_id = %record.module_id,
                "Audit buffer lock poisoned; record dropped"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tracing events
// ---------------------------------------------------------------------------

/// Emits each record as a structured `tracing` event. Keys and counts only,
/// never KPI values.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: AuditRecord) {
        let result = &record.result;
        tracing::info!(
            target: "siteproof::audit",
            report_type = %record.report_type,
            context_id = %record.context_id,
            module_id = %record.module_id,
            status = %result.status(),
            complete = result.complete(),
            present = result.present_count(),
            requested = result.entries().len(),
            "KPI extraction recorded"
        );
    }
}

// ---------------------------------------------------------------------------
// JSON lines file
// ---------------------------------------------------------------------------

/// Appends one JSON object per line to a file.
pub struct JsonLinesAuditSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesAuditSink {
    /// Open `path` for appending, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        tracing::debug!(path = %path.display(), "Audit log opened");
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, record: &AuditRecord) -> std::io::Result<()> {
        let line = serde_json::to_string(record)?;
        let mut file = self
            .file
            .lock()
            .map_err(|_| std::io::Error::other("audit log lock poisoned"))?;
        writeln!(file, "{line}")?;
        file.flush()
    }
}

impl AuditSink for JsonLinesAuditSink {
    fn record(&self, record: AuditRecord) {
        if let Err(e) = self.append(&record) {
            tracing::warn!(
                path = %self.path.display(),
                module_id = %record.module_id,
                error = %e,
                "Failed to append audit record"
            );
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extraction::extract;
    use std::sync::Arc;

    fn record(module: ModuleId) -> AuditRecord {
        let result = extract(r#"<b data-kpi-key="npv">1,000</b>"#, module, &["npv"]);
        AuditRecord::new(ReportType::FinancialFeasibility, Uuid::nil(), result)
    }

    #[test]
    fn record_takes_module_from_result() {
        let r = record(ModuleId::M5);
        assert_eq!(r.module_id, ModuleId::M5);
        assert!(r.result.complete());
    }

    #[test]
    fn memory_sink_buffers_and_drains() {
        let sink = MemoryAuditSink::new();
        sink.record(record(ModuleId::M2));
        sink.record(record(ModuleId::M5));
        assert_eq!(sink.buffer_len(), 2);
        assert_eq!(sink.entries()[1].module_id, ModuleId::M5);

        let drained = sink.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(sink.buffer_len(), 0);
    }

    #[test]
    fn memory_sink_accepts_concurrent_writers() {
        let sink = Arc::new(MemoryAuditSink::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let sink = Arc::clone(&sink);
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        sink.record(record(ModuleId::M1));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(sink.buffer_len(), 80);
    }

    #[test]
    fn tracing_sink_does_not_panic_without_subscriber() {
        TracingAuditSink.record(record(ModuleId::M6));
    }

    #[test]
    fn json_lines_sink_appends_one_object_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        let sink = JsonLinesAuditSink::open(&path).unwrap();
        sink.record(record(ModuleId::M2));
        sink.record(record(ModuleId::M4));
        drop(sink);

        // Reopening appends instead of truncating.
        let sink = JsonLinesAuditSink::open(&path).unwrap();
        sink.record(record(ModuleId::M6));

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);

        let last: AuditRecord = serde_json::from_str(lines[2]).unwrap();
        assert_eq!(last.module_id, ModuleId::M6);
        assert_eq!(last.report_type, ReportType::FinancialFeasibility);
    }

    #[test]
    fn json_lines_sink_open_fails_for_missing_dir() {
        assert!(JsonLinesAuditSink::open("/nonexistent/dir/audit.jsonl").is_err());
    }
}
