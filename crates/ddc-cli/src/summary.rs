use chrono::{DateTime, Utc};
use ddc_api::ExportReport;
use ddc_core::CollectionResult;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize)]
pub struct TableSummary {
    pub table: String,
    pub rows: u64,
    pub truncated: bool,
    pub file: PathBuf,
}

/// What a run collected, written as `summary.json` into the staging
/// directory and printed at the end.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub mode: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub succeeded_hosts: Vec<String>,
    pub failed_hosts: BTreeMap<String, String>,
    pub cluster_failures: BTreeMap<String, String>,
    pub exported_tables: Vec<TableSummary>,
    pub failed_tables: BTreeMap<String, String>,
    /// Set when no PAT was given and the export was skipped.
    pub tables_skipped: bool,
}

impl RunSummary {
    pub fn new(run_id: String, mode: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            mode: mode.to_string(),
            started_at,
            finished_at: started_at,
            succeeded_hosts: Vec::new(),
            failed_hosts: BTreeMap::new(),
            cluster_failures: BTreeMap::new(),
            exported_tables: Vec::new(),
            failed_tables: BTreeMap::new(),
            tables_skipped: true,
        }
    }

    pub fn add_collection(&mut self, result: &CollectionResult) {
        self.succeeded_hosts = result.succeeded.iter().map(|h| h.to_string()).collect();
        self.failed_hosts = result
            .failed
            .iter()
            .map(|(h, e)| (h.to_string(), e.to_string()))
            .collect();
        self.cluster_failures = result
            .cluster_failures
            .iter()
            .map(|(step, e)| (step.clone(), e.to_string()))
            .collect();
    }

    pub fn add_export(&mut self, report: &ExportReport) {
        self.tables_skipped = false;
        self.exported_tables = report
            .exported
            .iter()
            .map(|t| TableSummary {
                table: t.table_name.clone(),
                rows: t.row_count,
                truncated: t.truncated,
                file: t.path.clone(),
            })
            .collect();
        self.failed_tables = report
            .failed
            .iter()
            .map(|(t, e)| (t.clone(), e.to_string()))
            .collect();
    }

    pub fn finish(&mut self, at: DateTime<Utc>) {
        self.finished_at = at;
    }

    pub fn write(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Collection {} ({})", self.run_id, self.mode)?;
        writeln!(
            f,
            "  Duration: {}s",
            (self.finished_at - self.started_at).num_seconds()
        )?;
        writeln!(
            f,
            "  Hosts:    {} succeeded, {} failed",
            self.succeeded_hosts.len(),
            self.failed_hosts.len()
        )?;
        for (host, err) in &self.failed_hosts {
            writeln!(f, "    ✗ {}: {}", host, err)?;
        }
        for (step, err) in &self.cluster_failures {
            writeln!(f, "    ✗ cluster step {}: {}", step, err)?;
        }

        if self.tables_skipped {
            writeln!(f, "  Tables:   skipped (no personal access token)")?;
        } else {
            writeln!(
                f,
                "  Tables:   {} exported, {} failed",
                self.exported_tables.len(),
                self.failed_tables.len()
            )?;
            for t in self.exported_tables.iter().filter(|t| t.truncated) {
                writeln!(f, "    ! sys.{} hit the row limit ({} rows)", t.table, t.rows)?;
            }
            for (table, err) in &self.failed_tables {
                writeln!(f, "    ✗ sys.{}: {}", table, err)?;
            }
        }
        Ok(())
    }
}
