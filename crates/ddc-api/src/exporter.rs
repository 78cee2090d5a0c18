use crate::client::{decode, JobApi};
use crate::job::{JobDataResponse, JobPhase, RemoteJob};
use ddc_core::config::ExportSettings;
use ddc_core::error::CollectorError;
use ddc_core::progress::Progress;
use ddc_core::staging::system_table_file_name;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

/// A completed job's result, not yet written to disk.
#[derive(Debug, Clone)]
pub struct SystemTableExport {
    pub table_name: String,
    pub row_count: u64,
    pub truncated: bool,
    pub body: Vec<u8>,
}

impl SystemTableExport {
    /// Write the body to `<dir>/sys.<table>.json`. The body goes to a
    /// temporary name first so a failed write never leaves a partial file
    /// under the final name.
    pub fn persist(&self, dir: &Path) -> Result<PathBuf, CollectorError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(system_table_file_name(&self.table_name));
        let partial = path.with_extension("json.partial");
        std::fs::write(&partial, &self.body)?;
        std::fs::rename(&partial, &path)?;
        Ok(path)
    }
}

/// One table that made it to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedTable {
    pub table_name: String,
    pub row_count: u64,
    pub truncated: bool,
    pub path: PathBuf,
}

#[derive(Debug, Default)]
pub struct ExportReport {
    pub exported: Vec<ExportedTable>,
    pub failed: BTreeMap<String, CollectorError>,
}

impl ExportReport {
    pub fn truncated(&self) -> impl Iterator<Item = &ExportedTable> {
        self.exported.iter().filter(|t| t.truncated)
    }
}

/// Dumps system tables by submitting `SELECT *` jobs, polling them to
/// completion and persisting each result body.
pub struct SystemTableExporter<A: JobApi> {
    api: A,
    settings: ExportSettings,
    out_dir: PathBuf,
    progress: Progress,
}

impl<A: JobApi> SystemTableExporter<A> {
    pub fn new(api: A, settings: ExportSettings, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            api,
            settings,
            out_dir: out_dir.into(),
            progress: Progress::new(),
        }
    }

    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Export every table in order. A failing table is recorded and the
    /// rest still run.
    pub async fn export_all(&self, tables: &[String]) -> ExportReport {
        let mut report = ExportReport::default();
        info!(
            "Exporting {} system table(s) to {}",
            tables.len(),
            self.out_dir.display()
        );

        for table in tables {
            match self.export_table(table).await {
                Ok(exported) => {
                    self.progress.table_finished(true);
                    report.exported.push(exported);
                }
                Err(e) => {
                    warn!("system table {} not exported: {}", table, e);
                    self.progress.table_finished(false);
                    report.failed.insert(table.clone(), e);
                }
            }
        }
        report
    }

    pub async fn export_table(&self, table: &str) -> Result<ExportedTable, CollectorError> {
        let export = self.fetch(table).await?;
        let path = export.persist(&self.out_dir)?;
        info!(
            "sys.{} exported ({} rows) to {}",
            table,
            export.row_count,
            path.display()
        );
        Ok(ExportedTable {
            table_name: export.table_name,
            row_count: export.row_count,
            truncated: export.truncated,
            path,
        })
    }

    /// Submit, poll and retrieve one table without touching the disk.
    pub async fn fetch(&self, table: &str) -> Result<SystemTableExport, CollectorError> {
        let sql = select_all(table);
        let id = self
            .api
            .submit(&sql)
            .await
            .map_err(|e| CollectorError::SubmissionFailed {
                table: table.to_string(),
                reason: e.to_string(),
            })?;

        let mut job = RemoteJob::submitted(id, self.settings.row_limit, self.settings.poll_interval);
        self.wait_for(table, &mut job).await?;

        let body = self.api.job_results(&job.id, job.row_limit).await?;
        let data: JobDataResponse = decode(&self.api.results_url(&job.id, job.row_limit), &body)?;

        let truncated = data.returned_row_count == job.row_limit;
        if truncated {
            warn!(
                "sys.{} returned {} rows, the configured limit; the export is likely truncated",
                table, data.returned_row_count
            );
        }

        Ok(SystemTableExport {
            table_name: table.to_string(),
            row_count: data.returned_row_count,
            truncated,
            body,
        })
    }

    async fn wait_for(&self, table: &str, job: &mut RemoteJob) -> Result<(), CollectorError> {
        let started = Instant::now();
        loop {
            tokio::time::sleep(job.poll_interval).await;

            let state = self
                .api
                .job_state(&job.id)
                .await
                .map_err(|e| match e {
                    malformed @ CollectorError::MalformedResponse { .. } => malformed,
                    other => CollectorError::JobPoll {
                        job_id: job.id.clone(),
                        reason: other.to_string(),
                    },
                })?;

            match job.observe(&state) {
                JobPhase::Completed => return Ok(()),
                JobPhase::Failed => {
                    return Err(CollectorError::JobFailedState {
                        table: table.to_string(),
                        job_id: job.id.clone(),
                        state: state.to_string(),
                    })
                }
                JobPhase::Submitted | JobPhase::Running => {
                    let waited = started.elapsed();
                    if waited >= self.settings.max_wait {
                        return Err(CollectorError::JobTimedOut {
                            table: table.to_string(),
                            job_id: job.id.clone(),
                            waited_ms: waited.as_millis(),
                        });
                    }
                }
            }
        }
    }
}

/// `SELECT * FROM sys.<table>`. Names may carry escaped quotes (`\"tables\"`)
/// from the collection YAML; they are unescaped for the statement.
pub fn select_all(table: &str) -> String {
    format!("SELECT * FROM sys.{}", table.replace("\\\"", "\""))
}
