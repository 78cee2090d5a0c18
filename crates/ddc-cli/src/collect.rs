use crate::dispatch;
use crate::summary::RunSummary;
use chrono::Utc;
use ddc_api::{RestClient, SystemTableExporter};
use ddc_core::config::Config;
use ddc_core::progress::Progress;
use ddc_core::ticker::Ticker;
use ddc_core::{CollectionOrchestrator, RunOutcome, Staging};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

const PROGRESS_INTERVAL: Duration = Duration::from_secs(2);

/// One full collection: hosts, cluster-wide steps, system tables, then the
/// archive. Only failures before per-host collection starts are returned as
/// errors; everything after is reported in the summary.
pub async fn run(config: &Config) -> anyhow::Result<RunSummary> {
    let started_at = Utc::now();
    let run_id = Uuid::new_v4().to_string();

    let transport = dispatch::create_transport(config)?;
    info!("Starting collection {} over {}", run_id, transport.name());

    let staging = Staging::for_run(&config.staging_dir, &run_id)?;
    info!("Staging into {}", staging.root().display());
    let mut summary = RunSummary::new(run_id, transport.name(), started_at);

    let progress = Progress::new();
    let ticker = {
        let progress = progress.clone();
        Ticker::start(PROGRESS_INTERVAL, move || {
            info!("{}", progress.snapshot());
        })
    };

    let mut orchestrator = CollectionOrchestrator::new(config, transport, staging.clone())
        .with_progress(progress.clone());
    let result = match orchestrator.run().await {
        RunOutcome::Done { result, .. } => result,
        RunOutcome::Failed { error, .. } => {
            ticker.stop().await;
            return Err(error.into());
        }
    };
    summary.add_collection(&result);

    match config.pat() {
        Some(pat) => match RestClient::new(&config.collection.dremio_endpoint, pat.clone()) {
            Ok(client) => {
                let exporter = SystemTableExporter::new(
                    client,
                    config.collection.export_settings(),
                    staging.system_tables_dir(),
                )
                .with_progress(progress.clone());
                let report = exporter.export_all(&config.collection.system_tables).await;
                summary.add_export(&report);
            }
            Err(e) => warn!("system tables not exported: {}", e),
        },
        None => info!("No personal access token given, skipping system table export"),
    }

    ticker.stop().await;
    summary.finish(Utc::now());
    summary.write(&staging.summary_path())?;

    let files = staging.archive(&config.output_file)?;
    info!(
        "Wrote {} file(s) to {}",
        files,
        config.output_file.display()
    );
    Ok(summary)
}
