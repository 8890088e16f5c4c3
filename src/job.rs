use std::path::PathBuf;

use jiff::civil::Date;
use log::{error, info};

use crate::{
    db::{ageing_fact::AgeingFactArchive, store::FactStore},
    error::AgeingError,
    report::{summarize_export, ExportSummary},
};

/// One run of the ageing job for a snapshot date.
#[derive(Debug, Clone)]
pub struct UpdateJob {
    pub as_at_date: Date,
    /// Applied in this order before anything else.  Empty to skip.
    pub migrations: Vec<PathBuf>,
    /// Output csv file, see [`AgeingFactArchive::filename`] for the default.
    pub out: Option<PathBuf>,
    /// Clear and generate as two separately committed steps instead of one
    /// transaction.
    pub per_step_commit: bool,
    /// Read the exported file back and check it.
    pub verify: bool,
}

impl UpdateJob {
    pub fn new(as_at_date: Date) -> UpdateJob {
        UpdateJob {
            as_at_date,
            migrations: Vec::new(),
            out: None,
            per_step_commit: false,
            verify: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOutcome {
    pub migrations: usize,
    pub deleted: u64,
    pub inserted: u64,
    pub csv_path: PathBuf,
    pub summary: Option<ExportSummary>,
}

/// Run the steps of `job` in order: migrations, clear + generate, export,
/// verify.  The first failure stops the run.  The archive is disconnected
/// at the end whether the run succeeded or not.
pub async fn run_update<S: FactStore>(
    archive: &mut AgeingFactArchive<S>,
    job: &UpdateJob,
) -> Result<UpdateOutcome, AgeingError> {
    let res = run_steps(archive, job).await;
    archive.disconnect().await;
    match &res {
        Ok(_) => info!("Ageing processing completed successfully!"),
        Err(e) => error!("Ageing processing failed: {}", e),
    }
    res
}

async fn run_steps<S: FactStore>(
    archive: &mut AgeingFactArchive<S>,
    job: &UpdateJob,
) -> Result<UpdateOutcome, AgeingError> {
    info!("Processing ageing data for date: {}", job.as_at_date);
    let migrations = if job.migrations.is_empty() {
        0
    } else {
        archive.run_migrations(&job.migrations).await?
    };

    let (deleted, inserted) = if job.per_step_commit {
        let deleted = archive.clear_existing(job.as_at_date).await?;
        let inserted = archive.generate(job.as_at_date).await?;
        (deleted, inserted)
    } else {
        let rebuild = archive.rebuild(job.as_at_date).await?;
        (rebuild.deleted, rebuild.inserted)
    };

    let csv_path = archive
        .export_csv(job.as_at_date, job.out.as_deref())
        .await?;

    let summary = if job.verify {
        let summary = summarize_export(&csv_path, job.as_at_date)?;
        info!("{}", summary);
        Some(summary)
    } else {
        None
    };

    Ok(UpdateOutcome {
        migrations,
        deleted,
        inserted,
        csv_path,
        summary,
    })
}
