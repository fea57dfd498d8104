use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use jobtrail_core::error::AppError;
use jobtrail_core::models::{AdRecord, JobSnapshot, Site};
use jobtrail_core::traits::{ExportReceipt, Exporter};

/// Writes a site's archive to `archived_<site>_<MMDDYYYY>.csv`.
#[derive(Debug, Clone)]
pub struct CsvExporter {
    dir: PathBuf,
}

impl CsvExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, site: Site, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("archived_{}_{}.csv", site, date.format("%m%d%Y")))
    }
}

impl Exporter for CsvExporter {
    fn export(
        &self,
        site: Site,
        date: NaiveDate,
        snapshots: &[JobSnapshot],
    ) -> Result<ExportReceipt, AppError> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            AppError::ExportError(format!("Cannot create {}: {e}", self.dir.display()))
        })?;
        let path = self.path_for(site, date);
        let rows = write_csv(&path, site, snapshots)?;
        tracing::info!(path = %path.display(), rows, "Archive exported");
        Ok(ExportReceipt { path, rows })
    }
}

fn write_csv(path: &Path, site: Site, snapshots: &[JobSnapshot]) -> Result<usize, AppError> {
    let export_err = |e: csv::Error| AppError::ExportError(format!("{}: {e}", path.display()));

    let mut writer = csv::Writer::from_path(path).map_err(export_err)?;
    writer
        .write_record(AdRecord::columns(site))
        .map_err(export_err)?;

    let mut rows = 0;
    for snapshot in snapshots {
        if snapshot.site != site {
            return Err(AppError::ExportError(format!(
                "{} snapshot {} in the {} archive",
                snapshot.site, snapshot.unique_ad_id, site
            )));
        }
        writer
            .write_record(snapshot.record.csv_row())
            .map_err(export_err)?;
        rows += 1;
    }

    writer
        .flush()
        .map_err(|e| AppError::ExportError(format!("{}: {e}", path.display())))?;
    Ok(rows)
}
