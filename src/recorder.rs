use crate::error::{OscillationError, Result};
use crate::series::{TimeSeries, COLUMN_NAMES};
use chrono::{DateTime, Local};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Writes a finished session to `archive/output_<timestamp>.csv`.
pub struct SessionRecorder {
    archive_dir: PathBuf,
}

impl SessionRecorder {
    pub fn new(archive_dir: impl Into<PathBuf>) -> Self {
        Self {
            archive_dir: archive_dir.into(),
        }
    }

    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    pub fn file_name_for(time: &DateTime<Local>) -> String {
        format!("output_{}.csv", time.format("%Y-%m-%d_%H-%M-%S"))
    }

    /// Consumes the series; returns the path of the written file.
    pub fn save(&self, series: TimeSeries) -> Result<PathBuf> {
        let columns = series.columns();
        self.save_columns(&columns)
    }

    /// Writes ten named columns of equal length, header row first.
    pub fn save_columns(&self, columns: &[(&'static str, &[f64])]) -> Result<PathBuf> {
        self.save_columns_at(columns, &Local::now())
    }

    fn save_columns_at(
        &self,
        columns: &[(&'static str, &[f64])],
        time: &DateTime<Local>,
    ) -> Result<PathBuf> {
        let rows = validate_columns(columns)?;
        let path = self.archive_dir.join(Self::file_name_for(time));
        fs::create_dir_all(&self.archive_dir).map_err(|source| OscillationError::Persistence {
            path: path.clone(),
            source,
        })?;

        let partial = path.with_extension("csv.partial");
        let written = write_csv(&partial, columns, rows).and_then(|_| fs::rename(&partial, &path));
        if let Err(source) = written {
            let _ = fs::remove_file(&partial);
            return Err(OscillationError::Persistence { path, source });
        }
        log::info!("💾 Wrote {rows} cycles to {}", path.display());
        Ok(path)
    }
}

fn validate_columns(columns: &[(&'static str, &[f64])]) -> Result<usize> {
    if columns.len() != COLUMN_NAMES.len() {
        return Err(OscillationError::LengthMismatch {
            column: "<columns>",
            expected: COLUMN_NAMES.len(),
            found: columns.len(),
        });
    }
    let expected = columns[0].1.len();
    for (name, values) in columns {
        if values.len() != expected {
            return Err(OscillationError::LengthMismatch {
                column: *name,
                expected,
                found: values.len(),
            });
        }
    }
    Ok(expected)
}

fn write_csv(path: &Path, columns: &[(&'static str, &[f64])], rows: usize) -> io::Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(columns.iter().map(|(name, _)| *name))?;
    for i in 0..rows {
        writer.write_record(columns.iter().map(|(_, values)| values[i].to_string()))?;
    }
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()
}
