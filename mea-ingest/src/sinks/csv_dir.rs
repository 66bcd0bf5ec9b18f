use std::{
    fs,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use meter_domain::domain::SampleSet;

use crate::{
    config::FileNaming,
    pipeline::{PipelineError, Sink},
    transform::attachment::ProcessedAttachment,
};

pub const CSV_HEADER: [&str; 3] = ["id", "ts", "val"];

/// Writes each processed attachment to its own `id,ts,val` CSV file in a
/// directory.
///
/// Files are written under a `.partial` name and renamed into place, so a
/// reader globbing `*.csv` never sees a half-written file.
pub struct CsvDirSink {
    dir: PathBuf,
    naming: FileNaming,
}

impl CsvDirSink {
    pub fn new<P: Into<PathBuf>>(dir: P, naming: FileNaming) -> Self {
        Self {
            dir: dir.into(),
            naming,
        }
    }

    /// `<secs>.<millis>.csv` for the current time, moved forward a
    /// millisecond at a time past any name already taken.
    fn timestamp_path(&self) -> PathBuf {
        let mut millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();

        loop {
            let path = self.dir.join(format!("{}.{:03}.csv", millis / 1000, millis % 1000));
            if !path.exists() {
                return path;
            }
            millis += 1;
        }
    }

    fn content_hash_path(&self, item: &ProcessedAttachment) -> PathBuf {
        self.dir.join(format!("{}.csv", item.content_hash))
    }
}

fn write_samples(path: &Path, samples: &SampleSet) -> Result<(), csv::Error> {
    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_path(path)?;
    wtr.write_record(CSV_HEADER)?;
    for sample in samples {
        wtr.serialize(sample)?;
    }
    wtr.flush()?;
    Ok(())
}

#[async_trait::async_trait]
impl Sink<ProcessedAttachment> for CsvDirSink {
    async fn write(&self, item: &ProcessedAttachment) -> Result<PathBuf, PipelineError> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| PipelineError::Sink(format!("failed to create {}: {e}", self.dir.display())))?;

        let path = match self.naming {
            FileNaming::Timestamp => self.timestamp_path(),
            FileNaming::ContentHash => {
                let path = self.content_hash_path(item);
                if path.exists() {
                    tracing::info!(path = %path.display(), "attachment already written, skipping");
                    return Ok(path);
                }
                path
            }
        };

        let partial = path.with_extension("csv.partial");
        let written = write_samples(&partial, &item.samples)
            .map_err(|e| PipelineError::Sink(format!("failed to write {}: {e}", partial.display())))
            .and_then(|()| {
                fs::rename(&partial, &path)
                    .map_err(|e| PipelineError::Sink(format!("failed to move {} into place: {e}", path.display())))
            });

        if let Err(e) = written {
            let _ = fs::remove_file(&partial);
            metrics::counter!("mea_csv_sink_errors_total").increment(1);
            return Err(e);
        }

        Ok(path)
    }
}
