use meter_domain::domain::{Sample, SampleSet};
use time_tz::{timezones, Tz};

use super::{
    outliers::{filter_outliers, OutlierPolicy},
    row::{parse_row, RowError},
    spreadsheet::{decode_rows, Cell, DecodeError, SheetFormat},
    timestamps::reconstruct_timestamps,
};
use crate::config::ProcessingConfig;

/// A named binary part pulled out of a mail message.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// A row that was rejected for a reason worth reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct RowRejection {
    /// Zero-based index among the data rows of the sheet (non-empty rows
    /// after the header).
    pub row: usize,
    pub error: RowError,
}

/// The filtered samples of one attachment, ready for the sink.
#[derive(Debug, Clone)]
pub struct ProcessedAttachment {
    pub filename: String,
    /// blake3 of the attachment bytes, hex encoded.
    pub content_hash: String,
    pub samples: SampleSet,
    pub outliers_removed: usize,
    pub rejected_rows: Vec<RowRejection>,
}

impl ProcessedAttachment {
    pub fn record_count(&self) -> usize {
        self.samples.len()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum AttachmentError {
    #[error("failed to decode attachment {filename}: {source}")]
    Decode {
        filename: String,
        #[source]
        source: DecodeError,
    },
    #[error("row {row} of attachment {filename} is unreadable: {source}")]
    Row {
        filename: String,
        row: usize,
        #[source]
        source: RowError,
    },
    #[error("attachment {filename} contains no meter readings")]
    NoReadings { filename: String },
    #[error("failed to read payload of attachment {filename}: {reason}")]
    Payload { filename: String, reason: String },
    #[error("failed to write output for attachment {filename}: {reason}")]
    Write { filename: String, reason: String },
}

/// Turns spreadsheet attachments into filtered per-sensor samples.
///
/// Performs no I/O. Rows that only fail timestamp localization come back in
/// [`ProcessedAttachment::rejected_rows`]; any other unreadable row fails the
/// whole attachment.
#[derive(Clone)]
pub struct AttachmentProcessor {
    sensor_prefix: String,
    time_zone: &'static Tz,
    outliers: OutlierPolicy,
}

impl AttachmentProcessor {
    pub fn new(sensor_prefix: impl Into<String>, time_zone: &'static Tz, outliers: OutlierPolicy) -> Self {
        Self {
            sensor_prefix: sensor_prefix.into(),
            time_zone,
            outliers,
        }
    }

    pub fn from_config(cfg: &ProcessingConfig) -> anyhow::Result<Self> {
        if !(0.0..=1.0).contains(&cfg.outlier_percentile) {
            anyhow::bail!(
                "outlier_percentile must be a fraction between 0 and 1, got {}",
                cfg.outlier_percentile
            );
        }
        if !(cfg.outlier_multiplier.is_finite() && cfg.outlier_multiplier > 0.0) {
            anyhow::bail!("outlier_multiplier must be positive, got {}", cfg.outlier_multiplier);
        }

        let tz = timezones::get_by_name(&cfg.time_zone)
            .ok_or_else(|| anyhow::anyhow!("unknown time zone '{}'", cfg.time_zone))?;
        Ok(Self::new(
            cfg.sensor_prefix.clone(),
            tz,
            OutlierPolicy {
                percentile: cfg.outlier_percentile,
                multiplier: cfg.outlier_multiplier,
            },
        ))
    }

    pub fn process(&self, attachment: &Attachment) -> Result<ProcessedAttachment, AttachmentError> {
        let format = SheetFormat::from_filename(&attachment.filename);
        let rows = decode_rows(format, &attachment.bytes).map_err(|source| AttachmentError::Decode {
            filename: attachment.filename.clone(),
            source,
        })?;

        let (mut samples, rejected_rows) = self.collect_samples(&attachment.filename, &rows)?;
        if samples.is_empty() {
            return Err(AttachmentError::NoReadings {
                filename: attachment.filename.clone(),
            });
        }
        let outliers_removed = filter_outliers(&mut samples, &self.outliers);

        Ok(ProcessedAttachment {
            filename: attachment.filename.clone(),
            content_hash: blake3::hash(&attachment.bytes).to_hex().to_string(),
            samples,
            outliers_removed,
            rejected_rows,
        })
    }

    /// Unfiltered samples for every row that parses, plus the rows rejected
    /// for their local time. Malformed rows are skipped silently.
    fn collect_samples(
        &self,
        filename: &str,
        rows: &[Vec<Cell>],
    ) -> Result<(SampleSet, Vec<RowRejection>), AttachmentError> {
        let mut samples = SampleSet::new();
        let mut rejected = Vec::new();

        for (idx, cells) in rows.iter().enumerate() {
            match self.row_samples(cells) {
                Ok(row_samples) => samples.extend(row_samples),
                Err(e) if e.is_malformed() => {
                    tracing::trace!(row = idx, error = %e, "skipping malformed row");
                }
                Err(error @ RowError::AmbiguousTimestamp { .. }) => {
                    rejected.push(RowRejection { row: idx, error });
                }
                Err(source) => {
                    return Err(AttachmentError::Row {
                        filename: filename.to_string(),
                        row: idx,
                        source,
                    });
                }
            }
        }

        Ok((samples, rejected))
    }

    fn row_samples(&self, cells: &[Cell]) -> Result<Vec<Sample>, RowError> {
        let row = parse_row(cells)?;
        let timestamps = reconstruct_timestamps(row.day_anchor, row.interval_secs, self.time_zone)?;
        let sensor_id = format!("{}{}", self.sensor_prefix, row.sensor_key);

        Ok(timestamps
            .into_iter()
            .zip(row.values)
            .map(|(ts, value)| Sample {
                sensor_id: sensor_id.clone(),
                ts,
                value,
            })
            .collect())
    }
}
