use std::{path::PathBuf, pin::Pin, time::SystemTime};

use futures::{Stream, StreamExt};
use tracing::Instrument;

use crate::transform::{
    attachment::{AttachmentError, ProcessedAttachment},
    message::{MailMessage, MessageReport},
};

#[derive(Debug, Clone)]
pub struct Envelope<T> {
    /// Source-assigned identity, handed back on acknowledgement.
    pub id: u32,
    pub payload: T,
    pub received_at: SystemTime,
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("source error: {0}")]
    Source(String),
    #[error("transform error: {0}")]
    Transform(String),
    #[error("sink error: {0}")]
    Sink(String),
}

#[async_trait::async_trait]
pub trait Source<T>: Send + Sync {
    async fn stream(
        &self,
    ) -> Pin<Box<dyn Stream<Item = Result<Envelope<T>, PipelineError>> + Send>>;

    /// Marks the item as consumed so it is not delivered again.
    async fn acknowledge(&self, id: u32) -> Result<(), PipelineError>;

    async fn close(&self) -> Result<(), PipelineError> {
        Ok(())
    }
}

#[async_trait::async_trait]
pub trait Transform<I, O>: Send + Sync {
    async fn apply(&self, input: Envelope<I>) -> Result<Envelope<O>, PipelineError>;
}

#[async_trait::async_trait]
pub trait Sink<T>: Send + Sync {
    /// Persists one item and returns where it landed.
    async fn write(&self, item: &T) -> Result<PathBuf, PipelineError>;
}

/// A failure that was caught and skipped during a run.
#[derive(Debug, Clone)]
pub struct BatchFailure {
    pub message_id: u32,
    /// `None` when the whole message failed.
    pub attachment: Option<String>,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub messages: usize,
    pub attachments: usize,
    pub records_written: usize,
    pub rows_rejected: usize,
    pub files: Vec<PathBuf>,
    pub failures: Vec<BatchFailure>,
}

impl RunSummary {
    pub fn message_failures(&self) -> usize {
        self.failures.iter().filter(|f| f.attachment.is_none()).count()
    }

    pub fn attachment_failures(&self) -> usize {
        self.failures.iter().filter(|f| f.attachment.is_some()).count()
    }
}

/// One mail batch: every message from the source is processed, its good
/// attachments written, and then it is acknowledged, one at a time.
///
/// Attachment and message failures are logged and collected in the
/// [`RunSummary`]; only source errors abort the run.
pub struct Pipeline<S, P, K> {
    pub source: S,
    pub processor: P,
    pub sink: K,
}

impl<S, P, K> Pipeline<S, P, K>
where
    S: Source<MailMessage> + Send + Sync + 'static,
    P: Transform<MailMessage, MessageReport> + Send + Sync + 'static,
    K: Sink<ProcessedAttachment> + Send + Sync + 'static,
{
    pub async fn run(self) -> Result<RunSummary, PipelineError> {
        let mut summary = RunSummary::default();
        let mut stream = self.source.stream().await;

        while let Some(item) = stream.next().await {
            let env = item?;
            let id = env.id;
            summary.messages += 1;
            metrics::counter!("mea_messages_total").increment(1);

            self.handle_message(env, &mut summary)
                .instrument(tracing::info_span!("message", seq = id))
                .await;

            self.source.acknowledge(id).await?;
        }

        self.source.close().await?;
        Ok(summary)
    }

    async fn handle_message(&self, env: Envelope<MailMessage>, summary: &mut RunSummary) {
        let message_id = env.id;
        let report = match self.processor.apply(env).await {
            Ok(report) => report.payload,
            Err(e) => {
                tracing::error!(error = %e, "error processing message");
                metrics::counter!("mea_message_failures_total").increment(1);
                summary.failures.push(BatchFailure {
                    message_id,
                    attachment: None,
                    error: e.to_string(),
                });
                return;
            }
        };

        for outcome in report.attachments {
            summary.attachments += 1;
            let filename = outcome.filename;
            let span = tracing::info_span!("attachment", filename = %filename);
            let result = self.write_attachment(outcome.result).instrument(span.clone()).await;

            span.in_scope(|| match result {
                Ok((processed, path)) => {
                    for rejection in &processed.rejected_rows {
                        tracing::warn!(row = rejection.row, error = %rejection.error, "row rejected");
                    }
                    tracing::info!(
                        path = %path.display(),
                        outliers_removed = processed.outliers_removed,
                        "{} records processed from {}",
                        processed.record_count(),
                        filename
                    );
                    metrics::counter!("mea_attachments_processed_total").increment(1);
                    metrics::counter!("mea_rows_rejected_total").increment(processed.rejected_rows.len() as u64);
                    metrics::counter!("mea_outliers_removed_total").increment(processed.outliers_removed as u64);
                    metrics::counter!("mea_samples_written_total").increment(processed.record_count() as u64);

                    summary.records_written += processed.record_count();
                    summary.rows_rejected += processed.rejected_rows.len();
                    summary.files.push(path);
                }
                Err(e) => {
                    tracing::error!(error = %e, "error processing attachment");
                    metrics::counter!("mea_attachment_failures_total").increment(1);
                    summary.failures.push(BatchFailure {
                        message_id,
                        attachment: Some(filename.clone()),
                        error: e.to_string(),
                    });
                }
            });
        }
    }

    async fn write_attachment(
        &self,
        result: Result<ProcessedAttachment, AttachmentError>,
    ) -> Result<(ProcessedAttachment, PathBuf), AttachmentError> {
        let processed = result?;
        let path = self
            .sink
            .write(&processed)
            .await
            .map_err(|e| AttachmentError::Write {
                filename: processed.filename.clone(),
                reason: e.to_string(),
            })?;
        Ok((processed, path))
    }
}
