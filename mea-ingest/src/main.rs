use anyhow::{Context, Result};
use mea_ingest::{
    config::AppConfig,
    metrics_textfile,
    observability,
    pipeline::Pipeline,
    sinks::CsvDirSink,
    sources::ImapMailSource,
    transform::{AttachmentProcessor, MessageProcessor},
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load configuration
    let cfg = AppConfig::load()?;

    let _log_guard = observability::init_tracing_with_file(&cfg.logging, &cfg.log_dir())?;

    if cfg.metrics.is_some() {
        metrics_textfile::init()?;
    }

    let imap_cfg = cfg.imap.as_ref().context("missing [imap] section in config")?;
    let processor = AttachmentProcessor::from_config(&cfg.processing)?;

    let data_dir = cfg.data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("cannot create output directory {}", data_dir.display()))?;

    let source = ImapMailSource::connect(imap_cfg).await.map_err(|e| {
        tracing::error!(error = %e, "mail source unavailable");
        e
    })?;

    let pipeline = Pipeline {
        source,
        processor: MessageProcessor::new(processor),
        sink: CsvDirSink::new(data_dir, cfg.output.naming),
    };

    let summary = match pipeline.run().await {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!(error = %e, "mail run aborted");
            return Err(e.into());
        }
    };

    tracing::info!(
        messages = summary.messages,
        attachments = summary.attachments,
        files = summary.files.len(),
        records = summary.records_written,
        rows_rejected = summary.rows_rejected,
        message_failures = summary.message_failures(),
        attachment_failures = summary.attachment_failures(),
        "mail run finished"
    );

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_textfile::write_textfile(&metrics_cfg.textfile_path)?;
    }

    Ok(())
}
