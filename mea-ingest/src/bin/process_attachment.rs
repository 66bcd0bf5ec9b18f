use anyhow::{bail, Result};
use mea_ingest::{
    config::AppConfig,
    observability,
    pipeline::Sink,
    sinks::CsvDirSink,
    transform::{Attachment, AttachmentProcessor},
};
use std::{env, fs, path::Path};

/// Replays spreadsheet files through the same processing and CSV output as
/// the mail run, without touching the mailbox.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    observability::init_tracing();

    let paths: Vec<String> = env::args().skip(1).collect();
    if paths.is_empty() {
        bail!("usage: process_attachment <spreadsheet_path>...");
    }

    // Load configuration (can point MEA_INGEST_CONFIG to a replay-specific file).
    let cfg = AppConfig::load()?;
    let processor = AttachmentProcessor::from_config(&cfg.processing)?;
    let sink = CsvDirSink::new(cfg.data_dir(), cfg.output.naming);

    let mut failures = 0usize;
    for path in &paths {
        let filename = Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.clone());

        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(path = %path, error = %e, "cannot read file");
                failures += 1;
                continue;
            }
        };

        let processed = match processor.process(&Attachment { filename, bytes }) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(path = %path, error = %e, "error processing file");
                failures += 1;
                continue;
            }
        };

        for rejection in &processed.rejected_rows {
            tracing::warn!(path = %path, row = rejection.row, error = %rejection.error, "row rejected");
        }

        match sink.write(&processed).await {
            Ok(out) => tracing::info!(
                out = %out.display(),
                "{} records processed from {}",
                processed.record_count(),
                processed.filename
            ),
            Err(e) => {
                tracing::error!(path = %path, error = %e, "error writing output");
                failures += 1;
            }
        }
    }

    if failures > 0 {
        tracing::warn!(failures, total = paths.len(), "some files were not processed");
    }

    Ok(())
}
