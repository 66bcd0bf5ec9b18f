use std::{fs, path::Path};

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static PROM_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Installs the global Prometheus recorder. The run is too short-lived to be
/// scraped, so the registry is rendered to a node-exporter textfile on exit
/// instead of being served over HTTP.
pub fn init() -> anyhow::Result<()> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    // Ignore error if the handle was already set; this should only be called once.
    let _ = PROM_HANDLE.set(handle);
    Ok(())
}

pub fn write_textfile(path: &Path) -> anyhow::Result<()> {
    let handle = PROM_HANDLE
        .get()
        .ok_or_else(|| anyhow::anyhow!("Prometheus recorder not initialized"))?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    // node-exporter may read the file at any moment, so swap it in whole.
    let tmp = path.with_extension("prom.tmp");
    fs::write(&tmp, handle.render())?;
    fs::rename(&tmp, path)?;
    Ok(())
}
