use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Environment variable that overrides `imap.password`.
pub const PASSWORD_ENV: &str = "MEA_IMAP_PASSWORD";

#[derive(Debug, Clone, Deserialize)]
pub struct ImapConfig {
    pub host: String,
    #[serde(default = "default_imap_port")]
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_mailbox")]
    pub mailbox: String,
    #[serde(default = "default_search")]
    pub search: String,
    #[serde(default)]
    pub starttls: bool,
}

impl ImapConfig {
    pub fn password(&self) -> anyhow::Result<String> {
        if let Ok(pw) = std::env::var(PASSWORD_ENV) {
            return Ok(pw);
        }
        self.password
            .clone()
            .ok_or_else(|| anyhow::anyhow!("imap.password is not set and {PASSWORD_ENV} is empty"))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub sensor_prefix: String,
    pub time_zone: String,
    pub outlier_percentile: f64,
    pub outlier_multiplier: f64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            sensor_prefix: "mea_".to_string(),
            time_zone: "America/Anchorage".to_string(),
            outlier_percentile: 0.95,
            outlier_multiplier: 2.5,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileNaming {
    /// `<epoch seconds>.<millis>.csv` at write time.
    #[default]
    Timestamp,
    /// `<blake3 of the attachment bytes>.csv`.
    ContentHash,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub naming: FileNaming,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub directory: String,
    pub file_name: String,
    pub max_log_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: "email-logs".to_string(),
            file_name: "mea-email.log".to_string(),
            max_log_files: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub textfile_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_base_dir")]
    pub base_dir: String,
    pub imap: Option<ImapConfig>,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub metrics: Option<MetricsConfig>,
}

fn default_imap_port() -> u16 {
    993
}

fn default_mailbox() -> String {
    "INBOX".to_string()
}

fn default_search() -> String {
    "UNSEEN".to_string()
}

fn default_base_dir() -> String {
    "~/mea-data".to_string()
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("MEA_INGEST_CONFIG").unwrap_or_else(|_| "mea-ingest.toml".to_string());
        let contents = fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("failed to read config '{path}': {e}"))?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        Ok(cfg)
    }

    pub fn base_dir(&self) -> PathBuf {
        expand_home(&self.base_dir)
    }

    /// Directory the CSV output is written to.
    pub fn data_dir(&self) -> PathBuf {
        self.base_dir().join("data")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.base_dir().join(&self.logging.directory)
    }
}

fn expand_home(raw: &str) -> PathBuf {
    let path = Path::new(raw);
    match path.strip_prefix("~") {
        Ok(rest) => match home::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}
