use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Paths
    pub data_dir: PathBuf,
    pub index_file: String,

    // Worker de escritura
    pub writer_thread_name: String,

    // Mantenimiento
    pub refresh_after_days: u64, // Entradas sin uso durante más días se revalidan

    // Logging
    pub log_level: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Paths
            data_dir: std::env::var("DATA_DIR")
                .unwrap_or_else(|_| "/app/data".to_string())
                .into(),
            index_file: std::env::var("REDIRECT_INDEX_FILE")
                .unwrap_or_else(|_| "redirect_index.json".to_string()),

            // Worker
            writer_thread_name: std::env::var("REDIRECT_WRITER_THREAD")
                .unwrap_or_else(|_| "redirect-index-writer".to_string()),

            // Mantenimiento
            refresh_after_days: std::env::var("REDIRECT_REFRESH_AFTER_DAYS")
                .unwrap_or_else(|_| "14".to_string())
                .parse()?,

            // Logging
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - The index file name must be a plain, non-empty file name
    /// - The writer thread needs a name
    /// - The refresh window must be at least one day
    /// - The log level must be one `tracing` understands
    pub fn validate(&self) -> Result<()> {
        if self.index_file.trim().is_empty() {
            anyhow::bail!("Index file name must not be empty");
        }

        if self.index_file.contains('/') || self.index_file.contains('\\') {
            anyhow::bail!(
                "Index file must be a file name inside DATA_DIR, got: {}",
                self.index_file
            );
        }

        if self.writer_thread_name.trim().is_empty() {
            anyhow::bail!("Writer thread name must not be empty");
        }

        if self.refresh_after_days == 0 {
            anyhow::bail!("Refresh window must be at least 1 day");
        }

        if !matches!(
            self.log_level.to_ascii_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            anyhow::bail!("Unknown log level: {}", self.log_level);
        }

        Ok(())
    }

    /// Full path of the JSON redirect index
    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join(&self.index_file)
    }

    /// Returns a summary of the current configuration for logging.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Index: {}\n  \
            Writer thread: {}\n  \
            Refresh after: {} days\n  \
            Log level: {}",
            self.index_path().display(),
            self.writer_thread_name,
            self.refresh_after_days,
            self.log_level
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: "/app/data".into(),
            index_file: "redirect_index.json".to_string(),
            writer_thread_name: "redirect-index-writer".to_string(),
            refresh_after_days: 14, // 2 semanas
            log_level: "info".to_string(),
        }
    }
}
