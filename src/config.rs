//! Configuration
//!
//! Loaded once at startup from a TOML file (default
//! `$HOME/.dlrfetch/dlrfetch.toml`) with `DLRFETCH_*` environment
//! overrides. The database path is the pass-through "connection string"
//! to the DLR source database and is required; a missing or unreadable
//! configuration is fatal.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use config::Config;

use crate::errors::{DlrError, Result};

pub struct DlrConfig {
    /// Path to the DLR source database
    pub db_path: String,

    /// Directory holding rule files and exported tables
    pub data_dir: String,
}

const EMPTY_CONFIG: &str = r#"### dlrfetch configuration file

### path to the DLR source database (required)
# db_path = "/srv/dlr/general_lr4.sqlite3"

### directory for rule files and exported tables
# data_dir = "~/.dlrfetch"
"#;

impl DlrConfig {
    /// Create and initialize a new configuration, writing a template file
    /// on first run.
    pub fn new(path: &Option<String>) -> Result<DlrConfig> {
        let mut builder = Config::builder();

        let home_dir = dirs::home_dir()
            .ok_or_else(|| DlrError::Config("could not find home directory".to_string()))?
            .to_str()
            .ok_or_else(|| {
                DlrError::Config("could not convert home directory path to string".to_string())
            })?
            .to_owned();

        let dlrfetch_dir = format!("{}/.dlrfetch", home_dir.as_str());

        match path {
            Some(p) => {
                let path = Path::new(p.as_str());
                if path.exists() {
                    let path_str = path.to_str().ok_or_else(|| {
                        DlrError::Config("could not convert path to string".to_string())
                    })?;
                    builder = builder.add_source(config::File::with_name(path_str));
                } else {
                    std::fs::write(p.as_str(), EMPTY_CONFIG).map_err(|e| {
                        DlrError::Config(format!("unable to create config file {p}: {e}"))
                    })?;
                }
            }
            None => {
                std::fs::create_dir_all(dlrfetch_dir.as_str()).map_err(|e| {
                    DlrError::Config(format!("unable to create dlrfetch directory: {e}"))
                })?;
                let p = format!("{}/dlrfetch.toml", dlrfetch_dir.as_str());
                if Path::new(p.as_str()).exists() {
                    builder = builder.add_source(config::File::with_name(p.as_str()));
                } else {
                    std::fs::write(p.as_str(), EMPTY_CONFIG).map_err(|e| {
                        DlrError::Config(format!("unable to create config file {p}: {e}"))
                    })?;
                }
            }
        }

        // E.g. `DLRFETCH_DB_PATH=/srv/dlr.sqlite3 dlrfetch ...`
        builder = builder.add_source(config::Environment::with_prefix("DLRFETCH"));

        let settings = builder
            .build()
            .map_err(|e| DlrError::Config(format!("failed to build configuration: {e}")))?;

        let config = settings
            .try_deserialize::<HashMap<String, String>>()
            .map_err(|e| DlrError::Config(format!("failed to deserialize configuration: {e}")))?;

        let db_path = config.get("db_path").cloned().ok_or_else(|| {
            DlrError::Config(format!(
                "db_path is not set; add it to {} or set DLRFETCH_DB_PATH",
                Self::config_file_path()
            ))
        })?;

        let data_dir = match config.get("data_dir") {
            Some(p) => p.clone(),
            None => {
                std::fs::create_dir_all(dlrfetch_dir.as_str()).map_err(|e| {
                    DlrError::Config(format!("unable to create data directory: {e}"))
                })?;
                dlrfetch_dir
            }
        };

        Ok(DlrConfig { db_path, data_dir })
    }

    /// Directory that exported tables are written to
    pub fn tables_dir(&self) -> PathBuf {
        Path::new(self.data_dir.trim_end_matches('/')).join("tables")
    }

    /// Directory holding the anonymization rule files
    pub fn anonymise_dir(&self) -> PathBuf {
        Path::new(self.data_dir.trim_end_matches('/')).join("anonymise")
    }

    /// Display configuration summary
    pub fn summary(&self) -> String {
        let lines = vec![
            format!("Database Path:      {}", self.db_path),
            format!("Data Directory:     {}", self.data_dir),
            format!("Tables Directory:   {}", self.tables_dir().display()),
            format!("Rules Directory:    {}", self.anonymise_dir().display()),
        ];
        lines.join("\n")
    }

    /// Get the config file path
    pub fn config_file_path() -> String {
        let home_dir = dirs::home_dir()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|| "~".to_string());
        format!("{}/.dlrfetch/dlrfetch.toml", home_dir)
    }
}
