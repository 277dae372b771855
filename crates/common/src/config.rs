use std::path::PathBuf;

use serde::Deserialize;

use crate::error::AppError;

/// Log output format for the binaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(AppError::Config(format!(
                "FACILITY_LOG_FORMAT must be `pretty` or `json` (got `{other}`)"
            ))),
        }
    }
}

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Built-in rule table to use when no rules file is given (default: credit)
    pub preset: String,

    /// JSON rule table overriding the preset
    pub rules_path: Option<PathBuf>,

    /// Directory receiving JSON/Markdown reports (default: reports)
    pub output_dir: PathBuf,

    /// Log output format (default: pretty)
    pub log_format: LogFormat,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            preset: non_empty("FACILITY_PRESET").unwrap_or_else(|| "credit".to_string()),
            rules_path: non_empty("FACILITY_RULES_PATH").map(PathBuf::from),
            output_dir: non_empty("FACILITY_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("reports")),
            log_format: non_empty("FACILITY_LOG_FORMAT")
                .map(|v| v.parse())
                .transpose()?
                .unwrap_or_default(),
        })
    }
}
