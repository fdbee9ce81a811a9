use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    pub upload: UploadConfig,
    pub transfer: TransferConfig,
    /// JSON file replacing the built-in workspace catalog
    pub workspaces_file: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Maximum size of a single uploaded file in bytes
    pub max_upload_size: u64,
    /// Maximum size of a whole multipart request in bytes
    pub max_request_size: u64,
    pub initial: RunTiming,
    pub retry: RunTiming,
}

/// Pacing of one pass over a session's files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunTiming {
    /// Wait after the request returns, before the first file
    pub start_delay: Duration,
    /// Wait spent on each file before its outcome is decided
    pub file_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct TransferConfig {
    pub initial_failure_rate: f64,
    pub retry_failure_rate: f64,
    /// Seed for reproducible simulated outcomes
    pub seed: Option<u64>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_upload_size: 50 * 1024 * 1024,
            max_request_size: 500 * 1024 * 1024,
            initial: RunTiming {
                start_delay: Duration::from_millis(1000),
                file_delay: Duration::from_millis(500),
            },
            retry: RunTiming {
                start_delay: Duration::from_millis(500),
                file_delay: Duration::from_millis(300),
            },
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            initial_failure_rate: 0.10,
            retry_failure_rate: 0.05,
            seed: None,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

fn env_millis(name: &str, default: Duration) -> Duration {
    env_parse(name).map(Duration::from_millis).unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let defaults = UploadConfig::default();
        let upload = UploadConfig {
            max_upload_size: env_parse("MAX_UPLOAD_SIZE").unwrap_or(defaults.max_upload_size),
            max_request_size: env_parse("MAX_REQUEST_SIZE").unwrap_or(defaults.max_request_size),
            initial: RunTiming {
                start_delay: env_millis("UPLOAD_START_DELAY_MS", defaults.initial.start_delay),
                file_delay: env_millis("UPLOAD_FILE_DELAY_MS", defaults.initial.file_delay),
            },
            retry: RunTiming {
                start_delay: env_millis("RETRY_START_DELAY_MS", defaults.retry.start_delay),
                file_delay: env_millis("RETRY_FILE_DELAY_MS", defaults.retry.file_delay),
            },
        };

        let transfer_defaults = TransferConfig::default();
        let transfer = TransferConfig {
            initial_failure_rate: env_parse("UPLOAD_FAILURE_RATE")
                .unwrap_or(transfer_defaults.initial_failure_rate),
            retry_failure_rate: env_parse("RETRY_FAILURE_RATE")
                .unwrap_or(transfer_defaults.retry_failure_rate),
            seed: env_parse("TRANSFER_SEED"),
        };

        let workspaces_file = std::env::var("WORKSPACES_FILE")
            .ok()
            .filter(|s| !s.trim().is_empty());

        let config = Config {
            bind_address,
            upload,
            transfer,
            workspaces_file,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind_address.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "BIND_ADDRESS cannot be empty".to_string(),
            ));
        }

        if self.upload.max_upload_size == 0 {
            return Err(ConfigError::ValidationError(
                "MAX_UPLOAD_SIZE must be greater than 0".to_string(),
            ));
        }

        if self.upload.max_upload_size > self.upload.max_request_size {
            return Err(ConfigError::ValidationError(
                "MAX_UPLOAD_SIZE cannot exceed MAX_REQUEST_SIZE".to_string(),
            ));
        }

        for (name, rate) in [
            ("UPLOAD_FAILURE_RATE", self.transfer.initial_failure_rate),
            ("RETRY_FAILURE_RATE", self.transfer.retry_failure_rate),
        ] {
            if !(0.0..=1.0).contains(&rate) {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be between 0 and 1, got {rate}"
                )));
            }
        }

        if self.transfer.seed.is_some() {
            tracing::warn!("TRANSFER_SEED is set; simulated upload outcomes are reproducible");
        }

        Ok(())
    }
}
