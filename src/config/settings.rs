//! Configuration settings and validation.

use std::path::PathBuf;
use std::time::Duration;

use crate::git::{DEFAULT_GIT_REPARSE_DELAY, PARSER_NAME};
use crate::parser::ParserConfig;
use crate::{Error, Result};

/// Main configuration for a diffwatch session.
#[derive(Debug, Clone)]
pub struct Config {
    /// Document to track.
    pub document: PathBuf,

    /// Debounce delay in milliseconds for passive triggers.
    ///
    /// Signed so that negative values coming from the command line or
    /// environment are rejected by [`validate`](Self::validate) instead of
    /// failing to parse.
    pub reparse_delay_ms: i64,

    /// Upper bound on debounce postponement in milliseconds.
    pub max_debounce_ms: Option<i64>,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON.
    pub log_json: bool,

    /// Watch the repository for changes.
    pub watch: bool,

    /// Reload the document when it changes on disk.
    pub follow_disk: bool,

    /// Publish cancelled parses as failures.
    pub report_cancellations: bool,

    /// Git executable.
    pub git: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            document: PathBuf::new(),
            reparse_delay_ms: duration_ms(DEFAULT_GIT_REPARSE_DELAY),
            max_debounce_ms: None,
            log_level: "info".to_string(),
            log_json: false,
            watch: true,
            follow_disk: true,
            report_cancellations: false,
            git: PathBuf::from("git"),
        }
    }
}

impl Config {
    /// Create a configuration tracking `document` with defaults.
    #[must_use]
    pub fn new(document: impl Into<PathBuf>) -> Self {
        Self {
            document: document.into(),
            ..Self::default()
        }
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.document.as_os_str().is_empty() {
            return Err(Error::config("document path cannot be empty"));
        }

        if self.reparse_delay_ms < 0 {
            return Err(Error::config(format!(
                "reparse_delay_ms cannot be negative: {}",
                self.reparse_delay_ms
            )));
        }

        if let Some(max) = self.max_debounce_ms {
            if max < self.reparse_delay_ms {
                return Err(Error::config(format!(
                    "max_debounce_ms ({max}) cannot be less than reparse_delay_ms ({})",
                    self.reparse_delay_ms
                )));
            }
        }

        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(Error::config(format!(
                "invalid log level '{}', must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.git.as_os_str().is_empty() {
            return Err(Error::config("git executable cannot be empty"));
        }

        Ok(())
    }

    /// Debounce delay.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured delay is negative.
    pub fn reparse_delay(&self) -> Result<Duration> {
        to_duration("reparse_delay_ms", self.reparse_delay_ms)
    }

    /// Parser settings for the git diff parser.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn parser_config(&self) -> Result<ParserConfig> {
        self.validate()?;

        Ok(ParserConfig {
            name: PARSER_NAME.to_string(),
            reparse_delay: self.reparse_delay()?,
            max_debounce: self
                .max_debounce_ms
                .map(|ms| to_duration("max_debounce_ms", ms))
                .transpose()?,
            report_cancellations: self.report_cancellations,
            ..ParserConfig::default()
        })
    }
}

fn to_duration(field: &str, millis: i64) -> Result<Duration> {
    u64::try_from(millis)
        .map(Duration::from_millis)
        .map_err(|_| Error::config(format!("{field} cannot be negative: {millis}")))
}

fn duration_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
