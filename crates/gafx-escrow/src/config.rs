//! # Engine Configuration
//!
//! Every field has a default, so an empty YAML document is a valid
//! configuration. Durations are whole seconds.
//!
//! ```yaml
//! payment_window_secs: 86400
//! fee_bps: 50
//! attachments:
//!   max_bytes: 10485760
//!   allowed_types: ["image/*", "application/pdf"]
//! ```

use std::path::Path;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use gafx_core::{CurrencyCode, FeeSchedule};

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Which attachments the chat accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AttachmentPolicy {
    pub max_bytes: u64,
    /// MIME types; a trailing `/*` matches the whole top-level type.
    pub allowed_types: Vec<String>,
}

impl Default for AttachmentPolicy {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            allowed_types: vec![
                "image/*".to_string(),
                "application/pdf".to_string(),
                "application/msword".to_string(),
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
                    .to_string(),
            ],
        }
    }
}

impl AttachmentPolicy {
    pub fn allows(&self, mime: &str) -> bool {
        let mime = mime.trim().to_ascii_lowercase();
        self.allowed_types.iter().any(|pattern| match pattern.strip_suffix("/*") {
            Some(top) => mime
                .split_once('/')
                .is_some_and(|(t, sub)| t == top && !sub.is_empty()),
            None => *pattern == mime,
        })
    }
}

/// Tunables of the escrow engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Ticker of the escrowed token.
    pub token_currency: String,
    /// How long the buyer has to pay after the order is placed.
    pub payment_window_secs: u64,
    /// How long the seller is expected to take to confirm a claimed payment.
    pub release_window_secs: u64,
    /// Interval between deadline and retention sweeps.
    pub scan_interval_secs: u64,
    /// Maximum orders timed out per sweep.
    pub scan_batch_limit: usize,
    /// Platform fee in basis points.
    pub fee_bps: u32,
    /// How long a terminal order keeps its chat before archival.
    pub retention_grace_secs: u64,
    /// Attempts per ledger call when the ledger reports a transient failure.
    pub ledger_retry_attempts: u32,
    /// Delay before the first ledger retry. Doubles on every further retry.
    pub ledger_retry_backoff_ms: u64,
    pub max_text_len: usize,
    pub message_page_size: usize,
    pub attachments: AttachmentPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            token_currency: "GAF".to_string(),
            payment_window_secs: 24 * 60 * 60,
            release_window_secs: 24 * 60 * 60,
            scan_interval_secs: 30,
            scan_batch_limit: 500,
            fee_bps: FeeSchedule::DEFAULT_BPS,
            retention_grace_secs: 30 * 24 * 60 * 60,
            ledger_retry_attempts: 3,
            ledger_retry_backoff_ms: 200,
            max_text_len: 4000,
            message_page_size: 50,
            attachments: AttachmentPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        // An empty document deserializes to unit, not an empty map.
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&yaml)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        CurrencyCode::new(self.token_currency.clone())
            .map_err(|e| ConfigError::Invalid(format!("token_currency: {e}")))?;
        FeeSchedule::new(self.fee_bps).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        let positive = [
            ("payment_window_secs", self.payment_window_secs),
            ("release_window_secs", self.release_window_secs),
            ("scan_interval_secs", self.scan_interval_secs),
            ("ledger_retry_attempts", u64::from(self.ledger_retry_attempts)),
            ("max_text_len", self.max_text_len as u64),
            ("message_page_size", self.message_page_size as u64),
            ("scan_batch_limit", self.scan_batch_limit as u64),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be positive")));
            }
        }
        // chrono::Duration::seconds panics above i64::MAX / 1000.
        let windows = [
            ("payment_window_secs", self.payment_window_secs),
            ("release_window_secs", self.release_window_secs),
            ("retention_grace_secs", self.retention_grace_secs),
        ];
        for (name, value) in windows {
            if value > MAX_WINDOW_SECS {
                return Err(ConfigError::Invalid(format!("{name} exceeds {MAX_WINDOW_SECS}")));
            }
        }
        Ok(())
    }

    pub fn token_currency(&self) -> Result<CurrencyCode, ConfigError> {
        CurrencyCode::new(self.token_currency.clone())
            .map_err(|e| ConfigError::Invalid(format!("token_currency: {e}")))
    }

    pub fn fee_schedule(&self) -> Result<FeeSchedule, ConfigError> {
        FeeSchedule::new(self.fee_bps).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn payment_window(&self) -> Duration {
        secs(self.payment_window_secs)
    }

    pub fn release_window(&self) -> Duration {
        secs(self.release_window_secs)
    }

    pub fn retention_grace(&self) -> Duration {
        secs(self.retention_grace_secs)
    }

    pub fn scan_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.scan_interval_secs)
    }

    /// Delay before ledger attempt `attempt + 1`, for `attempt >= 1`:
    /// the base backoff doubled per earlier retry, capped at one minute.
    pub fn ledger_retry_delay(&self, attempt: u32) -> std::time::Duration {
        let doublings = attempt.saturating_sub(1).min(16);
        let millis = self
            .ledger_retry_backoff_ms
            .saturating_mul(1u64 << doublings)
            .min(MAX_RETRY_DELAY_MS);
        std::time::Duration::from_millis(millis)
    }
}

/// One hundred years.
const MAX_WINDOW_SECS: u64 = 100 * 365 * 24 * 60 * 60;

const MAX_RETRY_DELAY_MS: u64 = 60_000;

fn secs(value: u64) -> Duration {
    Duration::seconds(value.min(MAX_WINDOW_SECS) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.fee_bps, 50);
        assert_eq!(config.payment_window(), Duration::hours(24));
        assert_eq!(config.token_currency().unwrap().as_str(), "GAF");
    }

    #[test]
    fn empty_yaml_yields_defaults() {
        assert_eq!(EngineConfig::from_yaml_str("").unwrap(), EngineConfig::default());
        assert_eq!(EngineConfig::from_yaml_str("{}").unwrap(), EngineConfig::default());
    }

    #[test]
    fn partial_yaml_overrides() {
        let config = EngineConfig::from_yaml_str(
            "payment_window_secs: 900\nfee_bps: 100\nattachments:\n  max_bytes: 1024\n",
        )
        .unwrap();
        assert_eq!(config.payment_window(), Duration::minutes(15));
        assert_eq!(config.fee_schedule().unwrap().fee_for(1000), 10);
        assert_eq!(config.attachments.max_bytes, 1024);
        assert_eq!(
            config.attachments.allowed_types,
            AttachmentPolicy::default().allowed_types
        );
        assert_eq!(config.scan_interval_secs, 30);
    }

    #[test]
    fn unknown_field_rejected() {
        let err = EngineConfig::from_yaml_str("payment_windw_secs: 10\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn invalid_values_rejected() {
        for yaml in [
            "fee_bps: 20000",
            "scan_interval_secs: 0",
            "token_currency: gaf",
            "ledger_retry_attempts: 0",
            "payment_window_secs: 18446744073709551615",
        ] {
            let err = EngineConfig::from_yaml_str(yaml).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "{yaml}: {err}");
        }
    }

    #[test]
    fn ledger_retry_delay_doubles_and_caps() {
        let config = EngineConfig::default();
        let delays: Vec<u64> = (1..=3)
            .map(|a| config.ledger_retry_delay(a).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![200, 400, 800]);
        assert_eq!(config.ledger_retry_delay(40).as_secs(), 60);

        let immediate = EngineConfig {
            ledger_retry_backoff_ms: 0,
            ..EngineConfig::default()
        };
        assert!(immediate.ledger_retry_delay(2).is_zero());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "release_window_secs: 3600").unwrap();
        let config = EngineConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.release_window(), Duration::hours(1));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = EngineConfig::from_yaml_file("/nonexistent/escrow.yaml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/escrow.yaml"));
    }

    #[test]
    fn attachment_policy_matching() {
        let policy = AttachmentPolicy::default();
        assert!(policy.allows("image/png"));
        assert!(policy.allows("IMAGE/JPEG"));
        assert!(policy.allows("application/pdf"));
        assert!(policy.allows(
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        ));
        assert!(!policy.allows("image/"));
        assert!(!policy.allows("application/zip"));
        assert!(!policy.allows("text/html"));
    }
}
