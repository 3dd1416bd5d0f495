use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::policy::DEFAULT_EMPLOYEE_TYPE;
use crate::policy::domain_rank::DEFAULT_SUFFIXES;
use crate::policy::email::DEFAULT_FREE_PROVIDERS;
use crate::policy::{CountRule, DomainRank, EntityKind, FreeEmailProviders};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Batch loop settings
    pub run: RunConfig,
    /// Bounded retry budgets for extraction and verification
    pub retry: RetryConfig,
    /// Per-step wait limits
    pub timeouts: TimeoutConfig,
    /// Record-selection policy
    pub policy: PolicyConfig,
    /// Browser adapter settings
    pub browser: BrowserConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Pairs to attempt in one run
    pub pairs: usize,
    /// Hard cap on `pairs`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_batch: Option<usize>,
    /// Reject a pair from the queue when it fails instead of leaving it
    pub auto_skip: bool,
    /// Decide and log, but cancel instead of merging
    pub dry_run: bool,
    /// Failed attempts on one pair before it is passed over for the rest of the run
    pub max_pair_failures: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            pairs: 10,
            max_batch: None,
            auto_skip: false,
            dry_run: false,
            max_pair_failures: 2,
        }
    }
}

impl RunConfig {
    /// Requested pair count after applying `max_batch`.
    pub fn effective_limit(&self) -> usize {
        match self.max_batch {
            Some(cap) => self.pairs.min(cap),
            None => self.pairs,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub extraction: RetrySettings,
    pub verification: RetrySettings,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            extraction: RetrySettings {
                max_attempts: 5,
                base_delay_ms: 500,
                max_delay_ms: 500,
                jitter_ratio: 0.0,
                attempt_timeout_ms: Some(5_000),
            },
            verification: RetrySettings {
                max_attempts: 3,
                base_delay_ms: 300,
                max_delay_ms: 300,
                jitter_ratio: 0.0,
                attempt_timeout_ms: Some(2_000),
            },
        }
    }
}

/// Serialized form of a [`RetryPolicy`]. Equal base and max delays give a
/// fixed delay; a larger max enables exponential backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_ratio: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt_timeout_ms: Option<u64>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 500,
            jitter_ratio: 0.0,
            attempt_timeout_ms: None,
        }
    }
}

impl RetrySettings {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms.max(self.base_delay_ms)),
            jitter_ratio: self.jitter_ratio,
            attempt_timeout: self.attempt_timeout_ms.map(Duration::from_millis),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Limit for any single UI step (locate, open, select, reject, cancel)
    pub step_ms: u64,
    /// Limit for a merge to report completion
    pub merge_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            step_ms: 10_000,
            merge_ms: 15_000,
        }
    }
}

impl TimeoutConfig {
    pub fn step(&self) -> Duration {
        Duration::from_millis(self.step_ms)
    }

    pub fn merge(&self) -> Duration {
        Duration::from_millis(self.merge_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub entity: EntityKind,
    pub count_rule: CountRule,
    /// Domain suffixes, most preferred first
    pub domain_ranks: Vec<String>,
    pub free_email_providers: Vec<String>,
    /// Contact type that keeps a contact pair in play
    pub employee_type: String,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            entity: EntityKind::default(),
            count_rule: CountRule::default(),
            domain_ranks: DEFAULT_SUFFIXES.iter().map(|s| format!(".{s}")).collect(),
            free_email_providers: DEFAULT_FREE_PROVIDERS.iter().map(|s| s.to_string()).collect(),
            employee_type: DEFAULT_EMPLOYEE_TYPE.to_string(),
        }
    }
}

impl PolicyConfig {
    pub fn domain_rank(&self) -> DomainRank {
        DomainRank::from_ordered(&self.domain_ranks)
    }

    pub fn free_providers(&self) -> FreeEmailProviders {
        FreeEmailProviders::new(&self.free_email_providers)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Duplicates queue URL
    pub url: String,
    /// Chrome user-data directory, so an existing login can be reused
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data_dir: Option<PathBuf>,
    pub headless: bool,
    /// How long to wait for a manual login to reach the queue
    pub login_timeout_ms: u64,
    /// Poll interval for page-state waits
    pub poll_interval_ms: u64,
    pub selectors: Selectors,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            url: "https://app.hubspot.com/duplicates".to_string(),
            user_data_dir: None,
            headless: false,
            login_timeout_ms: 300_000,
            poll_interval_ms: 250,
            selectors: Selectors::default(),
        }
    }
}

/// CSS selectors for the duplicates queue markup.
///
/// Field selectors are evaluated inside each record card of the comparison
/// modal, left card first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Selectors {
    pub review_button: String,
    pub row: String,
    pub row_record_name: String,
    pub reject_button: String,
    pub modal: String,
    pub cards: String,
    pub selected_card: String,
    pub record_name: String,
    pub contact_count: String,
    pub domain: String,
    pub email: String,
    pub phone: String,
    pub contact_type: String,
    pub merge_button: String,
    pub cancel_button: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            review_button: "button[aria-label='Review'][data-test-id='reviewDuplicates']".into(),
            row: "tr".into(),
            row_record_name: "td a".into(),
            reject_button: "button[data-test-id='rejectDuplicates']".into(),
            modal: "div.modal-dialog".into(),
            cards: "div.modal-dialog div[role='radiogroup'] > div".into(),
            selected_card: "[aria-checked='true']".into(),
            record_name: "h4".into(),
            contact_count: "dl dd:nth-child(6) span span span span".into(),
            domain: "dl dd:nth-child(2)".into(),
            email: "dl dd[data-property='email']".into(),
            phone: "dl dd[data-property='phone']".into(),
            contact_type: "dl dd[data-property='contact_type']".into(),
            merge_button: "div.modal-dialog footer button.private-button--primary".into(),
            cancel_button: "div.modal-dialog footer button.private-button--secondary".into(),
        }
    }
}

impl Config {
    /// Default location: `~/.mergepilot/config.toml`.
    pub fn default_path() -> PathBuf {
        let home_dir = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home_dir.join(".mergepilot").join("config.toml")
    }

    /// Load configuration from file.
    ///
    /// A missing file at the default location yields defaults; a missing file
    /// that was asked for explicitly is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (config_path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (Self::default_path(), false),
        };

        if !config_path.exists() {
            if explicit {
                anyhow::bail!("Config file not found: {}", config_path.display());
            }
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = self.to_toml()?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.run.pairs, 10);
        assert!(!config.run.auto_skip);
        assert_eq!(config.retry.extraction.max_attempts, 5);
        assert_eq!(config.retry.verification.max_attempts, 3);
        assert_eq!(config.policy.entity, EntityKind::Company);
        assert_eq!(config.policy.count_rule, CountRule::Strict);
        assert_eq!(config.policy.domain_rank().rank_of("x.com"), Some(1));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [run]
            pairs = 3
            auto_skip = true

            [policy]
            entity = "contact"
            count_rule = "margin"
            domain_ranks = [".org", ".com"]

            [retry.extraction]
            max_attempts = 4
            "#,
        )
        .unwrap();

        assert_eq!(config.run.pairs, 3);
        assert!(config.run.auto_skip);
        assert_eq!(config.run.max_pair_failures, 2);
        assert_eq!(config.policy.entity, EntityKind::Contact);
        assert_eq!(config.policy.count_rule, CountRule::Margin);
        assert_eq!(config.policy.domain_rank().rank_of("x.org"), Some(1));
        assert_eq!(config.retry.extraction.max_attempts, 4);
        assert_eq!(config.retry.extraction.base_delay_ms, 500);
        assert_eq!(config.timeouts.merge_ms, 15_000);
    }

    #[test]
    fn test_effective_limit() {
        let mut run = RunConfig {
            pairs: 50,
            ..Default::default()
        };
        assert_eq!(run.effective_limit(), 50);
        run.max_batch = Some(20);
        assert_eq!(run.effective_limit(), 20);
    }

    #[test]
    fn test_retry_settings_to_policy() {
        let policy = RetrySettings {
            max_attempts: 4,
            base_delay_ms: 200,
            max_delay_ms: 100,
            jitter_ratio: 0.0,
            attempt_timeout_ms: Some(50),
        }
        .to_policy();
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.max_delay, Duration::from_millis(200));
        assert_eq!(policy.attempt_timeout, Some(Duration::from_millis(50)));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.run.pairs = 7;
        config.policy.entity = EntityKind::Contact;
        config.save(&path).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.run.pairs, 7);
        assert_eq!(loaded.policy.entity, EntityKind::Contact);
        assert_eq!(loaded.browser.selectors, Selectors::default());
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load(Some(&dir.path().join("absent.toml")));
        assert!(result.is_err());
    }
}
