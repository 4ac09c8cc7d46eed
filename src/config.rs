//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Telegram transport settings. Present only when a bot token is configured.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    /// Usernames or numeric ids allowed to drive the bot. `*` allows everyone.
    pub allowed_users: Vec<String>,
}

/// Wizard behaviour.
#[derive(Debug, Clone)]
pub struct WizardConfig {
    /// Command that starts a new ops plan.
    pub trigger: String,
    /// Command that replaces the text of the last posted plan.
    pub edit_trigger: String,
    /// People option source.
    pub people_path: PathBuf,
    /// Place option source.
    pub places_path: PathBuf,
    /// How long the comment step waits before completing without one.
    pub comment_timeout: Duration,
    /// Sessions untouched for this long are discarded.
    pub session_idle_timeout: Duration,
    /// How often idle sessions are swept.
    pub sweep_interval: Duration,
    /// Printed in the summary; the section is skipped when empty.
    pub container_codes: Vec<String>,
}

impl Default for WizardConfig {
    fn default() -> Self {
        Self {
            trigger: "!opsplan".to_string(),
            edit_trigger: "!editplan".to_string(),
            people_path: PathBuf::from("Data/people_on_shift.csv"),
            places_path: PathBuf::from("Data/places.csv"),
            comment_timeout: Duration::from_secs(30),
            session_idle_timeout: Duration::from_secs(900), // 15 minutes
            sweep_interval: Duration::from_secs(60),
            container_codes: Vec::new(),
        }
    }
}

/// A setting that could not be parsed and was replaced by its default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub key: String,
    pub value: String,
    pub default_secs: u64,
}

impl ConfigWarning {
    /// Report through `tracing`. Call once logging is installed.
    pub fn log(&self) {
        tracing::warn!(
            key = %self.key,
            value = %self.value,
            default_secs = self.default_secs,
            "Invalid number in environment, using default"
        );
    }
}

/// Everything the binary needs to run.
#[derive(Debug, Clone, Default)]
pub struct BotConfig {
    /// `None` runs the bot on the local CLI.
    pub telegram: Option<TelegramConfig>,
    pub wizard: WizardConfig,
    /// Directory for a daily-rolling log file, in addition to stderr.
    pub log_dir: Option<PathBuf>,
    /// Values that fell back to defaults. Config is read before logging
    /// starts, so these are held until the subscriber is up.
    pub warnings: Vec<ConfigWarning>,
}

impl BotConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = WizardConfig::default();
        let mut warnings = Vec::new();

        let telegram = lookup("TELEGRAM_BOT_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .map(|token| TelegramConfig {
                bot_token: SecretString::from(token),
                allowed_users: lookup("TELEGRAM_ALLOWED_USERS")
                    .map(|v| comma_list(&v))
                    .unwrap_or_else(|| vec!["*".to_string()]),
            });

        let wizard = WizardConfig {
            trigger: lookup("OPSPLAN_TRIGGER")
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .unwrap_or(defaults.trigger),
            edit_trigger: lookup("OPSPLAN_EDIT_TRIGGER")
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .unwrap_or(defaults.edit_trigger),
            people_path: lookup("OPSPLAN_PEOPLE_CSV")
                .map(PathBuf::from)
                .unwrap_or(defaults.people_path),
            places_path: lookup("OPSPLAN_PLACES_CSV")
                .map(PathBuf::from)
                .unwrap_or(defaults.places_path),
            comment_timeout: secs(
                &lookup,
                "OPSPLAN_COMMENT_TIMEOUT_SECS",
                defaults.comment_timeout,
                &mut warnings,
            )?,
            session_idle_timeout: secs(
                &lookup,
                "OPSPLAN_SESSION_IDLE_SECS",
                defaults.session_idle_timeout,
                &mut warnings,
            )?,
            sweep_interval: secs(
                &lookup,
                "OPSPLAN_SWEEP_INTERVAL_SECS",
                defaults.sweep_interval,
                &mut warnings,
            )?,
            container_codes: lookup("OPSPLAN_CONTAINER_CODES")
                .map(|v| comma_list(&v))
                .unwrap_or_default(),
        };

        Ok(Self {
            telegram,
            wizard,
            log_dir: lookup("OPSPLAN_LOG_DIR")
                .filter(|d| !d.trim().is_empty())
                .map(PathBuf::from),
            warnings,
        })
    }
}

/// Seconds from the environment. Unparseable values record a warning and
/// use the default.
fn secs(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
    warnings: &mut Vec<ConfigWarning>,
) -> Result<Duration, ConfigError> {
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be greater than zero".to_string(),
        }),
        Ok(n) => Ok(Duration::from_secs(n)),
        Err(_) => {
            warnings.push(ConfigWarning {
                key: key.to_string(),
                value: raw,
                default_secs: default.as_secs(),
            });
            Ok(default)
        }
    }
}

fn comma_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
