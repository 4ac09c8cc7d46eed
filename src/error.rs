//! Error types for the ops-plan bot.

use std::path::PathBuf;

/// Top-level error type for the bot.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Option source error: {0}")]
    Source(#[from] SourceError),

    #[error("Wizard error: {0}")]
    Wizard(#[from] WizardError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl Error {
    /// Short plain-text notice safe to show to the person driving the wizard.
    ///
    /// Never includes paths, causes, or other internal detail.
    pub fn user_notice(&self) -> &'static str {
        match self {
            Self::Source(_) => {
                "Sorry, the ops plan could not be started right now. Please try again later."
            }
            Self::Wizard(e) => e.user_notice(),
            Self::Config(_) | Self::Transport(_) => {
                "Something went wrong on our side. Please try again later."
            }
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Failures while turning a delimited data file into menu options.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Option source not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Failed to read option source {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed option source {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("Option source {path} has no `{column}` column")]
    MissingColumn { path: PathBuf, column: String },

    #[error("Option source {path} lists `{label}` more than once")]
    DuplicateLabel { path: PathBuf, label: String },

    #[error("Option source {path} has no rows")]
    Empty { path: PathBuf },
}

impl SourceError {
    /// Wrap a `csv` failure, keeping the path for the log line.
    pub(crate) fn from_csv(path: &std::path::Path, err: csv::Error) -> Self {
        let path = path.to_path_buf();
        if err.is_io_error() {
            match err.into_kind() {
                csv::ErrorKind::Io(source) if source.kind() == std::io::ErrorKind::NotFound => {
                    Self::NotFound { path }
                }
                csv::ErrorKind::Io(source) => Self::Io { path, source },
                other => Self::Malformed {
                    path,
                    reason: format!("{other:?}"),
                },
            }
        } else {
            Self::Malformed {
                path,
                reason: err.to_string(),
            }
        }
    }
}

/// Recoverable wizard errors. Never surfaced as hard failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WizardError {
    #[error("Invalid selection for {widget_id}: {reason}")]
    InvalidSelection { widget_id: String, reason: String },

    #[error("No active ops plan for user {user_id}")]
    SessionMissing { user_id: String },
}

impl WizardError {
    pub fn user_notice(&self) -> &'static str {
        match self {
            Self::InvalidSelection { .. } => "That selection was not valid. Please choose again.",
            Self::SessionMissing { .. } => {
                "This menu is no longer active. Start a new ops plan to continue."
            }
        }
    }
}

/// Transport (chat gateway) errors.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Transport {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send message on {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Failed to update message on {name}: {reason}")]
    UpdateFailed { name: String, reason: String },

    #[error("Invalid message reference: {0}")]
    InvalidMessage(String),

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_notice_hides_path() {
        let err = Error::from(SourceError::NotFound {
            path: PathBuf::from("/srv/secret/places.csv"),
        });
        assert!(!err.user_notice().contains("places.csv"));
        assert!(err.to_string().contains("places.csv"));
    }

    #[test]
    fn wizard_notices_are_short_plain_text() {
        let invalid = WizardError::InvalidSelection {
            widget_id: "opsplan:people".into(),
            reason: "empty".into(),
        };
        let missing = WizardError::SessionMissing {
            user_id: "42".into(),
        };
        for notice in [invalid.user_notice(), missing.user_notice()] {
            assert!(!notice.is_empty());
            assert!(!notice.contains('\n'));
            assert!(!notice.contains("opsplan:"));
        }
    }

    #[test]
    fn transport_error_maps_to_generic_notice() {
        let err = Error::from(TransportError::Http("502 from upstream".into()));
        assert!(!err.user_notice().contains("502"));
    }
}
