//! Option sources: delimited data files turned into selectable menu entries.
//!
//! Each file has a header row with at least a `label` column. The optional
//! `value`, `phone` and `username` (or `handle`) columns fill the rest of the
//! record. Rows keep file order.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SourceError;

/// Marker stored in contact fields the source left blank.
pub const NOT_PROVIDED: &str = "Not provided";

const LABEL_COLUMN: &str = "label";
const VALUE_COLUMN: &str = "value";
const PHONE_COLUMN: &str = "phone";
const HANDLE_COLUMNS: [&str; 2] = ["username", "handle"];

/// One selectable entry, derived from one data-file row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuOption {
    /// Display name, trimmed and unique within its source.
    pub label: String,
    /// Stable identifier; the label when the source has none.
    pub value: String,
    /// Phone number or [`NOT_PROVIDED`].
    pub phone: String,
    /// Chat handle or [`NOT_PROVIDED`].
    pub handle: String,
}

impl MenuOption {
    /// Option with only a label; everything else falls back to defaults.
    pub fn labelled(label: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            value: label.clone(),
            label,
            phone: NOT_PROVIDED.to_string(),
            handle: NOT_PROVIDED.to_string(),
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = phone.into();
        self
    }

    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.handle = handle.into();
        self
    }

    pub fn has_handle(&self) -> bool {
        self.handle != NOT_PROVIDED
    }
}

/// Find the option whose `value` matches.
pub fn find_by_value<'a>(options: &'a [MenuOption], value: &str) -> Option<&'a MenuOption> {
    options.iter().find(|o| o.value == value)
}

/// Read a delimited file into options, one per data row, in file order.
///
/// A file with a header and no rows yields an empty list; callers that need
/// at least one entry use [`load_required`].
pub fn load_options(path: &Path) -> Result<Vec<MenuOption>, SourceError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(false)
        .from_path(path)
        .map_err(|e| SourceError::from_csv(path, e))?;

    let headers = reader
        .headers()
        .map_err(|e| SourceError::from_csv(path, e))?
        .clone();

    let column = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
    let label_idx = column(LABEL_COLUMN).ok_or_else(|| SourceError::MissingColumn {
        path: path.to_path_buf(),
        column: LABEL_COLUMN.to_string(),
    })?;
    let value_idx = column(VALUE_COLUMN);
    let phone_idx = column(PHONE_COLUMN);
    let handle_idx = HANDLE_COLUMNS.iter().find_map(|name| column(name));

    let mut options = Vec::new();
    let mut seen = HashSet::new();

    for record in reader.records() {
        let record = record.map_err(|e| SourceError::from_csv(path, e))?;
        let field = |idx: Option<usize>| {
            idx.and_then(|i| record.get(i))
                .map(str::trim)
                .filter(|s| !s.is_empty())
        };

        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let label = field(Some(label_idx)).ok_or_else(|| SourceError::Malformed {
            path: path.to_path_buf(),
            reason: format!("empty label on line {line}"),
        })?;

        if !seen.insert(label.to_string()) {
            return Err(SourceError::DuplicateLabel {
                path: path.to_path_buf(),
                label: label.to_string(),
            });
        }

        options.push(MenuOption {
            label: label.to_string(),
            value: field(value_idx).unwrap_or(label).to_string(),
            phone: field(phone_idx).unwrap_or(NOT_PROVIDED).to_string(),
            handle: field(handle_idx).unwrap_or(NOT_PROVIDED).to_string(),
        });
    }

    tracing::debug!(path = %path.display(), count = options.len(), "Loaded option source");
    Ok(options)
}

/// Like [`load_options`], but an empty source is an error.
pub fn load_required(path: &Path) -> Result<Vec<MenuOption>, SourceError> {
    let options = load_options(path)?;
    if options.is_empty() {
        return Err(SourceError::Empty {
            path: path.to_path_buf(),
        });
    }
    Ok(options)
}

/// Load a required source off the async runtime's worker threads.
pub async fn load_required_async(path: &Path) -> Result<Vec<MenuOption>, SourceError> {
    let owned = path.to_path_buf();
    match tokio::task::spawn_blocking(move || load_required(&owned)).await {
        Ok(result) => result,
        Err(join_err) => Err(SourceError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::other(join_err.to_string()),
        }),
    }
}
