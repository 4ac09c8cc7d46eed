//! Roster matching: narrows the master people list to who is on shift.
//!
//! The roster export names people in a `DisplayName` column (or `label`).
//! Master rows whose label matches a roster name, trimmed and ignoring case,
//! are written out in master order as a people source for the wizard.

use std::collections::HashSet;
use std::path::Path;

use crate::error::SourceError;
use crate::options::{self, MenuOption, NOT_PROVIDED};

const ROSTER_NAME_COLUMNS: [&str; 2] = ["displayname", "label"];
const OUTPUT_HEADER: [&str; 4] = ["label", "value", "phone", "username"];

/// Names listed in a roster export, normalized for matching.
pub fn load_roster_names(path: &Path) -> Result<HashSet<String>, SourceError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| SourceError::from_csv(path, e))?;

    let headers = reader
        .headers()
        .map_err(|e| SourceError::from_csv(path, e))?
        .clone();
    let column = ROSTER_NAME_COLUMNS
        .iter()
        .find_map(|name| headers.iter().position(|h| h.eq_ignore_ascii_case(name)))
        .ok_or_else(|| SourceError::MissingColumn {
            path: path.to_path_buf(),
            column: "DisplayName".to_string(),
        })?;

    let mut names = HashSet::new();
    for record in reader.records() {
        let record = record.map_err(|e| SourceError::from_csv(path, e))?;
        if let Some(name) = record.get(column).map(normalize).filter(|n| !n.is_empty()) {
            names.insert(name);
        }
    }
    Ok(names)
}

/// Master rows whose label appears in `names`, in master order.
pub fn on_shift<'a>(master: &'a [MenuOption], names: &HashSet<String>) -> Vec<&'a MenuOption> {
    master
        .iter()
        .filter(|person| names.contains(&normalize(&person.label)))
        .collect()
}

/// Match `roster` against `people` and write the result to `out`.
///
/// Returns how many people were written.
pub fn match_roster(roster: &Path, people: &Path, out: &Path) -> Result<usize, SourceError> {
    let names = load_roster_names(roster)?;
    let master = options::load_options(people)?;
    let matched = on_shift(&master, &names);

    let mut writer = csv::Writer::from_path(out).map_err(|e| SourceError::from_csv(out, e))?;
    writer
        .write_record(OUTPUT_HEADER)
        .map_err(|e| SourceError::from_csv(out, e))?;
    for person in &matched {
        writer
            .write_record([
                person.label.as_str(),
                person.value.as_str(),
                provided(&person.phone),
                provided(&person.handle),
            ])
            .map_err(|e| SourceError::from_csv(out, e))?;
    }
    writer.flush().map_err(|source| SourceError::Io {
        path: out.to_path_buf(),
        source,
    })?;

    tracing::info!(
        roster = %roster.display(),
        people = %people.display(),
        out = %out.display(),
        roster_names = names.len(),
        matched = matched.len(),
        "Roster matched"
    );
    Ok(matched.len())
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

fn provided(field: &str) -> &str {
    if field == NOT_PROVIDED { "" } else { field }
}
