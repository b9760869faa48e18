use crate::error::RicolError;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Serialize)]
pub struct JournalEntry<'a> {
    pub ts: String,
    pub command: &'a str,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<&'a str>,
}

impl<'a> JournalEntry<'a> {
    pub fn new(command: &'a str, target: Option<&'a str>, error_code: Option<&'a str>) -> Self {
        Self {
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            command,
            ok: error_code.is_none(),
            target,
            error_code,
        }
    }
}

// Only writes when the logs directory already exists; the journal never
// materializes the workspace on its own.
pub fn append(path: &Path, entry: &JournalEntry<'_>) -> Result<(), RicolError> {
    if !path.parent().map(Path::is_dir).unwrap_or(false) {
        return Ok(());
    }
    let mut line = serde_json::to_string(entry)?;
    line.push('\n');
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())?;
    Ok(())
}
