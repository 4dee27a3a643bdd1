//! Bulk lead import.
//!
//! Two input shapes are accepted: a YAML or JSON list of lead records, and
//! pipe-delimited lines
//!
//! ```text
//! business_name | email | phone | city | state | vertical
//! Acme Plumbing | john@acmeplumbing.com | 555-123-4567 | Phoenix | AZ | plumber
//! ```
//!
//! Rows are inserted one at a time. A row that fails validation or repeats
//! a known contact is reported and skipped; it never leaves partial data.

use crate::error::{LeadflowError, Result};
use crate::lead::NewLead;
use crate::store::LeadStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportFormat {
    Yaml,
    Json,
    Pipe,
}

impl ImportFormat {
    /// `.yaml`/`.yml` and `.json` by extension, pipe-delimited otherwise.
    pub fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("yaml") | Some("yml") => ImportFormat::Yaml,
            Some("json") => ImportFormat::Json,
            _ => ImportFormat::Pipe,
        }
    }

    fn default_source(self) -> &'static str {
        match self {
            ImportFormat::Yaml | ImportFormat::Json => "file_import",
            ImportFormat::Pipe => "bulk_paste",
        }
    }
}

/// A parsed row with its 1-based position (record index or line number).
#[derive(Debug, Clone, PartialEq)]
pub struct ImportRow {
    pub position: usize,
    pub lead: NewLead,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRow {
    pub position: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub added: usize,
    pub lead_ids: Vec<u64>,
    pub skipped: Vec<SkippedRow>,
}

fn non_empty(field: Option<&str>) -> Option<String> {
    field
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Parse one pipe-delimited line. Blank lines and `#` comments yield `None`.
pub fn parse_pipe_line(line: &str) -> Option<NewLead> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let parts: Vec<&str> = line.split('|').collect();
    Some(NewLead {
        business_name: parts[0].trim().to_string(),
        email: non_empty(parts.get(1).copied()),
        phone: non_empty(parts.get(2).copied()),
        city: non_empty(parts.get(3).copied()),
        state: non_empty(parts.get(4).copied()),
        vertical: non_empty(parts.get(5).copied()),
        ..Default::default()
    })
}

/// Parse `text` into rows. Structural YAML/JSON errors fail the whole file.
pub fn parse(text: &str, format: ImportFormat) -> Result<Vec<ImportRow>> {
    let leads: Vec<(usize, NewLead)> = match format {
        ImportFormat::Yaml => serde_yaml::from_str::<Vec<NewLead>>(text)?
            .into_iter()
            .enumerate()
            .map(|(i, l)| (i + 1, l))
            .collect(),
        ImportFormat::Json => serde_json::from_str::<Vec<NewLead>>(text)?
            .into_iter()
            .enumerate()
            .map(|(i, l)| (i + 1, l))
            .collect(),
        ImportFormat::Pipe => text
            .lines()
            .enumerate()
            .filter_map(|(i, line)| parse_pipe_line(line).map(|l| (i + 1, l)))
            .collect(),
    };
    Ok(leads
        .into_iter()
        .map(|(position, mut lead)| {
            if non_empty(lead.source.as_deref()).is_none() {
                lead.source = Some(format.default_source().to_string());
            }
            ImportRow { position, lead }
        })
        .collect())
}

/// Insert parsed rows, skipping invalid and duplicate ones.
pub fn import_rows(store: &LeadStore, rows: Vec<ImportRow>, now: DateTime<Utc>) -> Result<ImportReport> {
    let mut report = ImportReport::default();
    for row in rows {
        match store.insert_lead(row.lead, now) {
            Ok(lead) => {
                report.added += 1;
                report.lead_ids.push(lead.id);
            }
            Err(e @ (LeadflowError::InvalidLead(_) | LeadflowError::DuplicateLead(_))) => {
                debug!(position = row.position, reason = %e, "import row skipped");
                report.skipped.push(SkippedRow {
                    position: row.position,
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }
    Ok(report)
}

pub fn import_file(store: &LeadStore, path: &Path, now: DateTime<Utc>) -> Result<ImportReport> {
    let text = std::fs::read_to_string(path)?;
    let rows = parse(&text, ImportFormat::from_path(path))?;
    import_rows(store, rows, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn pipe_line_fields() {
        let lead =
            parse_pipe_line("Acme Plumbing | john@acmeplumbing.com | 555-123-4567 | Phoenix | AZ | plumber")
                .unwrap();
        assert_eq!(lead.business_name, "Acme Plumbing");
        assert_eq!(lead.email.as_deref(), Some("john@acmeplumbing.com"));
        assert_eq!(lead.city.as_deref(), Some("Phoenix"));
        assert_eq!(lead.vertical.as_deref(), Some("plumber"));

        let short = parse_pipe_line("Bob's HVAC | | 7135559876").unwrap();
        assert!(short.email.is_none());
        assert_eq!(short.phone.as_deref(), Some("7135559876"));
        assert!(short.vertical.is_none());

        assert!(parse_pipe_line("   ").is_none());
        assert!(parse_pipe_line("# header").is_none());
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(ImportFormat::from_path(Path::new("a.YML")), ImportFormat::Yaml);
        assert_eq!(ImportFormat::from_path(Path::new("a.json")), ImportFormat::Json);
        assert_eq!(ImportFormat::from_path(Path::new("leads.txt")), ImportFormat::Pipe);
    }

    #[test]
    fn yaml_rows_get_file_source() {
        let text = "- business_name: A\n  email: a@a.com\n- business_name: B\n  phone: '6025551111'\n  source: scraper\n";
        let rows = parse(text, ImportFormat::Yaml).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].lead.source.as_deref(), Some("file_import"));
        assert_eq!(rows[1].lead.source.as_deref(), Some("scraper"));
        assert_eq!(rows[1].position, 2);
    }

    #[test]
    fn malformed_json_fails_whole_file() {
        assert!(parse("[{\"business_name\": ", ImportFormat::Json).is_err());
    }

    #[test]
    fn import_skips_bad_and_duplicate_rows() {
        let dir = TempDir::new().unwrap();
        let store = LeadStore::open(&dir.path().join("leads.redb")).unwrap();
        let path = dir.path().join("paste.txt");
        std::fs::write(
            &path,
            "# business | email | phone\n\
             Acme Plumbing | john@acme.com | 555-123-4567 | Phoenix | AZ | plumber\n\
             No Contact Co\n\
             \n\
             Acme Again | JOHN@acme.com\n\
             Bob's HVAC | bob@bobshvac.com | | Houston | TX | hvac\n",
        )
        .unwrap();

        let report = import_file(&store, &path, Utc::now()).unwrap();
        assert_eq!(report.added, 2);
        assert_eq!(report.lead_ids, vec![1, 2]);
        let positions: Vec<usize> = report.skipped.iter().map(|s| s.position).collect();
        assert_eq!(positions, vec![3, 5]);
        assert!(report.skipped[1].reason.contains("already exists"));

        let leads = store.list_leads().unwrap();
        assert_eq!(leads[0].source, "bulk_paste");
        assert_eq!(leads[1].vertical, "hvac");
    }
}
