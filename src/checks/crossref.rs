// src/checks/crossref.rs
//
// Extension-point check: cross-references county coverage against an
// external precinct-level returns file (openelections-style CSV). The
// comparison is deliberately shallow; deeper vote-total reconciliation
// would need per-party column mapping from the descriptor's elections
// block.

use super::{Check, CheckContext, CheckError, CheckOutcome};
use crate::fetch::cached_download;
use crate::table::Value;
use anyhow::Result;
use reqwest::blocking::Client;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// Trim whitespace and strip one layer of surrounding quotes.
fn clean_field(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        trimmed[1..trimmed.len() - 1].to_string()
    } else {
        trimmed.to_string()
    }
}

/// Comparable key for a county name: case-insensitive, without the legal
/// suffix shapefiles tend to carry.
fn county_key(name: &str) -> String {
    let upper = clean_field(name).to_uppercase();
    for suffix in [" COUNTY", " BOROUGH", " PARISH", " CENSUS AREA"] {
        if let Some(stripped) = upper.strip_suffix(suffix) {
            return stripped.to_string();
        }
    }
    upper
}

/// Parse the distinct values of one column out of a reference CSV.
fn reference_counties(path: &Path, column: &str) -> Result<BTreeSet<String>> {
    let text = fs::read_to_string(path)?;
    let mut lines = text.lines();
    let header = lines
        .next()
        .ok_or_else(|| anyhow::anyhow!("reference file {} is empty", path.display()))?;
    let index = header
        .split(',')
        .map(clean_field)
        .position(|h| h.eq_ignore_ascii_case(column))
        .ok_or_else(|| {
            anyhow::anyhow!("reference file has no `{}` column", column)
        })?;

    let mut counties = BTreeSet::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        if let Some(field) = line.split(',').nth(index) {
            let key = county_key(field);
            if !key.is_empty() {
                counties.insert(key);
            }
        }
    }
    Ok(counties)
}

/// Cross-checks the dataset's county roster against an external
/// precinct-level reference file, cached in the run's scratch directory.
pub struct PrecinctReferenceCheck {
    client: Client,
    reference_url: String,
    reference_county_column: String,
}

impl PrecinctReferenceCheck {
    pub fn new(reference_url: impl Into<String>, reference_county_column: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            reference_url: reference_url.into(),
            reference_county_column: reference_county_column.into(),
        }
    }
}

impl Check for PrecinctReferenceCheck {
    fn name(&self) -> &'static str {
        "precinct-reference"
    }

    fn audit(&self, ctx: &CheckContext) -> Result<CheckOutcome, CheckError> {
        let mut outcome = CheckOutcome::new();
        ctx.ensure_not_cancelled()?;

        let metadata = &ctx.descriptor.metadata;
        let scratch_dir = match ctx.scratch_dir {
            Some(dir) => dir,
            None => {
                outcome.info(format!(
                    "No scratch directory for {}; skipping reference cross-check",
                    metadata.repo_name
                ));
                return Ok(outcome);
            }
        };
        let name_column = match &ctx.descriptor.columns.county_legal_name {
            Some(c) => c,
            None => return Ok(outcome),
        };
        let dataset_names = ctx.table.column_values(name_column)?;

        let reference = match cached_download(&self.client, &self.reference_url, scratch_dir)
            .and_then(|path| reference_counties(&path, &self.reference_county_column))
        {
            Ok(set) => set,
            Err(e) => {
                outcome.record_failure(format!(
                    "Could not load the precinct reference for {}: {}",
                    metadata.repo_name, e
                ));
                return Ok(outcome);
            }
        };

        outcome.info(format!(
            "Cross-referencing {} counties in {} against {}",
            reference.len(),
            metadata.repo_name,
            self.reference_url
        ));

        let dataset_counties: BTreeSet<String> = dataset_names
            .iter()
            .filter(|v| v.is_truthy())
            .map(|v| county_key(&v.to_string()))
            .collect();

        for county in &dataset_counties {
            if !reference.contains(county) {
                outcome.flag_advisory(format!(
                    "County {} in {} has no precinct-level returns in the reference data!",
                    county, metadata.repo_name
                ));
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::CancelToken;
    use crate::checks::testing::{descriptor, MockOracle};
    use crate::checks::Severity;
    use crate::description::ColumnMap;
    use crate::table::MemoryTable;
    use tempfile::tempdir;

    fn columns() -> ColumnMap {
        ColumnMap {
            county_legal_name: Some("NAMELSAD".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_county_key_normalizes_suffixes() {
        assert_eq!(county_key("Anchorage Borough"), "ANCHORAGE");
        assert_eq!(county_key("\"Dallas County\""), "DALLAS");
        assert_eq!(county_key("dallas"), "DALLAS");
    }

    #[test]
    fn test_coverage_gap_is_advisory() {
        let scratch = tempdir().unwrap();
        // Seed the cache so the check never reaches for the network.
        fs::write(
            scratch.path().join("reference.csv"),
            "county,office,votes\nAnchorage,US House,100\n",
        )
        .unwrap();

        let d = descriptor(columns());
        let t = MemoryTable::from_json_records(
            r#"[{"NAMELSAD": "Anchorage Borough"}, {"NAMELSAD": "Fairbanks Borough"}]"#,
        )
        .unwrap();
        let oracle = MockOracle::with_total(0);
        let cancel = CancelToken::new();
        let ctx = CheckContext {
            descriptor: &d,
            table: &t,
            oracle: &oracle,
            scratch_dir: Some(scratch.path()),
            cancel: &cancel,
        };

        let check = PrecinctReferenceCheck::new("http://invalid.invalid/reference.csv", "county");
        let outcome = check.audit(&ctx).unwrap();
        assert_eq!(outcome.errors, 1);
        let advisory = outcome
            .records
            .iter()
            .find(|r| r.severity == Severity::Warning)
            .unwrap();
        assert!(advisory.message.contains("FAIRBANKS"));
    }

    #[test]
    fn test_no_scratch_dir_skips() {
        let d = descriptor(columns());
        let t = MemoryTable::from_json_records(r#"[{"NAMELSAD": "Anchorage"}]"#).unwrap();
        let oracle = MockOracle::with_total(0);
        let cancel = CancelToken::new();
        let ctx = CheckContext {
            descriptor: &d,
            table: &t,
            oracle: &oracle,
            scratch_dir: None,
            cancel: &cancel,
        };

        let check = PrecinctReferenceCheck::new("http://invalid.invalid/reference.csv", "county");
        let outcome = check.audit(&ctx).unwrap();
        assert_eq!(outcome.errors, 0);
    }
}
