// src/checks/population.rs

use super::{Check, CheckContext, CheckError, CheckOutcome};
use crate::aggregate::{aggregate_by_key, MergePlan};
use crate::census::decennial;
use crate::table::Value;
use std::collections::BTreeSet;

/// Compares the dataset's summed total-population column against the
/// decennial census figure for the whole state, within ±1 slack.
pub struct TotalPopulationCheck;

impl Check for TotalPopulationCheck {
    fn name(&self) -> &'static str {
        "total-population"
    }

    fn audit(&self, ctx: &CheckContext) -> Result<CheckOutcome, CheckError> {
        let mut outcome = CheckOutcome::new();
        ctx.ensure_not_cancelled()?;

        let metadata = &ctx.descriptor.metadata;
        let pop_column = match &ctx.descriptor.columns.total_population {
            Some(c) => c,
            None => {
                outcome.info(format!(
                    "No total-population column configured for {}; skipping",
                    metadata.repo_name
                ));
                return Ok(outcome);
            }
        };

        // Missing column = descriptor/table mismatch, fatal to the dataset.
        let values = ctx.table.column_values(pop_column)?;
        let dataset_total = values
            .iter()
            .filter_map(Value::as_f64)
            .sum::<f64>() as i64;

        let census_total = match ctx.oracle.total_population() {
            Ok(n) => n,
            Err(e) => {
                outcome.record_failure(format!(
                    "Could not fetch the census total population for {}: {}",
                    metadata.repo_name, e
                ));
                return Ok(outcome);
            }
        };

        let decade = decennial(metadata.year_effective_end);
        outcome.info(format!(
            "Comparing the {} Census total population count ({}) to the dataset count ({}) in {} for {}",
            decade,
            census_total,
            dataset_total,
            metadata.repo_name,
            metadata.year_effective_end
        ));

        let delta = (dataset_total - census_total).abs();
        if delta > 1 {
            outcome.flag_error(format!(
                "The total population counts are off by more than 1 (off by {})!",
                delta
            ));
        }

        Ok(outcome)
    }
}

/// Aggregates rows by county FIPS and compares each county's population sum
/// against the census. Every county is also screened for an exactly-zero
/// population, which points at a broken join in the source data.
pub struct CountyTotalPopulationCheck;

impl Check for CountyTotalPopulationCheck {
    fn name(&self) -> &'static str {
        "county-total-population"
    }

    fn audit(&self, ctx: &CheckContext) -> Result<CheckOutcome, CheckError> {
        let mut outcome = CheckOutcome::new();
        ctx.ensure_not_cancelled()?;

        let metadata = &ctx.descriptor.metadata;
        let columns = &ctx.descriptor.columns;
        let (county_column, pop_column) = match (&columns.county_fips, &columns.total_population)
        {
            (Some(county), Some(pop)) => (county, pop),
            _ => return Ok(outcome),
        };

        // Validate the configured columns before any network traffic.
        ctx.table.column_values(county_column)?;
        ctx.table.column_values(pop_column)?;

        outcome.info(format!(
            "Checking the county-level population count in {} for {}",
            metadata.repo_name, metadata.year_effective_end
        ));

        let plan = MergePlan::from_columns(columns);
        let aggregated = aggregate_by_key(ctx.table, county_column, &plan);

        let codes: BTreeSet<String> = aggregated
            .keys()
            .map(|k| format!("{:0>3}", k))
            .collect();

        ctx.ensure_not_cancelled()?;
        let census_populations = match ctx.oracle.county_populations(&codes) {
            Ok(map) => map,
            Err(e) => {
                outcome.record_failure(format!(
                    "Could not fetch census county populations for {}: {}",
                    metadata.repo_name, e
                ));
                return Ok(outcome);
            }
        };

        for (key, county) in &aggregated {
            let county_name = columns
                .county_legal_name
                .as_ref()
                .and_then(|c| county.get(c))
                .map(Value::to_string)
                .unwrap_or_else(|| "Unspecified".to_string());
            let code = format!("{:0>3}", key);

            let county_total = county
                .get(pop_column)
                .and_then(Value::as_f64)
                .unwrap_or(0.0);

            if county_total == 0.0 {
                outcome.flag_error(format!(
                    "The total population in {}, {} (FIPS={}) is zero!",
                    county_name, metadata.state_abbreviation, code
                ));
            }

            if let Some(&census_total) = census_populations.get(&code) {
                if (county_total - census_total as f64).abs() > 1.0 {
                    outcome.flag_error(format!(
                        "The total population in {}, {} (FIPS={}) differs from the US Census ({}!={})!",
                        county_name,
                        metadata.state_abbreviation,
                        code,
                        county_total,
                        census_total
                    ));
                }
            }
        }

        Ok(outcome)
    }
}
