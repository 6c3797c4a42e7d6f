// src/checks/existence.rs

use super::{Check, CheckContext, CheckError, CheckOutcome};
use crate::table::Value;

/// Verifies that every row carries a usable county identifier. Gaps are
/// advisory: they are counted but reported at warning severity.
pub struct DataExistenceCheck;

impl Check for DataExistenceCheck {
    fn name(&self) -> &'static str {
        "data-existence"
    }

    fn audit(&self, ctx: &CheckContext) -> Result<CheckOutcome, CheckError> {
        let mut outcome = CheckOutcome::new();
        ctx.ensure_not_cancelled()?;

        let metadata = &ctx.descriptor.metadata;
        let mut expected_columns = Vec::new();
        if let Some(county_fips) = &ctx.descriptor.columns.county_fips {
            expected_columns.push(county_fips.as_str());
        }

        for column in expected_columns {
            let values = ctx.table.column_values(column)?;
            if !values.iter().all(Value::is_truthy) {
                outcome.flag_advisory(format!(
                    "Not all values in {} column in {} for {} are filled!",
                    column, metadata.repo_name, metadata.year_effective_end
                ));
            }
        }

        Ok(outcome)
    }
}
