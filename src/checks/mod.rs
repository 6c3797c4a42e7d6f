// src/checks/mod.rs

pub mod crossref;
pub mod existence;
pub mod population;

use crate::audit::CancelToken;
use crate::census::PopulationOracle;
use crate::description::DatasetDescriptor;
use crate::table::{GeoTable, TableError};
use std::path::Path;
use thiserror::Error;
use tracing::{error, info, warn};

pub use crossref::PrecinctReferenceCheck;
pub use existence::DataExistenceCheck;
pub use population::{CountyTotalPopulationCheck, TotalPopulationCheck};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// One diagnostic emitted by a check, kept alongside the error tally so the
/// caller can report every violation after the sweep completes.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub severity: Severity,
    pub message: String,
}

/// Error tally plus diagnostics for a single check run. Assertion failures
/// are never raised; they are accumulated here so one bad county cannot
/// hide the rest.
#[derive(Debug, Default)]
pub struct CheckOutcome {
    pub errors: u32,
    pub records: Vec<LogRecord>,
}

impl CheckOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    /// Info-severity diagnostic; does not touch the tally.
    pub fn info(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        self.records.push(LogRecord {
            severity: Severity::Info,
            message,
        });
    }

    /// A violated assertion: error-severity diagnostic plus one tally point.
    pub fn flag_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        error!("{}", message);
        self.errors += 1;
        self.records.push(LogRecord {
            severity: Severity::Error,
            message,
        });
    }

    /// A check-level failure (e.g. the oracle is unreachable): reported at
    /// error severity but kept out of the data-quality tally, which only
    /// counts assertions that actually ran.
    pub fn record_failure(&mut self, message: impl Into<String>) {
        let message = message.into();
        error!("{}", message);
        self.records.push(LogRecord {
            severity: Severity::Error,
            message,
        });
    }

    /// An advisory finding: counted in the tally but reported at warning
    /// severity (completeness issues rather than hard inconsistencies).
    pub fn flag_advisory(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.errors += 1;
        self.records.push(LogRecord {
            severity: Severity::Warning,
            message,
        });
    }
}

/// Failures that end a check early, as opposed to data-quality findings.
#[derive(Debug, Error)]
pub enum CheckError {
    /// Descriptor/table mismatch. Fatal to the dataset, not to the run.
    #[error("configuration error: {0}")]
    Config(String),
    /// User-initiated interrupt observed mid-check.
    #[error("audit cancelled")]
    Cancelled,
}

impl From<TableError> for CheckError {
    fn from(err: TableError) -> Self {
        CheckError::Config(err.to_string())
    }
}

/// Shared inputs handed to every check for one dataset.
pub struct CheckContext<'a> {
    pub descriptor: &'a DatasetDescriptor,
    pub table: &'a dyn GeoTable,
    pub oracle: &'a dyn PopulationOracle,
    /// Run-scoped directory for checks that cache auxiliary downloads.
    pub scratch_dir: Option<&'a Path>,
    pub cancel: &'a CancelToken,
}

impl CheckContext<'_> {
    pub fn ensure_not_cancelled(&self) -> Result<(), CheckError> {
        if self.cancel.is_cancelled() {
            Err(CheckError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// A single audit rule. Implementations must run every assertion they can
/// and report all failures through the outcome instead of bailing on the
/// first one.
pub trait Check {
    fn name(&self) -> &'static str;

    fn audit(&self, ctx: &CheckContext) -> Result<CheckOutcome, CheckError>;
}

/// The baseline rule set applied to every dataset.
pub fn default_checks() -> Vec<Box<dyn Check>> {
    vec![
        Box::new(TotalPopulationCheck),
        Box::new(CountyTotalPopulationCheck),
        Box::new(DataExistenceCheck),
    ]
}
