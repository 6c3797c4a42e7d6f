// src/audit.rs

use crate::census::{decennial, CensusClient};
use crate::checks::{default_checks, Check, CheckContext, CheckError, LogRecord};
use crate::description::DatasetDescriptor;
use crate::fetch::extract_archive;
use crate::table::{GeoTable, MemoryTable};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use glob::glob;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{info, warn};

/// Run-level interrupt signal. Cloned freely; any clone can cancel. Checks
/// observe it between assertions and before network waits, so a cancellation
/// unwinds at the per-dataset boundary without losing earlier results.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Resolves a descriptor's source file into a table. Shapefile parsing is a
/// collaborator concern, so the auditor only depends on this seam.
pub trait TableSource {
    fn open(&self, file_path: &Path, descriptor: &DatasetDescriptor) -> Result<Box<dyn GeoTable>>;
}

/// Default source: the extraction collaborator leaves a JSON record array
/// next to the shapefile, under the same stem.
#[derive(Debug, Default)]
pub struct JsonTableSource;

impl TableSource for JsonTableSource {
    fn open(&self, file_path: &Path, _descriptor: &DatasetDescriptor) -> Result<Box<dyn GeoTable>> {
        let json_path = if file_path.extension().map_or(false, |e| e == "json") {
            file_path.to_path_buf()
        } else {
            file_path.with_extension("json")
        };
        let text = fs::read_to_string(&json_path)
            .with_context(|| format!("reading table records {}", json_path.display()))?;
        let table = MemoryTable::from_json_records(&text)
            .with_context(|| format!("parsing table records {}", json_path.display()))?;
        Ok(Box::new(table))
    }
}

/// Result of one check over one dataset.
#[derive(Debug)]
pub struct CheckReport {
    pub check: &'static str,
    pub errors: u32,
    pub records: Vec<LogRecord>,
}

/// Accumulated results for one dataset. `aborted` carries the reason when a
/// configuration error or cancellation cut the check sequence short.
#[derive(Debug, Default)]
pub struct DatasetSummary {
    pub repo_name: String,
    pub state_legal_name: String,
    pub checks: Vec<CheckReport>,
    pub aborted: Option<String>,
}

impl DatasetSummary {
    pub fn total_errors(&self) -> u32 {
        self.checks.iter().map(|c| c.errors).sum()
    }
}

/// Results of a whole audit sweep. Datasets completed before a cancellation
/// are always present.
#[derive(Debug)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub datasets: Vec<DatasetSummary>,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn total_errors(&self) -> u32 {
        self.datasets.iter().map(DatasetSummary::total_errors).sum()
    }
}

/// Where the auditor finds descriptors and dataset files.
#[derive(Debug, Clone)]
pub struct AuditorConfig {
    /// Directory of `*.json` descriptor documents.
    pub descriptions_dir: PathBuf,
    /// Root directory holding one subdirectory per dataset repo.
    pub data_dir: PathBuf,
}

/// One-shot batch auditor: resolves each described dataset to a table,
/// runs the registered checks in sequence, and accumulates the results.
pub struct Auditor {
    config: AuditorConfig,
    source: Box<dyn TableSource>,
    checks: Vec<Box<dyn Check>>,
    cancel: CancelToken,
    /// Scratch space scoped to this run; released when the auditor drops.
    scratch: TempDir,
}

impl Auditor {
    pub fn new(config: AuditorConfig, source: Box<dyn TableSource>) -> Result<Self> {
        let scratch = tempfile::Builder::new()
            .prefix("geoaudit")
            .tempdir()
            .context("acquiring scratch directory")?;
        Ok(Self {
            config,
            source,
            checks: default_checks(),
            cancel: CancelToken::new(),
            scratch,
        })
    }

    /// Handle for interrupting the run from another thread (e.g. a signal
    /// handler).
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Add a rule beyond the baseline set.
    pub fn register_check(&mut self, check: Box<dyn Check>) {
        self.checks.push(check);
    }

    /// Discover and load every descriptor document.
    pub fn load_descriptors(&self) -> Result<Vec<DatasetDescriptor>> {
        let pattern = format!("{}/*.json", self.config.descriptions_dir.display());
        let mut descriptors = Vec::new();
        for entry in glob(&pattern).context("invalid descriptions glob")? {
            let path = entry?;
            descriptors.push(DatasetDescriptor::load(&path)?);
        }
        Ok(descriptors)
    }

    /// Run the full sweep. Data-quality violations never stop the run; they
    /// are tallied and reported at the end.
    pub fn run(&self) -> Result<RunSummary> {
        let started_at = Utc::now();
        let descriptors = self.load_descriptors()?;
        info!(datasets = descriptors.len(), "starting audit run");

        let mut datasets = Vec::new();
        let mut cancelled = false;
        for descriptor in &descriptors {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            info!(
                "Auditing {} from {}",
                descriptor.metadata.state_legal_name, descriptor.metadata.repo_name
            );
            datasets.push(self.audit_dataset(descriptor));
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }
        }

        let summary = RunSummary {
            started_at,
            finished_at: Utc::now(),
            datasets,
            cancelled,
        };
        info!(
            errors = summary.total_errors(),
            cancelled = summary.cancelled,
            "audit run finished"
        );
        Ok(summary)
    }

    /// Resolve the concrete table file for a descriptor, expanding the
    /// dataset archive when one is present.
    fn resolve_file(&self, descriptor: &DatasetDescriptor) -> Result<PathBuf> {
        let repo_dir = self.config.data_dir.join(&descriptor.metadata.repo_name);
        let archive_path = repo_dir.join(&descriptor.metadata.archive);
        if archive_path.is_file() {
            let extracted = extract_archive(&archive_path)?;
            Ok(extracted.join(&descriptor.metadata.file_name))
        } else {
            Ok(repo_dir.join(&descriptor.metadata.file_name))
        }
    }

    fn audit_dataset(&self, descriptor: &DatasetDescriptor) -> DatasetSummary {
        let mut summary = DatasetSummary {
            repo_name: descriptor.metadata.repo_name.clone(),
            state_legal_name: descriptor.metadata.state_legal_name.clone(),
            ..Default::default()
        };

        let table = match self
            .resolve_file(descriptor)
            .and_then(|path| self.source.open(&path, descriptor))
        {
            Ok(table) => table,
            Err(e) => {
                warn!(repo = %summary.repo_name, error = %e, "dataset aborted");
                summary.aborted = Some(format!("could not open dataset: {:#}", e));
                return summary;
            }
        };

        // Decennial data: audit against the survey the effective year falls in.
        let oracle = CensusClient::new(
            decennial(descriptor.metadata.year_effective_end),
            descriptor.metadata.state_fips_code,
        );
        let ctx = CheckContext {
            descriptor,
            table: table.as_ref(),
            oracle: &oracle,
            scratch_dir: Some(self.scratch.path()),
            cancel: &self.cancel,
        };

        for check in &self.checks {
            match check.audit(&ctx) {
                Ok(outcome) => summary.checks.push(CheckReport {
                    check: check.name(),
                    errors: outcome.errors,
                    records: outcome.records,
                }),
                Err(CheckError::Config(reason)) => {
                    warn!(repo = %summary.repo_name, %reason, "dataset aborted");
                    summary.aborted = Some(reason);
                    break;
                }
                Err(CheckError::Cancelled) => {
                    summary.aborted = Some("cancelled".to_string());
                    break;
                }
            }
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::testing::MockOracle;
    use crate::checks::{CheckOutcome, TotalPopulationCheck};
    use serde_json::json;
    use std::io::Write;
    use tempfile::tempdir;
    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    use zip::write::SimpleFileOptions;

    fn init_test_logging() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("info,geoaudit=debug")),
            )
            .with_test_writer()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }

    fn write_descriptor(dir: &Path, repo: &str, total_population: Option<&str>) {
        let doc = json!({
            "metadata": {
                "stateLegalName": "State of Alaska",
                "stateFIPSCode": 2,
                "stateAbbreviation": "AK",
                "git": "https://github.com/mggg-states/AK-shapefiles",
                "repoName": repo,
                "archive": "precincts.zip",
                "fileName": "precincts.shp",
                "yearEffectiveStart": 2013,
                "yearEffectiveEnd": 2021
            },
            "descriptors": {
                "countyFIPS": "COUNTYFP",
                "countyLegalName": "NAMELSAD",
                "totalPopulation": total_population
            }
        });
        fs::write(
            dir.join(format!("{}.json", repo)),
            serde_json::to_string_pretty(&doc).unwrap(),
        )
        .unwrap();
    }

    /// Table source that serves a fixed in-memory table regardless of path.
    struct FixedSource(String);

    impl TableSource for FixedSource {
        fn open(
            &self,
            _file_path: &Path,
            _descriptor: &DatasetDescriptor,
        ) -> Result<Box<dyn GeoTable>> {
            Ok(Box::new(MemoryTable::from_json_records(&self.0)?))
        }
    }

    /// Check that trips the cancel token mid-dataset.
    struct CancellingCheck(CancelToken);

    impl Check for CancellingCheck {
        fn name(&self) -> &'static str {
            "cancelling"
        }

        fn audit(&self, ctx: &CheckContext) -> std::result::Result<CheckOutcome, CheckError> {
            self.0.cancel();
            ctx.ensure_not_cancelled()?;
            unreachable!("the token was just cancelled");
        }
    }

    fn config(descriptions: &Path, data: &Path) -> AuditorConfig {
        AuditorConfig {
            descriptions_dir: descriptions.to_path_buf(),
            data_dir: data.to_path_buf(),
        }
    }

    #[test]
    fn test_descriptor_discovery() -> Result<()> {
        init_test_logging();
        let descriptions = tempdir()?;
        let data = tempdir()?;
        write_descriptor(descriptions.path(), "AK-shapefiles", Some("TOTPOP"));
        write_descriptor(descriptions.path(), "TX-shapefiles", Some("TOTPOP"));

        let auditor = Auditor::new(
            config(descriptions.path(), data.path()),
            Box::new(JsonTableSource),
        )?;
        let descriptors = auditor.load_descriptors()?;
        assert_eq!(descriptors.len(), 2);
        Ok(())
    }

    #[test]
    fn test_missing_dataset_aborts_dataset_not_run() -> Result<()> {
        init_test_logging();
        let descriptions = tempdir()?;
        let data = tempdir()?;
        write_descriptor(descriptions.path(), "AK-shapefiles", Some("TOTPOP"));

        let auditor = Auditor::new(
            config(descriptions.path(), data.path()),
            Box::new(JsonTableSource),
        )?;
        let summary = auditor.run()?;
        assert_eq!(summary.datasets.len(), 1);
        assert!(summary.datasets[0].aborted.is_some());
        assert!(!summary.cancelled);
        Ok(())
    }

    #[test]
    fn test_config_error_aborts_remaining_checks() -> Result<()> {
        init_test_logging();
        let descriptions = tempdir()?;
        let data = tempdir()?;
        // Descriptor names a population column the table does not have.
        write_descriptor(descriptions.path(), "AK-shapefiles", Some("NO_SUCH"));

        let auditor = Auditor::new(
            config(descriptions.path(), data.path()),
            Box::new(FixedSource(r#"[{"COUNTYFP": "020", "TOTPOP": 1}]"#.into())),
        )?;
        let summary = auditor.run()?;
        let dataset = &summary.datasets[0];
        assert!(dataset.aborted.is_some());
        // The first check hit the mismatch; nothing after it ran.
        assert!(dataset.checks.is_empty());
        Ok(())
    }

    #[test]
    fn test_cancellation_preserves_completed_datasets() -> Result<()> {
        init_test_logging();
        let descriptions = tempdir()?;
        let data = tempdir()?;
        write_descriptor(descriptions.path(), "AK-shapefiles", None);
        write_descriptor(descriptions.path(), "TX-shapefiles", None);

        let mut auditor = Auditor::new(
            config(descriptions.path(), data.path()),
            Box::new(FixedSource(r#"[{"COUNTYFP": "020"}]"#.into())),
        )?;
        let token = auditor.cancel_token();
        auditor.register_check(Box::new(CancellingCheck(token)));

        let summary = auditor.run()?;
        assert!(summary.cancelled);
        // Only the first dataset was touched, and its pre-cancel checks
        // are retained.
        assert_eq!(summary.datasets.len(), 1);
        let dataset = &summary.datasets[0];
        assert_eq!(dataset.aborted.as_deref(), Some("cancelled"));
        assert_eq!(dataset.checks.len(), 3);
        Ok(())
    }

    #[test]
    fn test_archive_is_expanded_for_resolution() -> Result<()> {
        init_test_logging();
        let descriptions = tempdir()?;
        let data = tempdir()?;
        write_descriptor(descriptions.path(), "AK-shapefiles", None);

        // Lay out data/AK-shapefiles/precincts.zip containing the table
        // records the JSON source expects.
        let repo_dir = data.path().join("AK-shapefiles");
        fs::create_dir_all(&repo_dir)?;
        let zip_path = repo_dir.join("precincts.zip");
        {
            let file = fs::File::create(&zip_path)?;
            let mut writer = zip::ZipWriter::new(file);
            writer.start_file("precincts.json", SimpleFileOptions::default())?;
            writer.write_all(br#"[{"COUNTYFP": "020"}]"#)?;
            writer.finish()?;
        }

        let auditor = Auditor::new(
            config(descriptions.path(), data.path()),
            Box::new(JsonTableSource),
        )?;
        let summary = auditor.run()?;
        let dataset = &summary.datasets[0];
        assert!(dataset.aborted.is_none(), "aborted: {:?}", dataset.aborted);
        // countyFIPS is fully populated, and the population checks no-op
        // without a configured column.
        assert_eq!(dataset.total_errors(), 0);
        Ok(())
    }

    #[test]
    fn test_end_to_end_tolerance_with_mock_oracle() {
        init_test_logging();
        let d = crate::checks::testing::descriptor(crate::description::ColumnMap {
            total_population: Some("TOTPOP".into()),
            ..Default::default()
        });
        let t = MemoryTable::from_json_records(r#"[{"TOTPOP": 100000}]"#).unwrap();
        let cancel = CancelToken::new();

        let within = MockOracle::with_total(100001);
        let ctx = CheckContext {
            descriptor: &d,
            table: &t,
            oracle: &within,
            scratch_dir: None,
            cancel: &cancel,
        };
        let outcome = TotalPopulationCheck.audit(&ctx).unwrap();
        assert_eq!(outcome.errors, 0);

        let beyond = MockOracle::with_total(100010);
        let ctx = CheckContext {
            descriptor: &d,
            table: &t,
            oracle: &beyond,
            scratch_dir: None,
            cancel: &cancel,
        };
        let outcome = TotalPopulationCheck.audit(&ctx).unwrap();
        assert_eq!(outcome.errors, 1);
        assert!(outcome.records.iter().any(|r| r.message.contains("off by 10")));
    }
}
