use anyhow::Result;
use geoaudit::audit::{Auditor, AuditorConfig, JsonTableSource};
use geoaudit::checks::Severity;
use std::env;
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,geoaudit=info"));
    fmt::Subscriber::builder().with_env_filter(env_filter).init();
    info!("startup");

    // ─── 2) configure dirs ───────────────────────────────────────────
    let descriptions_dir =
        PathBuf::from(env::var("GEOAUDIT_DESCRIPTIONS").unwrap_or_else(|_| "descriptions".into()));
    let data_dir = PathBuf::from(env::var("GEOAUDIT_DATA").unwrap_or_else(|_| "data".into()));

    // ─── 3) run the sweep ────────────────────────────────────────────
    let auditor = Auditor::new(
        AuditorConfig {
            descriptions_dir,
            data_dir,
        },
        Box::new(JsonTableSource),
    )?;
    let summary = auditor.run()?;

    // ─── 4) report ───────────────────────────────────────────────────
    for dataset in &summary.datasets {
        info!(
            repo = %dataset.repo_name,
            errors = dataset.total_errors(),
            "dataset audited"
        );
        for report in &dataset.checks {
            for record in &report.records {
                match record.severity {
                    Severity::Error => error!(check = report.check, "{}", record.message),
                    Severity::Warning => warn!(check = report.check, "{}", record.message),
                    Severity::Info => {}
                }
            }
        }
        if let Some(reason) = &dataset.aborted {
            warn!(repo = %dataset.repo_name, %reason, "dataset aborted");
        }
    }
    info!(
        datasets = summary.datasets.len(),
        errors = summary.total_errors(),
        cancelled = summary.cancelled,
        "all done"
    );

    if summary.total_errors() > 0 {
        std::process::exit(1);
    }
    Ok(())
}
