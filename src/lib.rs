// src/lib.rs
//
// geoaudit: audits electoral-geography datasets against US Census
// population figures. The check engine is the core; shapefile extraction
// and repo discovery are collaborator concerns behind the `GeoTable` and
// `TableSource` seams.

pub mod aggregate;
pub mod audit;
pub mod census;
pub mod checks;
pub mod description;
pub mod fetch;
pub mod table;

pub use audit::{Auditor, AuditorConfig, CancelToken, DatasetSummary, RunSummary};
pub use census::{decennial, CensusClient, OracleError, PopulationOracle};
pub use checks::{Check, CheckError, CheckOutcome};
pub use description::DatasetDescriptor;
pub use table::{GeoTable, MemoryTable, Value};
