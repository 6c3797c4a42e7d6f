// src/census.rs

use serde_json::Value as Json;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

/// Decennial SF1 field holding the total population count.
pub const TOTAL_POPULATION_FIELD: &str = "P009001";

/// Floor a year to its decade boundary. Census population data is decennial,
/// so a 2013-effective dataset is audited against the 2010 survey.
pub fn decennial(year: i32) -> i32 {
    year.div_euclid(10) * 10
}

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("census request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed census response: {0}")]
    Malformed(String),
}

/// Population lookup capability injected into the checks. The production
/// implementation is `CensusClient`; tests supply their own.
pub trait PopulationOracle {
    /// Total population of the whole state scope.
    fn total_population(&self) -> Result<i64, OracleError>;

    /// Population per county, for exactly the submitted set of zero-padded
    /// 3-digit county codes. Returned keys echo the submitted ones.
    fn county_populations(
        &self,
        counties: &BTreeSet<String>,
    ) -> Result<BTreeMap<String, i64>, OracleError>;
}

/// One cell of a census response row. Fields whose textual form begins with
/// a leading zero are identifiers and must keep their string form; all other
/// fields coerce to integer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cell {
    Id(String),
    Num(i64),
}

impl Cell {
    fn from_text(text: &str) -> Self {
        if !text.starts_with('0') {
            if let Ok(n) = text.parse::<i64>() {
                return Cell::Num(n);
            }
        }
        Cell::Id(text.to_string())
    }

    fn as_i64(&self) -> Option<i64> {
        match self {
            Cell::Num(n) => Some(*n),
            Cell::Id(s) => s.parse().ok(),
        }
    }

    fn as_code(&self) -> String {
        match self {
            Cell::Id(s) => s.clone(),
            Cell::Num(n) => n.to_string(),
        }
    }
}

/// Parse the census wire format: a JSON array whose first element is the
/// header row and whose remaining elements are data rows of strings.
pub fn parse_response(body: &str) -> Result<Vec<BTreeMap<String, Cell>>, OracleError> {
    let doc: Json = serde_json::from_str(body)
        .map_err(|e| OracleError::Malformed(format!("not a JSON table: {}", e)))?;
    let rows = doc
        .as_array()
        .ok_or_else(|| OracleError::Malformed("top level is not an array".into()))?;
    let header = rows
        .first()
        .and_then(Json::as_array)
        .ok_or_else(|| OracleError::Malformed("missing header row".into()))?;
    let header: Vec<String> = header
        .iter()
        .map(|h| {
            h.as_str()
                .map(str::to_string)
                .ok_or_else(|| OracleError::Malformed("non-string header field".into()))
        })
        .collect::<Result<_, _>>()?;

    let mut records = Vec::with_capacity(rows.len().saturating_sub(1));
    for row in &rows[1..] {
        let cells = row
            .as_array()
            .ok_or_else(|| OracleError::Malformed("data row is not an array".into()))?;
        if cells.len() != header.len() {
            return Err(OracleError::Malformed(format!(
                "data row has {} fields, header has {}",
                cells.len(),
                header.len()
            )));
        }
        let record = header
            .iter()
            .zip(cells)
            .map(|(name, cell)| {
                let text = cell.as_str().ok_or_else(|| {
                    OracleError::Malformed("non-string data field".into())
                })?;
                Ok((name.clone(), Cell::from_text(text)))
            })
            .collect::<Result<BTreeMap<_, _>, OracleError>>()?;
        records.push(record);
    }
    Ok(records)
}

/// Blocking client for the decennial SF1 endpoint. Responses are cached per
/// resource for the lifetime of the client, so one audit run never fetches
/// the same scope twice.
pub struct CensusClient {
    client: reqwest::blocking::Client,
    base_url: String,
    year: i32,
    state_fips: u32,
    cache: Mutex<HashMap<String, Vec<BTreeMap<String, Cell>>>>,
}

impl CensusClient {
    /// `year` must already be floored to a decade boundary (see `decennial`).
    pub fn new(year: i32, state_fips: u32) -> Self {
        Self::with_base_url("https://api.census.gov/data", year, state_fips)
    }

    pub fn with_base_url(base_url: impl Into<String>, year: i32, state_fips: u32) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            base_url: base_url.into(),
            year,
            state_fips,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn fetch(&self, fields: &str, scope: &str) -> Result<Vec<BTreeMap<String, Cell>>, OracleError> {
        let resource = format!(
            "{}/{}/dec/sf1?get={}&{}",
            self.base_url, self.year, fields, scope
        );

        if let Some(cached) = self.cache.lock().unwrap().get(&resource) {
            return Ok(cached.clone());
        }

        debug!(%resource, "fetching census data");
        let body = self
            .client
            .get(&resource)
            .send()?
            .error_for_status()?
            .text()?;
        let records = parse_response(&body)?;
        self.cache
            .lock()
            .unwrap()
            .insert(resource, records.clone());
        Ok(records)
    }

    fn population_of(record: &BTreeMap<String, Cell>) -> Result<i64, OracleError> {
        record
            .get(TOTAL_POPULATION_FIELD)
            .and_then(Cell::as_i64)
            .ok_or_else(|| {
                OracleError::Malformed(format!(
                    "field {} missing or non-numeric",
                    TOTAL_POPULATION_FIELD
                ))
            })
    }
}

impl PopulationOracle for CensusClient {
    fn total_population(&self) -> Result<i64, OracleError> {
        let scope = format!("for=state:{:02}", self.state_fips);
        let records = self.fetch(TOTAL_POPULATION_FIELD, &scope)?;
        let record = records
            .first()
            .ok_or_else(|| OracleError::Malformed("no data rows for state scope".into()))?;
        Self::population_of(record)
    }

    fn county_populations(
        &self,
        counties: &BTreeSet<String>,
    ) -> Result<BTreeMap<String, i64>, OracleError> {
        let scope = format!(
            "for=county:{}&in=state:{:02}",
            counties.iter().cloned().collect::<Vec<_>>().join(","),
            self.state_fips
        );
        let records = self.fetch(TOTAL_POPULATION_FIELD, &scope)?;

        let mut by_code: BTreeMap<String, i64> = BTreeMap::new();
        for record in &records {
            let code = record
                .get("county")
                .map(|c| format!("{:0>3}", c.as_code()))
                .ok_or_else(|| OracleError::Malformed("county field missing".into()))?;
            by_code.insert(code, Self::population_of(record)?);
        }

        // Echo exactly the submitted keys; a hole means the upstream scope
        // disagreed with the request.
        let mut out = BTreeMap::new();
        for code in counties {
            let population = by_code.get(code).copied().ok_or_else(|| {
                OracleError::Malformed(format!("no data row for county {}", code))
            })?;
            out.insert(code.clone(), population);
        }
        Ok(out)
    }
}
