// src/description.rs

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Identifying metadata for one audit target, as published in its
/// description document. Deserialized once; never mutated afterwards.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub state_legal_name: String,
    #[serde(rename = "stateFIPSCode")]
    pub state_fips_code: u32,
    pub state_abbreviation: String,

    pub git: String,
    pub repo_name: String,
    pub archive: String,
    pub file_name: String,

    pub year_effective_start: i32,
    pub year_effective_end: i32,
}

/// Which table columns hold the geographic and population attributes. All
/// optional: a dataset that ships without county identifiers simply skips
/// the county-level checks.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMap {
    #[serde(rename = "stateFIPS")]
    pub state_fips: Option<String>,
    #[serde(rename = "countyFIPS")]
    pub county_fips: Option<String>,
    pub county_legal_name: Option<String>,
    pub total_population: Option<String>,
}

/// Column names carrying one party's vote totals for a single election year.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectionYearResult {
    #[serde(rename = "USHouseAbsentee")]
    pub us_house_absentee: String,
    #[serde(rename = "USHouseNoAbsentee")]
    pub us_house_no_absentee: String,

    #[serde(rename = "USSenateAbsentee")]
    pub us_senate_absentee: String,
    #[serde(rename = "USSenateNoAbsentee")]
    pub us_senate_no_absentee: String,

    #[serde(rename = "USPresidentAbsentee")]
    pub us_president_absentee: Option<String>,
    #[serde(rename = "USPresidentNoAbsentee")]
    pub us_president_no_absentee: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartyDescriptor {
    #[serde(rename = "partyDescriptorFEC")]
    pub party_descriptor_fec: String,
    pub party_legal_name: String,

    pub years: BTreeMap<i32, ElectionYearResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ElectionParties {
    pub parties: Vec<PartyDescriptor>,
}

/// Immutable description of one audit target: metadata, the column map, and
/// (optionally) election-party column descriptors.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetDescriptor {
    pub metadata: Metadata,
    #[serde(rename = "descriptors")]
    pub columns: ColumnMap,
    #[serde(default)]
    pub elections: Option<ElectionParties>,
}

impl DatasetDescriptor {
    /// Load a single descriptor document from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading descriptor {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("parsing descriptor {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "metadata": {
            "stateLegalName": "State of Alaska",
            "stateFIPSCode": 2,
            "stateAbbreviation": "AK",
            "git": "https://github.com/mggg-states/AK-shapefiles",
            "repoName": "AK-shapefiles",
            "archive": "AK_precincts.zip",
            "fileName": "AK_precincts.shp",
            "yearEffectiveStart": 2013,
            "yearEffectiveEnd": 2021
        },
        "descriptors": {
            "stateFIPS": null,
            "countyFIPS": "COUNTYFP",
            "countyLegalName": "NAMELSAD",
            "totalPopulation": "TOTPOP"
        },
        "elections": {
            "parties": [
                {
                    "partyDescriptorFEC": "DEM",
                    "partyLegalName": "Democratic Party",
                    "years": {
                        "2018": {
                            "USHouseAbsentee": "USH18D_A",
                            "USHouseNoAbsentee": "USH18D",
                            "USSenateAbsentee": "SEN18D_A",
                            "USSenateNoAbsentee": "SEN18D",
                            "USPresidentAbsentee": null,
                            "USPresidentNoAbsentee": null
                        }
                    }
                }
            ]
        }
    }"#;

    #[test]
    fn test_parse_full_descriptor() {
        let d: DatasetDescriptor = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(d.metadata.state_fips_code, 2);
        assert_eq!(d.metadata.state_abbreviation, "AK");
        assert_eq!(d.columns.county_fips.as_deref(), Some("COUNTYFP"));
        assert!(d.columns.state_fips.is_none());
        let elections = d.elections.unwrap();
        assert_eq!(elections.parties.len(), 1);
        assert_eq!(
            elections.parties[0].years[&2018].us_house_no_absentee,
            "USH18D"
        );
    }

    #[test]
    fn test_elections_block_is_optional() {
        let trimmed = r#"{
            "metadata": {
                "stateLegalName": "State of Alaska",
                "stateFIPSCode": 2,
                "stateAbbreviation": "AK",
                "git": "https://github.com/mggg-states/AK-shapefiles",
                "repoName": "AK-shapefiles",
                "archive": "AK_precincts.zip",
                "fileName": "AK_precincts.shp",
                "yearEffectiveStart": 2013,
                "yearEffectiveEnd": 2021
            },
            "descriptors": {}
        }"#;
        let d: DatasetDescriptor = serde_json::from_str(trimmed).unwrap();
        assert!(d.elections.is_none());
        assert!(d.columns.county_fips.is_none());
    }
}
