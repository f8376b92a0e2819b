//! Reference table of ideal growing parameters per crop.
//!
//! Loaded once at startup from `crop-data.csv` and shared read-only.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::AdvisorError;

// ---

/// Ideal values for the seven scored parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IdealParameters {
    // ---
    pub n: f64,
    pub p: f64,
    pub k: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub ph: f64,
    pub rainfall: f64,
}

impl IdealParameters {
    /// Values in scoring order: N, P, K, temperature, humidity, pH, rainfall.
    pub fn to_array(&self) -> [f64; 7] {
        [
            self.n,
            self.p,
            self.k,
            self.temperature,
            self.humidity,
            self.ph,
            self.rainfall,
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CropProfile {
    pub name: String,
    pub ideal: IdealParameters,
}

/// One CSV row: the ideal parameters followed by the crop label.
#[derive(Debug, Deserialize)]
struct CropRow {
    #[serde(rename = "N")]
    n: f64,
    #[serde(rename = "P")]
    p: f64,
    #[serde(rename = "K")]
    k: f64,
    temperature: f64,
    humidity: f64,
    ph: f64,
    rainfall: f64,
    label: String,
}

impl From<CropRow> for CropProfile {
    fn from(row: CropRow) -> Self {
        CropProfile {
            name: row.label,
            ideal: IdealParameters {
                n: row.n,
                p: row.p,
                k: row.k,
                temperature: row.temperature,
                humidity: row.humidity,
                ph: row.ph,
                rainfall: row.rainfall,
            },
        }
    }
}

/// Crop profiles keyed by exact label, in first-appearance order.
#[derive(Debug, Default, Clone)]
pub struct ReferenceDataset {
    profiles: Vec<CropProfile>,
    index: HashMap<String, usize>,
}

impl ReferenceDataset {
    // ---
    /// Load the dataset from a CSV file.
    ///
    /// The dataset may contain several rows per label; the first row seen
    /// for a label is its profile.
    pub fn from_csv(path: impl AsRef<Path>) -> Result<Self> {
        // ---
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open crop data '{}'", path.display()))?;
        Self::from_reader(file)
            .with_context(|| format!("Failed to parse crop data '{}'", path.display()))
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        // ---
        let mut csv_reader = csv::Reader::from_reader(reader);
        let mut profiles = Vec::new();

        for row in csv_reader.deserialize::<CropRow>() {
            profiles.push(CropProfile::from(row?));
        }

        Ok(Self::from_profiles(profiles))
    }

    pub fn from_profiles(profiles: Vec<CropProfile>) -> Self {
        // ---
        let mut dataset = Self::default();
        for profile in profiles {
            if dataset.index.contains_key(&profile.name) {
                continue;
            }
            dataset
                .index
                .insert(profile.name.clone(), dataset.profiles.len());
            dataset.profiles.push(profile);
        }
        dataset
    }

    /// Look up a crop by exact (case-sensitive) label.
    pub fn profile(&self, name: &str) -> crate::Result<&CropProfile> {
        self.index
            .get(name)
            .map(|&i| &self.profiles[i])
            .ok_or_else(|| AdvisorError::CropNotFound(name.to_string()))
    }

    pub fn crop_names(&self) -> impl Iterator<Item = &str> {
        self.profiles.iter().map(|p| p.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
