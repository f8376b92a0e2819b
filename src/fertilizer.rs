//! Fertilizer recommendation from soil features and a trained classifier.

use serde::Serialize;
use tracing::{debug, warn};

use crate::advice::generate_advice;
use crate::classifier::{FertilizerBundle, ModelArtifacts};
use crate::error::{AdvisorError, Result};
use crate::models::SoilSample;
use crate::suitability::py_float;

// ---

const DEFAULT_TEMPERATURE: f64 = 25.0;
const DEFAULT_HUMIDITY: f64 = 50.0;
const DEFAULT_MOISTURE: f64 = 40.0;
const DEFAULT_SOIL: &str = "Black";
const DEFAULT_CROP: &str = "Wheat";

/// Code substituted for a category the encoder has never seen.
const UNKNOWN_CATEGORY_CODE: usize = 0;

const RATIONALE: &str = "Recommended based on soil and crop requirements";

/// Macronutrients with a deficiency threshold (kg/ha).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nutrient {
    Nitrogen,
    Phosphorus,
    Potassium,
}

impl Nutrient {
    // ---
    pub fn threshold(self) -> f64 {
        match self {
            Nutrient::Nitrogen => 50.0,
            Nutrient::Phosphorus => 40.0,
            Nutrient::Potassium => 40.0,
        }
    }

    /// First-choice product for correcting a deficiency.
    pub fn product(self) -> &'static str {
        match self {
            Nutrient::Nitrogen => "Urea",
            Nutrient::Phosphorus => "DAP",
            Nutrient::Potassium => "Muriate of Potash",
        }
    }

    fn name(self) -> &'static str {
        match self {
            Nutrient::Nitrogen => "nitrogen",
            Nutrient::Phosphorus => "phosphorus",
            Nutrient::Potassium => "potassium",
        }
    }

    pub fn deficiency(self, observed: f64) -> f64 {
        (self.threshold() - observed).max(0.0)
    }

    fn advice(self, deficiency: f64) -> Option<String> {
        (deficiency > 0.0).then(|| {
            format!(
                "Add {} kg/ha of {} using {} or similar",
                py_float(deficiency),
                self.name(),
                self.product()
            )
        })
    }
}

/// Shortfall below each nutrient's threshold; never negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Deficiencies {
    // ---
    #[serde(rename = "N")]
    pub n: f64,
    #[serde(rename = "P")]
    pub p: f64,
    #[serde(rename = "K")]
    pub k: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FertilizerRecommendation {
    // ---
    pub fertilizer: String,
    pub composition: String,
    pub deficiencies: Deficiencies,
    pub rationale: String,
    pub application: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nitrogen_advice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phosphorus_advice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub potassium_advice: Option<String>,
}

/// A single model input before categorical encoding.
#[derive(Debug, Clone, PartialEq)]
enum Feature<'a> {
    Numeric(f64),
    Categorical(&'a str),
}

/// Model inputs in training column order.
fn feature_record<'a>(sample: &'a SoilSample, crop: &'a str) -> [(&'static str, Feature<'a>); 8] {
    // ---
    [
        (
            "Temperature",
            Feature::Numeric(sample.temperature.unwrap_or(DEFAULT_TEMPERATURE)),
        ),
        (
            "Humidity",
            Feature::Numeric(sample.humidity.unwrap_or(DEFAULT_HUMIDITY)),
        ),
        (
            "Moisture",
            Feature::Numeric(sample.moisture.unwrap_or(DEFAULT_MOISTURE)),
        ),
        (
            "Soil",
            Feature::Categorical(sample.soil_type.as_deref().unwrap_or(DEFAULT_SOIL)),
        ),
        ("Crop", Feature::Categorical(crop)),
        ("Nitrogen", Feature::Numeric(sample.n.unwrap_or(0.0))),
        ("Potassium", Feature::Numeric(sample.k.unwrap_or(0.0))),
        ("Phosphorus", Feature::Numeric(sample.p.unwrap_or(0.0))),
    ]
}

/// Encode the feature record into the numeric vector the classifier expects.
///
/// Unseen categories are encoded as [`UNKNOWN_CATEGORY_CODE`] and logged.
fn encode(bundle: &FertilizerBundle, record: &[(&'static str, Feature<'_>)]) -> Result<Vec<f64>> {
    // ---
    record
        .iter()
        .map(|(column, feature)| match feature {
            Feature::Numeric(v) => Ok(*v),
            Feature::Categorical(value) => {
                let encoder = bundle.label_encoders.get(*column).ok_or_else(|| {
                    AdvisorError::Internal(format!("no label encoder for column {column}"))
                })?;
                let code = encoder.transform(value).unwrap_or_else(|| {
                    warn!(
                        "Unknown category '{}' in {}, using default",
                        value, column
                    );
                    UNKNOWN_CATEGORY_CODE
                });
                Ok(code as f64)
            }
        })
        .collect()
}

/// Recommend a fertilizer for `sample`.
///
/// `crop_name` takes precedence over `sample.crop_name`; the model is fed
/// "Wheat" when neither is given.
pub fn recommend_fertilizer(
    models: &ModelArtifacts,
    sample: &SoilSample,
    crop_name: Option<&str>,
) -> Result<FertilizerRecommendation> {
    // ---
    let bundle = models.fertilizer()?;

    let crop_name = crop_name
        .or(sample.crop_name.as_deref())
        .filter(|c| !c.is_empty());

    let record = feature_record(sample, crop_name.unwrap_or(DEFAULT_CROP));
    let features = encode(bundle, &record)?;
    debug!("Fertilizer features: {:?}", features);

    let fertilizer = bundle.model.predict(&features)?.to_string();

    let composition = bundle
        .fertilizer_details
        .iter()
        .find(|detail| detail.name == fertilizer)
        .map(|detail| detail.composition.clone())
        .unwrap_or_else(|| "Varies".to_string());

    let deficiencies = Deficiencies {
        n: Nutrient::Nitrogen.deficiency(sample.n.unwrap_or(0.0)),
        p: Nutrient::Phosphorus.deficiency(sample.p.unwrap_or(0.0)),
        k: Nutrient::Potassium.deficiency(sample.k.unwrap_or(0.0)),
    };

    Ok(FertilizerRecommendation {
        application: generate_advice(&fertilizer, crop_name),
        fertilizer,
        composition,
        rationale: RATIONALE.to_string(),
        nitrogen_advice: Nutrient::Nitrogen.advice(deficiencies.n),
        phosphorus_advice: Nutrient::Phosphorus.advice(deficiencies.p),
        potassium_advice: Nutrient::Potassium.advice(deficiencies.k),
        deficiencies,
    })
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;

    /// A stump on the Nitrogen column (index 5): N <= 30 → Urea, else DAP.
    fn models() -> ModelArtifacts {
        let bundle: FertilizerBundle = serde_json::from_value(json!({
            "model": {
                "classes": ["DAP", "Urea"],
                "trees": [{
                    "children_left":  [1, -1, -1],
                    "children_right": [2, -1, -1],
                    "feature":        [5, -2, -2],
                    "threshold":      [30.0, -2.0, -2.0],
                    "value":          [[4, 4], [0, 4], [4, 0]]
                }]
            },
            "label_encoders": {
                "Soil": { "classes": ["Black", "Clayey", "Red"] },
                "Crop": { "classes": ["Maize", "Wheat"] }
            },
            "fertilizer_details": [
                { "name": "Urea", "composition": "46-0-0" }
            ]
        }))
        .unwrap();

        ModelArtifacts {
            crop_model: None,
            fertilizer: Some(bundle),
        }
    }

    fn sample(n: f64, p: f64, k: f64) -> SoilSample {
        SoilSample {
            n: Some(n),
            p: Some(p),
            k: Some(k),
            ..Default::default()
        }
    }

    #[test]
    fn test_model_unavailable() {
        // ---
        let result = recommend_fertilizer(&ModelArtifacts::default(), &sample(0.0, 0.0, 0.0), None);
        assert!(matches!(result, Err(AdvisorError::ModelUnavailable(_))));
    }

    #[test]
    fn test_recommendation_with_deficiencies() {
        // ---
        let rec = recommend_fertilizer(&models(), &sample(10.0, 25.0, 50.0), Some("rice")).unwrap();

        assert_eq!(rec.fertilizer, "Urea");
        assert_eq!(rec.composition, "46-0-0");
        assert_eq!(rec.deficiencies, Deficiencies { n: 40.0, p: 15.0, k: 0.0 });
        assert_eq!(
            rec.nitrogen_advice.as_deref(),
            Some("Add 40.0 kg/ha of nitrogen using Urea or similar")
        );
        assert_eq!(
            rec.phosphorus_advice.as_deref(),
            Some("Add 15.0 kg/ha of phosphorus using DAP or similar")
        );
        assert!(rec.potassium_advice.is_none());
        assert_eq!(rec.rationale, RATIONALE);
        assert!(rec.application.ends_with("For cereals, incorporate into soil before planting."));
    }

    #[test]
    fn test_composition_defaults_to_varies() {
        // ---
        let rec = recommend_fertilizer(&models(), &sample(60.0, 60.0, 60.0), None).unwrap();

        assert_eq!(rec.fertilizer, "DAP");
        assert_eq!(rec.composition, "Varies");
        assert_eq!(rec.deficiencies, Deficiencies { n: 0.0, p: 0.0, k: 0.0 });
        assert!(rec.nitrogen_advice.is_none());
    }

    #[test]
    fn test_unseen_soil_type_does_not_fail() {
        // ---
        let mut soil = sample(10.0, 10.0, 10.0);
        soil.soil_type = Some("Volcanic".to_string());

        let rec = recommend_fertilizer(&models(), &soil, Some("Quinoa")).unwrap();
        assert_eq!(rec.fertilizer, "Urea");
    }

    #[test]
    fn test_unseen_category_encodes_as_zero() {
        // ---
        let bundle = models().fertilizer.unwrap();
        let mut soil = sample(1.0, 2.0, 3.0);
        soil.soil_type = Some("Volcanic".to_string());

        let features = encode(&bundle, &feature_record(&soil, "Wheat")).unwrap();
        assert_eq!(features, vec![25.0, 50.0, 40.0, 0.0, 1.0, 1.0, 3.0, 2.0]);
    }

    #[test]
    fn test_feature_defaults() {
        // ---
        let soil = SoilSample::default();
        let record = feature_record(&soil, DEFAULT_CROP);

        assert_eq!(record[0], ("Temperature", Feature::Numeric(25.0)));
        assert_eq!(record[2], ("Moisture", Feature::Numeric(40.0)));
        assert_eq!(record[3], ("Soil", Feature::Categorical("Black")));
        assert_eq!(record[4], ("Crop", Feature::Categorical("Wheat")));
    }

    #[test]
    fn test_sample_crop_name_is_used_when_no_override() {
        // ---
        let mut soil = sample(60.0, 60.0, 60.0);
        soil.crop_name = Some("banana".to_string());

        let rec = recommend_fertilizer(&models(), &soil, None).unwrap();
        assert!(rec.application.contains("For fruit trees"));
    }

    #[test]
    fn test_deficiency_never_negative() {
        // ---
        for observed in [-10.0, 0.0, 39.9, 40.0, 50.0, 1e6] {
            for nutrient in [Nutrient::Nitrogen, Nutrient::Phosphorus, Nutrient::Potassium] {
                assert!(nutrient.deficiency(observed) >= 0.0);
            }
        }
    }
}
