//! Crop suitability scoring against the reference dataset.
//!
//! Each observed parameter is compared with the crop's ideal value using a
//! tolerance band of 20% of the ideal. The aggregate score and a per-parameter
//! remark table are produced for display.

use serde::Serialize;

use crate::classifier::ModelArtifacts;
use crate::dataset::ReferenceDataset;
use crate::error::Result;

// ---

/// Tolerance band as a fraction of the ideal value.
const BAND: f64 = 0.2;
const LOW_FACTOR: f64 = 0.8;
const HIGH_FACTOR: f64 = 1.2;

/// Scored parameters, in report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parameter {
    Nitrogen,
    Phosphorus,
    Potassium,
    Temperature,
    Humidity,
    Ph,
    Rainfall,
}

impl Parameter {
    // ---
    pub const ALL: [Parameter; 7] = [
        Parameter::Nitrogen,
        Parameter::Phosphorus,
        Parameter::Potassium,
        Parameter::Temperature,
        Parameter::Humidity,
        Parameter::Ph,
        Parameter::Rainfall,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Parameter::Nitrogen => "Nitrogen (N)",
            Parameter::Phosphorus => "Phosphorus (P)",
            Parameter::Potassium => "Potassium (K)",
            Parameter::Temperature => "Temperature",
            Parameter::Humidity => "Humidity",
            Parameter::Ph => "pH",
            Parameter::Rainfall => "Rainfall",
        }
    }

    /// Suggestion when the observed value is below the band.
    fn raise_advice(self) -> &'static str {
        match self {
            Parameter::Nitrogen => "Apply nitrogen-rich fertilizers like urea or ammonium sulfate",
            Parameter::Phosphorus => "Use phosphorus fertilizers such as bone meal or superphosphate",
            Parameter::Potassium => "Add potassium-based fertilizers like potash or wood ash",
            Parameter::Temperature => "Use greenhouse techniques or choose planting times strategically",
            Parameter::Humidity => "Implement irrigation systems or use mulching techniques",
            Parameter::Ph => "Add lime to increase pH or sulfur to decrease pH",
            Parameter::Rainfall => "Use drip irrigation or rainwater harvesting techniques",
        }
    }

    /// Suggestion when the observed value is above the band.
    ///
    /// `None` for parameters that are only flagged, without a quantity.
    fn lower_advice(self) -> Option<&'static str> {
        match self {
            Parameter::Nitrogen | Parameter::Phosphorus | Parameter::Potassium => {
                Some("Consider soil amendments or drainage improvements.")
            }
            Parameter::Temperature => {
                Some("Use greenhouse techniques or choose planting times strategically")
            }
            Parameter::Ph => Some("Add lime to increase pH or sulfur to decrease pH"),
            Parameter::Humidity | Parameter::Rainfall => None,
        }
    }
}

/// One row of the displayed comparison table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterRow {
    // ---
    pub parameter: &'static str,
    pub recommended: f64,
    pub observed: f64,
    #[serde(rename = "remarks")]
    pub remark: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuitabilityReport {
    // ---
    pub score: f64,
    pub adjustments: Vec<String>,
    pub table: Vec<ParameterRow>,
}

/// Score `observed` (N, P, K, temperature, humidity, pH, rainfall) against
/// the ideal profile of `crop_name`.
pub fn score_suitability(
    dataset: &ReferenceDataset,
    observed: &[f64; 7],
    crop_name: &str,
) -> Result<SuitabilityReport> {
    // ---
    let ideal = dataset.profile(crop_name)?.ideal.to_array();

    let mut adjustments = Vec::new();
    let mut table = Vec::with_capacity(Parameter::ALL.len());

    for ((param, &obs), &target) in Parameter::ALL.iter().zip(observed).zip(&ideal) {
        let mut remark = String::from("Optimal");

        if obs < target * LOW_FACTOR {
            let shortage = round2(target - obs);
            remark = format!(
                "Too low. Increase by {}. {}.",
                py_float(shortage),
                param.raise_advice()
            );
            adjustments.push(format!(
                "{} is too low (Current: {}, Ideal: {}). Increase by {}.",
                param.label(),
                py_float(obs),
                py_float(target),
                py_float(shortage)
            ));
        } else if obs > target * HIGH_FACTOR {
            let excess = round2(obs - target);
            match param.lower_advice() {
                Some(advice) => {
                    remark = format!("Too high. Decrease by {}. {}", py_float(excess), advice);
                    adjustments.push(format!(
                        "{} is too high (Current: {}, Ideal: {}). Decrease by {}.",
                        param.label(),
                        py_float(obs),
                        py_float(target),
                        py_float(excess)
                    ));
                }
                None => {
                    remark = "Too high.".to_string();
                    adjustments.push(format!(
                        "{} is too high (Current: {}, Ideal: {}).",
                        param.label(),
                        py_float(obs),
                        py_float(target)
                    ));
                }
            }
        }

        table.push(ParameterRow {
            parameter: param.label(),
            recommended: round2(target),
            observed: round2(obs),
            remark,
        });
    }

    Ok(SuitabilityReport {
        score: round2(aggregate_score(observed, &ideal)),
        adjustments,
        table,
    })
}

/// Aggregate suitability on a 0..=100 scale.
///
/// `|100 - mean relative deviation * 100|`, wrapped modulo 100. Deviations
/// large enough to push the raw value to 100 or past it wrap around, so a very
/// poor match can report a high score. Only a zero-deviation match reports 100.
fn aggregate_score(observed: &[f64; 7], ideal: &[f64; 7]) -> f64 {
    // ---
    let relative: f64 = observed
        .iter()
        .zip(ideal)
        .map(|(obs, target)| (obs - target).abs() / (target * BAND))
        .sum();

    if relative == 0.0 {
        return 100.0;
    }

    let raw = (100.0 - relative * 100.0 / observed.len() as f64).abs();
    if !raw.is_finite() {
        return 0.0;
    }
    raw % 100.0
}

/// Best crop by suitability alongside the classifier's own pick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CropRecommendation {
    // ---
    pub crop: Option<String>,
    pub confidence: f64,
    #[serde(rename = "crop-predicted")]
    pub predicted_crop: String,
    #[serde(rename = "confidence-predicted")]
    pub predicted_confidence: f64,
}

/// Rank every crop in the dataset by suitability and consult the crop model.
///
/// The first crop with the highest score wins; with an empty dataset `crop`
/// is `None` and `confidence` is 0.
pub fn recommend_crop(
    dataset: &ReferenceDataset,
    models: &ModelArtifacts,
    observed: &[f64; 7],
) -> Result<CropRecommendation> {
    // ---
    let model = models.crop_model()?;
    let predicted_crop = model.predict(observed)?.to_string();
    let predicted_confidence = model
        .predict_proba(observed)?
        .into_iter()
        .fold(0.0, f64::max)
        * 100.0;

    let mut best: Option<(&str, f64)> = None;
    for crop in dataset.crop_names() {
        let score = score_suitability(dataset, observed, crop)?.score;
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((crop, score));
        }
    }

    let (crop, confidence) = match best {
        Some((name, score)) => (Some(name.to_string()), score),
        None => (None, 0.0),
    };

    Ok(CropRecommendation {
        crop,
        confidence: round2(confidence),
        predicted_crop,
        predicted_confidence: round2(predicted_confidence),
    })
}

// ---

/// Round to two decimal places, ties to even.
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

/// Render a float the way the remark text expects: integral values keep a
/// trailing `.0` (`40.0`, not `40`).
pub(crate) fn py_float(value: f64) -> String {
    // ---
    let text = value.to_string();
    if value.is_finite() && !text.contains(['.', 'e']) {
        format!("{text}.0")
    } else {
        text
    }
}
