//! Free-text application guidance for a recommended fertilizer.

// ---

const FALLBACK: &str = "Apply according to standard practices for your region.";

/// Fertilizer families, in matching priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FertilizerFamily {
    Urea,
    Dap,
    Potash,
    /// Compound NPK grades such as "14-35-14".
    Compound,
    SuperPhosphate,
    Ammonium,
}

impl FertilizerFamily {
    // ---
    const PRIORITY: [FertilizerFamily; 6] = [
        FertilizerFamily::Urea,
        FertilizerFamily::Dap,
        FertilizerFamily::Potash,
        FertilizerFamily::Compound,
        FertilizerFamily::SuperPhosphate,
        FertilizerFamily::Ammonium,
    ];

    /// First family whose marker appears in `name` (case-sensitive).
    pub fn classify(name: &str) -> Option<Self> {
        Self::PRIORITY.into_iter().find(|family| family.matches(name))
    }

    fn matches(self, name: &str) -> bool {
        match self {
            FertilizerFamily::Urea => name.contains("Urea"),
            FertilizerFamily::Dap => name.contains("DAP"),
            FertilizerFamily::Potash => name.contains("Potash"),
            FertilizerFamily::Compound => name.contains("NPK") || name.contains('-'),
            FertilizerFamily::SuperPhosphate => name.contains("Super Phosphate"),
            FertilizerFamily::Ammonium => name.contains("Ammonium"),
        }
    }

    pub fn instruction(self) -> &'static str {
        match self {
            FertilizerFamily::Urea => {
                "Apply in split doses - half at planting and half during vegetative growth"
            }
            FertilizerFamily::Dap => "Best applied at planting time, can be mixed with seeds",
            FertilizerFamily::Potash => "Apply during early growth stages for best results",
            FertilizerFamily::Compound => "Can be used as basal dose at planting time",
            FertilizerFamily::SuperPhosphate => "Apply before planting and incorporate into soil",
            FertilizerFamily::Ammonium => "Apply in moist soil conditions for best results",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropCategory {
    Cereal,
    Vegetable,
    FruitTree,
    Commercial,
}

impl CropCategory {
    // ---
    /// Case-insensitive lookup of a crop name.
    pub fn classify(crop: &str) -> Option<Self> {
        match crop.to_lowercase().as_str() {
            "rice" | "wheat" => Some(CropCategory::Cereal),
            "vegetables" | "tomato" | "potato" | "carrot" | "onion" => {
                Some(CropCategory::Vegetable)
            }
            "fruit" | "mango" | "apple" | "banana" | "orange" => Some(CropCategory::FruitTree),
            "cotton" | "sugarcane" | "jute" => Some(CropCategory::Commercial),
            _ => None,
        }
    }

    pub fn clause(self) -> &'static str {
        match self {
            CropCategory::Cereal => ". For cereals, incorporate into soil before planting.",
            CropCategory::Vegetable => {
                ". For vegetables, apply in multiple split doses throughout growth."
            }
            CropCategory::FruitTree => ". For fruit trees, apply in circular band around drip line.",
            CropCategory::Commercial => ". For commercial crops, apply in bands along the rows.",
        }
    }
}

/// Application guidance for `fertilizer`, tailored to `crop` when known.
pub fn generate_advice(fertilizer: &str, crop: Option<&str>) -> String {
    // ---
    let mut advice = FertilizerFamily::classify(fertilizer)
        .map(|family| family.instruction().to_string())
        .unwrap_or_default();

    if let Some(category) = crop.and_then(CropCategory::classify) {
        advice.push_str(category.clause());
    }

    if advice.is_empty() {
        FALLBACK.to_string()
    } else {
        advice
    }
}
