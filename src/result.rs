use serde::Serialize;

use crate::catalog::{Disease, DiseaseCatalog};

/// Predictions below this confidence are reported as `Unknown`.
pub const CONFIDENCE_THRESHOLD: f32 = 0.25;

pub const LOW_CONFIDENCE_MESSAGE: &str =
    "Prediction confidence too low. Try again with a clearer image.";
pub const FAILURE_MESSAGE: &str = "Error during detection.";
const NOT_AVAILABLE: &str = "N/A";

/// What `/detect` answers with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub disease: Disease,
    pub confidence: f32,
    pub description: String,
    pub symptoms: String,
    pub treatment: String,
}

impl ClassificationResult {
    fn unknown(description: &str) -> Self {
        Self {
            disease: Disease::Unknown,
            confidence: 0.0,
            description: description.to_string(),
            symptoms: NOT_AVAILABLE.to_string(),
            treatment: NOT_AVAILABLE.to_string(),
        }
    }

    pub fn low_confidence() -> Self {
        Self::unknown(LOW_CONFIDENCE_MESSAGE)
    }

    /// Uniform answer for any decode, inference or storage failure.
    pub fn failed() -> Self {
        Self::unknown(FAILURE_MESSAGE)
    }

    pub fn is_unknown(&self) -> bool {
        self.disease == Disease::Unknown
    }
}

/// Joins a raw prediction with the catalog and applies the threshold.
///
/// `ambiguous` marks a top score shared with another class; such a
/// prediction is treated like a low-confidence one.
pub fn assemble(
    catalog: &DiseaseCatalog,
    disease: Disease,
    confidence: f32,
    ambiguous: bool,
) -> ClassificationResult {
    if disease == Disease::Unknown
        || ambiguous
        || confidence.is_nan()
        || confidence < CONFIDENCE_THRESHOLD
    {
        return ClassificationResult::low_confidence();
    }

    let (description, symptoms, treatment) = match catalog.get(disease) {
        Some(entry) => (
            entry.description.clone(),
            entry.symptoms.clone(),
            entry.treatment.clone(),
        ),
        None => (
            NOT_AVAILABLE.to_string(),
            NOT_AVAILABLE.to_string(),
            NOT_AVAILABLE.to_string(),
        ),
    };

    ClassificationResult {
        disease,
        confidence: confidence.clamp(0.0, 1.0),
        description,
        symptoms,
        treatment,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confident_prediction_passes_catalog_text_through() {
        let catalog = DiseaseCatalog::builtin();
        let result = assemble(&catalog, Disease::Healthy, 0.8, false);

        assert_eq!(result.disease, Disease::Healthy);
        assert_eq!(result.confidence, 0.8);
        assert_eq!(result.description, "No visible disease symptoms.");
        assert_eq!(result.treatment, "No treatment necessary.");
    }

    #[test]
    fn threshold_is_inclusive() {
        let catalog = DiseaseCatalog::builtin();
        assert_eq!(
            assemble(&catalog, Disease::LeafMold, 0.25, false).disease,
            Disease::LeafMold
        );
        assert!(assemble(&catalog, Disease::LeafMold, 0.2499, false).is_unknown());
    }

    #[test]
    fn low_confidence_overrides_any_label() {
        let catalog = DiseaseCatalog::builtin();
        for disease in Disease::CLASSES {
            let result = assemble(&catalog, disease, 0.1, false);
            assert_eq!(result, ClassificationResult::low_confidence());
            assert_eq!(result.confidence, 0.0);
            assert_eq!(result.symptoms, "N/A");
        }
    }

    #[test]
    fn ambiguous_or_nan_is_low_confidence() {
        let catalog = DiseaseCatalog::builtin();
        assert!(assemble(&catalog, Disease::LateBlight, 0.25, true).is_unknown());
        assert!(assemble(&catalog, Disease::LateBlight, f32::NAN, false).is_unknown());
    }

    #[test]
    fn missing_catalog_entry_yields_placeholders() {
        let catalog = DiseaseCatalog::from_json("{}").unwrap();
        let result = assemble(&catalog, Disease::BacterialSpot, 0.7, false);

        assert_eq!(result.disease, Disease::BacterialSpot);
        assert_eq!(result.description, "N/A");
    }

    #[test]
    fn failure_result_shape() {
        let json = serde_json::to_value(ClassificationResult::failed()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "disease": "Unknown",
                "confidence": 0.0,
                "description": "Error during detection.",
                "symptoms": "N/A",
                "treatment": "N/A"
            })
        );
    }
}
