use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Classes the model was trained on, plus the verdict used when no class is
/// trustworthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Disease {
    #[serde(rename = "Late Blight")]
    LateBlight,
    #[serde(rename = "Leaf Mold")]
    LeafMold,
    #[serde(rename = "Bacterial Spot")]
    BacterialSpot,
    #[serde(rename = "Healthy")]
    Healthy,
    #[serde(rename = "Unknown")]
    Unknown,
}

impl Disease {
    /// Model output order: index `i` of the probability vector belongs to
    /// `CLASSES[i]`.
    pub const CLASSES: [Disease; 4] = [
        Disease::LateBlight,
        Disease::LeafMold,
        Disease::BacterialSpot,
        Disease::Healthy,
    ];

    pub fn from_index(index: usize) -> Option<Disease> {
        Self::CLASSES.get(index).copied()
    }

    pub fn label(self) -> &'static str {
        match self {
            Disease::LateBlight => "Late Blight",
            Disease::LeafMold => "Leaf Mold",
            Disease::BacterialSpot => "Bacterial Spot",
            Disease::Healthy => "Healthy",
            Disease::Unknown => "Unknown",
        }
    }

    pub fn from_label(label: &str) -> Option<Disease> {
        Self::CLASSES.into_iter().find(|d| d.label() == label)
    }
}

impl fmt::Display for Disease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub description: String,
    pub symptoms: String,
    pub treatment: String,
}

/// Read-only disease metadata, loaded once at startup.
#[derive(Debug, Clone)]
pub struct DiseaseCatalog {
    entries: HashMap<Disease, CatalogEntry>,
}

impl DiseaseCatalog {
    /// Parses a JSON object of `label -> {description, symptoms, treatment}`.
    /// Labels the model cannot produce are skipped with a warning.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let raw: HashMap<String, CatalogEntry> =
            serde_json::from_str(json).context("catalog is not a label -> entry object")?;

        let mut entries = HashMap::new();
        for (label, entry) in raw {
            match Disease::from_label(&label) {
                Some(disease) => {
                    entries.insert(disease, entry);
                }
                None => tracing::warn!("ignoring catalog entry for unknown label {:?}", label),
            }
        }

        for disease in Disease::CLASSES {
            if !entries.contains_key(&disease) {
                tracing::warn!("catalog has no entry for {}", disease);
            }
        }

        Ok(Self { entries })
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read catalog {}", path.display()))?;
        Self::from_json(&json)
    }

    /// The catalog shipped with the service, used when no side file exists.
    pub fn builtin() -> Self {
        let entry = |description: &str, symptoms: &str, treatment: &str| CatalogEntry {
            description: description.to_string(),
            symptoms: symptoms.to_string(),
            treatment: treatment.to_string(),
        };

        let entries = HashMap::from([
            (
                Disease::LateBlight,
                entry(
                    "Serious fungal disease of potatoes and tomatoes.",
                    "Dark lesions, white fuzz under leaves.",
                    "Apply fungicide, remove affected plants.",
                ),
            ),
            (
                Disease::LeafMold,
                entry(
                    "Fungal disease common in humid areas.",
                    "Yellow spots on upper leaves, mold on bottom.",
                    "Use copper-based fungicides, increase airflow.",
                ),
            ),
            (
                Disease::BacterialSpot,
                entry(
                    "Bacterial disease affecting leaves and fruit.",
                    "Small, water-soaked spots that turn brown.",
                    "Use resistant varieties, apply copper sprays.",
                ),
            ),
            (
                Disease::Healthy,
                entry(
                    "No visible disease symptoms.",
                    "Leaves appear normal.",
                    "No treatment necessary.",
                ),
            ),
        ]);

        Self { entries }
    }

    pub fn get(&self, disease: Disease) -> Option<&CatalogEntry> {
        self.entries.get(&disease)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
