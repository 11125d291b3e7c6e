//! Class labels and display names
//!
//! `ClassLabels` holds the raw identifiers produced by training, in model output
//! order. `LabelMap` maps a raw identifier to the name shown to end users.

use crate::ModelLoadError;
use std::collections::HashMap;
use std::path::Path;

/// Display names for the classes of the shipped skin model
const DEFAULT_DISPLAY_NAMES: &[(&str, &str)] = &[
    ("Acne And Rosacea Photos", "Acne & Rosacea"),
    (
        "Actinic Keratosis Basal Cell Carcinoma And Other Maligna...",
        "Actinic Keratosis & Skin Cancer",
    ),
    ("Atopic Dermatitis Photos", "Atopic Dermatitis (Eczema)"),
    ("Ba Cellulitis", "Cellulitis (Bacterial Infection)"),
    ("Ba Impetigo", "Impetigo (Bacterial Infection)"),
    ("Benign", "Benign Skin Lesions"),
    ("Bullous Disease Photos", "Bullous Diseases (Blistering)"),
    (
        "Cellulitis Impetigo And Other Bacterial Infections",
        "Bacterial Skin Infections",
    ),
    ("Eczema Photos", "Eczema"),
    ("Exanthems And Drug Eruptions", "Drug Rashes & Exanthems"),
    ("Fu Athlete Foot", "Athlete's Foot (Tinea Pedis)"),
    ("Fu Nail Fungus", "Nail Fungus (Onychomycosis)"),
    ("Fu Ringworm", "Ringworm (Tinea Corporis)"),
    (
        "Hair Loss Photos Alopecia And Other Hair Diseases",
        "Alopecia & Hair Loss",
    ),
    ("Healthy", "Healthy Skin"),
    ("Herpes Hpv And Other Stds Photos", "Herpes, HPV & Other STDs"),
    (
        "Light Diseases And Disorders Of Pigmentation",
        "Pigmentation Disorders",
    ),
    (
        "Lupus And Other Connective Tissue Diseases",
        "Lupus & Connective Tissue Disorders",
    ),
    ("Malignant", "Malignant Skin Tumors"),
    (
        "Melanoma Skin Cancer Nevi And Moles",
        "Melanoma, Moles & Nevi",
    ),
    ("Nail Fungus And Other Nail Disease", "Nail Disorders"),
    ("Pa Cutaneous Larva Migrans", "Cutaneous Larva Migrans"),
    (
        "Poison Ivy Photos And Other Contact Dermatitis",
        "Contact Dermatitis",
    ),
    (
        "Psoriasis Pictures Lichen Planus And Related Diseases",
        "Psoriasis & Lichen Planus",
    ),
    ("Rashes", "General Rashes"),
    (
        "Scabies Lyme Disease And Other Infestations An...",
        "Scabies, Lyme & Infestations",
    ),
    (
        "Seborrheic Keratoses And Other Benign Tumors",
        "Seborrheic Keratoses & Benign Tumors",
    ),
    ("Systemic Disease", "Systemic Disease (skin signs)"),
    (
        "Tinea Ringworm Candidiasis And Other Fungal Infections",
        "Fungal Infections (Tinea, Candida)",
    ),
    ("Urticaria Hives", "Urticaria (Hives)"),
    ("Vascular Tumors", "Vascular Tumors"),
    ("Vasculitis Photos", "Vasculitis"),
    ("Vi Chickenpox", "Chickenpox"),
    ("Vi Shingles", "Shingles (Herpes Zoster)"),
    (
        "Warts Molluscum And Other Viral Infections",
        "Warts & Viral Infections",
    ),
];

/// Ordered raw class identifiers; index `i` names output `i` of the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassLabels {
    labels: Vec<String>,
}

impl ClassLabels {
    #[must_use]
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }

    /// Load labels from a JSON array of strings
    ///
    /// # Errors
    /// Returns error if the file is missing, is not a JSON string array, or is empty
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ModelLoadError> {
        let path = path.as_ref();
        let label_error = |error: String| ModelLoadError::Labels {
            path: path.display().to_string(),
            error,
        };

        let contents = std::fs::read_to_string(path).map_err(|e| label_error(e.to_string()))?;
        let labels: Vec<String> =
            serde_json::from_str(&contents).map_err(|e| label_error(e.to_string()))?;

        if labels.is_empty() {
            return Err(label_error("label list is empty".to_string()));
        }

        Ok(Self { labels })
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }
}

/// Raw identifier -> display name lookup with verbatim fallback
#[derive(Debug, Clone, Default)]
pub struct LabelMap {
    names: HashMap<String, String>,
}

impl LabelMap {
    /// Empty map: every identifier is displayed verbatim
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Display names of the shipped skin model
    #[must_use]
    pub fn builtin() -> Self {
        let names = DEFAULT_DISPLAY_NAMES
            .iter()
            .map(|(raw, pretty)| ((*raw).to_string(), (*pretty).to_string()))
            .collect();
        Self { names }
    }

    #[must_use]
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            names: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Merge entries from a JSON object file over the current map
    ///
    /// # Errors
    /// Returns error if the file is missing or is not a JSON object of strings
    pub fn with_overrides_file(mut self, path: impl AsRef<Path>) -> Result<Self, ModelLoadError> {
        let path = path.as_ref();
        let label_error = |error: String| ModelLoadError::Labels {
            path: path.display().to_string(),
            error,
        };

        let contents = std::fs::read_to_string(path).map_err(|e| label_error(e.to_string()))?;
        let overrides: HashMap<String, String> =
            serde_json::from_str(&contents).map_err(|e| label_error(e.to_string()))?;

        self.names.extend(overrides);
        Ok(self)
    }

    /// Display name for `raw`, or `raw` itself when unmapped
    #[must_use]
    pub fn display_name<'a>(&'a self, raw: &'a str) -> &'a str {
        self.names.get(raw).map_or(raw, String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
