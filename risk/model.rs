use crate::poly::PolynomialExpander;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

// --- Public Data Structures ---
// These structs define the public, human-readable format of the fitted model
// when serialized to a TOML file. The artifact is produced offline and only
// ever read here (plus written by fixtures and the starter template).

/// Reserved feature name for accumulated hours above the heat-stress threshold.
pub const HEAT_HOURS: &str = "heat_hours";
/// Reserved feature name for the peak weekly spore count in May.
pub const MAY_PEAK_SPORES: &str = "may_peak_spores";
/// Reserved feature name for the peak weekly spore count in July.
pub const JULY_PEAK_SPORES: &str = "july_peak_spores";
/// Reserved feature name for the encoded stand management level.
pub const MANAGEMENT_LEVEL: &str = "management_level";

/// Management levels a fitted model may distinguish.
pub const MIN_MANAGEMENT_LEVELS: usize = 3;
pub const MAX_MANAGEMENT_LEVELS: usize = 5;

/// Defines the link function, connecting the linear predictor to the incidence scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkFunction {
    /// The model was fitted on `logit(y / output_scale)`; predictions are mapped back
    /// through the sigmoid and rescaled.
    Logit,
    /// The model was fitted directly on the incidence percentage.
    Identity,
}

impl LinkFunction {
    /// Maps a linear predictor back onto the incidence scale. No clamping is done here.
    pub fn inverse(self, eta: f64, output_scale: f64) -> f64 {
        match self {
            LinkFunction::Logit => {
                // Clamp eta to prevent overflow in exp()
                let eta = eta.clamp(-700.0, 700.0);
                output_scale / (1.0 + f64::exp(-eta))
            }
            LinkFunction::Identity => eta,
        }
    }
}

/// Fitted z-score statistics, one entry per feature in `feature_order`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardizerStats {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

/// Polynomial basis recorded at fit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolyConfig {
    pub degree: usize,
    #[serde(default = "default_include_bias")]
    pub include_bias: bool,
    #[serde(default)]
    pub interaction_only: bool,
}

fn default_include_bias() -> bool {
    true
}

/// Ridge weights over the expanded basis, with the intercept kept separately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RidgeCoefficients {
    pub intercept: f64,
    pub coef: Vec<f64>,
}

/// A flat weight vector whose first entry is the bias column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearCoefficients {
    pub coef: Vec<f64>,
}

/// The top-level, self-contained, fitted model artifact.
/// This is the structure that gets saved to and loaded from a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub link_function: LinkFunction,
    /// Upper bound of the predicted incidence percentage (Y_MAX).
    pub output_scale: f64,
    /// Conversion from raw spore counts into the unit the model was fitted on.
    pub spore_factor: f64,
    /// Whether raw spore counts are multiplied by `spore_factor` before standardization.
    /// Deliberately required: some deployments feed pre-scaled counts.
    pub apply_spore_factor: bool,
    /// Canonical order of the raw features. Strictly enforced during assembly.
    pub feature_order: Vec<String>,
    pub standardizer: StandardizerStats,
    /// Management label to the numeric code used as its feature value.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub management_levels: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linear: Option<LinearCoefficients>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poly: Option<PolyConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ridge: Option<RidgeCoefficients>,
}

/// Which of the two supported model shapes an artifact carries.
#[derive(Debug, Clone, Copy)]
pub enum ModelShape<'a> {
    DirectLinear(&'a LinearCoefficients),
    PolynomialRidge(&'a PolyConfig, &'a RidgeCoefficients),
}

/// Custom error type for model loading, saving, and validation.
/// Every variant is fatal at startup.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Failed to read or write model file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML model file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize model to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("The model's feature_order is empty.")]
    EmptyFeatureOrder,
    #[error("Feature '{0}' appears more than once in feature_order.")]
    DuplicateFeature(String),
    #[error(
        "Standardizer has {means} means and {scales} scales, but feature_order lists {expected} features."
    )]
    StandardizerLengthMismatch {
        means: usize,
        scales: usize,
        expected: usize,
    },
    #[error("Non-finite values (NaN or Infinity) were found in '{0}'.")]
    NonFiniteParameter(&'static str),
    #[error("output_scale must be finite and positive, but was {0}.")]
    InvalidOutputScale(f64),
    #[error("spore_factor must be finite and positive, but was {0}.")]
    InvalidSporeFactor(f64),
    #[error("The model carries both a [linear] section and a [poly]/[ridge] pair; exactly one shape is allowed.")]
    AmbiguousModelShape,
    #[error("The model carries no coefficients: expected a [linear] section or a [poly] + [ridge] pair.")]
    MissingModelSection,
    #[error("The polynomial model is incomplete: the [{0}] section is missing.")]
    IncompletePolynomialModel(&'static str),
    #[error("Polynomial degree must be at least 1, but was {0}.")]
    InvalidPolynomialDegree(usize),
    #[error("The model has {found} coefficients, but the feature basis requires {expected}.")]
    CoefficientCountMismatch { found: usize, expected: usize },
    #[error("'management_level' is listed in feature_order but no [management_levels] are defined.")]
    MissingManagementLevels,
    #[error(
        "The model defines {0} management levels; between 3 and 5 are supported."
    )]
    ManagementLevelCount(usize),
}

impl ModelArtifact {
    /// Loads a fitted model from a TOML file and validates its structure.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let toml_string = fs::read_to_string(path)?;
        let model: ModelArtifact = toml::from_str(&toml_string)?;
        model.validate()?;
        log::info!(
            "Loaded {} model from {} ({} features, output scale {})",
            model.shape()?.name(),
            path.display(),
            model.feature_order.len(),
            model.output_scale
        );
        Ok(model)
    }

    /// Saves the model to a file in a human-readable TOML format.
    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Selects the model shape from whichever optional sections are present.
    pub fn shape(&self) -> Result<ModelShape<'_>, ModelError> {
        match (&self.linear, &self.poly, &self.ridge) {
            (Some(linear), None, None) => Ok(ModelShape::DirectLinear(linear)),
            (None, Some(poly), Some(ridge)) => Ok(ModelShape::PolynomialRidge(poly, ridge)),
            (Some(_), _, _) => Err(ModelError::AmbiguousModelShape),
            (None, Some(_), None) => Err(ModelError::IncompletePolynomialModel("ridge")),
            (None, None, Some(_)) => Err(ModelError::IncompletePolynomialModel("poly")),
            (None, None, None) => Err(ModelError::MissingModelSection),
        }
    }

    /// Checks every structural invariant the prediction path relies on.
    pub fn validate(&self) -> Result<(), ModelError> {
        let k = self.feature_order.len();
        if k == 0 {
            return Err(ModelError::EmptyFeatureOrder);
        }
        let mut seen = HashSet::with_capacity(k);
        for name in &self.feature_order {
            if !seen.insert(name.as_str()) {
                return Err(ModelError::DuplicateFeature(name.clone()));
            }
        }

        if self.standardizer.mean.len() != k || self.standardizer.scale.len() != k {
            return Err(ModelError::StandardizerLengthMismatch {
                means: self.standardizer.mean.len(),
                scales: self.standardizer.scale.len(),
                expected: k,
            });
        }
        require_finite("standardizer.mean", &self.standardizer.mean)?;
        require_finite("standardizer.scale", &self.standardizer.scale)?;

        if !(self.output_scale.is_finite() && self.output_scale > 0.0) {
            return Err(ModelError::InvalidOutputScale(self.output_scale));
        }
        if !(self.spore_factor.is_finite() && self.spore_factor > 0.0) {
            return Err(ModelError::InvalidSporeFactor(self.spore_factor));
        }

        if self.feature_order.iter().any(|n| n == MANAGEMENT_LEVEL)
            && self.management_levels.is_empty()
        {
            return Err(ModelError::MissingManagementLevels);
        }
        if !self.management_levels.is_empty() {
            let n = self.management_levels.len();
            if !(MIN_MANAGEMENT_LEVELS..=MAX_MANAGEMENT_LEVELS).contains(&n) {
                return Err(ModelError::ManagementLevelCount(n));
            }
            if self.management_levels.values().any(|c| !c.is_finite()) {
                return Err(ModelError::NonFiniteParameter("management_levels"));
            }
        }

        match self.shape()? {
            ModelShape::DirectLinear(linear) => {
                require_finite("linear.coef", &linear.coef)?;
                if linear.coef.len() != k + 1 {
                    return Err(ModelError::CoefficientCountMismatch {
                        found: linear.coef.len(),
                        expected: k + 1,
                    });
                }
            }
            ModelShape::PolynomialRidge(poly, ridge) => {
                require_finite("ridge.coef", &ridge.coef)?;
                if !ridge.intercept.is_finite() {
                    return Err(ModelError::NonFiniteParameter("ridge.intercept"));
                }
                let expander = PolynomialExpander::new(poly, k)?;
                if ridge.coef.len() != expander.output_dim() {
                    return Err(ModelError::CoefficientCountMismatch {
                        found: ridge.coef.len(),
                        expected: expander.output_dim(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl ModelShape<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            ModelShape::DirectLinear(_) => "direct-linear",
            ModelShape::PolynomialRidge(..) => "polynomial-ridge",
        }
    }
}

fn require_finite(field: &'static str, values: &[f64]) -> Result<(), ModelError> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(ModelError::NonFiniteParameter(field))
    }
}
