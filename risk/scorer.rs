//! # Scoring
//!
//! The fitted coefficients come in two shapes: a flat weight vector with a leading
//! bias column (`DirectLinear`), or a polynomial basis with separate ridge
//! weights (`PolynomialRidge`). Both reduce to `intercept + w . features` on the
//! appropriate basis, then go through the link and are clamped into
//! `[0, output_scale]`.
//!
//! The override rules that bypass the model, and the management adjustment that
//! follows it, live in [`OverridePolicy`].

use crate::assemble::{Observation, normalize_label};
use crate::model::{LinkFunction, ModelArtifact, ModelError, ModelShape};
use crate::poly::PolynomialExpander;
use ndarray::{Array1, ArrayView1};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub enum ScorerKind {
    DirectLinear,
    PolynomialRidge(PolynomialExpander),
}

#[derive(Debug, Clone)]
pub struct Scorer {
    kind: ScorerKind,
    intercept: f64,
    weights: Array1<f64>,
    link: LinkFunction,
    output_scale: f64,
}

impl Scorer {
    /// Builds the scorer, refusing any artifact whose coefficients do not line up
    /// with its feature basis.
    pub fn from_artifact(artifact: &ModelArtifact) -> Result<Self, ModelError> {
        artifact.validate()?;
        let k = artifact.feature_order.len();
        let (kind, intercept, weights) = match artifact.shape()? {
            ModelShape::DirectLinear(linear) => {
                let (bias, rest) = linear
                    .coef
                    .split_first()
                    .ok_or(ModelError::CoefficientCountMismatch {
                        found: 0,
                        expected: k + 1,
                    })?;
                (ScorerKind::DirectLinear, *bias, Array1::from(rest.to_vec()))
            }
            ModelShape::PolynomialRidge(poly, ridge) => {
                let expander = PolynomialExpander::new(poly, k)?;
                (
                    ScorerKind::PolynomialRidge(expander),
                    ridge.intercept,
                    Array1::from(ridge.coef.clone()),
                )
            }
        };

        Ok(Self {
            kind,
            intercept,
            weights,
            link: artifact.link_function,
            output_scale: artifact.output_scale,
        })
    }

    pub fn kind(&self) -> &ScorerKind {
        &self.kind
    }

    pub fn variant_name(&self) -> &'static str {
        match self.kind {
            ScorerKind::DirectLinear => "direct-linear",
            ScorerKind::PolynomialRidge(_) => "polynomial-ridge",
        }
    }

    pub fn link(&self) -> LinkFunction {
        self.link
    }

    pub fn output_scale(&self) -> f64 {
        self.output_scale
    }

    /// Dimension of the basis the weights act on.
    pub fn basis_dim(&self) -> usize {
        self.weights.len()
    }

    /// `intercept + w . basis(z)` for a standardized feature vector.
    pub fn linear_predictor(&self, standardized: ArrayView1<f64>) -> f64 {
        let dot = match &self.kind {
            ScorerKind::DirectLinear => self.weights.dot(&standardized),
            ScorerKind::PolynomialRidge(expander) => {
                self.weights.dot(&expander.transform(standardized))
            }
        };
        self.intercept + dot
    }

    /// Maps a linear predictor through the link and clamps into `[0, output_scale]`.
    pub fn to_incidence(&self, eta: f64) -> f64 {
        clamp_to_scale(self.link.inverse(eta, self.output_scale), self.output_scale)
    }
}

/// Clamps into `[0, scale]`. NaN maps to 0.
fn clamp_to_scale(value: f64, scale: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, scale)
    }
}

/// Which ceiling fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CeilingTrigger {
    HeatHours,
    SporeTotal,
}

/// Result of the pre-model override check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Override {
    AllZeroInput,
    Ceiling(CeilingTrigger),
}

/// Default multiplicative adjustment per management level.
pub fn default_management_adjustment() -> BTreeMap<String, f64> {
    BTreeMap::from([("excellent".to_string(), 0.9), ("average".to_string(), 1.1)])
}

/// Rules layered over the fitted model, in priority order: all-zero input, then
/// the heat and spore ceilings, then the management adjustment.
#[derive(Debug, Clone, PartialEq)]
pub struct OverridePolicy {
    pub temperature_ceiling: Option<f64>,
    pub spore_ceiling: Option<f64>,
    /// Keys are normalized management labels; unlisted levels use 1.0.
    management_factors: BTreeMap<String, f64>,
}

impl OverridePolicy {
    pub fn new(
        temperature_ceiling: Option<f64>,
        spore_ceiling: Option<f64>,
        management_factors: &BTreeMap<String, f64>,
    ) -> Self {
        Self {
            temperature_ceiling,
            spore_ceiling,
            management_factors: management_factors
                .iter()
                .map(|(label, &factor)| (normalize_label(label), factor))
                .collect(),
        }
    }

    /// Returns the override that replaces the model for this observation, if any.
    pub fn check(&self, observation: &Observation) -> Option<Override> {
        if observation.is_all_zero() {
            return Some(Override::AllZeroInput);
        }
        if let Some(ceiling) = self.temperature_ceiling {
            if observation.heat_hours >= ceiling {
                return Some(Override::Ceiling(CeilingTrigger::HeatHours));
            }
        }
        if let Some(ceiling) = self.spore_ceiling {
            if observation.spore_total() >= ceiling {
                return Some(Override::Ceiling(CeilingTrigger::SporeTotal));
            }
        }
        None
    }

    pub fn management_factor(&self, label: &str) -> f64 {
        self.management_factors
            .get(&normalize_label(label))
            .copied()
            .unwrap_or(1.0)
    }

    /// Applies the management factor to a clamped model prediction and re-clamps.
    pub fn adjust(&self, prediction: f64, label: &str, output_scale: f64) -> f64 {
        clamp_to_scale(prediction * self.management_factor(label), output_scale)
    }
}
