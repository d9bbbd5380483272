use crate::assemble::{AssemblyError, FeatureAssembler, Observation};
use crate::classify::{RiskCategory, RiskClassifier};
use crate::config::{ConfigError, Deployment, InputBounds, PredictorSettings};
use crate::model::{ModelArtifact, ModelError};
use crate::scorer::{CeilingTrigger, Override, OverridePolicy, Scorer};
use crate::standardize::Standardizer;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Anything that prevents the predictor from being built. Always fatal.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// A rejected request. No prediction is produced.
#[derive(Error, Debug, PartialEq)]
pub enum PredictError {
    #[error("Input '{0}' is not a finite number.")]
    NonFinite(String),
    #[error("Input '{name}' = {value} is outside the accepted range [0, {max}].")]
    OutOfBounds { name: String, value: f64, max: f64 },
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
}

/// How the final value was reached.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PredictionBasis {
    AllZeroInput,
    Ceiling { trigger: CeilingTrigger },
    Model { raw_score: f64, management_factor: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    /// Predicted incidence, always within `[0, output_scale]`.
    pub value: f64,
    pub output_scale: f64,
    pub category: RiskCategory,
    pub color: &'static str,
    pub text_color: &'static str,
    pub basis: PredictionBasis,
}

impl Prediction {
    fn new(value: f64, output_scale: f64, category: RiskCategory, basis: PredictionBasis) -> Self {
        Self {
            value,
            output_scale,
            category,
            color: category.color(),
            text_color: category.text_color(),
            basis,
        }
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}% ({})", self.value, self.category)
    }
}

/// The full prediction pipeline over one immutable fitted model.
///
/// Built once at startup; every call to [`RiskPredictor::predict`] is independent
/// and leaves the predictor untouched.
#[derive(Debug, Clone)]
pub struct RiskPredictor {
    artifact: Arc<ModelArtifact>,
    assembler: FeatureAssembler,
    standardizer: Standardizer,
    scorer: Scorer,
    classifier: RiskClassifier,
    policy: OverridePolicy,
    bounds: InputBounds,
}

impl RiskPredictor {
    pub fn new(
        artifact: Arc<ModelArtifact>,
        settings: &PredictorSettings,
    ) -> Result<Self, StartupError> {
        settings.validate()?;
        let scorer = Scorer::from_artifact(&artifact)?;
        let assembler = FeatureAssembler::new(&artifact);
        let standardizer = Standardizer::new(&artifact.standardizer, &artifact.feature_order);
        let classifier = RiskClassifier::new(settings.threshold_table, artifact.output_scale)?;
        let policy = OverridePolicy::new(
            settings.overrides.temperature_ceiling,
            settings.overrides.spore_ceiling,
            &settings.management_adjustment,
        );

        for label in settings.management_adjustment.keys() {
            if assembler.has_management_levels() && assembler.management_code(label).is_err() {
                log::warn!(
                    "Management adjustment configured for '{label}', which the model does not define."
                );
            }
        }

        Ok(Self {
            artifact,
            assembler,
            standardizer,
            scorer,
            classifier,
            policy,
            bounds: settings.bounds,
        })
    }

    /// Loads the deployment's model and builds the predictor.
    pub fn from_deployment(deployment: &Deployment) -> Result<Self, StartupError> {
        let artifact = ModelArtifact::load(&deployment.model_path())?;
        Self::new(Arc::new(artifact), &deployment.config.settings)
    }

    pub fn artifact(&self) -> &ModelArtifact {
        &self.artifact
    }

    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    pub fn classifier(&self) -> &RiskClassifier {
        &self.classifier
    }

    pub fn assembler(&self) -> &FeatureAssembler {
        &self.assembler
    }

    pub fn policy(&self) -> &OverridePolicy {
        &self.policy
    }

    pub fn predict(&self, observation: &Observation) -> Result<Prediction, PredictError> {
        self.validate(observation)?;
        let scale = self.scorer.output_scale();

        match self.policy.check(observation) {
            Some(Override::AllZeroInput) => {
                log::debug!("All inputs are zero; model bypassed.");
                return Ok(Prediction::new(
                    0.0,
                    scale,
                    RiskCategory::Negligible,
                    PredictionBasis::AllZeroInput,
                ));
            }
            Some(Override::Ceiling(trigger)) => {
                log::debug!("Ceiling reached ({trigger:?}); model bypassed.");
                return Ok(Prediction::new(
                    scale,
                    scale,
                    RiskCategory::Maximum,
                    PredictionBasis::Ceiling { trigger },
                ));
            }
            None => {}
        }

        let raw = self.assembler.assemble(observation)?;
        let standardized = self.standardizer.transform(raw.view());
        let raw_score = self.scorer.linear_predictor(standardized.view());
        let base = self.scorer.to_incidence(raw_score);
        let management_factor = self.policy.management_factor(&observation.management);
        let value = self.policy.adjust(base, &observation.management, scale);
        log::debug!(
            "raw={raw} standardized={standardized} eta={raw_score:.6} base={base:.4} factor={management_factor} final={value:.4}"
        );

        Ok(Prediction::new(
            value,
            scale,
            self.classifier.classify(value),
            PredictionBasis::Model {
                raw_score,
                management_factor,
            },
        ))
    }

    /// Rejects inputs that are non-finite or outside the configured bounds, and labels
    /// the model does not define when it defines any.
    fn validate(&self, observation: &Observation) -> Result<(), PredictError> {
        check_bounded("heat_hours", observation.heat_hours, self.bounds.max_heat_hours)?;
        for (name, &count) in &observation.spores {
            check_bounded(name, count, self.bounds.max_spore_count)?;
        }
        if self.assembler.has_management_levels() {
            self.assembler.management_code(&observation.management)?;
        }
        Ok(())
    }
}

fn check_bounded(name: &str, value: f64, max: f64) -> Result<(), PredictError> {
    if !value.is_finite() {
        return Err(PredictError::NonFinite(name.to_string()));
    }
    if !(0.0..=max).contains(&value) {
        return Err(PredictError::OutOfBounds {
            name: name.to_string(),
            value,
            max,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ThresholdTable;
    use crate::model::{
        HEAT_HOURS, JULY_PEAK_SPORES, LinearCoefficients, LinkFunction, MANAGEMENT_LEVEL,
        MAY_PEAK_SPORES, StandardizerStats,
    };
    use approx::assert_abs_diff_eq;
    use std::collections::BTreeMap;

    fn bias_only(bias: f64) -> Arc<ModelArtifact> {
        Arc::new(ModelArtifact {
            link_function: LinkFunction::Identity,
            output_scale: 50.0,
            spore_factor: 1e-4,
            apply_spore_factor: true,
            feature_order: [HEAT_HOURS, MAY_PEAK_SPORES, JULY_PEAK_SPORES, MANAGEMENT_LEVEL]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            standardizer: StandardizerStats {
                mean: vec![500.0, 10.0, 10.0, 1.0],
                scale: vec![300.0, 8.0, 8.0, 0.8],
            },
            management_levels: BTreeMap::from([
                ("excellent".to_string(), 0.0),
                ("average".to_string(), 1.0),
                ("poor".to_string(), 2.0),
            ]),
            linear: Some(LinearCoefficients {
                coef: vec![bias, 0.0, 0.0, 0.0, 0.0],
            }),
            poly: None,
            ridge: None,
        })
    }

    fn predictor(bias: f64) -> RiskPredictor {
        RiskPredictor::new(
            bias_only(bias),
            &PredictorSettings::new(ThresholdTable::TableA).with_ceilings(Some(1900.0), None),
        )
        .unwrap()
    }

    #[test]
    fn test_bias_with_management_adjustment() {
        let predictor = predictor(25.0);
        let poor = predictor
            .predict(&Observation::new(600.0, 80_000.0, 90_000.0, "poor"))
            .unwrap();
        assert_abs_diff_eq!(poor.value, 25.0, epsilon = 1e-12);
        assert_eq!(poor.category, RiskCategory::High);

        let excellent = predictor
            .predict(&Observation::new(600.0, 80_000.0, 90_000.0, "excellent"))
            .unwrap();
        assert_abs_diff_eq!(excellent.value, 22.5, epsilon = 1e-12);

        let average = predictor
            .predict(&Observation::new(600.0, 80_000.0, 90_000.0, "average"))
            .unwrap();
        assert_abs_diff_eq!(average.value, 27.5, epsilon = 1e-12);
        match average.basis {
            PredictionBasis::Model {
                management_factor, ..
            } => assert_abs_diff_eq!(management_factor, 1.1, epsilon = 1e-12),
            other => panic!("Expected model basis, got {other:?}"),
        }
    }

    #[test]
    fn test_rejections() {
        let predictor = predictor(25.0);
        assert_eq!(
            predictor.predict(&Observation::new(f64::NAN, 0.0, 0.0, "poor")),
            Err(PredictError::NonFinite("heat_hours".to_string()))
        );
        assert!(matches!(
            predictor.predict(&Observation::new(3000.5, 0.0, 0.0, "poor")),
            Err(PredictError::OutOfBounds { .. })
        ));
        assert!(matches!(
            predictor.predict(&Observation::new(100.0, -1.0, 0.0, "poor")),
            Err(PredictError::OutOfBounds { .. })
        ));
        assert!(matches!(
            predictor.predict(&Observation::new(100.0, 0.0, 1_000_001.0, "poor")),
            Err(PredictError::OutOfBounds { .. })
        ));
        assert!(matches!(
            predictor.predict(&Observation::new(0.0, 0.0, 0.0, "unknown")),
            Err(PredictError::Assembly(AssemblyError::UnknownManagementLevel { .. }))
        ));
    }

    #[test]
    fn test_ceiling_skips_adjustment() {
        let predictor = predictor(25.0);
        let p = predictor
            .predict(&Observation::new(1900.0, 50_000.0, 50_000.0, "excellent"))
            .unwrap();
        assert_eq!(p.value, 50.0);
        assert_eq!(p.category, RiskCategory::Maximum);
        assert_eq!(
            p.basis,
            PredictionBasis::Ceiling {
                trigger: CeilingTrigger::HeatHours
            }
        );
    }

    #[test]
    fn test_display_and_json() {
        let predictor = predictor(25.0);
        let p = predictor
            .predict(&Observation::new(600.0, 1.0, 1.0, "poor"))
            .unwrap();
        assert_eq!(p.to_string(), "25.0% (high)");

        let json = serde_json::to_value(p).unwrap();
        assert_eq!(json["category"], "high");
        assert_eq!(json["color"], "#FFD93D");
        assert_eq!(json["basis"]["kind"], "model");
    }

    #[test]
    fn test_invalid_settings_refuse_startup() {
        let mut settings = PredictorSettings::new(ThresholdTable::TableA);
        settings.overrides.spore_ceiling = Some(f64::INFINITY);
        assert!(matches!(
            RiskPredictor::new(bias_only(1.0), &settings),
            Err(StartupError::Config(ConfigError::InvalidCeiling { .. }))
        ));

        let mut artifact = (*bias_only(1.0)).clone();
        artifact.linear = Some(LinearCoefficients { coef: vec![1.0] });
        assert!(matches!(
            RiskPredictor::new(Arc::new(artifact), &PredictorSettings::new(ThresholdTable::TableA)),
            Err(StartupError::Model(ModelError::CoefficientCountMismatch { .. }))
        ));
    }
}
