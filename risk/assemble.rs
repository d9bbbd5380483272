//! # Feature Assembly
//!
//! Turns one field observation into the raw feature vector the fitted model
//! expects. The artifact's `feature_order` is the only source of truth for column
//! order; a name it lists that the observation cannot supply is a configuration
//! error, never a silent zero.

use crate::model::{
    HEAT_HOURS, JULY_PEAK_SPORES, MANAGEMENT_LEVEL, MAY_PEAK_SPORES, ModelArtifact,
};
use ndarray::Array1;
use std::collections::BTreeMap;
use thiserror::Error;

/// One set of field measurements for a single stand and season.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// Hours above the heat-stress threshold between mid-May and mid-August.
    pub heat_hours: f64,
    /// Peak weekly spore counts keyed by feature name, in raw counts.
    pub spores: BTreeMap<String, f64>,
    /// Management level label as shown to the grower.
    pub management: String,
}

impl Observation {
    pub fn new(
        heat_hours: f64,
        may_peak_spores: f64,
        july_peak_spores: f64,
        management: impl Into<String>,
    ) -> Self {
        let spores = BTreeMap::from([
            (MAY_PEAK_SPORES.to_string(), may_peak_spores),
            (JULY_PEAK_SPORES.to_string(), july_peak_spores),
        ]);
        Self {
            heat_hours,
            spores,
            management: management.into(),
        }
    }

    /// Adds (or replaces) a named spore count, e.g. for models with additional
    /// months or species.
    pub fn with_spores(mut self, name: impl Into<String>, count: f64) -> Self {
        self.spores.insert(name.into(), count);
        self
    }

    pub fn spore_total(&self) -> f64 {
        self.spores.values().sum()
    }

    /// True when every numeric measurement is exactly zero. The management level is
    /// categorical and does not take part.
    pub fn is_all_zero(&self) -> bool {
        self.heat_hours == 0.0 && self.spores.values().all(|&c| c == 0.0)
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum AssemblyError {
    #[error(
        "The model requires feature '{0}', but the observation does not provide it. The model and the input form are out of sync."
    )]
    MissingFeature(String),
    #[error("Unknown management level '{label}'. Expected one of: {}", .known.join(", "))]
    UnknownManagementLevel { label: String, known: Vec<String> },
}

#[derive(Debug, Clone)]
enum FeatureSlot {
    HeatHours,
    Management,
    Spore(String),
}

#[derive(Debug, Clone)]
pub struct FeatureAssembler {
    slots: Vec<FeatureSlot>,
    /// Keys are normalized labels.
    levels: BTreeMap<String, f64>,
    spore_multiplier: f64,
}

/// Management labels compare case-insensitively and ignore surrounding whitespace.
pub fn normalize_label(label: &str) -> String {
    label.trim().to_lowercase()
}

impl FeatureAssembler {
    pub fn new(artifact: &ModelArtifact) -> Self {
        let slots = artifact
            .feature_order
            .iter()
            .map(|name| match name.as_str() {
                HEAT_HOURS => FeatureSlot::HeatHours,
                MANAGEMENT_LEVEL => FeatureSlot::Management,
                other => FeatureSlot::Spore(other.to_string()),
            })
            .collect();

        let levels = artifact
            .management_levels
            .iter()
            .map(|(label, &code)| (normalize_label(label), code))
            .collect();

        let spore_multiplier = if artifact.apply_spore_factor {
            artifact.spore_factor
        } else {
            1.0
        };

        Self {
            slots,
            levels,
            spore_multiplier,
        }
    }

    /// Looks up the numeric code for a management label.
    pub fn management_code(&self, label: &str) -> Result<f64, AssemblyError> {
        self.levels
            .get(&normalize_label(label))
            .copied()
            .ok_or_else(|| AssemblyError::UnknownManagementLevel {
                label: label.to_string(),
                known: self.levels.keys().cloned().collect(),
            })
    }

    /// False for models fitted without a management encoding. Any label is then
    /// accepted and only drives the post-model adjustment.
    pub fn has_management_levels(&self) -> bool {
        !self.levels.is_empty()
    }

    pub fn management_labels(&self) -> impl Iterator<Item = &str> {
        self.levels.keys().map(String::as_str)
    }

    /// Spore feature names the model reads, in feature order.
    pub fn spore_features(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().filter_map(|slot| match slot {
            FeatureSlot::Spore(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Packs an observation into the model's raw feature order.
    pub fn assemble(&self, observation: &Observation) -> Result<Array1<f64>, AssemblyError> {
        self.slots
            .iter()
            .map(|slot| match slot {
                FeatureSlot::HeatHours => Ok(observation.heat_hours),
                FeatureSlot::Management => self.management_code(&observation.management),
                FeatureSlot::Spore(name) => observation
                    .spores
                    .get(name)
                    .map(|&count| count * self.spore_multiplier)
                    .ok_or_else(|| AssemblyError::MissingFeature(name.clone())),
            })
            .collect::<Result<Vec<f64>, _>>()
            .map(Array1::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LinearCoefficients, LinkFunction, StandardizerStats};

    fn artifact(order: &[&str], apply_spore_factor: bool) -> ModelArtifact {
        let k = order.len();
        ModelArtifact {
            link_function: LinkFunction::Identity,
            output_scale: 50.0,
            spore_factor: 1e-3,
            apply_spore_factor,
            feature_order: order.iter().map(|s| s.to_string()).collect(),
            standardizer: StandardizerStats {
                mean: vec![0.0; k],
                scale: vec![1.0; k],
            },
            management_levels: BTreeMap::from([
                ("Excellent".to_string(), 0.0),
                ("Average".to_string(), 1.0),
                ("Poor".to_string(), 2.0),
            ]),
            linear: Some(LinearCoefficients {
                coef: vec![0.0; k + 1],
            }),
            poly: None,
            ridge: None,
        }
    }

    #[test]
    fn test_follows_feature_order_not_input_order() {
        let model = artifact(
            &[MANAGEMENT_LEVEL, JULY_PEAK_SPORES, HEAT_HOURS, MAY_PEAK_SPORES],
            false,
        );
        let assembler = FeatureAssembler::new(&model);
        let x = assembler
            .assemble(&Observation::new(200.0, 1000.0, 3000.0, "poor"))
            .unwrap();
        assert_eq!(x.to_vec(), vec![2.0, 3000.0, 200.0, 1000.0]);
    }

    #[test]
    fn test_spore_factor_applied_only_when_requested() {
        let order = [HEAT_HOURS, MAY_PEAK_SPORES, JULY_PEAK_SPORES, MANAGEMENT_LEVEL];
        let obs = Observation::new(100.0, 20_000.0, 4_000.0, "average");

        let scaled = FeatureAssembler::new(&artifact(&order, true))
            .assemble(&obs)
            .unwrap();
        assert_eq!(scaled.to_vec(), vec![100.0, 20.0, 4.0, 1.0]);

        let raw = FeatureAssembler::new(&artifact(&order, false))
            .assemble(&obs)
            .unwrap();
        assert_eq!(raw.to_vec(), vec![100.0, 20_000.0, 4_000.0, 1.0]);
    }

    #[test]
    fn test_missing_feature_is_a_hard_error() {
        let model = artifact(&[HEAT_HOURS, "june_peak_spores"], false);
        let err = FeatureAssembler::new(&model)
            .assemble(&Observation::new(1.0, 2.0, 3.0, "average"))
            .unwrap_err();
        assert_eq!(err, AssemblyError::MissingFeature("june_peak_spores".to_string()));
    }

    #[test]
    fn test_additional_spore_series() {
        let model = artifact(&[HEAT_HOURS, MAY_PEAK_SPORES, "june_peak_spores"], false);
        let obs = Observation::new(1.0, 2.0, 3.0, "average").with_spores("june_peak_spores", 9.0);
        let assembler = FeatureAssembler::new(&model);
        assert_eq!(assembler.assemble(&obs).unwrap().to_vec(), vec![1.0, 2.0, 9.0]);
        assert_eq!(
            assembler.spore_features().collect::<Vec<_>>(),
            vec![MAY_PEAK_SPORES, "june_peak_spores"]
        );
        assert_eq!(obs.spore_total(), 14.0);
    }

    #[test]
    fn test_management_labels_are_normalized() {
        let assembler = FeatureAssembler::new(&artifact(&[MANAGEMENT_LEVEL], false));
        assert_eq!(assembler.management_code("  EXCELLENT ").unwrap(), 0.0);
        assert_eq!(
            assembler.management_labels().collect::<Vec<_>>(),
            vec!["average", "excellent", "poor"]
        );
        match assembler.management_code("superb") {
            Err(AssemblyError::UnknownManagementLevel { label, known }) => {
                assert_eq!(label, "superb");
                assert_eq!(known.len(), 3);
            }
            other => panic!("Expected UnknownManagementLevel, got {other:?}"),
        }
    }

    #[test]
    fn test_all_zero_ignores_management() {
        assert!(Observation::new(0.0, 0.0, 0.0, "poor").is_all_zero());
        assert!(!Observation::new(0.0, 0.0, 1.0, "poor").is_all_zero());
        assert!(
            !Observation::new(0.0, 0.0, 0.0, "poor")
                .with_spores("june_peak_spores", 5.0)
                .is_all_zero()
        );
    }
}
