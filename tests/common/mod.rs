use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use blackseed::classify::ThresholdTable;
use blackseed::config::{Deployment, DeploymentConfig, PredictorSettings};
use blackseed::model::{
    HEAT_HOURS, JULY_PEAK_SPORES, LinearCoefficients, LinkFunction, MANAGEMENT_LEVEL,
    MAY_PEAK_SPORES, ModelArtifact, StandardizerStats,
};

pub const MODEL_FILE: &str = "models/disease_model.toml";

/// Four-feature identity-link model on a 0-50 scale whose only non-zero weight is the bias.
pub fn bias_only_artifact(bias: f64) -> ModelArtifact {
    ModelArtifact {
        link_function: LinkFunction::Identity,
        output_scale: 50.0,
        spore_factor: 1e-4,
        apply_spore_factor: true,
        feature_order: [HEAT_HOURS, MAY_PEAK_SPORES, JULY_PEAK_SPORES, MANAGEMENT_LEVEL]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        standardizer: StandardizerStats {
            mean: vec![650.0, 3.0, 4.0, 1.0],
            scale: vec![320.0, 2.5, 3.0, 0.8],
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
    }
}

/// Writes `artifact` and a `blackseed.toml` pointing at it under `root`.
pub fn write_deployment(root: &Path, artifact: &ModelArtifact, settings: PredictorSettings) -> PathBuf {
    let model_path = root.join(MODEL_FILE);
    fs::create_dir_all(model_path.parent().expect("model dir")).expect("create model dir");
    artifact.save(&model_path).expect("save model");
    Deployment::write_config(
        root,
        &DeploymentConfig {
            model_path: PathBuf::from(MODEL_FILE),
            settings,
        },
    )
    .expect("write config")
}

pub fn table_a_with_heat_ceiling() -> PredictorSettings {
    PredictorSettings::new(ThresholdTable::TableA).with_ceilings(Some(1900.0), None)
}
