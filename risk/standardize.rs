use crate::model::StandardizerStats;
use ndarray::{Array1, ArrayView1};

/// Applies the fitted z-score transform `(x - mean) / scale`.
///
/// The statistics come from the artifact and are never re-estimated. A zero scale
/// (a constant feature in the training data) is replaced by 1 so the feature is
/// only centered.
#[derive(Debug, Clone)]
pub struct Standardizer {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl Standardizer {
    pub fn new(stats: &StandardizerStats, feature_names: &[String]) -> Self {
        let scale = stats
            .scale
            .iter()
            .zip(feature_names)
            .map(|(&s, name)| {
                if s == 0.0 {
                    log::warn!(
                        "Feature '{name}' has zero scale in the fitted standardizer; treating scale as 1."
                    );
                    1.0
                } else {
                    s
                }
            })
            .collect();

        Self {
            mean: Array1::from(stats.mean.clone()),
            scale,
        }
    }

    pub fn transform(&self, x: ArrayView1<f64>) -> Array1<f64> {
        debug_assert_eq!(x.len(), self.mean.len());
        (&x - &self.mean) / &self.scale
    }
}
