//! Polynomial basis expansion of standardized features.
//!
//! The term ordering mirrors scikit-learn's `PolynomialFeatures`: terms are grouped
//! by total degree (bias first when present), and within a degree the input indices
//! run through their combinations (with replacement unless `interaction_only`) in
//! lexicographic order. For two inputs at degree two this gives
//! `[1, x0, x1, x0^2, x0 x1, x1^2]`. Fitted ridge coefficients are only meaningful
//! against this exact order.

use crate::model::{ModelError, PolyConfig};
use itertools::Itertools;
use ndarray::{Array1, ArrayView1};

#[derive(Debug, Clone)]
pub struct PolynomialExpander {
    n_inputs: usize,
    /// One entry per output column: the input indices whose product forms the term.
    /// The bias term is the empty product.
    terms: Vec<Vec<usize>>,
}

impl PolynomialExpander {
    pub fn new(config: &PolyConfig, n_inputs: usize) -> Result<Self, ModelError> {
        if config.degree == 0 {
            return Err(ModelError::InvalidPolynomialDegree(config.degree));
        }

        let mut terms = Vec::new();
        if config.include_bias {
            terms.push(Vec::new());
        }
        for degree in 1..=config.degree {
            if config.interaction_only {
                terms.extend((0..n_inputs).combinations(degree));
            } else {
                terms.extend((0..n_inputs).combinations_with_replacement(degree));
            }
        }

        Ok(Self { n_inputs, terms })
    }

    pub fn input_dim(&self) -> usize {
        self.n_inputs
    }

    pub fn output_dim(&self) -> usize {
        self.terms.len()
    }

    /// Lifts one standardized feature vector into the polynomial basis.
    pub fn transform(&self, x: ArrayView1<f64>) -> Array1<f64> {
        debug_assert_eq!(x.len(), self.n_inputs);
        self.terms
            .iter()
            .map(|term| term.iter().map(|&i| x[i]).product::<f64>())
            .collect()
    }

    /// Human-readable term names in output order, e.g. `heat_hours may_peak_spores`
    /// or `heat_hours^2`.
    pub fn term_names(&self, inputs: &[String]) -> Vec<String> {
        self.terms
            .iter()
            .map(|term| {
                if term.is_empty() {
                    return "1".to_string();
                }
                let powers = term.iter().chunk_by(|&&i| i);
                let name = powers
                    .into_iter()
                    .map(|(i, group)| match group.count() {
                        1 => inputs[i].clone(),
                        power => format!("{}^{power}", inputs[i]),
                    })
                    .join(" ");
                name
            })
            .collect()
    }
}
