use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered disease-risk categories.
///
/// `Low` through `Critical` come from the threshold table. `Negligible` and
/// `Maximum` are only ever assigned by the input overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskCategory {
    Negligible,
    Low,
    Medium,
    High,
    Critical,
    Maximum,
}

impl RiskCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskCategory::Negligible => "negligible",
            RiskCategory::Low => "low",
            RiskCategory::Medium => "medium",
            RiskCategory::High => "high",
            RiskCategory::Critical => "critical",
            RiskCategory::Maximum => "maximum",
        }
    }

    /// Card background color for the category.
    pub fn color(self) -> &'static str {
        match self {
            RiskCategory::Critical | RiskCategory::Maximum => "#FF4C4C",
            RiskCategory::High => "#FFD93D",
            RiskCategory::Medium => "#4DA6FF",
            RiskCategory::Low | RiskCategory::Negligible => "#4CD964",
        }
    }

    /// Text color that stays readable on `color()`.
    pub fn text_color(self) -> &'static str {
        match self {
            RiskCategory::Critical | RiskCategory::Maximum | RiskCategory::Medium => "white",
            RiskCategory::High | RiskCategory::Low | RiskCategory::Negligible => "black",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            RiskCategory::Negligible => "no measurable disease pressure",
            RiskCategory::Low => "low disease risk",
            RiskCategory::Medium => "moderate disease risk",
            RiskCategory::High => "high disease risk",
            RiskCategory::Critical => "very high disease risk",
            RiskCategory::Maximum => "conditions beyond the fitted range; worst case assumed",
        }
    }
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Breakpoints as fractions of the model's output scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Breakpoints {
    pub critical: f64,
    pub high: f64,
    pub medium: f64,
}

/// Named threshold tables. Which one a deployment uses is a configuration choice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdTable {
    /// critical > 0.60, high > 0.40, medium > 0.20
    TableA,
    /// critical > 0.30, high > 0.20, medium > 0.10
    TableB,
    Custom(Breakpoints),
}

impl ThresholdTable {
    pub fn breakpoints(&self) -> Breakpoints {
        match self {
            ThresholdTable::TableA => Breakpoints {
                critical: 0.60,
                high: 0.40,
                medium: 0.20,
            },
            ThresholdTable::TableB => Breakpoints {
                critical: 0.30,
                high: 0.20,
                medium: 0.10,
            },
            ThresholdTable::Custom(b) => *b,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let b = self.breakpoints();
        let ordered = 0.0 <= b.medium && b.medium < b.high && b.high < b.critical && b.critical <= 1.0;
        if ordered {
            Ok(())
        } else {
            Err(ConfigError::InvalidBreakpoints {
                critical: b.critical,
                high: b.high,
                medium: b.medium,
            })
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ThresholdTable::TableA => "table_a",
            ThresholdTable::TableB => "table_b",
            ThresholdTable::Custom(_) => "custom",
        }
    }
}

/// Buckets a final prediction using absolute cut-offs derived once from the table
/// and the output scale. Every comparison is strictly greater-than, so a value that
/// sits exactly on a breakpoint lands in the lower category.
#[derive(Debug, Clone)]
pub struct RiskClassifier {
    table: ThresholdTable,
    critical: f64,
    high: f64,
    medium: f64,
}

impl RiskClassifier {
    pub fn new(table: ThresholdTable, output_scale: f64) -> Result<Self, ConfigError> {
        table.validate()?;
        let b = table.breakpoints();
        Ok(Self {
            table,
            critical: b.critical * output_scale,
            high: b.high * output_scale,
            medium: b.medium * output_scale,
        })
    }

    pub fn table(&self) -> ThresholdTable {
        self.table
    }

    pub fn classify(&self, prediction: f64) -> RiskCategory {
        if prediction > self.critical {
            RiskCategory::Critical
        } else if prediction > self.high {
            RiskCategory::High
        } else if prediction > self.medium {
            RiskCategory::Medium
        } else {
            RiskCategory::Low
        }
    }
}
