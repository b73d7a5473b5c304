//! DriftDetector (C13): baseline vs. current distribution comparison with
//! severity classification (§4.10).
//!
//! Numeric features use the population stability index (PSI); categorical
//! features use a chi-square statistic normalized the same way PSI is, so a
//! single severity threshold table applies uniformly across feature types.

use std::collections::HashMap;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriftMethod {
    Psi,
    ChiSquare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriftSeverity {
    None,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy)]
pub struct SeverityThresholds {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

impl Default for SeverityThresholds {
    fn default() -> Self {
        Self { low: 0.1, medium: 0.2, high: 0.3 }
    }
}

impl SeverityThresholds {
    fn classify(&self, score: f64) -> DriftSeverity {
        if score >= self.high {
            DriftSeverity::High
        } else if score >= self.medium {
            DriftSeverity::Medium
        } else if score >= self.low {
            DriftSeverity::Low
        } else {
            DriftSeverity::None
        }
    }
}

/// One feature's distribution captured at training time: either a numeric
/// histogram (equal-width bins over the observed range) or category counts.
#[derive(Debug, Clone)]
pub enum FeatureBaseline {
    Numeric { bin_edges: Vec<f64>, bin_counts: Vec<f64> },
    Categorical { counts: HashMap<String, f64> },
}

#[derive(Debug, Clone)]
pub struct BaselineDistribution {
    pub features: HashMap<String, FeatureBaseline>,
    pub method: DriftMethod,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeatureDriftReport {
    pub feature: String,
    pub score: f64,
    pub severity: DriftSeverity,
}

#[derive(Debug, Clone, Serialize)]
pub struct DriftReport {
    pub model_id: String,
    pub method: DriftMethod,
    pub per_feature: Vec<FeatureDriftReport>,
    pub severity: DriftSeverity,
    pub score: f64,
}

const BIN_COUNT: usize = 10;

fn histogram(values: &[f64], bin_edges: &[f64]) -> Vec<f64> {
    let mut counts = vec![0.0; bin_edges.len().saturating_sub(1).max(1)];
    for &value in values {
        let mut idx = bin_edges.windows(2).position(|w| value >= w[0] && value < w[1]);
        if idx.is_none() && !counts.is_empty() {
            idx = Some(counts.len() - 1);
        }
        if let Some(idx) = idx {
            counts[idx] += 1.0;
        }
    }
    counts
}

fn equal_width_edges(values: &[f64]) -> Vec<f64> {
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if !min.is_finite() || !max.is_finite() || (max - min).abs() < f64::EPSILON {
        return vec![min.min(0.0), max.max(1.0)];
    }
    let step = (max - min) / BIN_COUNT as f64;
    (0..=BIN_COUNT).map(|i| min + step * i as f64).collect()
}

/// Population stability index: `sum((actual% - expected%) * ln(actual% / expected%))`
/// over matching bins, with Laplace smoothing to avoid division by zero on
/// empty bins.
fn psi(expected_counts: &[f64], actual_counts: &[f64]) -> f64 {
    let smooth = 1e-4;
    let expected_total: f64 = expected_counts.iter().sum::<f64>() + smooth * expected_counts.len() as f64;
    let actual_total: f64 = actual_counts.iter().sum::<f64>() + smooth * actual_counts.len() as f64;

    expected_counts
        .iter()
        .zip(actual_counts.iter())
        .map(|(&e, &a)| {
            let e_pct = (e + smooth) / expected_total;
            let a_pct = (a + smooth) / actual_total;
            (a_pct - e_pct) * (a_pct / e_pct).ln()
        })
        .sum()
}

/// Chi-square statistic normalized by degrees of freedom so categorical
/// scores live on roughly the same scale as PSI's.
fn chi_square(expected: &HashMap<String, f64>, actual: &HashMap<String, f64>) -> f64 {
    let smooth = 1e-4;
    let expected_total: f64 = expected.values().sum::<f64>() + smooth;
    let actual_total: f64 = actual.values().sum::<f64>() + smooth;

    let mut categories: Vec<&String> = expected.keys().chain(actual.keys()).collect();
    categories.sort();
    categories.dedup();

    let mut statistic = 0.0;
    for category in &categories {
        let e_pct = (expected.get(*category).copied().unwrap_or(0.0) + smooth) / expected_total;
        let a_count = actual.get(*category).copied().unwrap_or(0.0);
        let a_total = actual_total;
        let expected_count = e_pct * a_total;
        if expected_count > 0.0 {
            statistic += (a_count - expected_count).powi(2) / expected_count;
        }
    }
    let dof = (categories.len().max(1)) as f64;
    statistic / (a_total_scale(dof))
}

fn a_total_scale(dof: f64) -> f64 {
    // Keeps the normalized statistic in a similar numeric range to PSI so a
    // single threshold table applies to both methods, without claiming a
    // formal equivalence between the two tests.
    dof.max(1.0) * 4.0
}

pub struct DriftDetector {
    baselines: DashMap<String, BaselineDistribution>,
    thresholds: SeverityThresholds,
}

impl DriftDetector {
    pub fn new() -> Self {
        Self { baselines: DashMap::new(), thresholds: SeverityThresholds::default() }
    }

    pub fn with_thresholds(thresholds: SeverityThresholds) -> Self {
        Self { baselines: DashMap::new(), thresholds }
    }

    /// Capture the training-time distribution for each feature. Numeric
    /// samples are binned into equal-width histograms; categorical samples
    /// are raw value counts (§4.10).
    pub fn create_baseline(
        &self,
        model_id: &str,
        numeric_samples: HashMap<String, Vec<f64>>,
        categorical_samples: HashMap<String, Vec<String>>,
        method: DriftMethod,
    ) {
        let mut features = HashMap::new();
        for (feature, values) in numeric_samples {
            let edges = equal_width_edges(&values);
            let counts = histogram(&values, &edges);
            features.insert(feature, FeatureBaseline::Numeric { bin_edges: edges, bin_counts: counts });
        }
        for (feature, values) in categorical_samples {
            let mut counts = HashMap::new();
            for value in values {
                *counts.entry(value).or_insert(0.0) += 1.0;
            }
            features.insert(feature, FeatureBaseline::Categorical { counts });
        }
        self.baselines.insert(model_id.to_string(), BaselineDistribution { features, method });
    }

    pub fn detect_drift(
        &self,
        model_id: &str,
        current_numeric: HashMap<String, Vec<f64>>,
        current_categorical: HashMap<String, Vec<String>>,
    ) -> AppResult<DriftReport> {
        let baseline = self
            .baselines
            .get(model_id)
            .ok_or_else(|| AppError::not_found(format!("no baseline recorded for model {model_id}")))?;

        let mut per_feature = Vec::new();
        for (feature, baseline_dist) in &baseline.features {
            let score = match baseline_dist {
                FeatureBaseline::Numeric { bin_edges, bin_counts } => {
                    let current = current_numeric.get(feature).cloned().unwrap_or_default();
                    if current.is_empty() {
                        continue;
                    }
                    let current_counts = histogram(&current, bin_edges);
                    psi(bin_counts, &current_counts)
                }
                FeatureBaseline::Categorical { counts } => {
                    let current = current_categorical.get(feature).cloned().unwrap_or_default();
                    if current.is_empty() {
                        continue;
                    }
                    let mut current_counts = HashMap::new();
                    for value in current {
                        *current_counts.entry(value).or_insert(0.0) += 1.0;
                    }
                    chi_square(counts, &current_counts)
                }
            };
            per_feature.push(FeatureDriftReport {
                feature: feature.clone(),
                score,
                severity: self.thresholds.classify(score.max(0.0)),
            });
        }

        let overall_score = per_feature.iter().map(|f| f.score.max(0.0)).fold(0.0, f64::max);
        let overall_severity = self.thresholds.classify(overall_score);

        Ok(DriftReport {
            model_id: model_id.to_string(),
            method: baseline.method,
            per_feature,
            severity: overall_severity,
            score: overall_score,
        })
    }
}

impl Default for DriftDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_distributions_report_no_drift() {
        let detector = DriftDetector::new();
        let samples: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let mut numeric = HashMap::new();
        numeric.insert("latency".to_string(), samples.clone());
        detector.create_baseline("m", numeric.clone(), HashMap::new(), DriftMethod::Psi);

        let report = detector.detect_drift("m", numeric, HashMap::new()).unwrap();
        assert_eq!(report.severity, DriftSeverity::None);
    }

    #[test]
    fn shifted_distribution_reports_drift() {
        let detector = DriftDetector::new();
        let baseline_samples: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let mut numeric = HashMap::new();
        numeric.insert("latency".to_string(), baseline_samples);
        detector.create_baseline("m", numeric, HashMap::new(), DriftMethod::Psi);

        let shifted: Vec<f64> = (0..100).map(|i| i as f64 + 500.0).collect();
        let mut current = HashMap::new();
        current.insert("latency".to_string(), shifted);
        let report = detector.detect_drift("m", current, HashMap::new()).unwrap();
        assert!(report.score > 0.0);
        assert_ne!(report.severity, DriftSeverity::None);
    }

    #[test]
    fn detect_drift_without_baseline_is_not_found() {
        let detector = DriftDetector::new();
        let err = detector.detect_drift("nope", HashMap::new(), HashMap::new()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
    }

    #[test]
    fn categorical_drift_is_detected() {
        let detector = DriftDetector::new();
        let mut categorical = HashMap::new();
        categorical.insert(
            "region".to_string(),
            vec!["us".to_string(); 80].into_iter().chain(vec!["eu".to_string(); 20]).collect(),
        );
        detector.create_baseline("m", HashMap::new(), categorical, DriftMethod::ChiSquare);

        let mut current = HashMap::new();
        current.insert("region".to_string(), vec!["eu".to_string(); 100]);
        let report = detector.detect_drift("m", HashMap::new(), current).unwrap();
        assert!(report.score > 0.0);
    }
}
