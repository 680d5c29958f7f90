use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{is_valid_weight, CalibrationSettings, MatcherConfig, QualitySettings};
use crate::core::suggestion::{CandidateSuggestion, WeightedSuggestion};

/// Calibration snapshot version for compatibility checking
pub const CALIBRATION_VERSION: &str = "1.0.0";

/// Consensus holds when the standard deviation is at most this share of the mean
pub const CONSENSUS_RATIO: f64 = 0.15;

/// Minimum and maximum final confidence
pub const MIN_CONFIDENCE: f64 = 1.0;
pub const MAX_CONFIDENCE: f64 = 99.0;

/// Half-width of the "stable" band when comparing confidence averages
const TREND_BAND: f64 = 2.0;
const TREND_WINDOW: usize = 10;

#[derive(Error, Debug)]
pub enum CalibrationError {
    #[error("Invalid weight {weight} for engine '{engine}': must be in (0, 1]")]
    InvalidWeight { engine: String, weight: f64 },

    #[error("Invalid predicted confidence {value} for engine '{engine}'")]
    InvalidConfidence { engine: String, value: u8 },

    #[error("Failed to parse calibration snapshot: {0}")]
    ParseError(#[from] serde_json::Error),
}

/// Safely convert usize to f64 for averages
#[inline]
fn count_to_f64(count: usize) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    {
        count as f64
    }
}

/// Round and clamp a score into the final [1, 99] range
#[inline]
fn to_final_confidence(score: f64) -> u8 {
    let clamped = if score.is_nan() {
        MIN_CONFIDENCE
    } else {
        score.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
    };
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    {
        clamped.round() as u8
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / count_to_f64(values.len())
}

/// Sample standard deviation; zero for fewer than two values
fn sample_stdev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>()
        / count_to_f64(values.len() - 1);
    variance.sqrt()
}

/// One piece of user feedback on a presented suggestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub method: String,
    pub predicted_confidence: u8,
    pub actual_outcome: bool,
    pub timestamp: DateTime<Utc>,
}

/// Advisory result of recording feedback
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationResult {
    pub original_confidence: u8,
    /// Confidence points to add, rounded to one decimal; zero until enough
    /// samples exist
    pub adjustment: f64,
    pub calibrated_confidence: u8,
    pub threshold_met: bool,
    pub samples_used: usize,
}

/// Cross-engine statistics for one request
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnsembleResult {
    /// Rounded mean of every weighted confidence, zero when nothing was found
    pub confidence: u8,
    pub max_confidence: u8,
    pub min_confidence: u8,
    pub confidence_std: f64,
    pub consensus: bool,
    /// Engines that produced at least one suggestion, in name order
    pub participating_engines: Vec<String>,
    pub total_suggestions: usize,
    /// Best weighted confidence per engine
    pub engine_contributions: BTreeMap<String, u8>,
    pub best_suggestion: Option<WeightedSuggestion>,
    /// Every weighted suggestion, engines in name order
    pub suggestions: Vec<WeightedSuggestion>,
}

/// Proposed weight change for one engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightProposal {
    pub engine: String,
    pub current_weight: f64,
    pub proposed_weight: f64,
    /// Observed accuracy in [0, 1]
    pub accuracy: f64,
    pub samples: usize,
    pub reason: String,
}

/// Feedback-derived accuracy for one engine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineAccuracy {
    pub engine: String,
    pub total_predictions: usize,
    pub correct_predictions: usize,
    /// Percent, one decimal
    pub accuracy: f64,
    pub average_predicted_confidence: f64,
    pub current_weight: f64,
    pub last_feedback_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Declining,
    Stable,
    InsufficientData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfidenceTrend {
    pub engine: String,
    pub total_calculations: usize,
    pub average_confidence: f64,
    pub trend: TrendDirection,
    pub last_10_average: Option<f64>,
}

/// Versioned export of weights and feedback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSnapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub engine_weights: BTreeMap<String, f64>,
    pub feedback: BTreeMap<String, Vec<FeedbackEntry>>,
    pub total_feedback_entries: usize,
}

impl CalibrationSnapshot {
    pub fn from_json(json: &str) -> Result<Self, CalibrationError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, CalibrationError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Debug, Default)]
struct EngineRecord {
    history: VecDeque<u8>,
    feedback: VecDeque<FeedbackEntry>,
}

/// Reweights candidates, builds ensemble statistics and learns from feedback.
///
/// Weights are read on every request and only change through
/// [`apply_weight_adjustments`](Self::apply_weight_adjustments),
/// [`set_weight`](Self::set_weight) or an imported snapshot.
#[derive(Debug)]
pub struct ConfidenceCalculator {
    weights: RwLock<BTreeMap<String, f64>>,
    default_weight: f64,
    method_bonuses: BTreeMap<String, f64>,
    quality: QualitySettings,
    calibration: CalibrationSettings,
    records: Mutex<BTreeMap<String, EngineRecord>>,
}

impl ConfidenceCalculator {
    #[must_use]
    pub fn new(config: &MatcherConfig) -> Self {
        Self {
            weights: RwLock::new(config.engine_weights.clone()),
            default_weight: crate::config::DEFAULT_ENGINE_WEIGHT,
            method_bonuses: config.method_bonuses.clone(),
            quality: config.quality.clone(),
            calibration: config.calibration.clone(),
            records: Mutex::new(BTreeMap::new()),
        }
    }

    #[must_use]
    pub fn engine_weight(&self, engine: &str) -> f64 {
        self.weights
            .read()
            .get(engine)
            .copied()
            .unwrap_or(self.default_weight)
    }

    #[must_use]
    pub fn engine_weights(&self) -> BTreeMap<String, f64> {
        self.weights.read().clone()
    }

    /// Set one engine weight directly
    pub fn set_weight(&self, engine: &str, weight: f64) -> Result<(), CalibrationError> {
        if !is_valid_weight(weight) {
            return Err(CalibrationError::InvalidWeight {
                engine: engine.to_string(),
                weight,
            });
        }
        self.weights.write().insert(engine.to_string(), weight);
        Ok(())
    }

    #[must_use]
    pub fn method_bonus(&self, method_tag: &str) -> f64 {
        self.method_bonuses.get(method_tag).copied().unwrap_or(0.0)
    }

    /// Multiplier in `[min_factor, max_factor]` reflecting how complete the
    /// candidate's data is
    #[must_use]
    pub fn quality_factor(&self, candidate: &CandidateSuggestion) -> f64 {
        let q = &self.quality;
        let mut factor = 1.0;

        if is_blank(candidate.customer_name.as_deref()) {
            factor -= q.missing_field_penalty;
        }
        if is_blank(candidate.matched_data.as_deref()) {
            factor -= q.missing_field_penalty;
        }

        if candidate.loan_amount.is_some_and(|a| a > Decimal::ZERO) {
            factor += q.present_field_bonus;
        }
        if !is_blank(candidate.loan_number.as_deref()) {
            factor += q.present_field_bonus;
        }
        if candidate.customer_id.is_some() {
            factor += q.present_field_bonus;
        }

        let tag = candidate.method.as_str();
        if tag.contains("exact") {
            factor += q.exact_method_bonus;
        } else if tag.contains("partial") {
            factor += q.partial_method_bonus;
        }

        factor.clamp(q.min_factor, q.max_factor)
    }

    /// Weight one candidate without recording history
    #[must_use]
    pub fn weigh(&self, candidate: &CandidateSuggestion) -> WeightedSuggestion {
        let engine_weight = self.engine_weight(&candidate.engine);
        let method_bonus = self.method_bonus(candidate.method.as_str());
        let quality_factor = self.quality_factor(candidate);
        let score = (f64::from(candidate.confidence) * engine_weight + method_bonus) * quality_factor;

        WeightedSuggestion {
            candidate: candidate.clone(),
            engine_weight,
            method_bonus,
            quality_factor,
            final_confidence: to_final_confidence(score),
        }
    }

    /// Weight every candidate and record each final confidence in its
    /// engine's history
    pub fn calculate_weighted(&self, candidates: &[CandidateSuggestion]) -> Vec<WeightedSuggestion> {
        let weighted: Vec<WeightedSuggestion> = candidates.iter().map(|c| self.weigh(c)).collect();

        let cap = self.calibration.history_cap;
        let mut records = self.records.lock();
        for w in &weighted {
            let record = records.entry(w.engine().to_string()).or_default();
            record.history.push_back(w.final_confidence);
            while record.history.len() > cap {
                record.history.pop_front();
            }
        }

        weighted
    }

    /// Weight every engine's candidates and summarise them
    pub fn calculate_ensemble(
        &self,
        by_engine: &BTreeMap<String, Vec<CandidateSuggestion>>,
    ) -> EnsembleResult {
        let mut result = EnsembleResult::default();

        for (engine, candidates) in by_engine {
            let weighted = self.calculate_weighted(candidates);
            if let Some(best) = weighted.iter().map(|w| w.final_confidence).max() {
                result.engine_contributions.insert(engine.clone(), best);
                result.participating_engines.push(engine.clone());
            }
            result.suggestions.extend(weighted);
        }

        if result.suggestions.is_empty() {
            return result;
        }

        let confidences: Vec<f64> = result
            .suggestions
            .iter()
            .map(|s| f64::from(s.final_confidence))
            .collect();
        let avg = mean(&confidences);
        let std = sample_stdev(&confidences);

        result.confidence = to_final_confidence(avg);
        result.max_confidence = result
            .suggestions
            .iter()
            .map(|s| s.final_confidence)
            .max()
            .unwrap_or_default();
        result.min_confidence = result
            .suggestions
            .iter()
            .map(|s| s.final_confidence)
            .min()
            .unwrap_or_default();
        result.confidence_std = round_to(std, 1);
        result.consensus = confidences.len() < 2 || std <= avg * CONSENSUS_RATIO;
        result.total_suggestions = result.suggestions.len();

        // First of equal maxima wins
        let mut best: Option<&WeightedSuggestion> = None;
        for s in &result.suggestions {
            if best.map_or(true, |b| s.final_confidence > b.final_confidence) {
                best = Some(s);
            }
        }
        result.best_suggestion = best.cloned();

        result
    }

    /// Record feedback for a presented suggestion and return the advisory
    /// adjustment for its engine and method
    pub fn calibrate(
        &self,
        engine: &str,
        method: &str,
        predicted_confidence: u8,
        actual_outcome: bool,
    ) -> CalibrationResult {
        let cap = self.calibration.history_cap;
        let mut records = self.records.lock();
        let record = records.entry(engine.to_string()).or_default();
        record.feedback.push_back(FeedbackEntry {
            method: method.to_string(),
            predicted_confidence,
            actual_outcome,
            timestamp: Utc::now(),
        });
        while record.feedback.len() > cap {
            record.feedback.pop_front();
        }

        let for_method: Vec<&FeedbackEntry> =
            record.feedback.iter().filter(|f| f.method == method).collect();
        let samples: Vec<&FeedbackEntry> =
            if for_method.len() >= self.calibration.min_method_samples {
                for_method
            } else if record.feedback.len() >= self.calibration.min_engine_samples {
                record.feedback.iter().collect()
            } else {
                Vec::new()
            };

        if samples.is_empty() {
            return CalibrationResult {
                original_confidence: predicted_confidence,
                adjustment: 0.0,
                calibrated_confidence: to_final_confidence(f64::from(predicted_confidence)),
                threshold_met: false,
                samples_used: 0,
            };
        }

        let total = count_to_f64(samples.len());
        let correct = count_to_f64(samples.iter().filter(|f| f.actual_outcome).count());
        let avg_predicted =
            samples.iter().map(|f| f64::from(f.predicted_confidence)).sum::<f64>() / total;
        let accuracy = correct / total;
        let adjustment = round_to(
            (accuracy - avg_predicted / 100.0) * self.calibration.adjustment_scale,
            1,
        );

        tracing::debug!(engine, method, adjustment, samples = samples.len(), "Calibrated");

        CalibrationResult {
            original_confidence: predicted_confidence,
            adjustment,
            calibrated_confidence: to_final_confidence(f64::from(predicted_confidence) + adjustment),
            threshold_met: true,
            samples_used: samples.len(),
        }
    }

    /// Accuracy statistics for every engine that has feedback
    #[must_use]
    pub fn engine_accuracy(&self) -> Vec<EngineAccuracy> {
        let records = self.records.lock();
        records
            .iter()
            .filter(|(_, r)| !r.feedback.is_empty())
            .map(|(engine, r)| {
                let total = r.feedback.len();
                let correct = r.feedback.iter().filter(|f| f.actual_outcome).count();
                let predicted: Vec<f64> = r
                    .feedback
                    .iter()
                    .map(|f| f64::from(f.predicted_confidence))
                    .collect();
                EngineAccuracy {
                    engine: engine.clone(),
                    total_predictions: total,
                    correct_predictions: correct,
                    accuracy: round_to(count_to_f64(correct) / count_to_f64(total) * 100.0, 1),
                    average_predicted_confidence: round_to(mean(&predicted), 1),
                    current_weight: self.engine_weight(engine),
                    last_feedback_at: r.feedback.iter().map(|f| f.timestamp).max(),
                }
            })
            .collect()
    }

    /// Weight changes suggested by observed accuracy. Nothing is applied.
    #[must_use]
    pub fn suggest_weight_adjustments(&self) -> Vec<WeightProposal> {
        self.engine_accuracy()
            .into_iter()
            .filter(|stats| stats.total_predictions >= self.calibration.min_weight_samples)
            .filter_map(|stats| {
                let current = stats.current_weight;
                let accuracy = count_to_f64(stats.correct_predictions)
                    / count_to_f64(stats.total_predictions);

                let proposed = if accuracy >= 0.9 {
                    (current + 0.05).min(0.95).max(current)
                } else if accuracy >= 0.8 {
                    current
                } else if accuracy >= 0.7 {
                    (current - 0.05).max(0.3).min(current)
                } else {
                    (current - 0.1).max(0.2).min(current)
                };
                let proposed = round_to(proposed, 2);

                ((proposed - current).abs() > 0.01).then(|| WeightProposal {
                    reason: format!(
                        "Based on {:.1}% accuracy over {} predictions",
                        accuracy * 100.0,
                        stats.total_predictions
                    ),
                    engine: stats.engine,
                    current_weight: current,
                    proposed_weight: proposed,
                    accuracy,
                    samples: stats.total_predictions,
                })
            })
            .collect()
    }

    /// Apply proposals; returns how many weights changed
    pub fn apply_weight_adjustments(&self, proposals: &[WeightProposal]) -> usize {
        let mut weights = self.weights.write();
        let mut applied = 0;
        for proposal in proposals {
            if !is_valid_weight(proposal.proposed_weight) {
                tracing::warn!(
                    engine = %proposal.engine,
                    weight = proposal.proposed_weight,
                    "Skipping invalid weight"
                );
                continue;
            }
            let old = weights.insert(proposal.engine.clone(), proposal.proposed_weight);
            tracing::info!(
                engine = %proposal.engine,
                old = old.unwrap_or(self.default_weight),
                new = proposal.proposed_weight,
                "Updated engine weight"
            );
            applied += 1;
        }
        applied
    }

    /// Trend of recent weighted confidences for one engine
    #[must_use]
    pub fn confidence_trend(&self, engine: &str) -> Option<ConfidenceTrend> {
        let records = self.records.lock();
        let record = records.get(engine)?;
        if record.history.is_empty() {
            return None;
        }
        let values: Vec<f64> = record.history.iter().map(|&c| f64::from(c)).collect();
        Some(ConfidenceTrend {
            engine: engine.to_string(),
            total_calculations: values.len(),
            average_confidence: round_to(mean(&values), 1),
            trend: trend_of(&values),
            last_10_average: (values.len() >= TREND_WINDOW)
                .then(|| round_to(mean(&values[values.len() - TREND_WINDOW..]), 1)),
        })
    }

    /// Trends for every engine with history, in name order
    #[must_use]
    pub fn confidence_trends(&self) -> Vec<ConfidenceTrend> {
        let engines: Vec<String> = self.records.lock().keys().cloned().collect();
        engines
            .iter()
            .filter_map(|engine| self.confidence_trend(engine))
            .collect()
    }

    #[must_use]
    pub fn export_snapshot(&self) -> CalibrationSnapshot {
        let records = self.records.lock();
        let feedback: BTreeMap<String, Vec<FeedbackEntry>> = records
            .iter()
            .filter(|(_, r)| !r.feedback.is_empty())
            .map(|(engine, r)| (engine.clone(), r.feedback.iter().cloned().collect()))
            .collect();
        let total_feedback_entries = feedback.values().map(Vec::len).sum();
        CalibrationSnapshot {
            version: CALIBRATION_VERSION.to_string(),
            exported_at: Utc::now(),
            engine_weights: self.engine_weights(),
            feedback,
            total_feedback_entries,
        }
    }

    /// Merge a snapshot: weights are overwritten, feedback is appended.
    /// Nothing changes when any value is invalid.
    pub fn import_snapshot(&self, snapshot: CalibrationSnapshot) -> Result<usize, CalibrationError> {
        if snapshot.version != CALIBRATION_VERSION {
            tracing::warn!(
                expected = CALIBRATION_VERSION,
                found = %snapshot.version,
                "Calibration snapshot version mismatch"
            );
        }

        for (engine, weight) in &snapshot.engine_weights {
            if !is_valid_weight(*weight) {
                return Err(CalibrationError::InvalidWeight {
                    engine: engine.clone(),
                    weight: *weight,
                });
            }
        }
        for (engine, entries) in &snapshot.feedback {
            if let Some(bad) = entries.iter().find(|f| f.predicted_confidence > 100) {
                return Err(CalibrationError::InvalidConfidence {
                    engine: engine.clone(),
                    value: bad.predicted_confidence,
                });
            }
        }

        self.weights.write().extend(snapshot.engine_weights);

        let cap = self.calibration.history_cap;
        let mut records = self.records.lock();
        let mut imported = 0;
        for (engine, entries) in snapshot.feedback {
            let record = records.entry(engine).or_default();
            imported += entries.len();
            record.feedback.extend(entries);
            while record.feedback.len() > cap {
                record.feedback.pop_front();
            }
        }

        tracing::info!(entries = imported, "Imported calibration feedback");
        Ok(imported)
    }

    /// Total feedback entries recorded
    #[must_use]
    pub fn feedback_count(&self) -> usize {
        self.records.lock().values().map(|r| r.feedback.len()).sum()
    }
}

fn trend_of(values: &[f64]) -> TrendDirection {
    if values.len() <= TREND_WINDOW {
        return TrendDirection::InsufficientData;
    }
    let split = values.len() - TREND_WINDOW;
    let recent = &values[split..];
    let older = &values[split.saturating_sub(TREND_WINDOW)..split];
    let diff = mean(recent) - mean(older);
    if diff > TREND_BAND {
        TrendDirection::Improving
    } else if diff < -TREND_BAND {
        TrendDirection::Declining
    } else {
        TrendDirection::Stable
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |s| s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{CustomerId, LoanId, MatchMethod};
    use rust_decimal_macros::dec;

    fn calculator() -> ConfidenceCalculator {
        ConfidenceCalculator::new(&MatcherConfig::default())
    }

    fn phone_candidate(confidence: u8) -> CandidateSuggestion {
        CandidateSuggestion::new("phone_priority", MatchMethod::ExactPhoneMatch, confidence)
            .with_loan(LoanId(1), "LN-000001")
            .with_customer(Some(CustomerId(1)), "Bat Dorj")
            .with_matched_data("88980800")
            .with_amount(dec!(1000))
    }

    fn bare_candidate(engine: &str, confidence: u8) -> CandidateSuggestion {
        CandidateSuggestion::new(engine, MatchMethod::LicensePlateNormalized, confidence)
    }

    #[test]
    fn test_quality_factor_terms() {
        let calc = calculator();
        // name, data, amount, number, id, exact
        assert!((calc.quality_factor(&phone_candidate(95)) - 1.25).abs() < 1e-9);
        // two missing fields, no bonuses
        assert!((calc.quality_factor(&bare_candidate("x", 50)) - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_weighting_formula() {
        let calc = calculator();
        let disbursement = CandidateSuggestion::new(
            "loan_disbursement",
            MatchMethod::LoanDisbursementPattern,
            95,
        )
        .with_account("120101", "Disbursements")
        .with_customer(None, "Б.Ням-Очир")
        .with_matched_data("EB-Б.Ням-Очир-д зээл олгов")
        .with_amount(dec!(2000000));
        // (95 * 0.88 + 7) * 1.05 = 95.13
        assert_eq!(calc.weigh(&disbursement).final_confidence, 95);

        // unknown engine weighs 0.5, unknown method earns nothing
        let w = calc.weigh(&bare_candidate("mystery", 60));
        assert!((w.engine_weight - 0.5).abs() < f64::EPSILON);
        assert!(w.method_bonus.abs() < f64::EPSILON);
        assert_eq!(w.final_confidence, 24);
    }

    #[test]
    fn test_final_confidence_always_in_range() {
        let calc = calculator();
        for confidence in [0u8, 1, 50, 99, 100] {
            for candidate in [phone_candidate(confidence), bare_candidate("x", confidence)] {
                let w = calc.weigh(&candidate);
                assert!((1..=99).contains(&w.final_confidence), "{w:?}");
            }
        }
    }

    #[test]
    fn test_weighting_does_not_mutate_candidates() {
        let calc = calculator();
        let candidates = vec![phone_candidate(95)];
        let weighted = calc.calculate_weighted(&candidates);
        assert_eq!(weighted[0].candidate, candidates[0]);
        assert_eq!(candidates[0].confidence, 95);
    }

    #[test]
    fn test_ensemble_statistics() {
        let calc = calculator();
        let mut by_engine = BTreeMap::new();
        by_engine.insert("phone_priority".to_string(), vec![phone_candidate(95)]);
        by_engine.insert("license_plate".to_string(), vec![bare_candidate("license_plate", 80)]);
        by_engine.insert("recurring_pattern".to_string(), Vec::new());

        let ensemble = calc.calculate_ensemble(&by_engine);
        assert_eq!(ensemble.total_suggestions, 2);
        assert_eq!(
            ensemble.participating_engines,
            vec!["license_plate".to_string(), "phone_priority".to_string()]
        );
        assert_eq!(ensemble.max_confidence, 99);
        // 80 * 0.8 * 0.8 = 51.2
        assert_eq!(ensemble.min_confidence, 51);
        assert_eq!(ensemble.confidence, 75);
        assert!(!ensemble.consensus);
        assert_eq!(
            ensemble.best_suggestion.unwrap().candidate.engine,
            "phone_priority"
        );
        assert_eq!(ensemble.engine_contributions["license_plate"], 51);
    }

    #[test]
    fn test_empty_ensemble() {
        let calc = calculator();
        let ensemble = calc.calculate_ensemble(&BTreeMap::new());
        assert_eq!(ensemble.confidence, 0);
        assert!(!ensemble.consensus);
        assert!(ensemble.best_suggestion.is_none());
    }

    #[test]
    fn test_single_suggestion_is_consensus() {
        let calc = calculator();
        let mut by_engine = BTreeMap::new();
        by_engine.insert("phone_priority".to_string(), vec![phone_candidate(95)]);
        assert!(calc.calculate_ensemble(&by_engine).consensus);
    }

    #[test]
    fn test_calibration_thresholds() {
        let calc = calculator();
        let first = calc.calibrate("phone_priority", "exact_phone_match", 90, true);
        assert!(!first.threshold_met);
        assert!(first.adjustment.abs() < f64::EPSILON);
        calc.calibrate("phone_priority", "exact_phone_match", 90, true);

        // Third engine-wide sample meets the fallback threshold
        let third = calc.calibrate("phone_priority", "license_plate_exact", 90, false);
        assert!(third.threshold_met);
        assert_eq!(third.samples_used, 3);
        // accuracy 2/3, predicted 0.9: (0.6667 - 0.9) * 20 = -4.7
        assert!((third.adjustment + 4.7).abs() < 1e-9);
        assert_eq!(third.calibrated_confidence, 85);
    }

    #[test]
    fn test_calibration_monotonic_in_outcome() {
        let good = calculator();
        let bad = calculator();
        let mut good_result = None;
        let mut bad_result = None;
        for _ in 0..6 {
            good_result = Some(good.calibrate("license_plate", "license_plate_exact", 80, true));
            bad_result = Some(bad.calibrate("license_plate", "license_plate_exact", 80, false));
        }
        let good_result = good_result.unwrap();
        let bad_result = bad_result.unwrap();
        assert!(good_result.adjustment >= bad_result.adjustment);
        assert!((good_result.adjustment - 4.0).abs() < 1e-9);
        assert!((bad_result.adjustment + 16.0).abs() < 1e-9);
    }

    #[test]
    fn test_weight_proposal_after_poor_accuracy() {
        let calc = calculator();
        for i in 0..10 {
            calc.calibrate("phone_priority", "exact_phone_match", 95, i < 4);
        }
        let proposals = calc.suggest_weight_adjustments();
        assert_eq!(proposals.len(), 1);
        let proposal = &proposals[0];
        assert_eq!(proposal.engine, "phone_priority");
        assert!(proposal.proposed_weight <= 0.75 + 1e-9);
        assert_eq!(proposal.samples, 10);

        // Proposals are advisory until applied
        assert!((calc.engine_weight("phone_priority") - 0.85).abs() < f64::EPSILON);
        assert_eq!(calc.apply_weight_adjustments(&proposals), 1);
        assert!((calc.engine_weight("phone_priority") - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_no_proposal_below_sample_threshold_or_in_keep_band() {
        let calc = calculator();
        for _ in 0..9 {
            calc.calibrate("license_plate", "license_plate_exact", 80, false);
        }
        assert!(calc.suggest_weight_adjustments().is_empty());

        let steady = calculator();
        for i in 0..10 {
            steady.calibrate("license_plate", "license_plate_exact", 80, i < 8);
        }
        assert!(steady.suggest_weight_adjustments().is_empty());
    }

    #[test]
    fn test_high_accuracy_raises_weight_with_cap() {
        let calc = calculator();
        calc.set_weight("loan_disbursement", 0.93).unwrap();
        for _ in 0..10 {
            calc.calibrate("loan_disbursement", "loan_disbursement_pattern", 95, true);
        }
        let proposals = calc.suggest_weight_adjustments();
        assert_eq!(proposals.len(), 1);
        assert!((proposals[0].proposed_weight - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_trend() {
        let calc = calculator();
        let low: Vec<CandidateSuggestion> = (0..10).map(|_| bare_candidate("x", 60)).collect();
        calc.calculate_weighted(&low);
        assert_eq!(
            calc.confidence_trend("x").unwrap().trend,
            TrendDirection::InsufficientData
        );

        let high: Vec<CandidateSuggestion> = (0..10).map(|_| bare_candidate("x", 99)).collect();
        calc.calculate_weighted(&high);
        let trend = calc.confidence_trend("x").unwrap();
        assert_eq!(trend.trend, TrendDirection::Improving);
        assert_eq!(trend.total_calculations, 20);
        assert!(calc.confidence_trend("never").is_none());
    }

    #[test]
    fn test_snapshot_round_trip_and_validation() {
        let calc = calculator();
        calc.calibrate("phone_priority", "exact_phone_match", 90, true);
        calc.set_weight("phone_priority", 0.7).unwrap();
        let json = calc.export_snapshot().to_json().unwrap();

        let restored = calculator();
        let imported = restored
            .import_snapshot(CalibrationSnapshot::from_json(&json).unwrap())
            .unwrap();
        assert_eq!(imported, 1);
        assert_eq!(restored.feedback_count(), 1);
        assert!((restored.engine_weight("phone_priority") - 0.7).abs() < f64::EPSILON);

        let mut bad = restored.export_snapshot();
        bad.engine_weights.insert("license_plate".to_string(), 1.5);
        assert!(matches!(
            restored.import_snapshot(bad),
            Err(CalibrationError::InvalidWeight { .. })
        ));
        assert!((restored.engine_weight("license_plate") - 0.80).abs() < f64::EPSILON);
        assert!(restored.set_weight("license_plate", 0.0).is_err());
    }
}
