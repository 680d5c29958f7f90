use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::config::{ExecutionSettings, MatcherConfig, MAX_RESULTS_LIMIT};
use crate::core::suggestion::{AccountHint, CandidateSuggestion, WeightedSuggestion};
use crate::core::types::{ConfidenceTier, CustomerId, MatchMethod, MatchMode, TargetId, TenantId};
use crate::directory::Collaborators;
use crate::engines::recurring::{
    InMemoryPatternStore, LearnedPattern, PatternError, PatternSnapshot, PatternStatistics,
    ENGINE_NAME as RECURRING_ENGINE,
};
use crate::engines::{
    EngineError, EnginePerformance, IdPriorityEngine, LicensePlateEngine, LoanDisbursementEngine,
    MongolianNameEngine, PhonePriorityEngine, RecurringPatternEngine, SelfTestReport,
};
use crate::matching::cache::{CacheKey, SuggestionCache};
use crate::matching::confidence::{
    CalibrationError, CalibrationResult, CalibrationSnapshot, ConfidenceCalculator,
    ConfidenceTrend, EngineAccuracy, EnsembleResult, WeightProposal,
};
use crate::matching::registry::{best_per_target, EngineRegistry, RegistryError};
use crate::utils::validation::{
    compute_suggestion_id, last_chars, validate_request, ValidationError, MAX_PARTIAL_QUERY_CHARS,
    MIN_DESCRIPTION_CHARS,
};

/// Digits of a loan number shown in multi-loan labels
const LOAN_LABEL_DIGITS: usize = 6;

#[derive(Error, Debug)]
pub enum SuggestionError {
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] ValidationError),

    #[error("Suggestion not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error("No recurring pattern engine is configured")]
    PatternsUnavailable,

    #[error("Failed to refresh patterns: {0}")]
    PatternRefresh(#[from] EngineError),
}

/// Ensemble summary attached to the top suggestion
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnsembleInfo {
    pub consensus: bool,
    pub participating_engines: Vec<String>,
    pub total_suggestions: usize,
}

/// How the final percentage was produced
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConfidenceBreakdown {
    pub base_confidence: u8,
    pub engine_weight: f64,
    pub method_bonus: f64,
    pub quality_factor: f64,
    pub final_confidence: u8,
}

impl From<&WeightedSuggestion> for ConfidenceBreakdown {
    fn from(w: &WeightedSuggestion) -> Self {
        Self {
            base_confidence: w.candidate.confidence,
            engine_weight: w.engine_weight,
            method_bonus: w.method_bonus,
            quality_factor: w.quality_factor,
            final_confidence: w.final_confidence,
        }
    }
}

/// One ranked, presentation-ready suggestion
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedSuggestion {
    pub suggestion_id: String,
    pub rank: usize,
    pub target_id: Option<TargetId>,
    pub target_label: String,
    pub customer_id: Option<CustomerId>,
    pub customer_name: Option<String>,
    pub loan_number: Option<String>,
    pub loan_amount: Option<Decimal>,
    pub match_percentage: u8,
    pub percentage_display: String,
    pub matching_method: MatchMethod,
    pub matched_data: Option<String>,
    pub engine_name: String,
    pub engine_display_name: String,
    pub reason_text: String,
    pub is_top_suggestion: bool,
    pub confidence_tier: ConfidenceTier,
    pub confidence_color: String,
    pub confidence_icon: String,
    pub related_account_hint: Option<AccountHint>,
    pub vehicle_info: Option<String>,
    pub is_multi_loan_customer: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ensemble_info: Option<EnsembleInfo>,
    #[serde(skip)]
    pub breakdown: ConfidenceBreakdown,
}

/// Response of one suggestion request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuggestionResponse {
    pub success: bool,
    pub suggestions: Vec<RankedSuggestion>,
    pub from_cache: bool,
    /// Engines abandoned at the deadline; the response is best-effort when
    /// this is non-empty
    pub timed_out_engines: Vec<String>,
    pub processing_time_ms: f64,
    pub generated_at: DateTime<Utc>,
}

/// One autocomplete entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuickSuggestion {
    pub display_text: String,
    pub account: String,
    pub match_percentage: u8,
    pub matched_pattern: String,
    pub suggestion_preview: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackOutcome {
    pub accepted: bool,
    pub suggestion_id: String,
    pub engine: String,
    pub predicted_confidence: u8,
    pub actual_target_id: Option<TargetId>,
    pub calibration_adjustment: f64,
    pub calibration: CalibrationResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuggestionDetails {
    pub suggestion: RankedSuggestion,
    pub confidence_breakdown: ConfidenceBreakdown,
    pub engine: Option<EnginePerformance>,
    pub historical_accuracy: Option<EngineAccuracy>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceStatistics {
    pub engine_count: usize,
    pub enabled_engines: Vec<String>,
    pub cache_size: usize,
    pub feedback_entries: usize,
    pub learned_patterns: Option<usize>,
}

/// Does `mode` admit this candidate?
///
/// Payments never post to the disbursement account; disbursements never
/// settle a specific loan.
fn mode_admits(mode: MatchMode, candidate: &CandidateSuggestion) -> bool {
    match mode {
        MatchMode::Auto => true,
        MatchMode::Payment => candidate.method != MatchMethod::LoanDisbursementPattern,
        MatchMode::Disbursement => !matches!(candidate.target, Some(TargetId::Loan(_))),
    }
}

/// Short loan reference for labels: the last six digits of the longest digit
/// run, or the whole number when it has no digits
#[must_use]
pub fn loan_identifier(loan_number: &str) -> &str {
    let mut longest = "";
    for run in loan_number.split(|c: char| !c.is_ascii_digit()) {
        if run.len() > longest.len() {
            longest = run;
        }
    }
    if longest.is_empty() {
        loan_number
    } else {
        last_chars(longest, LOAN_LABEL_DIGITS)
    }
}

/// Entry point for callers: validation, cache, engines, ensemble, ranking.
///
/// The registry and calculator are injected so several services (one per
/// tenant, say) can coexist without shared globals.
pub struct SmartSuggestionService {
    registry: Arc<EngineRegistry>,
    calculator: Arc<ConfidenceCalculator>,
    recurring: Option<Arc<RecurringPatternEngine>>,
    cache: SuggestionCache<SuggestionResponse>,
    best_effort_ttl: Duration,
    execution: ExecutionSettings,
}

impl SmartSuggestionService {
    pub fn new(
        registry: Arc<EngineRegistry>,
        calculator: Arc<ConfidenceCalculator>,
        recurring: Option<Arc<RecurringPatternEngine>>,
        config: &MatcherConfig,
    ) -> Self {
        Self {
            registry,
            calculator,
            recurring,
            cache: SuggestionCache::from_settings(&config.cache),
            best_effort_ttl: Duration::from_secs(config.cache.best_effort_ttl_secs),
            execution: config.execution.clone(),
        }
    }

    /// Service with the six standard engines over `collaborators`
    #[must_use]
    pub fn build_default(collaborators: &Collaborators, config: &MatcherConfig) -> Self {
        let recurring = Arc::new(RecurringPatternEngine::new(
            Arc::new(InMemoryPatternStore::new()),
            collaborators.history.clone(),
        ));

        let mut registry = EngineRegistry::new();
        registry.register(Arc::new(IdPriorityEngine::new(
            collaborators.customers.clone(),
            collaborators.loans.clone(),
        )));
        registry.register(Arc::new(PhonePriorityEngine::new(
            collaborators.customers.clone(),
            collaborators.loans.clone(),
            collaborators.collateral.clone(),
        )));
        registry.register(Arc::new(LicensePlateEngine::new(
            collaborators.customers.clone(),
            collaborators.loans.clone(),
            collaborators.collateral.clone(),
        )));
        registry.register(Arc::new(LoanDisbursementEngine::new(
            collaborators.gl.clone(),
            TenantId::new(config.tenant.clone()),
        )));
        registry.register(Arc::new(MongolianNameEngine::new(
            collaborators.customers.clone(),
            collaborators.loans.clone(),
        )));
        registry.register(recurring.clone());

        Self::new(
            Arc::new(registry),
            Arc::new(ConfidenceCalculator::new(config)),
            Some(recurring),
            config,
        )
    }

    #[must_use]
    pub fn registry(&self) -> &EngineRegistry {
        &self.registry
    }

    #[must_use]
    pub fn calculator(&self) -> &ConfidenceCalculator {
        &self.calculator
    }

    fn max_results(&self) -> usize {
        self.execution.max_results.clamp(1, MAX_RESULTS_LIMIT)
    }

    /// Ranked suggestions for one bank transaction, under the configured
    /// request deadline.
    ///
    /// Only input validation fails the call. Engines that error or time out
    /// contribute nothing.
    pub async fn get_suggestions(
        &self,
        description: &str,
        amount: Decimal,
        mode: MatchMode,
    ) -> Result<SuggestionResponse, SuggestionError> {
        let deadline = Duration::from_millis(self.execution.request_deadline_ms);
        self.get_suggestions_within(description, amount, mode, deadline)
            .await
    }

    /// [`get_suggestions`](Self::get_suggestions) with a caller-chosen
    /// deadline.
    ///
    /// A response with timed-out engines is best-effort: it is kept for
    /// `best_effort_ttl_secs` so feedback and details can find its
    /// suggestions, but it is never served as a cache hit.
    pub async fn get_suggestions_within(
        &self,
        description: &str,
        amount: Decimal,
        mode: MatchMode,
        deadline: Duration,
    ) -> Result<SuggestionResponse, SuggestionError> {
        let description = validate_request(description, amount)?;
        let key = CacheKey::new(description, amount, mode);

        if let Some(cached) = self.cache.get(&key) {
            if cached.timed_out_engines.is_empty() {
                tracing::debug!("Serving suggestions from cache");
                let mut response = (*cached).clone();
                response.from_cache = true;
                return Ok(response);
            }
        }

        let start = Instant::now();
        let run = self
            .registry
            .run_all_within(
                description,
                amount,
                Duration::from_millis(self.execution.engine_timeout_ms),
                deadline,
            )
            .await;

        let by_engine: BTreeMap<String, Vec<CandidateSuggestion>> = run
            .suggestions_by_engine()
            .into_iter()
            .map(|(engine, candidates)| {
                let admitted: Vec<CandidateSuggestion> =
                    candidates.into_iter().filter(|c| mode_admits(mode, c)).collect();
                (engine, admitted)
            })
            .filter(|(_, candidates)| !candidates.is_empty())
            .collect();

        let ensemble = self.calculator.calculate_ensemble(&by_engine);
        let suggestions = self.rank(description, &ensemble);

        let response = SuggestionResponse {
            success: true,
            suggestions,
            from_cache: false,
            timed_out_engines: run.timed_out.clone(),
            processing_time_ms: start.elapsed().as_secs_f64() * 1000.0,
            generated_at: Utc::now(),
        };

        tracing::debug!(
            count = response.suggestions.len(),
            %mode,
            ms = response.processing_time_ms,
            "Generated suggestions"
        );

        if run.timed_out.is_empty() {
            self.cache.insert(key, response.clone());
        } else {
            self.cache
                .insert_with_ttl(key, response.clone(), self.best_effort_ttl);
        }
        Ok(response)
    }

    fn rank(&self, description: &str, ensemble: &EnsembleResult) -> Vec<RankedSuggestion> {
        let mut kept = best_per_target(
            &ensemble.suggestions,
            usize::MAX,
            |w| w.target().cloned(),
            |w| w.final_confidence,
        );

        let mut loans_per_customer: HashMap<CustomerId, BTreeSet<&TargetId>> = HashMap::new();
        for weighted in &kept {
            if let (Some(customer), Some(target @ TargetId::Loan(_))) =
                (weighted.candidate.customer_id, weighted.target())
            {
                loans_per_customer.entry(customer).or_default().insert(target);
            }
        }

        kept.truncate(self.max_results());

        let mut ranked: Vec<RankedSuggestion> = kept
            .into_iter()
            .enumerate()
            .map(|(i, weighted)| {
                let multi_loan = weighted
                    .candidate
                    .customer_id
                    .and_then(|id| loans_per_customer.get(&id))
                    .is_some_and(|loans| loans.len() > 1);
                self.present(description, weighted, i + 1, multi_loan)
            })
            .collect();

        if let Some(top) = ranked.first_mut() {
            top.ensemble_info = Some(EnsembleInfo {
                consensus: ensemble.consensus,
                participating_engines: ensemble.participating_engines.clone(),
                total_suggestions: ensemble.total_suggestions,
            });
        }
        ranked
    }

    fn present(
        &self,
        description: &str,
        weighted: &WeightedSuggestion,
        rank: usize,
        multi_loan: bool,
    ) -> RankedSuggestion {
        let candidate = &weighted.candidate;
        let percentage = weighted.final_confidence;
        let tier = ConfidenceTier::from_percentage(percentage);
        let target = candidate
            .target
            .as_ref()
            .map_or_else(|| "none".to_string(), ToString::to_string);

        let target_label = match &candidate.target {
            Some(TargetId::Account(code)) => candidate
                .account_hint
                .as_ref()
                .map_or_else(|| code.clone(), |hint| hint.name.clone()),
            _ => {
                let name = candidate
                    .customer_name
                    .clone()
                    .unwrap_or_else(|| "Unknown customer".to_string());
                match (&candidate.loan_number, multi_loan) {
                    (Some(number), true) => format!("{name} - Loan {}", loan_identifier(number)),
                    _ => name,
                }
            }
        };

        RankedSuggestion {
            suggestion_id: compute_suggestion_id(&candidate.engine, &target, description, rank),
            rank,
            target_id: candidate.target.clone(),
            target_label,
            customer_id: candidate.customer_id,
            customer_name: candidate.customer_name.clone(),
            loan_number: candidate.loan_number.clone(),
            loan_amount: candidate.loan_amount,
            match_percentage: percentage,
            percentage_display: format!("{percentage}%"),
            matching_method: candidate.method,
            matched_data: candidate.matched_data.clone(),
            engine_name: candidate.engine.clone(),
            engine_display_name: self
                .registry
                .get(&candidate.engine)
                .map_or_else(|| candidate.engine.clone(), |h| h.display_name().to_string()),
            reason_text: candidate.reason.clone(),
            is_top_suggestion: rank == 1,
            confidence_tier: tier,
            confidence_color: tier.color().to_string(),
            confidence_icon: tier.icon().to_string(),
            related_account_hint: candidate.account_hint.clone(),
            vehicle_info: candidate.vehicle_info.clone(),
            is_multi_loan_customer: multi_loan,
            ensemble_info: None,
            breakdown: ConfidenceBreakdown::from(weighted),
        }
    }

    /// Autocomplete from learned patterns only.
    ///
    /// Returns nothing below three characters, or when the recurring engine
    /// is missing or disabled.
    #[must_use]
    pub fn get_quick_suggestions(&self, partial: &str, limit: usize) -> Vec<QuickSuggestion> {
        let partial = partial.trim();
        if partial.chars().count() < MIN_DESCRIPTION_CHARS
            || partial.chars().count() > MAX_PARTIAL_QUERY_CHARS
        {
            return Vec::new();
        }
        let Some(recurring) = &self.recurring else {
            return Vec::new();
        };
        if !self
            .registry
            .get(RECURRING_ENGINE)
            .is_some_and(|h| h.is_enabled())
        {
            return Vec::new();
        }

        recurring
            .quick_lookup(partial, limit.min(MAX_RESULTS_LIMIT))
            .into_iter()
            .map(|hit| QuickSuggestion {
                suggestion_preview: format!("{} → {} ({}%)", hit.source, hit.account, hit.confidence),
                display_text: hit.source,
                account: hit.account,
                match_percentage: hit.confidence,
                matched_pattern: hit.matched,
            })
            .collect()
    }

    fn find_cached(&self, suggestion_id: &str) -> Option<RankedSuggestion> {
        self.cache.find_map(|response| {
            response
                .suggestions
                .iter()
                .find(|s| s.suggestion_id == suggestion_id)
                .cloned()
        })
    }

    /// Record whether a presented suggestion was right.
    ///
    /// The suggestion must still be cached. The calibration result is
    /// advisory; nothing on the matching path changes.
    pub fn provide_feedback(
        &self,
        suggestion_id: &str,
        was_correct: bool,
        actual_target_id: Option<TargetId>,
    ) -> Result<FeedbackOutcome, SuggestionError> {
        let suggestion = self
            .find_cached(suggestion_id)
            .ok_or_else(|| SuggestionError::NotFound(suggestion_id.to_string()))?;

        let calibration = self.calculator.calibrate(
            &suggestion.engine_name,
            suggestion.matching_method.as_str(),
            suggestion.match_percentage,
            was_correct,
        );
        tracing::info!(
            suggestion_id,
            engine = %suggestion.engine_name,
            was_correct,
            "Recorded feedback"
        );

        Ok(FeedbackOutcome {
            accepted: true,
            suggestion_id: suggestion_id.to_string(),
            engine: suggestion.engine_name,
            predicted_confidence: suggestion.match_percentage,
            actual_target_id,
            calibration_adjustment: calibration.adjustment,
            calibration,
        })
    }

    /// A cached suggestion with its confidence breakdown
    #[must_use]
    pub fn get_suggestion_details(&self, suggestion_id: &str) -> Option<SuggestionDetails> {
        let suggestion = self.find_cached(suggestion_id)?;
        let engine = self
            .registry
            .get(&suggestion.engine_name)
            .map(|h| h.performance());
        let historical_accuracy = self
            .calculator
            .engine_accuracy()
            .into_iter()
            .find(|a| a.engine == suggestion.engine_name);
        Some(SuggestionDetails {
            confidence_breakdown: suggestion.breakdown.clone(),
            suggestion,
            engine,
            historical_accuracy,
        })
    }

    pub fn enable_engine(&self, name: &str) -> Result<(), SuggestionError> {
        self.registry.enable(name)?;
        self.cache.clear();
        Ok(())
    }

    pub fn disable_engine(&self, name: &str) -> Result<(), SuggestionError> {
        self.registry.disable(name)?;
        self.cache.clear();
        Ok(())
    }

    #[must_use]
    pub fn performance_report(&self) -> Vec<EnginePerformance> {
        self.registry.performance_report()
    }

    #[must_use]
    pub fn self_test(&self) -> Vec<SelfTestReport> {
        self.registry.self_test_all()
    }

    pub fn clear_cache(&self) -> usize {
        let removed = self.cache.clear();
        tracing::info!(removed, "Cleared suggestion cache");
        removed
    }

    #[must_use]
    pub fn export_calibration(&self) -> CalibrationSnapshot {
        self.calculator.export_snapshot()
    }

    pub fn import_calibration(&self, snapshot: CalibrationSnapshot) -> Result<usize, SuggestionError> {
        let imported = self.calculator.import_snapshot(snapshot)?;
        self.cache.clear();
        Ok(imported)
    }

    #[must_use]
    pub fn weight_proposals(&self) -> Vec<WeightProposal> {
        self.calculator.suggest_weight_adjustments()
    }

    /// Apply the current proposals; returns what was applied
    pub fn apply_weight_proposals(&self) -> Vec<WeightProposal> {
        let proposals = self.calculator.suggest_weight_adjustments();
        if self.calculator.apply_weight_adjustments(&proposals) > 0 {
            self.cache.clear();
        }
        proposals
    }

    #[must_use]
    pub fn confidence_trends(&self) -> Vec<ConfidenceTrend> {
        self.calculator.confidence_trends()
    }

    #[must_use]
    pub fn engine_accuracy(&self) -> Vec<EngineAccuracy> {
        self.calculator.engine_accuracy()
    }

    fn recurring(&self) -> Result<&RecurringPatternEngine, SuggestionError> {
        self.recurring
            .as_deref()
            .ok_or(SuggestionError::PatternsUnavailable)
    }

    pub fn export_patterns(&self) -> Result<PatternSnapshot, SuggestionError> {
        Ok(self.recurring()?.export())
    }

    pub fn import_patterns(&self, snapshot: PatternSnapshot) -> Result<usize, SuggestionError> {
        let imported = self.recurring()?.import(snapshot)?;
        self.cache.clear();
        Ok(imported)
    }

    pub fn learn_pattern(
        &self,
        description: &str,
        account: &str,
    ) -> Result<LearnedPattern, SuggestionError> {
        let learned = self.recurring()?.learn(description, account)?;
        self.cache.clear();
        Ok(learned)
    }

    /// Rebuild the pattern table from the history feed and drop cached
    /// responses computed against the old one
    pub fn refresh_patterns(&self) -> Result<usize, SuggestionError> {
        let learned = self.recurring()?.refresh()?;
        self.cache.clear();
        Ok(learned)
    }

    pub fn pattern_statistics(&self) -> Result<PatternStatistics, SuggestionError> {
        Ok(self.recurring()?.statistics())
    }

    #[must_use]
    pub fn statistics(&self) -> ServiceStatistics {
        ServiceStatistics {
            engine_count: self.registry.len(),
            enabled_engines: self.registry.enabled_engines(),
            cache_size: self.cache.len(),
            feedback_entries: self.calculator.feedback_count(),
            learned_patterns: self
                .recurring
                .as_ref()
                .map(|r| r.statistics().exact_patterns),
        }
    }
}

impl std::fmt::Debug for SmartSuggestionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmartSuggestionService")
            .field("engines", &self.registry.len())
            .field("cache_size", &self.cache.len())
            .finish_non_exhaustive()
    }
}
