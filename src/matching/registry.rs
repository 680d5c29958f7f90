use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use thiserror::Error;
use tokio::time::Instant;

use crate::core::suggestion::CandidateSuggestion;
use crate::core::types::TargetId;
use crate::engines::{
    DetectionEngine, EngineError, EngineHandle, EnginePerformance, EngineRun, SelfTestReport,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Unknown engine: {0}")]
    UnknownEngine(String),
}

/// Outcome of running every enabled engine under a deadline
#[derive(Debug, Clone, Default)]
pub struct RegistryRun {
    /// Completed (or failed) runs keyed by engine name
    pub runs: BTreeMap<String, EngineRun>,
    /// Engines abandoned at the deadline, in name order
    pub timed_out: Vec<String>,
}

impl RegistryRun {
    /// Successful suggestions grouped by engine, empty groups omitted
    #[must_use]
    pub fn suggestions_by_engine(&self) -> BTreeMap<String, Vec<CandidateSuggestion>> {
        self.runs
            .iter()
            .filter(|(_, run)| run.success && !run.suggestions.is_empty())
            .map(|(name, run)| (name.clone(), run.suggestions.clone()))
            .collect()
    }
}

/// Name → engine map.
///
/// Iteration is alphabetical by engine name, which fixes the tie-break order
/// for everything downstream. Each registry is an independent instance; the
/// service receives one by construction.
#[derive(Debug, Default)]
pub struct EngineRegistry {
    engines: BTreeMap<String, Arc<EngineHandle>>,
}

impl EngineRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an engine, replacing any engine with the same name
    pub fn register(&mut self, engine: Arc<dyn DetectionEngine>) -> Arc<EngineHandle> {
        let handle = Arc::new(EngineHandle::new(engine));
        let name = handle.name().to_string();
        if self.engines.insert(name.clone(), handle.clone()).is_some() {
            tracing::warn!(engine = %name, "Replaced registered engine");
        } else {
            tracing::info!(engine = %name, "Registered engine");
        }
        handle
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<EngineHandle>> {
        self.engines.get(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.engines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    fn handle(&self, name: &str) -> Result<&Arc<EngineHandle>, RegistryError> {
        self.engines
            .get(name)
            .ok_or_else(|| RegistryError::UnknownEngine(name.to_string()))
    }

    /// Performance history is kept across enable/disable
    pub fn enable(&self, name: &str) -> Result<(), RegistryError> {
        self.handle(name)?.set_enabled(true);
        tracing::info!(engine = name, "Enabled engine");
        Ok(())
    }

    pub fn disable(&self, name: &str) -> Result<(), RegistryError> {
        self.handle(name)?.set_enabled(false);
        tracing::info!(engine = name, "Disabled engine");
        Ok(())
    }

    pub fn is_enabled(&self, name: &str) -> Result<bool, RegistryError> {
        Ok(self.handle(name)?.is_enabled())
    }

    /// Names of enabled engines, in name order
    #[must_use]
    pub fn enabled_engines(&self) -> Vec<String> {
        self.engines
            .iter()
            .filter(|(_, h)| h.is_enabled())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Run every enabled engine on the calling thread
    #[must_use]
    pub fn run_all(&self, description: &str, amount: Decimal) -> BTreeMap<String, EngineRun> {
        self.engines
            .iter()
            .filter(|(_, h)| h.is_enabled())
            .map(|(name, h)| (name.clone(), h.safe_execute(description, amount)))
            .collect()
    }

    /// Run every enabled engine in parallel on the blocking pool.
    ///
    /// Each engine gets `engine_timeout`, and no engine outlives `deadline`
    /// measured from the call. Engines still running at their limit are
    /// abandoned and reported in [`RegistryRun::timed_out`]; whatever
    /// completed is returned. An abandoned engine is counted once, as a
    /// timeout, even if it finishes later.
    pub async fn run_all_within(
        &self,
        description: &str,
        amount: Decimal,
        engine_timeout: Duration,
        deadline: Duration,
    ) -> RegistryRun {
        let start = Instant::now();
        let limit = engine_timeout.min(deadline);

        let tasks: Vec<_> = self
            .engines
            .iter()
            .filter(|(_, h)| h.is_enabled())
            .map(|(name, handle)| {
                let handle = handle.clone();
                let description = description.to_string();
                let settled = Arc::new(AtomicBool::new(false));
                let flag = settled.clone();
                let task = tokio::task::spawn_blocking(move || {
                    handle.safe_execute_settling(&description, amount, &flag)
                });
                (name.clone(), settled, task)
            })
            .collect();

        let mut result = RegistryRun::default();
        for (name, settled, task) in tasks {
            match tokio::time::timeout_at(start + limit, task).await {
                Ok(Ok(run)) => {
                    result.runs.insert(name, run);
                }
                Ok(Err(join_error)) => {
                    tracing::warn!(engine = %name, error = %join_error, "Engine task failed");
                    result.runs.insert(
                        name.clone(),
                        EngineRun {
                            engine: name,
                            success: false,
                            suggestions: Vec::new(),
                            processing_time: start.elapsed(),
                            error: Some(EngineError::Execution(join_error.to_string())),
                        },
                    );
                }
                Err(_) => {
                    tracing::warn!(engine = %name, limit_ms = limit.as_millis(), "Engine timed out");
                    if let Some(handle) = self.engines.get(&name) {
                        handle.record_timeout_once(limit, &settled);
                    }
                    result.runs.insert(name.clone(), EngineRun::timed_out(&name, limit));
                    result.timed_out.push(name);
                }
            }
        }
        result
    }

    /// Flatten successful suggestions, keep the most confident per target,
    /// sort by confidence descending and truncate.
    ///
    /// Candidates without a target are never merged. Ties keep engine name
    /// order.
    #[must_use]
    pub fn get_best_suggestions(
        &self,
        description: &str,
        amount: Decimal,
        max: usize,
    ) -> Vec<CandidateSuggestion> {
        let runs = self.run_all(description, amount);
        let flattened = runs
            .into_values()
            .filter(|run| run.success)
            .flat_map(|run| run.suggestions);
        best_per_target(flattened, max, |s| s.target.clone(), |s| s.confidence)
    }

    #[must_use]
    pub fn performance_report(&self) -> Vec<EnginePerformance> {
        self.engines.values().map(|h| h.performance()).collect()
    }

    #[must_use]
    pub fn self_test_all(&self) -> Vec<SelfTestReport> {
        self.engines.values().map(|h| h.self_test()).collect()
    }
}

/// Deduplicate by target keeping the highest confidence (first on ties),
/// then stable-sort descending and truncate to `max`.
///
/// Items without a target are always kept. Shared by the registry's raw
/// candidates and the service's weighted ranking.
pub(crate) fn best_per_target<T, C: Ord>(
    items: impl IntoIterator<Item = T>,
    max: usize,
    target: impl Fn(&T) -> Option<TargetId>,
    confidence: impl Fn(&T) -> C,
) -> Vec<T> {
    let mut kept: Vec<T> = Vec::new();
    let mut index: HashMap<TargetId, usize> = HashMap::new();

    for item in items {
        let Some(key) = target(&item) else {
            kept.push(item);
            continue;
        };
        match index.get(&key) {
            Some(&i) if confidence(&kept[i]) >= confidence(&item) => {}
            Some(&i) => kept[i] = item,
            None => {
                index.insert(key, kept.len());
                kept.push(item);
            }
        }
    }

    kept.sort_by(|a, b| confidence(b).cmp(&confidence(a)));
    kept.truncate(max);
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{LoanId, MatchMethod};
    use crate::engines::SelfTestCase;
    use rust_decimal_macros::dec;
    use std::collections::HashSet;

    struct StaticEngine {
        name: &'static str,
        suggestions: Vec<CandidateSuggestion>,
    }

    impl DetectionEngine for StaticEngine {
        fn name(&self) -> &'static str {
            self.name
        }

        fn display_name(&self) -> &'static str {
            "Static"
        }

        fn detect(
            &self,
            _description: &str,
            _amount: Decimal,
        ) -> Result<Vec<CandidateSuggestion>, EngineError> {
            Ok(self.suggestions.clone())
        }

        fn self_test(&self) -> SelfTestReport {
            SelfTestReport::from_cases(
                self.name,
                vec![SelfTestCase {
                    input: "x".to_string(),
                    detected: true,
                    detail: String::new(),
                }],
                50.0,
            )
        }
    }

    struct FailingEngine;

    impl DetectionEngine for FailingEngine {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn display_name(&self) -> &'static str {
            "Failing"
        }

        fn detect(
            &self,
            _description: &str,
            _amount: Decimal,
        ) -> Result<Vec<CandidateSuggestion>, EngineError> {
            Err(EngineError::Execution("boom".to_string()))
        }

        fn self_test(&self) -> SelfTestReport {
            SelfTestReport::from_cases("failing", Vec::new(), 50.0)
        }
    }

    struct SlowEngine;

    impl DetectionEngine for SlowEngine {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn display_name(&self) -> &'static str {
            "Slow"
        }

        fn detect(
            &self,
            _description: &str,
            _amount: Decimal,
        ) -> Result<Vec<CandidateSuggestion>, EngineError> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(vec![loan("slow", 1, 99)])
        }

        fn self_test(&self) -> SelfTestReport {
            SelfTestReport::from_cases("slow", Vec::new(), 50.0)
        }
    }

    fn loan(engine: &str, id: u64, confidence: u8) -> CandidateSuggestion {
        CandidateSuggestion::new(engine, MatchMethod::ExactPhoneMatch, confidence)
            .with_loan(LoanId(id), format!("LN-{id}"))
    }

    fn registry() -> EngineRegistry {
        let mut registry = EngineRegistry::new();
        registry.register(Arc::new(StaticEngine {
            name: "alpha",
            suggestions: vec![loan("alpha", 1, 80), loan("alpha", 2, 70)],
        }));
        registry.register(Arc::new(StaticEngine {
            name: "beta",
            suggestions: vec![loan("beta", 1, 90), loan("beta", 3, 70)],
        }));
        registry.register(Arc::new(FailingEngine));
        registry
    }

    #[test]
    fn test_best_suggestions_dedup_and_order() {
        let best = registry().get_best_suggestions("anything", dec!(1), 10);
        assert_eq!(best.len(), 3);

        let targets: HashSet<_> = best.iter().filter_map(|s| s.target.clone()).collect();
        assert_eq!(targets.len(), best.len());

        assert_eq!(best[0].engine, "beta");
        assert_eq!(best[0].confidence, 90);
        // Equal confidence keeps engine name order
        assert_eq!(best[1].engine, "alpha");
        assert_eq!(best[1].loan_id, Some(LoanId(2)));
        assert_eq!(best[2].engine, "beta");
    }

    #[test]
    fn test_best_suggestions_truncate() {
        assert_eq!(registry().get_best_suggestions("x", dec!(1), 1).len(), 1);
    }

    #[test]
    fn test_failing_engine_is_isolated() {
        let registry = registry();
        let runs = registry.run_all("x", dec!(1));
        assert_eq!(runs.len(), 3);
        assert!(!runs["failing"].success);
        assert!(runs["alpha"].success);
        assert_eq!(registry.get("failing").unwrap().performance().total_runs, 1);
    }

    #[test]
    fn test_disable_keeps_history() {
        let registry = registry();
        let _ = registry.run_all("x", dec!(1));
        registry.disable("alpha").unwrap();
        assert!(!registry.is_enabled("alpha").unwrap());
        assert!(!registry.run_all("x", dec!(1)).contains_key("alpha"));
        assert_eq!(registry.get("alpha").unwrap().performance().total_runs, 1);

        registry.enable("alpha").unwrap();
        assert!(registry.run_all("x", dec!(1)).contains_key("alpha"));
        assert_eq!(
            registry.disable("missing"),
            Err(RegistryError::UnknownEngine("missing".to_string()))
        );
    }

    #[test]
    fn test_reports_cover_every_engine() {
        let registry = registry();
        let names: Vec<String> = registry
            .performance_report()
            .into_iter()
            .map(|p| p.engine)
            .collect();
        assert_eq!(names, vec!["alpha", "beta", "failing"]);
        assert_eq!(registry.self_test_all().len(), 3);
    }

    #[tokio::test]
    async fn test_run_within_deadline_returns_partial_results() {
        let mut registry = registry();
        registry.register(Arc::new(SlowEngine));

        let run = registry
            .run_all_within("x", dec!(1), Duration::from_millis(50), Duration::from_millis(100))
            .await;

        assert_eq!(run.timed_out, vec!["slow".to_string()]);
        assert!(run.runs["slow"].is_timeout());
        let by_engine = run.suggestions_by_engine();
        assert_eq!(
            by_engine.keys().cloned().collect::<Vec<_>>(),
            vec!["alpha".to_string(), "beta".to_string()]
        );
        assert_eq!(registry.get("slow").unwrap().performance().successful_runs, 0);
    }

    #[tokio::test]
    async fn test_abandoned_engine_counted_once() {
        let mut registry = EngineRegistry::new();
        registry.register(Arc::new(SlowEngine));

        let run = registry
            .run_all_within("x", dec!(1), Duration::from_millis(50), Duration::from_millis(100))
            .await;
        assert_eq!(run.timed_out, vec!["slow".to_string()]);

        // Let the abandoned blocking task finish
        tokio::time::sleep(Duration::from_millis(500)).await;

        let perf = registry.get("slow").unwrap().performance();
        assert_eq!(perf.total_runs, 1);
        assert_eq!(perf.successful_runs, 0);
        assert!(perf.success_rate.abs() < f64::EPSILON);
    }

    #[test]
    fn test_untargeted_items_are_never_merged() {
        let untargeted =
            || CandidateSuggestion::new("gamma", MatchMethod::RecurringPatternPartial, 60);
        let best = best_per_target(
            vec![untargeted(), loan("alpha", 1, 50), untargeted(), loan("beta", 1, 75)],
            10,
            |s| s.target.clone(),
            |s| s.confidence,
        );
        assert_eq!(best.len(), 3);
        assert_eq!(best[0].engine, "beta");
        assert!(best[1..].iter().all(|s| s.target.is_none()));
    }
}
