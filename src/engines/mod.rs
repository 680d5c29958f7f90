//! Detection engines.
//!
//! Every engine implements [`DetectionEngine`]: it reads a transaction
//! description and amount and returns zero or more [`CandidateSuggestion`]s.
//! Engines never see each other; the registry wraps each one in an
//! [`EngineHandle`] whose [`safe_execute`](EngineHandle::safe_execute) catches
//! errors and panics, times the run and keeps the engine's counters.
//!
//! | Engine              | Signal                                   | Target  |
//! |---------------------|------------------------------------------|---------|
//! | `id_priority`       | national register number (`ЧЛ74090619`)  | loan    |
//! | `phone_priority`    | 8-digit phone, then plate-shaped tokens  | loan    |
//! | `license_plate`     | plate formats graded by specificity      | loan    |
//! | `loan_disbursement` | bilingual disbursement phrases           | account |
//! | `mongolian_name`    | `Б.Номин-Эрдэнэ` style name mentions     | loan    |
//! | `recurring_pattern` | learned description → account table      | account |
//!
//! Zero suggestions is a normal outcome, never an error.

pub mod disbursement;
pub mod id_priority;
pub mod name;
pub mod patterns;
pub mod phone;
pub mod plate;
pub mod recurring;

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::core::suggestion::CandidateSuggestion;
use crate::directory::CollaboratorError;

pub use disbursement::LoanDisbursementEngine;
pub use id_priority::IdPriorityEngine;
pub use name::MongolianNameEngine;
pub use phone::PhonePriorityEngine;
pub use plate::LicensePlateEngine;
pub use recurring::RecurringPatternEngine;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Engine execution failed: {0}")]
    Execution(String),

    #[error("Engine '{0}' is disabled")]
    Disabled(String),

    #[error("Collaborator unavailable: {0}")]
    CollaboratorUnavailable(#[from] CollaboratorError),

    #[error("Engine timed out after {0} ms")]
    Timeout(u64),

    #[error("Engine panicked: {0}")]
    Panicked(String),
}

/// Contract implemented by every matcher
pub trait DetectionEngine: Send + Sync {
    /// Stable identifier, used for weights and feedback
    fn name(&self) -> &'static str;

    /// Human-readable name for presentation layers
    fn display_name(&self) -> &'static str;

    /// Propose candidates for one transaction
    fn detect(
        &self,
        description: &str,
        amount: Decimal,
    ) -> Result<Vec<CandidateSuggestion>, EngineError>;

    /// Run a fixed battery of sample inputs without touching the pipeline
    fn self_test(&self) -> SelfTestReport;
}

/// One sample input and whether the engine handled it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelfTestCase {
    pub input: String,
    pub detected: bool,
    pub detail: String,
}

/// Outcome of an engine self-test
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelfTestReport {
    pub engine: String,
    pub cases: Vec<SelfTestCase>,
    /// Success rate in percent
    pub score: f64,
    /// Minimum score needed to pass, in percent
    pub threshold: f64,
    pub passed: bool,
}

impl SelfTestReport {
    /// Build a report whose score is the fraction of detected cases
    #[must_use]
    pub fn from_cases(engine: &str, cases: Vec<SelfTestCase>, threshold: f64) -> Self {
        let detected = cases.iter().filter(|c| c.detected).count();
        let score = percent(detected, cases.len());
        Self::with_score(engine, cases, score, threshold)
    }

    #[must_use]
    pub fn with_score(engine: &str, cases: Vec<SelfTestCase>, score: f64, threshold: f64) -> Self {
        Self {
            engine: engine.to_string(),
            passed: !cases.is_empty() && score >= threshold,
            cases,
            score,
            threshold,
        }
    }
}

/// `part / total` as a percentage, zero for an empty total
#[must_use]
pub fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    count_to_f64(part) / count_to_f64(total) * 100.0
}

/// Safely convert usize to f64 for rate calculations
#[inline]
pub(crate) fn count_to_f64(count: usize) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    {
        count as f64
    }
}

/// Result of one safe-execute call
#[derive(Debug, Clone)]
pub struct EngineRun {
    pub engine: String,
    pub success: bool,
    pub suggestions: Vec<CandidateSuggestion>,
    pub processing_time: Duration,
    pub error: Option<EngineError>,
}

impl EngineRun {
    #[must_use]
    pub fn timed_out(engine: &str, after: Duration) -> Self {
        Self {
            engine: engine.to_string(),
            success: false,
            suggestions: Vec::new(),
            processing_time: after,
            error: Some(EngineError::Timeout(duration_ms(after))),
        }
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self.error, Some(EngineError::Timeout(_)))
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Operational counters for one engine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnginePerformance {
    pub engine: String,
    pub display_name: String,
    pub enabled: bool,
    pub total_runs: u64,
    pub successful_runs: u64,
    /// Successful runs in percent
    pub success_rate: f64,
    pub average_ms: f64,
    pub last_error: Option<String>,
    pub last_run_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct RunStats {
    total_runs: u64,
    successful_runs: u64,
    average_ms: f64,
    last_error: Option<String>,
    last_run_at: Option<DateTime<Utc>>,
}

/// An engine plus its enable flag and performance counters
pub struct EngineHandle {
    engine: Arc<dyn DetectionEngine>,
    enabled: AtomicBool,
    stats: Mutex<RunStats>,
}

impl EngineHandle {
    pub fn new(engine: Arc<dyn DetectionEngine>) -> Self {
        Self {
            engine,
            enabled: AtomicBool::new(true),
            stats: Mutex::new(RunStats::default()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.engine.name()
    }

    #[must_use]
    pub fn display_name(&self) -> &'static str {
        self.engine.display_name()
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Run the engine without ever propagating a failure.
    ///
    /// Disabled engines are not invoked but the call is still counted, as are
    /// errors and panics. The returned run always carries the elapsed time.
    pub fn safe_execute(&self, description: &str, amount: Decimal) -> EngineRun {
        self.safe_execute_settling(description, amount, &AtomicBool::new(false))
    }

    /// [`safe_execute`](Self::safe_execute) for a run the caller may abandon.
    ///
    /// `settled` is shared with [`record_timeout_once`](Self::record_timeout_once):
    /// whichever of the two flips it first counts the run, the other is a no-op.
    pub fn safe_execute_settling(
        &self,
        description: &str,
        amount: Decimal,
        settled: &AtomicBool,
    ) -> EngineRun {
        let start = Instant::now();
        let name = self.name();

        if !self.is_enabled() {
            let error = EngineError::Disabled(name.to_string());
            return self.finish(start, Err(error), settled);
        }

        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
            self.engine.detect(description, amount)
        }));

        let result = match outcome {
            Ok(result) => result,
            Err(payload) => Err(EngineError::Panicked(panic_message(payload.as_ref()))),
        };

        match &result {
            Ok(suggestions) => {
                tracing::debug!(engine = name, count = suggestions.len(), "Engine run");
            }
            Err(EngineError::Disabled(_)) => {}
            Err(e) => tracing::warn!(engine = name, error = %e, "Engine run failed"),
        }

        self.finish(start, result, settled)
    }

    fn finish(
        &self,
        start: Instant,
        result: Result<Vec<CandidateSuggestion>, EngineError>,
        settled: &AtomicBool,
    ) -> EngineRun {
        let processing_time = start.elapsed();
        let success = result.is_ok();
        let error = result.as_ref().err().cloned();
        if settle(settled) {
            self.record(processing_time, error.as_ref());
        } else {
            tracing::debug!(engine = self.name(), "Late engine run not counted");
        }

        EngineRun {
            engine: self.name().to_string(),
            success,
            suggestions: result.unwrap_or_default(),
            processing_time,
            error,
        }
    }

    /// Count a run that was abandoned by the caller's deadline, unless the
    /// run already settled itself. Returns whether the timeout was counted.
    pub fn record_timeout_once(&self, after: Duration, settled: &AtomicBool) -> bool {
        if !settle(settled) {
            return false;
        }
        self.record(after, Some(&EngineError::Timeout(duration_ms(after))));
        true
    }

    fn record(&self, elapsed: Duration, error: Option<&EngineError>) {
        let mut stats = self.stats.lock();
        stats.total_runs += 1;
        if error.is_none() {
            stats.successful_runs += 1;
        } else {
            stats.last_error = error.map(ToString::to_string);
        }
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        #[allow(clippy::cast_precision_loss)]
        let n = stats.total_runs as f64;
        stats.average_ms = (stats.average_ms * (n - 1.0) + elapsed_ms) / n;
        stats.last_run_at = Some(Utc::now());
    }

    /// Snapshot of the counters
    #[must_use]
    pub fn performance(&self) -> EnginePerformance {
        let stats = self.stats.lock();
        #[allow(clippy::cast_precision_loss)]
        let success_rate = if stats.total_runs == 0 {
            0.0
        } else {
            stats.successful_runs as f64 / stats.total_runs as f64 * 100.0
        };
        EnginePerformance {
            engine: self.name().to_string(),
            display_name: self.display_name().to_string(),
            enabled: self.is_enabled(),
            total_runs: stats.total_runs,
            successful_runs: stats.successful_runs,
            success_rate,
            average_ms: stats.average_ms,
            last_error: stats.last_error.clone(),
            last_run_at: stats.last_run_at,
        }
    }

    #[must_use]
    pub fn self_test(&self) -> SelfTestReport {
        self.engine.self_test()
    }
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("engine", &self.name())
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

fn settle(settled: &AtomicBool) -> bool {
    settled
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::MatchMethod;
    use rust_decimal_macros::dec;

    struct FixedEngine;

    impl DetectionEngine for FixedEngine {
        fn name(&self) -> &'static str {
            "fixed"
        }
        fn display_name(&self) -> &'static str {
            "Fixed Engine"
        }
        fn detect(
            &self,
            description: &str,
            _amount: Decimal,
        ) -> Result<Vec<CandidateSuggestion>, EngineError> {
            match description {
                "fail" => Err(EngineError::Execution("boom".to_string())),
                "panic" => panic!("engine exploded"),
                _ => Ok(vec![CandidateSuggestion::new(
                    "fixed",
                    MatchMethod::ExactPhoneMatch,
                    90,
                )]),
            }
        }
        fn self_test(&self) -> SelfTestReport {
            SelfTestReport::from_cases("fixed", Vec::new(), 75.0)
        }
    }

    fn handle() -> EngineHandle {
        EngineHandle::new(Arc::new(FixedEngine))
    }

    #[test]
    fn test_safe_execute_success() {
        let handle = handle();
        let run = handle.safe_execute("ok", dec!(1));
        assert!(run.success);
        assert_eq!(run.suggestions.len(), 1);
        assert!(run.error.is_none());

        let perf = handle.performance();
        assert_eq!(perf.total_runs, 1);
        assert_eq!(perf.successful_runs, 1);
    }

    #[test]
    fn test_safe_execute_isolates_errors_and_panics() {
        let handle = handle();
        let failed = handle.safe_execute("fail", dec!(1));
        assert!(!failed.success);
        assert!(failed.suggestions.is_empty());
        assert_eq!(failed.error, Some(EngineError::Execution("boom".to_string())));

        let panicked = handle.safe_execute("panic", dec!(1));
        assert!(!panicked.success);
        assert_eq!(
            panicked.error,
            Some(EngineError::Panicked("engine exploded".to_string()))
        );

        let perf = handle.performance();
        assert_eq!(perf.total_runs, 2);
        assert_eq!(perf.successful_runs, 0);
        assert!(perf.last_error.unwrap().contains("engine exploded"));
    }

    #[test]
    fn test_disabled_engine_is_counted_not_run() {
        let handle = handle();
        handle.set_enabled(false);
        let run = handle.safe_execute("ok", dec!(1));
        assert!(!run.success);
        assert!(run.suggestions.is_empty());
        assert_eq!(run.error, Some(EngineError::Disabled("fixed".to_string())));
        assert_eq!(handle.performance().total_runs, 1);
        assert!(!handle.performance().enabled);
    }

    #[test]
    fn test_settled_run_is_counted_once() {
        let handle = handle();
        let settled = AtomicBool::new(false);
        assert!(handle.record_timeout_once(Duration::from_millis(50), &settled));
        assert!(!handle.record_timeout_once(Duration::from_millis(50), &settled));

        // The abandoned run still returns its result, it just isn't counted
        let late = handle.safe_execute_settling("ok", dec!(1), &settled);
        assert!(late.success);

        let perf = handle.performance();
        assert_eq!(perf.total_runs, 1);
        assert_eq!(perf.successful_runs, 0);
        assert!(perf.last_error.unwrap().contains("timed out"));
    }

    #[test]
    fn test_self_test_report_scoring() {
        let cases = vec![
            SelfTestCase {
                input: "a".to_string(),
                detected: true,
                detail: String::new(),
            },
            SelfTestCase {
                input: "b".to_string(),
                detected: false,
                detail: String::new(),
            },
        ];
        let report = SelfTestReport::from_cases("x", cases, 75.0);
        assert!((report.score - 50.0).abs() < f64::EPSILON);
        assert!(!report.passed);
        assert!(!SelfTestReport::from_cases("x", Vec::new(), 0.0).passed);
    }
}
