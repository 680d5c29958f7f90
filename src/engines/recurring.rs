//! Recurring-pattern (learning) engine.
//!
//! Historical transactions that were confirmed against a GL account teach
//! the engine a `description → account` table. Each description also yields
//! word-prefix variants (two words or more, longer than ten characters) that
//! let a new description match by containment.
//!
//! ## Confidence
//!
//! | Occurrences | Base |
//! |-------------|------|
//! | ≥ 5         | 95   |
//! | ≥ 3         | 85   |
//! | 2           | 75   |
//! | 1           | 60   |
//!
//! One consistent account adds 10, several accounts subtract 20, capped at 99.
//! A partial hit scores the source pattern minus 15, never below 45.
//!
//! The table lives behind [`PatternStore`] so it can be backed by something
//! other than memory; [`InMemoryPatternStore`] is the default.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::records::TaggedTransaction;
use crate::core::suggestion::CandidateSuggestion;
use crate::core::types::MatchMethod;
use crate::directory::HistoricalTransactionFeed;
use crate::engines::patterns::{first_capture, CUSTOMER_HINTS};
use crate::engines::{count_to_f64, DetectionEngine, EngineError, SelfTestCase, SelfTestReport};

pub const ENGINE_NAME: &str = "recurring_pattern";

/// Pattern snapshot version for compatibility checking
pub const PATTERN_SNAPSHOT_VERSION: &str = "1.0.0";

const MAX_CONFIDENCE: u8 = 99;
const PARTIAL_PENALTY: u8 = 15;
const PARTIAL_FLOOR: u8 = 45;
const MIN_VARIANT_WORDS: usize = 2;
const MIN_VARIANT_CHARS: usize = 10;
const SELF_TEST_THRESHOLD: f64 = 75.0;

#[derive(Error, Debug)]
pub enum PatternError {
    #[error("Pattern description and account must not be empty")]
    EmptyInput,

    #[error("Pattern '{description}' has invalid confidence {confidence}")]
    InvalidConfidence { description: String, confidence: u8 },

    #[error("Failed to parse pattern snapshot: {0}")]
    ParseError(#[from] serde_json::Error),
}

/// Confidence for a pattern seen `occurrences` times across
/// `distinct_accounts` accounts
#[must_use]
pub fn frequency_confidence(occurrences: u32, distinct_accounts: usize) -> u8 {
    let base: u8 = match occurrences {
        n if n >= 5 => 95,
        n if n >= 3 => 85,
        2 => 75,
        _ => 60,
    };
    let adjusted = if distinct_accounts <= 1 {
        base + 10
    } else {
        base.saturating_sub(20)
    };
    adjusted.min(MAX_CONFIDENCE)
}

/// Confidence of a partial hit derived from its source pattern
#[must_use]
pub fn partial_confidence(source: u8) -> u8 {
    source.saturating_sub(PARTIAL_PENALTY).max(PARTIAL_FLOOR)
}

/// A learned pattern as exported
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnedPattern {
    pub description: String,
    /// Most recently confirmed account
    pub account: String,
    pub confidence: u8,
    pub occurrences: u32,
    /// Every account this description was confirmed against
    pub accounts: Vec<String>,
    #[serde(default)]
    pub usage_count: u64,
}

/// Versioned, serializable pattern table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternSnapshot {
    pub version: String,
    pub exported_at: String,
    pub patterns: Vec<LearnedPattern>,
    pub total: usize,
}

impl PatternSnapshot {
    pub fn from_json(json: &str) -> Result<Self, PatternError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, PatternError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HitKind {
    Exact,
    Partial,
}

/// Result of a pattern lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatternHit {
    pub kind: HitKind,
    /// The learned description this hit comes from
    pub source: String,
    /// Text that matched (the description, or the word-prefix variant)
    pub matched: String,
    pub account: String,
    pub confidence: u8,
    pub occurrences: u32,
}

/// Confidence buckets over exact patterns
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConfidenceDistribution {
    /// ≥ 80
    pub high: usize,
    /// 60 to 79
    pub medium: usize,
    /// < 60
    pub low: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PatternStatistics {
    pub total_patterns: usize,
    pub exact_patterns: usize,
    pub partial_patterns: usize,
    pub confidence_distribution: ConfidenceDistribution,
    /// Up to five `(description, usage)` pairs, most used first
    pub most_used: Vec<(String, u64)>,
    pub average_confidence: f64,
}

/// Storage seam for the learned pattern table
pub trait PatternStore: Send + Sync {
    /// Hit on the exact trimmed description; counts as a use of the pattern
    fn lookup_exact(&self, description: &str) -> Option<PatternHit>;

    /// Longest word-prefix variant contained in the description
    fn lookup_partial(&self, description: &str) -> Option<PatternHit>;

    /// Record one more confirmation of `description → account`
    fn learn(&self, description: &str, account: &str) -> Result<LearnedPattern, PatternError>;

    fn export(&self) -> PatternSnapshot;

    /// Merge a snapshot, replacing patterns with the same description.
    /// Returns the number of patterns imported.
    fn import(&self, snapshot: PatternSnapshot) -> Result<usize, PatternError>;

    /// Patterns whose description contains `text`, best first
    fn search(&self, text: &str, limit: usize) -> Vec<PatternHit>;

    fn statistics(&self) -> PatternStatistics;

    fn clear(&self);

    /// Swap the whole table for one learned from `transactions`.
    ///
    /// Readers see either the old table or the new one, never a partial
    /// rebuild. Returns the number of transactions learned.
    fn replace_all(&self, transactions: &[TaggedTransaction]) -> usize;
}

#[derive(Debug)]
struct PatternEntry {
    account: String,
    confidence: u8,
    occurrences: u32,
    accounts: BTreeSet<String>,
    usage: AtomicU64,
}

impl PatternEntry {
    fn to_learned(&self, description: &str) -> LearnedPattern {
        LearnedPattern {
            description: description.to_string(),
            account: self.account.clone(),
            confidence: self.confidence,
            occurrences: self.occurrences,
            accounts: self.accounts.iter().cloned().collect(),
            usage_count: self.usage.load(Ordering::Relaxed),
        }
    }

    fn hit(&self, kind: HitKind, source: &str, matched: &str, confidence: u8) -> PatternHit {
        PatternHit {
            kind,
            source: source.to_string(),
            matched: matched.to_string(),
            account: self.account.clone(),
            confidence,
            occurrences: self.occurrences,
        }
    }
}

#[derive(Debug, Default)]
struct PatternTable {
    exact: BTreeMap<String, PatternEntry>,
    /// Lowercased word-prefix variant -> source descriptions
    partials: BTreeMap<String, BTreeSet<String>>,
}

impl PatternTable {
    fn learn(&mut self, description: &str, account: &str) -> Result<LearnedPattern, PatternError> {
        let description = description.trim();
        let account = account.trim();
        if description.is_empty() || account.is_empty() {
            return Err(PatternError::EmptyInput);
        }

        let entry = self
            .exact
            .entry(description.to_string())
            .or_insert_with(|| PatternEntry {
                account: account.to_string(),
                confidence: 0,
                occurrences: 0,
                accounts: BTreeSet::new(),
                usage: AtomicU64::new(0),
            });
        entry.occurrences += 1;
        entry.account = account.to_string();
        entry.accounts.insert(account.to_string());
        entry.confidence = frequency_confidence(entry.occurrences, entry.accounts.len());
        let learned = entry.to_learned(description);

        self.index_variants(description);
        Ok(learned)
    }

    fn index_variants(&mut self, description: &str) {
        for variant in word_prefix_variants(description) {
            self.partials
                .entry(variant)
                .or_default()
                .insert(description.to_string());
        }
    }

    /// Source with the highest confidence among those sharing a variant
    fn best_source<'a>(
        &'a self,
        sources: &'a BTreeSet<String>,
    ) -> Option<(&'a str, &'a PatternEntry)> {
        let mut best: Option<(&str, &PatternEntry)> = None;
        for source in sources {
            if let Some(entry) = self.exact.get(source) {
                if best.map_or(true, |(_, b)| entry.confidence > b.confidence) {
                    best = Some((source.as_str(), entry));
                }
            }
        }
        best
    }
}

/// Word prefixes of at least two words and more than ten characters,
/// lowercased. Includes the full description when it qualifies.
#[must_use]
pub fn word_prefix_variants(description: &str) -> Vec<String> {
    let words: Vec<&str> = description.split_whitespace().collect();
    (MIN_VARIANT_WORDS..=words.len())
        .map(|n| words[..n].join(" ").to_lowercase())
        .filter(|variant| variant.chars().count() > MIN_VARIANT_CHARS)
        .collect()
}

/// Pattern table held in memory behind a read-write lock
#[derive(Debug, Default)]
pub struct InMemoryPatternStore {
    table: RwLock<PatternTable>,
}

impl InMemoryPatternStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl PatternStore for InMemoryPatternStore {
    fn lookup_exact(&self, description: &str) -> Option<PatternHit> {
        let key = description.trim();
        let table = self.table.read();
        let entry = table.exact.get(key)?;
        entry.usage.fetch_add(1, Ordering::Relaxed);
        Some(entry.hit(HitKind::Exact, key, key, entry.confidence))
    }

    fn lookup_partial(&self, description: &str) -> Option<PatternHit> {
        let haystack = description.trim().to_lowercase();
        let table = self.table.read();

        let mut best: Option<(&String, &BTreeSet<String>)> = None;
        for (variant, sources) in &table.partials {
            if !haystack.contains(variant.as_str()) {
                continue;
            }
            // BTreeMap order makes the first of equal-length variants win
            if best.map_or(true, |(b, _)| variant.chars().count() > b.chars().count()) {
                best = Some((variant, sources));
            }
        }

        let (variant, sources) = best?;
        let (source, entry) = table.best_source(sources)?;
        Some(entry.hit(
            HitKind::Partial,
            source,
            variant,
            partial_confidence(entry.confidence),
        ))
    }

    fn learn(&self, description: &str, account: &str) -> Result<LearnedPattern, PatternError> {
        self.table.write().learn(description, account)
    }

    fn export(&self) -> PatternSnapshot {
        let table = self.table.read();
        let patterns: Vec<LearnedPattern> = table
            .exact
            .iter()
            .map(|(description, entry)| entry.to_learned(description))
            .collect();
        PatternSnapshot {
            version: PATTERN_SNAPSHOT_VERSION.to_string(),
            exported_at: chrono::Utc::now().to_rfc3339(),
            total: patterns.len(),
            patterns,
        }
    }

    fn import(&self, snapshot: PatternSnapshot) -> Result<usize, PatternError> {
        if snapshot.version != PATTERN_SNAPSHOT_VERSION {
            tracing::warn!(
                expected = PATTERN_SNAPSHOT_VERSION,
                found = %snapshot.version,
                "Pattern snapshot version mismatch"
            );
        }

        // Validate everything before touching the table
        for pattern in &snapshot.patterns {
            if pattern.description.trim().is_empty() || pattern.account.trim().is_empty() {
                return Err(PatternError::EmptyInput);
            }
            if pattern.confidence == 0 || pattern.confidence > MAX_CONFIDENCE {
                return Err(PatternError::InvalidConfidence {
                    description: pattern.description.clone(),
                    confidence: pattern.confidence,
                });
            }
        }

        let count = snapshot.patterns.len();
        let mut table = self.table.write();
        for pattern in snapshot.patterns {
            let description = pattern.description.trim().to_string();
            let mut accounts: BTreeSet<String> = pattern.accounts.into_iter().collect();
            accounts.insert(pattern.account.clone());
            table.exact.insert(
                description.clone(),
                PatternEntry {
                    account: pattern.account,
                    confidence: pattern.confidence,
                    occurrences: pattern.occurrences.max(1),
                    accounts,
                    usage: AtomicU64::new(pattern.usage_count),
                },
            );
            table.index_variants(&description);
        }

        tracing::info!(count, "Imported patterns");
        Ok(count)
    }

    fn search(&self, text: &str, limit: usize) -> Vec<PatternHit> {
        let needle = text.trim().to_lowercase();
        if needle.is_empty() || limit == 0 {
            return Vec::new();
        }
        let table = self.table.read();
        let mut hits: Vec<(u64, PatternHit)> = table
            .exact
            .iter()
            .filter(|(description, _)| description.to_lowercase().contains(&needle))
            .map(|(description, entry)| {
                (
                    entry.usage.load(Ordering::Relaxed),
                    entry.hit(HitKind::Exact, description, description, entry.confidence),
                )
            })
            .collect();
        // Stable sort keeps alphabetical order among equals
        hits.sort_by(|(usage_a, a), (usage_b, b)| {
            b.confidence
                .cmp(&a.confidence)
                .then_with(|| usage_b.cmp(usage_a))
        });
        hits.into_iter().take(limit).map(|(_, hit)| hit).collect()
    }

    fn statistics(&self) -> PatternStatistics {
        let table = self.table.read();
        let exact_patterns = table.exact.len();
        let partial_patterns = table.partials.len();

        let mut distribution = ConfidenceDistribution::default();
        let mut confidence_sum = 0u64;
        for entry in table.exact.values() {
            confidence_sum += u64::from(entry.confidence);
            match entry.confidence {
                c if c >= 80 => distribution.high += 1,
                c if c >= 60 => distribution.medium += 1,
                _ => distribution.low += 1,
            }
        }

        let mut most_used: Vec<(String, u64)> = table
            .exact
            .iter()
            .map(|(description, entry)| (description.clone(), entry.usage.load(Ordering::Relaxed)))
            .filter(|(_, usage)| *usage > 0)
            .collect();
        most_used.sort_by(|a, b| b.1.cmp(&a.1));
        most_used.truncate(5);

        #[allow(clippy::cast_precision_loss)]
        let average_confidence = if exact_patterns == 0 {
            0.0
        } else {
            confidence_sum as f64 / count_to_f64(exact_patterns)
        };

        PatternStatistics {
            total_patterns: exact_patterns + partial_patterns,
            exact_patterns,
            partial_patterns,
            confidence_distribution: distribution,
            most_used,
            average_confidence,
        }
    }

    fn clear(&self) {
        *self.table.write() = PatternTable::default();
    }

    fn replace_all(&self, transactions: &[TaggedTransaction]) -> usize {
        let mut fresh = PatternTable::default();
        let learned = transactions
            .iter()
            .filter(|t| fresh.learn(&t.description, &t.related_account).is_ok())
            .count();
        *self.table.write() = fresh;
        learned
    }
}

/// Customer hint from a pattern description, if any name-shaped text is present
#[must_use]
pub fn extract_customer_hint(description: &str) -> Option<String> {
    CUSTOMER_HINTS
        .iter()
        .find_map(|hint| first_capture(hint.regex, description))
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
}

/// The only stateful engine: matches descriptions against learned patterns
pub struct RecurringPatternEngine {
    store: Arc<dyn PatternStore>,
    history: Arc<dyn HistoricalTransactionFeed>,
}

impl RecurringPatternEngine {
    /// Build the engine and load the pattern library from the history feed.
    ///
    /// A feed failure is logged and the engine starts with whatever the
    /// store already holds.
    pub fn new(store: Arc<dyn PatternStore>, history: Arc<dyn HistoricalTransactionFeed>) -> Self {
        let engine = Self { store, history };
        if let Err(e) = engine.load_history() {
            tracing::warn!(error = %e, "Failed to load pattern library");
        }
        engine
    }

    fn load_history(&self) -> Result<usize, EngineError> {
        let transactions = self.history.with_related_account_tag()?;
        let mut learned = 0;
        for transaction in &transactions {
            if self
                .store
                .learn(&transaction.description, &transaction.related_account)
                .is_ok()
            {
                learned += 1;
            }
        }
        tracing::info!(
            transactions = learned,
            patterns = self.store.statistics().exact_patterns,
            "Loaded pattern library"
        );
        Ok(learned)
    }

    /// Rebuild the table from the history feed.
    ///
    /// Patterns learned at runtime that are not in the feed are dropped;
    /// export them first to keep them.
    pub fn refresh(&self) -> Result<usize, EngineError> {
        let transactions = self.history.with_related_account_tag()?;
        let learned = self.store.replace_all(&transactions);
        tracing::info!(transactions = learned, "Refreshed pattern library");
        Ok(learned)
    }

    /// Learn a confirmed association immediately
    pub fn learn(&self, description: &str, account: &str) -> Result<LearnedPattern, PatternError> {
        let learned = self.store.learn(description, account)?;
        tracing::info!(
            account = %learned.account,
            confidence = learned.confidence,
            "Learned pattern"
        );
        Ok(learned)
    }

    /// Exact hit, otherwise the best partial hit
    #[must_use]
    pub fn lookup(&self, description: &str) -> Option<PatternHit> {
        self.store
            .lookup_exact(description)
            .or_else(|| self.store.lookup_partial(description))
    }

    /// Cheap autocomplete over learned descriptions
    #[must_use]
    pub fn quick_lookup(&self, partial: &str, limit: usize) -> Vec<PatternHit> {
        self.store.search(partial, limit)
    }

    #[must_use]
    pub fn export(&self) -> PatternSnapshot {
        self.store.export()
    }

    pub fn import(&self, snapshot: PatternSnapshot) -> Result<usize, PatternError> {
        self.store.import(snapshot)
    }

    #[must_use]
    pub fn statistics(&self) -> PatternStatistics {
        self.store.statistics()
    }

    fn candidate(description: &str, hit: &PatternHit) -> CandidateSuggestion {
        let (method, reason) = match hit.kind {
            HitKind::Exact => (
                MatchMethod::RecurringPatternExact,
                format!("Exact recurring pattern match ({} occurrences)", hit.occurrences),
            ),
            HitKind::Partial => (
                MatchMethod::RecurringPatternPartial,
                format!("Partial recurring pattern match: {}", hit.matched),
            ),
        };
        let mut candidate = CandidateSuggestion::new(ENGINE_NAME, method, hit.confidence)
            .with_account(hit.account.clone(), hit.account.clone())
            .with_matched_data(hit.matched.clone())
            .with_reason(reason);
        if let Some(name) = extract_customer_hint(description) {
            candidate = candidate.with_customer(None, name);
        }
        candidate
    }
}

impl DetectionEngine for RecurringPatternEngine {
    fn name(&self) -> &'static str {
        ENGINE_NAME
    }

    fn display_name(&self) -> &'static str {
        "Historical Pattern Matcher"
    }

    fn detect(
        &self,
        description: &str,
        _amount: Decimal,
    ) -> Result<Vec<CandidateSuggestion>, EngineError> {
        Ok(self
            .lookup(description)
            .map(|hit| vec![Self::candidate(description, &hit)])
            .unwrap_or_default())
    }

    fn self_test(&self) -> SelfTestReport {
        // Scratch store so the live table and its usage counters stay untouched
        let scratch = InMemoryPatternStore::new();
        for _ in 0..5 {
            if let Err(e) = scratch.learn("Office rent payment", "6100") {
                return SelfTestReport::with_score(
                    ENGINE_NAME,
                    vec![SelfTestCase {
                        input: "Office rent payment".to_string(),
                        detected: false,
                        detail: e.to_string(),
                    }],
                    0.0,
                    SELF_TEST_THRESHOLD,
                );
            }
        }

        let exact = scratch.lookup_exact("Office rent payment");
        let partial = scratch.lookup_partial("Office rent payment Q2 adjustment");
        let noise = scratch
            .lookup_exact("Unrelated noise text xyz")
            .or_else(|| scratch.lookup_partial("Unrelated noise text xyz"));

        let cases = vec![
            SelfTestCase {
                input: "Office rent payment".to_string(),
                detected: exact.as_ref().is_some_and(|h| h.account == "6100"),
                detail: format!("exact={:?}", exact.map(|h| h.confidence)),
            },
            SelfTestCase {
                input: "Office rent payment Q2 adjustment".to_string(),
                detected: partial.as_ref().is_some_and(|h| h.kind == HitKind::Partial),
                detail: format!("partial={:?}", partial.map(|h| h.confidence)),
            },
            SelfTestCase {
                input: "Unrelated noise text xyz".to_string(),
                detected: noise.is_none(),
                detail: format!(
                    "no hit expected, live patterns={}",
                    self.store.statistics().exact_patterns
                ),
            },
        ];
        SelfTestReport::from_cases(ENGINE_NAME, cases, SELF_TEST_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::TargetId;
    use crate::directory::store::InMemoryDirectory;
    use crate::directory::CollaboratorError;
    use rust_decimal_macros::dec;

    fn engine_with_history(history: &[(&str, &str)]) -> RecurringPatternEngine {
        let mut dir = InMemoryDirectory::new();
        for (description, account) in history {
            dir.add_tagged(TaggedTransaction::new(*description, *account));
        }
        RecurringPatternEngine::new(Arc::new(InMemoryPatternStore::new()), Arc::new(dir))
    }

    fn snapshot_with(description: &str, account: &str, confidence: u8) -> PatternSnapshot {
        PatternSnapshot {
            version: PATTERN_SNAPSHOT_VERSION.to_string(),
            exported_at: String::new(),
            patterns: vec![LearnedPattern {
                description: description.to_string(),
                account: account.to_string(),
                confidence,
                occurrences: 5,
                accounts: vec![account.to_string()],
                usage_count: 0,
            }],
            total: 1,
        }
    }

    #[test]
    fn test_frequency_confidence_table() {
        assert_eq!(frequency_confidence(1, 1), 70);
        assert_eq!(frequency_confidence(2, 1), 85);
        assert_eq!(frequency_confidence(3, 1), 95);
        assert_eq!(frequency_confidence(5, 1), 99);
        assert_eq!(frequency_confidence(5, 2), 75);
        assert_eq!(frequency_confidence(1, 3), 40);
    }

    #[test]
    fn test_partial_confidence_floor() {
        assert_eq!(partial_confidence(95), 80);
        assert_eq!(partial_confidence(55), 45);
        assert_eq!(partial_confidence(10), 45);
    }

    #[test]
    fn test_word_prefix_variants() {
        assert_eq!(
            word_prefix_variants("Office rent payment"),
            vec!["office rent", "office rent payment"]
        );
        // "Pay the rent" has three words but "pay the" is too short
        assert_eq!(word_prefix_variants("Pay the rent"), vec!["pay the rent"]);
        assert!(word_prefix_variants("Pay rent").is_empty());
        assert!(word_prefix_variants("Supercalifragilistic").is_empty());
    }

    #[test]
    fn test_exact_then_partial_lookup() {
        let engine = engine_with_history(&[]);
        engine
            .import(snapshot_with("Office rent payment", "6100", 95))
            .unwrap();

        let exact = engine.detect("Office rent payment", dec!(100)).unwrap();
        assert_eq!(exact.len(), 1);
        assert_eq!(exact[0].confidence, 95);
        assert_eq!(exact[0].method, MatchMethod::RecurringPatternExact);
        assert_eq!(exact[0].target, Some(TargetId::Account("6100".to_string())));

        let partial = engine
            .detect("Office rent payment Q2 adjustment", dec!(100))
            .unwrap();
        assert_eq!(partial.len(), 1);
        assert_eq!(partial[0].confidence, 80);
        assert_eq!(partial[0].method, MatchMethod::RecurringPatternPartial);
        assert_eq!(partial[0].matched_data.as_deref(), Some("office rent payment"));

        assert!(engine
            .detect("Unrelated noise text xyz", dec!(10))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_history_builds_confidence() {
        let engine = engine_with_history(&[
            ("Monthly internet bill", "6200"),
            ("Monthly internet bill", "6200"),
            ("Water utility charge", "6300"),
            ("Water utility charge", "6310"),
        ]);
        let internet = engine.lookup("Monthly internet bill").unwrap();
        assert_eq!(internet.confidence, 85);
        let water = engine.lookup("Water utility charge").unwrap();
        assert_eq!(water.confidence, 55);
        assert_eq!(water.account, "6310");
    }

    #[test]
    fn test_learn_is_visible_immediately() {
        let engine = engine_with_history(&[]);
        assert!(engine.lookup("Parking fee downtown").is_none());
        let learned = engine.learn("Parking fee downtown", "6400").unwrap();
        assert_eq!(learned.confidence, 70);
        assert_eq!(engine.lookup("Parking fee downtown").unwrap().account, "6400");
        assert!(matches!(
            engine.learn("   ", "6400"),
            Err(PatternError::EmptyInput)
        ));
    }

    #[test]
    fn test_export_import_reproduces_lookups() {
        let engine = engine_with_history(&[
            ("Office rent payment", "6100"),
            ("Office rent payment", "6100"),
            ("Monthly internet bill", "6200"),
        ]);
        engine.learn("Parking fee downtown", "6400").unwrap();
        let snapshot = engine.export();
        assert_eq!(snapshot.total, 3);

        let restored = engine_with_history(&[]);
        restored
            .import(PatternSnapshot::from_json(&snapshot.to_json().unwrap()).unwrap())
            .unwrap();

        for pattern in &snapshot.patterns {
            let a = engine.lookup(&pattern.description).unwrap();
            let b = restored.lookup(&pattern.description).unwrap();
            assert_eq!(a, b);
        }
        let query = "Office rent payment for March";
        assert_eq!(engine.lookup(query), restored.lookup(query));
    }

    #[test]
    fn test_import_rejects_invalid_confidence() {
        let engine = engine_with_history(&[]);
        assert!(matches!(
            engine.import(snapshot_with("Office rent payment", "6100", 120)),
            Err(PatternError::InvalidConfidence { .. })
        ));
        assert!(engine.lookup("Office rent payment").is_none());
    }

    #[test]
    fn test_statistics_and_usage() {
        let engine = engine_with_history(&[
            ("Office rent payment", "6100"),
            ("Monthly internet bill", "6200"),
        ]);
        engine.lookup("Office rent payment");
        engine.lookup("Office rent payment");

        let stats = engine.statistics();
        assert_eq!(stats.exact_patterns, 2);
        assert!(stats.partial_patterns >= 2);
        assert_eq!(stats.confidence_distribution.medium, 2);
        assert_eq!(stats.most_used, vec![("Office rent payment".to_string(), 2)]);
        assert!((stats.average_confidence - 70.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_quick_lookup_and_refresh() {
        let engine = engine_with_history(&[
            ("Office rent payment", "6100"),
            ("Office cleaning service", "6500"),
        ]);
        let hits = engine.quick_lookup("office", 5);
        assert_eq!(hits.len(), 2);
        assert!(engine.quick_lookup("office", 1).len() == 1);

        engine.learn("Runtime only pattern", "6900").unwrap();
        assert_eq!(engine.refresh().unwrap(), 2);
        assert!(engine.lookup("Runtime only pattern").is_none());
    }

    #[test]
    fn test_refresh_never_exposes_an_empty_table() {
        let engine = engine_with_history(&[
            ("Office rent payment", "6100"),
            ("Internet service fee", "6230"),
        ]);
        let done = std::sync::atomic::AtomicBool::new(false);

        std::thread::scope(|scope| {
            let reader = scope.spawn(|| {
                let mut misses = 0;
                while !done.load(Ordering::Acquire) {
                    if engine.lookup("Office rent payment").is_none() {
                        misses += 1;
                    }
                }
                misses
            });
            for _ in 0..200 {
                assert_eq!(engine.refresh().unwrap(), 2);
            }
            done.store(true, Ordering::Release);
            assert_eq!(reader.join().unwrap(), 0);
        });
    }

    #[test]
    fn test_customer_hint() {
        assert_eq!(
            extract_customer_hint("EB-Б.Очмаа-д шилжүүлэг").as_deref(),
            Some("Б.Очмаа")
        );
        assert_eq!(
            extract_customer_hint("Transfer from John Smith").as_deref(),
            Some("John Smith")
        );
        assert!(extract_customer_hint("office rent").is_none());
    }

    struct BrokenFeed;

    impl HistoricalTransactionFeed for BrokenFeed {
        fn with_related_account_tag(&self) -> Result<Vec<TaggedTransaction>, CollaboratorError> {
            Err(CollaboratorError::unavailable("history", "offline"))
        }
    }

    #[test]
    fn test_feed_failure_starts_empty() {
        let engine =
            RecurringPatternEngine::new(Arc::new(InMemoryPatternStore::new()), Arc::new(BrokenFeed));
        assert_eq!(engine.statistics().exact_patterns, 0);
        assert!(engine.refresh().is_err());
    }

    #[test]
    fn test_self_test_passes() {
        let report = engine_with_history(&[]).self_test();
        assert!(report.passed, "{report:?}");
    }
}
