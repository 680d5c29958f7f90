use std::sync::Arc;

use regex::Regex;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::core::suggestion::CandidateSuggestion;
use crate::core::types::{MatchMethod, TenantId};
use crate::directory::GlConfiguration;
use crate::engines::patterns::{
    first_capture, is_match, NamedPattern, DISBURSEMENT_PATTERNS, NAME_EXTRACTORS,
    RE_DISB_EB_NUMBER, RE_DISB_NAMED_GRANT, RE_NAME_TRAILING_NOISE,
};
use crate::engines::{percent, DetectionEngine, EngineError, SelfTestCase, SelfTestReport};

pub const ENGINE_NAME: &str = "loan_disbursement";

const EB_PREFIX: &str = "EB-";
const MONGOLIAN_PHRASE: &str = "зээл олгов";
const ENGLISH_PHRASE: &str = "loan disbursement";

const BASE_CONFIDENCE: u8 = 70;
const PHRASE_CONFIDENCE: u8 = 80;
const PREFIX_CONFIDENCE: u8 = 85;
const PREFIX_AND_PHRASE_CONFIDENCE: u8 = 95;
const NAMED_GRANT_BONUS: u8 = 10;
const EB_NUMBER_BONUS: u8 = 5;
const MAX_CONFIDENCE: u8 = 99;

const SELF_TEST_THRESHOLD: f64 = 70.0;

/// Breakdown of how a description was classified
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisbursementAnalysis {
    pub is_disbursement: bool,
    pub matched_patterns: Vec<&'static str>,
    pub customer_name: Option<String>,
    pub confidence: u8,
    pub has_eb_prefix: bool,
    pub has_mongolian_phrase: bool,
    pub has_english_phrase: bool,
    pub has_eb_number: bool,
}

/// Detects loan payouts from fixed bilingual phrases and proposes the
/// tenant's disbursement GL account.
pub struct LoanDisbursementEngine {
    gl: Arc<dyn GlConfiguration>,
    tenant: TenantId,
}

impl LoanDisbursementEngine {
    pub fn new(gl: Arc<dyn GlConfiguration>, tenant: TenantId) -> Self {
        Self { gl, tenant }
    }

    fn matched_patterns(description: &str) -> Vec<&'static NamedPattern> {
        DISBURSEMENT_PATTERNS
            .iter()
            .filter(|p| is_match(p.regex, description))
            .collect()
    }

    /// Quick check whether a description reads as a loan payout
    #[must_use]
    pub fn is_disbursement(description: &str) -> bool {
        DISBURSEMENT_PATTERNS
            .iter()
            .any(|p| is_match(p.regex, description))
    }

    /// Customer name from the description, most specific pattern first
    #[must_use]
    pub fn extract_customer_name(description: &str) -> Option<String> {
        for extractor in NAME_EXTRACTORS {
            let Some(raw) = first_capture(extractor.regex, description) else {
                continue;
            };
            let name = strip_trailing_noise(raw.trim());
            if !name.is_empty() {
                return Some(name);
            }
        }
        None
    }

    /// Rule ladder: prefix and phrase, prefix, phrase, anything else.
    /// Bonuses for a named grant and for an `EB-<digits>` reference.
    #[must_use]
    pub fn confidence(description: &str) -> u8 {
        let lower = description.to_lowercase();
        let has_prefix = description.contains(EB_PREFIX);
        let has_mongolian = lower.contains(MONGOLIAN_PHRASE);
        let has_english = lower.contains(ENGLISH_PHRASE);

        let mut confidence = if has_prefix && has_mongolian {
            PREFIX_AND_PHRASE_CONFIDENCE
        } else if has_prefix {
            PREFIX_CONFIDENCE
        } else if has_mongolian || has_english {
            PHRASE_CONFIDENCE
        } else {
            BASE_CONFIDENCE
        };

        if is_match(&RE_DISB_NAMED_GRANT, description) {
            confidence += NAMED_GRANT_BONUS;
        }
        if is_match(&RE_DISB_EB_NUMBER, description) {
            confidence += EB_NUMBER_BONUS;
        }

        confidence.min(MAX_CONFIDENCE)
    }

    /// Full classification of a description
    #[must_use]
    pub fn analyze(description: &str) -> DisbursementAnalysis {
        let matched: Vec<&'static str> = Self::matched_patterns(description)
            .iter()
            .map(|p| p.name)
            .collect();
        let lower = description.to_lowercase();
        DisbursementAnalysis {
            is_disbursement: !matched.is_empty(),
            matched_patterns: matched,
            customer_name: Self::extract_customer_name(description),
            confidence: Self::confidence(description),
            has_eb_prefix: description.contains(EB_PREFIX),
            has_mongolian_phrase: lower.contains(MONGOLIAN_PHRASE),
            has_english_phrase: lower.contains(ENGLISH_PHRASE),
            has_eb_number: is_match(&RE_DISB_EB_NUMBER, description),
        }
    }
}

fn strip_trailing_noise(name: &str) -> String {
    RE_NAME_TRAILING_NOISE
        .as_ref()
        .map_or_else(|| name.to_string(), |re: &Regex| re.replace(name, "").into_owned())
        .trim()
        .to_string()
}

impl DetectionEngine for LoanDisbursementEngine {
    fn name(&self) -> &'static str {
        ENGINE_NAME
    }

    fn display_name(&self) -> &'static str {
        "Loan Pattern Analyzer"
    }

    fn detect(
        &self,
        description: &str,
        amount: Decimal,
    ) -> Result<Vec<CandidateSuggestion>, EngineError> {
        let matched = Self::matched_patterns(description);
        let Some(first) = matched.first() else {
            return Ok(Vec::new());
        };

        let Some(account) = self
            .gl
            .for_tenant(&self.tenant)?
            .and_then(|accounts| accounts.disbursement_account)
        else {
            tracing::debug!(tenant = %self.tenant, "No disbursement account configured");
            return Ok(Vec::new());
        };

        let excerpt = first
            .regex
            .as_ref()
            .and_then(|re| re.find(description))
            .map_or_else(|| description.to_string(), |m| m.as_str().trim().to_string());

        let mut suggestion = CandidateSuggestion::new(
            ENGINE_NAME,
            MatchMethod::LoanDisbursementPattern,
            Self::confidence(description),
        )
        .with_account(account.code.clone(), account.name.clone())
        .with_matched_data(excerpt)
        .with_amount(amount)
        .with_reason(format!("Loan disbursement pattern: {}", first.name));

        if let Some(name) = Self::extract_customer_name(description) {
            suggestion = suggestion.with_customer(None, name);
        }

        Ok(vec![suggestion])
    }

    fn self_test(&self) -> SelfTestReport {
        let samples = [
            "EB-Б.Ням-Очир-д зээл олгов.",
            "EB-200000000371",
            "EB-Г.Батбаасан-д зээл олгов.",
            "EB-Customer loan disbursement",
            "General loan disbursement transaction",
        ];

        let mut detected = 0;
        let mut extracted = 0;
        let cases: Vec<SelfTestCase> = samples
            .iter()
            .map(|input| {
                let is_disbursement = Self::is_disbursement(input);
                let name = Self::extract_customer_name(input);
                detected += usize::from(is_disbursement);
                extracted += usize::from(name.is_some());
                SelfTestCase {
                    input: (*input).to_string(),
                    detected: is_disbursement,
                    detail: format!(
                        "customer={} confidence={}",
                        name.as_deref().unwrap_or("-"),
                        Self::confidence(input)
                    ),
                }
            })
            .collect();

        // Pattern detection and name extraction weigh equally
        let score = (percent(detected, cases.len()) + percent(extracted, cases.len())) / 2.0;
        SelfTestReport::with_score(ENGINE_NAME, cases, score, SELF_TEST_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::records::{GlAccount, GlAccounts};
    use crate::core::types::TargetId;
    use crate::directory::store::InMemoryDirectory;
    use crate::directory::CollaboratorError;
    use rust_decimal_macros::dec;

    fn configured() -> LoanDisbursementEngine {
        let mut dir = InMemoryDirectory::new();
        dir.set_gl_accounts(
            TenantId::default(),
            GlAccounts {
                disbursement_account: Some(GlAccount {
                    id: 7,
                    code: "120101".to_string(),
                    name: "General loan disbursements".to_string(),
                }),
                receivable_account: None,
            },
        );
        LoanDisbursementEngine::new(Arc::new(dir), TenantId::default())
    }

    #[test]
    fn test_named_mongolian_disbursement() {
        let found = configured()
            .detect("EB-Б.Ням-Очир-д зээл олгов.", dec!(2000000))
            .unwrap();
        assert_eq!(found.len(), 1);
        let s = &found[0];
        assert_eq!(s.customer_name.as_deref(), Some("Б.Ням-Очир"));
        assert!(s.confidence >= 95);
        assert_eq!(s.method, MatchMethod::LoanDisbursementPattern);
        assert_eq!(s.target, Some(TargetId::Account("120101".to_string())));
        assert_eq!(s.loan_amount, Some(dec!(2000000)));
    }

    #[test]
    fn test_confidence_ladder() {
        assert_eq!(LoanDisbursementEngine::confidence("EB-Б.Ням-Очир-д зээл олгов."), 95);
        assert_eq!(LoanDisbursementEngine::confidence("EB-Бат-д зээл олгов"), 99);
        assert_eq!(LoanDisbursementEngine::confidence("EB-200000000371"), 90);
        assert_eq!(LoanDisbursementEngine::confidence("EB-Customer"), 85);
        assert_eq!(LoanDisbursementEngine::confidence("зээл олгов"), 80);
        assert_eq!(LoanDisbursementEngine::confidence("loan granted"), 70);
    }

    #[test]
    fn test_customer_name_extraction_order() {
        assert_eq!(
            LoanDisbursementEngine::extract_customer_name("EB-Customer loan disbursement")
                .as_deref(),
            Some("Customer")
        );
        assert_eq!(
            LoanDisbursementEngine::extract_customer_name("EB-Bat Erdene transfer").as_deref(),
            Some("Bat Erdene transfer")
        );
        assert!(LoanDisbursementEngine::extract_customer_name("EB-200000000371").is_none());
        assert!(LoanDisbursementEngine::extract_customer_name("no prefix here").is_none());
    }

    #[test]
    fn test_missing_gl_configuration_yields_nothing() {
        let engine =
            LoanDisbursementEngine::new(Arc::new(InMemoryDirectory::new()), TenantId::default());
        assert!(engine
            .detect("EB-Б.Ням-Очир-д зээл олгов.", dec!(2000000))
            .unwrap()
            .is_empty());
    }

    struct BrokenGl;

    impl GlConfiguration for BrokenGl {
        fn for_tenant(&self, _tenant: &TenantId) -> Result<Option<GlAccounts>, CollaboratorError> {
            Err(CollaboratorError::unavailable("gl configuration", "connection refused"))
        }
    }

    #[test]
    fn test_gl_failure_is_collaborator_error() {
        let engine = LoanDisbursementEngine::new(Arc::new(BrokenGl), TenantId::default());
        let err = engine.detect("EB-Бат-д зээл олгов", dec!(1)).unwrap_err();
        assert!(matches!(err, EngineError::CollaboratorUnavailable(_)));
        // Non-matching text never reaches the collaborator
        assert!(engine.detect("Unrelated noise text xyz", dec!(10)).unwrap().is_empty());
    }

    #[test]
    fn test_analyze_flags() {
        let analysis = LoanDisbursementEngine::analyze("EB-200000000371");
        assert!(analysis.is_disbursement);
        assert!(analysis.has_eb_prefix);
        assert!(analysis.has_eb_number);
        assert!(!analysis.has_mongolian_phrase);
        assert_eq!(analysis.matched_patterns, vec!["eb_number"]);
        assert!(!LoanDisbursementEngine::is_disbursement("Office rent payment"));
    }

    #[test]
    fn test_self_test_passes() {
        let report = configured().self_test();
        assert!(report.passed, "{report:?}");
        assert!((report.score - 80.0).abs() < 1e-9);
    }
}
