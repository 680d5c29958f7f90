use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::types::{CustomerId, LoanId, MatchMethod, TargetId};

/// GL account an engine suggests posting against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountHint {
    pub code: String,
    pub name: String,
}

/// One engine's proposed association, before ensemble weighting.
///
/// Candidates are immutable once produced; weighting wraps them in a
/// [`WeightedSuggestion`] instead of editing them in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSuggestion {
    /// Name of the engine that produced this candidate
    pub engine: String,

    /// Identity used for deduplication, `None` when the engine found text
    /// evidence but could not resolve a target
    pub target: Option<TargetId>,

    pub loan_id: Option<LoanId>,
    pub loan_number: Option<String>,
    pub customer_id: Option<CustomerId>,

    /// Display name of the customer (or account) this candidate points at
    pub customer_name: Option<String>,

    /// Excerpt of the description that triggered the match
    pub matched_data: Option<String>,

    pub method: MatchMethod,

    /// Raw engine confidence in [0, 100]
    pub confidence: u8,

    pub reason: String,

    pub account_hint: Option<AccountHint>,

    /// Loan balance for loan targets, transaction amount for disbursements
    pub loan_amount: Option<Decimal>,

    pub vehicle_info: Option<String>,
}

impl CandidateSuggestion {
    pub fn new(engine: impl Into<String>, method: MatchMethod, confidence: u8) -> Self {
        Self {
            engine: engine.into(),
            target: None,
            loan_id: None,
            loan_number: None,
            customer_id: None,
            customer_name: None,
            matched_data: None,
            method,
            confidence: confidence.min(100),
            reason: String::new(),
            account_hint: None,
            loan_amount: None,
            vehicle_info: None,
        }
    }

    /// Point this candidate at a loan; sets the target identity too
    #[must_use]
    pub fn with_loan(mut self, loan_id: LoanId, loan_number: impl Into<String>) -> Self {
        self.target = Some(TargetId::Loan(loan_id));
        self.loan_id = Some(loan_id);
        self.loan_number = Some(loan_number.into());
        self
    }

    /// Point this candidate at a GL account; sets the target identity too
    #[must_use]
    pub fn with_account(mut self, code: impl Into<String>, name: impl Into<String>) -> Self {
        let code = code.into();
        self.target = Some(TargetId::Account(code.clone()));
        self.account_hint = Some(AccountHint {
            code,
            name: name.into(),
        });
        self
    }

    #[must_use]
    pub fn with_customer(mut self, id: Option<CustomerId>, name: impl Into<String>) -> Self {
        self.customer_id = id;
        let name = name.into();
        self.customer_name = (!name.is_empty()).then_some(name);
        self
    }

    #[must_use]
    pub fn with_matched_data(mut self, excerpt: impl Into<String>) -> Self {
        self.matched_data = Some(excerpt.into());
        self
    }

    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    #[must_use]
    pub fn with_amount(mut self, amount: Decimal) -> Self {
        self.loan_amount = Some(amount);
        self
    }

    #[must_use]
    pub fn with_vehicle_info(mut self, info: impl Into<String>) -> Self {
        let info = info.into();
        self.vehicle_info = (!info.is_empty()).then_some(info);
        self
    }
}

/// A candidate plus the factors the confidence calculator applied to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedSuggestion {
    pub candidate: CandidateSuggestion,
    pub engine_weight: f64,
    pub method_bonus: f64,
    pub quality_factor: f64,
    /// Always within [1, 99]
    pub final_confidence: u8,
}

impl WeightedSuggestion {
    #[must_use]
    pub fn target(&self) -> Option<&TargetId> {
        self.candidate.target.as_ref()
    }

    #[must_use]
    pub fn engine(&self) -> &str {
        &self.candidate.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_builder_sets_target_identity() {
        let loan = CandidateSuggestion::new("phone_priority", MatchMethod::ExactPhoneMatch, 95)
            .with_loan(LoanId(3), "LN-000123")
            .with_customer(Some(CustomerId(9)), "Bat Dorj")
            .with_amount(dec!(1500000));
        assert_eq!(loan.target, Some(TargetId::Loan(LoanId(3))));
        assert_eq!(loan.customer_name.as_deref(), Some("Bat Dorj"));

        let account =
            CandidateSuggestion::new("recurring_pattern", MatchMethod::RecurringPatternExact, 95)
                .with_account("6100", "Rent expense");
        assert_eq!(account.target, Some(TargetId::Account("6100".to_string())));
        assert_eq!(account.account_hint.unwrap().name, "Rent expense");
    }

    #[test]
    fn test_empty_customer_name_is_absent() {
        let candidate = CandidateSuggestion::new("x", MatchMethod::ExactPhoneMatch, 150)
            .with_customer(None, "")
            .with_vehicle_info("");
        assert!(candidate.customer_name.is_none());
        assert!(candidate.vehicle_info.is_none());
        assert_eq!(candidate.confidence, 100);
    }
}
