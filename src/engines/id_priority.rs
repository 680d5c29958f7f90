use std::sync::Arc;

use rust_decimal::Decimal;

use crate::core::records::Customer;
use crate::core::suggestion::CandidateSuggestion;
use crate::core::types::MatchMethod;
use crate::directory::{CustomerDirectory, LoanRepository};
use crate::engines::patterns::{extract_register_numbers, fold_id_prefix, RegisterToken};
use crate::engines::phone::loan_candidate;
use crate::engines::{DetectionEngine, EngineError, SelfTestCase, SelfTestReport};

pub const ENGINE_NAME: &str = "id_priority";

/// Digits and prefix both agree with the customer's register number
pub const EXACT_ID_CONFIDENCE: u8 = 95;

/// Digits agree but the prefix does not, even after script folding
pub const PREFIX_MISMATCH_CONFIDENCE: u8 = 80;

/// Eight digits with no prefix at all
pub const BARE_DIGITS_CONFIDENCE: u8 = 70;

const SELF_TEST_THRESHOLD: f64 = 75.0;

/// Resolves national register numbers (`ЧЛ74090619`) to active loans.
///
/// The eight digits select the customer; the two-letter prefix only grades
/// the match. Prefixes are folded before comparison so a Latin `TZ` or a
/// `Т3` typo still reads as `ТЗ`.
pub struct IdPriorityEngine {
    customers: Arc<dyn CustomerDirectory>,
    loans: Arc<dyn LoanRepository>,
}

impl IdPriorityEngine {
    pub fn new(customers: Arc<dyn CustomerDirectory>, loans: Arc<dyn LoanRepository>) -> Self {
        Self { customers, loans }
    }

    /// Method and confidence for `token` against `customer`'s register number
    #[must_use]
    pub fn grade(token: &RegisterToken, customer: &Customer) -> (MatchMethod, u8) {
        let Some(prefix) = &token.prefix else {
            return (MatchMethod::PartialIdMatch, BARE_DIGITS_CONFIDENCE);
        };
        let registered: String = customer
            .register_number
            .as_deref()
            .unwrap_or_default()
            .chars()
            .filter(|c| c.is_alphabetic())
            .collect();
        if fold_id_prefix(prefix) == fold_id_prefix(&registered) {
            (MatchMethod::ExactIdMatch, EXACT_ID_CONFIDENCE)
        } else {
            (MatchMethod::PartialIdMatch, PREFIX_MISMATCH_CONFIDENCE)
        }
    }

    fn token_suggestions(
        &self,
        token: &RegisterToken,
    ) -> Result<Vec<CandidateSuggestion>, EngineError> {
        let mut suggestions = Vec::new();
        for customer in self.customers.find_by_register_digits(&token.digits)? {
            let (method, confidence) = Self::grade(token, &customer);
            for loan in self.loans.active_loans_for(customer.id)? {
                suggestions.push(
                    loan_candidate(ENGINE_NAME, &loan, &customer, method, confidence)
                        .with_matched_data(&token.raw)
                        .with_reason(format!(
                            "Register number {} found in description",
                            token.raw
                        )),
                );
            }
        }
        Ok(suggestions)
    }
}

impl DetectionEngine for IdPriorityEngine {
    fn name(&self) -> &'static str {
        ENGINE_NAME
    }

    fn display_name(&self) -> &'static str {
        "ID Priority Engine"
    }

    fn detect(
        &self,
        description: &str,
        _amount: Decimal,
    ) -> Result<Vec<CandidateSuggestion>, EngineError> {
        let mut suggestions = Vec::new();
        for token in extract_register_numbers(description) {
            suggestions.extend(self.token_suggestions(&token)?);
        }
        Ok(suggestions)
    }

    fn self_test(&self) -> SelfTestReport {
        let samples = [
            "ЧЛ74090619",
            "TZ71080171 loan payment",
            "Payment УТ12345678",
            "Т371080171 зээлийн төлбөр",
        ];
        let cases = samples
            .iter()
            .map(|input| {
                let tokens = extract_register_numbers(input);
                let prefixes: Vec<String> = tokens
                    .iter()
                    .filter_map(|t| t.prefix.as_deref().map(fold_id_prefix))
                    .collect();
                SelfTestCase {
                    input: (*input).to_string(),
                    detected: !prefixes.is_empty(),
                    detail: format!("prefixes={prefixes:?}"),
                }
            })
            .collect();
        SelfTestReport::from_cases(ENGINE_NAME, cases, SELF_TEST_THRESHOLD)
    }
}
