use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;

use crate::core::records::Customer;
use crate::core::suggestion::CandidateSuggestion;
use crate::core::types::{LoanId, MatchMethod};
use crate::directory::{CustomerDirectory, LoanRepository};
use crate::engines::patterns::{extract_names, NameToken};
use crate::engines::phone::loan_candidate;
use crate::engines::{DetectionEngine, EngineError, SelfTestCase, SelfTestReport};
use crate::utils::transliteration::latin_key;

pub const ENGINE_NAME: &str = "mongolian_name";

const BASE_SCORE: i32 = 30;
const MIN_SCORE: i32 = 10;
const MAX_SCORE: i32 = 95;

/// Candidates at or below this score are dropped
pub const SCORE_THRESHOLD: u8 = 25;

/// Largest loans considered per matched customer
const LOANS_PER_CUSTOMER: usize = 2;

const MAX_SUGGESTIONS: usize = 10;

/// Phrases that make a name mention more likely to be about a loan
const LOAN_CONTEXT: &[&str] = &["зээл олгов", "олгох", "зээл"];

/// Name parts shared by too many customers to be strong evidence alone
const COMMON_NAME_PARTS: &[&str] = &["эрдэнэ", "баяр", "батыр", "сүрэн", "болд"];

const SELF_TEST_THRESHOLD: f64 = 75.0;

/// Matches `Б.Номин-Эрдэнэ` style name mentions to customers' active loans.
///
/// Names are compared by their Latin key, so Cyrillic and Latin spellings of
/// the same name meet. Every matched customer contributes at most their two
/// largest active loans, and each loan keeps its best-scoring mention.
pub struct MongolianNameEngine {
    customers: Arc<dyn CustomerDirectory>,
    loans: Arc<dyn LoanRepository>,
}

impl MongolianNameEngine {
    pub fn new(customers: Arc<dyn CustomerDirectory>, loans: Arc<dyn LoanRepository>) -> Self {
        Self { customers, loans }
    }

    /// How well `token` names `customer`, in `[10, 95]`
    #[must_use]
    pub fn score(token: &NameToken, customer: &Customer, description: &str) -> u8 {
        let name = latin_key(&token.name);
        let first = latin_key(&customer.first_name);
        let last = latin_key(&customer.last_name);
        let mut score = BASE_SCORE;

        if let Some(initial) = token.initial {
            let initial = latin_key(&initial.to_string()).chars().next();
            let first_initial = first.chars().next();
            let last_initial = last.chars().next();

            if name == first {
                score += 75;
                if initial == last_initial {
                    score += 25;
                }
            } else if name == last {
                score += 70;
                if initial == first_initial {
                    score += 25;
                }
            } else if covers(&name, &first) {
                score += 20;
            } else if covers(&name, &last) {
                score += 18;
            } else if first.contains(&name) {
                score += 5;
            } else if last.contains(&name) {
                score += 8;
            } else if initial.is_some() && (initial == first_initial || initial == last_initial) {
                score += 15;
            }
        } else if name == first {
            score += 50;
            if token.name.contains('-') {
                score += 35;
            }
        } else if first.contains(&name) {
            score += 30;
        }

        let lower = description.to_lowercase();
        if LOAN_CONTEXT.iter().any(|phrase| lower.contains(phrase)) {
            score += 10;
        }

        if token.name.chars().count() < 4 {
            score -= 20;
        }

        let mention = token.name.to_lowercase();
        let mention_len = mention.chars().count();
        if COMMON_NAME_PARTS
            .iter()
            .any(|part| mention.contains(part) && mention_len <= part.chars().count() + 3)
        {
            score -= 15;
        }

        u8::try_from(score.clamp(MIN_SCORE, MAX_SCORE)).unwrap_or(u8::MAX)
    }
}

/// `part` is a long enough share (70%) of `whole` to count as the same name
fn covers(part: &str, whole: &str) -> bool {
    let part_len = part.chars().count();
    let whole_len = whole.chars().count();
    part_len >= 6 && whole.contains(part) && part_len * 10 >= whole_len * 7
}

impl DetectionEngine for MongolianNameEngine {
    fn name(&self) -> &'static str {
        ENGINE_NAME
    }

    fn display_name(&self) -> &'static str {
        "Mongolian Name Engine"
    }

    fn detect(
        &self,
        description: &str,
        _amount: Decimal,
    ) -> Result<Vec<CandidateSuggestion>, EngineError> {
        let mut best: BTreeMap<LoanId, CandidateSuggestion> = BTreeMap::new();

        for token in extract_names(description) {
            for customer in self.customers.find_by_name(&token.name)? {
                let confidence = Self::score(&token, &customer, description);
                if confidence <= SCORE_THRESHOLD {
                    continue;
                }

                let mut loans = self.loans.active_loans_for(customer.id)?;
                loans.sort_by(|a, b| b.current_balance.cmp(&a.current_balance));
                for loan in loans.iter().take(LOANS_PER_CUSTOMER) {
                    let candidate = loan_candidate(
                        ENGINE_NAME,
                        loan,
                        &customer,
                        MatchMethod::NameSimilarity,
                        confidence,
                    )
                    .with_matched_data(&token.raw)
                    .with_reason(format!("Customer name {} found in description", token.name));

                    match best.entry(loan.id) {
                        Entry::Vacant(slot) => {
                            slot.insert(candidate);
                        }
                        Entry::Occupied(mut slot) if slot.get().confidence < confidence => {
                            slot.insert(candidate);
                        }
                        Entry::Occupied(_) => {}
                    }
                }
            }
        }

        let mut suggestions: Vec<CandidateSuggestion> = best.into_values().collect();
        suggestions.sort_by(|a, b| b.confidence.cmp(&a.confidence));
        suggestions.truncate(MAX_SUGGESTIONS);
        Ok(suggestions)
    }

    fn self_test(&self) -> SelfTestReport {
        let samples = [
            "EB-Б.Ням-Очир-д зээл олгов.",
            "Б.Номин-Эрдэнэ зээлийн төлбөр",
            "T.Gantulga payment",
            "Ганбаатар loan repayment",
        ];
        let cases = samples
            .iter()
            .map(|input| {
                let names: Vec<String> = extract_names(input).into_iter().map(|t| t.name).collect();
                SelfTestCase {
                    input: (*input).to_string(),
                    detected: !names.is_empty(),
                    detail: format!("names={names:?}"),
                }
            })
            .collect();
        SelfTestReport::from_cases(ENGINE_NAME, cases, SELF_TEST_THRESHOLD)
    }
}
