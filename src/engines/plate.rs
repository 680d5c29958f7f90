use std::sync::Arc;

use rust_decimal::Decimal;

use crate::core::records::Collateral;
use crate::core::suggestion::CandidateSuggestion;
use crate::core::types::MatchMethod;
use crate::directory::{CollateralRepository, CustomerDirectory, LoanRepository};
use crate::engines::patterns::{extract_plates, grade_plate};
use crate::engines::phone::loan_candidate;
use crate::engines::{DetectionEngine, EngineError, SelfTestCase, SelfTestReport};
use crate::utils::validation::normalize_plate;

pub const ENGINE_NAME: &str = "license_plate";

const SELF_TEST_THRESHOLD: f64 = 75.0;

/// Latin spellings of common Mongolian plate letter groups
const LATIN_GROUPS: &[(&str, &str)] = &[
    ("UNG", "УНГ"),
    ("UAM", "УАМ"),
    ("UBY", "УБЯ"),
    ("UNK", "УНК"),
    ("UNO", "УНӨ"),
    ("UBM", "УБМ"),
    ("UEN", "УЕН"),
    ("UNN", "УНН"),
    ("UBO", "УБӨ"),
    ("UAH", "УАХ"),
    ("UBU", "УБУ"),
    ("UBR", "УБР"),
    ("UAU", "УАУ"),
];

/// Latin letters typed in place of look-alike Cyrillic plate letters
const LATIN_LETTERS: &[(char, char)] = &[
    ('A', 'А'),
    ('B', 'Б'),
    ('C', 'С'),
    ('E', 'Е'),
    ('H', 'Н'),
    ('K', 'К'),
    ('M', 'М'),
    ('O', 'О'),
    ('P', 'Р'),
    ('T', 'Т'),
    ('X', 'Х'),
    ('Y', 'У'),
];

/// Dedicated license-plate matcher.
///
/// Confidence depends on how specific the plate format is (80 to 90). Lookups
/// fall back from the exact plate, to the plate without separators, to the
/// plate with Latin letters transliterated to Cyrillic.
pub struct LicensePlateEngine {
    customers: Arc<dyn CustomerDirectory>,
    loans: Arc<dyn LoanRepository>,
    collateral: Arc<dyn CollateralRepository>,
}

impl LicensePlateEngine {
    pub fn new(
        customers: Arc<dyn CustomerDirectory>,
        loans: Arc<dyn LoanRepository>,
        collateral: Arc<dyn CollateralRepository>,
    ) -> Self {
        Self {
            customers,
            loans,
            collateral,
        }
    }

    /// Strip everything but letters and digits, uppercase
    #[must_use]
    pub fn normalize(plate: &str) -> String {
        normalize_plate(plate)
    }

    /// Replace Latin plate letters with their Cyrillic counterparts.
    ///
    /// Letter groups are replaced before single letters so `UAM` becomes
    /// `УАМ` rather than `UАМ`.
    #[must_use]
    pub fn transliterate(plate: &str) -> String {
        let mut converted = Self::normalize(plate);
        for (latin, cyrillic) in LATIN_GROUPS {
            converted = converted.replace(latin, cyrillic);
        }
        converted
            .chars()
            .map(|c| {
                LATIN_LETTERS
                    .iter()
                    .find(|(latin, _)| *latin == c)
                    .map_or(c, |(_, cyrillic)| *cyrillic)
            })
            .collect()
    }

    fn lookup(&self, plate: &str) -> Result<(MatchMethod, Vec<Collateral>), EngineError> {
        let exact = self.collateral.find_by_license_plate(plate)?;
        if !exact.is_empty() {
            return Ok((MatchMethod::LicensePlateExact, exact));
        }

        let normalized = Self::normalize(plate);
        let hits = self.collateral.find_by_normalized_plate(&normalized)?;
        if !hits.is_empty() {
            return Ok((MatchMethod::LicensePlateNormalized, hits));
        }

        let transliterated = Self::transliterate(plate);
        if transliterated != normalized {
            let hits = self.collateral.find_by_normalized_plate(&transliterated)?;
            if !hits.is_empty() {
                tracing::debug!(plate, %transliterated, "Cross-script plate match");
                return Ok((MatchMethod::LicensePlateTransliterated, hits));
            }
        }

        Ok((MatchMethod::LicensePlateNormalized, Vec::new()))
    }
}

impl DetectionEngine for LicensePlateEngine {
    fn name(&self) -> &'static str {
        ENGINE_NAME
    }

    fn display_name(&self) -> &'static str {
        "License Plate Engine"
    }

    fn detect(
        &self,
        description: &str,
        _amount: Decimal,
    ) -> Result<Vec<CandidateSuggestion>, EngineError> {
        let mut suggestions = Vec::new();
        let mut seen: Vec<String> = Vec::new();

        for plate in extract_plates(description) {
            let key = Self::normalize(&plate);
            if seen.contains(&key) {
                continue;
            }
            seen.push(key);

            let confidence = grade_plate(&plate);
            let (method, hits) = self.lookup(&plate)?;

            for collateral in hits {
                let Some(loan) = self.loans.find_by_id(collateral.loan_id)? else {
                    continue;
                };
                if !loan.is_active() {
                    continue;
                }
                let Some(customer) = self.customers.find_by_id(collateral.customer_id)? else {
                    continue;
                };
                let reason = match method {
                    MatchMethod::LicensePlateTransliterated => format!(
                        "License plate {plate} matches {} across scripts",
                        collateral.license_plate
                    ),
                    _ => format!("License plate {plate} found in description"),
                };
                suggestions.push(
                    loan_candidate(ENGINE_NAME, &loan, &customer, method, confidence)
                        .with_matched_data(plate.clone())
                        .with_vehicle_info(collateral.vehicle_info())
                        .with_reason(reason),
                );
            }
        }

        Ok(suggestions)
    }

    fn self_test(&self) -> SelfTestReport {
        let samples = [
            "Payment for vehicle 6045УАМ loan installment",
            "Car with license 25-42 УНГ monthly payment",
            "Vehicle ABC-1234 loan payment received",
            "Monthly payment 1234АБВ vehicle loan",
        ];
        let cases = samples
            .iter()
            .map(|input| {
                let plates = extract_plates(input);
                let grades: Vec<u8> = plates.iter().map(|p| grade_plate(p)).collect();
                SelfTestCase {
                    input: (*input).to_string(),
                    detected: !plates.is_empty(),
                    detail: format!("plates={plates:?} confidence={grades:?}"),
                }
            })
            .collect();
        SelfTestReport::from_cases(ENGINE_NAME, cases, SELF_TEST_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::records::{Customer, Loan, LoanStatus};
    use crate::core::types::{CustomerId, LoanId};
    use crate::directory::store::InMemoryDirectory;
    use rust_decimal_macros::dec;

    fn engine_with(plates: &[(&str, LoanStatus)]) -> LicensePlateEngine {
        let mut dir = InMemoryDirectory::new();
        dir.add_customer(Customer {
            id: CustomerId(1),
            first_name: "Saraa".to_string(),
            last_name: "Bold".to_string(),
            phone_primary: None,
            register_number: None,
        });
        for (i, (plate, status)) in plates.iter().enumerate() {
            let id = u64::try_from(i).unwrap() + 1;
            dir.add_loan(Loan {
                id: LoanId(id),
                loan_number: format!("LN-{id:06}"),
                customer_id: CustomerId(1),
                status: *status,
                current_balance: dec!(1000000),
                product_category: "auto".to_string(),
            });
            dir.add_collateral(Collateral {
                id,
                license_plate: (*plate).to_string(),
                loan_id: LoanId(id),
                customer_id: CustomerId(1),
                vehicle_make: String::new(),
                vehicle_model: String::new(),
            });
        }
        let dir = Arc::new(dir);
        LicensePlateEngine::new(dir.clone(), dir.clone(), dir)
    }

    #[test]
    fn test_normalize_and_transliterate() {
        assert_eq!(LicensePlateEngine::normalize("25-42 унг"), "2542УНГ");
        assert_eq!(LicensePlateEngine::transliterate("6045 uam"), "6045УАМ");
        assert_eq!(LicensePlateEngine::transliterate("2542UNG"), "2542УНГ");
        assert_eq!(LicensePlateEngine::transliterate("1234KMO"), "1234КМО");
    }

    #[test]
    fn test_confidence_follows_format() {
        let engine = engine_with(&[
            ("25-42 УНГ", LoanStatus::Active),
            ("6045УАМ", LoanStatus::Active),
        ]);
        let found = engine
            .detect("Car 25-42 УНГ and 6045УАМ", dec!(100))
            .unwrap();
        assert_eq!(found.len(), 2);
        let confidences: Vec<u8> = found.iter().map(|s| s.confidence).collect();
        assert!(confidences.contains(&90));
        assert!(confidences.contains(&85));
        assert!(found.iter().all(|s| (80..=90).contains(&s.confidence)));
    }

    #[test]
    fn test_normalized_and_cross_script_fallbacks() {
        let engine = engine_with(&[("2542УНГ", LoanStatus::Active)]);
        let found = engine.detect("Payment 25-42 УНГ", dec!(100)).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].method, MatchMethod::LicensePlateNormalized);

        let engine = engine_with(&[("6045УАМ", LoanStatus::Active)]);
        let found = engine.detect("Payment 6045UAM", dec!(100)).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].method, MatchMethod::LicensePlateTransliterated);
    }

    #[test]
    fn test_inactive_loans_dropped() {
        let engine = engine_with(&[("6045УАМ", LoanStatus::Closed)]);
        assert!(engine.detect("6045УАМ", dec!(100)).unwrap().is_empty());
    }

    #[test]
    fn test_self_test_passes() {
        let report = engine_with(&[]).self_test();
        assert!(report.passed, "{report:?}");
        assert!((report.score - 100.0).abs() < f64::EPSILON);
    }
}
