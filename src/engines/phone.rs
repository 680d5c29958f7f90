use std::sync::Arc;

use rust_decimal::Decimal;

use crate::core::records::{Collateral, Customer, Loan};
use crate::core::suggestion::CandidateSuggestion;
use crate::core::types::MatchMethod;
use crate::directory::{CollateralRepository, CustomerDirectory, LoanRepository};
use crate::engines::patterns::{extract_phones, extract_plates};
use crate::engines::{DetectionEngine, EngineError, SelfTestCase, SelfTestReport};
use crate::utils::validation::normalize_plate;

pub const ENGINE_NAME: &str = "phone_priority";

/// Confidence of a phone-number hit
pub const PHONE_CONFIDENCE: u8 = 95;

/// Confidence of a plate hit found by this engine
pub const PLATE_CONFIDENCE: u8 = 85;

const SELF_TEST_THRESHOLD: f64 = 75.0;

/// Resolves phone numbers, then license plates, to active loans.
///
/// Every hit becomes its own candidate; the same loan can appear once for
/// the phone and once for the plate.
pub struct PhonePriorityEngine {
    customers: Arc<dyn CustomerDirectory>,
    loans: Arc<dyn LoanRepository>,
    collateral: Arc<dyn CollateralRepository>,
}

impl PhonePriorityEngine {
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

    fn phone_suggestions(&self, phone: &str) -> Result<Vec<CandidateSuggestion>, EngineError> {
        let mut suggestions = Vec::new();
        for customer in self.customers.find_by_phone(phone)? {
            for loan in self.loans.active_loans_for(customer.id)? {
                let method = MatchMethod::ExactPhoneMatch;
                let candidate =
                    loan_candidate(ENGINE_NAME, &loan, &customer, method, PHONE_CONFIDENCE);
                suggestions.push(
                    candidate
                        .with_matched_data(phone)
                        .with_reason(format!("Phone number {phone} found in description")),
                );
            }
        }
        Ok(suggestions)
    }

    fn plate_suggestions(&self, plate: &str) -> Result<Vec<CandidateSuggestion>, EngineError> {
        let (method, hits) = self.lookup_plate(plate)?;
        let mut suggestions = Vec::new();

        for collateral in hits {
            let Some(loan) = self.loans.find_by_id(collateral.loan_id)? else {
                continue;
            };
            // Inactive loans are dropped
            if !loan.is_active() {
                continue;
            }
            let Some(customer) = self.customers.find_by_id(collateral.customer_id)? else {
                continue;
            };
            suggestions.push(
                loan_candidate(ENGINE_NAME, &loan, &customer, method, PLATE_CONFIDENCE)
                    .with_matched_data(plate)
                    .with_vehicle_info(collateral.vehicle_info())
                    .with_reason(format!("License plate {plate} found in description")),
            );
        }
        Ok(suggestions)
    }

    fn lookup_plate(&self, plate: &str) -> Result<(MatchMethod, Vec<Collateral>), EngineError> {
        let exact = self.collateral.find_by_license_plate(plate)?;
        if !exact.is_empty() {
            return Ok((MatchMethod::LicensePlateExact, exact));
        }
        let normalized = self
            .collateral
            .find_by_normalized_plate(&normalize_plate(plate))?;
        Ok((MatchMethod::LicensePlateNormalized, normalized))
    }
}

/// Candidate pointing at `loan`, owned by `customer`
pub(crate) fn loan_candidate(
    engine: &str,
    loan: &Loan,
    customer: &Customer,
    method: MatchMethod,
    confidence: u8,
) -> CandidateSuggestion {
    CandidateSuggestion::new(engine, method, confidence)
        .with_loan(loan.id, loan.loan_number.clone())
        .with_customer(Some(customer.id), customer.full_name())
        .with_amount(loan.current_balance)
}

impl DetectionEngine for PhonePriorityEngine {
    fn name(&self) -> &'static str {
        ENGINE_NAME
    }

    fn display_name(&self) -> &'static str {
        "Phone Priority Engine"
    }

    fn detect(
        &self,
        description: &str,
        _amount: Decimal,
    ) -> Result<Vec<CandidateSuggestion>, EngineError> {
        let mut suggestions = Vec::new();

        for phone in extract_phones(description) {
            suggestions.extend(self.phone_suggestions(&phone)?);
        }
        for plate in extract_plates(description) {
            suggestions.extend(self.plate_suggestions(&plate)?);
        }

        Ok(suggestions)
    }

    fn self_test(&self) -> SelfTestReport {
        let samples = [
            "6045УАМ 88980800",
            "Loan repayment from 99112233",
            "Vehicle 25-42 УНГ monthly payment",
            "Monthly payment 1234АБВ vehicle loan",
        ];
        let cases = samples
            .iter()
            .map(|input| {
                let phones = extract_phones(input);
                let plates = extract_plates(input);
                SelfTestCase {
                    input: (*input).to_string(),
                    detected: !phones.is_empty() || !plates.is_empty(),
                    detail: format!("phones={phones:?} plates={plates:?}"),
                }
            })
            .collect();
        SelfTestReport::from_cases(ENGINE_NAME, cases, SELF_TEST_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::records::LoanStatus;
    use crate::core::types::{CustomerId, LoanId, TargetId};
    use crate::directory::store::InMemoryDirectory;
    use crate::directory::CollaboratorError;
    use rust_decimal_macros::dec;

    fn directory() -> Arc<InMemoryDirectory> {
        let mut dir = InMemoryDirectory::new();
        dir.add_customer(Customer {
            id: CustomerId(1),
            first_name: "Bat".to_string(),
            last_name: "Dorj".to_string(),
            phone_primary: Some("88980800".to_string()),
            register_number: None,
        });
        dir.add_loan(Loan {
            id: LoanId(10),
            loan_number: "LN-2024-000123".to_string(),
            customer_id: CustomerId(1),
            status: LoanStatus::Active,
            current_balance: dec!(4500000),
            product_category: "auto".to_string(),
        });
        dir.add_collateral(Collateral {
            id: 1,
            license_plate: "6045УАМ".to_string(),
            loan_id: LoanId(10),
            customer_id: CustomerId(1),
            vehicle_make: "Toyota".to_string(),
            vehicle_model: "Prius".to_string(),
        });
        Arc::new(dir)
    }

    fn engine(dir: Arc<InMemoryDirectory>) -> PhonePriorityEngine {
        PhonePriorityEngine::new(dir.clone(), dir.clone(), dir)
    }

    #[test]
    fn test_phone_and_plate_hits() {
        let engine = engine(directory());
        let found = engine.detect("6045УАМ 88980800", dec!(500000)).unwrap();
        assert_eq!(found.len(), 2);

        let phone = &found[0];
        assert_eq!(phone.matched_data.as_deref(), Some("88980800"));
        assert_eq!(phone.confidence, PHONE_CONFIDENCE);
        assert_eq!(phone.method, MatchMethod::ExactPhoneMatch);
        assert_eq!(phone.target, Some(TargetId::Loan(LoanId(10))));

        let plate = &found[1];
        assert_eq!(plate.matched_data.as_deref(), Some("6045УАМ"));
        assert_eq!(plate.confidence, PLATE_CONFIDENCE);
        assert_eq!(plate.method, MatchMethod::LicensePlateExact);
        assert_eq!(plate.vehicle_info.as_deref(), Some("Toyota Prius"));
    }

    #[test]
    fn test_no_records_means_no_suggestions() {
        let engine = engine(Arc::new(InMemoryDirectory::new()));
        assert!(engine
            .detect("6045УАМ 88980800", dec!(500000))
            .unwrap()
            .is_empty());
        assert!(engine
            .detect("Unrelated noise text xyz", dec!(10))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_detect_is_idempotent() {
        let engine = engine(directory());
        let first = engine.detect("6045УАМ 88980800", dec!(500000)).unwrap();
        let second = engine.detect("6045УАМ 88980800", dec!(500000)).unwrap();
        assert_eq!(first, second);
    }

    struct Offline;

    impl CustomerDirectory for Offline {
        fn find_by_phone(&self, _phone: &str) -> Result<Vec<Customer>, CollaboratorError> {
            Err(CollaboratorError::unavailable("customer directory", "timeout"))
        }
        fn find_by_id(&self, _id: CustomerId) -> Result<Option<Customer>, CollaboratorError> {
            Err(CollaboratorError::unavailable("customer directory", "timeout"))
        }
        fn find_by_register_digits(
            &self,
            _digits: &str,
        ) -> Result<Vec<Customer>, CollaboratorError> {
            Err(CollaboratorError::unavailable("customer directory", "timeout"))
        }
        fn find_by_name(&self, _name: &str) -> Result<Vec<Customer>, CollaboratorError> {
            Err(CollaboratorError::unavailable("customer directory", "timeout"))
        }
    }

    #[test]
    fn test_collaborator_failure_is_reported() {
        let dir = directory();
        let engine = PhonePriorityEngine::new(Arc::new(Offline), dir.clone(), dir);
        let err = engine.detect("call 88980800", dec!(1)).unwrap_err();
        assert!(matches!(err, EngineError::CollaboratorUnavailable(_)));
    }

    #[test]
    fn test_self_test_passes() {
        let report = engine(directory()).self_test();
        assert!(report.passed, "{report:?}");
        assert_eq!(report.cases.len(), 4);
    }
}
