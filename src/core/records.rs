use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::types::{CustomerId, LoanId};

/// A customer as seen through the external customer directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub first_name: String,
    pub last_name: String,
    /// Primary phone number, digits only
    #[serde(default)]
    pub phone_primary: Option<String>,
    /// National register number, two letters and eight digits (`ЧЛ74090619`)
    #[serde(default)]
    pub register_number: Option<String>,
}

impl Customer {
    /// "First Last", trimmed when either part is empty
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Lifecycle status of a loan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Pending,
    Active,
    Closed,
    WrittenOff,
}

/// A loan as seen through the external loan repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub loan_number: String,
    pub customer_id: CustomerId,
    pub status: LoanStatus,
    pub current_balance: Decimal,
    /// Product category, e.g. "auto" or "consumer"
    #[serde(default)]
    pub product_category: String,
}

impl Loan {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == LoanStatus::Active
    }
}

/// A vehicle pledged as collateral against a loan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collateral {
    pub id: u64,
    pub license_plate: String,
    pub loan_id: LoanId,
    pub customer_id: CustomerId,
    #[serde(default)]
    pub vehicle_make: String,
    #[serde(default)]
    pub vehicle_model: String,
}

impl Collateral {
    /// "Make Model", empty when neither is recorded
    #[must_use]
    pub fn vehicle_info(&self) -> String {
        format!("{} {}", self.vehicle_make, self.vehicle_model)
            .trim()
            .to_string()
    }
}

/// A general-ledger account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlAccount {
    pub id: u64,
    pub code: String,
    pub name: String,
}

/// Per-tenant GL accounts used by the loan bridge
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlAccounts {
    #[serde(default)]
    pub disbursement_account: Option<GlAccount>,
    #[serde(default)]
    pub receivable_account: Option<GlAccount>,
}

/// A historical bank transaction previously confirmed against an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedTransaction {
    pub description: String,
    pub related_account: String,
}

impl TaggedTransaction {
    pub fn new(description: impl Into<String>, related_account: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            related_account: related_account.into(),
        }
    }
}
