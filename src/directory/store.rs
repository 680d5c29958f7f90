use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use thiserror::Error;

use crate::core::records::{Collateral, Customer, GlAccounts, Loan, TaggedTransaction};
use crate::core::types::{CustomerId, LoanId, TenantId};
use crate::directory::{
    CollaboratorError, CollateralRepository, CustomerDirectory, GlConfiguration,
    HistoricalTransactionFeed, LoanRepository,
};
use crate::utils::transliteration::latin_key;
use crate::utils::validation::normalize_plate;

/// Digits in a register number
pub const REGISTER_DIGITS: usize = 8;

/// Shortest name fragment that may match inside a name rather than at its start
const NAME_CONTAINS_MIN: usize = 5;

/// Shortest name fragment looked up at all
const NAME_MIN: usize = 3;

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("Failed to read directory: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse directory: {0}")]
    ParseError(#[from] serde_json::Error),
}

/// Directory document version for compatibility checking
pub const DIRECTORY_VERSION: &str = "1.0.0";

/// Serializable directory format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryData {
    pub version: String,
    pub created_at: String,
    #[serde(default)]
    pub customers: Vec<Customer>,
    #[serde(default)]
    pub loans: Vec<Loan>,
    #[serde(default)]
    pub collateral: Vec<Collateral>,
    /// Tenant id -> GL accounts
    #[serde(default)]
    pub gl_accounts: BTreeMap<String, GlAccounts>,
    #[serde(default)]
    pub tagged_history: Vec<TaggedTransaction>,
}

/// In-memory customer, loan, collateral and GL directory with lookup indexes
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    customers: Vec<Customer>,
    loans: Vec<Loan>,
    collateral: Vec<Collateral>,
    gl_accounts: BTreeMap<String, GlAccounts>,
    tagged_history: Vec<TaggedTransaction>,

    /// Index: phone -> indices into customers
    phone_to_customers: HashMap<String, Vec<usize>>,

    /// Index: trailing register digits -> indices into customers
    register_to_customers: HashMap<String, Vec<usize>>,

    /// Latin keys of (first, last) name, parallel to `customers`
    name_keys: Vec<(String, String)>,

    customer_index: HashMap<CustomerId, usize>,
    loan_index: HashMap<LoanId, usize>,

    /// Index: customer -> indices into loans
    customer_to_loans: HashMap<CustomerId, Vec<usize>>,

    /// Index: uppercased plate -> indices into collateral
    plate_to_collateral: HashMap<String, Vec<usize>>,

    /// Index: normalized plate -> indices into collateral
    normalized_plate_to_collateral: HashMap<String, Vec<usize>>,
}

impl InMemoryDirectory {
    /// Create an empty directory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a directory from a JSON file
    pub fn load_from_file(path: &Path) -> Result<Self, DirectoryError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse a directory from a JSON string
    pub fn from_json(json: &str) -> Result<Self, DirectoryError> {
        let data: DirectoryData = serde_json::from_str(json)?;

        // Version check (warn but don't fail)
        if data.version != DIRECTORY_VERSION {
            tracing::warn!(
                expected = DIRECTORY_VERSION,
                found = %data.version,
                "Directory version mismatch"
            );
        }

        let mut directory = Self::new();
        for customer in data.customers {
            directory.add_customer(customer);
        }
        for loan in data.loans {
            directory.add_loan(loan);
        }
        for collateral in data.collateral {
            directory.add_collateral(collateral);
        }
        for (tenant, accounts) in data.gl_accounts {
            directory.set_gl_accounts(TenantId::new(tenant), accounts);
        }
        directory.tagged_history = data.tagged_history;

        tracing::info!(
            customers = directory.customers.len(),
            loans = directory.loans.len(),
            collateral = directory.collateral.len(),
            history = directory.tagged_history.len(),
            "Loaded directory"
        );

        Ok(directory)
    }

    /// Serialize the directory to pretty JSON
    pub fn to_json(&self) -> Result<String, DirectoryError> {
        let data = DirectoryData {
            version: DIRECTORY_VERSION.to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            customers: self.customers.clone(),
            loans: self.loans.clone(),
            collateral: self.collateral.clone(),
            gl_accounts: self.gl_accounts.clone(),
            tagged_history: self.tagged_history.clone(),
        };
        Ok(serde_json::to_string_pretty(&data)?)
    }

    pub fn add_customer(&mut self, customer: Customer) {
        let index = self.customers.len();
        if let Some(phone) = &customer.phone_primary {
            self.phone_to_customers
                .entry(phone.trim().to_string())
                .or_default()
                .push(index);
        }
        if let Some(digits) = customer.register_number.as_deref().and_then(register_digits) {
            self.register_to_customers
                .entry(digits)
                .or_default()
                .push(index);
        }
        self.name_keys
            .push((latin_key(&customer.first_name), latin_key(&customer.last_name)));
        self.customer_index.insert(customer.id, index);
        self.customers.push(customer);
    }

    pub fn add_loan(&mut self, loan: Loan) {
        let index = self.loans.len();
        self.loan_index.insert(loan.id, index);
        self.customer_to_loans
            .entry(loan.customer_id)
            .or_default()
            .push(index);
        self.loans.push(loan);
    }

    pub fn add_collateral(&mut self, collateral: Collateral) {
        let index = self.collateral.len();
        self.plate_to_collateral
            .entry(collateral.license_plate.trim().to_uppercase())
            .or_default()
            .push(index);
        self.normalized_plate_to_collateral
            .entry(normalize_plate(&collateral.license_plate))
            .or_default()
            .push(index);
        self.collateral.push(collateral);
    }

    pub fn set_gl_accounts(&mut self, tenant: TenantId, accounts: GlAccounts) {
        self.gl_accounts.insert(tenant.0, accounts);
    }

    pub fn add_tagged(&mut self, transaction: TaggedTransaction) {
        self.tagged_history.push(transaction);
    }

    #[must_use]
    pub fn customer_count(&self) -> usize {
        self.customers.len()
    }

    #[must_use]
    pub fn loan_count(&self) -> usize {
        self.loans.len()
    }

    fn customers_at(&self, indices: Option<&Vec<usize>>) -> Vec<Customer> {
        indices
            .map(|idxs| idxs.iter().map(|&i| self.customers[i].clone()).collect())
            .unwrap_or_default()
    }

    fn collateral_at(&self, indices: Option<&Vec<usize>>) -> Vec<Collateral> {
        indices
            .map(|idxs| idxs.iter().map(|&i| self.collateral[i].clone()).collect())
            .unwrap_or_default()
    }
}

impl CustomerDirectory for InMemoryDirectory {
    fn find_by_phone(&self, phone: &str) -> Result<Vec<Customer>, CollaboratorError> {
        Ok(self.customers_at(self.phone_to_customers.get(phone.trim())))
    }

    fn find_by_id(&self, id: CustomerId) -> Result<Option<Customer>, CollaboratorError> {
        Ok(self
            .customer_index
            .get(&id)
            .map(|&i| self.customers[i].clone()))
    }

    fn find_by_register_digits(&self, digits: &str) -> Result<Vec<Customer>, CollaboratorError> {
        Ok(self.customers_at(self.register_to_customers.get(digits.trim())))
    }

    fn find_by_name(&self, name: &str) -> Result<Vec<Customer>, CollaboratorError> {
        let key = latin_key(name);
        let len = key.chars().count();
        if len < NAME_MIN {
            return Ok(Vec::new());
        }
        let hit = |candidate: &str| {
            candidate.starts_with(&key) || (len >= NAME_CONTAINS_MIN && candidate.contains(&key))
        };
        Ok(self
            .name_keys
            .iter()
            .enumerate()
            .filter(|(_, (first, last))| hit(first) || hit(last))
            .map(|(i, _)| self.customers[i].clone())
            .collect())
    }
}

/// The trailing eight digits of a register number, if it has them
fn register_digits(register: &str) -> Option<String> {
    let digits: String = register.chars().filter(char::is_ascii_digit).collect();
    (digits.len() >= REGISTER_DIGITS).then(|| digits[digits.len() - REGISTER_DIGITS..].to_string())
}

impl LoanRepository for InMemoryDirectory {
    fn active_loans_for(&self, customer: CustomerId) -> Result<Vec<Loan>, CollaboratorError> {
        Ok(self
            .customer_to_loans
            .get(&customer)
            .map(|idxs| {
                idxs.iter()
                    .map(|&i| &self.loans[i])
                    .filter(|loan| loan.is_active())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn find_by_id(&self, id: LoanId) -> Result<Option<Loan>, CollaboratorError> {
        Ok(self.loan_index.get(&id).map(|&i| self.loans[i].clone()))
    }
}

impl CollateralRepository for InMemoryDirectory {
    fn find_by_license_plate(&self, plate: &str) -> Result<Vec<Collateral>, CollaboratorError> {
        let key = plate.trim().to_uppercase();
        Ok(self.collateral_at(self.plate_to_collateral.get(&key)))
    }

    fn find_by_normalized_plate(
        &self,
        normalized: &str,
    ) -> Result<Vec<Collateral>, CollaboratorError> {
        let key = normalize_plate(normalized);
        if key.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.collateral_at(self.normalized_plate_to_collateral.get(&key)))
    }
}

impl GlConfiguration for InMemoryDirectory {
    fn for_tenant(&self, tenant: &TenantId) -> Result<Option<GlAccounts>, CollaboratorError> {
        Ok(self.gl_accounts.get(&tenant.0).cloned())
    }
}

impl HistoricalTransactionFeed for InMemoryDirectory {
    fn with_related_account_tag(&self) -> Result<Vec<TaggedTransaction>, CollaboratorError> {
        Ok(self
            .tagged_history
            .iter()
            .filter(|t| !t.related_account.trim().is_empty() && !t.description.trim().is_empty())
            .cloned()
            .collect())
    }
}
