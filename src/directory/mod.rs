//! Interfaces to the systems that own customers, loans, collateral, GL
//! configuration and transaction history.
//!
//! The matching engines only ever talk to these traits. A collaborator that
//! cannot answer returns [`CollaboratorError`]; the calling engine turns that
//! into an empty result for its run and the request carries on.
//!
//! [`InMemoryDirectory`](store::InMemoryDirectory) implements every trait from
//! a single JSON document and backs the CLI, the web server and the tests.

pub mod store;

use std::sync::Arc;

use thiserror::Error;

use crate::core::records::{Collateral, Customer, GlAccounts, Loan, TaggedTransaction};
use crate::core::types::{CustomerId, LoanId, TenantId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("{source_name} unavailable: {reason}")]
    Unavailable { source_name: String, reason: String },
}

impl CollaboratorError {
    pub fn unavailable(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }
}

pub trait CustomerDirectory: Send + Sync {
    /// Customers whose primary phone is exactly `phone`
    fn find_by_phone(&self, phone: &str) -> Result<Vec<Customer>, CollaboratorError>;

    fn find_by_id(&self, id: CustomerId) -> Result<Option<Customer>, CollaboratorError>;

    /// Customers whose register number ends in the eight `digits`
    fn find_by_register_digits(&self, digits: &str) -> Result<Vec<Customer>, CollaboratorError>;

    /// Customers whose first or last name starts with `name`, compared by
    /// [`latin_key`](crate::utils::transliteration::latin_key) so either script
    /// matches. Fragments of five or more characters may also match inside a
    /// name; shorter than three never match.
    fn find_by_name(&self, name: &str) -> Result<Vec<Customer>, CollaboratorError>;
}

pub trait LoanRepository: Send + Sync {
    /// Active loans owned by `customer`
    fn active_loans_for(&self, customer: CustomerId) -> Result<Vec<Loan>, CollaboratorError>;

    /// Any loan by id, regardless of status
    fn find_by_id(&self, id: LoanId) -> Result<Option<Loan>, CollaboratorError>;
}

pub trait CollateralRepository: Send + Sync {
    /// Case-insensitive exact plate lookup
    fn find_by_license_plate(&self, plate: &str) -> Result<Vec<Collateral>, CollaboratorError>;

    /// Lookup on the plate with separators stripped, see
    /// [`normalize_plate`](crate::utils::validation::normalize_plate)
    fn find_by_normalized_plate(
        &self,
        normalized: &str,
    ) -> Result<Vec<Collateral>, CollaboratorError>;
}

pub trait GlConfiguration: Send + Sync {
    /// `Ok(None)` when the tenant has no GL configuration at all
    fn for_tenant(&self, tenant: &TenantId) -> Result<Option<GlAccounts>, CollaboratorError>;
}

pub trait HistoricalTransactionFeed: Send + Sync {
    /// Every historical transaction that carries a confirmed related-account tag
    fn with_related_account_tag(&self) -> Result<Vec<TaggedTransaction>, CollaboratorError>;
}

/// The collaborator handles an engine set is built from
#[derive(Clone)]
pub struct Collaborators {
    pub customers: Arc<dyn CustomerDirectory>,
    pub loans: Arc<dyn LoanRepository>,
    pub collateral: Arc<dyn CollateralRepository>,
    pub gl: Arc<dyn GlConfiguration>,
    pub history: Arc<dyn HistoricalTransactionFeed>,
}

impl Collaborators {
    /// Use one in-memory directory for every collaborator
    #[must_use]
    pub fn from_directory(directory: Arc<store::InMemoryDirectory>) -> Self {
        Self {
            customers: directory.clone(),
            loans: directory.clone(),
            collateral: directory.clone(),
            gl: directory.clone(),
            history: directory,
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
