//! Core data types shared by the engines, the calculator and the service.
//!
//! - [`CandidateSuggestion`]: one engine's proposed association for a transaction
//! - [`WeightedSuggestion`]: a candidate plus the factors applied by the calculator
//! - [`TargetId`]: the identity suggestions are deduplicated on (loan or GL account)
//! - [`Customer`], [`Loan`], [`Collateral`], [`GlAccounts`]: records read from
//!   the external collaborators
//! - [`MatchMethod`], [`MatchMode`], [`ConfidenceTier`]: classification types
//!
//! ## Targets
//!
//! | Engine              | Target kind | Example          |
//! |---------------------|-------------|------------------|
//! | `phone_priority`    | loan        | `loan:42`        |
//! | `license_plate`     | loan        | `loan:42`        |
//! | `loan_disbursement` | account     | `account:120101` |
//! | `recurring_pattern` | account     | `account:6100`   |
//!
//! Two suggestions with the same target are the same proposal; only the more
//! confident one survives ranking.
//!
//! [`CandidateSuggestion`]: suggestion::CandidateSuggestion
//! [`WeightedSuggestion`]: suggestion::WeightedSuggestion
//! [`TargetId`]: types::TargetId
//! [`Customer`]: records::Customer
//! [`Loan`]: records::Loan
//! [`Collateral`]: records::Collateral
//! [`GlAccounts`]: records::GlAccounts
//! [`MatchMethod`]: types::MatchMethod
//! [`MatchMode`]: types::MatchMode
//! [`ConfidenceTier`]: types::ConfidenceTier

pub mod records;
pub mod suggestion;
pub mod types;
