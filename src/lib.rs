//! # loan-matcher
//!
//! Rank candidate loans and GL accounts for raw bank transaction descriptions.
//!
//! During bank reconciliation every statement line has to be tied to the loan
//! (or GL account) it belongs to. Descriptions are free text typed by payers
//! and clerks, so the same repayment can read `6045УАМ 88980800`,
//! `Car 6045 uam payment` or `88980800 loan`. `loan-matcher` runs a set of
//! independent detection engines over the text, weighs their candidates and
//! returns a ranked list of suggestions for a person to confirm.
//!
//! ## Features
//!
//! - **Phone priority**: 8-digit phone numbers resolved to the owner's active loans
//! - **License plates**: graded plate formats, separator-insensitive and
//!   cross-script (Latin typed for Cyrillic) lookups against loan collateral
//! - **Register numbers**: national IDs such as `ЧЛ74090619`, tolerant of
//!   Latin look-alikes typed for the Cyrillic prefix
//! - **Mongolian names**: `Б.Номин-Эрдэнэ` style initial-and-name mentions,
//!   matched across scripts
//! - **Disbursement patterns**: bilingual payout phrases mapped to the
//!   tenant's disbursement GL account
//! - **Recurring patterns**: description → account mappings learned from
//!   tagged history, with exact and word-prefix matching
//! - **Calibration**: user feedback turns into advisory confidence adjustments
//!   and engine weight proposals
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use loan_matcher::{Collaborators, InMemoryDirectory, MatchMode, MatcherConfig};
//! use loan_matcher::SmartSuggestionService;
//! use rust_decimal::Decimal;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let directory = InMemoryDirectory::load_from_file("directory.json".as_ref())?;
//! let service = SmartSuggestionService::build_default(
//!     &Collaborators::from_directory(Arc::new(directory)),
//!     &MatcherConfig::default(),
//! );
//!
//! let response = service
//!     .get_suggestions("EB-Б.Ням-Очир-д зээл олгов.", Decimal::from(2_000_000), MatchMode::Auto)
//!     .await?;
//! if let Some(top) = response.suggestions.first() {
//!     println!("{}: {}% ({})", top.target_label, top.match_percentage, top.confidence_tier);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`core`]: Suggestion records, identifiers and collaborator records
//! - [`directory`]: Collaborator traits and the in-memory directory
//! - [`engines`]: The detection engines and their pattern tables
//! - [`matching`]: Registry, confidence calculator and suggestion service
//! - [`config`]: TOML configuration
//! - [`cli`]: Command-line interface implementation
//! - [`web`]: HTTP API

pub mod cli;
pub mod config;
pub mod core;
pub mod directory;
pub mod engines;
pub mod matching;
pub mod utils;
pub mod web;

// Re-export commonly used types for convenience
pub use config::MatcherConfig;
pub use core::suggestion::{CandidateSuggestion, WeightedSuggestion};
pub use core::types::*;
pub use directory::store::InMemoryDirectory;
pub use directory::Collaborators;
pub use engines::DetectionEngine;
pub use matching::{
    ConfidenceCalculator, EngineRegistry, RankedSuggestion, SmartSuggestionService,
    SuggestionResponse,
};
