//! Ensemble orchestration, scoring and calibration.
//!
//! - [`EngineRegistry`]: name → engine map; runs every enabled engine in
//!   isolation and merges their candidates
//! - [`ConfidenceCalculator`]: engine weights, method bonuses, data-quality
//!   factor, ensemble statistics and feedback calibration
//! - [`SmartSuggestionService`]: the caller-facing entry point (validation,
//!   cache, ranking, presentation metadata, feedback)
//!
//! ## Scoring
//!
//! Each candidate's final confidence is
//!
//! ```text
//! round(clamp((base × engine_weight + method_bonus) × quality_factor, 1, 99))
//! ```
//!
//! where the quality factor rewards candidates that carry a customer, a loan
//! number and an amount, and lies in `[0.7, 1.3]`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use loan_matcher::config::MatcherConfig;
//! use loan_matcher::core::types::MatchMode;
//! use loan_matcher::directory::{store::InMemoryDirectory, Collaborators};
//! use loan_matcher::matching::SmartSuggestionService;
//! use rust_decimal::Decimal;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let directory = InMemoryDirectory::load_from_file("directory.json".as_ref())?;
//! let collaborators = Collaborators::from_directory(Arc::new(directory));
//! let service = SmartSuggestionService::build_default(&collaborators, &MatcherConfig::default());
//!
//! let response = service
//!     .get_suggestions("6045УАМ 88980800", Decimal::from(500_000), MatchMode::Auto)
//!     .await?;
//! for s in &response.suggestions {
//!     println!("{} {} {}%", s.rank, s.target_label, s.match_percentage);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod confidence;
pub mod registry;
pub mod service;

pub use confidence::{CalibrationSnapshot, ConfidenceCalculator, EnsembleResult, WeightProposal};
pub use registry::EngineRegistry;
pub use service::{RankedSuggestion, SmartSuggestionService, SuggestionError, SuggestionResponse};
