//! Command-line interface for loan-matcher.
//!
//! This module implements the CLI using clap. Available commands:
//!
//! - **suggest**: Rank loan and GL-account matches for one transaction
//! - **quick**: Autocomplete against learned recurring patterns
//! - **self-test**: Run every engine's built-in self-test
//! - **patterns**: Export or summarise the learned pattern table
//! - **serve**: Start the HTTP API
//!
//! ## Usage
//!
//! ```text
//! # Suggest matches for a repayment
//! loan-matcher suggest "6045УАМ 88980800" --amount 500000 --data directory.json
//!
//! # JSON output for scripting
//! loan-matcher suggest "EB-Б.Ням-Очир-д зээл олгов." --amount 2000000 \
//!     --mode disbursement --data directory.json --format json
//!
//! # Autocomplete
//! loan-matcher quick "office" --data directory.json
//!
//! # Start the API
//! loan-matcher serve --data directory.json --port 8080
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::config::MatcherConfig;
use crate::directory::store::InMemoryDirectory;
use crate::directory::Collaborators;
use crate::matching::SmartSuggestionService;

pub mod patterns;
pub mod quick;
pub mod suggest;

#[derive(Parser)]
#[command(name = "loan-matcher")]
#[command(version)]
#[command(about = "Rank candidate loan and GL-account matches for bank transaction descriptions")]
#[command(
    long_about = "loan-matcher runs a set of detection engines (phone numbers, license plates, disbursement phrases, learned recurring patterns) over a bank transaction description and returns a ranked list of suggested loans or GL accounts.\n\nEvery suggestion carries a calibrated match percentage and a confidence tier; low-confidence suggestions are meant to be confirmed by a person."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Suggest matches for a bank transaction
    Suggest(suggest::SuggestArgs),

    /// Autocomplete a partial description from learned patterns
    Quick(quick::QuickArgs),

    /// Run every engine's self-test
    SelfTest(self_test::SelfTestArgs),

    /// Inspect the learned recurring-pattern table
    Patterns(patterns::PatternsArgs),

    /// Start the web server
    Serve(ServeArgs),
}

/// Where the collaborator data and configuration come from
#[derive(clap::Args, Clone, Debug)]
pub struct DataArgs {
    /// Directory JSON file (customers, loans, collateral, GL accounts, history)
    #[arg(short, long, required = true)]
    pub data: PathBuf,

    /// Matcher configuration (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl DataArgs {
    pub fn load_config(&self) -> anyhow::Result<MatcherConfig> {
        match &self.config {
            Some(path) => Ok(MatcherConfig::load_from_file(path)?),
            None => Ok(MatcherConfig::default()),
        }
    }

    pub fn load_directory(&self) -> anyhow::Result<InMemoryDirectory> {
        Ok(InMemoryDirectory::load_from_file(&self.data)?)
    }

    /// Service with the standard engines over the directory file
    pub fn build_service(&self, verbose: bool) -> anyhow::Result<SmartSuggestionService> {
        let config = self.load_config()?;
        let directory = self.load_directory()?;
        if verbose {
            eprintln!(
                "Loaded {} customers and {} loans from {}",
                directory.customer_count(),
                directory.loan_count(),
                self.data.display()
            );
        }
        let collaborators = Collaborators::from_directory(Arc::new(directory));
        Ok(SmartSuggestionService::build_default(&collaborators, &config))
    }
}

#[derive(clap::Args)]
pub struct ServeArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    pub port: u16,

    /// Address to bind to
    #[arg(short, long, default_value = "127.0.0.1")]
    pub address: String,

    /// Open browser automatically
    #[arg(long)]
    pub open: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Tsv,
}
