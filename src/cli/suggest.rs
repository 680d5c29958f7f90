use clap::Args;
use rust_decimal::Decimal;

use crate::cli::{DataArgs, OutputFormat};
use crate::core::types::MatchMode;
use crate::matching::{RankedSuggestion, SuggestionResponse};

#[derive(Args)]
pub struct SuggestArgs {
    /// Bank transaction description
    #[arg(required = true)]
    pub description: String,

    /// Transaction amount
    #[arg(long, required = true)]
    pub amount: Decimal,

    /// Transaction mode
    #[arg(long, default_value = "auto")]
    pub mode: MatchMode,

    #[command(flatten)]
    pub data: DataArgs,

    /// Maximum number of suggestions to show
    #[arg(short = 'n', long, default_value = "5")]
    pub max_results: usize,
}

pub fn run(args: SuggestArgs, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    let service = args.data.build_service(verbose)?;

    let rt = tokio::runtime::Runtime::new()?;
    let mut response =
        rt.block_on(service.get_suggestions(&args.description, args.amount, args.mode))?;
    response.suggestions.truncate(args.max_results);

    if verbose {
        eprintln!(
            "Ran {} engines in {:.1} ms",
            service.registry().enabled_engines().len(),
            response.processing_time_ms
        );
        for name in &response.timed_out_engines {
            eprintln!("Warning: engine '{name}' timed out");
        }
    }

    match format {
        OutputFormat::Text => print_text_results(&args, &response, verbose),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&response)?),
        OutputFormat::Tsv => print_tsv_results(&response.suggestions),
    }

    Ok(())
}

fn print_text_results(args: &SuggestArgs, response: &SuggestionResponse, verbose: bool) {
    println!("Suggestions for: {}", args.description);
    println!("{}", "=".repeat(60));

    if response.suggestions.is_empty() {
        println!("\nNo matching loans or accounts found.");
        return;
    }

    for s in &response.suggestions {
        println!(
            "\n#{} {} ({}, {})",
            s.rank, s.target_label, s.percentage_display, s.confidence_tier
        );
        if let Some(target) = &s.target_id {
            println!("   Target: {target}");
        }
        println!("   Engine: {}", s.engine_display_name);
        println!("   Method: {}", s.matching_method);
        if let Some(matched) = &s.matched_data {
            println!("   Matched: {matched}");
        }
        if let Some(vehicle) = &s.vehicle_info {
            println!("   Vehicle: {vehicle}");
        }
        println!("   Reason: {}", s.reason_text);
        if verbose {
            println!(
                "   Score: base {} × weight {:.2} + bonus {:.0}, quality {:.2}",
                s.breakdown.base_confidence,
                s.breakdown.engine_weight,
                s.breakdown.method_bonus,
                s.breakdown.quality_factor
            );
            println!("   Id: {}", s.suggestion_id);
        }
        if let Some(info) = &s.ensemble_info {
            println!(
                "   Ensemble: {} suggestions from [{}], consensus: {}",
                info.total_suggestions,
                info.participating_engines.join(", "),
                if info.consensus { "yes" } else { "no" }
            );
        }
    }
}

fn print_tsv_results(suggestions: &[RankedSuggestion]) {
    println!("rank\ttarget\tlabel\tmatch_percentage\ttier\tengine\tmethod\tsuggestion_id");
    for s in suggestions {
        println!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            s.rank,
            s.target_id
                .as_ref()
                .map_or_else(|| "-".to_string(), ToString::to_string),
            s.target_label,
            s.match_percentage,
            s.confidence_tier,
            s.engine_name,
            s.matching_method,
            s.suggestion_id,
        );
    }
}
