use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::cli::{DataArgs, OutputFormat};

#[derive(Args)]
pub struct PatternsArgs {
    #[command(subcommand)]
    pub command: PatternsCommands,
}

#[derive(Subcommand)]
pub enum PatternsCommands {
    /// Export the pattern table learned from the directory's tagged history
    Export {
        #[command(flatten)]
        data: DataArgs,

        /// Output file path
        #[arg(short, long, required = true)]
        output: PathBuf,
    },

    /// Summarise the learned pattern table
    Stats {
        #[command(flatten)]
        data: DataArgs,
    },
}

pub fn run(args: PatternsArgs, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    match args.command {
        PatternsCommands::Export { data, output } => {
            let service = data.build_service(verbose)?;
            let snapshot = service.export_patterns()?;
            std::fs::write(&output, snapshot.to_json()?)?;
            eprintln!(
                "Exported {} patterns to {}",
                snapshot.total,
                output.display()
            );
        }
        PatternsCommands::Stats { data } => {
            let service = data.build_service(verbose)?;
            let stats = service.pattern_statistics()?;
            match format {
                OutputFormat::Text => {
                    println!("Learned Patterns");
                    println!("{}", "=".repeat(60));
                    println!("  Exact patterns: {}", stats.exact_patterns);
                    println!("  Partial variants: {}", stats.partial_patterns);
                    println!("  Average confidence: {:.1}", stats.average_confidence);
                    println!(
                        "  Confidence: {} high, {} medium, {} low",
                        stats.confidence_distribution.high,
                        stats.confidence_distribution.medium,
                        stats.confidence_distribution.low
                    );
                    if !stats.most_used.is_empty() {
                        println!("\nMost used:");
                        for (description, usage) in &stats.most_used {
                            println!("  {usage:>5}  {description}");
                        }
                    }
                }
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
                OutputFormat::Tsv => {
                    println!("exact_patterns\tpartial_patterns\taverage_confidence");
                    println!(
                        "{}\t{}\t{:.1}",
                        stats.exact_patterns, stats.partial_patterns, stats.average_confidence
                    );
                }
            }
        }
    }
    Ok(())
}
