use clap::Args;

use crate::cli::{DataArgs, OutputFormat};

#[derive(Args)]
pub struct QuickArgs {
    /// Partial description (at least 3 characters)
    #[arg(required = true)]
    pub partial: String,

    #[command(flatten)]
    pub data: DataArgs,

    /// Maximum number of suggestions
    #[arg(short, long, default_value = "5")]
    pub limit: usize,
}

pub fn run(args: QuickArgs, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    let service = args.data.build_service(verbose)?;
    let suggestions = service.get_quick_suggestions(&args.partial, args.limit);

    match format {
        OutputFormat::Text => {
            if suggestions.is_empty() {
                println!("No learned patterns match '{}'", args.partial);
            }
            for s in &suggestions {
                println!("{}", s.suggestion_preview);
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&suggestions)?),
        OutputFormat::Tsv => {
            println!("description\taccount\tmatch_percentage");
            for s in &suggestions {
                println!("{}\t{}\t{}", s.display_text, s.account, s.match_percentage);
            }
        }
    }

    Ok(())
}
