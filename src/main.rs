use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;
mod core;
mod directory;
mod engines;
mod matching;
mod utils;
mod web;

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    // Initialize logging based on verbosity flag
    let filter = if cli.verbose {
        EnvFilter::new("loan_matcher=debug,info")
    } else {
        EnvFilter::new("loan_matcher=warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        cli::Commands::Suggest(args) => {
            cli::suggest::run(args, cli.format, cli.verbose)?;
        }
        cli::Commands::Quick(args) => {
            cli::quick::run(args, cli.format, cli.verbose)?;
        }
        cli::Commands::SelfTest(args) => {
            cli::self_test::run(args, cli.format, cli.verbose)?;
        }
        cli::Commands::Patterns(args) => {
            cli::patterns::run(args, cli.format, cli.verbose)?;
        }
        cli::Commands::Serve(args) => {
            web::server::run(args)?;
        }
    }

    Ok(())
}
