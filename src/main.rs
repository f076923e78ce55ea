mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands, CrdAction};

use commands::run::RunArgs;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Version => commands::version::run()?,
        Commands::Check => commands::check::run().await?,
        Commands::List { resource } => {
            commands::list::run(resource).await?;
        }
        Commands::Crd { action } => match action {
            CrdAction::Generate => commands::crd::generate()?,
            CrdAction::Install => commands::crd::install().await?,
        },
        Commands::Reconcile => commands::reconcile::run().await?,
        Commands::Ready { loadtest_name, namespace } => {
            commands::ready::run(loadtest_name, namespace).await?;
        }
        Commands::Cleanup { port } => {
            commands::cleanup::run(port).await?;
        }
        Commands::Run {
            input_files,
            concurrency,
            annotation_key,
            polling_interval,
            polling_retries,
            output,
            log_dir,
            delete_successful_tests,
        } => {
            let polling_interval_seconds = parse_duration_seconds(&polling_interval)
                .ok_or_else(|| format!("invalid --polling-interval value: {polling_interval}"))?;
            let args = RunArgs {
                input_files,
                concurrency,
                annotation_key,
                polling_interval_seconds,
                polling_retries,
                output_path: output,
                log_dir,
                delete_successful_tests,
            };
            let exit_code = commands::run::run(args).await?;
            std::process::exit(exit_code);
        }
    }

    Ok(())
}

/// Parses `<n>s`/`<n>m`/`<n>h` (bare digits are seconds), matching the
/// Ready sidecar's `READY_TIMEOUT` env var format.
fn parse_duration_seconds(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    let split_at = raw.find(|c: char| !c.is_ascii_digit()).unwrap_or(raw.len());
    let (number, unit) = raw.split_at(split_at);
    let number: u64 = number.parse().ok()?;
    match unit {
        "s" | "" => Some(number),
        "m" => Some(number * 60),
        "h" => Some(number * 3600),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_seconds_bare() {
        assert_eq!(parse_duration_seconds("20"), Some(20));
    }

    #[test]
    fn test_parse_duration_seconds_suffixed() {
        assert_eq!(parse_duration_seconds("20s"), Some(20));
        assert_eq!(parse_duration_seconds("2m"), Some(120));
    }

    #[test]
    fn test_parse_duration_seconds_invalid() {
        assert_eq!(parse_duration_seconds("2x"), None);
    }
}
