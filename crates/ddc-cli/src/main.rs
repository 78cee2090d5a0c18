use anyhow::Result;
use clap::{CommandFactory, Parser};
use ddc_core::{CollectorError, Secret};
use tracing::error;
use tracing_subscriber::EnvFilter;

mod cli;
mod collect;
mod dispatch;
mod summary;

use cli::Cli;

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn print_usage(out: &mut impl std::io::Write) -> std::io::Result<()> {
    Cli::command().write_help(out)?;
    out.flush()
}

fn prompt_pat() -> Result<Secret> {
    let token = dialoguer::Password::new()
        .with_prompt("Enter Dremio personal access token (PAT)")
        .interact()?;
    Ok(Secret::new(token.trim()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let prompt = cli.dremio_pat_prompt;
    let mut config = cli.into_config()?;
    if prompt {
        config.dremio_pat = Some(prompt_pat()?);
    }

    match collect::run(&config).await {
        Ok(summary) => {
            println!("{}", summary);
            Ok(())
        }
        Err(e) => {
            if let Some(CollectorError::ConfigValidation(msg)) = e.downcast_ref::<CollectorError>() {
                error!("{}", msg);
                if let Err(help_err) = print_usage(&mut std::io::stdout()) {
                    error!("unable to print help: {}", help_err);
                }
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenPipe;

    impl std::io::Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn usage_lists_the_flags() {
        let mut out = Vec::new();
        print_usage(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("--coordinator"), "{}", text);
        assert!(text.contains("--dremio-pat-prompt"), "{}", text);
    }

    #[test]
    fn usage_write_errors_are_reported() {
        let err = print_usage(&mut BrokenPipe).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);
    }
}
