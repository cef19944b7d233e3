//! # Refiner CLI
//!
//! Command-line interface for the refinement loop.
//!
//! Usage:
//!   refiner [OPTIONS] [TEXT]...
//!   refiner --file <path|->
//!
//! Examples:
//!   refiner "Summarize the key points of HTTP/2 server push."
//!   refiner -p openai -n 3 "Explain CRDTs to a new hire."
//!   cat draft.md | refiner --file - --quiet

mod logging;

use clap::Parser;
use refiner_agent::{AcceptancePolicy, Refiner, RefinerConfig, ACCEPTANCE_THRESHOLD};
use refiner_error::{Error, Result};
use refiner_provider::{Credentials, LlmProvider, OpenAIProvider, ProviderConfig, ProviderId};
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

/// Refined when neither TEXT nor --file is given
const SAMPLE_PROMPT: &str = "Summarize the key points of Next.js payload compression strategies.";

#[derive(Parser)]
#[command(name = "refiner")]
#[command(author, version, about = "Refiner - rewrite text with an LLM until an LLM judge approves")]
struct Cli {
    /// Text to refine (words are joined with spaces)
    #[arg(trailing_var_arg = true)]
    text: Vec<String>,

    /// Read the text from a file ("-" for stdin)
    #[arg(short, long, conflicts_with = "text")]
    file: Option<PathBuf>,

    /// Provider to use: groq or openai
    #[arg(short, long, default_value = "groq", value_parser = parse_provider)]
    provider: ProviderId,

    /// Maximum optimize/evaluate rounds
    #[arg(short = 'n', long, default_value_t = 5, value_parser = clap::value_parser!(u32).range(1..))]
    max_iterations: u32,

    /// Override the provider's default model
    #[arg(long)]
    model: Option<String>,

    /// Override the provider's API base URL
    #[arg(long)]
    base_url: Option<String>,

    /// Minimum judge score (0-1) for a draft to be accepted
    #[arg(long, default_value_t = ACCEPTANCE_THRESHOLD, value_parser = parse_threshold)]
    threshold: f32,

    /// Accept only when the judge writes "Score: 0.7" or "Score: 1" verbatim
    #[arg(long, conflicts_with = "threshold")]
    markers: bool,

    /// Quiet mode - only print the final text
    #[arg(short, long)]
    quiet: bool,

    /// Print run statistics after the final text
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Log filter when RUST_LOG is unset (e.g. "info", "refiner_agent=debug")
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn parse_provider(s: &str) -> std::result::Result<ProviderId, String> {
    s.parse::<ProviderId>().map_err(|e| e.message().to_string())
}

fn parse_threshold(s: &str) -> std::result::Result<f32, String> {
    let value: f32 = s.parse().map_err(|_| format!("'{}' is not a number", s))?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("{} is outside 0..=1", value))
    }
}

/// Positional words, then --file, then the built-in sample prompt
fn read_input(cli: &Cli) -> Result<String> {
    let text = if !cli.text.is_empty() {
        cli.text.join(" ")
    } else {
        match &cli.file {
            Some(path) if path.as_os_str() == "-" => {
                let mut buf = String::new();
                std::io::stdin()
                    .read_to_string(&mut buf)
                    .map_err(|e| Error::from(e).with_context("path", "<stdin>"))?;
                buf
            }
            Some(path) => std::fs::read_to_string(path)
                .map_err(|e| Error::from(e).with_context("path", path.display().to_string()))?,
            None => SAMPLE_PROMPT.to_string(),
        }
    };

    let text = text.trim();
    if text.is_empty() {
        return Err(Error::invalid_argument("input text is empty").with_operation("cli::read_input"));
    }
    Ok(text.to_string())
}

fn provider_config(cli: &Cli, credentials: &Credentials) -> Result<ProviderConfig> {
    let mut config = ProviderConfig::resolve(cli.provider, credentials)?;
    if let Some(model) = &cli.model {
        config = config.with_model(model);
    }
    if let Some(base_url) = &cli.base_url {
        config = config.with_base_url(base_url);
    }
    Ok(config)
}

async fn run(cli: Cli) -> Result<()> {
    let text = read_input(&cli)?;
    let credentials = Credentials::from_env();
    let provider = OpenAIProvider::new(provider_config(&cli, &credentials)?)?;

    let acceptance = if cli.markers {
        AcceptancePolicy::markers()
    } else {
        AcceptancePolicy::Threshold(cli.threshold)
    };
    let config = RefinerConfig {
        max_iterations: cli.max_iterations as usize,
        acceptance,
        verbose: !cli.quiet,
        ..Default::default()
    };

    if !cli.quiet {
        println!("Refiner - {} ({})\n", provider.name(), provider.default_model());
        println!("Prompt: {}", text);
    }

    let mut refiner = Refiner::with_config(provider, config);
    let outcome = refiner.refine(&text).await?;

    if !cli.quiet {
        println!("\n--- FINAL OUTPUT ---\n");
    }
    println!("{}", outcome.text);

    if cli.verbose {
        let usage = &outcome.usage;
        println!("\n--- Run Summary ---");
        println!("  state:      {:?}", outcome.state);
        println!("  iterations: {}/{}", outcome.iterations, cli.max_iterations);
        println!(
            "  tokens:     {} ({} prompt, {} completion) over {} calls",
            usage.total_tokens(),
            usage.total_prompt_tokens,
            usage.total_completion_tokens,
            usage.total_calls
        );
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = ?e, "run failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use refiner_error::ErrorKind;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("refiner").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&[]);
        assert_eq!(cli.provider, ProviderId::Groq);
        assert_eq!(cli.max_iterations, 5);
        assert_eq!(cli.threshold, ACCEPTANCE_THRESHOLD);
        assert!(!cli.markers);
        assert_eq!(read_input(&cli).unwrap(), SAMPLE_PROMPT);
    }

    #[test]
    fn test_positional_text_is_joined() {
        let cli = parse(&["-p", "openai", "Summarize", "X."]);
        assert_eq!(cli.provider, ProviderId::OpenAI);
        assert_eq!(read_input(&cli).unwrap(), "Summarize X.");
    }

    #[test]
    fn test_rejects_bad_arguments() {
        for args in [
            &["--provider", "anthropic"][..],
            &["-n", "0"][..],
            &["--threshold", "1.5"][..],
            &["--markers", "--threshold", "0.5"][..],
            &["-q", "-v"][..],
        ] {
            let argv = std::iter::once("refiner").chain(args.iter().copied());
            assert!(Cli::try_parse_from(argv).is_err(), "accepted {:?}", args);
        }
    }

    #[test]
    fn test_missing_file() {
        let cli = parse(&["--file", "/definitely/not/here.txt"]);
        let err = read_input(&cli).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileNotFound);
        assert_eq!(err.context_value("path"), Some("/definitely/not/here.txt"));
    }

    #[test]
    fn test_blank_input_is_rejected() {
        let cli = parse(&["   "]);
        let err = read_input(&cli).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_provider_overrides() {
        let cli = parse(&["--model", "llama-3.1-8b-instant", "--base-url", "http://localhost:8000/v1"]);
        let creds = Credentials::new().with_key(ProviderId::Groq, "gsk-test");
        let config = provider_config(&cli, &creds).unwrap();

        assert_eq!(config.default_model, "llama-3.1-8b-instant");
        assert_eq!(config.base_url, "http://localhost:8000/v1");

        let err = provider_config(&cli, &Credentials::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
    }
}
