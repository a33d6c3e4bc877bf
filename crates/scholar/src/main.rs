//! Chat in the terminal with an assistant that can search.

use std::io::{self, IsTerminal};
use std::process::ExitCode;

use clap::Parser;
use owo_colors::OwoColorize;
use scholar::config::{Args, MODEL_ALLOWLIST, Settings};
use scholar::{ChatShell, SessionBuilder};
use scholar_openai_model::OpenAIProvider;
use tokio::io::BufReader;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    if args.list_models {
        for (index, model) in MODEL_ALLOWLIST.iter().enumerate() {
            println!("{index}: {model}");
        }
        return ExitCode::SUCCESS;
    }

    let settings = match Settings::from_args(args) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("{} {err}", "error:".red().bold());
            return ExitCode::from(2);
        }
    };
    tracing::debug!("starting with {settings:?}");

    let model_provider = OpenAIProvider::new(settings.openai_config());
    let builder = settings.configure(
        SessionBuilder::with_model_provider(model_provider)
            .with_system_prompt(include_str!("./system_prompt.md")),
    );

    let interactive = io::stdin().is_terminal() && io::stdout().is_terminal();
    let mut shell =
        ChatShell::new(builder, BufReader::new(tokio::io::stdin()), io::stdout())
            .with_model_name(settings.model)
            .interactive(interactive);

    match shell.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("error reading input: {err}");
            ExitCode::FAILURE
        }
    }
}
