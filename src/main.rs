//! tripsql - natural-language analytics over the NYC taxi warehouse.

use std::io::Read;
use std::path::Path;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use tripsql::app::App;
use tripsql::cli::{ask_filters, Cli, Command};
use tripsql::config::Config;
use tripsql::error::ErrorKind;
use tripsql::logging;
use tripsql::pipeline::Answer;
use tripsql::query::Question;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse_args();

    if cli.log_file {
        logging::init_file_logging();
    } else {
        logging::init_stderr_logging();
    }

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let path = cli
        .config_path()
        .map(Path::to_path_buf)
        .unwrap_or_else(Config::default_path);
    info!("Loading config from: {}", path.display());
    let mut config = Config::load_from_file(&path)?;
    config.apply_env_overrides(|key| std::env::var(key).ok())?;
    cli.apply_overrides(&mut config)?;
    config.validate()?;

    let app = App::from_config(&config).await?;
    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, cancelling request");
            ctrl_c.cancel();
        }
    });

    let code = match &cli.command {
        Command::Ask {
            question,
            borough,
            from,
            to,
        } => {
            let question = ask_filters(borough.as_deref(), from.as_deref(), to.as_deref())
                .and_then(|filters| Question::with_filters(question.join(" "), filters));
            let answer = match question {
                Ok(question) => app.ask(&question, &cancel).await,
                Err(e) => Answer::rejected_request(tripsql::query::next_request_id(), e),
            };
            print_json(&answer.to_json())?;
            exit_code(&answer)
        }
        Command::Request { path } => {
            let raw = read_input(path)?;
            let answer = app.handle_request(&raw, &cancel).await;
            print_json(&answer.to_json())?;
            exit_code(&answer)
        }
        Command::Schema { tables } => {
            let tables = app.describe(tables);
            print_json(&serde_json::to_value(&tables)?)?;
            0
        }
        Command::Validate { sql } => {
            let candidate = app.validate_sql(sql);
            print_json(&candidate.to_json())?;
            if candidate.is_valid() {
                0
            } else {
                1
            }
        }
    };

    app.shutdown().await;
    Ok(code)
}

/// 0 for a complete answer, 2 for a malformed request, 1 for any other failure.
fn exit_code(answer: &Answer) -> i32 {
    match answer.error_kind() {
        None => 0,
        Some(ErrorKind::InvalidRequest) => 2,
        Some(_) => 1,
    }
}

fn read_input(path: &str) -> anyhow::Result<String> {
    if path == "-" {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("Failed to read request from stdin")?;
        return Ok(raw);
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read request file {}", path))
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
