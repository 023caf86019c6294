//! Command-line argument parsing for tripsql.

use crate::config::Config;
use crate::error::{Result, TripSqlError};
use crate::query::{DateRange, QuestionFilters};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Natural-language analytics over the NYC taxi warehouse.
#[derive(Parser, Debug)]
#[command(name = "tripsql")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// LLM provider (anthropic, openai, mock)
    #[arg(long, value_name = "PROVIDER", global = true)]
    pub llm: Option<String>,

    /// Query engine backend (trino, postgres, mock)
    #[arg(long, value_name = "BACKEND", global = true)]
    pub engine: Option<String>,

    /// Use the mock LLM and the mock engine with demo data
    #[arg(long, global = true)]
    pub mock: bool,

    /// Write logs to the log file instead of stderr
    #[arg(long, global = true)]
    pub log_file: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Answer a question and print the JSON response
    Ask {
        /// The question, e.g. "total trips by hour for Manhattan on 2024-08-01"
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,

        /// Restrict to pickups in this borough
        #[arg(long, value_name = "BOROUGH")]
        borough: Option<String>,

        /// First pickup date (YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        from: Option<String>,

        /// Last pickup date (YYYY-MM-DD), defaults to --from
        #[arg(long, value_name = "DATE")]
        to: Option<String>,
    },

    /// Answer a JSON request read from a file or stdin
    Request {
        /// Request file, or "-" for stdin
        #[arg(value_name = "PATH", default_value = "-")]
        path: String,
    },

    /// Print catalog tables as JSON
    Schema {
        /// Table names to describe (all tables when omitted)
        tables: Vec<String>,
    },

    /// Validate hand-written SQL against the current catalog
    Validate {
        /// The SQL statement
        sql: String,
    },
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the explicit config path, if one was given.
    pub fn config_path(&self) -> Option<&std::path::Path> {
        self.config.as_deref()
    }

    /// Applies command-line overrides on top of the loaded configuration.
    pub fn apply_overrides(&self, config: &mut Config) -> Result<()> {
        if let Some(provider) = &self.llm {
            config.llm.provider = provider.parse().map_err(TripSqlError::config)?;
        }
        if let Some(backend) = &self.engine {
            config.engine.backend = backend.parse().map_err(TripSqlError::config)?;
        }
        if self.mock {
            config.llm.provider = crate::llm::LlmProvider::Mock;
            config.engine.backend = crate::engine::EngineBackend::Mock;
        }
        Ok(())
    }
}

/// Builds question filters from `ask` flags.
pub fn ask_filters(
    borough: Option<&str>,
    from: Option<&str>,
    to: Option<&str>,
) -> Result<QuestionFilters> {
    let date_range = match (from, to) {
        (None, None) => None,
        (Some(from), None) => Some(DateRange::day(from)?),
        (Some(from), Some(to)) => Some(DateRange::new(from, to)?),
        (None, Some(_)) => {
            return Err(TripSqlError::invalid_request("--to requires --from"));
        }
    };
    Ok(QuestionFilters {
        date_range,
        borough: borough.map(str::to_string),
    })
}
