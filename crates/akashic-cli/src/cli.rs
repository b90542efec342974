//! CLI argument definitions for the term resolver.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "akashic",
    version,
    about = "Resolve clinical terms to SNOMED CT and LOINC codes",
    long_about = "Resolve free-text clinical terms to SNOMED CT and LOINC codes.\n\n\
                  Data file locations come from the environment (DATA_DIR, SNOMED_JSON, \
                  LOINC_JSON, LEARNED_JSON, ...) unless --data-dir is given."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Root directory holding the dataset and learned-store files.
    #[arg(long = "data-dir", value_name = "DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log output format.
    #[arg(long = "log-format", value_enum, default_value = "pretty", global = true)]
    pub log_format: LogFormatArg,

    /// Disable ANSI colors in log output.
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Resolve a term and print the response as JSON.
    Lookup(LookupArgs),

    /// Confirm a term to code mapping.
    Commit(CommitArgs),

    /// Attach alternative phrasings to a learned term.
    Alias(AliasArgs),

    /// Retract a learned mapping.
    Unlearn(UnlearnArgs),

    /// Print the dataset content hash and record counts.
    Status,

    /// Print the effective configuration.
    Config,
}

#[derive(Args)]
pub struct LookupArgs {
    /// Free text to resolve.
    #[arg(value_name = "TEXT")]
    pub text: String,

    /// Learned-store namespace.
    #[arg(long)]
    pub context: Option<String>,

    /// Restrict to one code system.
    #[arg(long, value_enum, default_value = "auto")]
    pub domain: DomainArg,

    #[arg(long = "top-k", default_value_t = 5)]
    pub top_k: usize,

    #[arg(long = "score-cutoff", default_value_t = 70, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub score_cutoff: u8,

    #[arg(long = "tech-top-k", default_value_t = 8)]
    pub tech_top_k: usize,

    #[arg(long = "tech-score-cutoff", default_value_t = 60, value_parser = clap::value_parser!(u8).range(0..=100))]
    pub tech_score_cutoff: u8,

    /// Include the raw ranked candidate lists.
    #[arg(long)]
    pub technical: bool,
}

#[derive(Args)]
pub struct CommitArgs {
    /// Term as the reviewer confirmed it.
    #[arg(long)]
    pub term: String,

    /// Chosen SNOMED code.
    #[arg(long)]
    pub code: String,

    /// Chosen SNOMED display.
    #[arg(long)]
    pub display: String,

    #[arg(long)]
    pub context: Option<String>,

    /// Patient-facing wording.
    #[arg(long = "lay-text")]
    pub lay_text: Option<String>,

    /// Show the entry that would be stored without writing it.
    #[arg(long = "dry-run")]
    pub dry_run: bool,
}

#[derive(Args)]
pub struct AliasArgs {
    #[arg(value_name = "TERM")]
    pub term: String,

    #[arg(value_name = "ALIAS", required = true)]
    pub aliases: Vec<String>,

    #[arg(long)]
    pub context: Option<String>,
}

#[derive(Args)]
pub struct UnlearnArgs {
    #[arg(value_name = "TERM")]
    pub term: String,

    #[arg(long)]
    pub context: Option<String>,

    /// Keep the entry's aliases and lay text, dropping only the code.
    #[arg(long = "keep-aliases")]
    pub keep_aliases: bool,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum DomainArg {
    Auto,
    Snomed,
    Loinc,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}
