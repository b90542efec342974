//! Subcommand implementations. Results go to stdout as pretty JSON.

use std::io::{self, Write};

use akashic_core::{
    CodeSystem, CommitRequest, DomainFilter, ResolutionQuery, Resolver, ResolverConfig,
};
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::cli::{AliasArgs, CommitArgs, DomainArg, LookupArgs, UnlearnArgs};

pub fn run_lookup(config: ResolverConfig, args: &LookupArgs) -> Result<()> {
    let resolver = open(config)?;
    let query = lookup_query(args);
    let response = resolver.resolve(&query)?;
    print_json(&response)
}

pub fn run_commit(config: ResolverConfig, args: &CommitArgs) -> Result<()> {
    let resolver = open(config)?;
    let request = CommitRequest {
        term: args.term.clone(),
        context: args.context.clone(),
        code: args.code.clone(),
        display: args.display.clone(),
        lay_text: args.lay_text.clone(),
        dry_run: args.dry_run,
    };
    let outcome = resolver.commit_selection(request)?;
    print_json(&outcome)
}

pub fn run_alias(config: ResolverConfig, args: &AliasArgs) -> Result<()> {
    let resolver = open(config)?;
    let entry = resolver.learn_aliases(&args.term, args.context.as_deref(), &args.aliases)?;
    print_json(&entry)
}

pub fn run_unlearn(config: ResolverConfig, args: &UnlearnArgs) -> Result<()> {
    let resolver = open(config)?;
    let removed = resolver.unlearn(&args.term, args.context.as_deref(), args.keep_aliases)?;
    print_json(&json!({ "removed": removed, "keepAliases": args.keep_aliases }))
}

pub fn run_status(config: ResolverConfig) -> Result<()> {
    let resolver = open(config)?;
    let bundle = resolver.datasets().current();
    print_json(&json!({
        "dataHash": bundle.data_hash,
        "loadedAt": bundle.loaded_at,
        "snomedRecords": bundle.snapshot(CodeSystem::Snomed).len(),
        "loincRecords": bundle.snapshot(CodeSystem::Loinc).len(),
        "canonicalEntries": bundle.canonical.len(),
        "learnedEntries": resolver.store().entries().len(),
        "scoringPolicyVersion": bundle.policy.version,
    }))
}

pub fn run_config(config: ResolverConfig) -> Result<()> {
    print_json(&config)
}

fn open(config: ResolverConfig) -> Result<Resolver> {
    let data_dir = config.data_dir.clone();
    let resolver = Resolver::open(config)
        .with_context(|| format!("failed to load datasets from {}", data_dir.display()))?;
    info!(hash = %resolver.data_hash(), "resolver ready");
    Ok(resolver)
}

fn lookup_query(args: &LookupArgs) -> ResolutionQuery {
    ResolutionQuery {
        text: args.text.clone(),
        context: args.context.clone(),
        domain: match args.domain {
            DomainArg::Auto => DomainFilter::Auto,
            DomainArg::Snomed => DomainFilter::Snomed,
            DomainArg::Loinc => DomainFilter::Loinc,
        },
        top_k: args.top_k,
        score_cutoff: args.score_cutoff,
        tech_top_k: args.tech_top_k,
        tech_score_cutoff: args.tech_score_cutoff,
        include_technical: args.technical,
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}
