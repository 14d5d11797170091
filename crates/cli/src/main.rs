use anyhow::{Context as AnyhowContext, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use digest_core::{
    build_digest, encode_key, encode_targeted_key, resolve_key, Backends, Owner, ResolvedKey,
    StateSource, TargetType,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

mod config;
mod fixture;

use config::CliConfig;
use fixture::{Fixture, SlugRegistry};

#[derive(Parser)]
#[command(name = "digest")]
#[command(about = "Preview alert digests and inspect digest keys", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Path to digest.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the digest for a fixture and print it as JSON
    Preview(PreviewArgs),

    /// Encode or decode digest keys
    #[command(subcommand)]
    Key(KeyCommands),
}

#[derive(Args)]
struct PreviewArgs {
    /// Fixture file (JSON)
    #[arg(long)]
    fixture: PathBuf,

    /// Use the fixture's counters as-is instead of querying occurrences
    #[arg(long)]
    prefetched: bool,

    /// Pretty-print JSON
    #[arg(long)]
    pretty: bool,
}

#[derive(Subcommand)]
enum KeyCommands {
    /// Print the key for a channel or a targeted recipient
    Encode(EncodeArgs),

    /// Parse a key and resolve its channel and owner against a fixture
    Decode(DecodeArgs),
}

#[derive(Args)]
struct EncodeArgs {
    /// Owner id
    #[arg(long)]
    owner: u64,

    /// Channel slug (generic keys)
    #[arg(long, conflicts_with = "targeted", required_unless_present = "targeted")]
    channel: Option<String>,

    /// Encode a targeted key
    #[arg(long)]
    targeted: bool,

    /// Recipient selector for targeted keys
    #[arg(long, value_enum, default_value = "issue-owners")]
    target_type: TargetArg,

    /// Recipient id for targeted keys (omitted: -1)
    #[arg(long, allow_negative_numbers = true)]
    target_id: Option<i64>,
}

#[derive(Args)]
struct DecodeArgs {
    /// Key text
    key: String,

    /// Fixture providing the owner and channel slugs
    #[arg(long)]
    fixture: PathBuf,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum TargetArg {
    IssueOwners,
    Team,
    Member,
}

impl From<TargetArg> for TargetType {
    fn from(value: TargetArg) -> Self {
        match value {
            TargetArg::IssueOwners => TargetType::IssueOwners,
            TargetArg::Team => TargetType::Team,
            TargetArg::Member => TargetType::Member,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = CliConfig::load(cli.config.as_deref())?;

    let default_filter = config.log_level.as_deref().unwrap_or("info");
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    match cli.command {
        Commands::Preview(args) => run_preview(args).await?,
        Commands::Key(KeyCommands::Encode(args)) => run_encode(args)?,
        Commands::Key(KeyCommands::Decode(args)) => run_decode(args, &config).await?,
    }

    Ok(())
}

async fn run_preview(args: PreviewArgs) -> Result<()> {
    let fixture = Fixture::load(&args.fixture)?;
    let owner = Arc::new(fixture.owner.clone());
    let records = fixture.records();
    log::info!(
        "Previewing digest for owner {} ({} queued records)",
        fixture.owner_id(),
        records.len()
    );

    let digest = if args.prefetched {
        let state = fixture.state(Arc::clone(&owner));
        build_digest(owner, records, StateSource::Prefetched(state)).await
    } else {
        let backends = Backends::shared(Arc::new(fixture.backend()));
        build_digest(owner, records, StateSource::Fetch(&backends)).await
    }
    .context("Failed to build digest")?;

    let body = match digest {
        Some(digest) => json!({
            "status": "ok",
            "placements": digest.placement_count(),
            "digest": digest.summary(),
        }),
        None => json!({ "status": "empty", "digest": null }),
    };
    print_json(&body, args.pretty)
}

fn run_encode(args: EncodeArgs) -> Result<()> {
    // The slug is irrelevant to encoding.
    let owner = Owner::new(args.owner, "");
    let key = match args.channel {
        Some(channel) if !args.targeted => encode_key(&channel, &owner)
            .with_context(|| format!("Cannot encode a key for channel '{channel}'"))?,
        _ => encode_targeted_key(&owner, args.target_type.into(), args.target_id),
    };
    println!("{key}");
    Ok(())
}

async fn run_decode(args: DecodeArgs, config: &CliConfig) -> Result<()> {
    let fixture = Fixture::load(&args.fixture)?;
    let registry = SlugRegistry::new(
        config.channels.iter().chain(&fixture.channels).cloned(),
        config.targeted_channel.clone(),
    );
    let backend = fixture.backend();

    let resolved = resolve_key(&args.key, &registry, &backend).await?;
    log::debug!("Resolved key {} for owner {}", args.key, resolved.owner().id);

    let body = match resolved {
        ResolvedKey::Generic { channel, owner } => json!({
            "kind": "generic",
            "channel": channel,
            "owner": { "id": owner.id, "slug": owner.slug },
        }),
        ResolvedKey::Targeted {
            channel,
            owner,
            target_type,
            target_id,
        } => json!({
            "kind": "targeted",
            "channel": channel,
            "owner": { "id": owner.id, "slug": owner.slug },
            "target_type": target_type,
            "target_id": target_id,
        }),
    };
    print_json(&body, false)
}

fn print_json(value: &serde_json::Value, pretty: bool) -> Result<()> {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{rendered}");
    Ok(())
}
