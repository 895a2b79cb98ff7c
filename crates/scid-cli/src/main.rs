//! scid: operator CLI for the SCid streaming-rewards ledger.
//!
//! Usage:
//!   scid register         --track <id> --profile <id> [--wallet <addr>] [--chain <code>]
//!   scid stream           --scid <scid> --duration <secs> [--listener <id>] [--listener-wallet <addr>]
//!   scid transfer         --scid <scid> --from <id> --to <id> [--tx-hash <hash>] [--reason <text>]
//!   scid revoke           --scid <scid> [--reason <text>]
//!   scid anchor           --scid <scid> --owner <addr> --token-id <n> --nft-contract <addr>
//!   scid show             <scid | track id>
//!   scid unclaimed        --profile <id>
//!   scid claim            --profile <id> --wallet <addr> [--stake]
//!   scid history          --profile <id>
//!   scid stats
//!   scid search           [--profile <id>] [--chain <code>] [--status <s>] [--year <yy>]
//!   scid validate         <scid>
//!   scid backfill-ids     [--limit <n>] [--dry-run]
//!   scid backfill-rewards [--limit <n>] [--min-plays <n>] [--execute]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use scid_backfill::{
    IdentifierBackfill, IdentifierBackfillOptions, RewardBackfill, RewardBackfillOptions,
};
use scid_core::{format_ogun, now, ChainCode, LedgerConfig, NullNotifier, ScidStatus};
use scid_rewards::{RewardEngine, StreamEvent};
use scid_settlement::{
    AnchorService, ClaimCoordinator, Distributor, RegistryContract, RelayDistributor,
    RelayRegistry,
};
use scid_state::{LedgerDb, LedgerQuery, RegisterRequest, ScidRegistry, SearchFilter};

mod catalog;
use catalog::load_catalog;

// ── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "scid",
    version,
    about = "SCid ledger: track identifiers and streaming rewards"
)]
struct Args {
    /// Ledger configuration (JSON). Without it, defaults apply and no relay
    /// is configured.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory override.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Track/profile catalog (JSON).
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Allocate an SCid for a track.
    Register {
        #[arg(long)]
        track: String,
        #[arg(long)]
        profile: String,
        #[arg(long)]
        wallet: Option<String>,
        /// Chain code (POL, ETH, ...). Defaults to POL.
        #[arg(long)]
        chain: Option<String>,
        #[arg(long)]
        chain_id: Option<u64>,
        #[arg(long)]
        metadata_hash: Option<String>,
    },

    /// Register every listed track for one profile.
    BulkRegister {
        #[arg(long)]
        profile: String,
        #[arg(long, value_delimiter = ',')]
        tracks: Vec<String>,
        #[arg(long)]
        chain: Option<String>,
    },

    /// Log one stream and print the reward split.
    Stream {
        #[arg(long)]
        scid: String,
        /// Listened seconds.
        #[arg(long)]
        duration: u32,
        #[arg(long)]
        listener: Option<String>,
        #[arg(long)]
        listener_wallet: Option<String>,
    },

    /// Move an SCid to a new owner.
    Transfer {
        #[arg(long)]
        scid: String,
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long)]
        tx_hash: Option<String>,
        #[arg(long)]
        reason: Option<String>,
    },

    /// Revoke an SCid.
    Revoke {
        #[arg(long)]
        scid: String,
        #[arg(long)]
        reason: Option<String>,
    },

    /// Register an SCid in the on-chain registry.
    Anchor {
        #[arg(long)]
        scid: String,
        #[arg(long)]
        owner: String,
        #[arg(long)]
        token_id: u64,
        #[arg(long)]
        nft_contract: String,
        #[arg(long)]
        metadata_hash: Option<String>,
    },

    /// Print the record for an SCid or a track id.
    Show { key: String },

    /// Unclaimed OGUN for a profile.
    Unclaimed {
        #[arg(long)]
        profile: String,
    },

    /// Claim a profile's unclaimed rewards.
    Claim {
        #[arg(long)]
        profile: String,
        #[arg(long)]
        wallet: String,
        /// Stake the rewards directly instead of transferring them.
        #[arg(long, default_value_t = false)]
        stake: bool,
    },

    /// Claim receipts for a profile, newest first.
    History {
        #[arg(long)]
        profile: String,
    },

    /// Ledger-wide totals.
    Stats,

    /// Filter and page through SCids.
    Search {
        #[arg(long)]
        profile: Option<String>,
        #[arg(long)]
        chain: Option<String>,
        #[arg(long)]
        status: Option<String>,
        /// Two-digit year.
        #[arg(long)]
        year: Option<u8>,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Check an SCid's format and print its components.
    Validate { scid: String },

    /// Allocate SCids for catalog tracks that have none.
    BackfillIds {
        #[arg(long, default_value_t = 0)]
        limit: usize,
        #[arg(long, default_value_t = false)]
        dry_run: bool,
        #[arg(long)]
        chain: Option<String>,
    },

    /// Credit creators for historical plays. Dry run unless --execute.
    BackfillRewards {
        #[arg(long, default_value_t = 0)]
        limit: usize,
        #[arg(long, default_value_t = 1)]
        min_plays: u64,
        #[arg(long, default_value_t = false)]
        execute: bool,
    },
}

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    tracing_subscriber::EnvFilter::new("info,scid_rewards=debug,scid_settlement=debug")
                }),
        )
        .init();

    let args = Args::parse();

    // Validation needs no ledger.
    if let Command::Validate { scid } = &args.command {
        return cmd_validate(scid);
    }

    let cfg = load_config(args.config.as_deref(), args.data_dir.as_deref())?;
    let data_dir = expand_tilde(&cfg.data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;
    let db = Arc::new(LedgerDb::open(&data_dir).context("opening ledger database")?);
    let registry = Arc::new(ScidRegistry::new(Arc::clone(&db)));
    let catalog = load_catalog(args.catalog.as_deref())?;
    let ts = now();

    match args.command {
        Command::Register { track, profile, wallet, chain, chain_id, metadata_hash } => {
            let req = RegisterRequest {
                track_id: track,
                profile_id: profile,
                wallet_address: wallet,
                chain_code: parse_chain(chain.as_deref())?,
                chain_id,
                metadata_hash,
            };
            let record = registry.register(&req, ts)?;
            info!(scid = %record.scid, track_id = %record.track_id, "registered");
            print_json(&record)?;
        }

        Command::BulkRegister { profile, tracks, chain } => {
            let chain = parse_chain(chain.as_deref())?.unwrap_or(ChainCode::Polygon);
            let result = registry.bulk_register(&tracks, &profile, chain, ts);
            print_json(&result)?;
        }

        Command::Stream { scid, duration, listener, listener_wallet } => {
            let engine = RewardEngine::new(
                Arc::clone(&db),
                catalog.clone(),
                catalog.clone(),
                Arc::new(NullNotifier),
                cfg.reward_policy.clone(),
            );
            let split = engine.log_stream(&StreamEvent {
                scid,
                listener_profile_id: listener,
                listener_wallet,
                duration_secs: duration,
                timestamp: ts,
            }, ts)?;
            print_json(&split)?;
        }

        Command::Transfer { scid, from, to, tx_hash, reason } => {
            let record = registry.transfer(&scid, &from, &to, tx_hash, reason, ts)?;
            print_json(&record)?;
        }

        Command::Revoke { scid, reason } => {
            let record = registry.revoke(&scid, reason.as_deref())?;
            print_json(&record)?;
        }

        Command::Anchor { scid, owner, token_id, nft_contract, metadata_hash } => {
            let contract = cfg
                .registry
                .as_ref()
                .map(|r| Arc::new(RelayRegistry::new(r)) as Arc<dyn RegistryContract>);
            let anchor = AnchorService::new(Arc::clone(&registry), contract);
            let record = anchor
                .register_on_chain(
                    &scid,
                    &owner,
                    token_id,
                    &nft_contract,
                    metadata_hash.as_deref(),
                    ts,
                )
                .await?;
            print_json(&record)?;
        }

        Command::Show { key } => {
            let record = match registry.get_by_scid(&key)? {
                Some(r) => Some(r),
                None => registry.get_by_track(&key)?,
            };
            match record {
                Some(r) => print_json(&r)?,
                None => bail!("no SCid or track matches {key}"),
            }
        }

        Command::Unclaimed { profile } => {
            let claims = claim_coordinator(&cfg, &db, &catalog);
            let amount = claims.unclaimed_rewards(&profile)?;
            println!("Profile:    {profile}");
            println!("Unclaimed:  {} OGUN", format_ogun(amount));
        }

        Command::Claim { profile, wallet, stake } => {
            let claims = claim_coordinator(&cfg, &db, &catalog);
            let outcome = claims
                .claim_streaming_rewards(&profile, &wallet, stake, ts)
                .await?;
            if outcome.deferred {
                warn!(claim_id = outcome.claim_id, "no distributor configured, settlement deferred");
            }
            print_json(&outcome)?;
        }

        Command::History { profile } => {
            let claims = claim_coordinator(&cfg, &db, &catalog);
            print_json(&claims.claim_history(&profile)?)?;
        }

        Command::Stats => {
            print_json(&LedgerQuery::new(&db).stats()?)?;
        }

        Command::Search { profile, chain, status, year, offset, limit } => {
            let status = status
                .as_deref()
                .map(str::parse::<ScidStatus>)
                .transpose()?;
            let filter = SearchFilter {
                profile_id: profile,
                chain_code: parse_chain(chain.as_deref())?,
                status,
                year,
                offset,
                limit,
            };
            print_json(&LedgerQuery::new(&db).search(&filter)?)?;
        }

        Command::Validate { scid } => cmd_validate(&scid)?,

        Command::BackfillIds { limit, dry_run, chain } => {
            let job = IdentifierBackfill::new(Arc::clone(&registry), catalog.clone());
            let opts = IdentifierBackfillOptions {
                chain_code: parse_chain(chain.as_deref())?.unwrap_or(ChainCode::Polygon),
                limit,
                dry_run,
            };
            print_json(&job.run(&opts, ts)?)?;
        }

        Command::BackfillRewards { limit, min_plays, execute } => {
            let job = RewardBackfill::new(
                Arc::clone(&registry),
                catalog.clone(),
                cfg.reward_policy.clone(),
                cfg.service_identity.clone(),
            );
            let opts = RewardBackfillOptions {
                dry_run: !execute,
                limit,
                min_plays,
                ..RewardBackfillOptions::default()
            };
            print_json(&job.run(&opts, ts)?)?;
        }
    }

    db.flush().context("flushing ledger database")?;
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn cmd_validate(scid: &str) -> anyhow::Result<()> {
    match scid_ident::parse(scid) {
        Ok(parts) => {
            println!("Valid:     {}", parts.scid);
            println!("Display:   {}", scid_ident::format_for_display(scid));
            println!("Chain:     {}", parts.chain_code);
            println!("Artist:    {}", parts.artist_hash);
            println!("Year:      {:02}", parts.year);
            println!("Sequence:  {}", parts.sequence);
            println!("Checksum:  {}", scid_ident::checksum(&parts.scid));
            Ok(())
        }
        Err(e) => bail!("{e}"),
    }
}

fn claim_coordinator(
    cfg: &LedgerConfig,
    db: &Arc<LedgerDb>,
    catalog: &Arc<scid_core::Catalog>,
) -> ClaimCoordinator {
    let distributor = cfg
        .distributor
        .as_ref()
        .map(|d| Arc::new(RelayDistributor::new(d)) as Arc<dyn Distributor>);
    ClaimCoordinator::new(
        Arc::clone(db),
        distributor,
        catalog.clone(),
        Arc::new(NullNotifier),
    )
}

fn load_config(path: Option<&Path>, data_dir: Option<&Path>) -> anyhow::Result<LedgerConfig> {
    let mut cfg = match path {
        Some(p) => LedgerConfig::load(&expand_tilde(p))
            .with_context(|| format!("loading config from {}", p.display()))?,
        None => LedgerConfig::with_data_dir("~/.scid/data"),
    };
    if let Some(dir) = data_dir {
        cfg.data_dir = dir.to_path_buf();
    }
    Ok(cfg)
}

fn parse_chain(code: Option<&str>) -> anyhow::Result<Option<ChainCode>> {
    Ok(code.map(str::parse::<ChainCode>).transpose()?)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Expand a leading `~` to the user's home directory (`HOME` or `USERPROFILE`).
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}
