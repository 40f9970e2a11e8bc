//! WhiteLotto: encrypted lottery client
//!
//! Runs the orchestrator against the local ledger and local encryption
//! service. State persists in the data directory between invocations.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};
use whitelotto::fhe::LocalEncryptionService;
use whitelotto::ledger::{LocalLedger, LocalLedgerConfig};
use whitelotto::{
    Address, DisplayedValue, DrawMode, Hash, Lottery, LotteryConfig, LotteryEntry, RevealOutcome,
};

#[derive(Parser)]
#[command(name = "whitelotto", version, about = "WhiteLotto: encrypted lottery client")]
struct Args {
    /// Data directory
    #[arg(short, long, default_value = "./data")]
    data_dir: PathBuf,

    /// Wallet address to act as
    #[arg(short, long, default_value = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8")]
    address: String,

    /// Simulated confirmation time in milliseconds
    #[arg(long, default_value = "500")]
    confirm_ms: u64,

    /// 32-byte hex beacon; draws become reproducible from it
    #[arg(long)]
    draw_beacon: Option<String>,

    /// Decline every signature prompt
    #[arg(long)]
    reject_signatures: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List entries
    List,
    /// Show statistics
    Stats,
    /// Submit an encrypted ticket
    Join {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        ticket: String,
    },
    /// Decrypt and prove an entry
    Verify { record_id: String },
    /// Draw a winner
    Draw,
}

type Client = Lottery<LocalLedger, LocalEncryptionService>;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("whitelotto=info")),
        )
        .init();

    let args = Args::parse();

    if let Err(e) = run(args).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let draw_mode = match &args.draw_beacon {
        Some(raw) => DrawMode::Committed { beacon: parse_beacon(raw)? },
        None => DrawMode::Local,
    };
    let account = Address::parse(&args.address)?;

    std::fs::create_dir_all(&args.data_dir)?;
    let service = Arc::new(LocalEncryptionService::open(&args.data_dir)?);

    let ledger = Arc::new(LocalLedger::open(LocalLedgerConfig {
        data_dir: Some(args.data_dir.clone()),
        confirm_delay: Duration::from_millis(args.confirm_ms),
        kms_public_key: service.kms_public_key(),
        reject_signatures: args.reject_signatures,
        ..LocalLedgerConfig::default()
    })?);

    let config = LotteryConfig { draw_mode, ..LotteryConfig::default() };
    let lottery = Lottery::new(ledger, service, config);

    if let Err(e) = lottery.connect_wallet(account).await {
        warn!("Encryption session unavailable: {}", e);
    }

    match args.command {
        Command::List => print_entries(&lottery).await,
        Command::Stats => {
            let stats = lottery.stats().await;
            println!("Total participants:    {}", stats.total_participants);
            println!("Verified entries:      {}", stats.verified_entries);
            println!("Average win chance:    {}%", stats.average_winning_chance);
            println!("Recent winners (24h):  {}", stats.recent_winners);
        }
        Command::Join { name, ticket } => {
            lottery.open_submission();
            lottery.edit_form(|form| {
                form.set_name(&name);
                form.set_ticket_number(&ticket);
            });
            let record_id = lottery.submit_ticket().await?;
            println!("Entered the lottery as {}", record_id);
        }
        Command::Verify { record_id } => match lottery.toggle_reveal(&record_id).await? {
            RevealOutcome::OnLedger(v) => println!("{} already verified: {}", record_id, v),
            RevealOutcome::Revealed(v) => println!("{} decrypted and verified: {}", record_id, v),
            RevealOutcome::SettledElsewhere => {
                let value = lottery.entry(&record_id).await.and_then(|e| e.revealed_value);
                match value {
                    Some(v) => println!("{} was verified concurrently: {}", record_id, v),
                    None => println!("{} was verified concurrently", record_id),
                }
            }
            RevealOutcome::Forgotten => println!("{} hidden", record_id),
        },
        Command::Draw => {
            let winner = lottery.draw_winner().await?;
            println!(
                "Winner: {} ({}) ticket #{}",
                winner.entry.display_name,
                winner.entry.creator_address.short(),
                winner.entry.public_value1
            );
        }
    }

    Ok(())
}

async fn print_entries(lottery: &Client) {
    let entries = lottery.entries().await;
    if entries.is_empty() {
        println!("No lottery entries found");
        return;
    }
    for entry in &entries {
        println!(
            "{:<22} {:<16} {:<14} #{:<8} {:<20} {}",
            entry.ledger_record_id,
            entry.display_name,
            entry.creator_address.short(),
            entry.public_value1,
            format_time(entry),
            value_column(lottery, entry),
        );
    }
}

fn value_column(lottery: &Client, entry: &LotteryEntry) -> String {
    match lottery.displayed_value(entry) {
        Some(DisplayedValue::OnLedger(v)) => format!("verified: {}", v),
        Some(DisplayedValue::Local(v)) => format!("revealed: {}", v),
        None => "encrypted".to_string(),
    }
}

fn format_time(entry: &LotteryEntry) -> String {
    DateTime::<Utc>::from_timestamp(entry.created_at as i64, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| entry.created_at.to_string())
}

fn parse_beacon(raw: &str) -> Result<Hash, Box<dyn std::error::Error>> {
    let bytes = hex::decode(raw.trim_start_matches("0x"))?;
    let beacon: Hash = bytes
        .try_into()
        .map_err(|b: Vec<u8>| format!("beacon must be 32 bytes, got {}", b.len()))?;
    Ok(beacon)
}
