use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result, bail};
use bitsend_core::history::OrderedTransactions;
use bitsend_core::units::format_sats;
use bitsend_core::{AccountCode, BtcUnit, Config, InputType};
use chrono::{TimeDelta, Utc};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(name = "bitsend")]
#[command(author, version, about = "Send bitcoin and Lightning payments on a regtest network")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Launch the interactive TUI
    Tui,
    /// Show account balances
    Balance {
        /// Only this account
        account: Option<String>,
    },
    /// Show the transaction history of an account
    History {
        /// Account code
        account: String,
        /// Days of daily balances to print
        #[arg(long, default_value_t = 7)]
        days: i64,
    },
    /// Check that Docker and the node containers are up
    Status,
    /// Ask the Lightning node what an invoice or other input is
    Decode {
        /// Invoice, address, node id or URL
        input: String,
    },
}

fn filter(verbosity: u8) -> EnvFilter {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    EnvFilter::new(level)
}

fn setup_logging(verbosity: u8) {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter(verbosity))
        .init();
}

/// The TUI owns the terminal, so its logs go to a file.
fn setup_file_logging(verbosity: u8, config: &Config) -> Result<()> {
    let path = config.log_path();
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
        .with(filter(verbosity.max(1)))
        .init();
    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    config.context("loading configuration")
}

fn signed_amount(sats: i64, unit: BtcUnit) -> String {
    let formatted = format_sats(sats.unsigned_abs(), unit);
    if sats < 0 {
        format!("-{formatted}")
    } else {
        formatted
    }
}

async fn balance(config: &Config, account: Option<String>) -> Result<()> {
    let backend = bitsend_nodes::regtest_backend(config)?;
    let accounts = backend.accounts.accounts().await?;
    let wanted = account.map(AccountCode::new);

    let mut shown = 0;
    for account in accounts
        .iter()
        .filter(|account| wanted.as_ref().is_none_or(|code| &account.code == code))
    {
        let balance = backend.accounts.get_balance(&account.code).await?;
        print!("{:<12} {:<20} {}", account.code, account.name, balance.available);
        if balance.has_incoming {
            print!("  (+{} incoming)", balance.incoming);
        }
        println!();
        shown += 1;
    }

    if shown == 0 {
        bail!("no matching account");
    }
    Ok(())
}

async fn history(config: &Config, account: String, days: i64) -> Result<()> {
    let backend = bitsend_nodes::regtest_backend(config)?;
    let code = AccountCode::new(account);
    let txs = OrderedTransactions::new(backend.accounts.get_transactions(&code).await?);
    let unit = config.btc_unit;

    if txs.is_empty() {
        println!("No transactions.");
        return Ok(());
    }

    for entry in &txs {
        let when = entry
            .tx
            .timestamp
            .map_or_else(|| "pending".to_string(), |ts| ts.format("%Y-%m-%d %H:%M").to_string());
        println!(
            "{when:<16} {:<8} {:>18} {:>18}  {}",
            format!("{:?}", entry.tx.kind),
            signed_amount(entry.tx.delta(), unit),
            signed_amount(entry.balance, unit),
            entry.tx.note.as_deref().unwrap_or(&entry.tx.txid),
        );
    }

    let end = Utc::now();
    let start = end - TimeDelta::days(days);
    println!();
    for point in txs.timeseries(start, end, TimeDelta::days(1))? {
        println!("{} {}", point.time.format("%Y-%m-%d"), signed_amount(point.value, unit));
    }
    Ok(())
}

async fn status(config: &Config) -> Result<()> {
    let status = bitsend_nodes::node_status(config)
        .await
        .context("Docker is not reachable")?;

    let state = |running: bool| if running { "running" } else { "not running" };
    println!("bitcoind  {:<28} {}", config.bitcoind.container, state(status.bitcoind));
    match (&config.lnd, status.lnd) {
        (Some(lnd), Some(running)) => println!("lnd       {:<28} {}", lnd.container, state(running)),
        _ => println!("lnd       not configured"),
    }

    if !status.bitcoind {
        bail!("bitcoind container is not running");
    }
    Ok(())
}

async fn decode(config: &Config, input: &str) -> Result<()> {
    let backend = bitsend_nodes::regtest_backend(config)?;
    let Some(lightning) = backend.lightning else {
        bail!("Lightning is not configured");
    };

    match lightning.parse_input(input).await {
        Ok(InputType::Bolt11 { invoice }) => {
            println!("invoice      {}", invoice.payment_hash);
            println!("payee        {}", invoice.payee_pubkey);
            println!("amount       {} sats", invoice.amount_sat());
            if let Some(description) = invoice.description {
                println!("memo         {description}");
            }
            println!("expires      {}", invoice.timestamp + invoice.expiry);
        }
        Ok(InputType::BitcoinAddress { address }) => println!("bitcoin address {address}"),
        Ok(InputType::NodeId { node_id }) => println!("node id {node_id}"),
        Ok(InputType::Url { url }) => println!("url {url}"),
        Err(e) => bail!(e.user_message()),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Some(Commands::Tui) | None => {
            setup_file_logging(cli.verbose, &config)?;
            tracing::info!("Launching TUI...");
            bitsend_tui::run(config).await?;
        }
        Some(Commands::Balance { account }) => {
            setup_logging(cli.verbose);
            balance(&config, account).await?;
        }
        Some(Commands::History { account, days }) => {
            setup_logging(cli.verbose);
            history(&config, account, days).await?;
        }
        Some(Commands::Status) => {
            setup_logging(cli.verbose);
            status(&config).await?;
        }
        Some(Commands::Decode { input }) => {
            setup_logging(cli.verbose);
            decode(&config, &input).await?;
        }
    }

    Ok(())
}
