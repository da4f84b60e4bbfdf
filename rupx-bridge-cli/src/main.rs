//! rupx-bridge
//!
//! Command-line front-end for moving RUPX between the Rupaya testnet and
//! the BSC testnet.
//!
//! Configuration comes from the environment (or a `.env` file); transfers
//! additionally need `RUPX_PRIVATE_KEY`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use ethers::types::U256;
use rupx_bridge::types::{checksummed, format_amount};
use rupx_bridge::{
    BalanceSnapshot, BridgeConfig, BridgeController, ChainId, LimitStatus, LocalKeyWallet,
    Reading, TransferRequest, WalletProvider, TOKEN_SYMBOL, WRAPPED_TOKEN_SYMBOL,
};
use tracing::{info, warn};

const PRIVATE_KEY_ENV: &str = "RUPX_PRIVATE_KEY";

/// Log filter when `RUST_LOG` is unset. The binary is named `rupx-bridge`,
/// so its own events share the library's `rupx_bridge` target.
const DEFAULT_LOG_FILTER: &str = "rupx_bridge=info";

#[derive(Parser)]
#[command(
    name = "rupx-bridge",
    about = "Bridge RUPX between the Rupaya testnet and the BSC testnet"
)]
struct Cli {
    /// Chain the local wallet starts on.
    #[arg(long, global = true, default_value = "rupaya")]
    wallet_chain: ChainId,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show native and wrapped balances of the wallet account.
    Balances,
    /// Show the bridge limits published on both chains.
    Limits,
    /// Deposit (Rupaya -> BSC) or burn (BSC -> Rupaya) RUPX.
    Transfer(TransferArgs),
    /// Print the transfer history of the wallet account.
    History {
        /// Print the raw JSON records.
        #[arg(long)]
        json: bool,
    },
    /// Write the transfer history to a JSON file.
    Export {
        /// Directory the export file is written to.
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },
    /// Delete the transfer history of the wallet account.
    Clear {
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
    /// Refresh balances and limits periodically until interrupted.
    Watch {
        /// Seconds between refreshes.
        #[arg(long, default_value_t = 15)]
        interval: u64,
    },
}

#[derive(Args)]
struct TransferArgs {
    /// Source chain (rupaya | bsc).
    #[arg(long)]
    from: ChainId,
    /// Destination chain (rupaya | bsc).
    #[arg(long)]
    to: ChainId,
    /// Amount in whole RUPX, e.g. 5 or 0.25.
    #[arg(long)]
    amount: String,
    /// Move the wallet to the source chain before submitting.
    #[arg(long)]
    switch: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .init();

    let cli = Cli::parse();
    let config = BridgeConfig::from_env().context("failed to load bridge configuration")?;

    let wallet = load_wallet(&config, cli.wallet_chain)?;
    let controller = Arc::new(
        BridgeController::from_config(
            config,
            wallet.clone().map(|w| w as Arc<dyn WalletProvider>),
        )
        .context("failed to initialise bridge")?,
    );

    match cli.command {
        Commands::Balances => balances(&controller).await,
        Commands::Limits => limits(&controller).await,
        Commands::Transfer(args) => transfer(&controller, wallet, args).await,
        Commands::History { json } => history(&controller, json).await,
        Commands::Export { output_dir } => export(&controller, output_dir).await,
        Commands::Clear { yes } => clear(&controller, yes).await,
        Commands::Watch { interval } => watch(&controller, interval).await,
    }
}

fn load_wallet(config: &BridgeConfig, chain: ChainId) -> Result<Option<Arc<LocalKeyWallet>>> {
    match std::env::var(PRIVATE_KEY_ENV) {
        Ok(key) if !key.trim().is_empty() => {
            let wallet = LocalKeyWallet::new(&key, config, chain)
                .with_context(|| format!("invalid {PRIVATE_KEY_ENV}"))?;
            Ok(Some(Arc::new(wallet)))
        }
        _ => Ok(None),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMMANDS
// ═══════════════════════════════════════════════════════════════════════════════

async fn balances(controller: &BridgeController) -> Result<()> {
    let address = controller.connect().await.context("failed to connect wallet")?;
    println!("Account: {}", checksummed(&address));
    print_balances(&controller.balances().await?);
    Ok(())
}

async fn limits(controller: &BridgeController) -> Result<()> {
    for (chain, status) in controller.refresh_limits().await {
        println!("{:<8} {}", chain.label(), describe_limits(&status));
    }
    Ok(())
}

async fn transfer(
    controller: &BridgeController,
    wallet: Option<Arc<LocalKeyWallet>>,
    args: TransferArgs,
) -> Result<()> {
    let Some(wallet) = wallet else {
        bail!("{PRIVATE_KEY_ENV} is required for transfers");
    };
    if args.switch {
        wallet.switch_chain(args.from).await;
    }

    controller.connect().await.context("failed to connect wallet")?;
    info!(
        "Submitting {} {} from {} to {}",
        args.amount, TOKEN_SYMBOL, args.from, args.to
    );
    let request = TransferRequest::new(args.from, args.to, args.amount);

    let outcome = controller.submit(&request).await.context("transfer rejected")?;
    let link = controller.explorer_url(&outcome.record).unwrap_or_default();

    if let Some(e) = &outcome.ledger_error {
        warn!("Transfer history could not be updated: {}", e);
    }
    match &outcome.failure {
        None => {
            println!("Transfer completed: {}", outcome.tx_hash());
            println!("{link}");
            Ok(())
        }
        Some(cause) => {
            println!("Transaction {} failed", outcome.tx_hash());
            println!("{link}");
            bail!("{cause}")
        }
    }
}

async fn history(controller: &BridgeController, json: bool) -> Result<()> {
    controller.connect().await.context("failed to connect wallet")?;
    let records = controller.history().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    if records.is_empty() {
        println!("No transactions yet.");
        return Ok(());
    }
    for record in records.iter().rev() {
        println!(
            "{}  {:>6} -> {:<6}  {:>12} {}  {:<9}  {}",
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            record.from,
            record.to,
            record.amount,
            TOKEN_SYMBOL,
            format!("{:?}", record.status),
            record.short_hash()
        );
    }
    Ok(())
}

async fn export(controller: &BridgeController, output_dir: PathBuf) -> Result<()> {
    controller.connect().await.context("failed to connect wallet")?;
    let (name, bytes) = controller.export_history().await?;

    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;
    let path = output_dir.join(name);
    std::fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
    println!("Exported history to {}", path.display());
    Ok(())
}

async fn clear(controller: &BridgeController, yes: bool) -> Result<()> {
    let address = controller.connect().await.context("failed to connect wallet")?;
    if !yes {
        bail!(
            "refusing to clear the history of {} without --yes",
            checksummed(&address)
        );
    }
    controller.clear_history().await?;
    println!("History cleared.");
    Ok(())
}

async fn watch(controller: &Arc<BridgeController>, interval: u64) -> Result<()> {
    let address = controller.connect().await.context("failed to connect wallet")?;
    let _events = controller.spawn_event_listener()?;
    println!("Watching {} (Ctrl-C to stop)", checksummed(&address));

    let mut ticker = tokio::time::interval(Duration::from_secs(interval.max(1)));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Stopping watch");
                return Ok(());
            }
            _ = ticker.tick() => {
                let snapshot = controller.refresh_balances().await?;
                for (chain, status) in controller.refresh_limits().await {
                    println!("{:<8} {}", chain.label(), describe_limits(&status));
                }
                print_balances(&snapshot);
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FORMATTING
// ═══════════════════════════════════════════════════════════════════════════════

fn print_balances(snapshot: &BalanceSnapshot) {
    for chain in ChainId::ALL {
        println!(
            "{:<8} {}",
            chain.label(),
            describe_reading(snapshot.native(chain), chain.native_symbol())
        );
    }
    println!(
        "{:<8} {}",
        WRAPPED_TOKEN_SYMBOL,
        describe_reading(&snapshot.wrapped, WRAPPED_TOKEN_SYMBOL)
    );
}

fn describe_reading(reading: &Reading<U256>, symbol: &str) -> String {
    match reading {
        Reading::Fresh(o) => format!("{} {symbol}", format_amount(o.value)),
        Reading::Stale(o) => format!("{} {symbol} (stale)", format_amount(o.value)),
        Reading::Unavailable => "unavailable".to_string(),
    }
}

fn describe_limits(status: &LimitStatus) -> String {
    match status {
        LimitStatus::Known(limits) => format!(
            "max {} {} per transfer, cooldown {}s",
            format_amount(limits.max_transfer_amount),
            TOKEN_SYMBOL,
            limits.cooldown_secs
        ),
        LimitStatus::Unknown => "limits unknown".to_string(),
    }
}
