mod config;

use clap::{Parser, Subcommand};
use serde::Serialize;

use std::{collections::HashSet, path::PathBuf};

use crate::{
    app::App,
    ingest::ChainNotification,
    payout::NewPayout,
    primitives::{
        bitcoin::{OutPoint, Txid},
        *,
    },
    utxo::UtxoState,
};
use config::*;

#[derive(Parser)]
#[clap(version, long_about = None)]
struct Cli {
    /// Sets a custom config file
    #[clap(short, long, env = "LEDGER_CONFIG", value_name = "FILE", global = true)]
    config: Option<PathBuf>,
    /// Connection string for a postgres event log
    #[clap(long, env = "PG_CON", global = true, hide_env_values = true)]
    pg_con: Option<String>,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Creates a new wallet
    CreateWallet {
        #[clap(short, long)]
        name: String,
        /// Confirmations before a utxo counts as settled
        #[clap(long)]
        settle_threshold: Option<u32>,
    },
    SetSettleThreshold {
        #[clap(short, long)]
        wallet: String,
        #[clap(long)]
        settle_threshold: u32,
    },
    ListWallets,
    /// Prints the balance facets of a wallet
    WalletBalance {
        #[clap(short, long)]
        wallet: String,
    },
    ListUtxos {
        #[clap(short, long)]
        wallet: String,
        /// Only list utxos in these states
        #[clap(short, long, value_enum)]
        state: Vec<UtxoState>,
    },
    /// Records an output paying to the wallet
    DetectOutput {
        #[clap(short, long)]
        wallet: String,
        #[clap(long)]
        outpoint: OutPoint,
        #[clap(long)]
        value: u64,
        #[clap(long)]
        derivation_path: String,
        #[clap(long)]
        block_height: Option<u32>,
    },
    ConfirmOutput {
        #[clap(short, long)]
        wallet: String,
        #[clap(long)]
        outpoint: OutPoint,
        #[clap(long)]
        block_height: u32,
    },
    SetTip {
        #[clap(short, long)]
        wallet: String,
        #[clap(long)]
        height: u32,
    },
    /// Pulls the chain tip from bitcoind
    SyncTip {
        #[clap(short, long)]
        wallet: String,
    },
    Reorg {
        #[clap(short, long)]
        wallet: String,
        #[clap(long, required = true)]
        outpoint: Vec<OutPoint>,
    },
    ConfirmSpend {
        #[clap(short, long)]
        wallet: String,
        #[clap(long)]
        txid: Txid,
        #[clap(long)]
        block_height: u32,
    },
    SubmitPayout {
        #[clap(short, long)]
        wallet: String,
        #[clap(long)]
        destination: String,
        #[clap(long)]
        amount: u64,
        #[clap(long)]
        external_id: Option<String>,
        /// Arbitrary json attached to the payout
        #[clap(long)]
        metadata: Option<String>,
    },
    CancelPayout {
        #[clap(short, long)]
        wallet: String,
        #[clap(long)]
        id: PayoutRequestId,
    },
    ListPayouts {
        #[clap(short, long)]
        wallet: String,
    },
    EstimatePayoutFee {
        #[clap(short, long)]
        wallet: String,
        #[clap(long)]
        amount: u64,
    },
    /// Groups every queued payout of a wallet into one batch
    FormBatch {
        #[clap(short, long)]
        wallet: String,
    },
    CancelBatch {
        #[clap(short, long)]
        wallet: String,
        #[clap(long)]
        id: BatchId,
    },
    BroadcastBatch {
        #[clap(short, long)]
        wallet: String,
        #[clap(long)]
        id: BatchId,
    },
    ListBatches {
        #[clap(short, long)]
        wallet: String,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_path(cli.config, EnvOverride { pg_con: cli.pg_con })?;
    crate::tracing::init_tracer(config.tracing)?;
    let app = App::connect(config.app).await?;

    match cli.command {
        Command::CreateWallet {
            name,
            settle_threshold,
        } => {
            let id = app.create_wallet(name, settle_threshold).await?;
            output_json(&serde_json::json!({ "id": id }))
        }
        Command::SetSettleThreshold {
            wallet,
            settle_threshold,
        } => {
            let wallet_id = app.find_wallet_by_name(&wallet).await?;
            app.set_settle_threshold(wallet_id, settle_threshold)
                .await?;
            output_json(&serde_json::json!({ "settleThreshold": settle_threshold }))
        }
        Command::ListWallets => {
            let wallets: Vec<_> = app
                .ledger()
                .list_wallets()
                .await
                .iter()
                .map(|w| {
                    serde_json::json!({
                        "id": w.wallet_id(),
                        "name": w.name(),
                        "settleThreshold": w.settle_threshold(),
                        "chainTip": w.chain_tip(),
                    })
                })
                .collect();
            output_json(&wallets)
        }
        Command::WalletBalance { wallet } => {
            let wallet_id = app.find_wallet_by_name(&wallet).await?;
            output_json(&app.get_balance(wallet_id).await?)
        }
        Command::ListUtxos { wallet, state } => {
            let wallet_id = app.find_wallet_by_name(&wallet).await?;
            let filter: HashSet<_> = state.into_iter().collect();
            output_json(&app.list_utxos(wallet_id, &filter).await?)
        }
        Command::DetectOutput {
            wallet,
            outpoint,
            value,
            derivation_path,
            block_height,
        } => {
            let notification = ChainNotification::OutputDetected {
                outpoint,
                value: Satoshis::from(value),
                derivation_path,
                block_height,
            };
            ingest(&app, &wallet, notification).await
        }
        Command::ConfirmOutput {
            wallet,
            outpoint,
            block_height,
        } => {
            let notification = ChainNotification::OutputConfirmed {
                outpoint,
                block_height,
            };
            ingest(&app, &wallet, notification).await
        }
        Command::SetTip { wallet, height } => {
            ingest(&app, &wallet, ChainNotification::TipAdvanced { height }).await
        }
        Command::SyncTip { wallet } => {
            let wallet_id = app.find_wallet_by_name(&wallet).await?;
            output_json(&app.sync_tip(wallet_id).await?)
        }
        Command::Reorg { wallet, outpoint } => {
            let notification = ChainNotification::Reorg {
                invalidated: outpoint,
            };
            ingest(&app, &wallet, notification).await
        }
        Command::ConfirmSpend {
            wallet,
            txid,
            block_height,
        } => {
            let notification = ChainNotification::SpendConfirmed { txid, block_height };
            ingest(&app, &wallet, notification).await
        }
        Command::SubmitPayout {
            wallet,
            destination,
            amount,
            external_id,
            metadata,
        } => {
            let wallet_id = app.find_wallet_by_name(&wallet).await?;
            let mut builder = NewPayout::builder();
            builder
                .wallet_id(wallet_id)
                .destination(PayoutDestination::OnchainAddress { value: destination })
                .value(Satoshis::from(amount));
            if let Some(external_id) = external_id {
                builder.external_id(external_id);
            }
            if let Some(metadata) = metadata {
                builder.metadata(serde_json::from_str(&metadata)?);
            }
            let id = app.submit_payout_with(builder.build()?).await?;
            output_json(&serde_json::json!({ "id": id }))
        }
        Command::CancelPayout { wallet, id } => {
            let wallet_id = app.find_wallet_by_name(&wallet).await?;
            app.cancel_payout(wallet_id, id).await?;
            output_json(&serde_json::json!({ "id": id, "cancelled": true }))
        }
        Command::ListPayouts { wallet } => {
            let wallet_id = app.find_wallet_by_name(&wallet).await?;
            output_json(&app.list_payouts(wallet_id).await?)
        }
        Command::EstimatePayoutFee { wallet, amount } => {
            let wallet_id = app.find_wallet_by_name(&wallet).await?;
            let fee = app
                .estimate_payout_fee(wallet_id, Satoshis::from(amount))
                .await?;
            output_json(&serde_json::json!({ "feeSats": fee }))
        }
        Command::FormBatch { wallet } => {
            let wallet_id = app.find_wallet_by_name(&wallet).await?;
            let id = app.form_batch(wallet_id).await?;
            output_json(&serde_json::json!({ "id": id }))
        }
        Command::CancelBatch { wallet, id } => {
            let wallet_id = app.find_wallet_by_name(&wallet).await?;
            app.cancel_batch(wallet_id, id).await?;
            output_json(&serde_json::json!({ "id": id, "cancelled": true }))
        }
        Command::BroadcastBatch { wallet, id } => {
            let wallet_id = app.find_wallet_by_name(&wallet).await?;
            let txid = app.broadcast_batch(wallet_id, id).await?;
            output_json(&serde_json::json!({ "id": id, "txid": txid }))
        }
        Command::ListBatches { wallet } => {
            let wallet_id = app.find_wallet_by_name(&wallet).await?;
            output_json(&app.list_batches(wallet_id).await?)
        }
    }
}

async fn ingest(app: &App, wallet: &str, notification: ChainNotification) -> anyhow::Result<()> {
    let wallet_id = app.find_wallet_by_name(wallet).await?;
    output_json(&app.ingest(wallet_id, notification).await?)
}

fn output_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
