#[tokio::main]
async fn main() -> anyhow::Result<()> {
    utxo_ledger::cli::run().await
}
