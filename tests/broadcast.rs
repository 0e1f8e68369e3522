mod helpers;

use std::sync::Arc;

use utxo_ledger::{
    app::error::ApplicationError,
    batch::BatchStatus,
    ingest::*,
    ledger::error::LedgerError,
    node::error::NodeError,
    payout::PayoutStatus,
    primitives::{bitcoin::*, *},
    utxo::UtxoState,
};

#[tokio::test]
async fn broadcast_spends_inputs_and_pays_destinations() -> anyhow::Result<()> {
    let env = helpers::init_env().await?;
    let app = &env.app;
    let wallet_id = helpers::funded_wallet(app, &[50_000, 40_000]).await?;
    app.submit_payout(wallet_id, helpers::destination(), helpers::sats(30_000))
        .await?;
    app.submit_payout(wallet_id, helpers::destination(), helpers::sats(25_000))
        .await?;
    let batch_id = app.form_batch(wallet_id).await?;

    let txid = app.broadcast_batch(wallet_id, batch_id).await?;

    let broadcasts = env.node.broadcasts.lock().await;
    assert_eq!(broadcasts.len(), 1);
    let tx = &broadcasts[0];
    assert_eq!(tx.txid(), txid);
    assert_eq!(
        tx.input.iter().map(|i| i.previous_output).collect::<Vec<_>>(),
        vec![helpers::outpoint(0), helpers::outpoint(1)]
    );
    let destination = helpers::DESTINATION
        .parse::<Address<NetworkUnchecked>>()?
        .require_network(Network::Regtest)?;
    let change = helpers::CHANGE_ADDRESS
        .parse::<Address<NetworkUnchecked>>()?
        .require_network(Network::Regtest)?;
    let outputs: Vec<_> = tx
        .output
        .iter()
        .map(|o| (o.script_pubkey.clone(), o.value))
        .collect();
    assert_eq!(
        outputs,
        vec![
            (destination.script_pubkey(), 30_000),
            (destination.script_pubkey(), 25_000),
            (change.script_pubkey(), 34_760),
        ]
    );
    drop(broadcasts);

    let snapshot = app.ledger().snapshot(wallet_id).await?;
    let batch = snapshot.batch(batch_id).expect("batch exists");
    assert_eq!(batch.status, BatchStatus::Broadcast);
    assert_eq!(batch.txid, Some(txid));
    let spent = snapshot.utxos(&[UtxoState::Spent].into_iter().collect());
    assert_eq!(spent.len(), 2);

    // a repeated broadcast reports the same transaction
    assert_eq!(app.broadcast_batch(wallet_id, batch_id).await?, txid);
    assert_eq!(env.node.broadcasts.lock().await.len(), 1);

    Ok(())
}

#[tokio::test]
async fn confirmed_spend_closes_the_batch() -> anyhow::Result<()> {
    let env = helpers::init_env().await?;
    let app = &env.app;
    let wallet_id = helpers::funded_wallet(app, &[100_000]).await?;
    app.submit_payout(wallet_id, helpers::destination(), helpers::sats(30_000))
        .await?;
    let batch_id = app.form_batch(wallet_id).await?;
    let txid = app.broadcast_batch(wallet_id, batch_id).await?;

    let outcome = app
        .ingest(
            wallet_id,
            ChainNotification::SpendConfirmed {
                txid,
                block_height: 5,
            },
        )
        .await?;
    assert!(matches!(outcome, IngestOutcome::Applied { .. }));
    let snapshot = app.ledger().snapshot(wallet_id).await?;
    let batch = snapshot.batch(batch_id).expect("batch exists");
    assert_eq!(batch.status, BatchStatus::Confirmed);
    assert_eq!(batch.confirmed_height, Some(5));
    assert_eq!(snapshot.chain_tip(), Some(5));

    let again = app
        .ingest(
            wallet_id,
            ChainNotification::SpendConfirmed {
                txid,
                block_height: 5,
            },
        )
        .await?;
    assert_eq!(again, IngestOutcome::Unchanged);

    let foreign = app
        .ingest(
            wallet_id,
            ChainNotification::SpendConfirmed {
                txid: "0000000000000000000000000000000000000000000000000000000000000000".parse()?,
                block_height: 6,
            },
        )
        .await?;
    assert_eq!(foreign, IngestOutcome::Unchanged);

    Ok(())
}

#[tokio::test]
async fn failed_broadcast_cancels_the_batch() -> anyhow::Result<()> {
    let env = helpers::init_env().await?;
    let app = &env.app;
    let wallet_id = helpers::funded_wallet(app, &[100_000]).await?;
    let payout_id = app
        .submit_payout(wallet_id, helpers::destination(), helpers::sats(30_000))
        .await?;
    let batch_id = app.form_batch(wallet_id).await?;
    *env.node.reject_with.lock().await = Some("min relay fee not met".to_string());

    let result = app.broadcast_batch(wallet_id, batch_id).await;
    assert!(matches!(
        result,
        Err(ApplicationError::Ledger(LedgerError::NodeError(
            NodeError::Rejected(_)
        )))
    ));

    let snapshot = app.ledger().snapshot(wallet_id).await?;
    let batch = snapshot.batch(batch_id).expect("batch exists");
    assert_eq!(batch.status, BatchStatus::Cancelled);
    assert!(batch
        .cancel_reason
        .as_deref()
        .map(|r| r.contains("min relay fee not met"))
        .unwrap_or(false));
    assert_eq!(
        snapshot.payout(payout_id).map(|p| p.status),
        Some(PayoutStatus::Queued)
    );
    let utxo = snapshot.utxo(helpers::outpoint(0)).expect("utxo exists");
    assert_eq!(utxo.state, UtxoState::Settled);
    assert_eq!(utxo.batch_id, None);

    // the queued payout can be batched again
    *env.node.reject_with.lock().await = None;
    let retry = app.form_batch(wallet_id).await?;
    assert_ne!(retry, batch_id);
    app.broadcast_batch(wallet_id, retry).await?;

    Ok(())
}

#[tokio::test]
async fn cancel_batch_releases_inputs() -> anyhow::Result<()> {
    let env = helpers::init_env().await?;
    let app = &env.app;
    let wallet_id = helpers::funded_wallet(app, &[100_000]).await?;
    let payout_id = app
        .submit_payout(wallet_id, helpers::destination(), helpers::sats(30_000))
        .await?;
    let batch_id = app.form_batch(wallet_id).await?;

    app.cancel_batch(wallet_id, batch_id).await?;
    let snapshot = app.ledger().snapshot(wallet_id).await?;
    assert_eq!(
        snapshot.batch(batch_id).map(|b| b.status),
        Some(BatchStatus::Cancelled)
    );
    assert_eq!(
        snapshot.payout(payout_id).map(|p| p.status),
        Some(PayoutStatus::Queued)
    );
    assert_eq!(
        snapshot.utxo(helpers::outpoint(0)).map(|u| u.state),
        Some(UtxoState::Settled)
    );

    let broadcast = app.broadcast_batch(wallet_id, batch_id).await;
    assert!(matches!(
        broadcast,
        Err(ApplicationError::Ledger(LedgerError::InvalidState {
            status: BatchStatus::Cancelled,
            ..
        }))
    ));

    Ok(())
}

#[tokio::test]
async fn broadcast_batch_cannot_be_cancelled() -> anyhow::Result<()> {
    let env = helpers::init_env().await?;
    let app = &env.app;
    let wallet_id = helpers::funded_wallet(app, &[100_000]).await?;
    app.submit_payout(wallet_id, helpers::destination(), helpers::sats(30_000))
        .await?;
    let batch_id = app.form_batch(wallet_id).await?;
    app.broadcast_batch(wallet_id, batch_id).await?;

    let result = app.cancel_batch(wallet_id, batch_id).await;
    assert!(matches!(
        result,
        Err(ApplicationError::Ledger(LedgerError::InvalidState {
            status: BatchStatus::Broadcast,
            ..
        }))
    ));
    Ok(())
}

#[tokio::test]
async fn cancel_during_broadcast_is_refused() -> anyhow::Result<()> {
    let hold = helpers::BroadcastHold::default();
    let env = helpers::init_env_with(helpers::MockNode::holding(hold.clone())).await?;
    let app = env.app.clone();
    let wallet_id = helpers::funded_wallet(&app, &[100_000]).await?;
    app.submit_payout(wallet_id, helpers::destination(), helpers::sats(30_000))
        .await?;
    let batch_id = app.form_batch(wallet_id).await?;

    let broadcasting = {
        let app = app.clone();
        tokio::spawn(async move { app.broadcast_batch(wallet_id, batch_id).await })
    };
    hold.entered.notified().await;

    // the wallet lock is free while the node is called
    let balance = app.get_balance(wallet_id).await?;
    assert_eq!(balance.logical_encumbered_outgoing, helpers::sats(30_000));
    let cancel = app.cancel_batch(wallet_id, batch_id).await;
    assert!(matches!(
        cancel,
        Err(ApplicationError::Ledger(LedgerError::InvalidState {
            status: BatchStatus::Open,
            ..
        }))
    ));
    let second_broadcast = app.broadcast_batch(wallet_id, batch_id).await;
    assert!(matches!(
        second_broadcast,
        Err(ApplicationError::Ledger(LedgerError::InvalidState { .. }))
    ));

    hold.release.notify_one();
    let txid = broadcasting.await??;
    let snapshot = app.ledger().snapshot(wallet_id).await?;
    let batch = snapshot.batch(batch_id).expect("batch exists");
    assert_eq!(batch.status, BatchStatus::Broadcast);
    assert_eq!(batch.txid, Some(txid));

    Ok(())
}

#[tokio::test]
async fn lock_timeout_is_reported() -> anyhow::Result<()> {
    use utxo_ledger::{event_log::FileEventLog, ledger::*};

    let dir = tempfile::tempdir()?;
    let log = Arc::new(FileEventLog::open(dir.path()).await?);
    let config = LedgerConfig {
        lock_timeout: Some(std::time::Duration::from_millis(20)),
        ..LedgerConfig::default()
    };
    let ledger = Ledger::init(config, log).await?;
    let wallet_id = ledger.create_wallet(helpers::wallet_name(), None).await?;

    let guard = ledger.lock(wallet_id).await?;
    let blocked = ledger.set_settle_threshold(wallet_id, 2).await;
    assert!(matches!(blocked, Err(error::LedgerError::LockTimeout(_))));
    drop(guard);
    ledger.set_settle_threshold(wallet_id, 2).await?;

    Ok(())
}

#[tokio::test]
async fn accepted_broadcast_is_recorded_past_the_lock_timeout() -> anyhow::Result<()> {
    let hold = helpers::BroadcastHold::default();
    let config = utxo_ledger::ledger::LedgerConfig {
        lock_timeout: Some(std::time::Duration::from_millis(20)),
        ..Default::default()
    };
    let env =
        helpers::init_env_configured(helpers::MockNode::holding(hold.clone()), 1.0, config)
            .await?;
    let app = env.app.clone();
    let wallet_id = helpers::funded_wallet(&app, &[100_000]).await?;
    app.submit_payout(wallet_id, helpers::destination(), helpers::sats(30_000))
        .await?;
    let batch_id = app.form_batch(wallet_id).await?;

    let broadcasting = {
        let app = app.clone();
        tokio::spawn(async move { app.broadcast_batch(wallet_id, batch_id).await })
    };
    hold.entered.notified().await;

    // another writer keeps the wallet well past the timeout while the node accepts
    let guard = app.ledger().lock(wallet_id).await?;
    hold.release.notify_one();
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert!(!broadcasting.is_finished());
    drop(guard);

    let txid = broadcasting.await??;
    let snapshot = app.ledger().snapshot(wallet_id).await?;
    let batch = snapshot.batch(batch_id).expect("batch exists");
    assert_eq!(batch.status, BatchStatus::Broadcast);
    assert_eq!(batch.txid, Some(txid));
    assert_eq!(
        snapshot.utxo(helpers::outpoint(0)).map(|u| u.state),
        Some(UtxoState::Spent)
    );
    Ok(())
}
