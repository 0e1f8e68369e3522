mod helpers;

use utxo_ledger::{ingest::*, primitives::*};

#[tokio::test]
async fn balance_follows_a_payout_through_its_lifecycle() -> anyhow::Result<()> {
    let env = helpers::init_env().await?;
    let app = &env.app;
    let wallet_id = helpers::funded_wallet(app, &[100_000]).await?;
    app.ingest(
        wallet_id,
        ChainNotification::OutputDetected {
            outpoint: helpers::outpoint(1),
            value: helpers::sats(20_000),
            derivation_path: "m/84'/1'/0'/0/1".to_string(),
            block_height: None,
        },
    )
    .await?;

    let balance = app.get_balance(wallet_id).await?;
    assert_eq!(balance.wallet_id, wallet_id);
    assert_eq!(balance.pending_incoming_utxos, helpers::sats(20_000));
    assert_eq!(balance.confirmed_utxos, helpers::sats(100_000));
    assert_eq!(balance.logical_settled, helpers::sats(100_000));

    app.submit_payout(wallet_id, helpers::destination(), helpers::sats(30_000))
        .await?;
    let batch_id = app.form_batch(wallet_id).await?;
    let balance = app.get_balance(wallet_id).await?;
    assert_eq!(balance.confirmed_utxos, helpers::sats(100_000));
    assert_eq!(balance.logical_settled, Satoshis::ZERO);
    assert_eq!(balance.logical_encumbered_outgoing, helpers::sats(30_000));
    assert_eq!(balance.encumbered_fees, helpers::sats(141));
    assert_eq!(balance.logical_pending_outgoing, Satoshis::ZERO);

    app.submit_payout(wallet_id, helpers::destination(), helpers::sats(10_000))
        .await?;
    let balance = app.get_balance(wallet_id).await?;
    assert_eq!(balance.logical_pending_outgoing, helpers::sats(10_000));
    assert_eq!(balance.pending_fees, helpers::sats(99));

    let txid = app.broadcast_batch(wallet_id, batch_id).await?;
    let balance = app.get_balance(wallet_id).await?;
    assert_eq!(balance.confirmed_utxos, helpers::sats(100_000));
    assert_eq!(balance.logical_encumbered_outgoing, helpers::sats(30_000));
    assert_eq!(balance.encumbered_fees, helpers::sats(141));

    app.ingest(
        wallet_id,
        ChainNotification::SpendConfirmed {
            txid,
            block_height: 2,
        },
    )
    .await?;
    let balance = app.get_balance(wallet_id).await?;
    assert_eq!(balance.confirmed_utxos, Satoshis::ZERO);
    assert_eq!(balance.logical_encumbered_outgoing, Satoshis::ZERO);
    assert_eq!(balance.encumbered_fees, Satoshis::ZERO);
    assert_eq!(balance.pending_incoming_utxos, helpers::sats(20_000));
    assert_eq!(balance.logical_pending_outgoing, helpers::sats(10_000));

    Ok(())
}

#[tokio::test]
async fn balance_serializes_with_camel_case_facets() -> anyhow::Result<()> {
    let env = helpers::init_env().await?;
    let wallet_id = helpers::funded_wallet(&env.app, &[1_000]).await?;
    let json = serde_json::to_value(env.app.get_balance(wallet_id).await?)?;
    for facet in [
        "walletId",
        "pendingIncomingUtxos",
        "confirmedUtxos",
        "logicalSettled",
        "logicalPendingOutgoing",
        "logicalEncumberedOutgoing",
        "pendingFees",
        "encumberedFees",
    ] {
        assert!(json.get(facet).is_some(), "missing {facet}");
    }
    assert_eq!(json["logicalSettled"], 1_000);
    Ok(())
}

#[tokio::test]
async fn pending_utxo_moves_to_settled_facets() -> anyhow::Result<()> {
    let env = helpers::init_env().await?;
    let app = &env.app;
    let wallet_id = app.create_wallet(helpers::wallet_name(), Some(3)).await?;
    app.ingest(
        wallet_id,
        ChainNotification::OutputDetected {
            outpoint: helpers::outpoint(0),
            value: helpers::sats(100_000),
            derivation_path: "m/84'/1'/0'/0/0".to_string(),
            block_height: None,
        },
    )
    .await?;

    let balance = app.get_balance(wallet_id).await?;
    assert_eq!(balance.pending_incoming_utxos, helpers::sats(100_000));
    assert_eq!(balance.confirmed_utxos, Satoshis::ZERO);
    assert_eq!(balance.logical_settled, Satoshis::ZERO);
    assert_eq!(balance.logical_pending_outgoing, Satoshis::ZERO);
    assert_eq!(balance.logical_encumbered_outgoing, Satoshis::ZERO);
    assert_eq!(balance.pending_fees, Satoshis::ZERO);
    assert_eq!(balance.encumbered_fees, Satoshis::ZERO);

    app.ingest(
        wallet_id,
        ChainNotification::OutputConfirmed {
            outpoint: helpers::outpoint(0),
            block_height: 100,
        },
    )
    .await?;
    let balance = app.get_balance(wallet_id).await?;
    assert_eq!(balance.pending_incoming_utxos, helpers::sats(100_000));

    app.ingest(wallet_id, ChainNotification::TipAdvanced { height: 102 })
        .await?;
    let balance = app.get_balance(wallet_id).await?;
    assert_eq!(balance.pending_incoming_utxos, Satoshis::ZERO);
    assert_eq!(balance.confirmed_utxos, helpers::sats(100_000));
    assert_eq!(balance.logical_settled, helpers::sats(100_000));

    Ok(())
}

#[tokio::test]
async fn batch_with_fixed_fee_moves_payout_to_encumbered() -> anyhow::Result<()> {
    // 141 vbytes at 3.54 sat/vbyte round up to a 500 sat fee
    let env = helpers::init_env_at(helpers::MockNode::default(), 3.54).await?;
    let app = &env.app;
    let wallet_id = helpers::funded_wallet(app, &[100_000]).await?;
    app.submit_payout(wallet_id, helpers::destination(), helpers::sats(30_000))
        .await?;

    let balance = app.get_balance(wallet_id).await?;
    assert_eq!(balance.logical_pending_outgoing, helpers::sats(30_000));
    assert_eq!(balance.logical_settled, helpers::sats(100_000));
    // 99 vbytes at 3.54 sat/vbyte, priced from the first submission on
    assert_eq!(balance.pending_fees, helpers::sats(351));

    app.form_batch(wallet_id).await?;
    let balance = app.get_balance(wallet_id).await?;
    assert_eq!(balance.logical_settled, Satoshis::ZERO);
    assert_eq!(balance.logical_encumbered_outgoing, helpers::sats(30_000));
    assert_eq!(balance.encumbered_fees, helpers::sats(500));
    assert_eq!(balance.logical_pending_outgoing, Satoshis::ZERO);
    assert_eq!(balance.pending_fees, Satoshis::ZERO);
    helpers::assert_no_double_encumbrance(app, wallet_id).await?;

    Ok(())
}

#[tokio::test]
async fn insufficient_funds_changes_nothing() -> anyhow::Result<()> {
    let env = helpers::init_env().await?;
    let app = &env.app;
    let wallet_id = helpers::funded_wallet(app, &[20_000]).await?;
    app.submit_payout(wallet_id, helpers::destination(), helpers::sats(30_000))
        .await?;
    let utxos_before = app.list_utxos(wallet_id, &Default::default()).await?;
    let balance_before = app.get_balance(wallet_id).await?;

    assert!(app.form_batch(wallet_id).await.is_err());

    assert_eq!(
        app.list_utxos(wallet_id, &Default::default()).await?,
        utxos_before
    );
    assert_eq!(app.get_balance(wallet_id).await?, balance_before);
    Ok(())
}
