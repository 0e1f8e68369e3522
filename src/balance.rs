use serde::Serialize;

use crate::{fees, ledger::WalletLedger, primitives::*, utxo::*};

/// The seven balance facets of a wallet, derived from one ledger snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletBalanceSummary {
    pub wallet_id: WalletId,
    pub pending_incoming_utxos: Satoshis,
    pub confirmed_utxos: Satoshis,
    pub logical_settled: Satoshis,
    pub logical_pending_outgoing: Satoshis,
    pub logical_encumbered_outgoing: Satoshis,
    pub pending_fees: Satoshis,
    pub encumbered_fees: Satoshis,
}

impl From<&WalletLedger> for WalletBalanceSummary {
    fn from(ledger: &WalletLedger) -> Self {
        let chain = ledger.chain_view();
        let mut summary = WalletBalanceSummary {
            wallet_id: ledger.wallet_id(),
            pending_incoming_utxos: Satoshis::ZERO,
            confirmed_utxos: Satoshis::ZERO,
            logical_settled: Satoshis::ZERO,
            logical_pending_outgoing: Satoshis::ZERO,
            logical_encumbered_outgoing: Satoshis::ZERO,
            pending_fees: Satoshis::ZERO,
            encumbered_fees: Satoshis::ZERO,
        };

        for utxo in ledger.raw_utxos() {
            match utxo.state(chain) {
                UtxoState::Pending | UtxoState::Confirmed => {
                    summary.pending_incoming_utxos += utxo.value;
                }
                UtxoState::Settled => {
                    summary.confirmed_utxos += utxo.value;
                    summary.logical_settled += utxo.value;
                }
                UtxoState::Encumbered => summary.confirmed_utxos += utxo.value,
                UtxoState::Spent => {
                    // still on chain from our point of view until the spend confirms
                    let in_broadcast_batch = utxo
                        .reserved_by()
                        .and_then(|batch_id| ledger.batch(batch_id))
                        .map(|b| b.status == crate::batch::BatchStatus::Broadcast)
                        .unwrap_or(false);
                    if in_broadcast_batch {
                        summary.confirmed_utxos += utxo.value;
                    }
                }
                UtxoState::Invalidated => (),
            }
        }

        let marginal_fee = ledger
            .fee_rate()
            .map(fees::marginal_payout_fee)
            .unwrap_or(Satoshis::ZERO);
        for payout in ledger.queued_payouts() {
            summary.logical_pending_outgoing += payout.value;
            summary.pending_fees += marginal_fee;
        }

        for batch in ledger.batches().iter().filter(|b| b.is_active()) {
            summary.logical_encumbered_outgoing += batch.total_payouts();
            summary.encumbered_fees += batch.estimated_fee;
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ledger::LedgerEvent, primitives::bitcoin::OutPoint};

    fn detected(vout: u32, value: u64, block_height: Option<u32>) -> LedgerEvent {
        UtxoEvent::Detected {
            outpoint: OutPoint {
                txid: "4010e27ff7dc6d9c66a5657e6b3d94b4c4e394d968398d16fefe4637463d194d"
                    .parse()
                    .unwrap(),
                vout,
            },
            value: Satoshis::from(value),
            derivation_path: format!("m/84'/1'/0'/0/{vout}"),
            block_height,
        }
        .into()
    }

    #[test]
    fn incoming_utxos_split_by_settlement() {
        let mut ledger = WalletLedger::new(WalletId::new(), "hot".to_string(), 2);
        for event in [
            LedgerEvent::ChainTipUpdated { height: 101 },
            detected(0, 50_000, None),
            detected(1, 20_000, Some(101)),
            detected(2, 30_000, Some(100)),
        ] {
            ledger.apply_event(&event).unwrap();
        }

        let summary = WalletBalanceSummary::from(&ledger);
        assert_eq!(summary.pending_incoming_utxos, Satoshis::from(70_000u64));
        assert_eq!(summary.confirmed_utxos, Satoshis::from(30_000u64));
        assert_eq!(summary.logical_settled, Satoshis::from(30_000u64));
        assert_eq!(summary.pending_fees, Satoshis::ZERO);
    }

    #[test]
    fn serializes_facets_in_camel_case() {
        let ledger = WalletLedger::new(WalletId::new(), "hot".to_string(), 1);
        let json = serde_json::to_value(WalletBalanceSummary::from(&ledger)).unwrap();
        for key in [
            "walletId",
            "pendingIncomingUtxos",
            "confirmedUtxos",
            "logicalSettled",
            "logicalPendingOutgoing",
            "logicalEncumberedOutgoing",
            "pendingFees",
            "encumberedFees",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
    }
}
