use crate::{
    batch::PayoutBatch,
    ledger::error::LedgerError,
    payout::error::PayoutError,
    primitives::{bitcoin::*, Satoshis},
    signing_client::error::SigningClientError,
};

/// Builds the unsigned spend of a batch: its inputs in batch order, one
/// output per payout and the change output last.
pub(super) fn unsigned_transaction(
    batch: &PayoutBatch,
    network: Network,
    change_address: Option<&Address>,
) -> Result<Transaction, LedgerError> {
    let input = batch
        .inputs
        .iter()
        .map(|outpoint| TxIn {
            previous_output: *outpoint,
            script_sig: ScriptBuf::new(),
            sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
            witness: Witness::new(),
        })
        .collect();

    let mut output = Vec::with_capacity(batch.payouts.len() + 1);
    for payout in batch.payouts.iter() {
        let address = payout
            .destination
            .onchain_address(network)
            .map_err(|e| PayoutError::InvalidDestination(payout.destination.to_string(), e))?;
        output.push(TxOut {
            value: u64::from(payout.value),
            script_pubkey: address.script_pubkey(),
        });
    }
    if batch.change > Satoshis::ZERO {
        let change_address = change_address.ok_or(SigningClientError::MissingChangeAddress)?;
        output.push(TxOut {
            value: u64::from(batch.change),
            script_pubkey: change_address.script_pubkey(),
        });
    }

    Ok(Transaction {
        version: 2,
        lock_time: LockTime::ZERO,
        input,
        output,
    })
}
