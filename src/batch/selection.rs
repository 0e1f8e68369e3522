use super::error::BatchError;
use crate::{
    fees::{self, DUST_LIMIT},
    primitives::{
        bitcoin::{FeeRate, OutPoint},
        *,
    },
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Funding {
    pub inputs: Vec<OutPoint>,
    pub input_total: Satoshis,
    pub fee: Satoshis,
    pub change: Satoshis,
}

/// Checks whether `inputs` cover `payout_total` across `n_payouts` outputs.
///
/// A change output is only added when what is left after paying for it is
/// at least the dust limit. Otherwise the residue becomes part of the fee so
/// that inputs always equal payouts + fee + change.
pub fn fund(
    inputs: &[(OutPoint, Satoshis)],
    payout_total: Satoshis,
    n_payouts: usize,
    fee_rate: FeeRate,
) -> Option<Funding> {
    if inputs.is_empty() {
        return None;
    }
    let input_total: Satoshis = inputs.iter().map(|(_, value)| *value).sum();
    let fee_without_change = fees::estimate_fee(fee_rate, inputs.len(), n_payouts);
    let residue = input_total.checked_sub(payout_total + fee_without_change)?;
    let fee_with_change = fees::estimate_fee(fee_rate, inputs.len(), n_payouts + 1);
    let (fee, change) = match input_total.checked_sub(payout_total + fee_with_change) {
        Some(change) if change >= DUST_LIMIT => (fee_with_change, change),
        _ => (fee_without_change + residue, Satoshis::ZERO),
    };
    Some(Funding {
        inputs: inputs.iter().map(|(outpoint, _)| *outpoint).collect(),
        input_total,
        fee,
        change,
    })
}

/// Largest-first coin selection. Equal values are taken in ascending outpoint
/// order so that the result does not depend on iteration order.
pub fn select_largest_first(
    candidates: impl IntoIterator<Item = (OutPoint, Satoshis)>,
    payout_total: Satoshis,
    n_payouts: usize,
    fee_rate: FeeRate,
) -> Result<Funding, BatchError> {
    let mut candidates: Vec<_> = candidates.into_iter().collect();
    candidates.sort_by(|(a_outpoint, a_value), (b_outpoint, b_value)| {
        b_value.cmp(a_value).then(a_outpoint.cmp(b_outpoint))
    });

    let mut selected = Vec::new();
    for candidate in candidates.iter() {
        selected.push(*candidate);
        if let Some(funding) = fund(&selected, payout_total, n_payouts, fee_rate) {
            return Ok(funding);
        }
    }

    let available: Satoshis = candidates.iter().map(|(_, value)| *value).sum();
    let needed =
        payout_total + fees::estimate_fee(fee_rate, candidates.len().max(1), n_payouts);
    Err(BatchError::InsufficientFunds { needed, available })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outpoint(vout: u32) -> OutPoint {
        OutPoint {
            txid: "4010e27ff7dc6d9c66a5657e6b3d94b4c4e394d968398d16fefe4637463d194d"
                .parse()
                .unwrap(),
            vout,
        }
    }

    fn sats(value: u64) -> Satoshis {
        Satoshis::from(value)
    }

    fn one_sat_per_vbyte() -> FeeRate {
        FeeRate::from_sat_per_vb(1.0)
    }

    #[test]
    fn picks_largest_utxo_first() {
        let candidates = vec![
            (outpoint(0), sats(10_000)),
            (outpoint(1), sats(50_000)),
            (outpoint(2), sats(20_000)),
        ];
        let funding =
            select_largest_first(candidates, sats(30_000), 1, one_sat_per_vbyte()).unwrap();
        assert_eq!(funding.inputs, vec![outpoint(1)]);
        assert_eq!(funding.fee, sats(141));
        assert_eq!(funding.change, sats(19_859));
        assert_eq!(
            funding.input_total,
            sats(30_000) + funding.fee + funding.change
        );
    }

    #[test]
    fn equal_values_are_taken_in_outpoint_order() {
        let candidates = vec![(outpoint(1), sats(40_000)), (outpoint(0), sats(40_000))];
        let funding =
            select_largest_first(candidates, sats(10_000), 1, one_sat_per_vbyte()).unwrap();
        assert_eq!(funding.inputs, vec![outpoint(0)]);
    }

    #[test]
    fn accumulates_until_covered() {
        let candidates = vec![
            (outpoint(2), sats(10_000)),
            (outpoint(0), sats(10_000)),
            (outpoint(1), sats(10_000)),
        ];
        let funding =
            select_largest_first(candidates, sats(25_000), 1, one_sat_per_vbyte()).unwrap();
        assert_eq!(funding.inputs, vec![outpoint(0), outpoint(1), outpoint(2)]);
        assert_eq!(funding.fee, sats(277));
        assert_eq!(funding.change, sats(4_723));
    }

    #[test]
    fn dust_change_is_folded_into_fee() {
        let funding = select_largest_first(
            vec![(outpoint(0), sats(10_000))],
            sats(9_400),
            1,
            one_sat_per_vbyte(),
        )
        .unwrap();
        assert_eq!(funding.change, Satoshis::ZERO);
        assert_eq!(funding.fee, sats(600));
    }

    #[test]
    fn insufficient_funds_reports_shortfall() {
        let err = select_largest_first(
            vec![(outpoint(0), sats(1_000))],
            sats(5_000),
            1,
            one_sat_per_vbyte(),
        )
        .unwrap_err();
        match err {
            BatchError::InsufficientFunds { needed, available } => {
                assert_eq!(needed, sats(5_110));
                assert_eq!(available, sats(1_000));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn no_candidates_is_insufficient() {
        assert!(matches!(
            select_largest_first(vec![], sats(1_000), 1, one_sat_per_vbyte()),
            Err(BatchError::InsufficientFunds { .. })
        ));
    }
}
