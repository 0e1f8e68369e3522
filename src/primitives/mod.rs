use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use std::fmt;

crate::entity_id! { WalletId }
crate::entity_id! { PayoutRequestId }
crate::entity_id! { BatchId }

pub mod bitcoin {
    pub use bdk::{
        bitcoin::{
            absolute::LockTime,
            address::{Error as AddressError, NetworkUnchecked},
            consensus, Address, Network, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut,
            Txid, Witness,
        },
        FeeRate,
    };
}

#[derive(Debug, Clone, Serialize, Deserialize, clap::ValueEnum, PartialEq, Eq, Copy, Default)]
#[serde(rename_all = "snake_case")]
pub enum TxPriority {
    #[default]
    NextBlock,
    HalfHour,
    OneHour,
}

impl TxPriority {
    pub fn n_blocks(&self) -> usize {
        match self {
            Self::NextBlock => 1,
            Self::HalfHour => 3,
            Self::OneHour => 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PayoutDestination {
    OnchainAddress { value: String },
}

impl PayoutDestination {
    pub fn onchain_address(
        &self,
        network: bitcoin::Network,
    ) -> Result<bitcoin::Address, bitcoin::AddressError> {
        match self {
            Self::OnchainAddress { value } => value
                .parse::<bitcoin::Address<bitcoin::NetworkUnchecked>>()?
                .require_network(network),
        }
    }
}

impl fmt::Display for PayoutDestination {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PayoutDestination::OnchainAddress { value } => write!(f, "{value}"),
        }
    }
}

pub const SATS_PER_BTC: Decimal = dec!(100_000_000);

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Satoshis(u64);

impl Satoshis {
    pub const ZERO: Self = Self(0);
    pub const ONE: Self = Self(1);

    pub const fn from_sats(sats: u64) -> Self {
        Self(sats)
    }

    pub fn to_btc(self) -> Decimal {
        Decimal::from(self.0) / SATS_PER_BTC
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }

    pub fn checked_sub(self, rhs: Satoshis) -> Option<Satoshis> {
        self.0.checked_sub(rhs.0).map(Self)
    }
}

impl fmt::Display for Satoshis {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Satoshis {
    fn from(sats: u64) -> Self {
        Self(sats)
    }
}

impl From<u32> for Satoshis {
    fn from(sats: u32) -> Self {
        Self(u64::from(sats))
    }
}

impl From<Satoshis> for u64 {
    fn from(sats: Satoshis) -> u64 {
        sats.0
    }
}

impl std::ops::Add<Satoshis> for Satoshis {
    type Output = Satoshis;
    fn add(self, rhs: Satoshis) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl std::ops::Sub<Satoshis> for Satoshis {
    type Output = Satoshis;
    fn sub(self, rhs: Satoshis) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl std::ops::Mul<u64> for Satoshis {
    type Output = Satoshis;
    fn mul(self, rhs: u64) -> Self {
        Self(self.0 * rhs)
    }
}

impl std::ops::AddAssign<Satoshis> for Satoshis {
    fn add_assign(&mut self, rhs: Satoshis) {
        *self = Self(self.0 + rhs.0)
    }
}

impl std::iter::Sum for Satoshis {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Satoshis::ZERO, |a, b| a + b)
    }
}

impl<'a> std::iter::Sum<&'a Satoshis> for Satoshis {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.fold(Satoshis::ZERO, |a, b| a + *b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn satoshis_to_btc() {
        assert_eq!(Satoshis::from(150_000_000u64).to_btc(), dec!(1.5));
    }

    #[test]
    fn checked_sub_refuses_underflow() {
        assert_eq!(Satoshis::from(10u64).checked_sub(Satoshis::from(11u64)), None);
        assert_eq!(
            Satoshis::from(10u64).checked_sub(Satoshis::from(4u64)),
            Some(Satoshis::from(6u64))
        );
    }

    #[test]
    fn destination_is_checked_against_network() {
        let destination = PayoutDestination::OnchainAddress {
            value: "mgWUuj1J1N882jmqFxtDepEC73Rr22E9GU".to_string(),
        };
        assert!(destination
            .onchain_address(bitcoin::Network::Regtest)
            .is_ok());
        assert!(destination
            .onchain_address(bitcoin::Network::Bitcoin)
            .is_err());
    }
}
