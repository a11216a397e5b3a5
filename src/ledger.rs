// 9.0: token ledger seam. the engine never owns balances; it moves, mints and burns through this
// trait. InMemoryLedger is the deterministic implementation used by the simulator and tests.

use crate::types::{Address, Amount, Coin};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("Insufficient funds: {account} holds {available}{denom}, needs {requested}{denom}")]
    InsufficientFunds {
        account: Address,
        denom: String,
        available: Amount,
        requested: Amount,
    },

    #[error("Invalid denom: {0:?}")]
    InvalidDenom(String),

    #[error("Supply of {0} overflows")]
    SupplyOverflow(String),
}

/// Balance bookkeeping the engine depends on. All calls are synchronous and must be
/// deterministic. A zero-amount call is a no-op.
pub trait TokenLedger {
    fn balance_of(&self, account: &Address, denom: &str) -> Amount;

    fn transfer(&mut self, from: &Address, to: &Address, coin: &Coin) -> Result<(), LedgerError>;

    fn mint(&mut self, to: &Address, coin: &Coin) -> Result<(), LedgerError>;

    fn burn(&mut self, from: &Address, coin: &Coin) -> Result<(), LedgerError>;

    fn total_supply(&self, denom: &str) -> Amount;

    /// Every account with a positive balance of `denom`, in ascending address order.
    fn holders(&self, denom: &str) -> Vec<(Address, Amount)>;
}

// 9.1: denom -> account -> balance. BTreeMap keeps holder iteration ordered
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    balances: BTreeMap<String, BTreeMap<Address, Amount>>,
    supply: BTreeMap<String, Amount>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a balance by minting. handy for genesis-style setup.
    pub fn with_balance(mut self, account: &Address, coin: Coin) -> Self {
        // a fresh coin on a ledger being built cannot overflow unless the caller asks for it
        if let Err(e) = self.mint(account, &coin) {
            tracing::warn!(error = %e, "seed balance rejected");
        }
        self
    }

    fn check_denom(denom: &str) -> Result<(), LedgerError> {
        if denom.trim().is_empty() || denom.chars().any(char::is_whitespace) {
            return Err(LedgerError::InvalidDenom(denom.to_string()));
        }
        Ok(())
    }

    fn debit(&mut self, account: &Address, coin: &Coin) -> Result<(), LedgerError> {
        let available = self.balance_of(account, &coin.denom);
        let remaining = available
            .checked_sub(coin.amount)
            .ok_or_else(|| LedgerError::InsufficientFunds {
                account: account.clone(),
                denom: coin.denom.clone(),
                available,
                requested: coin.amount,
            })?;

        let accounts = self.balances.entry(coin.denom.clone()).or_default();
        if remaining.is_zero() {
            accounts.remove(account);
        } else {
            accounts.insert(account.clone(), remaining);
        }
        Ok(())
    }

    fn credit(&mut self, account: &Address, coin: &Coin) -> Result<(), LedgerError> {
        let current = self.balance_of(account, &coin.denom);
        let updated = current
            .checked_add(coin.amount)
            .ok_or_else(|| LedgerError::SupplyOverflow(coin.denom.clone()))?;
        self.balances
            .entry(coin.denom.clone())
            .or_default()
            .insert(account.clone(), updated);
        Ok(())
    }
}

impl TokenLedger for InMemoryLedger {
    fn balance_of(&self, account: &Address, denom: &str) -> Amount {
        self.balances
            .get(denom)
            .and_then(|accounts| accounts.get(account))
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    fn transfer(&mut self, from: &Address, to: &Address, coin: &Coin) -> Result<(), LedgerError> {
        Self::check_denom(&coin.denom)?;
        if coin.is_zero() || from == to {
            return Ok(());
        }
        self.debit(from, coin)?;
        self.credit(to, coin)
    }

    fn mint(&mut self, to: &Address, coin: &Coin) -> Result<(), LedgerError> {
        Self::check_denom(&coin.denom)?;
        if coin.is_zero() {
            return Ok(());
        }
        let supply = self.total_supply(&coin.denom);
        let new_supply = supply
            .checked_add(coin.amount)
            .ok_or_else(|| LedgerError::SupplyOverflow(coin.denom.clone()))?;
        self.credit(to, coin)?;
        self.supply.insert(coin.denom.clone(), new_supply);
        Ok(())
    }

    fn burn(&mut self, from: &Address, coin: &Coin) -> Result<(), LedgerError> {
        Self::check_denom(&coin.denom)?;
        if coin.is_zero() {
            return Ok(());
        }
        self.debit(from, coin)?;
        let supply = self.total_supply(&coin.denom).saturating_sub(coin.amount);
        self.supply.insert(coin.denom.clone(), supply);
        Ok(())
    }

    fn total_supply(&self, denom: &str) -> Amount {
        self.supply.get(denom).copied().unwrap_or(Amount::ZERO)
    }

    fn holders(&self, denom: &str) -> Vec<(Address, Amount)> {
        self.balances
            .get(denom)
            .map(|accounts| {
                accounts
                    .iter()
                    .filter(|(_, amount)| amount.is_positive())
                    .map(|(addr, amount)| (addr.clone(), *amount))
                    .collect()
            })
            .unwrap_or_default()
    }
}
