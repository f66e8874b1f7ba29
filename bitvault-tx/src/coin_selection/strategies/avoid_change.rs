//! AvoidChange coin selection strategy
//!
//! Looks for a single eligible output whose value equals the target, which
//! lets the transaction go out without a change output. Falls back to the
//! default ordering when no exact match exists.

use bitcoin::Amount;
use log::debug;

use crate::coin_selection::selector::CoinSelector;
use crate::coin_selection::strategies::base;
use crate::coin_selection::strategies::oldest_first::DefaultCoinSelector;
use crate::coin_selection::types::CoinSelection;
use crate::error::WalletResult;
use crate::types::SpendableOutput;

/// Strategy that tries to avoid creating change outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AvoidChangeSelector {
    fallback: DefaultCoinSelector,
}

impl AvoidChangeSelector {
    /// Create a selector that falls back to `fallback` when nothing matches
    pub fn new(fallback: DefaultCoinSelector) -> Self {
        Self { fallback }
    }
}

impl CoinSelector for AvoidChangeSelector {
    fn name(&self) -> &'static str {
        "AvoidChange"
    }

    fn select<'a>(
        &self,
        target: Amount,
        candidates: Vec<&'a SpendableOutput>,
    ) -> WalletResult<CoinSelection<'a>> {
        let mut eligible = base::eligible(candidates.clone(), self.fallback.min_confirmations());
        self.fallback.sort(&mut eligible);

        if let Some(exact) = eligible.into_iter().find(|o| o.value == target) {
            debug!("{} found exact match {}", self.name(), exact.outpoint);
            return CoinSelection::new(vec![exact]);
        }

        debug!("{} found no exact match, using default ordering", self.name());
        self.fallback.select(target, candidates)
    }
}
