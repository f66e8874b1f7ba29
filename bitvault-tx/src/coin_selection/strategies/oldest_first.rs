//! OldestFirst coin selection strategy
//!
//! The default policy. Outputs with the most confirmations are spent first;
//! equal confirmation counts are ordered by the configured [`TieBreak`] and
//! finally by outpoint, so the same pool always yields the same selection.

use bitcoin::Amount;
use log::debug;

use crate::coin_selection::selector::CoinSelector;
use crate::coin_selection::strategies::base;
use crate::coin_selection::types::{CoinSelection, TieBreak};
use crate::error::WalletResult;
use crate::types::SpendableOutput;

/// Strategy for selecting oldest outputs first based on confirmation count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultCoinSelector {
    min_confirmations: u32,
    tie_break: TieBreak,
}

impl DefaultCoinSelector {
    /// Create a new DefaultCoinSelector
    pub fn new(min_confirmations: u32, tie_break: TieBreak) -> Self {
        Self {
            min_confirmations,
            tie_break,
        }
    }

    /// Minimum confirmations a non-change output needs to be selected
    pub fn min_confirmations(&self) -> u32 {
        self.min_confirmations
    }

    /// Sort candidates into spending order
    pub fn sort(&self, candidates: &mut [&SpendableOutput]) {
        candidates.sort_by(|a, b| {
            b.confirmations
                .cmp(&a.confirmations)
                .then_with(|| base::compare_tie_break(a, b, self.tie_break))
        });
    }
}

impl Default for DefaultCoinSelector {
    fn default() -> Self {
        Self::new(1, TieBreak::default())
    }
}

impl CoinSelector for DefaultCoinSelector {
    fn name(&self) -> &'static str {
        "OldestFirst"
    }

    fn select<'a>(
        &self,
        target: Amount,
        candidates: Vec<&'a SpendableOutput>,
    ) -> WalletResult<CoinSelection<'a>> {
        let mut ordered = base::eligible(candidates, self.min_confirmations);
        base::dedup_outpoints(&mut ordered);
        self.sort(&mut ordered);

        let selection = base::accumulate(target, ordered)?;
        debug!(
            "{} selected {} outputs gathering {} sat for target {} sat",
            self.name(),
            selection.len(),
            selection.gathered().to_sat(),
            target.to_sat()
        );
        Ok(selection)
    }
}
