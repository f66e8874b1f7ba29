//! LargestFirst coin selection strategy

use bitcoin::Amount;
use log::debug;

use crate::coin_selection::selector::CoinSelector;
use crate::coin_selection::strategies::base;
use crate::coin_selection::types::CoinSelection;
use crate::error::WalletResult;
use crate::types::SpendableOutput;

/// Spends the largest eligible outputs first to minimize input count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LargestFirstSelector {
    min_confirmations: u32,
}

impl LargestFirstSelector {
    pub fn new(min_confirmations: u32) -> Self {
        Self { min_confirmations }
    }
}

impl Default for LargestFirstSelector {
    fn default() -> Self {
        Self::new(1)
    }
}

impl CoinSelector for LargestFirstSelector {
    fn name(&self) -> &'static str {
        "LargestFirst"
    }

    fn select<'a>(
        &self,
        target: Amount,
        candidates: Vec<&'a SpendableOutput>,
    ) -> WalletResult<CoinSelection<'a>> {
        let mut ordered = base::eligible(candidates, self.min_confirmations);
        base::dedup_outpoints(&mut ordered);
        ordered.sort_by(|a, b| b.value.cmp(&a.value).then_with(|| base::compare_outpoints(a, b)));

        let selection = base::accumulate(target, ordered)?;
        debug!(
            "{} selected {} outputs gathering {} sat",
            self.name(),
            selection.len(),
            selection.gathered().to_sat()
        );
        Ok(selection)
    }
}
