//! The coin selector contract and the config-driven factory
//!
//! [`CoinSelector`] is the pluggable strategy seam: the composer only talks to
//! this trait, so any implementation honoring the contract below can be
//! dropped in without changes elsewhere.

use bitcoin::Amount;

use crate::coin_selection::strategies::{AvoidChangeSelector, DefaultCoinSelector, LargestFirstSelector};
use crate::coin_selection::types::{CoinSelection, SelectionStrategy};
use crate::config::SelectionConfig;
use crate::error::WalletResult;
use crate::types::SpendableOutput;

/// Picks outputs to spend from a pool of candidates
///
/// Contract:
/// - `candidates` may be reordered or filtered freely; callers must not rely
///   on iteration order.
/// - Only outputs from `candidates` are returned, each at most once.
/// - If the candidates cannot cover `target`, everything consumed is returned
///   with `gathered < target`. This is not an error.
/// - Candidates are never mutated.
///
/// The only error is arithmetic overflow while summing values.
pub trait CoinSelector {
    /// Name of this selector, for logging
    fn name(&self) -> &'static str;

    /// Select outputs aiming to gather at least `target`
    fn select<'a>(
        &self,
        target: Amount,
        candidates: Vec<&'a SpendableOutput>,
    ) -> WalletResult<CoinSelection<'a>>;
}

/// Build the selector configured in `[selection]`
pub fn selector_for(config: &SelectionConfig) -> Box<dyn CoinSelector> {
    let default = DefaultCoinSelector::new(config.min_confirmations, config.tie_break);
    match config.strategy {
        SelectionStrategy::OldestFirst => Box::new(default),
        SelectionStrategy::LargestFirst => Box::new(LargestFirstSelector::new(config.min_confirmations)),
        SelectionStrategy::AvoidChange => Box::new(AvoidChangeSelector::new(default)),
    }
}
