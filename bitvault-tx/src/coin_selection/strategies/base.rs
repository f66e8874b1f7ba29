//! Base utilities for coin selection strategies

use bitcoin::Amount;
use std::cmp::Ordering;

use crate::coin_selection::types::{CoinSelection, TieBreak};
use crate::error::WalletResult;
use crate::math;
use crate::types::SpendableOutput;

/// Filter candidates down to the ones a selector may spend
///
/// An output is eligible when no input claims it and it either has at least
/// `min_confirmations` confirmations or is change from our own transaction.
pub fn eligible<'a>(candidates: Vec<&'a SpendableOutput>, min_confirmations: u32) -> Vec<&'a SpendableOutput> {
    candidates
        .into_iter()
        .filter(|o| o.is_available() && (o.confirmations >= min_confirmations || o.is_change))
        .collect()
}

/// Drop repeated outpoints, keeping the first occurrence
pub fn dedup_outpoints(candidates: &mut Vec<&SpendableOutput>) {
    let mut seen = std::collections::HashSet::new();
    candidates.retain(|o| seen.insert(o.outpoint));
}

/// Compare two outputs by value according to `tie_break`
pub fn compare_tie_break(a: &SpendableOutput, b: &SpendableOutput, tie_break: TieBreak) -> Ordering {
    let by_value = match tie_break {
        TieBreak::LargerValueFirst => b.value.cmp(&a.value),
        TieBreak::SmallerValueFirst => a.value.cmp(&b.value),
        TieBreak::OutpointOrder => Ordering::Equal,
    };
    by_value.then_with(|| compare_outpoints(a, b))
}

/// Total order on outpoints (txid, then vout)
pub fn compare_outpoints(a: &SpendableOutput, b: &SpendableOutput) -> Ordering {
    a.outpoint
        .txid
        .cmp(&b.outpoint.txid)
        .then(a.outpoint.vout.cmp(&b.outpoint.vout))
}

/// Take outputs in order until `target` is reached
///
/// Returns everything consumed when the candidates run out first.
pub fn accumulate<'a>(target: Amount, ordered: Vec<&'a SpendableOutput>) -> WalletResult<CoinSelection<'a>> {
    let mut selected = Vec::new();
    let mut gathered = Amount::ZERO;

    for output in ordered {
        if gathered >= target {
            break;
        }
        gathered = math::checked_add(gathered, output.value)?;
        selected.push(output);
    }

    CoinSelection::new(selected)
}
