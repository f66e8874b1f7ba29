//! Core types for coin selection

use bitcoin::{Amount, OutPoint};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{WalletError, WalletResult};
use crate::math;
use crate::types::SpendableOutput;

/// Result of a selection: the chosen outputs and their total value
///
/// Invariant: `gathered` equals the sum of `selected` values. `gathered` may
/// be below the requested target only when the selector ran out of
/// candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinSelection<'a> {
    selected: Vec<&'a SpendableOutput>,
    gathered: Amount,
}

impl<'a> CoinSelection<'a> {
    /// Build a selection, computing the gathered value with overflow checks
    pub fn new(selected: Vec<&'a SpendableOutput>) -> WalletResult<Self> {
        let gathered = math::checked_sum(selected.iter().map(|o| o.value))?;
        Ok(Self { selected, gathered })
    }

    /// An empty selection
    pub fn empty() -> Self {
        Self {
            selected: Vec::new(),
            gathered: Amount::ZERO,
        }
    }

    /// Selected outputs in the order the selector took them
    pub fn selected(&self) -> &[&'a SpendableOutput] {
        &self.selected
    }

    /// Sum of the selected outputs' values
    pub fn gathered(&self) -> Amount {
        self.gathered
    }

    /// Outpoints of the selected outputs
    pub fn outpoints(&self) -> Vec<OutPoint> {
        self.selected.iter().map(|o| o.outpoint).collect()
    }

    /// Whether the selection covers `target`
    pub fn is_sufficient(&self, target: Amount) -> bool {
        self.gathered >= target
    }

    /// How much is missing to reach `target` (zero when sufficient)
    pub fn shortfall(&self, target: Amount) -> Amount {
        math::saturating_shortfall(target, self.gathered)
    }

    /// Value left over after paying `target` (zero when insufficient)
    pub fn change(&self, target: Amount) -> Amount {
        math::saturating_shortfall(self.gathered, target)
    }

    /// Number of selected outputs
    pub fn len(&self) -> usize {
        self.selected.len()
    }

    /// Whether nothing was selected
    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// Turn an insufficient selection into [`WalletError::InsufficientFunds`]
    pub fn require(self, target: Amount) -> WalletResult<Self> {
        if self.is_sufficient(target) {
            Ok(self)
        } else {
            Err(WalletError::InsufficientFunds {
                needed: target,
                available: self.gathered,
                shortfall: self.shortfall(target),
            })
        }
    }
}

/// Coin selection strategy
///
/// Each strategy optimizes for a different criterion. All of them honor the
/// [`CoinSelector`](super::CoinSelector) contract and can be swapped freely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Select outputs with the most confirmations first
    #[default]
    OldestFirst,

    /// Select the largest outputs first to minimize the number of inputs
    LargestFirst,

    /// Prefer a single output matching the target exactly (no change)
    AvoidChange,
}

impl fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SelectionStrategy::OldestFirst => "oldest_first",
            SelectionStrategy::LargestFirst => "largest_first",
            SelectionStrategy::AvoidChange => "avoid_change",
        };
        f.write_str(name)
    }
}

impl FromStr for SelectionStrategy {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "oldest_first" => Ok(SelectionStrategy::OldestFirst),
            "largest_first" => Ok(SelectionStrategy::LargestFirst),
            "avoid_change" => Ok(SelectionStrategy::AvoidChange),
            other => Err(WalletError::Config(format!("Unknown selection strategy: {}", other))),
        }
    }
}

/// Ordering among outputs with the same confirmation count
///
/// The outpoint is always the final key so the order is total and
/// selection is reproducible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Larger values first (fewer inputs)
    #[default]
    LargerValueFirst,
    /// Smaller values first (spends small outputs before they become dust)
    SmallerValueFirst,
    /// Outpoint order only
    OutpointOrder,
}
