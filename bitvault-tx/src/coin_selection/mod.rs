//! Coin selection module
//!
//! Picks which spendable outputs fund a payment. Selection is a pure function
//! of `(target, candidates)`: it never mutates the candidates and returns
//! references into the caller's pool.
//!
//! # Module Structure
//!
//! - `types.rs` - [`CoinSelection`], [`SelectionStrategy`], [`TieBreak`]
//! - `selector.rs` - The [`CoinSelector`] trait and the config-driven factory
//! - `strategies/` - Strategy implementations
//!   - `oldest_first.rs` - Default policy: most confirmations first
//!   - `largest_first.rs` - Fewest inputs
//!   - `avoid_change.rs` - Exact single-output match, else delegate
//!
//! # Insufficient funds
//!
//! A selector that runs out of candidates returns everything it consumed with
//! `gathered < target`. That is a valid result, not an error; the caller
//! inspects [`CoinSelection::shortfall`] and decides.
//!
//! # Typical Usage
//!
//! ```
//! use bitvault_tx::coin_selection::{CoinSelector, DefaultCoinSelector};
//! use bitvault_tx::types::SpendableOutput;
//! use bitcoin::hashes::Hash;
//! use bitcoin::{Amount, OutPoint, ScriptBuf, Txid};
//!
//! let pool: Vec<SpendableOutput> = [50_000u64, 30_000, 20_000]
//!     .iter()
//!     .enumerate()
//!     .map(|(vout, sats)| {
//!         SpendableOutput::new(
//!             OutPoint::new(Txid::all_zeros(), vout as u32),
//!             Amount::from_sat(*sats),
//!             ScriptBuf::new(),
//!             6,
//!         )
//!     })
//!     .collect();
//!
//! let selector = DefaultCoinSelector::default();
//! let selection = selector
//!     .select(Amount::from_sat(60_000), pool.iter().collect())
//!     .unwrap();
//! assert_eq!(selection.gathered(), Amount::from_sat(80_000));
//! ```

pub mod selector;
pub mod strategies;
pub mod types;

pub use selector::{selector_for, CoinSelector};
pub use strategies::{AvoidChangeSelector, DefaultCoinSelector, LargestFirstSelector};
pub use types::{CoinSelection, SelectionStrategy, TieBreak};
