//! Coin selection strategies
//!
//! Each strategy implements [`CoinSelector`](crate::coin_selection::CoinSelector)
//! and shares the eligibility and accumulation helpers in `base`.

pub mod avoid_change;
pub mod base;
pub mod largest_first;
pub mod oldest_first;

// Re-export implementations
pub use avoid_change::AvoidChangeSelector;
pub use largest_first::LargestFirstSelector;
pub use oldest_first::DefaultCoinSelector;
