//! CandleGame Library
//!
//! Paper-trading game over replayed historical candles

pub mod candles;
pub mod config;
pub mod error;
pub mod game;
pub mod position;
pub mod provider;
pub mod resolver;
pub mod types;

pub use error::GameError;
pub use game::{GameController, GameRules, GameSession};
