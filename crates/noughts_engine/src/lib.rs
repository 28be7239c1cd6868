//! Tic-tac-toe rules and perfect-play search.
//!
//! # Architecture
//!
//! - **Types**: [`Board`], [`Cell`], [`Symbol`], [`Move`], [`Outcome`]
//! - **Rules**: pure functions deriving turn order, legal moves and results
//!   from a board value
//! - **Search**: exhaustive minimax, sequential or fanned out over a
//!   bounded worker pool
//!
//! # Example
//!
//! ```
//! use noughts_engine::{apply_move, best_move, initial_state, player_to_move, Move};
//!
//! let board = initial_state();
//! let board = apply_move(&board, Move::new(1, 1), player_to_move(&board)).unwrap();
//! let reply = best_move(&board).unwrap();
//! assert!(reply != Move::new(1, 1));
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod rules;
mod search;
mod types;

pub use error::{RulesError, SearchError};
pub use rules::{
    apply_move, initial_state, legal_moves, outcome, player_to_move, terminal, utility, winner,
};
pub use search::{
    MAX_BRANCHING, ParallelSearch, Searcher, Strategy, best_move, evaluate_moves, max_value,
    min_value,
};
pub use types::{Board, Cell, Move, Outcome, SIZE, Symbol};
