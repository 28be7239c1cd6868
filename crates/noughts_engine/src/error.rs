//! Engine errors.

use crate::types::Move;

/// Why a move was rejected by the rules engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum RulesError {
    /// The move lies outside the board.
    #[display("Illegal move {}: outside the board", _0)]
    OutOfBounds(Move),

    /// The target cell already holds a symbol.
    #[display("Illegal move {}: cell is already occupied", _0)]
    Occupied(Move),
}

impl RulesError {
    /// The rejected move.
    pub fn mv(&self) -> Move {
        match self {
            RulesError::OutOfBounds(mv) | RulesError::Occupied(mv) => *mv,
        }
    }
}

impl std::error::Error for RulesError {}

/// Search engine setup error with location tracking.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Search error: {} at {}:{}", message, file, line)]
pub struct SearchError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl SearchError {
    /// Creates a new search error with caller location tracking.
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }
}

impl From<rayon::ThreadPoolBuildError> for SearchError {
    #[track_caller]
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        Self::new(format!("Failed to build search pool: {}", err))
    }
}
