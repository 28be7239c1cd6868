//! Pure rule functions over board values.
//!
//! Turn order is derived from the board alone. Nothing here tracks whose
//! turn it is between calls, so the session layer must compare a
//! participant's bound symbol against [`player_to_move`] before calling
//! [`apply_move`].

use crate::error::RulesError;
use crate::types::{Board, Cell, Move, Outcome, Symbol};
use tracing::instrument;

/// The eight winning lines: rows, then columns, then diagonals.
const LINES: [[Move; 3]; 8] = [
    // Rows
    [Move::new(0, 0), Move::new(0, 1), Move::new(0, 2)],
    [Move::new(1, 0), Move::new(1, 1), Move::new(1, 2)],
    [Move::new(2, 0), Move::new(2, 1), Move::new(2, 2)],
    // Columns
    [Move::new(0, 0), Move::new(1, 0), Move::new(2, 0)],
    [Move::new(0, 1), Move::new(1, 1), Move::new(2, 1)],
    [Move::new(0, 2), Move::new(1, 2), Move::new(2, 2)],
    // Diagonals
    [Move::new(0, 0), Move::new(1, 1), Move::new(2, 2)],
    [Move::new(0, 2), Move::new(1, 1), Move::new(2, 0)],
];

/// Returns the starting board: nine empty cells.
pub fn initial_state() -> Board {
    Board::new()
}

/// Returns the symbol that moves next on `board`.
///
/// X moves when the counts are equal, otherwise whichever symbol has fewer
/// cells placed.
pub fn player_to_move(board: &Board) -> Symbol {
    let x = board.count(Symbol::X);
    let o = board.count(Symbol::O);
    if x > o { Symbol::O } else { Symbol::X }
}

/// Every empty cell in row-major order. Empty iff the board is full.
pub fn legal_moves(board: &Board) -> Vec<Move> {
    Move::all()
        .filter(|mv| board.get(*mv) == Some(Cell::Empty))
        .collect()
}

/// Returns a new board with `symbol` placed at `mv`.
///
/// # Errors
///
/// [`RulesError::OutOfBounds`] if the move is off the board and
/// [`RulesError::Occupied`] if the target cell is not empty.
#[instrument(level = "trace", skip(board), fields(board = %board))]
pub fn apply_move(board: &Board, mv: Move, symbol: Symbol) -> Result<Board, RulesError> {
    match board.get(mv) {
        None => Err(RulesError::OutOfBounds(mv)),
        Some(Cell::Occupied(_)) => Err(RulesError::Occupied(mv)),
        Some(Cell::Empty) => Ok(board.with(mv, Cell::Occupied(symbol))),
    }
}

/// Returns the symbol owning the first complete line, if any.
pub fn winner(board: &Board) -> Option<Symbol> {
    LINES.iter().find_map(|[a, b, c]| {
        let first = board.get(*a)?.symbol()?;
        let same = |mv: &Move| board.get(*mv) == Some(Cell::Occupied(first));
        (same(b) && same(c)).then_some(first)
    })
}

/// Checks whether the game is over.
pub fn terminal(board: &Board) -> bool {
    winner(board).is_some() || board.is_full()
}

/// +1 if X won, -1 if O won, 0 otherwise.
///
/// Non-terminal boards also score 0; check [`terminal`] first.
pub fn utility(board: &Board) -> i32 {
    match winner(board) {
        Some(Symbol::X) => 1,
        Some(Symbol::O) => -1,
        None => 0,
    }
}

/// How the game ended, or `None` while it is still running.
pub fn outcome(board: &Board) -> Option<Outcome> {
    match winner(board) {
        Some(symbol) => Some(Outcome::Winner(symbol)),
        None if board.is_full() => Some(Outcome::Tie),
        None => None,
    }
}
