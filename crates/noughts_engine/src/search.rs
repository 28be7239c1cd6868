//! Exhaustive minimax search.
//!
//! The full game tree from the empty board has fewer than 9! leaves, so no
//! pruning or depth limit is used: every value returned here is the exact
//! game-theoretic value with X maximizing and O minimizing.

use crate::error::SearchError;
use crate::rules::{apply_move, legal_moves, player_to_move, terminal, utility};
use crate::types::{Board, Move, Symbol};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Upper bound on the branching factor, and so on the parallel pool size.
pub const MAX_BRANCHING: usize = 9;

/// Boards reachable in one ply, paired with the move that reaches them.
fn children(board: &Board) -> impl Iterator<Item = (Move, Board)> + '_ {
    let mover = player_to_move(board);
    legal_moves(board)
        .into_iter()
        .filter_map(move |mv| apply_move(board, mv, mover).ok().map(|child| (mv, child)))
}

fn min_value_counted(board: &Board, nodes: &mut u64) -> i32 {
    *nodes += 1;
    if terminal(board) {
        return utility(board);
    }
    children(board)
        .map(|(_, child)| max_value_counted(&child, nodes))
        .min()
        .unwrap_or_else(|| utility(board))
}

fn max_value_counted(board: &Board, nodes: &mut u64) -> i32 {
    *nodes += 1;
    if terminal(board) {
        return utility(board);
    }
    children(board)
        .map(|(_, child)| min_value_counted(&child, nodes))
        .max()
        .unwrap_or_else(|| utility(board))
}

/// Value of `board` when O (the minimizer) is to move.
pub fn min_value(board: &Board) -> i32 {
    min_value_counted(board, &mut 0)
}

/// Value of `board` when X (the maximizer) is to move.
pub fn max_value(board: &Board) -> i32 {
    max_value_counted(board, &mut 0)
}

/// Value of the position reached after `mover` has just played, counting nodes.
fn reply_value(child: &Board, mover: Symbol, nodes: &mut u64) -> i32 {
    match mover {
        Symbol::X => min_value_counted(child, nodes),
        Symbol::O => max_value_counted(child, nodes),
    }
}

/// Picks the extremal move for `mover`; the first of equal values wins.
fn select(mover: Symbol, evaluations: &[(Move, i32)]) -> Option<Move> {
    let mut best: Option<(Move, i32)> = None;
    for &(mv, value) in evaluations {
        let better = match (best, mover) {
            (None, _) => true,
            (Some((_, current)), Symbol::X) => value > current,
            (Some((_, current)), Symbol::O) => value < current,
        };
        if better {
            best = Some((mv, value));
        }
    }
    best.map(|(mv, _)| mv)
}

/// Evaluates every legal move on `board` sequentially, in row-major order.
///
/// Each entry is the value of the position after the move, assuming
/// optimal play from both sides afterwards.
#[instrument(skip(board), fields(board = %board))]
pub fn evaluate_moves(board: &Board) -> Vec<(Move, i32)> {
    if terminal(board) {
        return Vec::new();
    }
    let mover = player_to_move(board);
    let mut nodes = 0;
    let evaluations: Vec<_> = children(board)
        .map(|(mv, child)| (mv, reply_value(&child, mover, &mut nodes)))
        .collect();
    debug!(nodes, ?evaluations, "Sequential evaluation complete");
    evaluations
}

/// Returns an optimal move for the side to move, or `None` on a terminal board.
///
/// X takes the greatest value, O the least; ties go to the first move in
/// row-major order.
pub fn best_move(board: &Board) -> Option<Move> {
    select(player_to_move(board), &evaluate_moves(board))
}

/// Minimax with the top-level moves fanned out over a bounded worker pool.
///
/// Every task is a pure function of its child board and produces only its
/// own `(move, value)` slot; results are joined before a move is selected.
#[derive(Debug)]
pub struct ParallelSearch {
    pool: rayon::ThreadPool,
}

impl ParallelSearch {
    /// Builds a pool of `threads` workers, clamped to `1..=9`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError`] if the worker threads cannot be spawned.
    #[instrument]
    pub fn new(threads: usize) -> Result<Self, SearchError> {
        let threads = threads.clamp(1, MAX_BRANCHING);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("minimax-{i}"))
            .build()?;
        debug!(threads, "Search pool ready");
        Ok(Self { pool })
    }

    /// Number of workers in the pool.
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Evaluates every legal move on `board`, one task per move.
    #[instrument(skip(self, board), fields(board = %board, threads = self.threads()))]
    pub fn evaluate_moves(&self, board: &Board) -> Vec<(Move, i32)> {
        if terminal(board) {
            return Vec::new();
        }
        let mover = player_to_move(board);
        let branches: Vec<(Move, Board)> = children(board).collect();
        let slots: Vec<(Move, i32, u64)> = self.pool.install(|| {
            branches
                .par_iter()
                .map(|(mv, child)| {
                    let mut nodes = 0;
                    let value = reply_value(child, mover, &mut nodes);
                    (*mv, value, nodes)
                })
                .collect()
        });
        let nodes: u64 = slots.iter().map(|(_, _, n)| n).sum();
        let evaluations: Vec<_> = slots.into_iter().map(|(mv, value, _)| (mv, value)).collect();
        debug!(nodes, ?evaluations, "Parallel evaluation complete");
        evaluations
    }

    /// Parallel counterpart of [`best_move`].
    pub fn best_move(&self, board: &Board) -> Option<Move> {
        select(player_to_move(board), &self.evaluate_moves(board))
    }
}

/// Which minimax variant a [`Searcher`] runs.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Strategy {
    /// Single-threaded recursion.
    Sequential,
    /// Top-level fan-out over a worker pool.
    #[default]
    Parallel,
}

/// Cheaply cloneable handle choosing between the two search variants.
#[derive(Debug, Clone)]
pub enum Searcher {
    /// Runs [`best_move`] on the calling thread.
    Sequential,
    /// Runs [`ParallelSearch::best_move`] on a shared pool.
    Parallel(Arc<ParallelSearch>),
}

impl Searcher {
    /// Creates a searcher for `strategy`; `threads` only matters for the parallel one.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError`] if the parallel pool cannot be built.
    pub fn new(strategy: Strategy, threads: usize) -> Result<Self, SearchError> {
        Ok(match strategy {
            Strategy::Sequential => Searcher::Sequential,
            Strategy::Parallel => Searcher::Parallel(Arc::new(ParallelSearch::new(threads)?)),
        })
    }

    /// The variant this searcher runs.
    pub fn strategy(&self) -> Strategy {
        match self {
            Searcher::Sequential => Strategy::Sequential,
            Searcher::Parallel(_) => Strategy::Parallel,
        }
    }

    /// Optimal move for the side to move, `None` when the board is terminal.
    pub fn best_move(&self, board: &Board) -> Option<Move> {
        match self {
            Searcher::Sequential => best_move(board),
            Searcher::Parallel(search) => search.best_move(board),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::initial_state;

    fn board_after(moves: &[(usize, usize)]) -> Board {
        moves.iter().fold(initial_state(), |board, &(row, col)| {
            apply_move(&board, Move::new(row, col), player_to_move(&board)).unwrap()
        })
    }

    #[test]
    fn test_empty_board_is_a_draw() {
        assert_eq!(max_value(&initial_state()), 0);
    }

    #[test]
    fn test_no_move_on_terminal_board() {
        let board = board_after(&[(0, 0), (1, 0), (0, 1), (1, 1), (0, 2)]);
        assert_eq!(best_move(&board), None);
        assert!(evaluate_moves(&board).is_empty());
    }

    #[test]
    fn test_takes_immediate_win() {
        // X X . / O O . / . . .  with X to move
        let board = board_after(&[(0, 0), (1, 0), (0, 1), (1, 1)]);
        assert_eq!(best_move(&board), Some(Move::new(0, 2)));
    }

    #[test]
    fn test_o_blocks_open_line() {
        // X X . / . O . / . . .  with O to move
        let board = board_after(&[(0, 0), (1, 1), (0, 1)]);
        assert_eq!(player_to_move(&board), Symbol::O);
        assert_eq!(best_move(&board), Some(Move::new(0, 2)));
    }

    #[test]
    fn test_tie_break_is_first_in_row_major_order() {
        // Every opening move draws, so the first one is chosen.
        assert_eq!(best_move(&initial_state()), Some(Move::new(0, 0)));
    }

    #[test]
    fn test_select_prefers_extremes_for_each_side() {
        let evaluations = [
            (Move::new(0, 0), 0),
            (Move::new(0, 1), 1),
            (Move::new(0, 2), -1),
            (Move::new(1, 0), 1),
        ];
        assert_eq!(select(Symbol::X, &evaluations), Some(Move::new(0, 1)));
        assert_eq!(select(Symbol::O, &evaluations), Some(Move::new(0, 2)));
        assert_eq!(select(Symbol::X, &[]), None);
    }

    #[test]
    fn test_parallel_pool_is_clamped() {
        assert_eq!(ParallelSearch::new(64).unwrap().threads(), MAX_BRANCHING);
        assert_eq!(ParallelSearch::new(0).unwrap().threads(), 1);
    }

    #[test]
    fn test_strategy_parses_lowercase() {
        assert_eq!("sequential".parse::<Strategy>().unwrap(), Strategy::Sequential);
        assert_eq!(Strategy::Parallel.to_string(), "parallel");
        let searcher = Searcher::new(Strategy::Sequential, 4).unwrap();
        assert_eq!(searcher.strategy(), Strategy::Sequential);
    }
}
