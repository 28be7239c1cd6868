//! Exhaustive checks that minimax plays tic-tac-toe perfectly.

use noughts_engine::{
    Board, ParallelSearch, Searcher, Strategy, Symbol, apply_move, best_move, evaluate_moves,
    initial_state, legal_moves, max_value, min_value, player_to_move, terminal, winner,
};
use std::collections::HashSet;

fn reachable_boards() -> HashSet<Board> {
    let mut seen = HashSet::new();
    let mut stack = vec![initial_state()];
    while let Some(board) = stack.pop() {
        if !seen.insert(board) || terminal(&board) {
            continue;
        }
        let mover = player_to_move(&board);
        for mv in legal_moves(&board) {
            stack.push(apply_move(&board, mv, mover).unwrap());
        }
    }
    seen
}

fn value(board: &Board) -> i32 {
    match player_to_move(board) {
        Symbol::X => max_value(board),
        Symbol::O => min_value(board),
    }
}

/// Plays `engine` with `best_move` against every possible opponent line.
fn assert_engine_never_loses(board: Board, engine: Symbol) {
    if terminal(&board) {
        assert_ne!(winner(&board), Some(engine.opponent()), "engine lost: {board}");
        return;
    }
    let mover = player_to_move(&board);
    if mover == engine {
        let mv = best_move(&board).expect("non-terminal board has a move");
        assert_engine_never_loses(apply_move(&board, mv, mover).unwrap(), engine);
    } else {
        for mv in legal_moves(&board) {
            assert_engine_never_loses(apply_move(&board, mv, mover).unwrap(), engine);
        }
    }
}

#[test]
fn test_engine_as_x_never_loses() {
    assert_engine_never_loses(initial_state(), Symbol::X);
}

#[test]
fn test_engine_as_o_never_loses() {
    assert_engine_never_loses(initial_state(), Symbol::O);
}

#[test]
fn test_self_play_from_empty_is_a_draw() {
    let mut board = initial_state();
    while let Some(mv) = best_move(&board) {
        board = apply_move(&board, mv, player_to_move(&board)).unwrap();
    }
    assert!(board.is_full());
    assert_eq!(winner(&board), None);
}

#[test]
fn test_best_move_preserves_game_value() {
    for board in reachable_boards() {
        let Some(mv) = best_move(&board) else {
            assert!(terminal(&board));
            continue;
        };
        let child = apply_move(&board, mv, player_to_move(&board)).unwrap();
        assert_eq!(value(&child), value(&board), "value dropped on {board} via {mv}");
    }
}

#[test]
fn test_parallel_values_match_sequential() {
    let parallel = ParallelSearch::new(9).unwrap();
    for board in reachable_boards() {
        let mut sequential = evaluate_moves(&board);
        let mut fanned_out = parallel.evaluate_moves(&board);
        sequential.sort();
        fanned_out.sort();
        assert_eq!(sequential, fanned_out, "{board}");
    }
}

#[test]
fn test_parallel_move_is_optimal() {
    let searcher = Searcher::new(Strategy::Parallel, 4).unwrap();
    for board in reachable_boards() {
        if let Some(mv) = searcher.best_move(&board) {
            let child = apply_move(&board, mv, player_to_move(&board)).unwrap();
            assert_eq!(value(&child), value(&board), "{board}");
        }
    }
}
