//! In-process matches between [`Player`] implementations.

use anyhow::{Context, Result, bail};
use derive_getters::Getters;
use noughts_engine::{
    Board, Move, Outcome, Searcher, Symbol, apply_move, initial_state, outcome, player_to_move,
};
use std::collections::VecDeque;
use tracing::{debug, info, instrument};

/// Something that can choose moves.
#[async_trait::async_trait]
pub trait Player: Send {
    /// Chooses a move for `symbol` on `board`.
    async fn choose_move(&mut self, board: &Board, symbol: Symbol) -> Result<Move>;

    /// Display name.
    fn name(&self) -> &str;
}

/// Perfect-play opponent backed by minimax.
#[derive(Debug, Clone)]
pub struct EnginePlayer {
    name: String,
    searcher: Searcher,
}

impl EnginePlayer {
    /// Creates an engine player.
    pub fn new(name: impl Into<String>, searcher: Searcher) -> Self {
        Self {
            name: name.into(),
            searcher,
        }
    }
}

#[async_trait::async_trait]
impl Player for EnginePlayer {
    async fn choose_move(&mut self, board: &Board, symbol: Symbol) -> Result<Move> {
        let searcher = self.searcher.clone();
        let board = *board;
        let mv = tokio::task::spawn_blocking(move || searcher.best_move(&board))
            .await
            .context("Search task failed")?
            .context("No legal moves left")?;
        debug!(player = %self.name, %symbol, %mv, "Engine chose move");
        Ok(mv)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Plays a fixed list of moves in order.
#[derive(Debug, Clone)]
pub struct ScriptedPlayer {
    name: String,
    moves: VecDeque<Move>,
}

impl ScriptedPlayer {
    /// Creates a player that replays `moves`.
    pub fn new(name: impl Into<String>, moves: impl IntoIterator<Item = Move>) -> Self {
        Self {
            name: name.into(),
            moves: moves.into_iter().collect(),
        }
    }
}

#[async_trait::async_trait]
impl Player for ScriptedPlayer {
    async fn choose_move(&mut self, _board: &Board, _symbol: Symbol) -> Result<Move> {
        match self.moves.pop_front() {
            Some(mv) => Ok(mv),
            None => bail!("{} ran out of scripted moves", self.name),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// How a local match went.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
pub struct MatchReport {
    /// Final result.
    outcome: Outcome,
    /// Final board.
    board: Board,
    /// Every move played, in order.
    moves: Vec<(Symbol, Move)>,
}

/// Runs a game between two players without a network.
pub struct LocalMatch {
    x: Box<dyn Player>,
    o: Box<dyn Player>,
}

impl LocalMatch {
    /// Seats `x` and `o`.
    pub fn new(x: Box<dyn Player>, o: Box<dyn Player>) -> Self {
        Self { x, o }
    }

    /// Plays to a terminal board. An illegal move from either player aborts the match.
    #[instrument(skip(self), fields(x = %self.x.name(), o = %self.o.name()))]
    pub async fn run(&mut self) -> Result<MatchReport> {
        info!("Starting local match");
        let mut board = initial_state();
        let mut moves = Vec::new();

        loop {
            if let Some(result) = outcome(&board) {
                info!(outcome = ?result, %board, "Local match finished");
                return Ok(MatchReport {
                    outcome: result,
                    board,
                    moves,
                });
            }

            let symbol = player_to_move(&board);
            let player = match symbol {
                Symbol::X => &mut self.x,
                Symbol::O => &mut self.o,
            };
            let mv = player.choose_move(&board, symbol).await?;
            board = apply_move(&board, mv, symbol)
                .with_context(|| format!("{} played an illegal move", player.name()))?;
            debug!(%symbol, %mv, %board, "Move played");
            moves.push((symbol, mv));
        }
    }
}
