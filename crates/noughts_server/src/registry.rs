//! Session registry: the only owner of session state.
//!
//! The id → session map sits behind a registry-wide mutex that is held only
//! long enough to look up, insert or remove an entry. Each session sits
//! behind its own mutex, and every check-then-commit sequence (seat
//! occupancy, turn ownership, move legality) runs entirely under it. No code
//! path locks the map while holding a session lock.
//!
//! Operations never write to the network. They return [`Delivery`] values
//! that the caller sends once every lock has been released.

use crate::codec::{ErrorCode, ServerMessage};
use crate::ids::{ConnId, IdAllocator, SessionId};
use derive_getters::Getters;
use noughts_engine::{
    Board, Move, Outcome, RulesError, Symbol, apply_move, initial_state, outcome, player_to_move,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, instrument, warn};

/// Outbound queue of a connection; drained by that connection's writer task.
pub type Mailbox = mpsc::Sender<ServerMessage>;

/// Messages a connection may have queued before it counts as not reading.
///
/// A whole game produces at most a dozen messages per seat, so only a
/// client that stops reading while it keeps sending can fill this.
pub const MAILBOX_CAPACITY: usize = 64;

/// Lifecycle of a session. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum Status {
    /// Creator seated, second seat empty.
    WaitingForOpponent,
    /// Both seats filled, moves accepted.
    InProgress,
    /// A terminal board was reached.
    Completed,
    /// A participant left (or nobody joined in time) before completion.
    Aborted,
}

impl Status {
    /// Whether the session has been torn down.
    pub fn is_finished(self) -> bool {
        matches!(self, Status::Completed | Status::Aborted)
    }
}

/// Whoever occupies a seat.
#[derive(Debug, Clone)]
pub enum Participant {
    /// A live network connection.
    Remote {
        /// Connection id.
        conn: ConnId,
        /// Where messages for this connection go.
        mailbox: Mailbox,
    },
    /// The built-in minimax opponent.
    Engine,
}

impl Participant {
    /// Creates a remote participant.
    pub fn remote(conn: ConnId, mailbox: Mailbox) -> Self {
        Participant::Remote { conn, mailbox }
    }

    fn is_conn(&self, id: ConnId) -> bool {
        matches!(self, Participant::Remote { conn, .. } if *conn == id)
    }

    fn mailbox(&self) -> Option<&Mailbox> {
        match self {
            Participant::Remote { mailbox, .. } => Some(mailbox),
            Participant::Engine => None,
        }
    }
}

/// Identifies the participant asking for a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mover {
    Conn(ConnId),
    Engine,
}

/// A message bound for one connection, sent after locks are released.
#[derive(Debug, Clone)]
pub struct Delivery {
    mailbox: Mailbox,
    message: ServerMessage,
}

impl Delivery {
    /// The message to send.
    pub fn message(&self) -> &ServerMessage {
        &self.message
    }

    /// Queues the message without waiting.
    ///
    /// Returns `false` if the receiving connection is gone or its mailbox is full.
    pub fn send(self) -> bool {
        match self.mailbox.try_send(self.message) {
            Ok(()) => true,
            Err(TrySendError::Full(message)) => {
                warn!(?message, "Recipient is not reading, dropping message");
                false
            }
            Err(TrySendError::Closed(message)) => {
                debug!(?message, "Recipient already gone, dropping message");
                false
            }
        }
    }
}

/// Sends every delivery, skipping connections that are gone or not reading.
pub fn deliver(deliveries: Vec<Delivery>) {
    for delivery in deliveries {
        delivery.send();
    }
}

/// Errors from registry operations. None of them change session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum SessionError {
    /// No live session has this id.
    #[display("Session {} not found", _0)]
    SessionNotFound(SessionId),

    /// The second seat is already taken.
    #[display("Session {} is full", _0)]
    SessionFull(SessionId),

    /// The caller's symbol is not the one to move, or no opponent has joined.
    #[display("Not {}'s turn", _0)]
    NotYourTurn(Symbol),

    /// The caller holds no seat in this session.
    #[display("Connection {} is not seated in session {}", _0, _1)]
    NotParticipant(ConnId, SessionId),

    /// The rules engine rejected the move.
    #[display("{}", _0)]
    IllegalMove(RulesError),
}

impl std::error::Error for SessionError {}

impl From<&SessionError> for ErrorCode {
    fn from(err: &SessionError) -> Self {
        match err {
            SessionError::SessionNotFound(_) => ErrorCode::GameNotFound,
            SessionError::SessionFull(_) => ErrorCode::SessionFull,
            SessionError::NotYourTurn(_) => ErrorCode::NotYourTurn,
            SessionError::NotParticipant(..) => ErrorCode::NotInSession,
            SessionError::IllegalMove(_) => ErrorCode::InvalidMove,
        }
    }
}

/// What a committed move produced.
#[derive(Debug, Clone, Getters)]
pub struct MoveResult {
    /// Board after the move.
    board: Board,
    /// Set when the move ended the game.
    outcome: Option<Outcome>,
    /// Whether the engine now owes a move.
    engine_to_move: bool,
    /// Board updates and, on completion, game-over notices.
    deliveries: Vec<Delivery>,
}

impl MoveResult {
    /// Takes the messages to send.
    pub fn into_deliveries(self) -> Vec<Delivery> {
        self.deliveries
    }
}

/// Read-only view of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Getters)]
pub struct SessionSnapshot {
    /// Session id.
    id: SessionId,
    /// Current board.
    board: Board,
    /// Lifecycle status.
    status: Status,
    /// Symbol played by the engine, for engine sessions.
    engine_seat: Option<Symbol>,
}

#[derive(Debug)]
struct Session {
    id: SessionId,
    board: Board,
    /// Slot 1, plays X. The engine only sits here when it opens.
    creator: Participant,
    /// Slot 2, plays O. Never reassigned once filled.
    joiner: Option<Participant>,
    status: Status,
    created_at: Instant,
}

impl Session {
    fn symbol_of(&self, mover: Mover) -> Option<Symbol> {
        let seated = |p: &Participant| match mover {
            Mover::Conn(id) => p.is_conn(id),
            Mover::Engine => matches!(p, Participant::Engine),
        };
        if seated(&self.creator) {
            Some(Symbol::X)
        } else if self.joiner.as_ref().is_some_and(seated) {
            Some(Symbol::O)
        } else {
            None
        }
    }

    fn participant(&self, symbol: Symbol) -> Option<&Participant> {
        match symbol {
            Symbol::X => Some(&self.creator),
            Symbol::O => self.joiner.as_ref(),
        }
    }

    fn engine_seat(&self) -> Option<Symbol> {
        [Symbol::X, Symbol::O]
            .into_iter()
            .find(|s| matches!(self.participant(*s), Some(Participant::Engine)))
    }

    /// One delivery of `message` per seated connection.
    fn broadcast(&self, message: ServerMessage) -> Vec<Delivery> {
        std::iter::once(&self.creator)
            .chain(self.joiner.as_ref())
            .filter_map(Participant::mailbox)
            .map(|mailbox| Delivery {
                mailbox: mailbox.clone(),
                message,
            })
            .collect()
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            board: self.board,
            status: self.status,
            engine_seat: self.engine_seat(),
        }
    }
}

/// Locks a mutex, recovering the data if a previous holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct Inner {
    sessions: Mutex<HashMap<SessionId, Arc<Mutex<Session>>>>,
    ids: IdAllocator,
}

/// Manages all game sessions. Clones share the same sessions.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<Inner>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    #[instrument]
    pub fn new() -> Self {
        info!("Creating session registry");
        Self::default()
    }

    fn insert(&self, creator: Participant, joiner: Option<Participant>) -> SessionId {
        let id = self.inner.ids.next_session();
        let status = if joiner.is_some() {
            Status::InProgress
        } else {
            Status::WaitingForOpponent
        };
        let session = Session {
            id,
            board: initial_state(),
            creator,
            joiner,
            status,
            created_at: Instant::now(),
        };
        lock(&self.inner.sessions).insert(id, Arc::new(Mutex::new(session)));
        id
    }

    fn get(&self, id: SessionId) -> Result<Arc<Mutex<Session>>, SessionError> {
        lock(&self.inner.sessions)
            .get(&id)
            .cloned()
            .ok_or(SessionError::SessionNotFound(id))
    }

    fn remove(&self, id: SessionId) {
        if lock(&self.inner.sessions).remove(&id).is_some() {
            debug!(session_id = %id, "Session removed");
        }
    }

    /// Creates a session with `creator` seated as X, waiting for an opponent.
    #[instrument(skip(self, creator))]
    pub fn create_session(&self, creator: Participant) -> SessionId {
        let id = self.insert(creator, None);
        info!(session_id = %id, "Created new session");
        id
    }

    /// Creates an in-progress session between `human`, playing `symbol`, and the engine.
    ///
    /// When the human takes O the engine holds slot 1 and owes the opening move.
    #[instrument(skip(self, human))]
    pub fn create_engine_session(&self, human: Participant, symbol: Symbol) -> SessionId {
        let id = match symbol {
            Symbol::X => self.insert(human, Some(Participant::Engine)),
            Symbol::O => self.insert(Participant::Engine, Some(human)),
        };
        info!(session_id = %id, engine = %symbol.opponent(), "Created session against engine");
        id
    }

    /// Seats `joiner` as O.
    ///
    /// Exactly one of any number of concurrent joins succeeds; the rest get
    /// [`SessionError::SessionFull`]. On success the creator is told an
    /// opponent joined.
    #[instrument(skip(self, joiner), fields(session_id = %id))]
    pub fn join_session(
        &self,
        id: SessionId,
        joiner: Participant,
    ) -> Result<Vec<Delivery>, SessionError> {
        let session = self.get(id)?;
        let mut session = lock(&session);

        if session.status.is_finished() {
            return Err(SessionError::SessionNotFound(id));
        }
        if session.joiner.is_some() {
            warn!("Session already has 2 players");
            return Err(SessionError::SessionFull(id));
        }

        session.joiner = Some(joiner);
        session.status = Status::InProgress;
        info!(status = %session.status, "Opponent joined");

        Ok(session
            .creator
            .mailbox()
            .map(|mailbox| Delivery {
                mailbox: mailbox.clone(),
                message: ServerMessage::OpponentJoined,
            })
            .into_iter()
            .collect())
    }

    /// Applies a move for the connection `conn`.
    ///
    /// The connection's bound symbol must equal the board-derived mover;
    /// both checks and the commit happen under the session lock. Broadcasts
    /// the new board to both seats; on a terminal board also broadcasts the
    /// outcome, completes the session and removes it.
    #[instrument(skip(self), fields(session_id = %id, conn_id = %conn, row = mv.row, col = mv.col))]
    pub fn apply_move(
        &self,
        id: SessionId,
        conn: ConnId,
        mv: Move,
    ) -> Result<MoveResult, SessionError> {
        self.commit(id, Mover::Conn(conn), mv)
    }

    /// Applies a move on behalf of the engine seat.
    #[instrument(skip(self), fields(session_id = %id, row = mv.row, col = mv.col))]
    pub fn engine_move(
        &self,
        id: SessionId,
        mv: Move,
    ) -> Result<MoveResult, SessionError> {
        self.commit(id, Mover::Engine, mv)
    }

    fn commit(
        &self,
        id: SessionId,
        mover: Mover,
        mv: Move,
    ) -> Result<MoveResult, SessionError> {
        let session = self.get(id)?;
        let mut session = lock(&session);

        if session.status.is_finished() {
            return Err(SessionError::SessionNotFound(id));
        }
        let symbol = match (session.symbol_of(mover), mover) {
            (Some(symbol), _) => symbol,
            (None, Mover::Conn(conn)) => return Err(SessionError::NotParticipant(conn, id)),
            (None, Mover::Engine) => return Err(SessionError::NotYourTurn(Symbol::O)),
        };
        if session.status == Status::WaitingForOpponent {
            debug!(%symbol, "Move before opponent joined");
            return Err(SessionError::NotYourTurn(symbol));
        }
        let to_move = player_to_move(&session.board);
        if symbol != to_move {
            warn!(%symbol, %to_move, "Player tried to move out of turn");
            return Err(SessionError::NotYourTurn(symbol));
        }
        let board = apply_move(&session.board, mv, symbol).map_err(|e| {
            warn!(error = %e, "Invalid move");
            SessionError::IllegalMove(e)
        })?;

        session.board = board;
        let mut deliveries = session.broadcast(ServerMessage::BoardUpdate(board));
        let result = outcome(&board);
        if let Some(result) = result {
            session.status = Status::Completed;
            deliveries.extend(session.broadcast(ServerMessage::GameOver(result)));
            info!(outcome = ?result, board = %board, "Game completed");
        } else {
            debug!(%symbol, board = %board, "Move committed");
        }
        let engine_to_move =
            result.is_none() && session.engine_seat() == Some(player_to_move(&board));
        drop(session);

        if result.is_some() {
            self.remove(id);
        }
        Ok(MoveResult {
            board,
            outcome: result,
            engine_to_move,
            deliveries,
        })
    }

    /// Tears down the session after `conn` went away.
    ///
    /// Unless the game already completed, the session is aborted, the
    /// remaining connection is told its opponent left, and the session is
    /// removed. Unknown sessions and strangers are ignored.
    #[instrument(skip(self), fields(session_id = %id, conn_id = %conn))]
    pub fn disconnect(&self, id: SessionId, conn: ConnId) -> Vec<Delivery> {
        let Ok(session) = self.get(id) else {
            debug!("Session already gone");
            return Vec::new();
        };
        let mut session = lock(&session);

        if session.status.is_finished() {
            return Vec::new();
        }
        let Some(left) = session.symbol_of(Mover::Conn(conn)) else {
            warn!("Disconnect from a connection that holds no seat");
            return Vec::new();
        };

        session.status = Status::Aborted;
        info!(symbol = %left, "Participant disconnected, aborting session");
        let deliveries = session
            .participant(left.opponent())
            .and_then(Participant::mailbox)
            .map(|mailbox| Delivery {
                mailbox: mailbox.clone(),
                message: ServerMessage::OpponentDisconnected,
            })
            .into_iter()
            .collect();
        drop(session);

        self.remove(id);
        deliveries
    }

    /// Aborts sessions that have waited longer than `max_wait` for an opponent.
    ///
    /// Each expired creator is sent `error:session_expired`.
    #[instrument(skip(self))]
    pub fn reap_idle(&self, max_wait: Duration) -> Vec<Delivery> {
        let sessions: Vec<_> = lock(&self.inner.sessions)
            .iter()
            .map(|(id, session)| (*id, Arc::clone(session)))
            .collect();

        let mut deliveries = Vec::new();
        for (id, session) in sessions {
            let mut guard = lock(&session);
            if guard.status != Status::WaitingForOpponent || guard.created_at.elapsed() < max_wait {
                continue;
            }
            guard.status = Status::Aborted;
            if let Some(mailbox) = guard.creator.mailbox() {
                deliveries.push(Delivery {
                    mailbox: mailbox.clone(),
                    message: ServerMessage::Error(ErrorCode::SessionExpired),
                });
            }
            drop(guard);
            info!(session_id = %id, "Reaped idle session");
            self.remove(id);
        }
        deliveries
    }

    /// Read-only copy of a live session.
    pub fn snapshot(&self, id: SessionId) -> Option<SessionSnapshot> {
        let session = self.get(id).ok()?;
        let session = lock(&session);
        (!session.status.is_finished()).then(|| session.snapshot())
    }

    /// Checks whether `id` names a live session.
    pub fn contains(&self, id: SessionId) -> bool {
        self.snapshot(id).is_some()
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        lock(&self.inner.sessions).len()
    }
}
