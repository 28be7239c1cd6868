//! Per-connection protocol loop.

use crate::codec::{Command, ErrorCode, ServerMessage, decode_command, read_frame, write_message};
use crate::ids::{ConnId, SessionId};
use crate::registry::{
    MAILBOX_CAPACITY, Mailbox, MoveResult, Participant, SessionError, SessionRegistry, deliver,
};
use derive_new::new;
use noughts_engine::{Board, Move, Searcher, Symbol};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, instrument, warn};

/// How long queued replies may take to flush once the client stops sending.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Drives one client connection until its transport closes.
///
/// Replies and peer notifications all travel through the connection's
/// mailbox, which a dedicated writer task drains in order.
#[derive(Debug, Clone, new)]
pub struct ConnectionHandler {
    conn: ConnId,
    registry: SessionRegistry,
    searcher: Searcher,
    max_frame_len: usize,
}

/// Mutable per-connection state owned by the read loop.
#[derive(Debug)]
struct Seat {
    mailbox: Mailbox,
    session: Option<SessionId>,
    /// Set once a reply found the mailbox full; the connection is then closed.
    stalled: bool,
}

impl Seat {
    fn reply(&mut self, message: ServerMessage) {
        match self.mailbox.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(message)) => {
                warn!(?message, "Client is not reading its replies");
                self.stalled = true;
            }
            Err(TrySendError::Closed(message)) => {
                debug!(?message, "Writer already stopped, dropping reply");
            }
        }
    }
}

impl ConnectionHandler {
    /// Serves the connection, then tears down whatever session it held.
    #[instrument(skip_all, fields(conn_id = %self.conn))]
    pub async fn run<S>(self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (mut reader, mut writer) = tokio::io::split(stream);
        let (tx, mut rx) = mpsc::channel::<ServerMessage>(MAILBOX_CAPACITY);

        // Ends once every sender is gone and the queue is empty, or on a write error.
        let mut writer_task = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if let Err(e) = write_message(&mut writer, &message).await {
                    debug!(error = %e, "Write failed, stopping writer");
                    break;
                }
            }
        });

        let mut seat = Seat {
            mailbox: tx,
            session: None,
            stalled: false,
        };

        loop {
            let payload = match read_frame(&mut reader, self.max_frame_len).await {
                Ok(Some(payload)) => payload,
                Ok(None) => {
                    info!("Client closed connection");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Transport error, closing connection");
                    break;
                }
            };

            match decode_command(&payload) {
                Ok(command) => self.dispatch(&mut seat, command).await,
                Err(e) if e.is_recoverable() => {
                    debug!(error = %e, "Rejecting request");
                    seat.reply(ServerMessage::Error(ErrorCode::InvalidRequest));
                }
                Err(e) => {
                    warn!(error = %e, "Undecodable request, closing connection");
                    break;
                }
            }

            if seat.stalled {
                warn!("Mailbox full, closing connection");
                break;
            }
        }

        // Tearing down the session drops the registry's copies of the mailbox,
        // so dropping the seat leaves the writer as the last holder.
        if let Some(id) = seat.session.take() {
            deliver(self.registry.disconnect(id, self.conn));
        }
        let stalled = seat.stalled;
        drop(seat);

        if stalled {
            writer_task.abort();
            return;
        }
        // A half-closed client still reads: flush what is queued before closing.
        match tokio::time::timeout(DRAIN_TIMEOUT, &mut writer_task).await {
            Ok(Ok(())) => debug!("Writer drained"),
            Ok(Err(e)) => error!(error = %e, "Writer task failed"),
            Err(_) => {
                warn!("Client did not read its remaining replies, closing connection");
                writer_task.abort();
            }
        }
    }

    async fn dispatch(&self, seat: &mut Seat, command: Command) {
        debug!(?command, "Dispatching command");
        match command {
            Command::New | Command::NewAgainstEngine(_) | Command::Join(_)
                if self.seated(seat) =>
            {
                seat.reply(ServerMessage::Error(ErrorCode::AlreadyInSession));
            }
            Command::New => {
                let id = self.registry.create_session(self.participant(seat));
                seat.session = Some(id);
                seat.reply(ServerMessage::NewGame(id));
            }
            Command::NewAgainstEngine(symbol) => {
                let id = self
                    .registry
                    .create_engine_session(self.participant(seat), symbol);
                seat.session = Some(id);
                seat.reply(ServerMessage::NewGame(id));
                seat.reply(ServerMessage::OpponentJoined);
                if symbol == Symbol::O {
                    let board = self.registry.snapshot(id).map(|s| *s.board());
                    if let Some(board) = board {
                        self.engine_reply(seat, id, board).await;
                    }
                }
            }
            Command::Join(id) => match self.registry.join_session(id, self.participant(seat)) {
                Ok(deliveries) => {
                    seat.session = Some(id);
                    seat.reply(ServerMessage::Joined(id));
                    deliver(deliveries);
                }
                Err(e) => {
                    debug!(error = %e, "Join rejected");
                    seat.reply(ServerMessage::Error(ErrorCode::from(&e)));
                }
            },
            Command::Move(mv) => self.play(seat, mv).await,
        }
    }

    /// Whether the connection sits in a live session; clears stale seats.
    fn seated(&self, seat: &mut Seat) -> bool {
        match seat.session {
            Some(id) if self.registry.contains(id) => true,
            Some(_) => {
                seat.session = None;
                false
            }
            None => false,
        }
    }

    fn participant(&self, seat: &Seat) -> Participant {
        Participant::remote(self.conn, seat.mailbox.clone())
    }

    async fn play(&self, seat: &mut Seat, mv: Move) {
        let Some(id) = seat.session else {
            seat.reply(ServerMessage::Error(ErrorCode::NotInSession));
            return;
        };

        match self.registry.apply_move(id, self.conn, mv) {
            Ok(result) => {
                let engine_to_move = *result.engine_to_move();
                let board = *result.board();
                self.settle(seat, result);
                if engine_to_move {
                    self.engine_reply(seat, id, board).await;
                }
            }
            Err(SessionError::SessionNotFound(_)) => {
                seat.session = None;
                seat.reply(ServerMessage::Error(ErrorCode::NotInSession));
            }
            Err(e) => {
                debug!(error = %e, "Move rejected");
                seat.reply(ServerMessage::Error(ErrorCode::from(&e)));
            }
        }
    }

    /// Sends a committed move's messages and unseats after a finished game.
    fn settle(&self, seat: &mut Seat, result: MoveResult) {
        if result.outcome().is_some() {
            seat.session = None;
        }
        deliver(result.into_deliveries());
    }

    async fn engine_reply(&self, seat: &mut Seat, id: SessionId, board: Board) {
        let searcher = self.searcher.clone();
        let chosen = tokio::task::spawn_blocking(move || searcher.best_move(&board)).await;

        let mv = match chosen {
            Ok(Some(mv)) => mv,
            Ok(None) => {
                warn!(%board, "Engine asked to move on a terminal board");
                return;
            }
            Err(e) => {
                error!(error = %e, "Engine search task failed");
                return;
            }
        };

        debug!(%mv, "Engine chose move");
        match self.registry.engine_move(id, mv) {
            Ok(result) => self.settle(seat, result),
            Err(e) => warn!(error = %e, "Engine move rejected"),
        }
    }
}
