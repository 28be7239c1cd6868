//! Async client speaking the wire protocol.

use crate::codec::{
    Command, DEFAULT_MAX_FRAME_LEN, ErrorCode, ServerMessage, encode_command, read_message,
    write_frame,
};
use crate::ids::SessionId;
use anyhow::{Context, Result, bail};
use noughts_engine::{Board, Move, Outcome, Symbol};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::{debug, instrument};

/// Connection to a game server.
#[derive(Debug)]
pub struct GameClient {
    stream: TcpStream,
    max_frame_len: usize,
}

impl GameClient {
    /// Connects to a server.
    #[instrument(skip(addr))]
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .context("Failed to connect to game server")?;
        stream.set_nodelay(true)?;
        debug!(peer = %stream.peer_addr()?, "Connected");
        Ok(Self {
            stream,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        })
    }

    /// Sends one command.
    pub async fn send(&mut self, command: &Command) -> Result<()> {
        self.send_raw(encode_command(command).as_bytes()).await
    }

    /// Sends an arbitrary payload as one frame.
    pub async fn send_raw(&mut self, payload: &[u8]) -> Result<()> {
        write_frame(&mut self.stream, payload)
            .await
            .context("Failed to send frame")
    }

    /// Receives the next message; `None` once the server closes the stream.
    pub async fn recv(&mut self) -> Result<Option<ServerMessage>> {
        let message = read_message(&mut self.stream, self.max_frame_len)
            .await
            .context("Failed to read server message")?;
        debug!(?message, "Received");
        Ok(message)
    }

    /// Receives the next message, treating a closed stream as an error.
    pub async fn expect_message(&mut self) -> Result<ServerMessage> {
        self.recv()
            .await?
            .context("Server closed the connection")
    }

    /// Creates a session and returns its id.
    pub async fn create(&mut self) -> Result<SessionId> {
        self.send(&Command::New).await?;
        match self.expect_message().await? {
            ServerMessage::NewGame(id) => Ok(id),
            other => bail!("Expected new_game, got {:?}", other),
        }
    }

    /// Creates a session against the engine with the caller playing `symbol`.
    ///
    /// Returns once the session is ready. When the caller takes O the
    /// engine's opening board update follows.
    pub async fn create_vs_engine(&mut self, symbol: Symbol) -> Result<SessionId> {
        self.send(&Command::NewAgainstEngine(symbol)).await?;
        let id = match self.expect_message().await? {
            ServerMessage::NewGame(id) => id,
            other => bail!("Expected new_game, got {:?}", other),
        };
        match self.expect_message().await? {
            ServerMessage::OpponentJoined => Ok(id),
            other => bail!("Expected opponent_joined, got {:?}", other),
        }
    }

    /// Joins a session, returning the error code on refusal.
    pub async fn join(&mut self, id: SessionId) -> Result<std::result::Result<(), ErrorCode>> {
        self.send(&Command::Join(id)).await?;
        match self.expect_message().await? {
            ServerMessage::Joined(joined) if joined == id => Ok(Ok(())),
            ServerMessage::Error(code) => Ok(Err(code)),
            other => bail!("Expected joined:{}, got {:?}", id, other),
        }
    }

    /// Sends a move without waiting for a reply.
    pub async fn play(&mut self, mv: Move) -> Result<()> {
        self.send(&Command::Move(mv)).await
    }

    /// Skips messages until the next board update.
    pub async fn next_board(&mut self) -> Result<Board> {
        loop {
            match self.expect_message().await? {
                ServerMessage::BoardUpdate(board) => return Ok(board),
                ServerMessage::Error(code) => bail!("Server reported error:{}", code),
                other => debug!(?other, "Skipping while waiting for board"),
            }
        }
    }

    /// Skips messages until the game ends.
    pub async fn game_over(&mut self) -> Result<Outcome> {
        loop {
            match self.expect_message().await? {
                ServerMessage::GameOver(outcome) => return Ok(outcome),
                ServerMessage::OpponentDisconnected => bail!("Opponent disconnected"),
                other => debug!(?other, "Skipping while waiting for game over"),
            }
        }
    }
}
