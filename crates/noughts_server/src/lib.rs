//! Two-player tic-tac-toe session server.
//!
//! # Architecture
//!
//! - **Codec**: 4-byte big-endian length-prefixed frames; text commands and
//!   a 9-byte binary board snapshot
//! - **Registry**: shared session map with one lock per session; operations
//!   return the messages to send instead of writing to sockets
//! - **Handler**: one read loop and one writer task per connection
//! - **Server**: TCP accept loop plus an optional idle-session reaper
//! - **Client / Players**: protocol client and in-process matches
//!
//! # Example
//!
//! ```no_run
//! use noughts_server::{GameServer, ServerConfig};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let server = GameServer::bind(ServerConfig::default()).await?;
//! server.run().await
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod client;
mod codec;
mod config;
mod handler;
mod ids;
mod players;
mod registry;
mod server;

pub use client::GameClient;
pub use codec::{
    BOARD_FRAME_LEN, CodecError, Command, DEFAULT_MAX_FRAME_LEN, ErrorCode, LENGTH_PREFIX,
    MAX_COMMAND_LEN, ServerMessage, decode_board, decode_command, decode_message, encode_board,
    encode_command, encode_frame, encode_message, read_frame, read_message, write_frame,
    write_message,
};
pub use config::{ConfigError, ServerConfig};
pub use handler::ConnectionHandler;
pub use ids::{ConnId, IdAllocator, SessionId};
pub use players::{EnginePlayer, LocalMatch, MatchReport, Player, ScriptedPlayer};
pub use registry::{
    Delivery, MAILBOX_CAPACITY, Mailbox, MoveResult, Participant, SessionError, SessionRegistry,
    SessionSnapshot, Status, deliver,
};
pub use server::GameServer;
