//! Length-delimited wire protocol.
//!
//! Every message travels as one or more frames: a 4-byte big-endian length
//! followed by that many payload bytes. Commands and notifications are UTF-8
//! text frames; a `board_update` text frame is always followed by a 9-byte
//! binary board frame. Nothing is ever split on a delimiter, so board bytes
//! can never be mistaken for a message boundary.

use crate::ids::SessionId;
use noughts_engine::{Board, Cell, Move, Outcome, SIZE, Symbol};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{instrument, trace};

/// Size of the frame length prefix in bytes.
pub const LENGTH_PREFIX: usize = 4;

/// Default upper bound on a frame payload.
pub const DEFAULT_MAX_FRAME_LEN: usize = 1024;

/// Length of the longest well-formed command, `join:` with the largest id.
pub const MAX_COMMAND_LEN: usize = "join:".len() + 20;

/// Payload size of a board snapshot frame.
pub const BOARD_FRAME_LEN: usize = SIZE * SIZE;

/// Text of the frame announcing a board snapshot.
const BOARD_UPDATE: &str = "board_update";

/// Client → server request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Create a session and wait for a human opponent.
    New,
    /// Create a session against the built-in engine; the caller plays the given symbol.
    NewAgainstEngine(Symbol),
    /// Join an existing session as O.
    Join(SessionId),
    /// Place the caller's symbol.
    Move(Move),
}

/// Error reported to a client as `error:<code>`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString, strum::EnumIter,
)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCode {
    /// The command could not be parsed.
    InvalidRequest,
    /// No live session has the requested id.
    GameNotFound,
    /// Both seats of the session are taken.
    SessionFull,
    /// The rules engine rejected the move.
    InvalidMove,
    /// The caller's symbol is not the one to move.
    NotYourTurn,
    /// The connection already sits in a live session.
    AlreadyInSession,
    /// The connection has no session to move in.
    NotInSession,
    /// Nobody joined before the idle timeout.
    SessionExpired,
}

/// Server → client message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMessage {
    /// Reply to `new`.
    NewGame(SessionId),
    /// Reply to a successful `join`.
    Joined(SessionId),
    /// Sent to the creator once the second seat is filled.
    OpponentJoined,
    /// Authoritative board after a committed move.
    BoardUpdate(Board),
    /// The game reached a terminal board.
    GameOver(Outcome),
    /// The other participant's connection closed.
    OpponentDisconnected,
    /// A request failed.
    Error(ErrorCode),
}

/// Wire protocol failure.
#[derive(Debug, derive_more::Display)]
pub enum CodecError {
    /// Transport read or write failed.
    #[display("I/O error: {}", _0)]
    Io(io::Error),

    /// The stream ended in the middle of a frame.
    #[display("Stream closed mid-frame")]
    UnexpectedEof,

    /// A frame exceeded the configured limit.
    #[display("Frame of {} bytes exceeds limit of {}", len, max)]
    FrameTooLarge {
        /// Announced payload length.
        len: usize,
        /// Configured limit.
        max: usize,
    },

    /// A text frame held invalid UTF-8.
    #[display("Frame is not valid UTF-8")]
    InvalidUtf8,

    /// A text frame held an unknown or malformed command or message.
    #[display("Malformed message: {:?}", _0)]
    Malformed(String),

    /// A board frame had the wrong size or an unknown cell byte.
    #[display("Invalid board snapshot: {}", _0)]
    InvalidBoard(String),
}

impl std::error::Error for CodecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CodecError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for CodecError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            CodecError::UnexpectedEof
        } else {
            CodecError::Io(err)
        }
    }
}

impl CodecError {
    /// Whether the stream is still usable after this error.
    ///
    /// A frame whose payload was read completely can be answered with
    /// `error:invalid_request`; anything else leaves the stream out of sync.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CodecError::InvalidUtf8 | CodecError::Malformed(_))
    }
}

// ─────────────────────────────────────────────────────────────
//  Framing primitive
// ─────────────────────────────────────────────────────────────

/// Prefixes `payload` with its big-endian length, appending to `out`.
pub fn encode_frame(payload: &[u8], out: &mut Vec<u8>) -> Result<(), CodecError> {
    let len = u32::try_from(payload.len()).map_err(|_| CodecError::FrameTooLarge {
        len: payload.len(),
        max: u32::MAX as usize,
    })?;
    out.reserve(LENGTH_PREFIX + payload.len());
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(payload);
    Ok(())
}

/// Writes one frame and flushes.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::new();
    encode_frame(payload, &mut buf)?;
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame.
///
/// Returns `Ok(None)` when the stream ends cleanly on a frame boundary.
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> Result<Option<Vec<u8>>, CodecError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; LENGTH_PREFIX];
    let mut filled = 0;
    while filled < LENGTH_PREFIX {
        let n = reader.read(&mut prefix[filled..]).await?;
        if n == 0 {
            return if filled == 0 {
                Ok(None)
            } else {
                Err(CodecError::UnexpectedEof)
            };
        }
        filled += n;
    }

    let len = u32::from_be_bytes(prefix) as usize;
    if len > max_len {
        return Err(CodecError::FrameTooLarge { len, max: max_len });
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    trace!(len, "Frame read");
    Ok(Some(payload))
}

// ─────────────────────────────────────────────────────────────
//  Commands
// ─────────────────────────────────────────────────────────────

/// Text form of a command.
pub fn encode_command(command: &Command) -> String {
    match command {
        Command::New => "new".to_string(),
        Command::NewAgainstEngine(symbol) => format!("new:ai:{symbol}"),
        Command::Join(id) => format!("join:{id}"),
        Command::Move(mv) => format!("move:{},{}", mv.row, mv.col),
    }
}

/// Parses a command frame payload.
///
/// Surrounding whitespace is ignored so line-oriented clients may append a
/// newline.
#[instrument(level = "debug", skip(payload), fields(len = payload.len()))]
pub fn decode_command(payload: &[u8]) -> Result<Command, CodecError> {
    let text = std::str::from_utf8(payload).map_err(|_| CodecError::InvalidUtf8)?;
    let text = text.trim();
    let malformed = || CodecError::Malformed(text.to_string());

    let (verb, arg) = match text.split_once(':') {
        Some((verb, arg)) => (verb, Some(arg)),
        None => (text, None),
    };

    match (verb, arg) {
        ("new", None) => Ok(Command::New),
        ("new", Some("ai")) => Ok(Command::NewAgainstEngine(Symbol::X)),
        ("new", Some(arg)) => {
            let symbol = arg.strip_prefix("ai:").ok_or_else(malformed)?;
            symbol
                .trim()
                .parse()
                .map(Command::NewAgainstEngine)
                .map_err(|_| malformed())
        }
        ("join", Some(id)) => id.trim().parse().map(Command::Join).map_err(|_| malformed()),
        ("move", Some(coords)) => {
            let (row, col) = coords.split_once(',').ok_or_else(malformed)?;
            let row = row.trim().parse().map_err(|_| malformed())?;
            let col = col.trim().parse().map_err(|_| malformed())?;
            Ok(Command::Move(Move::new(row, col)))
        }
        _ => Err(malformed()),
    }
}

// ─────────────────────────────────────────────────────────────
//  Board snapshots
// ─────────────────────────────────────────────────────────────

/// Packs a board into 9 bytes, row-major: 0 empty, 1 X, 2 O.
pub fn encode_board(board: &Board) -> [u8; BOARD_FRAME_LEN] {
    let mut bytes = [0u8; BOARD_FRAME_LEN];
    for (byte, cell) in bytes.iter_mut().zip(board.cells()) {
        *byte = match cell {
            Cell::Empty => 0,
            Cell::Occupied(Symbol::X) => 1,
            Cell::Occupied(Symbol::O) => 2,
        };
    }
    bytes
}

/// Unpacks a board frame produced by [`encode_board`].
pub fn decode_board(payload: &[u8]) -> Result<Board, CodecError> {
    if payload.len() != BOARD_FRAME_LEN {
        return Err(CodecError::InvalidBoard(format!(
            "expected {} bytes, got {}",
            BOARD_FRAME_LEN,
            payload.len()
        )));
    }
    let mut rows = [[Cell::Empty; SIZE]; SIZE];
    for (i, byte) in payload.iter().enumerate() {
        rows[i / SIZE][i % SIZE] = match byte {
            0 => Cell::Empty,
            1 => Cell::Occupied(Symbol::X),
            2 => Cell::Occupied(Symbol::O),
            other => {
                return Err(CodecError::InvalidBoard(format!(
                    "unknown cell byte {other} at {i}"
                )));
            }
        };
    }
    let board = Board::from_rows(rows);
    let (x, o) = (board.count(Symbol::X), board.count(Symbol::O));
    if x != o && x != o + 1 {
        return Err(CodecError::InvalidBoard(format!(
            "{x} X and {o} O cannot arise from alternating play"
        )));
    }
    Ok(board)
}

// ─────────────────────────────────────────────────────────────
//  Server messages
// ─────────────────────────────────────────────────────────────

/// Text of a message's leading frame.
fn message_text(message: &ServerMessage) -> String {
    match message {
        ServerMessage::NewGame(id) => format!("new_game:{id}"),
        ServerMessage::Joined(id) => format!("joined:{id}"),
        ServerMessage::OpponentJoined => "opponent_joined".to_string(),
        ServerMessage::BoardUpdate(_) => BOARD_UPDATE.to_string(),
        ServerMessage::GameOver(Outcome::Tie) => "game_over:tie".to_string(),
        ServerMessage::GameOver(Outcome::Winner(symbol)) => format!("game_over:winner:{symbol}"),
        ServerMessage::OpponentDisconnected => "opponent_disconnected".to_string(),
        ServerMessage::Error(code) => format!("error:{code}"),
    }
}

/// Encodes a message as ready-to-write frames.
///
/// A board update yields two frames in one buffer so a single write keeps
/// them adjacent on the stream.
pub fn encode_message(message: &ServerMessage) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    encode_frame(message_text(message).as_bytes(), &mut out)?;
    if let ServerMessage::BoardUpdate(board) = message {
        encode_frame(&encode_board(board), &mut out)?;
    }
    Ok(out)
}

/// Parses the text frame of a server message.
///
/// `board_update` is returned with an empty board; [`read_message`] fills it
/// from the frame that follows.
pub fn decode_message(payload: &[u8]) -> Result<ServerMessage, CodecError> {
    let text = std::str::from_utf8(payload).map_err(|_| CodecError::InvalidUtf8)?;
    let malformed = || CodecError::Malformed(text.to_string());

    if text == BOARD_UPDATE {
        return Ok(ServerMessage::BoardUpdate(Board::new()));
    }
    match text {
        "opponent_joined" => return Ok(ServerMessage::OpponentJoined),
        "opponent_disconnected" => return Ok(ServerMessage::OpponentDisconnected),
        "game_over:tie" => return Ok(ServerMessage::GameOver(Outcome::Tie)),
        _ => {}
    }
    let (head, rest) = text.split_once(':').ok_or_else(malformed)?;
    match head {
        "new_game" => rest.parse().map(ServerMessage::NewGame).map_err(|_| malformed()),
        "joined" => rest.parse().map(ServerMessage::Joined).map_err(|_| malformed()),
        "error" => rest.parse().map(ServerMessage::Error).map_err(|_| malformed()),
        "game_over" => {
            let symbol = rest.strip_prefix("winner:").ok_or_else(malformed)?;
            symbol
                .parse::<Symbol>()
                .map(|s| ServerMessage::GameOver(Outcome::Winner(s)))
                .map_err(|_| malformed())
        }
        _ => Err(malformed()),
    }
}

/// Writes one message.
pub async fn write_message<W>(writer: &mut W, message: &ServerMessage) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&encode_message(message)?).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one message, including the board frame after `board_update`.
///
/// Returns `Ok(None)` when the stream ends cleanly between messages.
pub async fn read_message<R>(
    reader: &mut R,
    max_len: usize,
) -> Result<Option<ServerMessage>, CodecError>
where
    R: AsyncRead + Unpin,
{
    let Some(payload) = read_frame(reader, max_len).await? else {
        return Ok(None);
    };
    match decode_message(&payload)? {
        ServerMessage::BoardUpdate(_) => {
            let frame = read_frame(reader, max_len)
                .await?
                .ok_or(CodecError::UnexpectedEof)?;
            Ok(Some(ServerMessage::BoardUpdate(decode_board(&frame)?)))
        }
        message => Ok(Some(message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use noughts_engine::{apply_move, initial_state};

    #[test]
    fn test_decode_commands() {
        assert_eq!(decode_command(b"new").unwrap(), Command::New);
        assert_eq!(
            decode_command(b"new:ai").unwrap(),
            Command::NewAgainstEngine(Symbol::X)
        );
        assert_eq!(
            decode_command(b"new:ai:O").unwrap(),
            Command::NewAgainstEngine(Symbol::O)
        );
        assert_eq!(
            decode_command(b"join:7").unwrap(),
            Command::Join(SessionId::new(7))
        );
        assert_eq!(
            decode_command(b"move:1,2\n").unwrap(),
            Command::Move(Move::new(1, 2))
        );
    }

    #[test]
    fn test_decode_command_rejects_garbage() {
        for bad in [
            &b"hello"[..],
            b"join",
            b"join:",
            b"join:x",
            b"move:1",
            b"move:a,b",
            b"move:-1,0",
            b"new:human",
            b"new:ai:Z",
            b"new:ai:",
            b"",
        ] {
            let err = decode_command(bad).unwrap_err();
            assert!(err.is_recoverable(), "{err}");
        }
        assert!(matches!(
            decode_command(&[0xff, 0xfe]),
            Err(CodecError::InvalidUtf8)
        ));
    }

    #[test]
    fn test_out_of_range_move_still_decodes() {
        // Range is the rules engine's call, not the codec's.
        assert_eq!(
            decode_command(b"move:5,9").unwrap(),
            Command::Move(Move::new(5, 9))
        );
    }

    #[test]
    fn test_command_text_round_trip() {
        for command in [
            Command::New,
            Command::NewAgainstEngine(Symbol::X),
            Command::NewAgainstEngine(Symbol::O),
            Command::Join(SessionId::new(12)),
            Command::Move(Move::new(2, 0)),
        ] {
            let text = encode_command(&command);
            assert_eq!(decode_command(text.as_bytes()).unwrap(), command);
        }
    }

    #[test]
    fn test_board_bytes() {
        let board = apply_move(&initial_state(), Move::new(0, 1), Symbol::X).unwrap();
        let board = apply_move(&board, Move::new(2, 2), Symbol::O).unwrap();
        assert_eq!(encode_board(&board), [0, 1, 0, 0, 0, 0, 0, 0, 2]);
    }

    #[test]
    fn test_decode_board_rejects_bad_frames() {
        assert!(matches!(decode_board(&[0; 8]), Err(CodecError::InvalidBoard(_))));
        assert!(matches!(decode_board(&[3; 9]), Err(CodecError::InvalidBoard(_))));
    }

    #[test]
    fn test_decode_board_rejects_impossible_counts() {
        let frames: [[u8; BOARD_FRAME_LEN]; 4] = [
            [1; 9],
            [2, 0, 0, 0, 0, 0, 0, 0, 0],
            [1, 1, 0, 0, 0, 0, 0, 0, 0],
            [2, 2, 1, 0, 0, 0, 0, 0, 0],
        ];
        for frame in frames {
            assert!(
                matches!(decode_board(&frame), Err(CodecError::InvalidBoard(_))),
                "{frame:?}"
            );
        }
        assert!(decode_board(&[1, 2, 1, 0, 0, 0, 0, 0, 0]).is_ok());
        assert!(decode_board(&[1, 2, 0, 0, 0, 0, 0, 0, 0]).is_ok());
    }

    #[test]
    fn test_message_texts() {
        let cases = [
            (ServerMessage::NewGame(SessionId::new(1)), "new_game:1"),
            (ServerMessage::Joined(SessionId::new(1)), "joined:1"),
            (ServerMessage::OpponentJoined, "opponent_joined"),
            (ServerMessage::GameOver(Outcome::Tie), "game_over:tie"),
            (
                ServerMessage::GameOver(Outcome::Winner(Symbol::X)),
                "game_over:winner:X",
            ),
            (ServerMessage::OpponentDisconnected, "opponent_disconnected"),
            (
                ServerMessage::Error(ErrorCode::GameNotFound),
                "error:game_not_found",
            ),
            (
                ServerMessage::Error(ErrorCode::NotYourTurn),
                "error:not_your_turn",
            ),
        ];
        for (message, text) in cases {
            assert_eq!(message_text(&message), text);
            assert_eq!(decode_message(text.as_bytes()).unwrap(), message);
        }
    }

    #[test]
    fn test_board_update_is_two_frames() {
        let board = apply_move(&initial_state(), Move::new(1, 1), Symbol::X).unwrap();
        let bytes = encode_message(&ServerMessage::BoardUpdate(board)).unwrap();
        let text_len = BOARD_UPDATE.len();
        assert_eq!(&bytes[..4], &(text_len as u32).to_be_bytes());
        assert_eq!(&bytes[4..4 + text_len], BOARD_UPDATE.as_bytes());
        let rest = &bytes[4 + text_len..];
        assert_eq!(&rest[..4], &9u32.to_be_bytes());
        assert_eq!(&rest[4..], &encode_board(&board));
    }

    #[tokio::test]
    async fn test_read_frame_stops_cleanly_at_eof() {
        let mut empty: &[u8] = &[];
        assert!(read_frame(&mut empty, 16).await.unwrap().is_none());

        let mut truncated: &[u8] = &[0, 0];
        assert!(matches!(
            read_frame(&mut truncated, 16).await,
            Err(CodecError::UnexpectedEof)
        ));

        let mut short_payload: &[u8] = &[0, 0, 0, 5, b'a'];
        assert!(matches!(
            read_frame(&mut short_payload, 16).await,
            Err(CodecError::UnexpectedEof)
        ));
    }

    #[tokio::test]
    async fn test_read_frame_enforces_limit() {
        let mut oversized: &[u8] = &[0, 0, 1, 0];
        let err = read_frame(&mut oversized, 16).await.unwrap_err();
        assert!(matches!(err, CodecError::FrameTooLarge { len: 256, max: 16 }));
        assert!(!err.is_recoverable());
    }

    #[tokio::test]
    async fn test_board_update_survives_delimiter_bytes() {
        // The snapshot bytes sit in their own frame, between two text frames.
        let board = apply_move(&initial_state(), Move::new(0, 0), Symbol::X).unwrap();
        let mut stream = Vec::new();
        write_message(&mut stream, &ServerMessage::BoardUpdate(board))
            .await
            .unwrap();
        write_message(&mut stream, &ServerMessage::GameOver(Outcome::Tie))
            .await
            .unwrap();

        let mut reader = stream.as_slice();
        let first = read_message(&mut reader, DEFAULT_MAX_FRAME_LEN).await.unwrap();
        assert_eq!(first, Some(ServerMessage::BoardUpdate(board)));
        let second = read_message(&mut reader, DEFAULT_MAX_FRAME_LEN).await.unwrap();
        assert_eq!(second, Some(ServerMessage::GameOver(Outcome::Tie)));
        assert_eq!(read_message(&mut reader, DEFAULT_MAX_FRAME_LEN).await.unwrap(), None);
    }
}
