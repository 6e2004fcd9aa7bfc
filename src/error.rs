//! Error types for the session controller.
//!
//! Each concern gets its own enum so callers can tell a corrupted save apart
//! from a rejected move. Nothing here is fatal to a running game: codec and
//! save errors are logged and swallowed by the persistence layer, session
//! errors are returned to the UI caller.

use thiserror::Error;

/// Errors raised while packing or unpacking a move
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// A square index outside 0..64 was used where a board square is required
    #[error("square {0} is off the board")]
    SquareOffBoard(u8),

    /// A 3-bit piece type field held a value with no piece type
    #[error("unknown piece type code {0}")]
    UnknownPieceType(u8),

    /// Bits above the packed layout were set
    #[error("packed move {0:#x} has bits outside the move layout")]
    StrayBits(u32),

    /// The flag combination cannot come from a legal move
    #[error("inconsistent move flags: {0}")]
    InconsistentFlags(&'static str),

    /// A saved move line was not a number
    #[error("malformed packed move text {0:?}")]
    MalformedText(String),
}

/// Errors raised by a save store
#[derive(Error, Debug)]
pub enum SaveError {
    /// Underlying file I/O failed
    #[error("save I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stored blob could not be decoded
    #[error("corrupted save: {0}")]
    Corrupted(String),

    /// The stored blob was written by an unknown format version
    #[error("unsupported save format version {0}")]
    UnsupportedVersion(String),
}

impl From<CodecError> for SaveError {
    fn from(err: CodecError) -> Self {
        SaveError::Corrupted(err.to_string())
    }
}

/// Errors returned to the UI by session operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The operation needs the human player to be on move
    #[error("it is not the player's turn")]
    NotPlayersTurn,

    /// The submitted move is not among the moves offered on the board
    #[error("move {0} was not offered for the selected square")]
    MoveNotOffered(String),

    /// The engine refused the FEN; the previous game is untouched
    #[error("invalid FEN: {0}")]
    InvalidFen(String),

    /// The game is over, no further moves are accepted
    #[error("the game is finished")]
    GameFinished,
}

/// Errors raised while talking to an external search process
#[derive(Error, Debug)]
pub enum EngineError {
    /// The engine process could not be started
    #[error("failed to start engine {path}: {source}")]
    Spawn {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The engine closed its output stream
    #[error("engine exited unexpectedly")]
    Exited,

    /// The engine did not answer in time
    #[error("engine did not answer {0:?} in time")]
    Timeout(&'static str),

    /// The engine answered with a move that is not legal in the position
    #[error("engine played unknown move {0:?}")]
    UnknownMove(String),
}

/// Result type alias for session operations
pub type SessionResult<T> = Result<T, SessionError>;
