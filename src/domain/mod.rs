//! Pure domain layer: move codec, board types and derived views.

pub mod captured;
pub mod chess;
pub mod moves;
pub mod pgn;
pub mod tiles;
pub mod uci;

pub use captured::CapturedPieces;
pub use chess::{GameState, IndexedPiece, Piece, PieceType, Square};
pub use moves::{Move, MoveFields, MoveFlags, PackedMove};
pub use pgn::PgnExporter;
pub use tiles::{Tile, TileBoard, TileState};
