//! The engine bridge: the only two-way boundary of the session.
//!
//! The session calls into the bridge through [`EngineBridge`]. The bridge
//! talks back by sending [`BridgeEvent`]s through an [`EventSender`] on
//! whatever thread it likes; the session drains the matching receiver on its
//! own context, so engine callbacks never touch session state directly.

use std::sync::mpsc::{self, Receiver, Sender};

use crate::domain::{IndexedPiece, Move, PackedMove, Square};

/// Messages sent from the engine to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeEvent {
    /// The position changed; carries the `GameState` code
    BoardChanged(i32),
    /// A search ended; `false` when it produced no move
    SearchFinished(bool),
}

/// The callback surface handed to the bridge
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Sender<BridgeEvent>,
}

impl EventSender {
    /// Create a sender and the receiver the session drains
    pub fn channel() -> (EventSender, Receiver<BridgeEvent>) {
        let (tx, rx) = mpsc::channel();
        (EventSender { tx }, rx)
    }

    /// Returns false once the session has dropped the receiving end
    pub fn board_changed(&self, state_code: i32) -> bool {
        self.tx.send(BridgeEvent::BoardChanged(state_code)).is_ok()
    }

    /// Returns false once the session has dropped the receiving end
    pub fn search_finished(&self, success: bool) -> bool {
        self.tx.send(BridgeEvent::SearchFinished(success)).is_ok()
    }
}

/// Contract of the external move-search engine.
///
/// The engine is authoritative for legality and board state. Methods that
/// change the position answer later with `BoardChanged` rather than through
/// a return value.
pub trait EngineBridge: Send {
    /// Start a fresh game and install the callback channel
    fn init_board(&mut self, events: EventSender, player_is_white: bool);

    /// Load a position; `false` leaves the current game untouched
    fn load_fen(&mut self, player_is_white: bool, fen: &str) -> bool;

    /// Load a position and replay `moves` from it
    fn load_fen_moves(&mut self, player_is_white: bool, fen: &str, moves: &[PackedMove]);

    fn is_engine_busy(&self) -> bool;

    fn is_player_white(&self) -> bool;

    fn is_players_turn(&self) -> bool;

    fn pieces(&self) -> Vec<IndexedPiece>;

    /// Legal moves starting on `square`
    fn possible_moves(&self, square: Square) -> Vec<Move>;

    fn make_move(&mut self, packed: PackedMove);

    /// Ask the engine to search and play; it may refuse
    fn make_engine_move(&mut self);

    /// Cancel a running search
    fn stop_search(&mut self);

    fn undo_moves(&mut self);

    fn redo_moves(&mut self);

    fn current_fen(&self) -> String;

    fn start_fen(&self) -> String;

    fn moves_history(&self) -> Vec<Move>;

    /// Index of the last applied move in the history, `None` at the start
    fn current_move_index(&self) -> Option<usize>;
}
