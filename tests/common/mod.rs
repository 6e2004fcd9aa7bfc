//! Shared test doubles for driving `GameSession` without an engine.

#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;

use chess_session::domain::{IndexedPiece, Move, PackedMove, Square};
use chess_session::models::{EngineBridge, EventSender};

/// Bridge calls, in the order the session made them
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    InitBoard(bool),
    LoadFen(String),
    LoadFenMoves(String, Vec<PackedMove>),
    MakeMove(PackedMove),
    MakeEngineMove,
    StopSearch,
    Undo,
    Redo,
}

/// State the test scripts and the session reads back
#[derive(Default)]
pub struct Script {
    pub events: Option<EventSender>,
    pub calls: Vec<Call>,
    pub player_is_white: bool,
    pub players_turn: bool,
    pub busy: bool,
    pub pieces: Vec<IndexedPiece>,
    pub history: Vec<Move>,
    pub index: Option<usize>,
    pub offered: Vec<Move>,
    pub start_fen: String,
    pub accept_fen: bool,
}

/// An `EngineBridge` whose answers are set by the test
#[derive(Clone, Default)]
pub struct ScriptedBridge {
    pub script: Arc<Mutex<Script>>,
}

impl ScriptedBridge {
    pub fn new() -> Self {
        let bridge = Self::default();
        {
            let mut script = bridge.script.lock();
            script.player_is_white = true;
            script.players_turn = true;
            script.start_fen = "startpos".to_string();
            script.accept_fen = true;
        }
        bridge
    }

    pub fn calls(&self) -> Vec<Call> {
        self.script.lock().calls.clone()
    }

    /// The callback surface the session installed last
    pub fn sender(&self) -> EventSender {
        self.script
            .lock()
            .events
            .clone()
            .expect("session never called init_board")
    }

    pub fn emit_board_changed(&self, code: i32) {
        self.sender().board_changed(code);
    }

    pub fn emit_search_finished(&self, success: bool) {
        self.sender().search_finished(success);
    }

    /// Script the position after `history` with `index` applied
    pub fn set_history(&self, history: Vec<Move>, index: Option<usize>, players_turn: bool) {
        let mut script = self.script.lock();
        script.history = history;
        script.index = index;
        script.players_turn = players_turn;
    }
}

impl EngineBridge for ScriptedBridge {
    fn init_board(&mut self, events: EventSender, player_is_white: bool) {
        let mut script = self.script.lock();
        script.events = Some(events);
        script.player_is_white = player_is_white;
        script.players_turn = player_is_white;
        script.calls.push(Call::InitBoard(player_is_white));
    }

    fn load_fen(&mut self, _player_is_white: bool, fen: &str) -> bool {
        let mut script = self.script.lock();
        script.calls.push(Call::LoadFen(fen.to_string()));
        script.accept_fen
    }

    fn load_fen_moves(&mut self, _player_is_white: bool, fen: &str, moves: &[PackedMove]) {
        self.script
            .lock()
            .calls
            .push(Call::LoadFenMoves(fen.to_string(), moves.to_vec()));
    }

    fn is_engine_busy(&self) -> bool {
        self.script.lock().busy
    }

    fn is_player_white(&self) -> bool {
        self.script.lock().player_is_white
    }

    fn is_players_turn(&self) -> bool {
        self.script.lock().players_turn
    }

    fn pieces(&self) -> Vec<IndexedPiece> {
        self.script.lock().pieces.clone()
    }

    fn possible_moves(&self, square: Square) -> Vec<Move> {
        self.script
            .lock()
            .offered
            .iter()
            .filter(|m| m.from() == square)
            .copied()
            .collect()
    }

    fn make_move(&mut self, packed: PackedMove) {
        self.script.lock().calls.push(Call::MakeMove(packed));
    }

    fn make_engine_move(&mut self) {
        self.script.lock().calls.push(Call::MakeEngineMove);
    }

    fn stop_search(&mut self) {
        let mut script = self.script.lock();
        script.busy = false;
        script.calls.push(Call::StopSearch);
    }

    fn undo_moves(&mut self) {
        self.script.lock().calls.push(Call::Undo);
    }

    fn redo_moves(&mut self) {
        self.script.lock().calls.push(Call::Redo);
    }

    fn current_fen(&self) -> String {
        self.script.lock().start_fen.clone()
    }

    fn start_fen(&self) -> String {
        self.script.lock().start_fen.clone()
    }

    fn moves_history(&self) -> Vec<Move> {
        self.script.lock().history.clone()
    }

    fn current_move_index(&self) -> Option<usize> {
        self.script.lock().index
    }
}

pub fn sq(name: &str) -> Square {
    Square::parse(name).expect("valid square name")
}
