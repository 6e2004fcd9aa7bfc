//! Game session model - the controller between the UI and the engine.
//!
//! The session owns the display state (tiles, pieces, history) and keeps it
//! in sync with the engine bridge. All state changes happen on the caller's
//! context: bridge callbacks arrive through a channel and are applied by
//! [`GameSession::process_pending_events`].

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::domain::{
    CapturedPieces, GameState, IndexedPiece, Move, PackedMove, Piece, PgnExporter, Square,
    TileBoard,
};
use crate::error::{SessionError, SessionResult};
use crate::models::bridge::{BridgeEvent, EngineBridge, EventSender};
use crate::models::persistence::{FileStore, SaveManager, SavedGame, SaveStore};

/// How often a reset polls the engine while waiting for a search to stop
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Where the session is in the game
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Not initialized yet
    Idle,
    PlayerToMove,
    /// The engine is on move or searching
    EngineThinking,
    Finished,
}

/// What a board click did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SquareAction {
    /// A piece was selected; its destinations are highlighted
    Selected(Square),
    /// The only move to the clicked square was submitted
    Submitted(Move),
    /// Several moves reach the clicked square; the UI must pick one
    ChoosePromotion(Vec<Move>),
    /// The selection was cleared
    Cleared,
}

/// The game session controller
pub struct GameSession {
    config: SessionConfig,
    bridge: Box<dyn EngineBridge>,
    saves: SaveManager,
    exporter: PgnExporter,
    /// Receiver for the current game's bridge events; replaced on reset
    events: Option<Receiver<BridgeEvent>>,
    initialized: bool,
    player_is_white: bool,
    players_turn: bool,
    engine_busy: bool,
    tiles: TileBoard,
    pieces: Vec<IndexedPiece>,
    game_state: GameState,
    moves_history: Vec<Move>,
    current_move_index: Option<usize>,
}

impl GameSession {
    pub fn new(config: SessionConfig, bridge: Box<dyn EngineBridge>, saves: SaveManager) -> Self {
        let exporter = config.pgn_exporter();
        let player_is_white = config.player_is_white;
        Self {
            config,
            bridge,
            saves,
            exporter,
            events: None,
            initialized: false,
            player_is_white,
            players_turn: false,
            engine_busy: false,
            tiles: TileBoard::new(),
            pieces: Vec::new(),
            game_state: GameState::None,
            moves_history: Vec::new(),
            current_move_index: None,
        }
    }

    /// Session saving to the configured save file
    pub fn with_file_store(config: SessionConfig, bridge: Box<dyn EngineBridge>) -> Self {
        let store: Arc<dyn SaveStore> = Arc::new(FileStore::new(config.resolved_save_path()));
        Self::new(config, bridge, SaveManager::new(store))
    }

    /// Start the first game. Later calls do nothing.
    pub fn initialize(&mut self) {
        if self.initialized {
            debug!("[SESSION] Already initialized");
            return;
        }
        self.reset_board(self.config.player_is_white);
    }

    /// Start a new game, cancelling any search in progress.
    ///
    /// The first reset of a session restores the saved game when there is one.
    pub fn reset_board(&mut self, player_is_white: bool) {
        if self.bridge.is_engine_busy() {
            self.cancel_search();
        }

        // Dropping the old receiver discards any event still in flight
        let (sender, receiver) = EventSender::channel();
        self.events = Some(receiver);
        self.clear_display(player_is_white);

        let first_reset = !self.initialized;
        self.initialized = true;

        if first_reset && self.config.restore_saved_game {
            if let Some(saved) = self.saves.load() {
                self.restore(sender, saved);
                return;
            }
        }
        if !first_reset {
            self.saves.clear();
        }
        info!("[SESSION] New game, player is white: {}", player_is_white);
        self.bridge.init_board(sender, player_is_white);
    }

    fn restore(&mut self, sender: EventSender, saved: SavedGame) {
        info!(
            "[SESSION] Restoring saved game ({} moves, player is white: {})",
            saved.moves.len(),
            saved.player_is_white
        );
        self.player_is_white = saved.player_is_white;
        self.bridge.init_board(sender, saved.player_is_white);
        self.bridge
            .load_fen_moves(saved.player_is_white, &saved.start_fen, &saved.packed_moves());
    }

    fn clear_display(&mut self, player_is_white: bool) {
        self.player_is_white = player_is_white;
        self.players_turn = false;
        self.engine_busy = false;
        self.tiles = TileBoard::new();
        self.pieces.clear();
        self.game_state = GameState::None;
        self.moves_history.clear();
        self.current_move_index = None;
    }

    /// Stop the running search and wait (bounded) until the engine is idle
    fn cancel_search(&mut self) {
        debug!("[SESSION] Cancelling engine search");
        self.bridge.stop_search();
        let deadline = Instant::now() + self.config.stop_timeout();
        while self.bridge.is_engine_busy() {
            if Instant::now() >= deadline {
                warn!("[SESSION] Engine still busy after {:?}", self.config.stop_timeout());
                break;
            }
            thread::sleep(STOP_POLL_INTERVAL);
        }
        self.engine_busy = false;
    }

    /// Apply every bridge event received so far. Returns how many there were.
    pub fn process_pending_events(&mut self) -> usize {
        let events: Vec<BridgeEvent> = match &self.events {
            Some(rx) => rx.try_iter().collect(),
            None => return 0,
        };
        let count = events.len();
        for event in events {
            self.handle_event(event);
        }
        count
    }

    /// Block until one bridge event arrives (or `timeout` passes), then apply
    /// it and everything queued behind it. Returns how many were applied.
    pub fn wait_for_event(&mut self, timeout: Duration) -> usize {
        let first = match &self.events {
            Some(rx) => match rx.recv_timeout(timeout) {
                Ok(event) => event,
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return 0,
            },
            None => return 0,
        };
        self.handle_event(first);
        1 + self.process_pending_events()
    }

    fn handle_event(&mut self, event: BridgeEvent) {
        match event {
            BridgeEvent::BoardChanged(code) => self.on_board_changed(code),
            BridgeEvent::SearchFinished(success) => self.on_search_finished(success),
        }
    }

    /// Pull the new position from the bridge and react to it
    fn on_board_changed(&mut self, state_code: i32) {
        let state = GameState::from_code(state_code);
        self.game_state = state;
        self.player_is_white = self.bridge.is_player_white();
        self.players_turn = self.bridge.is_players_turn();
        self.pieces = self.bridge.pieces();

        let history = self.bridge.moves_history();
        let index = self.bridge.current_move_index();
        // undo and redo move the index without touching the history
        let played_changed = history != self.moves_history || index != self.current_move_index;
        self.moves_history = history;
        self.current_move_index = index;

        let last_move = self.current_move_index.and_then(|i| self.moves_history.get(i));
        self.tiles.show_last_move(last_move);

        debug!(
            "[SESSION] Board changed: state {:?}, ply {:?} of {}",
            state,
            self.current_move_index,
            self.moves_history.len()
        );

        if played_changed && !state.is_terminal() {
            self.save_in_background();
        }
        if state.is_terminal() {
            info!("[SESSION] Game over: {}", state.result_token());
        } else if !self.players_turn && self.is_at_last_move() {
            self.bridge.make_engine_move();
        }
        self.engine_busy = self.bridge.is_engine_busy();
    }

    fn on_search_finished(&mut self, success: bool) {
        if !success {
            debug!("[SESSION] Engine produced no move, asking again");
            self.bridge.make_engine_move();
        }
        self.engine_busy = self.bridge.is_engine_busy();
    }

    fn is_at_last_move(&self) -> bool {
        self.current_move_index == self.moves_history.len().checked_sub(1)
    }

    fn played_moves(&self) -> &[Move] {
        let end = self.current_move_index.map_or(0, |i| i + 1);
        &self.moves_history[..end.min(self.moves_history.len())]
    }

    fn save_in_background(&self) {
        if self.played_moves().is_empty() {
            // back at the start position; an older save would restore moves
            self.saves.clear();
            return;
        }
        self.saves.save(SavedGame {
            start_fen: self.bridge.start_fen(),
            player_is_white: self.player_is_white,
            moves: self.played_moves().to_vec(),
        });
    }

    fn ensure_player_can_move(&self) -> SessionResult<()> {
        if self.game_state.is_terminal() {
            return Err(SessionError::GameFinished);
        }
        if self.engine_busy || self.bridge.is_engine_busy() || !self.bridge.is_players_turn() {
            return Err(SessionError::NotPlayersTurn);
        }
        Ok(())
    }

    /// Highlight the legal moves of the piece on `square`
    pub fn select_square(&mut self, square: Square) -> SessionResult<()> {
        self.ensure_player_can_move()?;
        let moves = self.bridge.possible_moves(square);
        self.tiles.select(square, &moves);
        Ok(())
    }

    /// Submit one of the moves currently offered on the tiles
    pub fn submit_move(&mut self, packed: PackedMove) -> SessionResult<()> {
        self.ensure_player_can_move()?;
        let m = self.tiles.offered(packed).ok_or_else(|| {
            let text = Move::decode(packed)
                .map(|m| m.to_algebraic_text())
                .unwrap_or_else(|_| packed.to_string());
            SessionError::MoveNotOffered(text)
        })?;
        debug!("[SESSION] Player plays {}", m);
        self.tiles.clear_selection();
        self.bridge.make_move(m.packed());
        self.engine_busy = self.bridge.is_engine_busy();
        Ok(())
    }

    /// Select, move or deselect, depending on what the clicked square holds
    pub fn click_square(&mut self, square: Square) -> SessionResult<SquareAction> {
        self.ensure_player_can_move()?;
        let offered = self.tiles.moves_to(square).to_vec();
        match offered.len() {
            0 if self.tiles.selected() == Some(square) => {
                self.tiles.clear_selection();
                Ok(SquareAction::Cleared)
            }
            0 => {
                self.select_square(square)?;
                if self.tiles.selected() == Some(square) {
                    Ok(SquareAction::Selected(square))
                } else {
                    Ok(SquareAction::Cleared)
                }
            }
            1 => {
                let only = offered[0];
                self.submit_move(only.packed())?;
                Ok(SquareAction::Submitted(only))
            }
            _ => Ok(SquareAction::ChoosePromotion(offered)),
        }
    }

    /// Take back to the player's previous move
    pub fn undo(&mut self) {
        self.tiles.clear_selection();
        self.bridge.undo_moves();
        self.engine_busy = self.bridge.is_engine_busy();
    }

    /// Replay an undone move
    pub fn redo(&mut self) {
        self.tiles.clear_selection();
        self.bridge.redo_moves();
        self.engine_busy = self.bridge.is_engine_busy();
    }

    /// Start a game from `fen` (or `startpos`). An invalid FEN leaves the
    /// current game untouched.
    pub fn import_fen(&mut self, fen: &str) -> SessionResult<()> {
        if !self.bridge.load_fen(self.player_is_white, fen) {
            return Err(SessionError::InvalidFen(fen.to_string()));
        }
        info!("[SESSION] Imported position {}", fen);
        self.saves.clear();
        self.tiles.clear_selection();
        self.engine_busy = self.bridge.is_engine_busy();
        Ok(())
    }

    /// The game so far as PGN
    pub fn export_pgn(&self) -> String {
        self.exporter.export(
            self.player_is_white,
            &self.bridge.start_fen(),
            self.played_moves(),
            self.game_state,
        )
    }

    pub fn captured_pieces(&self) -> CapturedPieces {
        CapturedPieces::from_pieces(self.pieces.iter().map(|p| &p.piece))
    }

    pub fn current_fen(&self) -> String {
        self.bridge.current_fen()
    }

    pub fn phase(&self) -> Phase {
        if !self.initialized {
            Phase::Idle
        } else if self.game_state.is_terminal() {
            Phase::Finished
        } else if self.players_turn && !self.engine_busy {
            Phase::PlayerToMove
        } else {
            Phase::EngineThinking
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn tiles(&self) -> &TileBoard {
        &self.tiles
    }

    pub fn pieces(&self) -> &[IndexedPiece] {
        &self.pieces
    }

    /// Pieces currently on the board
    pub fn board_pieces(&self) -> impl Iterator<Item = &Piece> {
        self.pieces
            .iter()
            .map(|p| &p.piece)
            .filter(|p| p.square.is_on_board())
    }

    pub fn game_state(&self) -> GameState {
        self.game_state
    }

    pub fn moves_history(&self) -> &[Move] {
        &self.moves_history
    }

    pub fn current_move_index(&self) -> Option<usize> {
        self.current_move_index
    }

    pub fn is_engine_busy(&self) -> bool {
        self.engine_busy
    }

    pub fn player_is_white(&self) -> bool {
        self.player_is_white
    }

    pub fn is_players_turn(&self) -> bool {
        self.players_turn
    }

    /// Block until queued saves are written
    pub fn flush_saves(&self) {
        self.saves.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TileState;
    use crate::models::engine::LocalEngine;
    use crate::models::persistence::MemoryStore;
    use crate::models::search::RandomSearch;

    fn sq(name: &str) -> Square {
        Square::parse(name).unwrap()
    }

    fn session(player_is_white: bool) -> (GameSession, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let config = SessionConfig {
            player_is_white,
            ..SessionConfig::default()
        };
        let engine = LocalEngine::new(Box::new(RandomSearch::seeded(11)), Duration::from_millis(1));
        let session = GameSession::new(config, Box::new(engine), SaveManager::new(store.clone()));
        (session, store)
    }

    /// Pump events until the engine has answered
    fn settle(session: &mut GameSession) {
        for _ in 0..50 {
            session.wait_for_event(Duration::from_millis(100));
            if !session.is_engine_busy() && session.is_players_turn() {
                return;
            }
        }
    }

    #[test]
    fn test_phase_before_and_after_initialize() {
        let (mut session, _) = session(true);
        assert_eq!(session.phase(), Phase::Idle);
        session.initialize();
        session.process_pending_events();
        assert_eq!(session.phase(), Phase::PlayerToMove);
        assert_eq!(session.pieces().len(), 32);
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let (mut session, _) = session(true);
        session.initialize();
        session.process_pending_events();
        session.click_square(sq("e2")).unwrap();
        session.initialize();
        assert_eq!(session.tiles().selected(), Some(sq("e2")));
    }

    #[test]
    fn test_click_selects_then_moves() {
        let (mut session, store) = session(true);
        session.initialize();
        session.process_pending_events();

        assert_eq!(session.click_square(sq("e2")), Ok(SquareAction::Selected(sq("e2"))));
        let action = session.click_square(sq("e4")).unwrap();
        assert!(matches!(action, SquareAction::Submitted(m) if m.to() == sq("e4")));

        settle(&mut session);
        assert_eq!(session.moves_history().len(), 2);
        assert_eq!(session.phase(), Phase::PlayerToMove);
        session.flush_saves();
        assert!(store.contents().is_some());
    }

    #[test]
    fn test_move_not_offered_is_rejected() {
        let (mut session, _) = session(true);
        session.initialize();
        session.process_pending_events();
        session.select_square(sq("g1")).unwrap();
        let e4 = Move::double_pawn_push(sq("e2"), sq("e4")).unwrap();
        assert!(matches!(
            session.submit_move(e4.packed()),
            Err(SessionError::MoveNotOffered(_))
        ));
    }

    #[test]
    fn test_engine_opens_when_player_is_black() {
        let (mut session, _) = session(false);
        session.initialize();
        settle(&mut session);
        assert_eq!(session.moves_history().len(), 1);
        assert!(session.is_players_turn());
        let reply = session.moves_history()[0];
        assert_eq!(
            session.tiles().get(reply.to()).map(|t| &t.state),
            Some(&TileState::Moved)
        );
    }

    #[test]
    fn test_invalid_fen_keeps_game() {
        let (mut session, _) = session(true);
        session.initialize();
        session.process_pending_events();
        assert_eq!(
            session.import_fen("rubbish"),
            Err(SessionError::InvalidFen("rubbish".to_string()))
        );
        assert_eq!(session.pieces().len(), 32);
    }

    #[test]
    fn test_import_fen_and_export() {
        let (mut session, _) = session(true);
        session.initialize();
        session.process_pending_events();
        session.import_fen("4k3/8/8/8/8/8/4P3/4K3 w - - 0 1").unwrap();
        session.process_pending_events();
        assert_eq!(session.pieces().len(), 3);
        let pgn = session.export_pgn();
        assert!(pgn.contains("[SetUp \"1\"]"));
        assert!(pgn.ends_with("*\n"));
    }

    #[test]
    fn test_restores_saved_game_on_first_reset() {
        let e4 = Move::double_pawn_push(sq("e2"), sq("e4")).unwrap();
        let e5 = Move::double_pawn_push(sq("e7"), sq("e5")).unwrap();
        let saved = SavedGame {
            start_fen: crate::domain::pgn::START_FEN.to_string(),
            player_is_white: true,
            moves: vec![e4, e5],
        };
        let store = Arc::new(MemoryStore::with_contents(saved.to_text()));
        let engine = LocalEngine::new(Box::new(RandomSearch::seeded(5)), Duration::from_millis(1));
        let mut session = GameSession::new(
            SessionConfig::default(),
            Box::new(engine),
            SaveManager::new(store),
        );
        session.initialize();
        session.process_pending_events();
        assert_eq!(session.moves_history(), &[e4, e5]);
        assert_eq!(session.phase(), Phase::PlayerToMove);
    }
}
