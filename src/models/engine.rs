//! The in-process engine bridge.
//!
//! `LocalEngine` keeps the authoritative game record (built on shakmaty),
//! answers the session's queries and runs engine searches on a background
//! thread. Results go back to the session as `BridgeEvent`s; the session
//! never sees the search thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use shakmaty::fen::Fen;
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Position};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::domain::chess::{role_to_piece_type, to_shakmaty_square};
use crate::domain::pgn::{START_FEN, normalize_fen};
use crate::domain::{GameState, IndexedPiece, Move, MoveFlags, PackedMove, Piece, Square};
use crate::models::bridge::{EngineBridge, EventSender};
use crate::models::search::{RandomSearch, SearchBackend, SearchRequest, UciSearch};

const BOARD_SQUARES: usize = 64;

/// Parse a FEN (or `startpos`) into a position and its canonical text
pub fn parse_position(fen: &str) -> Option<(Chess, String)> {
    let fen: Fen = normalize_fen(fen).parse().ok()?;
    let position: Chess = fen.into_position(CastlingMode::Standard).ok()?;
    let canonical = fen_of(&position);
    Some((position, canonical))
}

fn fen_of(position: &Chess) -> String {
    Fen::from_position(position, EnPassantMode::Legal).to_string()
}

/// Game state code of a position
pub fn game_state_of(position: &Chess) -> GameState {
    let white_to_move = position.turn() == Color::White;
    if position.is_checkmate() {
        if white_to_move {
            GameState::WinnerBlack
        } else {
            GameState::WinnerWhite
        }
    } else if position.is_stalemate()
        || position.is_insufficient_material()
        || position.halfmoves() >= 100
    {
        GameState::Draw
    } else if position.is_check() {
        if white_to_move {
            GameState::WhiteInCheck
        } else {
            GameState::BlackInCheck
        }
    } else {
        GameState::None
    }
}

/// A played move in both representations
#[derive(Clone, Debug)]
struct PlayedMove {
    inner: shakmaty::Move,
    record: Move,
}

/// The authoritative game record
struct GameRecord {
    start: Chess,
    start_fen: String,
    player_is_white: bool,
    /// Every move of the line, including undone ones that can be redone
    line: Vec<PlayedMove>,
    /// Number of moves of `line` currently applied
    applied: usize,
    position: Chess,
    /// Piece identity per square of `position`
    ids: [Option<u32>; BOARD_SQUARES],
    /// Bumped on every position change so stale searches can be discarded
    generation: u64,
}

impl GameRecord {
    fn new(start: Chess, start_fen: String, player_is_white: bool) -> Self {
        let mut record = Self {
            position: start.clone(),
            start,
            start_fen,
            player_is_white,
            line: Vec::new(),
            applied: 0,
            ids: [None; BOARD_SQUARES],
            generation: 0,
        };
        record.assign_initial_ids();
        record
    }

    fn assign_initial_ids(&mut self) {
        self.ids = [None; BOARD_SQUARES];
        let board = self.start.board();
        let occupied = Square::all().filter(|square| {
            to_shakmaty_square(*square).is_some_and(|s| board.piece_at(s).is_some())
        });
        for (id, square) in (1..).zip(occupied) {
            self.ids[usize::from(square.index())] = Some(id);
        }
    }

    fn state(&self) -> GameState {
        game_state_of(&self.position)
    }

    fn is_players_turn(&self) -> bool {
        (self.position.turn() == Color::White) == self.player_is_white
    }

    fn is_at_line_end(&self) -> bool {
        self.applied == self.line.len()
    }

    fn legal_moves(&self) -> Vec<PlayedMove> {
        self.position
            .legal_moves()
            .iter()
            .filter_map(|m| {
                Move::try_from(m).ok().map(|record| PlayedMove {
                    inner: m.clone(),
                    record,
                })
            })
            .collect()
    }

    fn find_packed(&self, packed: PackedMove) -> Option<PlayedMove> {
        self.legal_moves().into_iter().find(|m| m.record.packed() == packed)
    }

    fn find_uci(&self, uci: &str) -> Option<PlayedMove> {
        self.legal_moves().into_iter().find(|m| m.record.to_uci() == uci)
    }

    /// Play `m` on the current position and move the piece ids along
    fn apply(&mut self, m: &PlayedMove) -> bool {
        let Ok(next) = self.position.clone().play(m.inner.clone()) else {
            return false;
        };
        self.move_ids(&m.record);
        self.position = next;
        self.generation += 1;
        true
    }

    fn move_ids(&mut self, m: &Move) {
        let from = usize::from(m.from().index());
        let to = usize::from(m.to().index());
        let id = self.ids[from].take();
        self.ids[to] = id;

        if m.flags().contains(MoveFlags::EN_PASSANT) {
            if let Some(taken) = Square::from_coords(m.to().file(), m.from().rank()) {
                self.ids[usize::from(taken.index())] = None;
            }
        }
        if m.flags().is_castle() {
            let kingside = m.to().file() > m.from().file();
            let (rook_from, rook_to) = if kingside { (7, 5) } else { (0, 3) };
            let rank = m.from().rank();
            if let (Some(rf), Some(rt)) = (
                Square::from_coords(rook_from, rank),
                Square::from_coords(rook_to, rank),
            ) {
                let rook = self.ids[usize::from(rf.index())].take();
                self.ids[usize::from(rt.index())] = rook;
            }
        }
    }

    /// Play a new move, discarding any undone moves after the current one
    fn push(&mut self, m: PlayedMove) -> bool {
        if !self.apply(&m) {
            return false;
        }
        self.line.truncate(self.applied);
        self.line.push(m);
        self.applied += 1;
        true
    }

    fn undo_one(&mut self) -> bool {
        if self.applied == 0 {
            return false;
        }
        self.applied -= 1;
        self.replay();
        true
    }

    fn redo_one(&mut self) -> bool {
        let Some(next) = self.line.get(self.applied).cloned() else {
            return false;
        };
        if !self.apply(&next) {
            return false;
        }
        self.applied += 1;
        true
    }

    /// Rebuild the position from the start up to `applied`
    fn replay(&mut self) {
        self.position = self.start.clone();
        self.assign_initial_ids();
        let moves: Vec<PlayedMove> = self.line[..self.applied].to_vec();
        for m in &moves {
            if !self.apply(m) {
                warn!("[ENGINE] Replay stopped at {}", m.record);
                break;
            }
        }
        self.generation += 1;
    }

    fn pieces(&self) -> Vec<IndexedPiece> {
        let board = self.position.board();
        Square::all()
            .filter_map(|square| {
                let piece = board.piece_at(to_shakmaty_square(square)?)?;
                let id = self.ids[usize::from(square.index())]?;
                Some(IndexedPiece {
                    id,
                    piece: Piece {
                        square,
                        piece_type: role_to_piece_type(piece.role),
                        is_white: piece.color == Color::White,
                    },
                })
            })
            .collect()
    }

    fn search_request(&self, move_time: Duration) -> SearchRequest {
        SearchRequest {
            position: self.position.clone(),
            start_fen: self.start_fen.clone(),
            moves: self.line[..self.applied]
                .iter()
                .map(|m| m.record.to_uci())
                .collect(),
            move_time,
        }
    }
}

/// An engine bridge that runs in this process
pub struct LocalEngine {
    game: Arc<Mutex<GameRecord>>,
    backend: Arc<Mutex<Box<dyn SearchBackend>>>,
    events: Option<EventSender>,
    busy: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    search: Option<JoinHandle<()>>,
    move_time: Duration,
}

impl LocalEngine {
    pub fn new(backend: Box<dyn SearchBackend>, move_time: Duration) -> Self {
        Self {
            game: Arc::new(Mutex::new(GameRecord::new(
                Chess::default(),
                START_FEN.to_string(),
                true,
            ))),
            backend: Arc::new(Mutex::new(backend)),
            events: None,
            busy: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(AtomicBool::new(false)),
            search: None,
            move_time,
        }
    }

    /// UCI engine when one is configured, random mover otherwise
    pub fn from_config(config: &SessionConfig) -> Self {
        let backend: Box<dyn SearchBackend> = match &config.engine.path {
            Some(path) => {
                info!("[ENGINE] Using UCI engine {:?}", path);
                Box::new(UciSearch::new(path.clone(), config.engine.options.clone()))
            }
            None => {
                info!("[ENGINE] No engine configured, playing random moves");
                Box::new(RandomSearch::new())
            }
        };
        Self::new(backend, config.move_time())
    }

    fn notify_board_changed(&self) {
        let code = self.game.lock().state().code();
        if let Some(events) = &self.events {
            events.board_changed(code);
        }
    }

    fn reset_record(&mut self, record: GameRecord) {
        self.stop_search();
        *self.game.lock() = record;
        self.backend.lock().new_game();
    }

    fn reap_finished_search(&mut self) {
        if !self.busy.load(Ordering::SeqCst) {
            if let Some(handle) = self.search.take() {
                let _ = handle.join();
            }
        }
    }
}

impl EngineBridge for LocalEngine {
    fn init_board(&mut self, events: EventSender, player_is_white: bool) {
        self.reset_record(GameRecord::new(
            Chess::default(),
            START_FEN.to_string(),
            player_is_white,
        ));
        self.events = Some(events);
        debug!("[ENGINE] New game, player is white: {}", player_is_white);
        self.notify_board_changed();
    }

    fn load_fen(&mut self, player_is_white: bool, fen: &str) -> bool {
        let Some((position, canonical)) = parse_position(fen) else {
            warn!("[ENGINE] Rejected FEN {:?}", fen);
            return false;
        };
        self.reset_record(GameRecord::new(position, canonical, player_is_white));
        self.notify_board_changed();
        true
    }

    fn load_fen_moves(&mut self, player_is_white: bool, fen: &str, moves: &[PackedMove]) {
        let Some((position, canonical)) = parse_position(fen) else {
            warn!("[ENGINE] Rejected saved FEN {:?}", fen);
            return;
        };
        let mut record = GameRecord::new(position, canonical, player_is_white);
        for (ply, packed) in moves.iter().enumerate() {
            let restored = record.find_packed(*packed).is_some_and(|m| record.push(m));
            if !restored {
                warn!("[ENGINE] Saved move {} at ply {} is not legal, dropping the rest", packed, ply);
                break;
            }
        }
        info!("[ENGINE] Restored {} of {} moves", record.applied, moves.len());
        self.reset_record(record);
        self.notify_board_changed();
    }

    fn is_engine_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    fn is_player_white(&self) -> bool {
        self.game.lock().player_is_white
    }

    fn is_players_turn(&self) -> bool {
        self.game.lock().is_players_turn()
    }

    fn pieces(&self) -> Vec<IndexedPiece> {
        self.game.lock().pieces()
    }

    fn possible_moves(&self, square: Square) -> Vec<Move> {
        self.game
            .lock()
            .legal_moves()
            .into_iter()
            .map(|m| m.record)
            .filter(|m| m.from() == square)
            .collect()
    }

    fn make_move(&mut self, packed: PackedMove) {
        if self.is_engine_busy() {
            warn!("[ENGINE] Move {} ignored while searching", packed);
            return;
        }
        let played = {
            let mut game = self.game.lock();
            if !game.is_players_turn() {
                warn!("[ENGINE] Move {} ignored, not the player's turn", packed);
                return;
            }
            match game.find_packed(packed) {
                Some(m) => game.push(m),
                None => false,
            }
        };
        if played {
            self.notify_board_changed();
        } else {
            warn!("[ENGINE] Illegal move {} ignored", packed);
        }
    }

    fn make_engine_move(&mut self) {
        self.reap_finished_search();
        if self.is_engine_busy() {
            debug!("[ENGINE] Already searching");
            return;
        }
        let Some(events) = self.events.clone() else {
            warn!("[ENGINE] Search requested before init_board");
            return;
        };
        let (request, generation) = {
            let game = self.game.lock();
            if game.is_players_turn() || game.state().is_terminal() || !game.is_at_line_end() {
                debug!("[ENGINE] Search refused in this position");
                return;
            }
            (game.search_request(self.move_time), game.generation)
        };

        self.stop.store(false, Ordering::SeqCst);
        self.busy.store(true, Ordering::SeqCst);

        let game = Arc::clone(&self.game);
        let backend = Arc::clone(&self.backend);
        let busy = Arc::clone(&self.busy);
        let stop = Arc::clone(&self.stop);

        let spawned = thread::Builder::new()
            .name("engine-search".to_string())
            .spawn(move || {
                let found = match backend.lock().best_move(&request, &stop) {
                    Ok(best) => best,
                    Err(e) => {
                        warn!("[ENGINE] Search failed: {:#}. Falling back to a random move", e);
                        RandomSearch::new().best_move(&request, &stop).unwrap_or(None)
                    }
                };
                let cancelled = stop.load(Ordering::SeqCst);

                let (played, code) = {
                    let mut game = game.lock();
                    let played = match found {
                        Some(uci) if !cancelled && game.generation == generation => {
                            match game.find_uci(&uci) {
                                Some(m) => game.push(m),
                                None => {
                                    warn!("[ENGINE] Engine played unknown move {:?}", uci);
                                    false
                                }
                            }
                        }
                        _ => false,
                    };
                    (played, game.state().code())
                };
                busy.store(false, Ordering::SeqCst);

                if cancelled {
                    debug!("[ENGINE] Search cancelled");
                    return;
                }
                if played {
                    events.board_changed(code);
                }
                events.search_finished(played);
            });

        match spawned {
            Ok(handle) => self.search = Some(handle),
            Err(e) => {
                warn!("[ENGINE] Failed to spawn search thread: {}", e);
                self.busy.store(false, Ordering::SeqCst);
            }
        }
    }

    fn stop_search(&mut self) {
        if let Some(handle) = self.search.take() {
            self.stop.store(true, Ordering::SeqCst);
            let _ = handle.join();
            debug!("[ENGINE] Search stopped");
        }
        self.busy.store(false, Ordering::SeqCst);
        self.stop.store(false, Ordering::SeqCst);
    }

    fn undo_moves(&mut self) {
        self.stop_search();
        {
            let mut game = self.game.lock();
            if !game.undo_one() {
                return;
            }
            // Step back over the engine's reply so the player is on move
            if !game.is_players_turn() {
                game.undo_one();
            }
        }
        self.notify_board_changed();
    }

    fn redo_moves(&mut self) {
        self.stop_search();
        {
            let mut game = self.game.lock();
            if !game.redo_one() {
                return;
            }
            if !game.is_players_turn() {
                game.redo_one();
            }
        }
        self.notify_board_changed();
    }

    fn current_fen(&self) -> String {
        fen_of(&self.game.lock().position)
    }

    fn start_fen(&self) -> String {
        self.game.lock().start_fen.clone()
    }

    fn moves_history(&self) -> Vec<Move> {
        self.game.lock().line.iter().map(|m| m.record).collect()
    }

    fn current_move_index(&self) -> Option<usize> {
        self.game.lock().applied.checked_sub(1)
    }
}

impl Drop for LocalEngine {
    fn drop(&mut self) {
        self.stop_search();
    }
}

impl GameRecord {
    #[cfg(test)]
    fn square_id(&self, name: &str) -> Option<u32> {
        Square::parse(name).and_then(|sq| self.ids[usize::from(sq.index())])
    }
}
