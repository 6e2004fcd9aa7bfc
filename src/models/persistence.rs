//! Saving and restoring the game in progress.
//!
//! The save is a small text blob:
//!
//! ```text
//! #chess-session v1
//! <start FEN>
//! <1 if the player is white, else 0>
//! <packed move>
//! <packed move>
//! ...
//! ```
//!
//! Files without the version line (the older layout) are still read.
//! Saving is asynchronous and best-effort: one writer thread takes the
//! newest pending snapshot and drops older ones, and failures only get
//! logged.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::domain::{Move, PackedMove};
use crate::error::SaveError;

const HEADER_PREFIX: &str = "#chess-session v";
const FORMAT_VERSION: &str = "1";

/// A snapshot of a game, enough for the engine to replay it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SavedGame {
    pub start_fen: String,
    pub player_is_white: bool,
    pub moves: Vec<Move>,
}

impl SavedGame {
    pub fn packed_moves(&self) -> Vec<PackedMove> {
        self.moves.iter().map(Move::packed).collect()
    }

    pub fn to_text(&self) -> String {
        let mut text = format!(
            "{}{}\n{}\n{}\n",
            HEADER_PREFIX,
            FORMAT_VERSION,
            self.start_fen.trim(),
            if self.player_is_white { 1 } else { 0 }
        );
        for m in &self.moves {
            text.push_str(&m.packed().to_string());
            text.push('\n');
        }
        text
    }

    /// Parse a save blob. `Ok(None)` means there is no game worth restoring
    /// (blank FEN or no moves).
    pub fn parse(text: &str) -> Result<Option<SavedGame>, SaveError> {
        let mut lines = text.lines().map(str::trim).peekable();

        if let Some(version) = lines.peek().and_then(|l| l.strip_prefix(HEADER_PREFIX)) {
            if version != FORMAT_VERSION {
                return Err(SaveError::UnsupportedVersion(version.to_string()));
            }
            lines.next();
        }

        let start_fen = match lines.next() {
            Some(fen) if !fen.is_empty() => fen.to_string(),
            _ => return Ok(None),
        };
        let player_is_white = match lines.next() {
            Some("1") => true,
            Some("0") => false,
            Some(other) => {
                return Err(SaveError::Corrupted(format!("bad side line {:?}", other)));
            }
            None => return Ok(None),
        };
        let moves = lines
            .filter(|l| !l.is_empty())
            .map(Move::parse_packed)
            .collect::<Result<Vec<_>, _>>()?;

        if moves.is_empty() {
            return Ok(None);
        }
        Ok(Some(SavedGame {
            start_fen,
            player_is_white,
            moves,
        }))
    }
}

/// A flat text store holding at most one save
pub trait SaveStore: Send + Sync {
    fn read(&self) -> Result<Option<String>, SaveError>;
    fn write(&self, contents: &str) -> Result<(), SaveError>;
    fn clear(&self) -> Result<(), SaveError>;
}

/// Save kept in a single file, replaced atomically on each write
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SaveStore for FileStore {
    fn read(&self) -> Result<Option<String>, SaveError> {
        if !self.path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(&self.path)?))
    }

    fn write(&self, contents: &str) -> Result<(), SaveError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), SaveError> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

/// In-memory store, also handy for tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    contents: Mutex<Option<String>>,
    writes: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(contents: impl Into<String>) -> Self {
        Self {
            contents: Mutex::new(Some(contents.into())),
            writes: Mutex::new(0),
        }
    }

    pub fn contents(&self) -> Option<String> {
        self.contents.lock().clone()
    }

    /// Number of successful writes so far
    pub fn write_count(&self) -> usize {
        *self.writes.lock()
    }
}

impl SaveStore for MemoryStore {
    fn read(&self) -> Result<Option<String>, SaveError> {
        Ok(self.contents.lock().clone())
    }

    fn write(&self, contents: &str) -> Result<(), SaveError> {
        *self.contents.lock() = Some(contents.to_string());
        *self.writes.lock() += 1;
        Ok(())
    }

    fn clear(&self) -> Result<(), SaveError> {
        *self.contents.lock() = None;
        Ok(())
    }
}

enum SaveJob {
    Write(SavedGame),
    Clear,
    Flush(Sender<()>),
}

/// Owns the store and the background writer thread
pub struct SaveManager {
    store: Arc<dyn SaveStore>,
    jobs: Option<Sender<SaveJob>>,
    writer: Option<JoinHandle<()>>,
}

impl SaveManager {
    pub fn new(store: Arc<dyn SaveStore>) -> Self {
        let (jobs, rx) = mpsc::channel::<SaveJob>();
        let writer_store = Arc::clone(&store);
        let writer = thread::Builder::new()
            .name("save-writer".to_string())
            .spawn(move || run_writer(writer_store, rx));

        let (jobs, writer) = match writer {
            Ok(handle) => (Some(jobs), Some(handle)),
            Err(e) => {
                // saves fall back to the caller's thread
                error!("[SAVE] Failed to start writer thread: {}", e);
                (None, None)
            }
        };
        Self {
            store,
            jobs,
            writer,
        }
    }

    /// Save in the background. A game without moves is never saved.
    pub fn save(&self, game: SavedGame) {
        if game.moves.is_empty() {
            debug!("[SAVE] Nothing played yet, skipping save");
            return;
        }
        match &self.jobs {
            Some(jobs) => {
                if let Err(mpsc::SendError(SaveJob::Write(game))) = jobs.send(SaveJob::Write(game)) {
                    write_snapshot(self.store.as_ref(), &game);
                }
            }
            None => write_snapshot(self.store.as_ref(), &game),
        }
    }

    /// Save on the calling thread. Returns `Ok(false)` when skipped.
    pub fn save_now(&self, game: &SavedGame) -> Result<bool, SaveError> {
        if game.moves.is_empty() {
            return Ok(false);
        }
        self.store.write(&game.to_text())?;
        Ok(true)
    }

    /// Read the saved game. Read or decode failures are logged and the
    /// corrupted save discarded; they never reach the caller.
    pub fn load(&self) -> Option<SavedGame> {
        let text = match self.store.read() {
            Ok(Some(text)) => text,
            Ok(None) => return None,
            Err(e) => {
                warn!("[SAVE] Failed to read saved game: {}", e);
                return None;
            }
        };
        match SavedGame::parse(&text) {
            Ok(Some(game)) => {
                info!("[SAVE] Found saved game with {} moves", game.moves.len());
                Some(game)
            }
            Ok(None) => None,
            Err(SaveError::UnsupportedVersion(version)) => {
                // left in place for the build that wrote it
                warn!("[SAVE] Ignoring saved game in format v{}", version);
                None
            }
            Err(e) => {
                warn!("[SAVE] Discarding unreadable saved game: {}", e);
                self.clear();
                None
            }
        }
    }

    /// Remove the save in the background, after any write queued before it
    pub fn clear(&self) {
        match &self.jobs {
            Some(jobs) => {
                if jobs.send(SaveJob::Clear).is_err() {
                    clear_store(self.store.as_ref());
                }
            }
            None => clear_store(self.store.as_ref()),
        }
    }

    /// Block until every save queued so far is written
    pub fn flush(&self) {
        let Some(jobs) = &self.jobs else {
            return;
        };
        let (ack_tx, ack_rx) = mpsc::channel();
        if jobs.send(SaveJob::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }
}

impl Drop for SaveManager {
    fn drop(&mut self) {
        // closing the channel lets the writer finish the last snapshot
        self.jobs = None;
        if let Some(writer) = self.writer.take() {
            let _ = writer.join();
        }
    }
}

fn run_writer(store: Arc<dyn SaveStore>, rx: Receiver<SaveJob>) {
    while let Ok(first) = rx.recv() {
        let mut latest = None;
        let mut cleared = false;
        let mut acks = Vec::new();
        // a clear wipes out every write queued before it
        let mut absorb = |job: SaveJob| match job {
            SaveJob::Write(game) => latest = Some(game),
            SaveJob::Clear => {
                latest = None;
                cleared = true;
            }
            SaveJob::Flush(ack) => acks.push(ack),
        };
        absorb(first);
        // superseded snapshots are dropped
        while let Ok(job) = rx.try_recv() {
            absorb(job);
        }

        if cleared {
            clear_store(store.as_ref());
        }
        if let Some(game) = latest {
            write_snapshot(store.as_ref(), &game);
        }
        for ack in acks {
            let _ = ack.send(());
        }
    }
}

fn clear_store(store: &dyn SaveStore) {
    match store.clear() {
        Ok(()) => debug!("[SAVE] Cleared saved game"),
        Err(e) => warn!("[SAVE] Failed to clear saved game: {}", e),
    }
}

fn write_snapshot(store: &dyn SaveStore, game: &SavedGame) {
    match store.write(&game.to_text()) {
        Ok(()) => debug!("[SAVE] Saved game with {} moves", game.moves.len()),
        Err(e) => error!("[SAVE] Failed to save game: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PieceType, Square};

    fn sq(name: &str) -> Square {
        Square::parse(name).unwrap()
    }

    fn two_moves() -> Vec<Move> {
        vec![
            Move::double_pawn_push(sq("e2"), sq("e4")).unwrap(),
            Move::quiet(sq("g8"), sq("f6"), PieceType::Knight).unwrap(),
        ]
    }

    fn game() -> SavedGame {
        SavedGame {
            start_fen: "startpos".to_string(),
            player_is_white: true,
            moves: two_moves(),
        }
    }

    #[test]
    fn test_save_then_load_is_identical() {
        let store = Arc::new(MemoryStore::new());
        let manager = SaveManager::new(store.clone());
        assert!(manager.save_now(&game()).unwrap());
        assert_eq!(manager.load(), Some(game()));
    }

    #[test]
    fn test_async_save_is_written_after_flush() {
        let store = Arc::new(MemoryStore::new());
        let manager = SaveManager::new(store.clone());
        manager.save(game());
        manager.flush();
        assert_eq!(manager.load(), Some(game()));
    }

    #[test]
    fn test_empty_game_is_never_saved() {
        let store = Arc::new(MemoryStore::with_contents("previous"));
        let manager = SaveManager::new(store.clone());
        let empty = SavedGame {
            moves: vec![],
            ..game()
        };
        manager.save(empty.clone());
        manager.flush();
        assert!(!manager.save_now(&empty).unwrap());
        assert_eq!(store.contents().as_deref(), Some("previous"));
        assert_eq!(store.write_count(), 0);
    }

    #[test]
    fn test_last_write_wins() {
        let store = Arc::new(MemoryStore::new());
        {
            let manager = SaveManager::new(store.clone());
            let mut g = game();
            for _ in 0..20 {
                manager.save(g.clone());
                g.moves.push(Move::quiet(sq("f6"), sq("g8"), PieceType::Knight).unwrap());
            }
            g.moves.pop();
            manager.save(g);
        }
        let text = store.contents().unwrap();
        let saved = SavedGame::parse(&text).unwrap().unwrap();
        assert_eq!(saved.moves.len(), 21);
        assert!(store.write_count() <= 21);
    }

    #[test]
    fn test_legacy_file_without_version_line() {
        let m = two_moves();
        let text = format!("startpos\n0\n{}\n{}\n", m[0].packed(), m[1].packed());
        let saved = SavedGame::parse(&text).unwrap().unwrap();
        assert!(!saved.player_is_white);
        assert_eq!(saved.moves, m);
    }

    #[test]
    fn test_blank_fen_or_no_moves_is_no_game() {
        assert_eq!(SavedGame::parse("").unwrap(), None);
        assert_eq!(SavedGame::parse("#chess-session v1\n\n1\n").unwrap(), None);
        assert_eq!(SavedGame::parse("startpos\n1\n").unwrap(), None);
        assert_eq!(SavedGame::parse("startpos\n1\n\n\n").unwrap(), None);
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        assert!(matches!(
            SavedGame::parse("#chess-session v9\nstartpos\n1\n123\n"),
            Err(SaveError::UnsupportedVersion(v)) if v == "9"
        ));
    }

    #[test]
    fn test_newer_save_is_left_alone() {
        let text = "#chess-session v9\nstartpos\n1\n123\n";
        let store = Arc::new(MemoryStore::with_contents(text));
        let manager = SaveManager::new(store.clone());
        assert_eq!(manager.load(), None);
        assert_eq!(store.contents().as_deref(), Some(text));
    }

    #[test]
    fn test_corrupted_save_is_discarded() {
        let store = Arc::new(MemoryStore::with_contents("startpos\n1\nnot-a-move\n"));
        let manager = SaveManager::new(store.clone());
        assert_eq!(manager.load(), None);
        manager.flush();
        assert_eq!(store.contents(), None, "corrupted save should be cleared");
    }

    #[test]
    fn test_clear_keeps_queue_order() {
        let store = Arc::new(MemoryStore::with_contents("previous"));
        let manager = SaveManager::new(store.clone());
        manager.save(game());
        manager.clear();
        manager.flush();
        assert_eq!(store.contents(), None);

        manager.clear();
        manager.save(game());
        manager.flush();
        assert_eq!(manager.load(), Some(game()));
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = std::env::temp_dir().join(format!("chess-session-save-{}", std::process::id()));
        let path = dir.join("nested").join("game.txt");
        let store = FileStore::new(&path);
        assert_eq!(store.read().unwrap(), None);

        let manager = SaveManager::new(Arc::new(store.clone()));
        manager.save(game());
        manager.flush();
        assert!(path.exists());
        assert_eq!(manager.load(), Some(game()));

        manager.clear();
        manager.flush();
        assert!(!path.exists());
        let _ = fs::remove_dir_all(&dir);
    }
}
