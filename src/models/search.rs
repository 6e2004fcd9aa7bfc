//! Move search backends used by the local engine.
//!
//! A backend answers one question: given a position, which move? Searches
//! run on the engine's search thread and must return promptly once the stop
//! flag is raised.
//!
//! `UciSearch` drives an external UCI engine:
//! - Engine I/O runs on OS threads (reader/writer)
//! - The search thread polls the event channel with a short timeout so it
//!   notices the stop flag between engine lines

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use shakmaty::{Chess, Position};
use tracing::{debug, info, warn};

use crate::domain::Move;
use crate::domain::uci::{UciCommand, UciInfo, UciOutputKind};
use crate::error::EngineError;

/// How often a waiting search re-checks its stop flag
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Time allowed for `uciok` and `readyok`
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Extra time an engine gets past its move time before we send `stop`
const OVERRUN_GRACE: Duration = Duration::from_millis(500);

/// How long an engine may take to answer `stop` with a `bestmove`
const STOP_GRACE: Duration = Duration::from_secs(2);

/// Everything a backend needs to pick a move
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// The position to search
    pub position: Chess,
    /// FEN of the game's start position
    pub start_fen: String,
    /// Moves played since the start position, in UCI notation
    pub moves: Vec<String>,
    pub move_time: Duration,
}

/// A source of engine moves
pub trait SearchBackend: Send {
    /// Pick a move in UCI notation. `Ok(None)` means no move: the search was
    /// stopped or the position has none.
    fn best_move(&mut self, request: &SearchRequest, stop: &AtomicBool) -> Result<Option<String>>;

    /// Called when a new game starts
    fn new_game(&mut self) {}
}

/// Plays a uniformly random legal move
pub struct RandomSearch {
    rng: StdRng,
}

impl RandomSearch {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Deterministic move choice for reproducible games
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchBackend for RandomSearch {
    fn best_move(&mut self, request: &SearchRequest, stop: &AtomicBool) -> Result<Option<String>> {
        if stop.load(Ordering::SeqCst) {
            return Ok(None);
        }
        let legal: Vec<Move> = request
            .position
            .legal_moves()
            .iter()
            .filter_map(|m| Move::try_from(m).ok())
            .collect();
        Ok(legal.choose(&mut self.rng).map(Move::to_uci))
    }
}

/// Messages sent from the engine reader thread
#[derive(Debug)]
enum EngineEvent {
    /// A line of output from the engine
    Output(String),
    /// Engine process exited
    Exited,
    /// Error occurred
    Error(String),
}

/// A running engine process and its I/O channels
struct UciProcess {
    child: Child,
    commands: Sender<String>,
    events: Receiver<EngineEvent>,
}

impl UciProcess {
    fn spawn(path: &Path) -> Result<Self> {
        let mut child = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| EngineError::Spawn {
                path: path.display().to_string(),
                source,
            })?;

        let stdin = child.stdin.take().context("engine stdin not captured")?;
        let stdout = child.stdout.take().context("engine stdout not captured")?;

        let (event_tx, event_rx) = mpsc::channel::<EngineEvent>();
        let (cmd_tx, cmd_rx) = mpsc::channel::<String>();

        // Reader thread (OS thread for blocking I/O)
        thread::Builder::new()
            .name("uci-reader".to_string())
            .spawn(move || {
                let reader = BufReader::new(stdout);
                for line in reader.lines() {
                    match line {
                        Ok(text) => {
                            if event_tx.send(EngineEvent::Output(text)).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            let _ = event_tx.send(EngineEvent::Error(e.to_string()));
                            break;
                        }
                    }
                }
                let _ = event_tx.send(EngineEvent::Exited);
            })
            .context("failed to spawn engine reader thread")?;

        // Writer thread
        thread::Builder::new()
            .name("uci-writer".to_string())
            .spawn(move || {
                let mut writer = stdin;
                while let Ok(cmd) = cmd_rx.recv() {
                    if writeln!(writer, "{}", cmd).is_err() || writer.flush().is_err() {
                        break;
                    }
                }
            })
            .context("failed to spawn engine writer thread")?;

        Ok(Self {
            child,
            commands: cmd_tx,
            events: event_rx,
        })
    }

    fn send(&self, cmd: UciCommand) {
        let line = cmd.to_uci_string();
        debug!("[UCI] > {}", line);
        let _ = self.commands.send(line);
    }

    /// Wait for the first output line matching `wanted`
    fn wait_for(
        &self,
        wanted: fn(&UciOutputKind) -> bool,
        timeout: Duration,
        what: &'static str,
    ) -> Result<()> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(remaining) {
                Ok(EngineEvent::Output(line)) => {
                    if wanted(&UciOutputKind::parse(&line)) {
                        return Ok(());
                    }
                    debug!("[UCI] < {}", line);
                }
                Ok(EngineEvent::Error(e)) => warn!("[UCI] Read error: {}", e),
                Ok(EngineEvent::Exited) | Err(RecvTimeoutError::Disconnected) => {
                    return Err(EngineError::Exited.into());
                }
                Err(RecvTimeoutError::Timeout) => return Err(EngineError::Timeout(what).into()),
            }
        }
    }

    fn handshake(&self, options: &BTreeMap<String, String>) -> Result<()> {
        self.send(UciCommand::Uci);
        self.wait_for(|k| matches!(k, UciOutputKind::UciOk), HANDSHAKE_TIMEOUT, "uciok")?;
        for (name, value) in options {
            self.send(UciCommand::SetOption {
                name: name.clone(),
                value: value.clone(),
            });
        }
        self.sync()
    }

    fn sync(&self) -> Result<()> {
        self.send(UciCommand::IsReady);
        self.wait_for(|k| matches!(k, UciOutputKind::ReadyOk), HANDSHAKE_TIMEOUT, "readyok")
    }

    fn search(&self, request: &SearchRequest, stop: &AtomicBool) -> Result<Option<String>> {
        self.send(UciCommand::Position {
            fen: Some(request.start_fen.clone()),
            moves: request.moves.clone(),
        });
        let move_time_ms = u64::try_from(request.move_time.as_millis()).unwrap_or(u64::MAX);
        self.send(UciCommand::GoMoveTime(move_time_ms));

        let overrun = Instant::now() + request.move_time + OVERRUN_GRACE;
        let mut stop_sent_at: Option<Instant> = None;
        let mut last_info: Option<UciInfo> = None;

        loop {
            if stop_sent_at.is_none() && (stop.load(Ordering::SeqCst) || Instant::now() >= overrun) {
                self.send(UciCommand::Stop);
                stop_sent_at = Some(Instant::now());
            }
            if let Some(sent) = stop_sent_at
                && sent.elapsed() >= STOP_GRACE
            {
                return Err(EngineError::Timeout("bestmove").into());
            }

            match self.events.recv_timeout(POLL_INTERVAL) {
                Ok(EngineEvent::Output(line)) => match UciOutputKind::parse(&line) {
                    UciOutputKind::Info(rest) => {
                        let info = UciInfo::parse(&rest);
                        if info.has_analysis() {
                            last_info = Some(info);
                        }
                    }
                    UciOutputKind::BestMove(best) => {
                        if let Some(info) = &last_info {
                            debug!(
                                "[UCI] depth {:?} score {:?} pv {}",
                                info.depth,
                                info.score,
                                info.pv.join(" ")
                            );
                        }
                        if stop.load(Ordering::SeqCst) {
                            return Ok(None);
                        }
                        return Ok(best);
                    }
                    _ => debug!("[UCI] < {}", line),
                },
                Ok(EngineEvent::Error(e)) => warn!("[UCI] Read error: {}", e),
                Ok(EngineEvent::Exited) | Err(RecvTimeoutError::Disconnected) => {
                    return Err(EngineError::Exited.into());
                }
                Err(RecvTimeoutError::Timeout) => {}
            }
        }
    }

    fn shutdown(mut self) {
        self.send(UciCommand::Quit);
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Searches with an external UCI engine, started on first use
pub struct UciSearch {
    path: PathBuf,
    options: BTreeMap<String, String>,
    process: Option<UciProcess>,
}

impl UciSearch {
    pub fn new(path: impl Into<PathBuf>, options: BTreeMap<String, String>) -> Self {
        Self {
            path: path.into(),
            options,
            process: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.process.is_some()
    }

    fn ensure_started(&mut self) -> Result<&UciProcess> {
        if self.process.is_none() {
            let process = UciProcess::spawn(&self.path)?;
            if let Err(e) = process.handshake(&self.options) {
                process.shutdown();
                return Err(e);
            }
            info!("[UCI] Started {:?}", self.path);
            self.process = Some(process);
        }
        self.process.as_ref().context("engine process missing after start")
    }

    fn stop_process(&mut self) {
        if let Some(process) = self.process.take() {
            process.shutdown();
            info!("[UCI] Stopped {:?}", self.path);
        }
    }
}

impl SearchBackend for UciSearch {
    fn best_move(&mut self, request: &SearchRequest, stop: &AtomicBool) -> Result<Option<String>> {
        let result = self.ensure_started()?.search(request, stop);
        if result.is_err() {
            // The process is in an unknown state; start over next time
            self.stop_process();
        }
        match result? {
            Some(uci) => Ok(Some(legal_reply(&request.position, uci)?)),
            None => Ok(None),
        }
    }

    fn new_game(&mut self) {
        if let Some(process) = &self.process {
            process.send(UciCommand::UciNewGame);
            if let Err(e) = process.sync() {
                warn!("[UCI] No answer after ucinewgame: {}", e);
                self.stop_process();
            }
        }
    }
}

/// Accept an engine reply only if it is a legal move in `position`
fn legal_reply(position: &Chess, uci: String) -> Result<String, EngineError> {
    let legal = position
        .legal_moves()
        .iter()
        .filter_map(|m| Move::try_from(m).ok())
        .any(|m| m.to_uci() == uci);
    if legal { Ok(uci) } else { Err(EngineError::UnknownMove(uci)) }
}

impl Drop for UciSearch {
    fn drop(&mut self) {
        self.stop_process();
    }
}
