//! Application setup and the terminal front end.
//!
//! Commands, one per line:
//! - a square name (`e2`) selects a piece or plays to a highlighted square
//! - `q`, `r`, `b`, `n` pick the piece when a promotion is pending
//! - `undo`, `redo`
//! - `new` (same side), `new white`, `new black`
//! - `fen <FEN>` starts from a position (`fen startpos` for the initial one)
//! - `pgn` prints the game so far
//! - `quit`

use std::io::{self, BufRead, Write};
use std::time::Duration;

use anyhow::Result;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::config::SessionConfig;
use crate::domain::{GameState, Move, PieceType, Square, TileState};
use crate::models::{GameSession, LocalEngine, Phase, SquareAction};

const DEFAULT_LOG_FILTER: &str = "chess_session=info";

/// How long one wait for engine events lasts before re-checking
const EVENT_POLL: Duration = Duration::from_millis(50);

/// Log to stderr, filtered by `RUST_LOG`
pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Square(Square),
    Promote(PieceType),
    Undo,
    Redo,
    New(Option<bool>),
    Fen(String),
    Pgn,
    Help,
    Quit,
}

impl Command {
    fn parse(line: &str) -> Option<Command> {
        let line = line.trim();
        let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();
        match word.to_ascii_lowercase().as_str() {
            "undo" | "u" => Some(Command::Undo),
            "redo" => Some(Command::Redo),
            "new" => match rest {
                "" => Some(Command::New(None)),
                "white" | "w" => Some(Command::New(Some(true))),
                "black" | "b" => Some(Command::New(Some(false))),
                _ => None,
            },
            "fen" if !rest.is_empty() => Some(Command::Fen(rest.to_string())),
            "pgn" => Some(Command::Pgn),
            "help" | "?" => Some(Command::Help),
            "quit" | "exit" => Some(Command::Quit),
            "q" => Some(Command::Promote(PieceType::Queen)),
            "r" => Some(Command::Promote(PieceType::Rook)),
            "b" => Some(Command::Promote(PieceType::Bishop)),
            "n" => Some(Command::Promote(PieceType::Knight)),
            other => Square::parse(other).map(Command::Square),
        }
    }
}

/// Apply engine events until the engine is idle again
fn settle(session: &mut GameSession) {
    session.process_pending_events();
    while session.is_engine_busy() {
        session.wait_for_event(EVENT_POLL);
    }
    session.process_pending_events();
}

/// Run the interactive game on stdin/stdout
pub fn run(config: SessionConfig) -> Result<()> {
    let engine = LocalEngine::from_config(&config);
    let mut session = GameSession::with_file_store(config, Box::new(engine));
    session.initialize();
    settle(&mut session);

    let mut out = io::stdout().lock();
    writeln!(out, "Type `help` for commands.")?;
    render(&session, &mut out)?;

    let mut pending_promotion: Vec<Move> = Vec::new();
    for line in io::stdin().lock().lines() {
        let line = line?;
        let Some(command) = Command::parse(&line) else {
            if !line.trim().is_empty() {
                writeln!(out, "Unknown command: {}", line.trim())?;
            }
            continue;
        };
        debug!("[APP] {:?}", command);

        match command {
            Command::Quit => break,
            Command::Help => {
                writeln!(
                    out,
                    "e2 | q r b n | undo | redo | new [white|black] | fen <FEN> | pgn | quit"
                )?;
                continue;
            }
            Command::Pgn => {
                write!(out, "{}", session.export_pgn())?;
                continue;
            }
            Command::Square(square) => match session.click_square(square) {
                Ok(SquareAction::ChoosePromotion(moves)) => {
                    writeln!(out, "Promote to? (q, r, b, n)")?;
                    pending_promotion = moves;
                    continue;
                }
                Ok(_) => pending_promotion.clear(),
                Err(e) => writeln!(out, "{}", e)?,
            },
            Command::Promote(piece) => {
                let choice = pending_promotion
                    .iter()
                    .find(|m| m.promoted_piece_type() == piece)
                    .copied();
                pending_promotion.clear();
                match choice {
                    Some(m) => {
                        if let Err(e) = session.submit_move(m.packed()) {
                            writeln!(out, "{}", e)?;
                        }
                    }
                    None => writeln!(out, "No promotion pending")?,
                }
            }
            Command::Undo => session.undo(),
            Command::Redo => session.redo(),
            Command::New(side) => {
                let player_is_white = side.unwrap_or(session.player_is_white());
                session.reset_board(player_is_white);
            }
            Command::Fen(fen) => {
                if let Err(e) = session.import_fen(&fen) {
                    writeln!(out, "{}", e)?;
                }
            }
        }

        settle(&mut session);
        render(&session, &mut out)?;
    }

    session.flush_saves();
    Ok(())
}

/// Draw the board from the player's side, then the status lines
fn render(session: &GameSession, out: &mut impl Write) -> io::Result<()> {
    let mut grid = [['.'; 8]; 8];
    for piece in session.board_pieces() {
        let letter = piece.piece_type.letter().unwrap_or('P');
        grid[usize::from(piece.square.rank())][usize::from(piece.square.file())] =
            if piece.is_white {
                letter
            } else {
                letter.to_ascii_lowercase()
            };
    }

    let white_view = session.player_is_white();
    let ranks: Vec<u8> = if white_view {
        (0..8).rev().collect()
    } else {
        (0..8).collect()
    };
    let files: Vec<u8> = if white_view {
        (0..8).collect()
    } else {
        (0..8).rev().collect()
    };

    writeln!(out)?;
    for &rank in &ranks {
        write!(out, "{} ", rank + 1)?;
        for &file in &files {
            let Some(square) = Square::from_coords(file, rank) else {
                continue;
            };
            let marker = match session.tiles().get(square).map(|t| &t.state) {
                Some(TileState::Selected) => '[',
                Some(TileState::PossibleMove(_)) => '*',
                Some(TileState::Moved) => '\'',
                _ => ' ',
            };
            write!(out, "{}{}", marker, grid[usize::from(rank)][usize::from(file)])?;
        }
        writeln!(out)?;
    }
    write!(out, "  ")?;
    for &file in &files {
        write!(out, " {}", char::from(b'a' + file))?;
    }
    writeln!(out)?;

    let captured = session.captured_pieces();
    let lead = captured.material_advantage();
    if lead != 0 {
        let side = if lead > 0 { "White" } else { "Black" };
        writeln!(out, "{} is up {} point(s)", side, lead.abs())?;
    }

    let status = match (session.phase(), session.game_state()) {
        (Phase::Finished, GameState::Draw) => "Draw".to_string(),
        (Phase::Finished, state) => format!("Game over {}", state.result_token()),
        (Phase::EngineThinking, _) => "Engine to move".to_string(),
        (Phase::PlayerToMove, GameState::WhiteInCheck | GameState::BlackInCheck) => {
            "Your move (check)".to_string()
        }
        (Phase::PlayerToMove, _) => "Your move".to_string(),
        (Phase::Idle, _) => "Not started".to_string(),
    };
    let last = session
        .current_move_index()
        .and_then(|i| session.moves_history().get(i))
        .map(|m| format!(", last move {}", m))
        .unwrap_or_default();
    writeln!(out, "{}{}", status, last)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("e2"), Square::parse("e2").map(Command::Square));
        assert_eq!(Command::parse("  undo "), Some(Command::Undo));
        assert_eq!(Command::parse("new black"), Some(Command::New(Some(false))));
        assert_eq!(Command::parse("new"), Some(Command::New(None)));
        assert_eq!(Command::parse("q"), Some(Command::Promote(PieceType::Queen)));
        assert_eq!(
            Command::parse("fen startpos"),
            Some(Command::Fen("startpos".to_string()))
        );
        assert_eq!(Command::parse("fen"), None);
        assert_eq!(Command::parse("z9"), None);
    }
}
