//! PGN export of a game from its start position and move list.
//!
//! Pure text generation: the engine is never consulted. Move text uses the
//! codec's display notation, so check markers are not emitted.

use chrono::NaiveDate;

use crate::domain::chess::GameState;
use crate::domain::moves::Move;

/// Standard start position
pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Keyword accepted in place of the start position FEN
pub const STARTPOS: &str = "startpos";

/// Resolve the `startpos` keyword to a full FEN
pub fn normalize_fen(fen: &str) -> &str {
    let fen = fen.trim();
    if fen.eq_ignore_ascii_case(STARTPOS) {
        START_FEN
    } else {
        fen
    }
}

/// Header values that are not derived from the game itself
#[derive(Clone, Debug)]
pub struct PgnExporter {
    pub event: String,
    pub site: String,
    pub player_name: String,
    pub engine_name: String,
}

impl Default for PgnExporter {
    fn default() -> Self {
        Self {
            event: "Casual game".to_string(),
            site: "?".to_string(),
            player_name: "Player".to_string(),
            engine_name: "Engine".to_string(),
        }
    }
}

impl PgnExporter {
    /// Render with today's date
    pub fn export(
        &self,
        player_is_white: bool,
        start_fen: &str,
        moves: &[Move],
        final_state: GameState,
    ) -> String {
        let today = chrono::Local::now().date_naive();
        self.export_on(today, player_is_white, start_fen, moves, final_state)
    }

    /// Render with an explicit date
    pub fn export_on(
        &self,
        date: NaiveDate,
        player_is_white: bool,
        start_fen: &str,
        moves: &[Move],
        final_state: GameState,
    ) -> String {
        let start_fen = normalize_fen(start_fen);
        let (white, black) = if player_is_white {
            (&self.player_name, &self.engine_name)
        } else {
            (&self.engine_name, &self.player_name)
        };
        let result = final_state.result_token();

        let mut headers: Vec<(&str, String)> = vec![
            ("Event", self.event.clone()),
            ("Site", self.site.clone()),
            ("Date", date.format("%Y.%m.%d").to_string()),
            ("White", white.clone()),
            ("Black", black.clone()),
        ];
        if start_fen != START_FEN {
            headers.push(("SetUp", "1".to_string()));
        }
        headers.push(("FEN", start_fen.to_string()));
        headers.push(("PlyCount", moves.len().to_string()));
        headers.push(("Result", result.to_string()));

        let mut out = String::new();
        for (key, value) in headers {
            out.push_str(&format!("[{} \"{}\"]\n", key, escape_tag_value(&value)));
        }
        out.push('\n');
        out.push_str(&move_text(start_fen, moves));
        out.push_str(result);
        out.push('\n');
        out
    }
}

/// `"1. e4 e5 2. Nf3 "`, numbered from the FEN's side to move and move number
fn move_text(start_fen: &str, moves: &[Move]) -> String {
    let mut fields = start_fen.split_whitespace().skip(1);
    let mut black_to_move = fields.next() == Some("b");
    let mut number: u32 = fields
        .nth(3)
        .and_then(|n| n.parse().ok())
        .filter(|n| *n > 0)
        .unwrap_or(1);

    let mut text = String::new();
    for (ply, m) in moves.iter().enumerate() {
        if !black_to_move {
            text.push_str(&format!("{}. ", number));
        } else if ply == 0 {
            text.push_str(&format!("{}... ", number));
        }
        text.push_str(&m.to_algebraic_text());
        text.push(' ');
        if black_to_move {
            number += 1;
        }
        black_to_move = !black_to_move;
    }
    text
}

fn escape_tag_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
