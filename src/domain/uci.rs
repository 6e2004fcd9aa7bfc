//! UCI (Universal Chess Interface) text protocol.
//!
//! Command rendering and response parsing only; the process plumbing lives
//! in `models::search`.

/// UCI commands sent to an engine process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UciCommand {
    Uci,
    IsReady,
    UciNewGame,
    SetOption { name: String, value: String },
    /// Set position (FEN or `startpos`, with the moves played since)
    Position { fen: Option<String>, moves: Vec<String> },
    /// Search for a fixed time in milliseconds
    GoMoveTime(u64),
    Stop,
    Quit,
}

impl UciCommand {
    /// Convert command to UCI protocol string
    pub fn to_uci_string(&self) -> String {
        match self {
            UciCommand::Uci => "uci".to_string(),
            UciCommand::IsReady => "isready".to_string(),
            UciCommand::UciNewGame => "ucinewgame".to_string(),
            UciCommand::SetOption { name, value } => {
                format!("setoption name {} value {}", name, value)
            }
            UciCommand::Position { fen, moves } => {
                let mut cmd = String::from("position ");
                match fen {
                    Some(f) => {
                        cmd.push_str("fen ");
                        cmd.push_str(f);
                    }
                    None => cmd.push_str("startpos"),
                }
                if !moves.is_empty() {
                    cmd.push_str(" moves ");
                    cmd.push_str(&moves.join(" "));
                }
                cmd
            }
            UciCommand::GoMoveTime(ms) => format!("go movetime {}", ms),
            UciCommand::Stop => "stop".to_string(),
            UciCommand::Quit => "quit".to_string(),
        }
    }
}

/// Categorized engine output line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UciOutputKind {
    UciOk,
    ReadyOk,
    /// "info ..." - analysis information (rest of the line)
    Info(String),
    /// "bestmove <move> [ponder <move>]"; `None` when the engine has no move
    BestMove(Option<String>),
    Other(String),
}

impl UciOutputKind {
    /// Parse a raw UCI output line into a categorized type
    pub fn parse(line: &str) -> Self {
        let line = line.trim();

        if line == "uciok" {
            UciOutputKind::UciOk
        } else if line == "readyok" {
            UciOutputKind::ReadyOk
        } else if let Some(rest) = line.strip_prefix("info ") {
            UciOutputKind::Info(rest.to_string())
        } else if let Some(rest) = line.strip_prefix("bestmove") {
            let best = rest
                .split_whitespace()
                .next()
                .filter(|m| *m != "(none)" && *m != "0000")
                .map(str::to_string);
            UciOutputKind::BestMove(best)
        } else {
            UciOutputKind::Other(line.to_string())
        }
    }
}

/// Engine evaluation score
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Score {
    /// Centipawns from the side to move
    Centipawns(i32),
    /// Mate in N moves (negative when being mated)
    Mate(i32),
}

/// The parts of an `info` line worth logging
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UciInfo {
    pub depth: Option<u32>,
    pub score: Option<Score>,
    pub nodes: Option<u64>,
    pub pv: Vec<String>,
}

impl UciInfo {
    /// Parse a UCI info string (the part after "info ")
    pub fn parse(info_str: &str) -> Self {
        let mut info = UciInfo::default();
        let mut tokens = info_str.split_whitespace().peekable();

        while let Some(token) = tokens.next() {
            match token {
                "depth" => info.depth = tokens.next().and_then(|t| t.parse().ok()),
                "nodes" => info.nodes = tokens.next().and_then(|t| t.parse().ok()),
                "score" => {
                    let kind = tokens.next();
                    let value = tokens.next().and_then(|t| t.parse::<i32>().ok());
                    info.score = match (kind, value) {
                        (Some("cp"), Some(cp)) => Some(Score::Centipawns(cp)),
                        (Some("mate"), Some(m)) => Some(Score::Mate(m)),
                        _ => info.score,
                    };
                }
                "pv" => {
                    // the PV runs to the next keyword
                    while let Some(mv) = tokens.next_if(|t| !is_info_keyword(t)) {
                        info.pv.push(mv.to_string());
                    }
                }
                _ => {}
            }
        }

        info
    }

    pub fn has_analysis(&self) -> bool {
        self.depth.is_some() && self.score.is_some() && !self.pv.is_empty()
    }
}

fn is_info_keyword(token: &str) -> bool {
    matches!(
        token,
        "depth"
            | "seldepth"
            | "multipv"
            | "score"
            | "nodes"
            | "nps"
            | "time"
            | "hashfull"
            | "currmove"
            | "currmovenumber"
            | "string"
            | "refutation"
            | "currline"
    )
}
