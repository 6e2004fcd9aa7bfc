use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use chess_session::SessionConfig;
use chess_session::app;

/// Play chess against an engine in the terminal
#[derive(Parser, Debug)]
#[command(name = "chess-session", version, about)]
struct Args {
    /// Config file (JSON); defaults to the user config directory
    #[arg(long)]
    config: Option<PathBuf>,

    /// Play the black pieces
    #[arg(long)]
    black: bool,

    /// UCI engine executable; a random mover is used without one
    #[arg(long)]
    engine: Option<PathBuf>,

    /// Engine thinking time per move in milliseconds
    #[arg(long)]
    move_time: Option<u64>,

    /// Where to save the game in progress
    #[arg(long)]
    save_file: Option<PathBuf>,

    /// Start a fresh game even if a saved one exists
    #[arg(long)]
    no_restore: bool,
}

impl Args {
    fn into_config(self) -> SessionConfig {
        let path = self.config.unwrap_or_else(SessionConfig::default_path);
        let mut config = SessionConfig::load(&path);
        if self.black {
            config.player_is_white = false;
        }
        if let Some(engine) = self.engine {
            config.engine.path = Some(engine);
        }
        if let Some(ms) = self.move_time {
            config.engine.move_time_ms = ms;
        }
        if let Some(save_file) = self.save_file {
            config.save_path = Some(save_file);
        }
        if self.no_restore {
            config.restore_saved_game = false;
        }
        config
    }
}

fn main() -> Result<()> {
    app::init_logging();
    let config = Args::parse().into_config();
    info!("[APP] Saving games to {:?}", config.resolved_save_path());
    app::run(config)
}
