//! Client-side chess game session: move codec, session state machine,
//! save/restore and PGN export around a pluggable engine bridge.

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod models;

pub use config::SessionConfig;
pub use error::{CodecError, EngineError, SaveError, SessionError, SessionResult};
