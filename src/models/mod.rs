//! Stateful layer: the session controller, its engine bridge and persistence.

pub mod bridge;
pub mod engine;
pub mod persistence;
pub mod search;
pub mod session;

pub use bridge::{BridgeEvent, EngineBridge, EventSender};
pub use engine::LocalEngine;
pub use persistence::{FileStore, MemoryStore, SaveManager, SaveStore, SavedGame};
pub use search::{RandomSearch, SearchBackend, SearchRequest, UciSearch};
pub use session::{GameSession, Phase, SquareAction};
