//! Conversation state
//!
//! The message store keeps every message of a session, the resolver turns
//! that set into the single path the user sees, and the controller ties both
//! to a transport and the stream ingestor.

pub mod controller;
pub mod message;
pub mod resolver;
pub mod session;
pub mod store;

pub use controller::{ChatController, PathView};
pub use message::{Message, MessageStatus, MessageType};
pub use resolver::{
    resolve_active_path, ActivePath, AlternativeGroup, Direction, GroupKey, Navigation,
    PathEntry, RevisionGraph,
};
pub use session::{ModelSelection, Session};
pub use store::MessageStore;
