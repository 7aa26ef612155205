//! Scripted conversations: dialog-tree interpretation and keyword-driven
//! objection handling for phone and chat sessions.

pub mod catalog;
pub mod dialog;
pub mod error;
pub mod objection;
pub mod render;
pub mod session;
pub mod trigger;

pub use catalog::{ConversationCatalog, InMemoryCatalog};
pub use dialog::{DialogInterpreter, DialogNode, DialogStep, DialogTree, NodeKind};
pub use error::ConversationError;
pub use objection::{ObjectionHandler, ObjectionMatcher, ObjectionResponse};
pub use session::{ConversationSession, Reply};
pub use trigger::Utterance;
