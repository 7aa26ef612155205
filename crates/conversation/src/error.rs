use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConversationError {
    #[error("Node '{key}' does not exist in dialog tree '{tree}'")]
    UnknownNodeKey { tree: String, key: String },

    #[error("Malformed dialog tree '{tree}': {reason}")]
    MalformedTree { tree: String, reason: String },

    #[error("Malformed objection handler '{0}': no usable trigger keywords")]
    MalformedHandler(String),

    #[error("Duplicate objection handler ({objection_type}, {trigger_phrase})")]
    DuplicateHandler {
        objection_type: String,
        trigger_phrase: String,
    },

    #[error("Dialog tree '{tree}' loops through say nodes at '{key}'")]
    CycleDetected { tree: String, key: String },

    #[error("Conversation already completed")]
    SessionCompleted,
}
