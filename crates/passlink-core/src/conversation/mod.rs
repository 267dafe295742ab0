//! Per-chat conversation state machine.
//!
//! `transition` is pure; `ConversationMachine` loads state, runs the
//! transition, performs the store effect and commits the next state, one
//! event at a time per chat.

mod machine;
mod state;
mod transition;

#[cfg(test)]
mod proptests;

pub use machine::{ChatLocks, ChatTurn, ConversationMachine, Outcome};
pub use state::{ConversationState, ConversationStore, MemoryConversationStore, Phase, StateRecord};
pub use transition::{transition, Effect, Flow, Input, Prompt, Step};
