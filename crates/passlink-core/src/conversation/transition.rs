//! Pure state transitions: same state and input always give the same step,
//! with no I/O.

use super::ConversationState;
use crate::domain::LinkRecord;

/// Menu flows a chat can enter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Upload,
    Download,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Input {
    Select(Flow),
    Text(String),
}

/// What the user is asked for next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Prompt {
    Link,
    UploadPasskey,
    DownloadPasskey,
}

/// Work the machine performs after a transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Input not expected in this phase; nothing changes.
    Ignore,
    Prompt(Prompt),
    Save(LinkRecord),
    Lookup { passkey: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Step {
    pub next: ConversationState,
    pub effect: Effect,
}

impl Step {
    fn new(next: ConversationState, effect: Effect) -> Self {
        Self { next, effect }
    }
}

pub fn transition(state: &ConversationState, input: Input) -> Step {
    match (state, input) {
        // Selecting a flow always (re)starts it, whatever was in progress.
        (_, Input::Select(Flow::Upload)) => Step::new(
            ConversationState::AwaitingLink,
            Effect::Prompt(Prompt::Link),
        ),
        (_, Input::Select(Flow::Download)) => Step::new(
            ConversationState::AwaitingPasskeyForDownload,
            Effect::Prompt(Prompt::DownloadPasskey),
        ),

        (ConversationState::Idle, Input::Text(_)) => {
            Step::new(ConversationState::Idle, Effect::Ignore)
        }
        (ConversationState::AwaitingLink, Input::Text(link)) => Step::new(
            ConversationState::AwaitingPasskeyForUpload { pending_link: link },
            Effect::Prompt(Prompt::UploadPasskey),
        ),
        (ConversationState::AwaitingPasskeyForUpload { pending_link }, Input::Text(passkey)) => {
            Step::new(
                ConversationState::Idle,
                Effect::Save(LinkRecord::new(pending_link.clone(), passkey)),
            )
        }
        (ConversationState::AwaitingPasskeyForDownload, Input::Text(passkey)) => Step::new(
            ConversationState::Idle,
            Effect::Lookup { passkey },
        ),
    }
}
