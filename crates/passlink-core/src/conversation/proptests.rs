//! Property-based tests for the conversation state machine.
//!
//! Whatever sequence of selections and messages arrives, every turn lands in
//! a table successor or in idle, and flows that reach a store effect always
//! end idle.

use std::sync::Arc;

use proptest::prelude::*;

use super::*;
use crate::{
    domain::ChatId,
    errors::TurnError,
    store::{MemoryRecordStore, RecordStore},
    testing::FailingRecordStore,
};

fn arb_input() -> impl Strategy<Value = Input> {
    prop_oneof![
        Just(Input::Select(Flow::Upload)),
        Just(Input::Select(Flow::Download)),
        "[a-z0-9:/._ -]{0,24}".prop_map(Input::Text),
    ]
}

fn arb_state() -> impl Strategy<Value = ConversationState> {
    prop_oneof![
        Just(ConversationState::Idle),
        Just(ConversationState::AwaitingLink),
        "[a-z]{1,12}".prop_map(|pending_link| ConversationState::AwaitingPasskeyForUpload {
            pending_link
        }),
        Just(ConversationState::AwaitingPasskeyForDownload),
    ]
}

/// Phases reachable from `from` on `input`, per the transition table.
fn allowed_successors(from: Phase, input: &Input) -> Vec<Phase> {
    match input {
        Input::Select(Flow::Upload) => vec![Phase::AwaitingLink],
        Input::Select(Flow::Download) => vec![Phase::AwaitingPasskeyForDownload],
        Input::Text(_) => match from {
            Phase::Idle => vec![Phase::Idle],
            Phase::AwaitingLink => vec![Phase::AwaitingPasskeyForUpload],
            Phase::AwaitingPasskeyForUpload | Phase::AwaitingPasskeyForDownload => {
                vec![Phase::Idle]
            }
        },
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("tokio runtime")
}

proptest! {
    #[test]
    fn pure_transition_follows_table(state in arb_state(), input in arb_input()) {
        let from = state.phase();
        let step = transition(&state, input.clone());
        prop_assert!(allowed_successors(from, &input).contains(&step.next.phase()));

        match &step.effect {
            Effect::Save(_) | Effect::Lookup { .. } => prop_assert!(step.next.is_idle()),
            Effect::Ignore => prop_assert_eq!(&step.next, &state),
            Effect::Prompt(_) => prop_assert!(!step.next.is_idle()),
        }
    }

    #[test]
    fn machine_never_wedges(
        inputs in prop::collection::vec(arb_input(), 1..40),
        failing_backend in any::<bool>(),
    ) {
        let records: Arc<dyn RecordStore> = if failing_backend {
            Arc::new(FailingRecordStore)
        } else {
            Arc::new(MemoryRecordStore::new())
        };
        let machine = ConversationMachine::new(Arc::new(MemoryConversationStore::new()), records);
        let chat = ChatId(7);

        runtime().block_on(async {
            for input in inputs {
                let before = machine.phase(chat).await.unwrap();
                let result = match input.clone() {
                    Input::Select(flow) => machine.select(chat, flow).await,
                    Input::Text(text) => machine.on_text(chat, &text).await,
                };
                let after = machine.phase(chat).await.unwrap();

                prop_assert!(
                    allowed_successors(before, &input).contains(&after),
                    "{:?} --{:?}--> {:?}", before, input, after
                );
                match result {
                    Ok(Outcome::Saved(_)) | Ok(Outcome::Found(_)) => prop_assert_eq!(after, Phase::Idle),
                    Err(TurnError::Store(_)) | Err(TurnError::NotFound) => prop_assert_eq!(after, Phase::Idle),
                    Err(TurnError::MalformedState(_)) | Err(TurnError::AuthorizationDenied) => {
                        prop_assert!(false, "unexpected error in a well-formed run");
                    }
                    Ok(Outcome::Ignored) | Ok(Outcome::Prompted(_)) => {}
                }
            }

            // Two more messages always drain any flow back to idle.
            machine.on_text(chat, "x").await.ok();
            machine.on_text(chat, "y").await.ok();
            prop_assert_eq!(machine.phase(chat).await.unwrap(), Phase::Idle);
            Ok(())
        })?;
    }
}
