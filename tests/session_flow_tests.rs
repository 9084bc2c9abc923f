use pamtutor::state::{Command, SessionEvent, SessionState, Stage, WorkerUpdate};
use pamtutor::types::{RigorLevel, Sender, LANGUAGES};

fn worker(state: &SessionState, update: WorkerUpdate) -> SessionEvent {
    SessionEvent::Worker {
        epoch: state.epoch(),
        update,
    }
}

#[test]
fn test_startup_sequence_reaches_chat() {
    let mut state = SessionState::new();
    assert_eq!(state.stage(), Stage::RigorSelect);

    assert!(state
        .apply(SessionEvent::RigorChosen(RigorLevel::HighSchool))
        .is_none());
    assert_eq!(state.stage(), Stage::LanguageSelect);

    let command = state
        .apply(SessionEvent::LanguageChosen(LANGUAGES[1]))
        .expect("choosing a language starts validation");
    match command {
        Command::StartSession { level, language, .. } => {
            assert_eq!(level, RigorLevel::HighSchool);
            assert_eq!(language.code, "Spanish");
        }
        other => panic!("unexpected command: {other:?}"),
    }
    assert_eq!(state.stage(), Stage::Chat);
    assert!(state.request_pending);
}

#[test]
fn test_greeting_fragments_concatenate_in_order() {
    let mut state = SessionState::new();
    state.apply(SessionEvent::RigorChosen(RigorLevel::HighSchool));
    state.apply(SessionEvent::LanguageChosen(LANGUAGES[1]));

    state.apply(worker(&state, WorkerUpdate::GreetingStarted));
    state.apply(worker(
        &state,
        WorkerUpdate::StreamFragment("¡Hola".to_string()),
    ));
    state.apply(worker(
        &state,
        WorkerUpdate::StreamFragment(", soy PAM!".to_string()),
    ));
    state.apply(worker(&state, WorkerUpdate::TurnCompleted));

    assert_eq!(state.messages.len(), 1);
    assert_eq!(state.messages[0].sender, Sender::Assistant);
    assert_eq!(state.messages[0].text, "¡Hola, soy PAM!");
    assert!(!state.request_pending);
}

#[test]
fn test_validation_failure_keeps_level_and_clears_language() {
    let mut state = SessionState::new();
    state.apply(SessionEvent::RigorChosen(RigorLevel::Undergraduate));
    state.apply(SessionEvent::LanguageChosen(LANGUAGES[3]));

    state.apply(worker(
        &state,
        WorkerUpdate::ValidationFailed("API connection failed: expired key".to_string()),
    ));

    assert_eq!(state.stage(), Stage::LanguageSelect);
    assert_eq!(state.rigor, Some(RigorLevel::Undergraduate));
    assert!(state.language.is_none());
    assert!(state.error.is_some());
}

#[test]
fn test_reset_from_every_state_returns_to_unstarted() {
    // Mid-selection.
    let mut state = SessionState::new();
    state.apply(SessionEvent::RigorChosen(RigorLevel::MiddleSchool));
    state.apply(SessionEvent::ResetRequested);
    assert_eq!(state.stage(), Stage::RigorSelect);

    // Mid-error.
    let mut state = SessionState::new();
    state.apply(SessionEvent::RigorChosen(RigorLevel::MiddleSchool));
    state.apply(SessionEvent::LanguageChosen(LANGUAGES[0]));
    state.apply(worker(
        &state,
        WorkerUpdate::ValidationFailed("API connection failed: nope".to_string()),
    ));
    state.apply(SessionEvent::ResetRequested);
    assert_eq!(state.stage(), Stage::RigorSelect);
    assert!(state.error.is_none());

    // Active session with a visible worksheet.
    let mut state = SessionState::new();
    state.apply(SessionEvent::RigorChosen(RigorLevel::HighSchool));
    state.apply(SessionEvent::LanguageChosen(LANGUAGES[0]));
    state.apply(worker(&state, WorkerUpdate::GreetingStarted));
    state.apply(worker(
        &state,
        WorkerUpdate::StreamFragment("Hello".to_string()),
    ));
    state.apply(worker(&state, WorkerUpdate::TurnCompleted));
    state.apply(SessionEvent::UserSubmitted("Energy".to_string()));
    state.apply(worker(&state, WorkerUpdate::ReplyStarted));
    state.apply(worker(&state, WorkerUpdate::TurnCompleted));
    state.apply(SessionEvent::WorksheetRequested);
    state.apply(worker(
        &state,
        WorkerUpdate::WorksheetReady(pamtutor::types::Worksheet {
            title: "t".to_string(),
            questions: Vec::new(),
            answer_key: Vec::new(),
        }),
    ));
    assert!(state.worksheet_visible);

    let command = state.apply(SessionEvent::ResetRequested);
    assert_eq!(command, Some(Command::DiscardSession));
    assert_eq!(state.stage(), Stage::RigorSelect);
    assert!(state.rigor.is_none());
    assert!(state.language.is_none());
    assert!(state.messages.is_empty());
    assert!(state.worksheet.is_none());
    assert!(!state.worksheet_visible);
    assert!(state.error.is_none());
}

#[test]
fn test_worksheet_request_needs_two_messages_and_idle_state() {
    let mut state = SessionState::new();
    state.apply(SessionEvent::RigorChosen(RigorLevel::HighSchool));
    state.apply(SessionEvent::LanguageChosen(LANGUAGES[0]));
    state.apply(worker(&state, WorkerUpdate::GreetingStarted));
    state.apply(worker(&state, WorkerUpdate::TurnCompleted));

    // One message only: refused.
    assert!(!state.can_request_worksheet());
    assert!(state.apply(SessionEvent::WorksheetRequested).is_none());

    state.apply(SessionEvent::UserSubmitted("momentum".to_string()));
    // Turn in flight: refused.
    assert!(!state.can_request_worksheet());

    state.apply(worker(&state, WorkerUpdate::ReplyStarted));
    state.apply(worker(&state, WorkerUpdate::TurnCompleted));
    assert!(state.can_request_worksheet());

    let command = state.apply(SessionEvent::WorksheetRequested);
    match command {
        Some(Command::BuildWorksheet { transcript, .. }) => {
            assert_eq!(transcript.len(), 3);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn test_blank_submissions_are_ignored() {
    let mut state = SessionState::new();
    state.apply(SessionEvent::RigorChosen(RigorLevel::HighSchool));
    state.apply(SessionEvent::LanguageChosen(LANGUAGES[0]));
    state.apply(worker(&state, WorkerUpdate::GreetingStarted));
    state.apply(worker(&state, WorkerUpdate::TurnCompleted));

    assert!(state
        .apply(SessionEvent::UserSubmitted("   \n".to_string()))
        .is_none());
    assert_eq!(state.messages.len(), 1);
}
