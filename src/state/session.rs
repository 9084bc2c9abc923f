use crate::types::{Language, Message, RigorLevel, Sender, Worksheet};

/// Which screen the UI shows. Derived from which choices have been made, so
/// the screen discriminant can never disagree with the stored selections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    RigorSelect,
    LanguageSelect,
    Chat,
}

pub const NO_TOPICS_MESSAGE: &str = "Could not identify specific topics from the conversation \
     to generate a worksheet. Please discuss a topic first.";

/// Inputs to the session state machine: user intents plus updates reported
/// by the background worker. Worker updates carry the epoch they were issued
/// under; updates from before the most recent reset are ignored.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    RigorChosen(RigorLevel),
    LanguageChosen(Language),
    UserSubmitted(String),
    WorksheetRequested,
    WorksheetClosed,
    ResetRequested,
    Worker { epoch: u64, update: WorkerUpdate },
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkerUpdate {
    ValidationFailed(String),
    InitFailed(String),
    GreetingStarted,
    ReplyStarted,
    StreamFragment(String),
    TurnCompleted,
    TurnFailed(String),
    NoTopics,
    WorksheetReady(Worksheet),
    WorksheetFailed(String),
}

/// Side-effect requests produced by transitions and executed by the worker.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    StartSession {
        epoch: u64,
        level: RigorLevel,
        language: Language,
    },
    SendTurn {
        epoch: u64,
        text: String,
    },
    BuildWorksheet {
        epoch: u64,
        transcript: Vec<Message>,
        level: RigorLevel,
        language: Language,
    },
    DiscardSession,
}

/// All session state, owned by the application controller. Transitions are
/// pure: `apply` maps (state, event) to a mutated state plus an optional
/// command, with no I/O of its own.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub rigor: Option<RigorLevel>,
    pub language: Option<Language>,
    pub messages: Vec<Message>,
    pub error: Option<String>,
    pub worksheet: Option<Worksheet>,
    pub worksheet_visible: bool,
    /// True while any external request (validation, chat turn, worksheet
    /// pipeline) is outstanding; gates every new request.
    pub request_pending: bool,
    /// True while the newest assistant message is still growing.
    pub streaming: bool,
    epoch: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self) -> Stage {
        match (self.rigor, self.language) {
            (None, _) => Stage::RigorSelect,
            (Some(_), None) => Stage::LanguageSelect,
            (Some(_), Some(_)) => Stage::Chat,
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Worksheet request gate: an active session, no outstanding request,
    /// and enough conversation to extract topics from.
    pub fn can_request_worksheet(&self) -> bool {
        self.stage() == Stage::Chat && !self.request_pending && self.messages.len() >= 2
    }

    pub fn can_submit(&self) -> bool {
        self.stage() == Stage::Chat && !self.request_pending
    }

    pub fn apply(&mut self, event: SessionEvent) -> Option<Command> {
        match event {
            SessionEvent::RigorChosen(level) => {
                if self.stage() != Stage::RigorSelect {
                    return None;
                }
                self.rigor = Some(level);
                None
            }
            SessionEvent::LanguageChosen(language) => {
                if self.stage() != Stage::LanguageSelect || self.request_pending {
                    return None;
                }
                let level = self.rigor?;
                self.language = Some(language);
                self.error = None;
                self.request_pending = true;
                Some(Command::StartSession {
                    epoch: self.epoch,
                    level,
                    language,
                })
            }
            SessionEvent::UserSubmitted(text) => {
                let text = text.trim().to_string();
                if text.is_empty() || !self.can_submit() {
                    return None;
                }
                self.messages.push(Message::user(text.clone()));
                self.error = None;
                self.request_pending = true;
                Some(Command::SendTurn {
                    epoch: self.epoch,
                    text,
                })
            }
            SessionEvent::WorksheetRequested => {
                if !self.can_request_worksheet() {
                    return None;
                }
                let (level, language) = (self.rigor?, self.language?);
                self.error = None;
                self.request_pending = true;
                Some(Command::BuildWorksheet {
                    epoch: self.epoch,
                    transcript: self.messages.clone(),
                    level,
                    language,
                })
            }
            SessionEvent::WorksheetClosed => {
                self.worksheet_visible = false;
                None
            }
            SessionEvent::ResetRequested => {
                let epoch = self.epoch;
                *self = Self::default();
                self.epoch = epoch + 1;
                Some(Command::DiscardSession)
            }
            SessionEvent::Worker { epoch, update } => {
                if epoch != self.epoch {
                    return None;
                }
                self.apply_worker_update(update);
                None
            }
        }
    }

    fn apply_worker_update(&mut self, update: WorkerUpdate) {
        match update {
            WorkerUpdate::ValidationFailed(message) => {
                self.language = None;
                self.error = Some(message);
                self.request_pending = false;
            }
            // Initialization failure returns to language selection as well,
            // so the user can retry without losing the chosen level.
            WorkerUpdate::InitFailed(message) => {
                self.language = None;
                self.error = Some(message);
                self.request_pending = false;
                self.streaming = false;
                self.messages.clear();
            }
            WorkerUpdate::GreetingStarted | WorkerUpdate::ReplyStarted => {
                self.messages.push(Message::assistant_placeholder());
                self.streaming = true;
            }
            WorkerUpdate::StreamFragment(fragment) => {
                if !self.streaming {
                    return;
                }
                if let Some(message) = self
                    .messages
                    .last_mut()
                    .filter(|m| m.sender == Sender::Assistant)
                {
                    message.text.push_str(&fragment);
                }
            }
            WorkerUpdate::TurnCompleted => {
                self.streaming = false;
                self.request_pending = false;
            }
            WorkerUpdate::TurnFailed(message) => {
                self.error = Some(message);
                self.streaming = false;
                self.request_pending = false;
            }
            WorkerUpdate::NoTopics => {
                self.error = Some(NO_TOPICS_MESSAGE.to_string());
                self.request_pending = false;
            }
            WorkerUpdate::WorksheetReady(worksheet) => {
                self.worksheet = Some(worksheet);
                self.worksheet_visible = true;
                self.request_pending = false;
            }
            WorkerUpdate::WorksheetFailed(message) => {
                self.error = Some(message);
                self.request_pending = false;
            }
        }
    }
}
