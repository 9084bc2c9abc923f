pub mod session;
pub mod worksheet;

pub use session::{Command, SessionEvent, SessionState, Stage, WorkerUpdate, NO_TOPICS_MESSAGE};
pub use worksheet::{printable_text, sorted_answer_key};
