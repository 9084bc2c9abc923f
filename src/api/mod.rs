pub mod client;
pub mod error;
pub mod logging;
#[cfg(test)]
pub mod mock_client;
pub mod stream;

pub use client::{ApiClient, ByteStream, ChatSession, GREETING_TRIGGER};
pub use error::{user_facing_message, ApiErrorKind, ApiFailure, ErrorContext};
