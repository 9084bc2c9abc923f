use crate::api::client::MockContentProducer;
use anyhow::Result;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;

/// Process-wide lock for tests that mutate environment variables.
/// Use `.blocking_lock()` in sync tests and `.lock().await` in async tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Canned responses for the non-streaming structured endpoint. Records every
/// request payload so tests can assert what was (and was not) called.
pub struct CannedContent {
    responses: Mutex<Vec<Result<String>>>,
    payloads: Mutex<Vec<Value>>,
}

impl CannedContent {
    pub fn new(responses: Vec<Result<String>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses),
            payloads: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.payloads.lock().unwrap().len()
    }

    pub fn payloads(&self) -> Vec<Value> {
        self.payloads.lock().unwrap().clone()
    }
}

impl MockContentProducer for CannedContent {
    fn produce(&self, payload: &Value) -> Result<String> {
        self.payloads.lock().unwrap().push(payload.clone());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            anyhow::bail!("CannedContent: no more responses configured");
        }
        responses.remove(0)
    }
}
