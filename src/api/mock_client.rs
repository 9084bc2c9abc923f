use crate::api::client::{ByteStream, ChatSession, MockStreamProducer};
use anyhow::Result;
use bytes::Bytes;
use futures::stream;
use std::sync::{Arc, Mutex};

/// Canned SSE replies for tests. Each configured reply is a list of `data:`
/// records delivered as separate byte chunks, so fragment-by-fragment
/// streaming behavior is exercised.
#[derive(Clone)]
pub struct MockApiStream {
    replies: Arc<Mutex<Vec<Vec<String>>>>,
}

impl MockApiStream {
    pub fn new(replies: Vec<Vec<String>>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies)),
        }
    }

    /// Builds one canned reply whose records each carry a single text
    /// fragment, in the wire shape of the streaming endpoint.
    pub fn reply_from_fragments(fragments: &[&str]) -> Vec<String> {
        fragments
            .iter()
            .map(|fragment| {
                let body = serde_json::json!({
                    "candidates": [{
                        "content": { "role": "model", "parts": [{ "text": fragment }] }
                    }]
                });
                format!("data: {body}")
            })
            .collect()
    }
}

impl MockStreamProducer for MockApiStream {
    fn create_mock_stream(&self, _session: &ChatSession) -> Result<ByteStream> {
        let mut replies = self.replies.lock().unwrap();
        if replies.is_empty() {
            return Err(anyhow::anyhow!("MockApiStream: no more replies configured"));
        }
        let records = replies.remove(0);

        let chunks: Vec<Result<Bytes>> = records
            .into_iter()
            .map(|record| {
                let framed = if record.ends_with("\n\n") {
                    record
                } else {
                    format!("{record}\n\n")
                };
                Ok(Bytes::from(framed))
            })
            .collect();

        Ok(Box::pin(stream::iter(chunks)))
    }
}
