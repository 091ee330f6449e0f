use std::{collections::HashMap, sync::Arc, time::Duration};

use parking_lot::Mutex;
use serde_json::Value;

use crate::{ApiTransport, FetchError, ListRequest};

#[derive(Default)]
struct MockState {
    responses: HashMap<String, Result<Value, FetchError>>,
    requests: Vec<ListRequest>,
    deletes: Vec<String>,
    delay: Option<Duration>,
}

/// Answers by path, records every request.
#[derive(Clone, Default)]
pub(crate) struct MockTransport(Arc<Mutex<MockState>>);

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        self.0.lock().delay = Some(delay);
        self
    }

    pub fn respond(&self, path: &str, body: Value) {
        self.0.lock().responses.insert(path.to_string(), Ok(body));
    }

    pub fn fail(&self, path: &str, error: FetchError) {
        self.0.lock().responses.insert(path.to_string(), Err(error));
    }

    pub fn requests(&self) -> Vec<ListRequest> {
        self.0.lock().requests.clone()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.0.lock().deletes.clone()
    }
}

impl ApiTransport for MockTransport {
    async fn get(&self, request: &ListRequest) -> Result<Value, FetchError> {
        let delay = {
            let mut state = self.0.lock();
            state.requests.push(request.clone());
            state.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.0
            .lock()
            .responses
            .get(&request.path)
            .cloned()
            .unwrap_or_else(|| {
                Err(FetchError::Status {
                    status: 404,
                    body: format!("no mock response for {}", request.path),
                })
            })
    }

    async fn delete(&self, path: &str) -> Result<(), FetchError> {
        self.0.lock().deletes.push(path.to_string());
        Ok(())
    }
}
